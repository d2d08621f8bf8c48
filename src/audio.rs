//! Audio output seam and the bounded pull drain.
//!
//! The device-facing player lives in a platform crate behind
//! [`AudioOutput`]; writes are blocking with no backpressure signal, so
//! audio throughput gates effective frame rate by design. The tick loop
//! drains the core in bounded chunks until a short or empty read.

use tracing::debug;

use crate::emulator::EmulatorCore;

/// Interleaved stereo frames pulled from the core per drain iteration.
pub const AUDIO_CHUNK_FRAMES: usize = 2048;

/// Output device contract: interleaved 16-bit stereo PCM, blocking writes.
pub trait AudioOutput {
    /// Open (or reconfigure) the stream for the given format. Returns false
    /// when the device cannot be started; the caller skips audio this tick.
    fn ensure_started(&mut self, sample_rate: i32, channels: i32) -> bool;
    fn write_frames(&mut self, interleaved_pcm: &[i16], frame_count: usize) -> bool;
    fn shutdown(&mut self);
}

/// Discards all audio. Used headless and as the fallback when no device
/// backend is linked.
#[derive(Debug, Default)]
pub struct NullAudioOutput {
    started: bool,
    pub frames_written: u64,
}

impl NullAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioOutput for NullAudioOutput {
    fn ensure_started(&mut self, sample_rate: i32, channels: i32) -> bool {
        if !self.started {
            debug!("null audio output started: {} Hz, {} ch", sample_rate, channels);
            self.started = true;
        }
        true
    }

    fn write_frames(&mut self, _interleaved_pcm: &[i16], frame_count: usize) -> bool {
        self.frames_written += frame_count as u64;
        true
    }

    fn shutdown(&mut self) {
        self.started = false;
    }
}

/// Drain the core's audio into the output: repeated pulls of up to
/// [`AUDIO_CHUNK_FRAMES`] until the core returns fewer than requested
/// (end of buffer) or zero (empty). Returns total frames moved.
pub fn pump_audio(core: &mut dyn EmulatorCore, output: &mut dyn AudioOutput) -> usize {
    if !core.is_rom_loaded() {
        return 0;
    }
    if !output.ensure_started(core.audio_sample_rate(), 2) {
        return 0;
    }

    let mut chunk = [0i16; AUDIO_CHUNK_FRAMES * 2];
    let mut total = 0usize;
    loop {
        let frames = core.drain_audio_frames(&mut chunk, AUDIO_CHUNK_FRAMES);
        if frames == 0 {
            break;
        }
        output.write_frames(&chunk, frames);
        total += frames;
        if frames < AUDIO_CHUNK_FRAMES {
            break;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{EmulatorCore, ScriptedCore};

    #[test]
    fn test_pump_drains_everything() {
        let mut core = ScriptedCore::new();
        core.initialize();
        core.load_rom_from_bytes(&[0u8; 8], "demo.vb");
        // Queue several frames' worth so more than one chunk is needed.
        for _ in 0..6 {
            core.run_frame();
        }

        let mut output = NullAudioOutput::new();
        let moved = pump_audio(&mut core, &mut output);
        assert!(moved > AUDIO_CHUNK_FRAMES);
        assert_eq!(output.frames_written, moved as u64);

        // Core is now empty; the next pump moves nothing.
        assert_eq!(pump_audio(&mut core, &mut output), 0);
    }

    #[test]
    fn test_pump_skips_without_rom() {
        let mut core = ScriptedCore::new();
        core.initialize();
        let mut output = NullAudioOutput::new();
        assert_eq!(pump_audio(&mut core, &mut output), 0);
        assert_eq!(output.frames_written, 0);
    }
}
