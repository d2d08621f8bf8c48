//! Emulator core adapter contract.
//!
//! The host treats the emulator as an opaque frame/audio/input source
//! behind [`EmulatorCore`]. A real libretro-style core lives in a platform
//! crate; this module ships [`NullCore`] (never loads anything, drives the
//! standby path) and [`ScriptedCore`], a synthetic core used by integration
//! tests and the binary's demo mode. Production hosts do not use
//! `ScriptedCore`; each real core links its own adapter.

use bitflags::bitflags;
use tracing::{info, warn};

use crate::vr::layers::{VIP_EYE_HEIGHT, VIP_EYE_WIDTH};
use crate::vr::mapping::INVALID_SOURCE_COORD;

bitflags! {
    /// Emulator button mask, joypad bit layout shared with the core plugin.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ButtonMask: u16 {
        const B = 1 << 0;
        const SELECT = 1 << 2;
        const START = 1 << 3;
        const UP = 1 << 4;
        const DOWN = 1 << 5;
        const LEFT = 1 << 6;
        const RIGHT = 1 << 7;
        const A = 1 << 8;
        const L = 1 << 10;
        const R = 1 << 11;
    }
}

/// One tick's emulator-facing button state, pre-merge and pre-consumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmulatorButtons {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub a: bool,
    pub b: bool,
    pub l: bool,
    pub r: bool,
    pub start: bool,
    pub select: bool,
}

impl EmulatorButtons {
    pub fn to_mask(self) -> ButtonMask {
        let mut mask = ButtonMask::empty();
        if self.left {
            mask |= ButtonMask::LEFT;
        }
        if self.right {
            mask |= ButtonMask::RIGHT;
        }
        if self.up {
            mask |= ButtonMask::UP;
        }
        if self.down {
            mask |= ButtonMask::DOWN;
        }
        if self.a {
            mask |= ButtonMask::A;
        }
        if self.b {
            mask |= ButtonMask::B;
        }
        if self.l {
            mask |= ButtonMask::L;
        }
        if self.r {
            mask |= ButtonMask::R;
        }
        if self.start {
            mask |= ButtonMask::START;
        }
        if self.select {
            mask |= ButtonMask::SELECT;
        }
        mask
    }
}

/// Per-frame depth metadata, borrowed from the core for this tick only.
#[derive(Debug, Clone, Copy)]
pub struct FrameMetadata<'a> {
    pub disparity: &'a [i8],
    pub world_ids: &'a [u8],
    pub source_x: &'a [i16],
    pub source_y: &'a [i16],
    pub width: i32,
    pub height: i32,
    pub frame_id: u32,
}

/// The emulator plugin contract. Frame retrieval is pull-based: top-left
/// origin, tightly packed 32-bit pixels. Audio drains as interleaved
/// 16-bit stereo PCM.
pub trait EmulatorCore {
    fn initialize(&mut self) -> bool;
    fn shutdown(&mut self);

    fn load_rom_from_path(&mut self, path: &str) -> bool;
    fn load_rom_from_bytes(&mut self, data: &[u8], name_hint: &str) -> bool;
    fn unload_rom(&mut self);

    fn is_initialized(&self) -> bool;
    fn is_rom_loaded(&self) -> bool;
    fn rom_label(&self) -> &str;
    /// Human-readable description of the most recent failure.
    fn last_error(&self) -> &str;

    fn set_input_state(&mut self, mask: ButtonMask);
    /// Step exactly one emulated frame, synchronously.
    fn run_frame(&mut self);

    fn has_frame(&self) -> bool;
    fn frame_width(&self) -> i32;
    fn frame_height(&self) -> i32;
    fn frame_pixels(&self) -> &[u32];

    fn has_metadata(&self) -> bool {
        false
    }
    fn metadata(&self) -> Option<FrameMetadata<'_>> {
        None
    }

    /// Move up to `max_frames` interleaved stereo frames into `out`,
    /// returning how many were written. A short or zero return means the
    /// core's buffer is drained.
    fn drain_audio_frames(&mut self, out: &mut [i16], max_frames: usize) -> usize;
    fn audio_sample_rate(&self) -> i32;
}

// ── NullCore ─────────────────────────────────────────────────

/// Core stand-in for hosts built without an emulator plugin. Every load
/// fails with a descriptive error, which keeps the host on its standby
/// screen.
#[derive(Default)]
pub struct NullCore {
    initialized: bool,
    last_error: String,
}

impl NullCore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmulatorCore for NullCore {
    fn initialize(&mut self) -> bool {
        self.initialized = true;
        true
    }

    fn shutdown(&mut self) {
        self.initialized = false;
    }

    fn load_rom_from_path(&mut self, path: &str) -> bool {
        self.last_error = format!("no emulator core linked; cannot load {path}");
        false
    }

    fn load_rom_from_bytes(&mut self, _data: &[u8], name_hint: &str) -> bool {
        self.last_error = format!("no emulator core linked; cannot load {name_hint}");
        warn!("{}", self.last_error);
        false
    }

    fn unload_rom(&mut self) {}

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn is_rom_loaded(&self) -> bool {
        false
    }

    fn rom_label(&self) -> &str {
        ""
    }

    fn last_error(&self) -> &str {
        &self.last_error
    }

    fn set_input_state(&mut self, _mask: ButtonMask) {}

    fn run_frame(&mut self) {}

    fn has_frame(&self) -> bool {
        false
    }

    fn frame_width(&self) -> i32 {
        0
    }

    fn frame_height(&self) -> i32 {
        0
    }

    fn frame_pixels(&self) -> &[u32] {
        &[]
    }

    fn drain_audio_frames(&mut self, _out: &mut [i16], _max_frames: usize) -> usize {
        0
    }

    fn audio_sample_rate(&self) -> i32 {
        44100
    }
}

// ── ScriptedCore ─────────────────────────────────────────────

/// Audio frames the scripted core queues per video frame (44.1kHz at the
/// ~50Hz cadence of the emulated display).
const SCRIPTED_AUDIO_FRAMES_PER_TICK: usize = 882;

/// Synthetic core producing a side-by-side test card with full depth
/// metadata, for integration tests and the binary's demo mode.
pub struct ScriptedCore {
    initialized: bool,
    rom_loaded: bool,
    rom_label: String,
    last_error: String,
    frame_counter: u32,
    input_mask: ButtonMask,
    frame: Vec<u32>,
    disparity: Vec<i8>,
    world_ids: Vec<u8>,
    source_x: Vec<i16>,
    source_y: Vec<i16>,
    audio_queue: std::collections::VecDeque<i16>,
    emit_metadata: bool,
}

impl ScriptedCore {
    pub fn new() -> Self {
        Self {
            initialized: false,
            rom_loaded: false,
            rom_label: String::new(),
            last_error: String::new(),
            frame_counter: 0,
            input_mask: ButtonMask::empty(),
            frame: Vec::new(),
            disparity: Vec::new(),
            world_ids: Vec::new(),
            source_x: Vec::new(),
            source_y: Vec::new(),
            audio_queue: std::collections::VecDeque::new(),
            emit_metadata: true,
        }
    }

    /// Disable metadata emission, exercising the classic render paths.
    pub fn without_metadata(mut self) -> Self {
        self.emit_metadata = false;
        self
    }

    pub fn input_mask(&self) -> ButtonMask {
        self.input_mask
    }

    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    fn width(&self) -> i32 {
        VIP_EYE_WIDTH * 2
    }

    fn height(&self) -> i32 {
        VIP_EYE_HEIGHT
    }

    /// Four vertical bands per eye, each its own world id with its own
    /// disparity, scrolling one pixel per frame so motion is visible.
    fn generate_frame(&mut self) {
        let width = self.width() as usize;
        let height = self.height() as usize;
        let pixel_count = width * height;
        self.frame.resize(pixel_count, 0);
        if self.emit_metadata {
            self.disparity.resize(pixel_count, 0);
            self.world_ids.resize(pixel_count, 0xFF);
            self.source_x.resize(pixel_count, INVALID_SOURCE_COORD);
            self.source_y.resize(pixel_count, INVALID_SOURCE_COORD);
        }

        let band_width = VIP_EYE_WIDTH as usize / 4;
        let scroll = self.frame_counter as usize;
        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                let eye = x / VIP_EYE_WIDTH as usize;
                let eye_x = x % VIP_EYE_WIDTH as usize;
                let band = ((eye_x + scroll) / band_width) % 4;
                let shade = 40 + (band as u32) * 50;
                self.frame[idx] = 0xFF000000 | (shade << 16);

                if self.emit_metadata {
                    self.world_ids[idx] = band as u8;
                    self.disparity[idx] = (band as i8 + 1) * 20;
                    // Source sweep at 2 source px per screen px, left eye
                    // leading by the band disparity.
                    let shift = if eye == 0 {
                        i16::from(self.disparity[idx])
                    } else {
                        0
                    };
                    self.source_x[idx] = (eye_x as i16) * 2 + shift;
                    self.source_y[idx] = y as i16;
                }
            }
        }
    }

    fn queue_audio(&mut self) {
        // Square-ish test tone, quiet.
        for i in 0..SCRIPTED_AUDIO_FRAMES_PER_TICK {
            let sample = if (self.frame_counter as usize * SCRIPTED_AUDIO_FRAMES_PER_TICK + i)
                % 100
                < 50
            {
                800
            } else {
                -800
            };
            self.audio_queue.push_back(sample);
            self.audio_queue.push_back(sample);
        }
    }
}

impl Default for ScriptedCore {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatorCore for ScriptedCore {
    fn initialize(&mut self) -> bool {
        self.initialized = true;
        true
    }

    fn shutdown(&mut self) {
        self.unload_rom();
        self.initialized = false;
    }

    fn load_rom_from_path(&mut self, path: &str) -> bool {
        if !self.initialized {
            self.last_error = "core not initialized".to_string();
            return false;
        }
        self.rom_loaded = true;
        self.rom_label = path.to_string();
        self.last_error.clear();
        info!("scripted core loaded {path}");
        true
    }

    fn load_rom_from_bytes(&mut self, data: &[u8], name_hint: &str) -> bool {
        if !self.initialized {
            self.last_error = "core not initialized".to_string();
            return false;
        }
        if data.is_empty() {
            self.last_error = format!("ROM is empty: {name_hint}");
            return false;
        }
        self.rom_loaded = true;
        self.rom_label = name_hint.to_string();
        self.last_error.clear();
        true
    }

    fn unload_rom(&mut self) {
        self.rom_loaded = false;
        self.frame.clear();
        self.frame_counter = 0;
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn is_rom_loaded(&self) -> bool {
        self.rom_loaded
    }

    fn rom_label(&self) -> &str {
        &self.rom_label
    }

    fn last_error(&self) -> &str {
        &self.last_error
    }

    fn set_input_state(&mut self, mask: ButtonMask) {
        self.input_mask = mask;
    }

    fn run_frame(&mut self) {
        if !self.rom_loaded {
            return;
        }
        self.generate_frame();
        self.queue_audio();
        self.frame_counter += 1;
    }

    fn has_frame(&self) -> bool {
        !self.frame.is_empty()
    }

    fn frame_width(&self) -> i32 {
        if self.frame.is_empty() {
            0
        } else {
            self.width()
        }
    }

    fn frame_height(&self) -> i32 {
        if self.frame.is_empty() {
            0
        } else {
            self.height()
        }
    }

    fn frame_pixels(&self) -> &[u32] {
        &self.frame
    }

    fn has_metadata(&self) -> bool {
        self.emit_metadata && !self.disparity.is_empty()
    }

    fn metadata(&self) -> Option<FrameMetadata<'_>> {
        if !self.has_metadata() {
            return None;
        }
        Some(FrameMetadata {
            disparity: &self.disparity,
            world_ids: &self.world_ids,
            source_x: &self.source_x,
            source_y: &self.source_y,
            width: self.width(),
            height: self.height(),
            frame_id: self.frame_counter,
        })
    }

    fn drain_audio_frames(&mut self, out: &mut [i16], max_frames: usize) -> usize {
        let frames = max_frames
            .min(out.len() / 2)
            .min(self.audio_queue.len() / 2);
        for sample in out.iter_mut().take(frames * 2) {
            *sample = self.audio_queue.pop_front().unwrap_or(0);
        }
        frames
    }

    fn audio_sample_rate(&self) -> i32 {
        44100
    }
}
