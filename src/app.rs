//! The host application tick loop.
//!
//! One logical tick per iteration: poll the XR session, consume picker
//! deliveries, merge controller input through the calibration and
//! walkthrough layers, step the emulator, pump audio, compose the output
//! frame (overlay or standby), and present. The loop paces itself to a
//! fixed frame interval by sleeping the remainder; overruns skip the sleep
//! and are otherwise absorbed silently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::audio::{pump_audio, AudioOutput};
use crate::clock::Clock;
use crate::config::PresentationConfig;
use crate::emulator::{EmulatorButtons, EmulatorCore};
use crate::input::{merge_controller, CalibrationLayer, EdgeTrigger, WalkthroughNav};
use crate::mailbox::{Mailbox, RomDelivery};
use crate::overlay::{basename_from_path, draw_info_panel, draw_text};
use crate::vr::renderer::StereoRenderer;
use crate::vr::session::{DrawSurface, XrSession};

/// ~50 FPS, the cadence of the emulated display.
pub const FRAME_TARGET: Duration = Duration::from_millis(20);
/// Ticks between default-ROM load retries while nothing is loaded.
pub const ROM_RELOAD_TICKS: i32 = 120;

const STANDBY_FRAME_WIDTH: i32 = 768;
const STANDBY_FRAME_HEIGHT: i32 = 384;
const INFO_HINT_BLINK_PERIOD_MS: u128 = 500;

/// Flat (non-VR) presentation fallback. Presenting returns false when this
/// renderer is unavailable too, in which case the frame is dropped.
pub trait RenderTarget {
    fn update_frame(&mut self, pixels: &[u32], width: i32, height: i32);
    fn render(&mut self) -> bool;
}

/// Headless fallback target; counts presented frames.
#[derive(Debug, Default)]
pub struct NullRenderTarget {
    pub frames_presented: u64,
    pub last_frame_size: (i32, i32),
}

impl NullRenderTarget {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderTarget for NullRenderTarget {
    fn update_frame(&mut self, _pixels: &[u32], width: i32, height: i32) {
        self.last_frame_size = (width, height);
    }

    fn render(&mut self) -> bool {
        self.frames_presented += 1;
        true
    }
}

/// Platform ROM picker launcher. Results come back through the app's
/// mailboxes; this only fires the request.
pub trait PickerLauncher {
    /// Returns false when the picker could not be launched.
    fn open_picker(&mut self) -> bool;
}

/// Picker stub that counts launch requests (headless + tests).
#[derive(Debug, Default)]
pub struct CountingPicker {
    requests: Arc<AtomicU64>,
}

impl CountingPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.requests)
    }
}

impl PickerLauncher for CountingPicker {
    fn open_picker(&mut self) -> bool {
        self.requests.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// Persisted settings access. The text format is owned by
/// [`PresentationConfig`]; the store only moves bytes.
pub trait SettingsStore {
    fn load(&mut self) -> Option<String>;
    fn save(&mut self, text: &str);
}

/// Shared in-memory store for headless runs and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySettingsStore {
    stored: Arc<Mutex<Option<String>>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Option<String> {
        self.stored.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn load(&mut self) -> Option<String> {
        self.stored()
    }

    fn save(&mut self, text: &str) {
        let mut stored = self.stored.lock().unwrap_or_else(|e| e.into_inner());
        *stored = Some(text.to_string());
    }
}

pub struct App<C: EmulatorCore> {
    core: C,
    session: Box<dyn XrSession>,
    surface: Box<dyn DrawSurface>,
    fallback: Box<dyn RenderTarget>,
    audio: Box<dyn AudioOutput>,
    picker: Box<dyn PickerLauncher>,
    settings: Box<dyn SettingsStore>,
    clock: Arc<dyn Clock>,

    renderer: StereoRenderer,
    presentation: PresentationConfig,
    calibration: CalibrationLayer,
    walkthrough: WalkthroughNav,

    rom_mailbox: Mailbox<RomDelivery>,
    picker_dismissed: Mailbox<()>,
    rom_candidates: Vec<String>,

    running: bool,
    started: bool,
    reload_counter: i32,
    picker_requested: bool,
    auto_picker_launched: bool,
    restore_info_after_picker: bool,
    show_info_window: bool,
    info_toggle_edge: EdgeTrigger,
    picker_toggle_edge: EdgeTrigger,
    physical_input: EmulatorButtons,

    overlay_frame: Vec<u32>,
    standby_frame: Vec<u32>,
    fps_frame_count: u32,
    fps: f64,
    fps_window_start: Instant,
    epoch: Instant,
}

impl<C: EmulatorCore> App<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        core: C,
        session: Box<dyn XrSession>,
        surface: Box<dyn DrawSurface>,
        fallback: Box<dyn RenderTarget>,
        audio: Box<dyn AudioOutput>,
        picker: Box<dyn PickerLauncher>,
        settings: Box<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            core,
            session,
            surface,
            fallback,
            audio,
            picker,
            settings,
            clock,
            renderer: StereoRenderer::new(),
            presentation: PresentationConfig::default(),
            calibration: CalibrationLayer::new(),
            walkthrough: WalkthroughNav::new(),
            rom_mailbox: Mailbox::new(),
            picker_dismissed: Mailbox::new(),
            rom_candidates: Vec::new(),
            running: true,
            started: false,
            reload_counter: 0,
            picker_requested: false,
            auto_picker_launched: false,
            restore_info_after_picker: false,
            show_info_window: true,
            info_toggle_edge: EdgeTrigger::default(),
            picker_toggle_edge: EdgeTrigger::default(),
            physical_input: EmulatorButtons::default(),
            overlay_frame: Vec::new(),
            standby_frame: Vec::new(),
            fps_frame_count: 0,
            fps: 0.0,
            fps_window_start: now,
            epoch: now,
        }
    }

    /// Default-ROM paths probed at startup and on the retry cadence.
    pub fn with_rom_candidates(mut self, candidates: Vec<String>) -> Self {
        self.rom_candidates = candidates;
        self
    }

    /// Producer handle for platform-delivered ROM bytes.
    pub fn rom_mailbox(&self) -> Mailbox<RomDelivery> {
        self.rom_mailbox.clone()
    }

    /// Producer handle for the picker-dismissed signal.
    pub fn picker_dismissed_mailbox(&self) -> Mailbox<()> {
        self.picker_dismissed.clone()
    }

    /// Platform button state for the next tick (keyboard/gamepad layer).
    pub fn set_physical_input(&mut self, input: EmulatorButtons) {
        self.physical_input = input;
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn renderer(&self) -> &StereoRenderer {
        &self.renderer
    }

    pub fn presentation(&self) -> &PresentationConfig {
        &self.presentation
    }

    pub fn core(&self) -> &C {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }

    pub fn show_info_window(&self) -> bool {
        self.show_info_window
    }

    pub fn picker_requested(&self) -> bool {
        self.picker_requested
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// One-time startup: initialize the core, load persisted presentation
    /// settings, apply them, and probe for a default ROM.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        if !self.core.initialize() {
            warn!("emulator core failed to initialize: {}", self.core.last_error());
        }

        if let Some(text) = self.settings.load() {
            self.presentation = PresentationConfig::from_settings_text(&text);
            info!(
                "loaded presentation settings: scale={:.3} convergence={:.3} mode={}",
                self.presentation.screen_scale,
                self.presentation.stereo_convergence,
                self.presentation.view_mode.name()
            );
        }
        self.apply_presentation_config();
        self.try_load_default_rom();
    }

    pub fn shutdown(&mut self) {
        self.audio.shutdown();
        self.core.shutdown();
        self.running = false;
    }

    fn apply_presentation_config(&mut self) {
        self.renderer.set_presentation_config(
            self.presentation.screen_scale,
            self.presentation.effective_convergence(),
        );
        self.renderer
            .set_depth_metadata_enabled(self.presentation.depth_metadata_enabled);
        self.renderer
            .set_world_anchored_enabled(self.presentation.world_anchored());
        self.renderer.set_overlay_visible(self.show_info_window);
        self.push_walkthrough_state();
    }

    fn push_walkthrough_state(&mut self) {
        self.renderer.set_walkthrough_offset(
            self.walkthrough.offset_x,
            self.walkthrough.offset_y,
            self.walkthrough.offset_z,
        );
        self.renderer
            .set_walkthrough_rotation(self.walkthrough.yaw, self.walkthrough.pitch);
    }

    fn save_presentation_settings(&mut self) {
        let text = self.presentation.to_settings_text();
        self.settings.save(&text);
    }

    fn toggle_info_window(&mut self) {
        self.show_info_window = !self.show_info_window;
        info!(
            "info window {}",
            if self.show_info_window { "enabled" } else { "disabled" }
        );
    }

    fn try_load_default_rom(&mut self) {
        if !self.core.is_initialized() || self.core.is_rom_loaded() {
            return;
        }

        let candidates = self.rom_candidates.clone();
        for candidate in &candidates {
            if self.core.load_rom_from_path(candidate) {
                info!("ROM loaded from {candidate}");
                return;
            }
        }

        if !self.core.last_error().is_empty() {
            warn!("ROM not loaded yet: {}", self.core.last_error());
        }

        if !self.picker_requested && !self.auto_picker_launched {
            self.request_rom_picker(true);
        }
    }

    fn request_rom_picker(&mut self, auto_launch: bool) {
        if self.show_info_window && !auto_launch {
            return;
        }
        if self.picker_requested {
            return;
        }

        // The picker covers the screen; stash the info window and restore
        // it once the picker resolves.
        let restore_info = auto_launch && self.show_info_window;
        if restore_info {
            self.show_info_window = false;
            self.restore_info_after_picker = true;
        }

        if self.picker.open_picker() {
            self.picker_requested = true;
            if auto_launch {
                self.auto_picker_launched = true;
            }
            info!("requested ROM picker");
        } else if restore_info {
            self.show_info_window = true;
            self.restore_info_after_picker = false;
        }
    }

    fn consume_picker_results(&mut self) {
        if let Some(delivery) = self.rom_mailbox.take() {
            if self
                .core
                .load_rom_from_bytes(&delivery.bytes, &delivery.name)
            {
                info!("ROM loaded from picker: {}", delivery.name);
                self.auto_picker_launched = false;
            } else {
                warn!("picker ROM load failed: {}", self.core.last_error());
            }
            self.picker_requested = false;
            if self.restore_info_after_picker {
                self.show_info_window = true;
                self.restore_info_after_picker = false;
            }
        } else if self.picker_dismissed.take().is_some() {
            self.picker_requested = false;
            info!("ROM picker dismissed");
            if self.restore_info_after_picker {
                self.show_info_window = true;
                self.restore_info_after_picker = false;
            }
        }
    }

    /// One frame of the cooperative loop.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        let frame_start = self.clock.now();

        self.renderer.poll_events(self.session.as_mut());
        if self.renderer.exit_requested() {
            warn!("XR runtime requested exit");
            self.running = false;
            return;
        }

        let xr_state = self.session.controller_state();
        self.renderer.set_overlay_visible(self.show_info_window);

        if self.info_toggle_edge.rising(xr_state.right_thumb_click) {
            self.toggle_info_window();
        }

        self.consume_picker_results();

        if self.picker_toggle_edge.rising(xr_state.left_thumb_click) {
            self.request_rom_picker(false);
        }

        if !self.core.is_rom_loaded() {
            if self.reload_counter <= 0 {
                self.try_load_default_rom();
                self.reload_counter = ROM_RELOAD_TICKS;
            } else {
                self.reload_counter -= 1;
            }
            self.compose_standby_frame();
            self.present_standby();
        } else {
            let mut merged = merge_controller(&self.physical_input, &xr_state);

            let outcome =
                self.calibration
                    .apply(&mut self.presentation, &mut merged, self.show_info_window);
            if outcome.changed || outcome.view_mode_toggled {
                self.apply_presentation_config();
                self.save_presentation_settings();
            }

            self.walkthrough
                .update(&xr_state, &mut merged, self.presentation.world_anchored());
            self.push_walkthrough_state();

            self.core.set_input_state(merged.to_mask());
            self.core.run_frame();
            pump_audio(&mut self.core, self.audio.as_mut());

            // Depth presentation follows metadata availability.
            if self.presentation.depth_metadata_enabled != self.core.has_metadata() {
                self.presentation.depth_metadata_enabled = self.core.has_metadata();
                self.apply_presentation_config();
            }
            if let Some(meta) = self.core.metadata() {
                self.renderer.update_depth_metadata(
                    self.surface.as_mut(),
                    meta.disparity,
                    meta.world_ids,
                    meta.width,
                    meta.height,
                    meta.frame_id,
                );
            }

            if self.core.has_frame() {
                self.present_emulator_frame();
            }
        }

        self.update_fps();

        let frame_elapsed = self.clock.now() - frame_start;
        if frame_elapsed < FRAME_TARGET {
            self.clock.sleep(FRAME_TARGET - frame_elapsed);
        }
    }

    /// Run until stopped, or for at most `max_ticks` when given.
    pub fn run(&mut self, max_ticks: Option<u64>) {
        self.start();
        let mut ticks = 0u64;
        while self.running {
            self.tick();
            ticks += 1;
            if let Some(max) = max_ticks {
                if ticks >= max {
                    break;
                }
            }
        }
    }

    fn present_emulator_frame(&mut self) {
        let width = self.core.frame_width();
        let height = self.core.frame_height();

        if self.show_info_window {
            let lines = self.build_info_lines();
            self.overlay_frame.clear();
            self.overlay_frame
                .extend_from_slice(self.core.frame_pixels());
            if width >= height * 2 {
                let eye_width = width / 2;
                draw_info_panel(&mut self.overlay_frame, width, height, 0, eye_width, &lines);
                draw_info_panel(
                    &mut self.overlay_frame,
                    width,
                    height,
                    eye_width,
                    eye_width,
                    &lines,
                );
            } else {
                draw_info_panel(&mut self.overlay_frame, width, height, 0, width, &lines);
            }
            self.renderer
                .update_frame(self.surface.as_mut(), &self.overlay_frame, width, height);
            if !self.renderer.render_frame(self.session.as_mut(), self.surface.as_mut()) {
                self.fallback.update_frame(&self.overlay_frame, width, height);
                self.fallback.render();
            }
        } else {
            self.renderer.update_frame(
                self.surface.as_mut(),
                self.core.frame_pixels(),
                width,
                height,
            );
            let rendered = self.renderer.render_frame(self.session.as_mut(), self.surface.as_mut());
            if !rendered {
                self.fallback
                    .update_frame(self.core.frame_pixels(), width, height);
                self.fallback.render();
            }
        }
    }

    fn present_standby(&mut self) {
        self.renderer.update_frame(
            self.surface.as_mut(),
            &self.standby_frame,
            STANDBY_FRAME_WIDTH,
            STANDBY_FRAME_HEIGHT,
        );
        if !self.renderer.render_frame(self.session.as_mut(), self.surface.as_mut()) {
            self.fallback.update_frame(
                &self.standby_frame,
                STANDBY_FRAME_WIDTH,
                STANDBY_FRAME_HEIGHT,
            );
            self.fallback.render();
        }
    }

    fn blink_on(&self) -> bool {
        let elapsed = (self.clock.now() - self.epoch).as_millis();
        (elapsed / INFO_HINT_BLINK_PERIOD_MS) % 2 == 0
    }

    fn build_info_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(12);
        lines.push(if self.blink_on() {
            "PUSH RIGHT STICK TO CLOSE".to_string()
        } else {
            " ".to_string()
        });

        lines.push(format!("FPS: {:.1}", self.fps));

        if self.core.is_rom_loaded() {
            lines.push(format!("ROM: {}", basename_from_path(self.core.rom_label())));
        } else {
            lines.push("ROM: NONE".to_string());
        }

        lines.push("ROM PICKER: HIDE INFO + L3".to_string());
        lines.push(format!(
            "VIEW: {} (TOGGLE \"B\")",
            self.presentation.view_mode.name()
        ));

        if self.presentation.world_anchored() {
            lines.push("NAV (HOLD ANY GRIP)".to_string());
            lines.push("  L-STICK: MOVE".to_string());
            lines.push("  R-STICK: LOOK".to_string());
            lines.push("  L/R TRIGGER: UP/DOWN".to_string());
            lines.push("  A: RESET VIEW".to_string());
        }

        lines.push(format!("SCREEN SIZE: {:.2}", self.presentation.screen_scale));

        if !self.presentation.world_anchored() {
            lines.push(format!(
                "STEREO CONV: {:.3}",
                self.presentation.stereo_convergence
            ));
            lines.push("CALIB: HOLD L+R".to_string());
            lines.push("U/D SIZE, L/R CONV, A RESET".to_string());
        } else {
            lines.push("CALIB: HOLD L+R".to_string());
            lines.push("U/D SIZE, A RESET".to_string());
        }

        lines
    }

    fn compose_standby_frame(&mut self) {
        self.standby_frame.clear();
        self.standby_frame.resize(
            (STANDBY_FRAME_WIDTH * STANDBY_FRAME_HEIGHT) as usize,
            0xFF000000,
        );

        let side_by_side = STANDBY_FRAME_WIDTH >= STANDBY_FRAME_HEIGHT * 2;
        let eye_width = if side_by_side {
            STANDBY_FRAME_WIDTH / 2
        } else {
            STANDBY_FRAME_WIDTH
        };

        let draw_both_eyes = |frame: &mut Vec<u32>, text: &str, x: i32, y: i32| {
            draw_text(
                frame,
                STANDBY_FRAME_WIDTH,
                STANDBY_FRAME_HEIGHT,
                text,
                x,
                y,
                2,
                0xFFFFFFFF,
            );
            if side_by_side {
                draw_text(
                    frame,
                    STANDBY_FRAME_WIDTH,
                    STANDBY_FRAME_HEIGHT,
                    text,
                    x + eye_width,
                    y,
                    2,
                    0xFFFFFFFF,
                );
            }
        };

        let mut frame = std::mem::take(&mut self.standby_frame);
        draw_both_eyes(&mut frame, "NO ROM LOADED", 18, 18);
        if self.show_info_window {
            draw_both_eyes(&mut frame, "R3: HIDE INFO", 18, 40);
        } else {
            draw_both_eyes(&mut frame, "L3: OPEN ROM PICKER", 18, 40);
            draw_both_eyes(&mut frame, "R3: SHOW INFO", 18, 62);
        }

        if self.show_info_window {
            let lines = self.build_info_lines();
            draw_info_panel(
                &mut frame,
                STANDBY_FRAME_WIDTH,
                STANDBY_FRAME_HEIGHT,
                0,
                eye_width,
                &lines,
            );
            if side_by_side {
                draw_info_panel(
                    &mut frame,
                    STANDBY_FRAME_WIDTH,
                    STANDBY_FRAME_HEIGHT,
                    eye_width,
                    eye_width,
                    &lines,
                );
            }
        }
        self.standby_frame = frame;
    }

    fn update_fps(&mut self) {
        self.fps_frame_count += 1;
        let now = self.clock.now();
        let elapsed = now - self.fps_window_start;
        if elapsed >= Duration::from_secs(1) {
            let elapsed_ms = elapsed.as_millis();
            if elapsed_ms > 0 {
                self.fps = f64::from(self.fps_frame_count) * 1000.0 / elapsed_ms as f64;
            }
            self.fps_frame_count = 0;
            self.fps_window_start = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::emulator::ScriptedCore;
    use crate::input::ControllerState;
    use crate::vr::session::{HeadlessSession, RecordingSurface};

    struct Harness {
        app: App<ScriptedCore>,
        clock: Arc<TestClock>,
        settings: InMemorySettingsStore,
        controller: Arc<Mutex<ControllerState>>,
    }

    fn headless_app(core: ScriptedCore) -> Harness {
        let clock = Arc::new(TestClock::new());
        let settings = InMemorySettingsStore::new();
        let session = HeadlessSession::new();
        let controller = session.controller_handle();
        let app = App::new(
            core,
            Box::new(session),
            Box::new(RecordingSurface::new()),
            Box::new(NullRenderTarget::new()),
            Box::new(crate::audio::NullAudioOutput::new()),
            Box::new(CountingPicker::new()),
            Box::new(settings.clone()),
            clock.clone(),
        );
        Harness {
            app,
            clock,
            settings,
            controller,
        }
    }

    impl Harness {
        fn set_controller(&self, state: ControllerState) {
            *self.controller.lock().unwrap() = state;
        }
    }

    fn loaded_core() -> ScriptedCore {
        let mut core = ScriptedCore::new();
        core.initialize();
        assert!(core.load_rom_from_bytes(&[0u8; 32], "demo.vb"));
        core
    }

    #[test]
    fn test_tick_paces_to_frame_target() {
        let mut h = headless_app(loaded_core());
        h.app.start();

        // Under the test clock, tick work consumes no simulated time, so
        // the pacing logic sleeps the full frame interval.
        h.app.tick();
        let sleeps = h.clock.recorded_sleeps();
        assert_eq!(sleeps.len(), 1);
        assert_eq!(sleeps[0], FRAME_TARGET);

        for _ in 0..5 {
            h.app.tick();
        }
        assert_eq!(h.clock.recorded_sleeps().len(), 6);
        assert!(h.clock.recorded_sleeps().iter().all(|d| *d <= FRAME_TARGET));
    }

    #[test]
    fn test_rom_delivery_via_mailbox() {
        let mut core = ScriptedCore::new();
        core.initialize();
        let mut h = headless_app(core);
        h.app.start();
        assert!(!h.app.core().is_rom_loaded());

        let mailbox = h.app.rom_mailbox();
        mailbox.post(RomDelivery {
            bytes: vec![0u8; 64],
            name: "picked.vb".to_string(),
        });
        h.app.tick();
        assert!(h.app.core().is_rom_loaded());
        assert_eq!(h.app.core().rom_label(), "picked.vb");
    }

    #[test]
    fn test_standby_until_rom_loaded() {
        let mut core = ScriptedCore::new();
        core.initialize();
        let mut h = headless_app(core);
        h.app.start();

        h.app.tick();
        // Standby still renders through the XR path.
        assert!(!h.app.core().is_rom_loaded());
        assert!(h.app.renderer().debug_state().xr_active);
    }

    #[test]
    fn test_standby_frame_matches_fixed_dimensions() {
        let mut core = ScriptedCore::new();
        core.initialize();
        let mut h = headless_app(core);
        h.app.start();
        h.app.tick();

        assert_eq!(
            h.app.standby_frame.len(),
            (STANDBY_FRAME_WIDTH * STANDBY_FRAME_HEIGHT) as usize
        );
        // The standby text was painted into the frame.
        assert!(h.app.standby_frame.iter().any(|&p| p == 0xFFFFFFFF));
    }

    #[test]
    fn test_overlay_toggle_edge_via_right_thumb() {
        let mut h = headless_app(loaded_core());
        h.app.start();
        assert!(h.app.show_info_window());

        // Held across two ticks: fires once.
        h.set_controller(ControllerState {
            right_thumb_click: true,
            ..ControllerState::default()
        });
        h.app.tick();
        assert!(!h.app.show_info_window());
        h.app.tick();
        assert!(!h.app.show_info_window());

        h.set_controller(ControllerState::default());
        h.app.tick();
        h.set_controller(ControllerState {
            right_thumb_click: true,
            ..ControllerState::default()
        });
        h.app.tick();
        assert!(h.app.show_info_window());
    }

    #[test]
    fn test_calibration_persists_settings() {
        let mut h = headless_app(loaded_core());
        h.app.start();
        let before = h.app.presentation().screen_scale;

        // Overlay is visible by default; hold L+R and press up.
        h.app.set_physical_input(EmulatorButtons {
            l: true,
            r: true,
            up: true,
            ..EmulatorButtons::default()
        });
        h.app.tick();

        let after = h.app.presentation().screen_scale;
        assert!((after - before - crate::config::SCREEN_SCALE_STEP).abs() < 1e-6);
        let stored = h.settings.stored().expect("settings saved");
        let reloaded = PresentationConfig::from_settings_text(&stored);
        assert!((reloaded.screen_scale - after).abs() < 1e-4);
    }

    #[test]
    fn test_calibration_does_not_reach_emulator() {
        let mut h = headless_app(loaded_core());
        h.app.start();
        h.app.set_physical_input(EmulatorButtons {
            l: true,
            r: true,
            up: true,
            ..EmulatorButtons::default()
        });
        h.app.tick();
        // Directional and shoulder input was consumed by calibration.
        assert!(h.app.core().input_mask().is_empty());
    }

    #[test]
    fn test_depth_mode_follows_metadata() {
        let mut h = headless_app(loaded_core());
        h.app.start();
        assert!(!h.app.presentation().depth_metadata_enabled);

        h.app.tick();
        // Scripted core emits metadata, so depth mode switches on.
        assert!(h.app.presentation().depth_metadata_enabled);
        assert!(h.app.renderer().debug_state().depth_mode_enabled);
    }

    #[test]
    fn test_classic_path_without_metadata() {
        let core = {
            let mut c = ScriptedCore::new().without_metadata();
            c.initialize();
            assert!(c.load_rom_from_bytes(&[0u8; 32], "demo.vb"));
            c
        };
        let mut h = headless_app(core);
        h.app.start();
        h.app.tick();
        assert!(!h.app.presentation().depth_metadata_enabled);
        assert!(h.app.renderer().debug_state().used_classic);
    }

    #[test]
    fn test_walkthrough_consumes_gameplay_input() {
        let mut h = headless_app(loaded_core());
        h.app.start();
        // Hide the overlay so calibration stays out of the way.
        h.set_controller(ControllerState {
            right_thumb_click: true,
            ..ControllerState::default()
        });
        h.app.tick();
        assert!(!h.app.show_info_window());

        // Anchored mode is the default; grip + stick navigates.
        h.set_controller(ControllerState {
            left_grip: true,
            left_stick_y: 1.0,
            up: true,
            ..ControllerState::default()
        });
        h.app.tick();
        assert!(h.app.core().input_mask().is_empty());
        let debug = h.app.renderer().debug_state();
        assert!(debug.relative_z != 0.0);
    }

    #[test]
    fn test_auto_picker_requested_when_no_rom_found() {
        let mut core = ScriptedCore::new();
        core.initialize();
        let clock = Arc::new(TestClock::new());
        let picker = CountingPicker::new();
        let counter = picker.request_counter();
        let mut app = App::new(
            core,
            Box::new(HeadlessSession::new()),
            Box::new(RecordingSurface::new()),
            Box::new(NullRenderTarget::new()),
            Box::new(crate::audio::NullAudioOutput::new()),
            Box::new(picker),
            Box::new(InMemorySettingsStore::new()),
            clock,
        );
        app.start();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert!(app.picker_requested());

        // Retry cadence does not stack further auto requests while one is
        // pending.
        for _ in 0..(ROM_RELOAD_TICKS as usize + 2) {
            app.tick();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 1);

        // Dismissal clears the pending state.
        app.picker_dismissed_mailbox().post(());
        app.tick();
        assert!(!app.picker_requested());
    }
}
