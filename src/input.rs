//! Controller state merging, edge-triggered actions, and the modal
//! calibration / walkthrough control layers.
//!
//! Per tick the host merges up to three input sources (platform buttons,
//! gamepad axes folded in by the platform layer, VR controller) into one
//! emulator button set. Mode toggles fire on down-edges only, and the
//! calibration and walkthrough layers consume the fields they intercept so
//! they never leak into emulated gameplay.

use tracing::info;

use crate::config::{PresentationConfig, SCREEN_SCALE_STEP, STEREO_CONVERGENCE_STEP};
use crate::emulator::EmulatorButtons;

pub const WALK_STICK_DEADZONE: f32 = 0.18;
pub const WALK_OFFSET_STEP: f32 = 0.022;
pub const WALK_OFFSET_LIMIT: f32 = 30.0;
pub const WALK_YAW_STEP: f32 = 0.045;
pub const WALK_PITCH_STEP: f32 = 0.035;
pub const WALK_PITCH_LIMIT: f32 = 1.20;

/// VR controller state as synced from the XR runtime each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerState {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
    pub l: bool,
    pub r: bool,
    pub left_grip: bool,
    pub right_grip: bool,
    pub left_stick_x: f32,
    pub left_stick_y: f32,
    pub right_stick_x: f32,
    pub right_stick_y: f32,
    pub left_thumb_click: bool,
    pub right_thumb_click: bool,
    pub start: bool,
    pub select: bool,
}

/// Merge the VR controller into the platform button state, OR per button.
pub fn merge_controller(base: &EmulatorButtons, xr: &ControllerState) -> EmulatorButtons {
    EmulatorButtons {
        left: base.left || xr.left,
        right: base.right || xr.right,
        up: base.up || xr.up,
        down: base.down || xr.down,
        a: base.a || xr.a,
        b: base.b || xr.b,
        l: base.l || xr.l,
        r: base.r || xr.r,
        start: base.start || xr.start,
        select: base.select || xr.select,
    }
}

/// Down-edge detector: fires once per false-to-true transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeTrigger {
    held: bool,
}

impl EdgeTrigger {
    pub fn rising(&mut self, pressed: bool) -> bool {
        let fired = pressed && !self.held;
        self.held = pressed;
        fired
    }

    /// Forget the held state, so the next press fires again.
    pub fn reset(&mut self) {
        self.held = false;
    }
}

/// What the calibration layer did this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalibrationOutcome {
    /// Scale/convergence changed; caller should re-apply and persist.
    pub changed: bool,
    /// The view mode was toggled; caller should re-apply and persist.
    pub view_mode_toggled: bool,
}

/// Modal calibration layer.
///
/// View-mode toggle: B down-edge while the info overlay is visible (B is
/// then consumed). Adjustments: only while both shoulders are held, each
/// edge-triggered per field so a held direction applies once per modifier
/// engagement. While the modifier is active every intercepted field is
/// zeroed before the buttons reach the emulator.
#[derive(Debug, Default)]
pub struct CalibrationLayer {
    adjust_up: EdgeTrigger,
    adjust_down: EdgeTrigger,
    adjust_left: EdgeTrigger,
    adjust_right: EdgeTrigger,
    adjust_reset: EdgeTrigger,
    view_toggle: EdgeTrigger,
}

impl CalibrationLayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset_adjust_edges(&mut self) {
        self.adjust_up.reset();
        self.adjust_down.reset();
        self.adjust_left.reset();
        self.adjust_right.reset();
        self.adjust_reset.reset();
    }

    pub fn apply(
        &mut self,
        config: &mut PresentationConfig,
        buttons: &mut EmulatorButtons,
        overlay_visible: bool,
    ) -> CalibrationOutcome {
        let mut outcome = CalibrationOutcome::default();

        if overlay_visible {
            if self.view_toggle.rising(buttons.b) {
                config.view_mode = config.view_mode.toggled();
                outcome.view_mode_toggled = true;
                info!("view mode: {}", config.view_mode.name());
            }
            buttons.b = false;
        } else {
            self.view_toggle.reset();
        }

        if !overlay_visible {
            self.reset_adjust_edges();
            return outcome;
        }

        let modifier_held = buttons.l && buttons.r;
        if !modifier_held {
            self.reset_adjust_edges();
            return outcome;
        }

        if self.adjust_up.rising(buttons.up) {
            config.set_screen_scale(config.screen_scale + SCREEN_SCALE_STEP);
            outcome.changed = true;
        }
        if self.adjust_down.rising(buttons.down) {
            config.set_screen_scale(config.screen_scale - SCREEN_SCALE_STEP);
            outcome.changed = true;
        }
        if self.adjust_right.rising(buttons.right) {
            config.set_stereo_convergence(config.stereo_convergence + STEREO_CONVERGENCE_STEP);
            outcome.changed = true;
        }
        if self.adjust_left.rising(buttons.left) {
            config.set_stereo_convergence(config.stereo_convergence - STEREO_CONVERGENCE_STEP);
            outcome.changed = true;
        }
        if self.adjust_reset.rising(buttons.a) {
            config.reset_presentation_defaults();
            outcome.changed = true;
        }

        if outcome.changed {
            info!(
                "calibration: scale={:.3} convergence={:.3}",
                config.screen_scale, config.stereo_convergence
            );
        }

        // Both shoulders held: calibration owns these controls.
        buttons.left = false;
        buttons.right = false;
        buttons.up = false;
        buttons.down = false;
        buttons.a = false;
        buttons.l = false;
        buttons.r = false;
        buttons.b = false;

        outcome
    }
}

/// Accumulated walkthrough navigation state.
///
/// Active only while a grip is held in anchored mode; stick input then
/// accumulates a yaw-rotated travel offset and look angles, and the
/// intercepted gameplay fields are consumed.
#[derive(Debug, Default)]
pub struct WalkthroughNav {
    pub offset_x: f32,
    pub offset_y: f32,
    pub offset_z: f32,
    pub yaw: f32,
    pub pitch: f32,
    reset_edge: EdgeTrigger,
}

impl WalkthroughNav {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero all accumulated offsets and angles.
    pub fn reset_home(&mut self) {
        self.offset_x = 0.0;
        self.offset_y = 0.0;
        self.offset_z = 0.0;
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.reset_edge.reset();
        info!("walkthrough home reset");
    }

    /// Integrate one tick of navigation input. Returns true when navigation
    /// was active (and gameplay fields were consumed).
    pub fn update(
        &mut self,
        xr: &ControllerState,
        buttons: &mut EmulatorButtons,
        anchored_mode: bool,
    ) -> bool {
        let grip_held = xr.left_grip || xr.right_grip;
        if !anchored_mode || !grip_held {
            self.reset_edge.reset();
            return false;
        }

        let deadzone = |value: f32| {
            if value > WALK_STICK_DEADZONE || value < -WALK_STICK_DEADZONE {
                value
            } else {
                0.0
            }
        };

        let strafe = deadzone(xr.left_stick_x);
        let forward = deadzone(xr.left_stick_y);
        let turn_yaw = deadzone(xr.right_stick_x);
        let turn_pitch = deadzone(xr.right_stick_y);
        let rise = (if xr.r { 1.0 } else { 0.0 }) - (if xr.l { 1.0 } else { 0.0 });

        self.yaw += turn_yaw * WALK_YAW_STEP;
        self.pitch = (self.pitch + turn_pitch * WALK_PITCH_STEP)
            .clamp(-WALK_PITCH_LIMIT, WALK_PITCH_LIMIT);

        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let delta_x = cos_yaw * strafe + sin_yaw * forward;
        let delta_z = sin_yaw * strafe - cos_yaw * forward;

        self.offset_x = (self.offset_x + delta_x * WALK_OFFSET_STEP)
            .clamp(-WALK_OFFSET_LIMIT, WALK_OFFSET_LIMIT);
        self.offset_y =
            (self.offset_y + rise * WALK_OFFSET_STEP).clamp(-WALK_OFFSET_LIMIT, WALK_OFFSET_LIMIT);
        self.offset_z = (self.offset_z + delta_z * WALK_OFFSET_STEP)
            .clamp(-WALK_OFFSET_LIMIT, WALK_OFFSET_LIMIT);

        if self.reset_edge.rising(xr.a) {
            self.reset_home();
        }

        // Grip held in anchored mode: controls drive navigation, not the
        // emulated game.
        buttons.left = false;
        buttons.right = false;
        buttons.up = false;
        buttons.down = false;
        buttons.a = false;
        buttons.l = false;
        buttons.r = false;

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewMode;

    fn held_buttons() -> EmulatorButtons {
        EmulatorButtons {
            l: true,
            r: true,
            ..EmulatorButtons::default()
        }
    }

    #[test]
    fn test_merge_is_or_per_button() {
        let base = EmulatorButtons {
            left: true,
            a: true,
            ..EmulatorButtons::default()
        };
        let xr = ControllerState {
            right: true,
            a: true,
            start: true,
            ..ControllerState::default()
        };
        let merged = merge_controller(&base, &xr);
        assert!(merged.left && merged.right && merged.a && merged.start);
        assert!(!merged.b && !merged.select);
    }

    #[test]
    fn test_edge_trigger_fires_once_while_held() {
        let mut edge = EdgeTrigger::default();
        let mut fired = 0;
        for _ in 0..10 {
            if edge.rising(true) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert!(!edge.rising(false));
        assert!(edge.rising(true));
    }

    #[test]
    fn test_scale_adjust_fires_once_per_engagement() {
        let mut layer = CalibrationLayer::new();
        let mut config = PresentationConfig::default();
        let start_scale = config.screen_scale;

        // Up held across several ticks with the modifier engaged: one step.
        for _ in 0..5 {
            let mut buttons = EmulatorButtons {
                up: true,
                ..held_buttons()
            };
            layer.apply(&mut config, &mut buttons, true);
        }
        let stepped = (config.screen_scale - start_scale).abs();
        assert!((stepped - SCREEN_SCALE_STEP).abs() < 1e-6);

        // Releasing the modifier resets the edge; next engagement steps
        // again even though up never went false.
        let mut buttons = EmulatorButtons {
            up: true,
            ..EmulatorButtons::default()
        };
        layer.apply(&mut config, &mut buttons, true);
        let mut buttons = EmulatorButtons {
            up: true,
            ..held_buttons()
        };
        layer.apply(&mut config, &mut buttons, true);
        let stepped = (config.screen_scale - start_scale).abs();
        assert!((stepped - 2.0 * SCREEN_SCALE_STEP).abs() < 1e-6);
    }

    #[test]
    fn test_scale_clamped_at_maximum() {
        let mut layer = CalibrationLayer::new();
        let mut config = PresentationConfig::default();
        config.set_screen_scale(10.0);
        assert_eq!(config.screen_scale, 1.0);

        let mut buttons = EmulatorButtons {
            up: true,
            ..held_buttons()
        };
        let outcome = layer.apply(&mut config, &mut buttons, true);
        assert!(outcome.changed);
        assert_eq!(config.screen_scale, 1.0);
    }

    #[test]
    fn test_calibration_consumes_inputs_while_modal() {
        let mut layer = CalibrationLayer::new();
        let mut config = PresentationConfig::default();
        let mut buttons = EmulatorButtons {
            up: true,
            left: true,
            a: true,
            ..held_buttons()
        };
        layer.apply(&mut config, &mut buttons, true);
        assert!(!buttons.up && !buttons.left && !buttons.a);
        assert!(!buttons.l && !buttons.r && !buttons.b);
        // Start/select pass through untouched.
        let mut buttons = EmulatorButtons {
            start: true,
            select: true,
            ..held_buttons()
        };
        layer.apply(&mut config, &mut buttons, true);
        assert!(buttons.start && buttons.select);
    }

    #[test]
    fn test_calibration_inactive_without_modifier() {
        let mut layer = CalibrationLayer::new();
        let mut config = PresentationConfig::default();
        let before = config.screen_scale;
        let mut buttons = EmulatorButtons {
            up: true,
            l: true,
            ..EmulatorButtons::default()
        };
        let outcome = layer.apply(&mut config, &mut buttons, true);
        assert!(!outcome.changed);
        assert_eq!(config.screen_scale, before);
        // Direction leaks through to gameplay when not modal.
        assert!(buttons.up);
    }

    #[test]
    fn test_view_toggle_requires_overlay_and_edges() {
        let mut layer = CalibrationLayer::new();
        let mut config = PresentationConfig::default();
        assert_eq!(config.view_mode, ViewMode::Anchored);

        // B without overlay: gameplay keeps it.
        let mut buttons = EmulatorButtons {
            b: true,
            ..EmulatorButtons::default()
        };
        let outcome = layer.apply(&mut config, &mut buttons, false);
        assert!(!outcome.view_mode_toggled);
        assert!(buttons.b);

        // B with overlay: toggles once and is consumed.
        let mut buttons = EmulatorButtons {
            b: true,
            ..EmulatorButtons::default()
        };
        let outcome = layer.apply(&mut config, &mut buttons, true);
        assert!(outcome.view_mode_toggled);
        assert!(!buttons.b);
        assert_eq!(config.view_mode, ViewMode::Classic);

        // Held across ticks: no repeat.
        let mut buttons = EmulatorButtons {
            b: true,
            ..EmulatorButtons::default()
        };
        let outcome = layer.apply(&mut config, &mut buttons, true);
        assert!(!outcome.view_mode_toggled);
        assert_eq!(config.view_mode, ViewMode::Classic);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut layer = CalibrationLayer::new();
        let mut config = PresentationConfig::default();
        config.set_screen_scale(0.9);
        config.set_stereo_convergence(0.05);

        let mut buttons = EmulatorButtons {
            a: true,
            ..held_buttons()
        };
        let outcome = layer.apply(&mut config, &mut buttons, true);
        assert!(outcome.changed);
        let defaults = PresentationConfig::default();
        assert_eq!(config.screen_scale, defaults.screen_scale);
        assert_eq!(config.stereo_convergence, defaults.stereo_convergence);
    }

    #[test]
    fn test_walkthrough_inactive_without_grip_or_anchor() {
        let mut nav = WalkthroughNav::new();
        let xr = ControllerState {
            left_stick_y: 1.0,
            ..ControllerState::default()
        };
        let mut buttons = EmulatorButtons::default();
        assert!(!nav.update(&xr, &mut buttons, true));
        assert_eq!(nav.offset_z, 0.0);

        let xr = ControllerState {
            left_grip: true,
            left_stick_y: 1.0,
            ..ControllerState::default()
        };
        assert!(!nav.update(&xr, &mut buttons, false));
        assert_eq!(nav.offset_z, 0.0);
    }

    #[test]
    fn test_walkthrough_forward_moves_negative_z() {
        let mut nav = WalkthroughNav::new();
        let xr = ControllerState {
            left_grip: true,
            left_stick_y: 1.0,
            ..ControllerState::default()
        };
        let mut buttons = EmulatorButtons {
            up: true,
            ..EmulatorButtons::default()
        };
        assert!(nav.update(&xr, &mut buttons, true));
        // Yaw zero: forward stick is -Z travel.
        assert!((nav.offset_z + WALK_OFFSET_STEP).abs() < 1e-6);
        assert_eq!(nav.offset_x, 0.0);
        // Gameplay directional input consumed while navigating.
        assert!(!buttons.up);
    }

    #[test]
    fn test_walkthrough_deadzone_filters_drift() {
        let mut nav = WalkthroughNav::new();
        let xr = ControllerState {
            left_grip: true,
            left_stick_x: 0.1,
            left_stick_y: -0.17,
            ..ControllerState::default()
        };
        let mut buttons = EmulatorButtons::default();
        assert!(nav.update(&xr, &mut buttons, true));
        assert_eq!(nav.offset_x, 0.0);
        assert_eq!(nav.offset_z, 0.0);
    }

    #[test]
    fn test_walkthrough_triggers_drive_vertical() {
        let mut nav = WalkthroughNav::new();
        let xr = ControllerState {
            right_grip: true,
            r: true,
            ..ControllerState::default()
        };
        let mut buttons = EmulatorButtons::default();
        nav.update(&xr, &mut buttons, true);
        assert!((nav.offset_y - WALK_OFFSET_STEP).abs() < 1e-6);

        let xr = ControllerState {
            right_grip: true,
            l: true,
            ..ControllerState::default()
        };
        nav.update(&xr, &mut buttons, true);
        assert!(nav.offset_y.abs() < 1e-6);
    }

    #[test]
    fn test_walkthrough_pitch_clamped() {
        let mut nav = WalkthroughNav::new();
        let xr = ControllerState {
            left_grip: true,
            right_stick_y: 1.0,
            ..ControllerState::default()
        };
        let mut buttons = EmulatorButtons::default();
        for _ in 0..100 {
            nav.update(&xr, &mut buttons, true);
        }
        assert!((nav.pitch - WALK_PITCH_LIMIT).abs() < 1e-6);
    }

    #[test]
    fn test_walkthrough_reset_edge() {
        let mut nav = WalkthroughNav::new();
        let mut buttons = EmulatorButtons::default();
        let travel = ControllerState {
            left_grip: true,
            left_stick_y: 1.0,
            ..ControllerState::default()
        };
        nav.update(&travel, &mut buttons, true);
        assert!(nav.offset_z != 0.0);

        let reset = ControllerState {
            left_grip: true,
            a: true,
            ..ControllerState::default()
        };
        nav.update(&reset, &mut buttons, true);
        assert_eq!(nav.offset_z, 0.0);
    }
}
