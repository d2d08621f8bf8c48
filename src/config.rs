//! Presentation configuration and the persisted settings format.
//!
//! Settings are stored externally as whitespace-separated text:
//! `<screenScale> <stereoConvergence> [<viewMode>]`. Values are re-clamped
//! on every load and set, so a hand-edited or stale file can never push the
//! presentation out of range. File I/O belongs to the platform layer; this
//! module only encodes and decodes.

pub const MIN_SCREEN_SCALE: f32 = 0.20;
pub const MAX_SCREEN_SCALE: f32 = 1.00;
pub const MIN_STEREO_CONVERGENCE: f32 = -0.08;
pub const MAX_STEREO_CONVERGENCE: f32 = 0.08;
pub const SCREEN_SCALE_STEP: f32 = 0.03;
pub const STEREO_CONVERGENCE_STEP: f32 = 0.004;

pub const DEFAULT_SCREEN_SCALE: f32 = 0.62;
pub const DEFAULT_STEREO_CONVERGENCE: f32 = -0.04;

/// Classic is the flat head-locked presentation; Anchored pins the screen
/// into the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Classic,
    Anchored,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Classic => ViewMode::Anchored,
            ViewMode::Anchored => ViewMode::Classic,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ViewMode::Classic => "CLASSIC",
            ViewMode::Anchored => "ANCHORED",
        }
    }

    /// Wire encoding: zero or below is Classic, anything positive Anchored.
    /// Anchored serializes as 2 for compatibility with older settings files.
    pub fn from_persisted(value: i32) -> Self {
        if value <= 0 {
            ViewMode::Classic
        } else {
            ViewMode::Anchored
        }
    }

    pub fn to_persisted(self) -> i32 {
        match self {
            ViewMode::Classic => 0,
            ViewMode::Anchored => 2,
        }
    }
}

/// Presentation state mutated by calibration input and mode toggles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentationConfig {
    pub screen_scale: f32,
    pub stereo_convergence: f32,
    pub view_mode: ViewMode,
    pub depth_metadata_enabled: bool,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            screen_scale: DEFAULT_SCREEN_SCALE,
            stereo_convergence: DEFAULT_STEREO_CONVERGENCE,
            view_mode: ViewMode::Anchored,
            depth_metadata_enabled: false,
        }
    }
}

impl PresentationConfig {
    pub fn set_screen_scale(&mut self, value: f32) {
        self.screen_scale = value.clamp(MIN_SCREEN_SCALE, MAX_SCREEN_SCALE);
    }

    pub fn set_stereo_convergence(&mut self, value: f32) {
        self.stereo_convergence = value.clamp(MIN_STEREO_CONVERGENCE, MAX_STEREO_CONVERGENCE);
    }

    /// Restore scale and convergence to factory values; mode flags keep
    /// their current state.
    pub fn reset_presentation_defaults(&mut self) {
        self.screen_scale = DEFAULT_SCREEN_SCALE;
        self.stereo_convergence = DEFAULT_STEREO_CONVERGENCE;
    }

    pub fn world_anchored(&self) -> bool {
        self.view_mode == ViewMode::Anchored
    }

    /// Anchored mode pins both eyes to the same screen region, so the
    /// stereo convergence shift is suppressed there.
    pub fn effective_convergence(&self) -> f32 {
        if self.world_anchored() {
            0.0
        } else {
            self.stereo_convergence
        }
    }

    /// Parse the persisted settings text. Malformed or missing fields keep
    /// the defaults; parsed values are clamped back into range.
    pub fn from_settings_text(text: &str) -> Self {
        let mut config = Self::default();
        let mut fields = text.split_whitespace();

        let scale = fields.next().and_then(|s| s.parse::<f32>().ok());
        let convergence = fields.next().and_then(|s| s.parse::<f32>().ok());
        let (Some(scale), Some(convergence)) = (scale, convergence) else {
            return config;
        };

        config.set_screen_scale(scale);
        config.set_stereo_convergence(convergence);
        if let Some(mode) = fields.next().and_then(|s| s.parse::<i32>().ok()) {
            config.view_mode = ViewMode::from_persisted(mode);
        }
        config
    }

    /// Encode for persistence.
    pub fn to_settings_text(&self) -> String {
        format!(
            "{:.4} {:.4} {}\n",
            self.screen_scale,
            self.stereo_convergence,
            self.view_mode.to_persisted()
        )
    }
}
