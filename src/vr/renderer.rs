//! Per-eye stereo compositor and render-mode state machine.
//!
//! Owns the presentation state (scale, convergence, mode flags, world
//! anchor, walkthrough transform), selects a render path per eye each
//! frame, and issues billboard draws through the [`DrawSurface`] seam.
//! Session failures are recorded as a string error and surfaced as a
//! `false` frame result; the caller falls back to a flat renderer.

use tracing::{debug, info, warn};

use crate::config::{
    MAX_SCREEN_SCALE, MAX_STEREO_CONVERGENCE, MIN_SCREEN_SCALE, MIN_STEREO_CONVERGENCE,
};
use crate::input::{WALK_OFFSET_LIMIT, WALK_PITCH_LIMIT};

use super::layers::{extract_eye_layers, layer_data_available, LayerInfo};
use super::math::{Mat4, Vec3};
use super::path::{conditions_for_eye, select_render_path, FrameConditions, RenderPath};
use super::session::{BillboardDraw, DrawSurface, SessionEvent, XrSession};

const DEPTH_FALLBACK_Z: f32 = 2.2;
const CLASSIC_ANCHORED_Z: f32 = 2.2;
const PROJECTION_NEAR_Z: f32 = 0.05;
const PROJECTION_FAR_Z: f32 = 100.0;

/// Snapshot of which render path executed this frame and why. Diagnostic
/// only; rebuilt every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderDebugState {
    pub xr_active: bool,
    pub frame_should_render: bool,
    pub depth_mode_enabled: bool,
    pub metadata_aligned: bool,
    pub layer_data_ready: bool,
    pub overlay_visible: bool,
    pub used_layer_rendering: bool,
    pub used_depth_fallback: bool,
    pub used_classic: bool,
    pub head_origin_set: bool,
    pub relative_x: f32,
    pub relative_y: f32,
    pub relative_z: f32,
}

pub struct StereoRenderer {
    screen_scale: f32,
    stereo_convergence: f32,
    depth_metadata_enabled: bool,
    world_anchored_enabled: bool,
    overlay_visible: bool,

    session_running: bool,
    exit_requested: bool,

    frame_ready: bool,
    frame_width: i32,
    frame_height: i32,
    side_by_side: bool,

    metadata_ready: bool,
    metadata_width: i32,
    metadata_height: i32,
    metadata_frame_id: u32,
    layer_data_ready: bool,
    eye_layers: [Vec<LayerInfo>; 2],

    head_origin: Option<Vec3>,
    walk_offset: Vec3,
    walk_yaw: f32,
    walk_pitch: f32,

    debug_state: RenderDebugState,
    last_error: String,
}

impl Default for StereoRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl StereoRenderer {
    pub fn new() -> Self {
        Self {
            screen_scale: 0.68,
            stereo_convergence: 0.016,
            depth_metadata_enabled: false,
            world_anchored_enabled: false,
            overlay_visible: false,
            session_running: false,
            exit_requested: false,
            frame_ready: false,
            frame_width: 0,
            frame_height: 0,
            side_by_side: false,
            metadata_ready: false,
            metadata_width: 0,
            metadata_height: 0,
            metadata_frame_id: 0,
            layer_data_ready: false,
            eye_layers: [Vec::new(), Vec::new()],
            head_origin: None,
            walk_offset: Vec3::ZERO,
            walk_yaw: 0.0,
            walk_pitch: 0.0,
            debug_state: RenderDebugState::default(),
            last_error: String::new(),
        }
    }

    fn set_error(&mut self, context: &str, detail: &str) {
        self.last_error = format!("{context} failed: {detail}");
        warn!("{}", self.last_error);
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn session_running(&self) -> bool {
        self.session_running
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn debug_state(&self) -> RenderDebugState {
        self.debug_state
    }

    pub fn screen_scale(&self) -> f32 {
        self.screen_scale
    }

    pub fn stereo_convergence(&self) -> f32 {
        self.stereo_convergence
    }

    /// Id of the metadata frame currently uploaded, for diagnostics.
    pub fn metadata_frame_id(&self) -> u32 {
        self.metadata_frame_id
    }

    // ── Presentation state ───────────────────────────────────

    pub fn set_presentation_config(&mut self, screen_scale: f32, stereo_convergence: f32) {
        self.screen_scale = screen_scale.clamp(MIN_SCREEN_SCALE, MAX_SCREEN_SCALE);
        self.stereo_convergence =
            stereo_convergence.clamp(MIN_STEREO_CONVERGENCE, MAX_STEREO_CONVERGENCE);
    }

    pub fn set_depth_metadata_enabled(&mut self, enabled: bool) {
        if enabled && !self.depth_metadata_enabled {
            // Re-capture the world anchor on the next rendered frame.
            self.head_origin = None;
        }
        self.depth_metadata_enabled = enabled;
    }

    pub fn set_world_anchored_enabled(&mut self, enabled: bool) {
        if enabled && !self.world_anchored_enabled {
            self.head_origin = None;
        }
        self.world_anchored_enabled = enabled;
    }

    pub fn reset_world_anchor(&mut self) {
        self.head_origin = None;
    }

    pub fn set_overlay_visible(&mut self, visible: bool) {
        self.overlay_visible = visible;
    }

    pub fn set_walkthrough_offset(&mut self, x: f32, y: f32, z: f32) {
        self.walk_offset = Vec3::new(
            x.clamp(-WALK_OFFSET_LIMIT, WALK_OFFSET_LIMIT),
            y.clamp(-WALK_OFFSET_LIMIT, WALK_OFFSET_LIMIT),
            z.clamp(-WALK_OFFSET_LIMIT, WALK_OFFSET_LIMIT),
        );
    }

    pub fn set_walkthrough_rotation(&mut self, yaw: f32, pitch: f32) {
        self.walk_yaw = yaw;
        self.walk_pitch = pitch.clamp(-WALK_PITCH_LIMIT, WALK_PITCH_LIMIT);
    }

    // ── Frame data ───────────────────────────────────────────

    /// Upload this tick's color frame. A frame at least twice as wide as it
    /// is tall is treated as side-by-side stereo.
    pub fn update_frame(
        &mut self,
        surface: &mut dyn DrawSurface,
        pixels: &[u32],
        width: i32,
        height: i32,
    ) {
        if pixels.is_empty() || width <= 0 || height <= 0 {
            return;
        }
        self.frame_width = width;
        self.frame_height = height;
        self.frame_ready = true;
        self.side_by_side = width >= height * 2;
        surface.upload_frame(pixels, width, height);
    }

    /// Upload this tick's depth metadata and rebuild the per-eye layer
    /// lists. Invalid input clears all metadata state.
    pub fn update_depth_metadata(
        &mut self,
        surface: &mut dyn DrawSurface,
        disparity: &[i8],
        world_ids: &[u8],
        width: i32,
        height: i32,
        frame_id: u32,
    ) {
        let pixel_count = (width.max(0) as usize) * (height.max(0) as usize);
        if width <= 0
            || height <= 0
            || disparity.len() < pixel_count
            || world_ids.len() < pixel_count
        {
            self.metadata_ready = false;
            self.layer_data_ready = false;
            self.metadata_width = 0;
            self.metadata_height = 0;
            self.eye_layers[0].clear();
            self.eye_layers[1].clear();
            return;
        }

        self.metadata_width = width;
        self.metadata_height = height;
        self.metadata_frame_id = frame_id;
        self.metadata_ready = true;
        self.layer_data_ready = layer_data_available(width, height);

        surface.upload_world_mask(world_ids, width, height);

        self.eye_layers[0].clear();
        self.eye_layers[1].clear();
        if !self.layer_data_ready {
            return;
        }
        for eye in 0..2 {
            self.eye_layers[eye] = extract_eye_layers(disparity, world_ids, width, eye);
        }
        debug!(
            "metadata frame {}: {} left layers, {} right layers",
            frame_id,
            self.eye_layers[0].len(),
            self.eye_layers[1].len()
        );
    }

    // ── Frame loop ───────────────────────────────────────────

    /// Process session-state transitions and input sync. Must run before
    /// `render_frame` each tick (render_frame also calls it).
    pub fn poll_events(&mut self, session: &mut dyn XrSession) {
        for event in session.poll_events() {
            match event {
                SessionEvent::Ready => self.begin_session(),
                SessionEvent::Stopping => self.end_session(),
                SessionEvent::ExitRequested => {
                    self.exit_requested = true;
                }
            }
        }
    }

    fn begin_session(&mut self) {
        self.head_origin = None;
        self.walk_offset = Vec3::ZERO;
        self.walk_yaw = 0.0;
        self.walk_pitch = 0.0;
        self.layer_data_ready = false;
        self.eye_layers[0].clear();
        self.eye_layers[1].clear();
        self.debug_state = RenderDebugState {
            xr_active: true,
            ..RenderDebugState::default()
        };
        self.session_running = true;
        info!("XR session running");
    }

    fn end_session(&mut self) {
        if !self.session_running {
            return;
        }
        self.session_running = false;
        self.debug_state.xr_active = false;
        info!("XR session stopped");
    }

    /// Render both eyes. Returns false when the session is not running or a
    /// frame-level call failed; the caller should present on its fallback
    /// target instead.
    pub fn render_frame(
        &mut self,
        session: &mut dyn XrSession,
        surface: &mut dyn DrawSurface,
    ) -> bool {
        self.poll_events(session);
        if !self.session_running {
            self.debug_state.xr_active = false;
            return false;
        }

        self.debug_state = RenderDebugState {
            xr_active: true,
            depth_mode_enabled: self.depth_metadata_enabled,
            overlay_visible: self.overlay_visible,
            head_origin_set: self.head_origin.is_some(),
            layer_data_ready: self.layer_data_ready,
            ..RenderDebugState::default()
        };

        let timing = match session.wait_frame() {
            Ok(timing) => timing,
            Err(e) => {
                self.set_error("wait_frame", &e.0);
                return false;
            }
        };
        self.debug_state.frame_should_render = timing.should_render;

        let mut submitted = false;
        if timing.should_render {
            match session.locate_views() {
                Ok(views) => {
                    self.draw_views(surface, &views);
                    submitted = true;
                }
                Err(e) => {
                    self.set_error("locate_views", &e.0);
                }
            }
        }

        if let Err(e) = session.end_frame(submitted) {
            self.set_error("end_frame", &e.0);
            return false;
        }
        true
    }

    fn draw_views(
        &mut self,
        surface: &mut dyn DrawSurface,
        views: &[super::session::EyeView; 2],
    ) {
        if self.head_origin.is_none() {
            // Anchor on the eye-averaged head position; subsequent frames
            // render relative to this frozen origin.
            let center = Vec3::new(
                (views[0].pose.position.x + views[1].pose.position.x) * 0.5,
                (views[0].pose.position.y + views[1].pose.position.y) * 0.5,
                (views[0].pose.position.z + views[1].pose.position.z) * 0.5,
            );
            self.head_origin = Some(center);
            self.debug_state.head_origin_set = true;
            debug!(
                "world anchor captured at ({:.3}, {:.3}, {:.3})",
                center.x, center.y, center.z
            );
        }
        let anchor = self.head_origin.unwrap_or(Vec3::ZERO);

        self.debug_state.relative_x = self.walk_offset.x;
        self.debug_state.relative_y = self.walk_offset.y;
        self.debug_state.relative_z = self.walk_offset.z;

        let metadata_aligned = self.metadata_ready
            && self.metadata_width == self.frame_width
            && self.metadata_height == self.frame_height;
        self.debug_state.metadata_aligned = metadata_aligned;

        let base_conditions = FrameConditions {
            depth_metadata_enabled: self.depth_metadata_enabled,
            metadata_aligned,
            layer_data_ready: self.layer_data_ready,
            side_by_side: self.side_by_side,
            overlay_visible: self.overlay_visible,
            eye_has_layers: false,
            world_anchored: self.world_anchored_enabled,
        };

        // Head anchor, then walkthrough look, then walkthrough travel.
        let walk_rotation = Mat4::rotation_y(-self.walk_yaw)
            .multiply(&Mat4::rotation_x(-self.walk_pitch));
        let navigation = Mat4::translation(anchor.x, anchor.y, anchor.z).multiply(
            &walk_rotation.multiply(&Mat4::translation(
                -self.walk_offset.x,
                -self.walk_offset.y,
                -self.walk_offset.z,
            )),
        );

        for (eye, view) in views.iter().enumerate() {
            if let Err(e) = surface.begin_eye(eye) {
                self.set_error("begin_eye", &e.0);
                continue;
            }

            if self.frame_ready {
                let projection =
                    Mat4::perspective_from_fov(&view.fov, PROJECTION_NEAR_Z, PROJECTION_FAR_Z);
                let view_matrix = Mat4::view_from_pose(&view.pose);
                let path =
                    select_render_path(&conditions_for_eye(base_conditions, &self.eye_layers[eye]));
                if let Err(e) =
                    self.draw_eye(surface, eye, path, &navigation, &view_matrix, &projection)
                {
                    self.set_error("draw_billboard", &e.0);
                }
            }

            if let Err(e) = surface.end_eye(eye) {
                self.set_error("end_eye", &e.0);
            }
        }
    }

    fn draw_eye(
        &mut self,
        surface: &mut dyn DrawSurface,
        eye: usize,
        path: RenderPath,
        navigation: &Mat4,
        view: &Mat4,
        projection: &Mat4,
    ) -> Result<(), super::session::FrameError> {
        let screen_scale = self.screen_scale;
        let side_by_side = self.side_by_side;

        let anchored_billboard = move |z: f32| {
            let half_size = screen_scale * z;
            let model = navigation.multiply(
                &Mat4::translation(0.0, 0.0, -z).multiply(&Mat4::scale(half_size, half_size, 1.0)),
            );
            projection.multiply(&view.multiply(&model))
        };

        let eye_slice_uv = move |convergence: f32| -> ([f32; 2], [f32; 2]) {
            if side_by_side {
                let left_offset = convergence;
                let right_offset = 0.5 - convergence;
                (
                    [0.5, 1.0],
                    [if eye == 0 { left_offset } else { right_offset }, 0.0],
                )
            } else {
                ([1.0, 1.0], [0.0, 0.0])
            }
        };

        match path {
            RenderPath::Layered => {
                if eye == 0 {
                    self.debug_state.used_layer_rendering = true;
                }
                // No depth buffer in this path; painter order does the
                // occlusion, so the layer list must stay far-to-near.
                let layers = self.eye_layers[eye].clone();
                for layer in &layers {
                    surface.draw_billboard(
                        eye,
                        &BillboardDraw {
                            mvp: anchored_billboard(layer.z),
                            uv_scale: [0.5, 1.0],
                            uv_offset: [if eye == 0 { 0.0 } else { 0.5 }, 0.0],
                            world_mask: Some(layer.world_id),
                        },
                    )?;
                }
            }
            RenderPath::DepthFallback => {
                if eye == 0 {
                    self.debug_state.used_depth_fallback = true;
                }
                let (uv_scale, uv_offset) = eye_slice_uv(0.0);
                surface.draw_billboard(
                    eye,
                    &BillboardDraw {
                        mvp: anchored_billboard(DEPTH_FALLBACK_Z),
                        uv_scale,
                        uv_offset,
                        world_mask: None,
                    },
                )?;
            }
            RenderPath::ClassicAnchored => {
                if eye == 0 {
                    self.debug_state.used_classic = true;
                }
                let (uv_scale, uv_offset) = eye_slice_uv(self.stereo_convergence);
                surface.draw_billboard(
                    eye,
                    &BillboardDraw {
                        mvp: anchored_billboard(CLASSIC_ANCHORED_Z),
                        uv_scale,
                        uv_offset,
                        world_mask: None,
                    },
                )?;
            }
            RenderPath::ClassicFlat => {
                if eye == 0 {
                    self.debug_state.used_classic = true;
                }
                let (uv_scale, uv_offset) = eye_slice_uv(self.stereo_convergence);
                surface.draw_billboard(
                    eye,
                    &BillboardDraw {
                        // Head-locked: scale only, no view or projection.
                        mvp: Mat4::scale(self.screen_scale, self.screen_scale, 1.0),
                        uv_scale,
                        uv_offset,
                        world_mask: None,
                    },
                )?;
            }
        }
        Ok(())
    }
}
