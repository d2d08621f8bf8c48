//! XR session and draw-surface seams.
//!
//! The renderer drives two traits: [`XrSession`] for frame lifecycle and
//! per-eye poses, and [`DrawSurface`] for texture upload and billboard
//! submission. The real OpenXR/EGL plumbing lives behind these traits in
//! platform crates; this module ships headless implementations so the host
//! runs (and is tested) without a headset, in the same spirit as the
//! compositor's headless backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

use super::math::{Fov, Mat4, Pose, Quat, Vec3};
use crate::input::ControllerState;

/// Average inter-pupillary distance used by the headless session, meters.
const HEADLESS_IPD: f32 = 0.063;

/// Fatal-for-the-subsystem setup failures. The caller falls back to a
/// simpler renderer; these never abort the process.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("XR runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("XR session creation failed: {0}")]
    SessionCreation(String),
    #[error("swapchain creation failed: {0}")]
    SwapchainCreation(String),
    #[error("graphics context creation failed: {0}")]
    GraphicsContext(String),
}

/// Per-frame failure: recorded as a string, the frame (or eye) is skipped,
/// and the loop continues.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct FrameError(pub String);

/// Session lifecycle transitions surfaced by `poll_events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Session is ready; rendering may begin.
    Ready,
    /// Session is stopping; rendering must pause.
    Stopping,
    /// Runtime requested application exit.
    ExitRequested,
}

/// One eye's view for this frame.
#[derive(Debug, Clone, Copy)]
pub struct EyeView {
    pub pose: Pose,
    pub fov: Fov,
}

/// Frame timing handed back by `wait_frame`.
#[derive(Debug, Clone, Copy)]
pub struct FrameTiming {
    /// When false, the compositor will not show this frame; the renderer
    /// still completes the frame protocol but skips drawing.
    pub should_render: bool,
}

/// XR frame lifecycle. `poll_events` must be called before `wait_frame`
/// each tick; it also syncs controller input for the tick.
pub trait XrSession {
    fn poll_events(&mut self) -> Vec<SessionEvent>;
    fn wait_frame(&mut self) -> Result<FrameTiming, FrameError>;
    fn locate_views(&mut self) -> Result<[EyeView; 2], FrameError>;
    fn end_frame(&mut self, submitted: bool) -> Result<(), FrameError>;
    /// Controller state as of the last `poll_events`.
    fn controller_state(&self) -> ControllerState;
}

/// Billboard draw parameters for one quad (or mesh slice).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BillboardDraw {
    pub mvp: Mat4,
    pub uv_scale: [f32; 2],
    pub uv_offset: [f32; 2],
    /// When set, only pixels whose world-id texture matches draw.
    pub world_mask: Option<u8>,
}

/// Texture upload + per-eye draw submission.
pub trait DrawSurface {
    fn upload_frame(&mut self, pixels: &[u32], width: i32, height: i32);
    fn upload_world_mask(&mut self, world_ids: &[u8], width: i32, height: i32);
    fn begin_eye(&mut self, eye: usize) -> Result<(), FrameError>;
    fn draw_billboard(&mut self, eye: usize, draw: &BillboardDraw) -> Result<(), FrameError>;
    fn end_eye(&mut self, eye: usize) -> Result<(), FrameError>;
}

// ── Headless implementations ─────────────────────────────────

/// Session double with fixed eye poses and scriptable events. Serves as the
/// production backend for headless runs and as the test harness session.
pub struct HeadlessSession {
    pending_events: VecDeque<SessionEvent>,
    head_position: Vec3,
    head_yaw: f32,
    should_render: bool,
    frames_waited: u64,
    controller: Arc<Mutex<ControllerState>>,
}

impl HeadlessSession {
    /// A session that reports `Ready` on the first poll.
    pub fn new() -> Self {
        let mut pending_events = VecDeque::new();
        pending_events.push_back(SessionEvent::Ready);
        Self {
            pending_events,
            head_position: Vec3::new(0.0, 1.6, 0.0),
            head_yaw: 0.0,
            should_render: true,
            frames_waited: 0,
            controller: Arc::new(Mutex::new(ControllerState::default())),
        }
    }

    /// Shared handle for injecting controller state (scripted input).
    /// Writes through this handle are visible on the next tick.
    pub fn controller_handle(&self) -> Arc<Mutex<ControllerState>> {
        Arc::clone(&self.controller)
    }

    /// Queue a session event for the next poll.
    pub fn push_event(&mut self, event: SessionEvent) {
        self.pending_events.push_back(event);
    }

    /// Move the simulated head (test hook for anchor/walkthrough checks).
    pub fn set_head(&mut self, position: Vec3, yaw: f32) {
        self.head_position = position;
        self.head_yaw = yaw;
    }

    pub fn set_should_render(&mut self, should_render: bool) {
        self.should_render = should_render;
    }

    pub fn frames_waited(&self) -> u64 {
        self.frames_waited
    }
}

impl Default for HeadlessSession {
    fn default() -> Self {
        Self::new()
    }
}

impl XrSession for HeadlessSession {
    fn poll_events(&mut self) -> Vec<SessionEvent> {
        self.pending_events.drain(..).collect()
    }

    fn wait_frame(&mut self) -> Result<FrameTiming, FrameError> {
        self.frames_waited += 1;
        Ok(FrameTiming {
            should_render: self.should_render,
        })
    }

    fn locate_views(&mut self) -> Result<[EyeView; 2], FrameError> {
        let orientation = Quat::from_yaw(self.head_yaw);
        let fov = Fov::symmetric(std::f32::consts::FRAC_PI_4);
        let eye = |offset: f32| EyeView {
            pose: Pose {
                position: Vec3::new(
                    self.head_position.x + offset,
                    self.head_position.y,
                    self.head_position.z,
                ),
                orientation,
            },
            fov,
        };
        Ok([eye(-HEADLESS_IPD / 2.0), eye(HEADLESS_IPD / 2.0)])
    }

    fn end_frame(&mut self, _submitted: bool) -> Result<(), FrameError> {
        Ok(())
    }

    fn controller_state(&self) -> ControllerState {
        *self.controller.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A draw call captured by [`RecordingSurface`].
#[derive(Debug, Clone)]
pub struct RecordedDraw {
    pub eye: usize,
    pub draw: BillboardDraw,
}

/// Surface that records uploads and draws instead of touching a GPU.
#[derive(Default)]
pub struct RecordingSurface {
    pub frame_uploads: u64,
    pub mask_uploads: u64,
    pub last_frame_size: (i32, i32),
    pub draws: Vec<RecordedDraw>,
    /// When set, `begin_eye` for this eye fails, exercising the
    /// skip-one-eye error path.
    pub fail_eye: Option<usize>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draws_for_eye(&self, eye: usize) -> impl Iterator<Item = &RecordedDraw> {
        self.draws.iter().filter(move |d| d.eye == eye)
    }

    pub fn clear(&mut self) {
        self.draws.clear();
    }
}

impl DrawSurface for RecordingSurface {
    fn upload_frame(&mut self, _pixels: &[u32], width: i32, height: i32) {
        self.frame_uploads += 1;
        self.last_frame_size = (width, height);
    }

    fn upload_world_mask(&mut self, _world_ids: &[u8], width: i32, height: i32) {
        self.mask_uploads += 1;
        debug!("world mask upload {}x{}", width, height);
    }

    fn begin_eye(&mut self, eye: usize) -> Result<(), FrameError> {
        if self.fail_eye == Some(eye) {
            return Err(FrameError(format!("begin_eye({eye}) failed")));
        }
        Ok(())
    }

    fn draw_billboard(&mut self, eye: usize, draw: &BillboardDraw) -> Result<(), FrameError> {
        self.draws.push(RecordedDraw { eye, draw: *draw });
        Ok(())
    }

    fn end_eye(&mut self, _eye: usize) -> Result<(), FrameError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_session_reports_ready_once() {
        let mut session = HeadlessSession::new();
        let events = session.poll_events();
        assert_eq!(events, vec![SessionEvent::Ready]);
        assert!(session.poll_events().is_empty());
    }

    #[test]
    fn test_headless_views_are_ipd_separated() {
        let mut session = HeadlessSession::new();
        let views = session.locate_views().unwrap();
        let dx = views[1].pose.position.x - views[0].pose.position.x;
        assert!((dx - HEADLESS_IPD).abs() < 1e-6);
    }

    #[test]
    fn test_recording_surface_captures_draws() {
        let mut surface = RecordingSurface::new();
        surface.upload_frame(&[0; 4], 2, 2);
        assert_eq!(surface.frame_uploads, 1);
        assert_eq!(surface.last_frame_size, (2, 2));

        surface.begin_eye(0).unwrap();
        surface
            .draw_billboard(
                0,
                &BillboardDraw {
                    mvp: Mat4::IDENTITY,
                    uv_scale: [1.0, 1.0],
                    uv_offset: [0.0, 0.0],
                    world_mask: None,
                },
            )
            .unwrap();
        surface.end_eye(0).unwrap();
        assert_eq!(surface.draws_for_eye(0).count(), 1);
        assert_eq!(surface.draws_for_eye(1).count(), 0);
    }

    #[test]
    fn test_recording_surface_eye_failure() {
        let mut surface = RecordingSurface::new();
        surface.fail_eye = Some(1);
        assert!(surface.begin_eye(0).is_ok());
        assert!(surface.begin_eye(1).is_err());
    }

    #[test]
    fn test_controller_handle_injects_state() {
        let session = HeadlessSession::new();
        let handle = session.controller_handle();
        assert!(!session.controller_state().a);

        handle.lock().unwrap().a = true;
        assert!(session.controller_state().a);
    }
}
