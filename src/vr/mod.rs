//! Stereo VR presentation pipeline.
//!
//! Depth reconstruction (`depth`, `mapping`, `world_mesh`, `layers`), the
//! render-mode state machine (`path`, `renderer`), the math toolkit
//! (`math`), and the session/draw seams (`session`).

pub mod depth;
pub mod layers;
pub mod mapping;
pub mod math;
pub mod path;
pub mod renderer;
pub mod session;
pub mod world_mesh;
