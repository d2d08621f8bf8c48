//! Render path selection.
//!
//! The per-eye draw sequence picks one of four paths each frame. The
//! decision inputs are bundled into [`FrameConditions`] and resolved by a
//! single pure function so the policy can be tested without any drawing.

use super::layers::LayerInfo;

/// Everything the selection policy looks at for one eye, one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameConditions {
    /// Depth-based presentation requested by configuration.
    pub depth_metadata_enabled: bool,
    /// Metadata dimensions match the current color frame exactly.
    pub metadata_aligned: bool,
    /// Metadata is large enough to carry per-eye layer data.
    pub layer_data_ready: bool,
    /// The color frame is side-by-side stereo (width >= 2 * height).
    pub side_by_side: bool,
    /// The diagnostic overlay is composited into the frame.
    pub overlay_visible: bool,
    /// This eye has at least one extracted depth layer.
    pub eye_has_layers: bool,
    /// World-anchored classic mode requested by configuration.
    pub world_anchored: bool,
}

/// The chosen per-eye render path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    /// One masked billboard per world id, painted far-to-near.
    Layered,
    /// Single quad at a fixed plausible distance, full eye slice.
    DepthFallback,
    /// Single anchored quad transformed by head anchor + walkthrough.
    ClassicAnchored,
    /// Head-locked quad, UV-shifted by stereo convergence per eye.
    ClassicFlat,
}

/// Resolve the render path for one eye.
///
/// Layer rendering needs every precondition at once; depth mode without
/// them degrades to a flat card at a plausible distance rather than
/// failing. With depth mode off the classic paths apply.
pub fn select_render_path(c: &FrameConditions) -> RenderPath {
    if c.depth_metadata_enabled {
        let layered = c.metadata_aligned
            && c.layer_data_ready
            && c.side_by_side
            && !c.overlay_visible
            && c.eye_has_layers;
        if layered {
            return RenderPath::Layered;
        }
        return RenderPath::DepthFallback;
    }

    if c.world_anchored {
        RenderPath::ClassicAnchored
    } else {
        RenderPath::ClassicFlat
    }
}

/// Convenience for the renderer: conditions for one eye given its layers.
pub fn conditions_for_eye(mut base: FrameConditions, layers: &[LayerInfo]) -> FrameConditions {
    base.eye_has_layers = !layers.is_empty();
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_layered() -> FrameConditions {
        FrameConditions {
            depth_metadata_enabled: true,
            metadata_aligned: true,
            layer_data_ready: true,
            side_by_side: true,
            overlay_visible: false,
            eye_has_layers: true,
            world_anchored: false,
        }
    }

    #[test]
    fn test_layered_requires_every_precondition() {
        assert_eq!(select_render_path(&all_layered()), RenderPath::Layered);

        let mut c = all_layered();
        c.metadata_aligned = false;
        assert_eq!(select_render_path(&c), RenderPath::DepthFallback);

        let mut c = all_layered();
        c.layer_data_ready = false;
        assert_eq!(select_render_path(&c), RenderPath::DepthFallback);

        let mut c = all_layered();
        c.side_by_side = false;
        assert_eq!(select_render_path(&c), RenderPath::DepthFallback);

        let mut c = all_layered();
        c.overlay_visible = true;
        assert_eq!(select_render_path(&c), RenderPath::DepthFallback);

        let mut c = all_layered();
        c.eye_has_layers = false;
        assert_eq!(select_render_path(&c), RenderPath::DepthFallback);
    }

    #[test]
    fn test_classic_split_on_anchoring() {
        let c = FrameConditions {
            world_anchored: true,
            ..FrameConditions::default()
        };
        assert_eq!(select_render_path(&c), RenderPath::ClassicAnchored);

        let c = FrameConditions::default();
        assert_eq!(select_render_path(&c), RenderPath::ClassicFlat);
    }

    #[test]
    fn test_depth_mode_shadows_anchoring() {
        // Depth mode takes priority over the classic anchored flag.
        let mut c = all_layered();
        c.world_anchored = true;
        assert_eq!(select_render_path(&c), RenderPath::Layered);

        c.eye_has_layers = false;
        assert_eq!(select_render_path(&c), RenderPath::DepthFallback);
    }

    #[test]
    fn test_conditions_for_eye_sets_layer_flag() {
        use crate::vr::layers::LayerInfo;
        let base = FrameConditions::default();
        let layers = [LayerInfo { world_id: 1, z: 2.0 }];
        assert!(conditions_for_eye(base, &layers).eye_has_layers);
        assert!(!conditions_for_eye(base, &[]).eye_has_layers);
    }
}
