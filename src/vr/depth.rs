//! Disparity-to-depth reconstruction and depth mesh generation.
//!
//! Maps per-pixel stereo disparity to metric depth via the standard
//! triangulation formula, and samples a disparity map on a uniform grid to
//! build a textured mesh the renderer can place in front of the viewer.

use tracing::debug;

/// Tunable camera/scene parameters for depth reconstruction.
///
/// Mutated only through [`DepthReconstructor::set_config`], which re-clamps
/// every field to its valid range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthReconstructionConfig {
    /// Focal length of the virtual stereo camera, in pixels.
    pub focal_length_px: f32,
    /// Stereo baseline (inter-camera distance), in meters.
    pub baseline_meters: f32,
    /// Constant subtracted from |disparity| before triangulation.
    pub disparity_bias_px: f32,
    /// Disparity below this (after bias) maps to the far plane.
    pub min_disparity_px: f32,
    pub near_z: f32,
    pub far_z: f32,
    /// Extra distance pushing the whole mesh away from the viewer.
    pub base_distance_meters: f32,
    pub grid_step_x: i32,
    pub grid_step_y: i32,
}

impl Default for DepthReconstructionConfig {
    fn default() -> Self {
        Self {
            focal_length_px: 250.0,
            baseline_meters: 0.064,
            disparity_bias_px: 0.0,
            min_disparity_px: 0.30,
            near_z: 0.45,
            far_z: 8.5,
            base_distance_meters: 1.25,
            grid_step_x: 8,
            grid_step_y: 2,
        }
    }
}

/// Output mesh: interleaved x,y,z,u,v vertices and u16 triangle indices.
///
/// Rebuilt every frame that uses mesh-based reconstruction; holds no
/// identity across frames.
#[derive(Debug, Clone, Default)]
pub struct DepthMeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u16>,
    pub grid_columns: i32,
    pub grid_rows: i32,
    pub valid: bool,
}

/// Index width ceiling: a mesh must stay strictly below this vertex count.
pub const MAX_MESH_VERTICES: usize = 65535;

/// Floats per vertex (position xyz + uv).
pub const VERTEX_STRIDE: usize = 5;

pub struct DepthReconstructor {
    config: DepthReconstructionConfig,
}

impl Default for DepthReconstructor {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthReconstructor {
    pub fn new() -> Self {
        Self {
            config: DepthReconstructionConfig::default(),
        }
    }

    /// Replace the configuration, clamping every field to its valid range.
    pub fn set_config(&mut self, config: DepthReconstructionConfig) {
        let mut c = config;
        c.focal_length_px = c.focal_length_px.max(1.0);
        c.baseline_meters = c.baseline_meters.max(0.001);
        c.min_disparity_px = c.min_disparity_px.max(0.001);
        c.near_z = c.near_z.max(0.01);
        c.far_z = c.far_z.max(c.near_z + 0.01);
        c.grid_step_x = c.grid_step_x.max(1);
        c.grid_step_y = c.grid_step_y.max(1);
        self.config = c;
    }

    pub fn config(&self) -> &DepthReconstructionConfig {
        &self.config
    }

    /// Stereo triangulation: disparity in pixels to metric depth.
    ///
    /// Low-confidence disparity (below the minimum after bias) maps to the
    /// far plane, so indistinct regions recede instead of looming.
    pub fn reconstruct_depth_meters(&self, disparity_px: f32) -> f32 {
        let effective = disparity_px.abs() - self.config.disparity_bias_px;
        if effective < self.config.min_disparity_px {
            return self.config.far_z;
        }

        let z = (self.config.focal_length_px * self.config.baseline_meters)
            / effective.max(0.001);
        z.clamp(self.config.near_z, self.config.far_z)
    }

    /// Build a textured depth mesh by sampling `disparity` on a uniform grid.
    ///
    /// `disparity` is one signed byte per pixel, `disparity_width` pixels per
    /// row. Sampling starts at `disparity_offset_x` and covers
    /// `sample_width` x `sample_height` pixels; the last grid row/column is
    /// clamped onto the sample boundary so the mesh reaches the edges
    /// exactly. UVs are remapped through `uv_offset_x`/`uv_scale_x` to
    /// address one eye's slice of a side-by-side texture.
    ///
    /// Returns false (leaving `out` empty) on invalid input or when the
    /// vertex count would reach the u16 index ceiling.
    #[allow(clippy::too_many_arguments)]
    pub fn build_mesh(
        &self,
        disparity: &[i8],
        disparity_width: i32,
        disparity_height: i32,
        disparity_offset_x: i32,
        sample_width: i32,
        sample_height: i32,
        uv_offset_x: f32,
        uv_scale_x: f32,
        out: &mut DepthMeshData,
    ) -> bool {
        *out = DepthMeshData::default();
        if disparity.is_empty()
            || disparity_width <= 1
            || disparity_height <= 1
            || sample_width <= 1
            || sample_height <= 1
            || sample_height > disparity_height
            || disparity_offset_x < 0
            || disparity_offset_x + sample_width > disparity_width
            || disparity.len() < (disparity_width as usize) * (disparity_height as usize)
        {
            return false;
        }

        let cols = ((sample_width - 1) / self.config.grid_step_x) + 1;
        let rows = ((sample_height - 1) / self.config.grid_step_y) + 1;
        if cols <= 1 || rows <= 1 {
            return false;
        }

        let vertex_count = (cols as usize) * (rows as usize);
        if vertex_count >= MAX_MESH_VERTICES {
            debug!(
                "depth mesh rejected: {} vertices exceeds u16 index space",
                vertex_count
            );
            return false;
        }

        out.grid_columns = cols;
        out.grid_rows = rows;
        out.vertices.resize(vertex_count * VERTEX_STRIDE, 0.0);

        let cx = (sample_width - 1) as f32 * 0.5;
        let cy = (sample_height - 1) as f32 * 0.5;
        let inv_sample_width = 1.0 / (sample_width - 1) as f32;
        let inv_sample_height = 1.0 / (sample_height - 1) as f32;

        let mut prev_z = self.config.far_z;
        for gy in 0..rows {
            let py = (gy * self.config.grid_step_y).min(sample_height - 1);
            for gx in 0..cols {
                let px = (gx * self.config.grid_step_x).min(sample_width - 1);
                let sample_index = (py as usize) * (disparity_width as usize)
                    + (disparity_offset_x + px) as usize;
                let disparity_px = f32::from(disparity[sample_index]);

                let mut z = self.reconstruct_depth_meters(disparity_px);
                if !z.is_finite() {
                    // Hold the last good value so one corrupt sample does
                    // not tear the mesh.
                    z = prev_z;
                }
                prev_z = z;

                let x_meters = (px as f32 - cx) * z / self.config.focal_length_px;
                // Image rows grow downward; camera Y grows upward.
                let y_meters = (cy - py as f32) * z / self.config.focal_length_px;
                let z_meters = -(z + self.config.base_distance_meters);

                let u = uv_offset_x + (px as f32 * inv_sample_width) * uv_scale_x;
                let v = py as f32 * inv_sample_height;

                let dst = ((gy * cols + gx) as usize) * VERTEX_STRIDE;
                out.vertices[dst] = x_meters;
                out.vertices[dst + 1] = y_meters;
                out.vertices[dst + 2] = z_meters;
                out.vertices[dst + 3] = u;
                out.vertices[dst + 4] = v;
            }
        }

        emit_grid_indices(cols, rows, &mut out.indices);

        out.valid = !out.vertices.is_empty() && !out.indices.is_empty();
        out.valid
    }
}

/// Two counter-clockwise triangles per grid cell: (i0,i2,i1) and (i1,i2,i3).
pub(crate) fn emit_grid_indices(cols: i32, rows: i32, indices: &mut Vec<u16>) {
    indices.reserve(((cols - 1) as usize) * ((rows - 1) as usize) * 6);
    for gy in 0..rows - 1 {
        for gx in 0..cols - 1 {
            let i0 = (gy * cols + gx) as u16;
            let i1 = (gy * cols + gx + 1) as u16;
            let i2 = ((gy + 1) * cols + gx) as u16;
            let i3 = ((gy + 1) * cols + gx + 1) as u16;

            indices.push(i0);
            indices.push(i2);
            indices.push(i1);
            indices.push(i1);
            indices.push(i2);
            indices.push(i3);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstructor(config: DepthReconstructionConfig) -> DepthReconstructor {
        let mut r = DepthReconstructor::new();
        r.set_config(config);
        r
    }

    #[test]
    fn test_low_disparity_maps_to_far_plane() {
        let r = DepthReconstructor::new();
        let cfg = *r.config();
        for d in [0.0f32, 0.1, -0.1, 0.29, -0.29] {
            assert_eq!(r.reconstruct_depth_meters(d), cfg.far_z, "d={d}");
        }
    }

    #[test]
    fn test_depth_stays_within_clip_range() {
        let r = DepthReconstructor::new();
        let cfg = *r.config();
        for d in [-128.0f32, -40.0, -1.0, 0.5, 1.0, 12.0, 40.0, 127.0] {
            let z = r.reconstruct_depth_meters(d);
            assert!(z >= cfg.near_z && z <= cfg.far_z, "d={d} z={z}");
        }
    }

    #[test]
    fn test_flat_wall_depth() {
        // Constant disparity 40 with focal 250 and baseline 0.064:
        // 250 * 0.064 / 40 = 0.4m, clamped up to near_z = 0.45.
        let r = reconstructor(DepthReconstructionConfig {
            disparity_bias_px: 0.0,
            min_disparity_px: 0.30,
            focal_length_px: 250.0,
            baseline_meters: 0.064,
            ..DepthReconstructionConfig::default()
        });
        assert_eq!(r.reconstruct_depth_meters(40.0), r.config().near_z);

        // Lower the near plane and the raw triangulated value comes through.
        let r = reconstructor(DepthReconstructionConfig {
            near_z: 0.1,
            ..*r.config()
        });
        let z = r.reconstruct_depth_meters(40.0);
        assert!((z - 0.4).abs() < 1e-5, "z={z}");
    }

    #[test]
    fn test_negative_disparity_uses_magnitude() {
        let r = DepthReconstructor::new();
        assert_eq!(
            r.reconstruct_depth_meters(-40.0),
            r.reconstruct_depth_meters(40.0)
        );
    }

    #[test]
    fn test_set_config_clamps_fields() {
        let mut r = DepthReconstructor::new();
        r.set_config(DepthReconstructionConfig {
            focal_length_px: 0.0,
            baseline_meters: -1.0,
            min_disparity_px: 0.0,
            near_z: 0.0,
            far_z: 0.0,
            grid_step_x: 0,
            grid_step_y: -3,
            ..DepthReconstructionConfig::default()
        });
        let c = r.config();
        assert_eq!(c.focal_length_px, 1.0);
        assert_eq!(c.baseline_meters, 0.001);
        assert_eq!(c.min_disparity_px, 0.001);
        assert_eq!(c.near_z, 0.01);
        assert!(c.far_z >= c.near_z + 0.01);
        assert_eq!(c.grid_step_x, 1);
        assert_eq!(c.grid_step_y, 1);
    }

    #[test]
    fn test_build_mesh_grid_dimensions() {
        let r = reconstructor(DepthReconstructionConfig {
            grid_step_x: 8,
            grid_step_y: 2,
            ..DepthReconstructionConfig::default()
        });
        let width = 64;
        let height = 16;
        let disparity = vec![20i8; width * height];
        let mut out = DepthMeshData::default();
        assert!(r.build_mesh(
            &disparity,
            width as i32,
            height as i32,
            0,
            width as i32,
            height as i32,
            0.0,
            1.0,
            &mut out
        ));

        let cols = ((width as i32 - 1) / 8) + 1;
        let rows = ((height as i32 - 1) / 2) + 1;
        assert_eq!(out.grid_columns, cols);
        assert_eq!(out.grid_rows, rows);
        assert_eq!(out.vertices.len(), (cols * rows) as usize * VERTEX_STRIDE);
        assert_eq!(
            out.indices.len(),
            6 * ((cols - 1) as usize) * ((rows - 1) as usize)
        );
        assert!(out.valid);
    }

    #[test]
    fn test_build_mesh_rejects_bad_input() {
        let r = DepthReconstructor::new();
        let mut out = DepthMeshData::default();
        let disparity = vec![0i8; 64 * 64];

        // Empty slice.
        assert!(!r.build_mesh(&[], 64, 64, 0, 64, 64, 0.0, 1.0, &mut out));
        // Degenerate sample dimensions.
        assert!(!r.build_mesh(&disparity, 64, 64, 0, 1, 64, 0.0, 1.0, &mut out));
        assert!(!r.build_mesh(&disparity, 64, 64, 0, 64, 1, 0.0, 1.0, &mut out));
        // Offset runs past the disparity row.
        assert!(!r.build_mesh(&disparity, 64, 64, 8, 64, 64, 0.0, 1.0, &mut out));
        assert!(!out.valid);
        assert!(out.vertices.is_empty());
    }

    #[test]
    fn test_build_mesh_rejects_vertex_overflow() {
        // 256x256 at step 1 is exactly 65536 vertices, one past the ceiling.
        let r = reconstructor(DepthReconstructionConfig {
            grid_step_x: 1,
            grid_step_y: 1,
            ..DepthReconstructionConfig::default()
        });
        let disparity = vec![0i8; 256 * 256];
        let mut out = DepthMeshData::default();
        assert!(!r.build_mesh(&disparity, 256, 256, 0, 256, 256, 0.0, 1.0, &mut out));
    }

    #[test]
    fn test_build_mesh_uv_remap() {
        let r = reconstructor(DepthReconstructionConfig {
            grid_step_x: 4,
            grid_step_y: 4,
            ..DepthReconstructionConfig::default()
        });
        // 33 samples at stride 4: the last grid column lands exactly on the
        // sample boundary, so UVs span the full remapped range.
        let width = 33;
        let height = 33;
        let disparity = vec![30i8; width * height];
        let mut out = DepthMeshData::default();
        // Right-eye slice of a side-by-side texture: offset 0.5, scale 0.5.
        assert!(r.build_mesh(
            &disparity,
            width as i32,
            height as i32,
            0,
            width as i32,
            height as i32,
            0.5,
            0.5,
            &mut out
        ));
        let first_u = out.vertices[3];
        let last_u = out.vertices[out.vertices.len() - 2];
        assert!((first_u - 0.5).abs() < 1e-5);
        assert!((last_u - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_flat_wall_mesh_is_planar() {
        let r = reconstructor(DepthReconstructionConfig {
            grid_step_x: 2,
            grid_step_y: 2,
            ..DepthReconstructionConfig::default()
        });
        let disparity = vec![40i8; 16 * 16];
        let mut out = DepthMeshData::default();
        assert!(r.build_mesh(&disparity, 16, 16, 0, 16, 16, 0.0, 1.0, &mut out));

        let expected_z = -(r.reconstruct_depth_meters(40.0) + r.config().base_distance_meters);
        for chunk in out.vertices.chunks(VERTEX_STRIDE) {
            assert!((chunk[2] - expected_z).abs() < 1e-5);
        }
    }
}
