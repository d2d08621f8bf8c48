//! Stereo-correspondence depth reconstruction.
//!
//! An alternative reconstruction path that needs no explicit disparity
//! channel: it estimates disparity from how far apart the two eyes' source
//! coordinates land for the same output pixel, then feeds that estimate
//! through the same triangulation as the direct path. Used when the frame
//! carries source-coordinate metadata but no disparity map.

use super::depth::{
    emit_grid_indices, DepthMeshData, DepthReconstructor, MAX_MESH_VERTICES, VERTEX_STRIDE,
};
use super::mapping::{EyeSample, MappingEvaluator};

pub struct WorldMeshBuilder;

impl WorldMeshBuilder {
    /// Build one depth mesh per eye from cross-eye correspondence.
    ///
    /// Per grid vertex the mapped source point is sampled for both eyes at
    /// the vertex and at the next grid column; disparity is estimated as the
    /// scalar projection of the inter-eye offset onto the local motion
    /// direction. Near-zero motion falls back to the previous cell's
    /// estimate, which keeps the field locally smooth. Samples where either
    /// eye has no mapping are replaced with an identity mapping so the mesh
    /// degrades to "no parallax" instead of a hole.
    ///
    /// Both output meshes currently share identical data; the estimate is
    /// already stereo-derived.
    pub fn build_stereo_meshes(
        mapping: &MappingEvaluator<'_>,
        reconstructor: &DepthReconstructor,
        out: &mut [DepthMeshData; 2],
    ) -> bool {
        out[0] = DepthMeshData::default();
        out[1] = DepthMeshData::default();

        if !mapping.stereo_ready() {
            return false;
        }

        let eye_width = mapping.eye_width();
        let eye_height = mapping.eye_height();
        if eye_width <= 1 || eye_height <= 1 {
            return false;
        }

        let cfg = reconstructor.config();
        let step_x = cfg.grid_step_x.max(1);
        let step_y = cfg.grid_step_y.max(1);
        let cols = ((eye_width - 1) / step_x) + 1;
        let rows = ((eye_height - 1) / step_y) + 1;
        if cols <= 1 || rows <= 1 {
            return false;
        }
        if (cols as usize) * (rows as usize) >= MAX_MESH_VERTICES {
            return false;
        }

        let mut mesh = DepthMeshData {
            grid_columns: cols,
            grid_rows: rows,
            ..DepthMeshData::default()
        };
        mesh.vertices
            .resize((cols as usize) * (rows as usize) * VERTEX_STRIDE, 0.0);

        let cx = (eye_width - 1) as f32 * 0.5;
        let cy = (eye_height - 1) as f32 * 0.5;
        let inv_w = 1.0 / (eye_width - 1) as f32;
        let inv_h = 1.0 / (eye_height - 1) as f32;

        let identity_at = |px: i32, py: i32| EyeSample {
            sx: px as f32,
            sy: py as f32,
            valid: true,
        };

        let mut prev_d = 0.0f32;
        for gy in 0..rows {
            let py = (gy * step_y).min(eye_height - 1);
            for gx in 0..cols {
                let px = (gx * step_x).min(eye_width - 1);

                let mut left = mapping.evaluate_eye(0, px, py);
                let mut right = mapping.evaluate_eye(1, px, py);
                if !left.valid || !right.valid {
                    left = identity_at(px, py);
                    right = identity_at(px, py);
                }

                let nx = (px + step_x).min(eye_width - 1);
                let mut left_next = mapping.evaluate_eye(0, nx, py);
                let mut right_next = mapping.evaluate_eye(1, nx, py);
                if !left_next.valid || !right_next.valid {
                    left_next = left;
                    right_next = right;
                }

                // Motion of the eye-averaged source point between adjacent
                // grid columns, and the inter-eye offset at this column.
                let s_cx = (left.sx + right.sx) * 0.5;
                let s_cy = (left.sy + right.sy) * 0.5;
                let s_cx_n = (left_next.sx + right_next.sx) * 0.5;
                let s_cy_n = (left_next.sy + right_next.sy) * 0.5;

                let tx = s_cx_n - s_cx;
                let ty = s_cy_n - s_cy;
                let dsx = left.sx - right.sx;
                let dsy = left.sy - right.sy;

                let t2 = tx * tx + ty * ty;
                let mut d = prev_d;
                if t2 > 1e-4 {
                    d = (tx * dsx + ty * dsy) / t2;
                }
                prev_d = d;

                let denom = d - cfg.disparity_bias_px;
                let mut z_meters = cfg.far_z;
                if denom.abs() >= cfg.min_disparity_px {
                    z_meters = (cfg.focal_length_px * cfg.baseline_meters) / denom.abs();
                    z_meters = z_meters.clamp(cfg.near_z, cfg.far_z);
                }

                let x_meters = (px as f32 - cx) * z_meters / cfg.focal_length_px;
                let y_meters = (cy - py as f32) * z_meters / cfg.focal_length_px;
                let z_world = -(z_meters + cfg.base_distance_meters);

                let u = px as f32 * inv_w;
                let v = py as f32 * inv_h;

                let dst = ((gy * cols + gx) as usize) * VERTEX_STRIDE;
                mesh.vertices[dst] = x_meters;
                mesh.vertices[dst + 1] = y_meters;
                mesh.vertices[dst + 2] = z_world;
                mesh.vertices[dst + 3] = u;
                mesh.vertices[dst + 4] = v;
            }
        }

        emit_grid_indices(cols, rows, &mut mesh.indices);

        mesh.valid = !mesh.vertices.is_empty() && !mesh.indices.is_empty();
        if !mesh.valid {
            return false;
        }

        out[0] = mesh.clone();
        out[1] = mesh;
        true
    }
}
