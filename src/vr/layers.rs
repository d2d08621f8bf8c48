//! Per-eye depth layer extraction from world-id metadata.
//!
//! Pixels sharing a world id are treated as one depth layer. Each layer's
//! billboard distance comes from the average absolute disparity of its
//! pixels within that eye's region, and layers are ordered far-to-near so
//! the renderer can paint them back to front without a depth test.

/// Distance band billboards are placed in, meters.
pub const LAYER_NEAR_Z: f32 = 1.2;
pub const LAYER_FAR_Z: f32 = 3.8;

/// World ids at or above this are ignored (reserved/unmapped pixels).
pub const MAX_WORLD_IDS: usize = 32;

/// Emulator video output dimensions for one eye.
pub const VIP_EYE_WIDTH: i32 = 384;
pub const VIP_EYE_HEIGHT: i32 = 224;

/// One drawable depth layer for one eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerInfo {
    pub world_id: u8,
    /// Billboard distance from the anchor, meters.
    pub z: f32,
}

/// Extract the drawable layers for one eye of a side-by-side metadata frame.
///
/// `disparity` and `world_ids` are full-frame arrays, `width` pixels per
/// row; the eye's region is the fixed VIP eye rectangle at
/// `eye * VIP_EYE_WIDTH`. Returns layers sorted far-to-near (painter order).
pub fn extract_eye_layers(
    disparity: &[i8],
    world_ids: &[u8],
    width: i32,
    eye: usize,
) -> Vec<LayerInfo> {
    let needed = (VIP_EYE_HEIGHT as usize) * (width.max(0) as usize);
    if eye > 1
        || width < VIP_EYE_WIDTH * 2
        || disparity.len() < needed
        || world_ids.len() < needed
    {
        return Vec::new();
    }

    let mut disparity_sum = [0i64; MAX_WORLD_IDS];
    let mut disparity_count = [0i32; MAX_WORLD_IDS];

    let eye_offset = eye * VIP_EYE_WIDTH as usize;
    for y in 0..VIP_EYE_HEIGHT as usize {
        let row_offset = y * width as usize;
        for x in 0..VIP_EYE_WIDTH as usize {
            let index = row_offset + eye_offset + x;
            let world_id = world_ids[index] as usize;
            if world_id >= MAX_WORLD_IDS {
                continue;
            }
            disparity_sum[world_id] += i64::from(disparity[index].unsigned_abs());
            disparity_count[world_id] += 1;
        }
    }

    let mut layers = Vec::new();
    for world_id in 0..MAX_WORLD_IDS {
        if disparity_count[world_id] <= 0 {
            continue;
        }
        let avg_disp = disparity_sum[world_id] as f32 / disparity_count[world_id] as f32;
        let closeness = (avg_disp / 127.0).clamp(0.0, 1.0);
        let z = LAYER_FAR_Z - closeness * (LAYER_FAR_Z - LAYER_NEAR_Z);
        layers.push(LayerInfo {
            world_id: world_id as u8,
            z,
        });
    }

    // Far-to-near painter order.
    layers.sort_by(|a, b| b.z.partial_cmp(&a.z).unwrap_or(std::cmp::Ordering::Equal));
    layers
}

/// Whether a metadata frame is large enough to carry per-eye layer data.
pub fn layer_data_available(width: i32, height: i32) -> bool {
    width >= VIP_EYE_WIDTH * 2 && height >= VIP_EYE_HEIGHT
}
