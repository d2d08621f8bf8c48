//! Small numeric toolkit for the stereo presentation pipeline.
//!
//! Column-major 4x4 matrices (OpenGL convention), quaternion rotation, and
//! the two XR-specific constructions: a perspective matrix from asymmetric
//! per-eye FOV tangents and a view matrix from an XR pose. All routines are
//! pure and carry their own unit tests so they can be validated without a
//! graphics context.

// ── Vec3 ─────────────────────────────────────────────────────

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

// ── Quat ─────────────────────────────────────────────────────

/// Unit quaternion for rotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Create a quaternion from a rotation around the Y axis.
    pub fn from_yaw(radians: f32) -> Self {
        let (s, c) = (radians * 0.5).sin_cos();
        Self {
            x: 0.0,
            y: s,
            z: 0.0,
            w: c,
        }
    }

    pub fn conjugate(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
            w: self.w,
        }
    }

    /// Rotate a vector by this quaternion.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        // v + 2 * (w * cross(q.xyz, v) + cross(q.xyz, cross(q.xyz, v)))
        let qv = Vec3::new(self.x, self.y, self.z);
        let uv = cross(qv, v);
        let uuv = cross(qv, uv);
        Vec3::new(
            v.x + (uv.x * self.w + uuv.x) * 2.0,
            v.y + (uv.y * self.w + uuv.y) * 2.0,
            v.z + (uv.z * self.w + uuv.z) * 2.0,
        )
    }
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

// ── Pose / FOV ───────────────────────────────────────────────

/// Position + orientation as reported by the XR runtime for one eye.
/// Orientation maps camera space to world space.
#[derive(Debug, Clone, Copy)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

/// Asymmetric field of view, as half-angles in radians.
/// Left/down are typically negative, right/up positive.
#[derive(Debug, Clone, Copy)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

impl Fov {
    /// Symmetric FOV helper, mainly for headless sessions and tests.
    pub fn symmetric(half_angle: f32) -> Self {
        Self {
            angle_left: -half_angle,
            angle_right: half_angle,
            angle_up: half_angle,
            angle_down: -half_angle,
        }
    }
}

// ── Mat4 ─────────────────────────────────────────────────────

/// 4x4 matrix, column-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4 {
    pub m: [f32; 16],
}

impl Mat4 {
    pub const IDENTITY: Self = Self {
        m: [
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ],
    };

    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        let mut out = Self::IDENTITY;
        out.m[12] = x;
        out.m[13] = y;
        out.m[14] = z;
        out
    }

    pub fn scale(x: f32, y: f32, z: f32) -> Self {
        let mut out = Self {
            m: [0.0; 16],
        };
        out.m[0] = x;
        out.m[5] = y;
        out.m[10] = z;
        out.m[15] = 1.0;
        out
    }

    pub fn rotation_x(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        let mut out = Self::IDENTITY;
        out.m[5] = c;
        out.m[6] = s;
        out.m[9] = -s;
        out.m[10] = c;
        out
    }

    pub fn rotation_y(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        let mut out = Self::IDENTITY;
        out.m[0] = c;
        out.m[2] = -s;
        out.m[8] = s;
        out.m[10] = c;
        out
    }

    pub fn multiply(&self, b: &Mat4) -> Mat4 {
        let a = &self.m;
        let mut out = [0.0f32; 16];
        for c in 0..4 {
            for r in 0..4 {
                out[c * 4 + r] = a[r] * b.m[c * 4]
                    + a[4 + r] * b.m[c * 4 + 1]
                    + a[8 + r] * b.m[c * 4 + 2]
                    + a[12 + r] * b.m[c * 4 + 3];
            }
        }
        Mat4 { m: out }
    }

    /// Transform a point (w = 1), returning the xyz of the result.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            m[0] * p.x + m[4] * p.y + m[8] * p.z + m[12],
            m[1] * p.x + m[5] * p.y + m[9] * p.z + m[13],
            m[2] * p.x + m[6] * p.y + m[10] * p.z + m[14],
        )
    }

    /// Perspective projection from asymmetric per-eye FOV half-angles.
    pub fn perspective_from_fov(fov: &Fov, near_z: f32, far_z: f32) -> Mat4 {
        let tan_left = fov.angle_left.tan();
        let tan_right = fov.angle_right.tan();
        let tan_down = fov.angle_down.tan();
        let tan_up = fov.angle_up.tan();
        let tan_width = tan_right - tan_left;
        let tan_height = tan_up - tan_down;

        let mut out = Mat4 { m: [0.0; 16] };
        out.m[0] = 2.0 / tan_width;
        out.m[5] = 2.0 / tan_height;
        out.m[8] = (tan_right + tan_left) / tan_width;
        out.m[9] = (tan_up + tan_down) / tan_height;
        out.m[10] = -(far_z + near_z) / (far_z - near_z);
        out.m[11] = -1.0;
        out.m[14] = -(2.0 * far_z * near_z) / (far_z - near_z);
        out
    }

    /// View matrix from an XR eye pose. Pose orientation is camera->world;
    /// the view matrix needs world->camera, so the conjugate is used.
    pub fn view_from_pose(pose: &Pose) -> Mat4 {
        let q = pose.orientation.conjugate();
        let (x, y, z, w) = (q.x, q.y, q.z, q.w);
        let p = pose.position;

        let xx = x * x;
        let yy = y * y;
        let zz = z * z;
        let xy = x * y;
        let xz = x * z;
        let yz = y * z;
        let wx = w * x;
        let wy = w * y;
        let wz = w * z;

        let r00 = 1.0 - 2.0 * (yy + zz);
        let r01 = 2.0 * (xy - wz);
        let r02 = 2.0 * (xz + wy);
        let r10 = 2.0 * (xy + wz);
        let r11 = 1.0 - 2.0 * (xx + zz);
        let r12 = 2.0 * (yz - wx);
        let r20 = 2.0 * (xz - wy);
        let r21 = 2.0 * (yz + wx);
        let r22 = 1.0 - 2.0 * (xx + yy);

        let mut out = Mat4::IDENTITY;
        out.m[0] = r00;
        out.m[1] = r10;
        out.m[2] = r20;
        out.m[4] = r01;
        out.m[5] = r11;
        out.m[6] = r21;
        out.m[8] = r02;
        out.m[9] = r12;
        out.m[10] = r22;
        out.m[12] = -(r00 * p.x + r01 * p.y + r02 * p.z);
        out.m[13] = -(r10 * p.x + r11 * p.y + r12 * p.z);
        out.m[14] = -(r20 * p.x + r21 * p.y + r22 * p.z);
        out
    }
}
