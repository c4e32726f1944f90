//! Positions and orientations exchanged with the simulator

use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in world space, in metres
///
/// Serialized as a `[x, y, z]` array to match the metadata layout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// The world origin
    pub const ORIGIN: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Component-wise sum
    pub fn offset(&self, delta: Vec3) -> Vec3 {
        Vec3::new(self.x + delta.x, self.y + delta.y, self.z + delta.z)
    }

    /// Scale every component
    pub fn scaled(&self, factor: f64) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Check that every component is finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Rotation quaternion, serialized as `[x, y, z, w]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    /// No rotation
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Rotate a vector by this quaternion
    ///
    /// The quaternion is normalized first, so spawn tables with slightly
    /// off-unit values still produce unit-length headings.
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        let norm = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if norm == 0.0 {
            return v;
        }
        let (qx, qy, qz, qw) = (self.x / norm, self.y / norm, self.z / norm, self.w / norm);

        // t = 2 * cross(q.xyz, v)
        let tx = 2.0 * (qy * v.z - qz * v.y);
        let ty = 2.0 * (qz * v.x - qx * v.z);
        let tz = 2.0 * (qx * v.y - qy * v.x);

        // v' = v + w * t + cross(q.xyz, t)
        Vec3::new(
            v.x + qw * tx + (qy * tz - qz * ty),
            v.y + qw * ty + (qz * tx - qx * tz),
            v.z + qw * tz + (qx * ty - qy * tx),
        )
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<[f64; 4]> for Quat {
    fn from([x, y, z, w]: [f64; 4]) -> Self {
        Self { x, y, z, w }
    }
}

impl From<Quat> for [f64; 4] {
    fn from(q: Quat) -> Self {
        [q.x, q.y, q.z, q.w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_distance() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 6.0, 3.0);
        assert!(approx(a.distance(&b), 5.0));
        assert!(approx(b.distance(&a), 5.0));
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_vec3_serializes_as_array() {
        let json = serde_json::to_string(&Vec3::new(1.5, -2.0, 0.25)).unwrap();
        assert_eq!(json, "[1.5,-2.0,0.25]");

        let back: Vec3 = serde_json::from_str("[262.5,-891.25,246.0]").unwrap();
        assert_eq!(back, Vec3::new(262.5, -891.25, 246.0));
    }

    #[test]
    fn test_quat_serializes_as_array() {
        let json = serde_json::to_string(&Quat::new(0.0, 0.0, 1.0, 0.0)).unwrap();
        assert_eq!(json, "[0.0,0.0,1.0,0.0]");
    }

    #[test]
    fn test_identity_rotation() {
        let v = Vec3::new(0.0, -1.0, 0.0);
        assert_eq!(Quat::IDENTITY.rotate(v), v);
    }

    #[test]
    fn test_half_turn_about_z() {
        // 180 degrees about z negates x and y
        let q = Quat::new(0.0, 0.0, 1.0, 0.0);
        let r = q.rotate(Vec3::new(0.0, -1.0, 0.0));
        assert!(approx(r.x, 0.0));
        assert!(approx(r.y, 1.0));
        assert!(approx(r.z, 0.0));
    }

    #[test]
    fn test_quarter_turn_about_z() {
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let q = Quat::new(0.0, 0.0, s, s);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(approx(r.x, 0.0));
        assert!(approx(r.y, 1.0));
    }
}
