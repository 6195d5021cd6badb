//! Rigid-body algebra: [`Vec3`], [`Quat`] and [`Pose`].
//!
//! All three are plain `Copy` values. Quaternions use the `(x, y, z, w)`
//! component order that the scene snapshot puts on the wire.
//!
//! # Example
//!
//! ```rust
//! use webkin_kinematics::math::{Pose, Quat, Vec3};
//!
//! let yaw = Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_2);
//! let base = Pose::new(Vec3::new(1.0, 0.0, 0.0), yaw);
//! let tool = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quat::identity());
//!
//! let world = base.compose(tool);
//! assert!((world.position.x - 1.0).abs() < 1e-9);
//! assert!((world.position.y - 1.0).abs() < 1e-9);
//! ```

use std::ops::{Add, Mul};

use serde::{Serialize, Serializer};

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (translation or direction).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Unit Z, the default joint axis.
    pub fn unit_z() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    fn mul(self, scalar: f64) -> Vec3 {
        Vec3::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl Serialize for Vec3 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_array().serialize(serializer)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quat
// ────────────────────────────────────────────────────────────────────────────

/// A rotation quaternion in `(x, y, z, w)` order.
///
/// Unit length is not enforced. [`Quat::rotate`] is only a rigid rotation
/// when `self` is a unit quaternion; [`Quat::from_axis_angle`] yields one
/// whenever its axis is unit length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Hamilton product `self * rhs`.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Rotate a vector: `q * (v, 0) * q*`, keeping the vector part.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(v.x, v.y, v.z, 0.0);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Rotation of `angle` radians about `axis`.
    ///
    /// `axis` is used as given. A non-unit axis produces a non-unit
    /// quaternion; normalising is the caller's job.
    pub fn from_axis_angle(axis: Vec3, angle: f64) -> Self {
        let half = angle / 2.0;
        let s = half.sin();
        Self::new(axis.x * s, axis.y * s, axis.z * s, half.cos())
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Quat {
    type Output = Quat;

    fn mul(self, rhs: Quat) -> Quat {
        Quat::mul(self, rhs)
    }
}

impl Serialize for Quat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_array().serialize(serializer)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// A rigid transform: `orientation` applied first, then `position` added.
///
/// Serialises as `{"position": [x, y, z], "orientation": [x, y, z, w]}`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// The identity pose.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Pure translation.
    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::identity())
    }

    /// Pure rotation.
    pub fn from_orientation(orientation: Quat) -> Self {
        Self::new(Vec3::zero(), orientation)
    }

    /// `self ∘ other`: `other` is expressed in `self`'s local frame.
    ///
    /// Associative, not commutative.
    pub fn compose(self, other: Self) -> Self {
        Self::new(
            self.position + self.orientation.rotate(other.position),
            self.orientation.mul(other.orientation),
        )
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        self.compose(rhs)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
