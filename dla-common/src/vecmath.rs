use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// A 3D point or vector. 2D simulations keep `z` at zero.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Creates a new Vec3.
    #[inline(always)]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    /// Creates a zero vector (the coordinate origin).
    #[inline(always)]
    pub fn zero() -> Self {
        Vec3 { x: 0.0, y: 0.0, z: 0.0 }
    }

    #[inline(always)]
    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    #[inline(always)]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    #[inline(always)]
    pub fn distance_squared(self, other: Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    #[inline(always)]
    pub fn distance(self, other: Vec3) -> f64 {
        self.distance_squared(other).sqrt()
    }

    #[inline(always)]
    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline(always)]
    pub fn scale(self, scalar: f64) -> Self {
        Vec3::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }

    /// Returns a unit vector in the same direction, or a zero vector if the
    /// length is zero or very small.
    pub fn normalize_or_zero(self) -> Vec3 {
        let len_sq = self.length_squared();
        if len_sq > 1e-24 {
            self.scale(1.0 / len_sq.sqrt())
        } else {
            Vec3::zero()
        }
    }

    /// Coordinate along axis 0 (x), 1 (y) or 2 (z).
    #[inline(always)]
    pub fn axis(self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    #[inline(always)]
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        self.scale(scalar)
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

/// Moves from `a` towards `b` by exactly `distance`.
/// Returns `a` unchanged when the two points coincide.
pub fn lerp_distance(a: Vec3, b: Vec3, distance: f64) -> Vec3 {
    a + (b - a).normalize_or_zero() * distance
}
