//! Axis-aligned bounding boxes.

use crate::transform::Vec3;

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Smallest box enclosing every point, or `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec3>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |acc, p| acc.expanded(p)))
    }

    /// Grow the box so it also contains `p`.
    pub fn expanded(self, p: Vec3) -> Self {
        Self {
            min: Vec3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            max: Vec3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        }
    }

    /// Side lengths along X (width), Y (height) and Z (depth).
    pub fn size(&self) -> Vec3 {
        self.max.sub(self.min)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalises_corners() {
        let b = Aabb::new(Vec3::new(1.0, -1.0, 2.0), Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(b.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 2.0));
    }

    #[test]
    fn from_points_encloses_all_points() {
        let pts = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.1, -0.2, 0.05),
            Vec3::new(-0.05, 0.3, 0.0),
        ];
        let b = Aabb::from_points(pts).unwrap();
        assert_eq!(b.min, Vec3::new(-0.05, -0.2, 0.0));
        assert_eq!(b.max, Vec3::new(0.1, 0.3, 0.05));
        let s = b.size();
        assert!((s.x - 0.15).abs() < 1e-6);
        assert!((s.y - 0.5).abs() < 1e-6);
        assert!((s.z - 0.05).abs() < 1e-6);
    }

    #[test]
    fn from_points_empty_is_none() {
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }
}
