use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Integer grid position of a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coordinates {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: &Coordinates) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        let dz = (self.z - other.z) as i64;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, other: &Coordinates) -> f64 {
        (self.distance_squared(other) as f64).sqrt()
    }
}

/// Axis-aligned box of grid cells, `min` inclusive and `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Coordinates,
    pub max: Coordinates,
}

impl BoundingBox {
    pub fn new(min: Coordinates, max: Coordinates) -> Self {
        Self { min, max }
    }

    /// A box anchored at `origin` with the given edge lengths.
    pub fn with_size(origin: Coordinates, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            min: origin,
            max: Coordinates::new(origin.x + dx, origin.y + dy, origin.z + dz),
        }
    }

    pub fn extent(&self) -> [i32; 3] {
        [
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        ]
    }

    pub fn volume(&self) -> i64 {
        let [dx, dy, dz] = self.extent();
        dx.max(0) as i64 * dy.max(0) as i64 * dz.max(0) as i64
    }

    pub fn contains(&self, point: &Coordinates) -> bool {
        point.x >= self.min.x
            && point.x < self.max.x
            && point.y >= self.min.y
            && point.y < self.max.y
            && point.z >= self.min.z
            && point.z < self.max.z
    }

    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
            && self.min.z < other.max.z
            && other.min.z < self.max.z
    }

    pub fn center(&self) -> (f64, f64, f64) {
        (
            (self.min.x + self.max.x) as f64 / 2.0,
            (self.min.y + self.max.y) as f64 / 2.0,
            (self.min.z + self.max.z) as f64 / 2.0,
        )
    }

    /// Split along `axis` so the lower half is `cut` cells wide.
    pub fn split(&self, axis: usize, cut: i32) -> (BoundingBox, BoundingBox) {
        let mut lower = *self;
        let mut upper = *self;
        match axis {
            0 => {
                lower.max.x = self.min.x + cut;
                upper.min.x = self.min.x + cut;
            }
            1 => {
                lower.max.y = self.min.y + cut;
                upper.min.y = self.min.y + cut;
            }
            _ => {
                lower.max.z = self.min.z + cut;
                upper.min.z = self.min.z + cut;
            }
        }
        (lower, upper)
    }
}

/// Closed numeric interval used by generation policies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Range<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }

    pub fn clamp(&self, value: T) -> T {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_split_is_disjoint() {
        let bbox = BoundingBox::with_size(Coordinates::new(0, 0, 0), 10, 4, 4);
        let (lower, upper) = bbox.split(0, 3);

        assert_eq!(lower.volume() + upper.volume(), bbox.volume());
        assert!(!lower.overlaps(&upper));
        assert!(lower.contains(&Coordinates::new(2, 0, 0)));
        assert!(upper.contains(&Coordinates::new(3, 0, 0)));
    }

    #[test]
    fn test_range_clamp() {
        let range = Range::new(2, 6);
        assert_eq!(range.clamp(0), 2);
        assert_eq!(range.clamp(4), 4);
        assert_eq!(range.clamp(9), 6);
        assert!(!Range::new(0.9, 0.1).is_ordered());
    }
}
