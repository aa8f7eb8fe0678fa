//! Plain 2D geometry used by the layout engine and connection routing.
//!
//! Coordinates follow the usual scene convention: `x` grows to the right and
//! `y` grows downwards.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// A point in scene (or item-local) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Snap both coordinates to the nearest multiple of `grid`.
    pub fn snapped(self, grid: f64) -> Point {
        Point::new(snap(self.x, grid), snap(self.y, grid))
    }

    pub fn offset(self, v: Vector, scale: f64) -> Point {
        Point::new(self.x + v.dx * scale, self.y + v.dy * scale)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A direction vector. Endpoints use unit vectors to tell which side their
/// connections leave from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub dx: f64,
    pub dy: f64,
}

impl Vector {
    pub const LEFT: Vector = Vector { dx: -1.0, dy: 0.0 };
    pub const RIGHT: Vector = Vector { dx: 1.0, dy: 0.0 };
    pub const UP: Vector = Vector { dx: 0.0, dy: -1.0 };
}

/// Axis-aligned rectangle given by its top-left corner and size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right() && p.y >= self.top && p.y <= self.bottom()
    }

    /// Height of the vertical overlap with `other` (zero when disjoint).
    pub fn vertical_overlap(&self, other: &Rect) -> f64 {
        let horizontal = self.left < other.right() && other.left < self.right();
        if !horizontal {
            return 0.0;
        }
        (self.bottom().min(other.bottom()) - self.top.max(other.top)).max(0.0)
    }
}

/// Snap a single coordinate to the grid.
pub fn snap(value: f64, grid: f64) -> f64 {
    if grid <= 0.0 {
        return value;
    }
    (value / grid).round() * grid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_rounds_to_nearest_grid_line() {
        assert_eq!(snap(11.0, 8.0), 8.0);
        assert_eq!(snap(13.0, 8.0), 16.0);
        assert_eq!(snap(-3.0, 8.0), -0.0);
        assert_eq!(snap(7.3, 0.0), 7.3);
    }

    #[test]
    fn vertical_overlap_requires_horizontal_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 4.0, 10.0, 10.0);
        let c = Rect::new(20.0, 4.0, 10.0, 10.0);
        assert_eq!(a.vertical_overlap(&b), 6.0);
        assert_eq!(a.vertical_overlap(&c), 0.0);
    }
}
