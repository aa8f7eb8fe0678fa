//! Connections and their routes.
//!
//! An on-page route is orthogonal: a short stub leaves each endpoint along
//! its direction and the two stubs are joined through a vertical middle
//! segment. An off-page route is a fixed vertical stub above the first end.

use super::{ConnectionId, EndpointId};
use crate::geometry::{Point, Vector, snap};

#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub name: String,
    pub description: String,
    pub a: EndpointId,
    pub b: EndpointId,
    pub route: Vec<Point>,
    /// Both ends refer to off-page proxies.
    pub off_page: bool,
    /// Scene positions of the two ends the current route was derived for.
    /// When an end moves away from its anchor the route is re-derived.
    pub anchors: Option<(Point, Point)>,
}

impl Connection {
    pub fn other_end(&self, ep: EndpointId) -> Option<EndpointId> {
        if self.a == ep {
            Some(self.b)
        } else if self.b == ep {
            Some(self.a)
        } else {
            None
        }
    }

    pub fn touches(&self, ep: EndpointId) -> bool {
        self.a == ep || self.b == ep
    }

    /// Replace `from` with `to` on whichever end refers to it.
    pub fn repoint(&mut self, from: EndpointId, to: EndpointId) -> bool {
        let mut changed = false;
        if self.a == from {
            self.a = to;
            changed = true;
        }
        if self.b == from {
            self.b = to;
            changed = true;
        }
        changed
    }
}

/// Orthogonal route between two endpoints leaving along `d1` and `d2`.
pub fn orthogonal_route(
    p1: Point,
    d1: Vector,
    p2: Point,
    d2: Vector,
    stub: f64,
    grid: f64,
) -> Vec<Point> {
    let s1 = p1.offset(d1, stub);
    let s2 = p2.offset(d2, stub);
    let mid_x = snap((s1.x + s2.x) / 2.0, grid);
    vec![
        p1,
        s1,
        Point::new(mid_x, s1.y),
        Point::new(mid_x, s2.y),
        s2,
        p2,
    ]
}

/// Vertical stub drawn for an off-page end at `p`.
pub fn off_page_stub(p: Point, grid: f64) -> Vec<Point> {
    vec![p, Point::new(p.x, p.y - 3.0 * grid)]
}

/// The vertical middle segment of an orthogonal route as `(x, y_min, y_max)`.
fn middle_segment(route: &[Point]) -> Option<(f64, f64, f64)> {
    if route.len() != 6 {
        return None;
    }
    let (a, b) = (route[2], route[3]);
    Some((a.x, a.y.min(b.y), a.y.max(b.y)))
}

fn shift_middle(route: &mut [Point], dx: f64) {
    route[2].x += dx;
    route[3].x += dx;
}

fn middles_overlap(a: (f64, f64, f64), b: (f64, f64, f64)) -> bool {
    (a.0 - b.0).abs() < 1e-6 && a.1 < b.2 && b.1 < a.2
}

/// Shift the middle segment of `route` sideways in grid steps until it no
/// longer lies on top of the middle segment of any route in `others`.
pub fn fix_overlap<'a>(
    route: &mut [Point],
    others: impl Iterator<Item = &'a [Point]> + Clone,
    grid: f64,
) {
    let Some(start) = middle_segment(route) else {
        return;
    };
    let collides = |m: (f64, f64, f64)| {
        others
            .clone()
            .filter_map(middle_segment)
            .any(|o| middles_overlap(m, o))
    };
    if !collides(start) {
        return;
    }
    for k in 1u32..=32 {
        let steps = k.div_ceil(2) as f64;
        let dx = if k % 2 == 1 { steps * grid } else { -steps * grid };
        let candidate = (start.0 + dx, start.1, start.2);
        if !collides(candidate) {
            shift_middle(route, dx);
            return;
        }
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

/// Shortest distance from `p` to any segment of `route`.
pub fn distance_to_route(route: &[Point], p: Point) -> f64 {
    route
        .windows(2)
        .map(|w| distance_to_segment(p, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}
