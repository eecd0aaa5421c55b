// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plane geometry for document detection: points, quadrilaterals, corner
// ordering, polygon measures, and Douglas-Peucker simplification.
//
// Everything here is a pure function over plain coordinates so it can be
// tested without decoding any image.

pub mod homography;

use serde::{Deserialize, Serialize};

pub use homography::Homography;

/// Tolerance below which two coordinates or a cross product count as zero.
const GEOMETRY_EPSILON: f64 = 1e-6;

/// A point in image coordinates (x grows right, y grows down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Four corners in reading order: top-left, top-right, bottom-right,
/// bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    pub top_left: Point2D,
    pub top_right: Point2D,
    pub bottom_right: Point2D,
    pub bottom_left: Point2D,
}

impl Quadrilateral {
    /// Build from corners already in `[tl, tr, br, bl]` order.
    pub fn from_ordered(corners: [Point2D; 4]) -> Self {
        let [top_left, top_right, bottom_right, bottom_left] = corners;
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Axis-aligned rectangle with its top-left corner at the origin.
    pub fn rectangle(width: f64, height: f64) -> Self {
        Self::from_ordered([
            Point2D::new(0.0, 0.0),
            Point2D::new(width, 0.0),
            Point2D::new(width, height),
            Point2D::new(0.0, height),
        ])
    }

    pub fn corners(&self) -> [Point2D; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    pub fn area(&self) -> f64 {
        polygon_area(&self.corners())
    }

    pub fn perimeter(&self) -> f64 {
        perimeter(&self.corners())
    }

    /// True when the corners are distinct, no three consecutive corners are
    /// collinear, and opposite edges do not cross.
    pub fn is_simple(&self) -> bool {
        let c = self.corners();

        for i in 0..4 {
            for j in (i + 1)..4 {
                if c[i].distance(&c[j]) < GEOMETRY_EPSILON {
                    return false;
                }
            }
        }

        for i in 0..4 {
            let a = c[i];
            let b = c[(i + 1) % 4];
            let d = c[(i + 2) % 4];
            if cross(a, b, d).abs() < GEOMETRY_EPSILON {
                return false;
            }
        }

        !segments_intersect(c[0], c[1], c[2], c[3]) && !segments_intersect(c[1], c[2], c[3], c[0])
    }
}

/// Assign corner roles to four unordered points.
///
/// `x + y` picks the top-left (minimum) and bottom-right (maximum); `y - x`
/// picks the top-right (minimum) and bottom-left (maximum). Ties go to the
/// earliest point in the input.
pub fn order_corners(points: [Point2D; 4]) -> Quadrilateral {
    let sum = |p: &Point2D| p.x + p.y;
    let diff = |p: &Point2D| p.y - p.x;

    Quadrilateral {
        top_left: points[arg_extreme(&points, sum, Extreme::Min)],
        top_right: points[arg_extreme(&points, diff, Extreme::Min)],
        bottom_right: points[arg_extreme(&points, sum, Extreme::Max)],
        bottom_left: points[arg_extreme(&points, diff, Extreme::Max)],
    }
}

#[derive(Clone, Copy)]
enum Extreme {
    Min,
    Max,
}

/// Index of the first point whose key is strictly the extreme.
fn arg_extreme(points: &[Point2D; 4], key: impl Fn(&Point2D) -> f64, extreme: Extreme) -> usize {
    let mut best = 0;
    let mut best_key = key(&points[0]);
    for (i, p) in points.iter().enumerate().skip(1) {
        let k = key(p);
        let better = match extreme {
            Extreme::Min => k < best_key,
            Extreme::Max => k > best_key,
        };
        if better {
            best = i;
            best_key = k;
        }
    }
    best
}

/// Unsigned area of a closed polygon (shoelace formula).
pub fn polygon_area(points: &[Point2D]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let mut twice_area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        twice_area += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    twice_area.abs() / 2.0
}

/// Length of the closed polyline through `points`.
pub fn perimeter(points: &[Point2D]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len();
    (0..n).map(|i| points[i].distance(&points[(i + 1) % n])).sum()
}

/// Simplify a closed contour with Douglas-Peucker.
///
/// The tolerance is `epsilon_ratio * perimeter(contour)`. The contour is split
/// at its first point and the point farthest from it, each half is simplified
/// independently, and the first point is dropped afterwards if it turned out
/// to lie on a straight run.
pub fn approximate_polygon(contour: &[Point2D], epsilon_ratio: f64) -> Vec<Point2D> {
    if contour.len() < 3 {
        return contour.to_vec();
    }
    let epsilon = epsilon_ratio * perimeter(contour);

    let anchor = contour[0];
    let (split, split_dist) = contour
        .iter()
        .enumerate()
        .map(|(i, p)| (i, anchor.distance(p)))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
    if split_dist < GEOMETRY_EPSILON {
        return vec![anchor];
    }

    let mut closing: Vec<Point2D> = contour[split..].to_vec();
    closing.push(anchor);

    let mut result = douglas_peucker(&contour[..=split], epsilon);
    let tail = douglas_peucker(&closing, epsilon);
    // `tail` starts at the split point and ends at the anchor; both are
    // already in `result`.
    result.extend_from_slice(&tail[1..tail.len() - 1]);

    if result.len() > 3 {
        let prev = result[result.len() - 1];
        let next = result[1];
        if point_segment_distance(result[0], prev, next) <= epsilon {
            result.remove(0);
        }
    }
    result
}

/// Open-polyline Douglas-Peucker. Keeps both endpoints.
fn douglas_peucker(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0usize, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut index = start;
        for i in (start + 1)..end {
            let d = point_segment_distance(points[i], points[start], points[end]);
            if d > max_dist {
                max_dist = d;
                index = i;
            }
        }
        if max_dist > epsilon {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Distance from `p` to the segment `a`-`b`.
fn point_segment_distance(p: Point2D, a: Point2D, b: Point2D) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq < GEOMETRY_EPSILON {
        return p.distance(&a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(&Point2D::new(a.x + t * dx, a.y + t * dy))
}

/// z-component of `(b - a) x (c - a)`.
fn cross(a: Point2D, b: Point2D, c: Point2D) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Proper or touching intersection of segments `p1p2` and `q1q2`.
fn segments_intersect(p1: Point2D, p2: Point2D, q1: Point2D, q2: Point2D) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);
    (d1 * d2 <= 0.0) && (d3 * d4 <= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: f64, y: f64) -> Point2D {
        Point2D::new(x, y)
    }

    #[test]
    fn order_corners_assigns_roles() {
        let q = order_corners([pt(100.0, 60.0), pt(0.0, 60.0), pt(100.0, 0.0), pt(0.0, 0.0)]);
        assert_eq!(q.top_left, pt(0.0, 0.0));
        assert_eq!(q.top_right, pt(100.0, 0.0));
        assert_eq!(q.bottom_right, pt(100.0, 60.0));
        assert_eq!(q.bottom_left, pt(0.0, 60.0));
    }

    #[test]
    fn order_corners_is_idempotent() {
        let skewed = [pt(412.0, 38.0), pt(31.0, 477.0), pt(22.0, 55.0), pt(398.0, 501.0)];
        let once = order_corners(skewed);
        let twice = order_corners(once.corners());
        assert_eq!(once, twice);
        assert!(once.is_simple());
    }

    #[test]
    fn order_corners_ties_prefer_first_point() {
        // Two candidates share the minimal x + y.
        let q = order_corners([pt(10.0, 0.0), pt(0.0, 10.0), pt(20.0, 20.0), pt(20.0, 0.0)]);
        assert_eq!(q.top_left, pt(10.0, 0.0));
    }

    #[test]
    fn area_and_perimeter_of_rectangle() {
        let rect = Quadrilateral::rectangle(10.0, 5.0);
        assert!((rect.area() - 50.0).abs() < 1e-9);
        assert!((rect.perimeter() - 30.0).abs() < 1e-9);
        assert_eq!(polygon_area(&[pt(0.0, 0.0), pt(1.0, 1.0)]), 0.0);
    }

    #[test]
    fn degenerate_quadrilaterals_are_not_simple() {
        let duplicate =
            Quadrilateral::from_ordered([pt(0.0, 0.0), pt(0.0, 0.0), pt(5.0, 5.0), pt(0.0, 5.0)]);
        assert!(!duplicate.is_simple());

        let collinear =
            Quadrilateral::from_ordered([pt(0.0, 0.0), pt(5.0, 0.0), pt(10.0, 0.0), pt(0.0, 5.0)]);
        assert!(!collinear.is_simple());

        let bowtie =
            Quadrilateral::from_ordered([pt(0.0, 0.0), pt(10.0, 10.0), pt(10.0, 0.0), pt(0.0, 10.0)]);
        assert!(!bowtie.is_simple());

        assert!(Quadrilateral::rectangle(3.0, 4.0).is_simple());
    }

    #[test]
    fn approximate_polygon_collapses_dense_rectangle() {
        // Walk the border of a 200x100 rectangle one unit at a time, with a
        // little jitter, starting at the top-left corner.
        let mut contour = Vec::new();
        for x in 0..200 {
            contour.push(pt(x as f64, if x % 7 == 0 { 0.8 } else { 0.0 }));
        }
        for y in 0..100 {
            contour.push(pt(200.0, y as f64));
        }
        for x in (1..=200).rev() {
            contour.push(pt(x as f64, 100.0));
        }
        for y in (1..=100).rev() {
            contour.push(pt(0.0, y as f64));
        }

        let approx = approximate_polygon(&contour, 0.02);
        assert_eq!(approx.len(), 4, "got {approx:?}");
        let q = order_corners([approx[0], approx[1], approx[2], approx[3]]);
        assert!(q.top_left.distance(&pt(0.0, 0.0)) < 2.0);
        assert!(q.bottom_right.distance(&pt(200.0, 100.0)) < 2.0);
    }

    #[test]
    fn approximate_polygon_drops_mid_edge_anchor() {
        // Starts halfway along the top edge.
        let mut contour = Vec::new();
        for x in 50..=100 {
            contour.push(pt(x as f64, 0.0));
        }
        for y in 1..=100 {
            contour.push(pt(100.0, y as f64));
        }
        for x in (0..100).rev() {
            contour.push(pt(x as f64, 100.0));
        }
        for y in (0..100).rev() {
            contour.push(pt(0.0, y as f64));
        }
        for x in 1..50 {
            contour.push(pt(x as f64, 0.0));
        }

        let approx = approximate_polygon(&contour, 0.02);
        assert_eq!(approx.len(), 4, "got {approx:?}");
    }

    #[test]
    fn short_contours_pass_through() {
        let line = vec![pt(0.0, 0.0), pt(1.0, 1.0)];
        assert_eq!(approximate_polygon(&line, 0.02), line);
    }
}
