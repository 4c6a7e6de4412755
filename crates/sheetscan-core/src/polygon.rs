//! Small planar-geometry helpers used by page normalization.

use nalgebra::Point2;

/// Absolute polygon area (shoelace formula).
pub fn polygon_area(points: &[Point2<f32>]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let mut acc = 0.0f64;
    for i in 0..n {
        let j = (i + 1) % n;
        acc += points[i].x as f64 * points[j].y as f64;
        acc -= points[j].x as f64 * points[i].y as f64;
    }
    (acc.abs() * 0.5) as f32
}

/// Length of a polyline, optionally closed back to its first point.
pub fn arc_length(points: &[Point2<f32>], closed: bool) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut len: f32 = points.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
    if closed {
        len += (points[0] - points[points.len() - 1]).norm();
    }
    len
}

fn point_line_distance(p: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    let ab = b - a;
    let len = ab.norm();
    if len <= f32::EPSILON {
        return (p - a).norm();
    }
    (ab.x * (p.y - a.y) - ab.y * (p.x - a.x)).abs() / len
}

/// Douglas-Peucker simplification of an open polyline (endpoints are kept).
fn simplify_open(points: &[Point2<f32>], epsilon: f32) -> Vec<Point2<f32>> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let last = points.len() - 1;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[last] = true;

    let mut stack = vec![(0usize, last)];
    while let Some((start, end)) = stack.pop() {
        if end - start <= 1 {
            continue;
        }
        let mut max_dist = 0.0f32;
        let mut max_idx = start;
        for (i, p) in points.iter().enumerate().take(end).skip(start + 1) {
            let d = point_line_distance(*p, points[start], points[end]);
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }
        if max_dist > epsilon {
            keep[max_idx] = true;
            stack.push((start, max_idx));
            stack.push((max_idx, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Douglas-Peucker simplification of a closed contour.
///
/// The contour is split at the point farthest from its first point and both
/// halves are simplified independently, so the result does not depend on
/// where the contour tracer happened to start.
pub fn approx_polygon_closed(points: &[Point2<f32>], epsilon: f32) -> Vec<Point2<f32>> {
    if points.len() <= 3 {
        return points.to_vec();
    }
    let origin = points[0];
    let (far_idx, _) = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, (p - origin).norm()))
        .fold((0, 0.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });
    if far_idx == 0 {
        return vec![origin];
    }

    let first = simplify_open(&points[..=far_idx], epsilon);
    let mut second_half: Vec<Point2<f32>> = points[far_idx..].to_vec();
    second_half.push(origin);
    let second = simplify_open(&second_half, epsilon);

    let mut out = first;
    // drop the shared split point and the closing duplicate of `origin`
    out.extend_from_slice(&second[1..second.len() - 1]);
    out
}

fn cross(o: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull (Andrew's monotone chain), counter-clockwise in y-up terms.
pub fn convex_hull(points: &[Point2<f32>]) -> Vec<Point2<f32>> {
    let mut pts = points.to_vec();
    if pts.len() < 3 {
        return pts;
    }
    pts.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
    });
    pts.dedup();

    let mut lower: Vec<Point2<f32>> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point2<f32>> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Minimum-area bounding rectangle of a point set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinAreaRect {
    pub center: Point2<f32>,
    pub width: f32,
    pub height: f32,
    /// Direction of the rectangle's `width` side, radians, image axes (y down).
    pub angle: f32,
}

impl MinAreaRect {
    /// Rectangle tilt folded into `(-π/4, π/4]`, i.e. the smallest rotation
    /// that makes its sides axis-aligned.
    pub fn skew(&self) -> f32 {
        use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};
        let mut a = self.angle.rem_euclid(FRAC_PI_2);
        if a > FRAC_PI_4 {
            a -= FRAC_PI_2;
        }
        a
    }
}

/// Rotating-calipers search over the hull edges.
pub fn min_area_rect(points: &[Point2<f32>]) -> Option<MinAreaRect> {
    let hull = convex_hull(points);
    if hull.len() < 3 {
        return None;
    }

    let mut best: Option<(f32, MinAreaRect)> = None;
    let n = hull.len();
    for i in 0..n {
        let a = hull[i];
        let edge = hull[(i + 1) % n] - a;
        let len = edge.norm();
        if len < f32::EPSILON {
            continue;
        }
        let ux = edge / len;
        let uy = nalgebra::Vector2::new(-ux.y, ux.x);

        let (mut min_u, mut max_u) = (f32::MAX, f32::MIN);
        let (mut min_v, mut max_v) = (f32::MAX, f32::MIN);
        for p in &hull {
            let d = p - a;
            let u = d.dot(&ux);
            let v = d.dot(&uy);
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let width = max_u - min_u;
        let height = max_v - min_v;
        let area = width * height;
        if best.as_ref().map_or(true, |(best_area, _)| area < *best_area) {
            let cu = 0.5 * (min_u + max_u);
            let cv = 0.5 * (min_v + max_v);
            let center = a + ux * cu + uy * cv;
            best = Some((
                area,
                MinAreaRect {
                    center,
                    width,
                    height,
                    angle: ux.y.atan2(ux.x),
                },
            ));
        }
    }
    best.map(|(_, r)| r)
}

/// Order four page corners as TL, TR, BR, BL.
///
/// TL has the smallest `x + y`, BR the largest; TR has the smallest `y - x`
/// and BL the largest.
pub fn order_quad_corners(pts: &[Point2<f32>; 4]) -> [Point2<f32>; 4] {
    let by = |key: &dyn Fn(&Point2<f32>) -> f32, want_max: bool| -> Point2<f32> {
        let mut best = pts[0];
        for p in &pts[1..] {
            let better = if want_max {
                key(p) > key(&best)
            } else {
                key(p) < key(&best)
            };
            if better {
                best = *p;
            }
        }
        best
    };
    let sum = |p: &Point2<f32>| p.x + p.y;
    let diff = |p: &Point2<f32>| p.y - p.x;
    [
        by(&sum, false),
        by(&diff, false),
        by(&sum, true),
        by(&diff, true),
    ]
}
