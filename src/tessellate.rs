//! Turns wave polylines into GPU triangles: B-spline smoothing, then a
//! mitred stroke of fixed pixel width.

use bytemuck::{Pod, Zeroable};

use crate::waves::{Point, Wave};

/// Vertex layout for wave.wgsl, 24 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct StrokeVertex {
    pub position: [f32; 2], // pixels, origin top-left
    pub color: [f32; 4],    // straight alpha
}

/// Line segments per B-spline span.
pub const CURVE_SUBDIVISIONS: usize = 4;

// Miters longer than this many half-widths are cut back.
const MITER_LIMIT: f32 = 4.0;

/// Uniform cubic B-spline through the control points, flattened.
///
/// Starts exactly at the first point and ends exactly at the last; interior
/// points are approximated, not interpolated. Fewer than three points are
/// returned unchanged.
pub fn basis_curve(points: &[Point], subdivisions: usize) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let subdivisions = subdivisions.max(1);

    let mut out = Vec::with_capacity((n - 1) * subdivisions + 2);
    let first = points[0];
    out.push(first);

    // Lead-in: straight to one sixth of the way toward the second point.
    let p1 = points[1];
    let mut pen = Point::new((5.0 * first.x + p1.x) / 6.0, (5.0 * first.y + p1.y) / 6.0);
    out.push(pen);

    let span = |x0: Point, x1: Point, x: Point, pen: &mut Point, out: &mut Vec<Point>| {
        let c1 = Point::new((2.0 * x0.x + x1.x) / 3.0, (2.0 * x0.y + x1.y) / 3.0);
        let c2 = Point::new((x0.x + 2.0 * x1.x) / 3.0, (x0.y + 2.0 * x1.y) / 3.0);
        let end = Point::new(
            (x0.x + 4.0 * x1.x + x.x) / 6.0,
            (x0.y + 4.0 * x1.y + x.y) / 6.0,
        );
        for s in 1..=subdivisions {
            let t = s as f32 / subdivisions as f32;
            out.push(cubic_bezier(*pen, c1, c2, end, t));
        }
        *pen = end;
    };

    for w in points.windows(3) {
        span(w[0], w[1], w[2], &mut pen, &mut out);
    }
    // Close the last span against a repeated end point, then land on it.
    let last = points[n - 1];
    span(points[n - 2], last, last, &mut pen, &mut out);
    out.push(last);

    out
}

fn cubic_bezier(p0: Point, c1: Point, c2: Point, p3: Point, t: f32) -> Point {
    let u = 1.0 - t;
    let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
    Point::new(
        a * p0.x + b * c1.x + c * c2.x + d * p3.x,
        a * p0.y + b * c1.y + c * c2.y + d * p3.y,
    )
}

/// Triangle list for a polyline stroke. Six vertices per non-degenerate
/// segment; consecutive segments share mitred edge positions.
pub fn stroke_polyline(points: &[Point], width: f32, color: [f32; 4]) -> Vec<StrokeVertex> {
    let points = dedup(points);
    if points.len() < 2 || !(width > 0.0) {
        return Vec::new();
    }
    let half = width * 0.5;

    let normals: Vec<(f32, f32)> = points
        .windows(2)
        .map(|w| segment_normal(w[0], w[1]))
        .collect();

    // Offset vector at each point: segment normal at the ends, miter inside.
    let offsets: Vec<(f32, f32)> = (0..points.len())
        .map(|i| {
            let before = if i > 0 { Some(normals[i - 1]) } else { None };
            let after = normals.get(i).copied();
            match (before, after) {
                (Some(a), Some(b)) => miter(a, b, half),
                (Some(n), None) | (None, Some(n)) => (n.0 * half, n.1 * half),
                (None, None) => (0.0, 0.0),
            }
        })
        .collect();

    let vertex = |p: Point, o: (f32, f32), sign: f32| StrokeVertex {
        position: [p.x + o.0 * sign, p.y + o.1 * sign],
        color,
    };

    let mut out = Vec::with_capacity((points.len() - 1) * 6);
    for i in 0..points.len() - 1 {
        let (a, b) = (points[i], points[i + 1]);
        let (oa, ob) = (offsets[i], offsets[i + 1]);
        let a_left = vertex(a, oa, 1.0);
        let a_right = vertex(a, oa, -1.0);
        let b_left = vertex(b, ob, 1.0);
        let b_right = vertex(b, ob, -1.0);
        out.extend_from_slice(&[a_left, a_right, b_left, b_left, a_right, b_right]);
    }
    out
}

/// Smooth and stroke every wave into one vertex list, back to front.
pub fn tessellate_waves(waves: &[Wave], stroke_width: f32) -> Vec<StrokeVertex> {
    let mut vertices = Vec::new();
    for wave in waves {
        let curve = basis_curve(&wave.points, CURVE_SUBDIVISIONS);
        vertices.extend(stroke_polyline(
            &curve,
            stroke_width,
            wave.stroke.with_alpha(wave.opacity),
        ));
    }
    vertices
}

fn dedup(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if !(p.x.is_finite() && p.y.is_finite()) {
            continue;
        }
        match out.last() {
            Some(prev) if (prev.x - p.x).abs() < 1e-4 && (prev.y - p.y).abs() < 1e-4 => {}
            _ => out.push(p),
        }
    }
    out
}

fn segment_normal(a: Point, b: Point) -> (f32, f32) {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = (dx * dx + dy * dy).sqrt();
    (-dy / len, dx / len)
}

fn miter(a: (f32, f32), b: (f32, f32), half: f32) -> (f32, f32) {
    let (mx, my) = (a.0 + b.0, a.1 + b.1);
    let len = (mx * mx + my * my).sqrt();
    if len < 1e-6 {
        // Segment doubles back on itself.
        return (b.0 * half, b.1 * half);
    }
    let (mx, my) = (mx / len, my / len);
    let cos = mx * b.0 + my * b.1;
    let scale = (half / cos.max(1e-6)).min(half * MITER_LIMIT);
    (mx * scale, my * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    fn line(points: &[(f32, f32)]) -> Vec<Point> {
        points.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn basis_curve_keeps_endpoints() {
        let pts = line(&[(0.0, 0.0), (10.0, 20.0), (20.0, -5.0), (30.0, 7.0)]);
        let curve = basis_curve(&pts, 4);
        assert_eq!(curve.first(), pts.first());
        assert_eq!(curve.last(), pts.last());
        assert_eq!(curve.len(), 1 + 1 + 3 * 4 + 1);
    }

    #[test]
    fn basis_curve_of_straight_line_stays_straight() {
        let pts = line(&[(0.0, 5.0), (10.0, 5.0), (20.0, 5.0), (30.0, 5.0), (40.0, 5.0)]);
        let curve = basis_curve(&pts, 3);
        assert!(curve.iter().all(|p| (p.y - 5.0).abs() < 1e-5));
        assert!(curve.windows(2).all(|w| w[1].x >= w[0].x));
    }

    #[test]
    fn basis_curve_passes_short_input_through() {
        let pts = line(&[(0.0, 0.0), (1.0, 1.0)]);
        assert_eq!(basis_curve(&pts, 4), pts);
    }

    #[test]
    fn horizontal_stroke_has_expected_extent() {
        let pts = line(&[(0.0, 10.0), (10.0, 10.0), (20.0, 10.0)]);
        let verts = stroke_polyline(&pts, 4.0, [1.0, 0.0, 0.0, 0.5]);
        assert_eq!(verts.len(), 12);
        for v in &verts {
            assert!((v.position[1] - 8.0).abs() < 1e-4 || (v.position[1] - 12.0).abs() < 1e-4);
            assert_eq!(v.color, [1.0, 0.0, 0.0, 0.5]);
        }
    }

    #[test]
    fn sharp_corner_miter_is_limited() {
        let pts = line(&[(0.0, 0.0), (100.0, 0.0), (0.0, 1.0)]);
        let verts = stroke_polyline(&pts, 2.0, [1.0; 4]);
        for v in verts {
            assert!(v.position[0] <= 100.0 + 4.0 + 1e-3);
        }
    }

    #[test]
    fn degenerate_strokes_are_empty() {
        assert!(stroke_polyline(&[], 5.0, [1.0; 4]).is_empty());
        let same = line(&[(3.0, 3.0), (3.0, 3.0)]);
        assert!(stroke_polyline(&same, 5.0, [1.0; 4]).is_empty());
        let pts = line(&[(0.0, 0.0), (1.0, 0.0)]);
        assert!(stroke_polyline(&pts, 0.0, [1.0; 4]).is_empty());
    }

    #[test]
    fn waves_carry_their_opacity_into_vertex_alpha() {
        let wave = Wave {
            points: line(&[(0.0, 0.0), (10.0, 2.0), (20.0, 0.0), (30.0, 2.0)]),
            stroke: Color::rgb(0.2, 0.4, 0.6),
            opacity: 0.75,
        };
        let verts = tessellate_waves(&[wave], 5.0);
        assert!(!verts.is_empty());
        assert!(verts.iter().all(|v| v.color == [0.2, 0.4, 0.6, 0.75]));
    }
}
