use serde::{Deserialize, Serialize};

/// Distances below this are treated as degenerate (collapsed landmarks).
pub const EPSILON: f32 = 1e-6;

/// A 2D landmark position in image pixel coordinates (origin top-left, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Point2) -> Point2 {
        Point2::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Mean position of a set of points. Returns `None` for an empty slice.
pub fn centroid(points: &[Point2]) -> Option<Point2> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point2::new(sx / n, sy / n))
}

/// Eye aspect ratio of a single eye.
///
/// Points follow the six-point contour convention: `p0`/`p3` are the eye
/// corners, `p1`/`p2` the upper lid and `p5`/`p4` the lower lid, so the
/// vertical pairs are (1, 5) and (2, 4) and the horizontal pair is (0, 3):
///
/// ```text
/// EAR = (|p1 - p5| + |p2 - p4|) / (2 * |p0 - p3|)
/// ```
///
/// Returns `None` when the corners coincide.
pub fn eye_aspect_ratio(eye: &[Point2; 6]) -> Option<f32> {
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal < EPSILON {
        return None;
    }
    let vertical_1 = eye[1].distance(&eye[5]);
    let vertical_2 = eye[2].distance(&eye[4]);
    Some((vertical_1 + vertical_2) / (2.0 * horizontal))
}

/// `asin` of a ratio clamped to [-1, 1], in degrees.
pub(crate) fn ratio_to_degrees(ratio: f32) -> f32 {
    ratio.clamp(-1.0, 1.0).asin().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Eye of width 1 whose lids are `opening` apart at both vertical pairs.
    fn eye(opening: f32) -> [Point2; 6] {
        let h = opening / 2.0;
        [
            Point2::new(0.0, 0.0),
            Point2::new(1.0 / 3.0, -h),
            Point2::new(2.0 / 3.0, -h),
            Point2::new(1.0, 0.0),
            Point2::new(2.0 / 3.0, h),
            Point2::new(1.0 / 3.0, h),
        ]
    }

    #[test]
    fn test_distance_and_midpoint() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.midpoint(&b), Point2::new(1.5, 2.0));
    }

    #[test]
    fn test_ear_matches_opening_over_width() {
        let ear = eye_aspect_ratio(&eye(0.3)).unwrap();
        assert!((ear - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_ear_scale_invariant() {
        let small = eye(0.25);
        let large = small.map(|p| Point2::new(p.x * 40.0 + 100.0, p.y * 40.0 + 80.0));
        let a = eye_aspect_ratio(&small).unwrap();
        let b = eye_aspect_ratio(&large).unwrap();
        assert!((a - b).abs() < 1e-5);
    }

    #[test]
    fn test_ear_degenerate_eye() {
        assert!(eye_aspect_ratio(&[Point2::default(); 6]).is_none());
    }

    #[test]
    fn test_centroid() {
        assert!(centroid(&[]).is_none());
        let c = centroid(&[Point2::new(0.0, 0.0), Point2::new(2.0, 4.0)]).unwrap();
        assert_eq!(c, Point2::new(1.0, 2.0));
    }

    #[test]
    fn test_ratio_to_degrees_clamps() {
        assert!((ratio_to_degrees(2.0) - 90.0).abs() < 1e-4);
        assert!((ratio_to_degrees(-0.5) + 30.0).abs() < 1e-4);
        assert_eq!(ratio_to_degrees(0.0), 0.0);
    }
}
