// Play-area boundary calibration from detected line segments
//
// Every usable segment is extended to a fixed reference height. The resulting
// horizontal intercepts are sorted and grouped in one pass: a value joins the
// running cluster when it is within `threshold` of that cluster's current
// representative. A new cluster is represented by its seed value until the
// first value is folded in; from then on the representative is the streaming
// mean of the folded values, with the seed left out.
//
// Membership is decided against the running representative and the seed does
// not count towards it, so a representative can differ from the mean of the
// cluster's final members. This approximation defines the reported
// positions; keep the single pass rather than a two-pass exact mean.

use nalgebra as na;
use na::Point2;
use tracing::debug;

use crate::error::{TrackerError, TrackerResult};

/// Detected line segment in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub start: Point2<f64>,
    pub end: Point2<f64>,
}

impl LineSegment {
    pub fn new(start: Point2<f64>, end: Point2<f64>) -> Self {
        LineSegment { start, end }
    }

    pub fn length(&self) -> f64 {
        na::distance(&self.start, &self.end)
    }

    /// Horizontal coordinate where the segment's line meets `height`
    ///
    /// x0 = x1 + (x1 − x2) / (y1 − y2) · (height − y1)
    ///
    /// Horizontal segments never meet the line and give `None`.
    pub fn intercept(&self, height: f64) -> Option<f64> {
        let (p1, p2) = (self.start, self.end);
        if p1.y == p2.y {
            return None;
        }
        let x0 = p1.x + (p1.x - p2.x) / (p1.y - p2.y) * (height - p1.y);
        x0.is_finite().then_some(x0)
    }
}

impl From<[f64; 4]> for LineSegment {
    fn from(v: [f64; 4]) -> Self {
        LineSegment::new(Point2::new(v[0], v[1]), Point2::new(v[2], v[3]))
    }
}

#[derive(Debug, Clone, Copy)]
struct Cluster {
    representative: f64,
    /// Values folded in after the seed
    folded: usize,
}

/// Single-pass single-linkage grouping of 1D values
///
/// Returns the cluster representatives in ascending order.
pub fn cluster_intercepts(values: &[f64], threshold: f64) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut clusters: Vec<Cluster> = Vec::new();
    for v in sorted {
        match clusters.last_mut() {
            Some(c) if v <= c.representative + threshold => {
                // First fold replaces the seed (divisor 1)
                c.folded += 1;
                c.representative += (v - c.representative) / c.folded as f64;
            }
            _ => clusters.push(Cluster { representative: v, folded: 0 }),
        }
    }

    clusters.into_iter().map(|c| c.representative).collect()
}

/// Derives stable boundary positions from one frame of line detections
#[derive(Debug, Clone)]
pub struct BoundaryCalibrator {
    pub reference_height: f64,
    pub min_segment_length: f64,
    pub cluster_threshold: f64,
}

impl BoundaryCalibrator {
    pub fn new(reference_height: f64, min_segment_length: f64, cluster_threshold: f64) -> TrackerResult<Self> {
        if !reference_height.is_finite() {
            return Err(TrackerError::InvalidConfig("boundary height must be finite".to_string()));
        }
        if !min_segment_length.is_finite() || min_segment_length < 0.0 {
            return Err(TrackerError::InvalidConfig(format!(
                "minimum segment length {} must be a finite non-negative value",
                min_segment_length
            )));
        }
        if !cluster_threshold.is_finite() || cluster_threshold < 0.0 {
            return Err(TrackerError::InvalidConfig(format!(
                "cluster threshold {} must be a finite non-negative value",
                cluster_threshold
            )));
        }
        Ok(BoundaryCalibrator {
            reference_height,
            min_segment_length,
            cluster_threshold,
        })
    }

    /// Intercepts of all segments long enough to trust, in input order
    pub fn intercepts(&self, segments: &[LineSegment]) -> Vec<f64> {
        segments
            .iter()
            .filter(|s| s.length() >= self.min_segment_length)
            .filter_map(|s| s.intercept(self.reference_height))
            .collect()
    }

    /// Ordered boundary positions for one frame of segments
    pub fn calibrate(&self, segments: &[LineSegment]) -> Vec<f64> {
        let intercepts = self.intercepts(segments);
        let boundaries = cluster_intercepts(&intercepts, self.cluster_threshold);
        debug!(
            "calibration: {} segments, {} intercepts, {} boundaries",
            segments.len(),
            intercepts.len(),
            boundaries.len()
        );
        boundaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(x1: f64, y1: f64, x2: f64, y2: f64) -> LineSegment {
        LineSegment::from([x1, y1, x2, y2])
    }

    #[test]
    fn test_intercept_extends_segment() {
        // 45 degree line through (100, 0) and (110, 10)
        let s = seg(100.0, 0.0, 110.0, 10.0);
        assert!((s.intercept(50.0).unwrap() - 150.0).abs() < 1e-12);

        // Vertical line keeps its x
        let s = seg(200.0, 10.0, 200.0, 90.0);
        assert_eq!(s.intercept(430.0), Some(200.0));
    }

    #[test]
    fn test_horizontal_segment_has_no_intercept() {
        assert_eq!(seg(0.0, 40.0, 100.0, 40.0).intercept(50.0), None);
    }

    #[test]
    fn test_clusters_with_small_threshold() {
        let reps = cluster_intercepts(&[10.0, 12.0, 11.0, 50.0, 52.0], 10.0);
        assert_eq!(reps.len(), 2);
        // Seeds 10 and 50 are dropped from the means of {11, 12} and {52}
        assert!((reps[0] - 11.5).abs() < 1e-9);
        assert!((reps[1] - 52.0).abs() < 1e-9);
        assert!(reps[0] < reps[1]);
    }

    #[test]
    fn test_lone_seed_is_its_own_representative() {
        assert_eq!(cluster_intercepts(&[10.0, 100.0], 10.0), vec![10.0, 100.0]);
    }

    #[test]
    fn test_representative_differs_from_member_mean() {
        let reps = cluster_intercepts(&[50.0, 52.0, 54.0], 10.0);
        assert_eq!(reps.len(), 1);
        assert!((reps[0] - 53.0).abs() < 1e-9);
        // The two-pass mean of the members would be 52
        assert!((reps[0] - 52.0).abs() > 0.5);
    }

    #[test]
    fn test_single_cluster_with_large_threshold() {
        let reps = cluster_intercepts(&[10.0, 12.0, 11.0, 50.0, 52.0], 100.0);
        assert_eq!(reps.len(), 1);
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let a = cluster_intercepts(&[52.0, 10.0, 50.0, 11.0, 12.0], 10.0);
        let b = cluster_intercepts(&[10.0, 12.0, 11.0, 50.0, 52.0], 10.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_running_mean_can_drift_past_first_member() {
        // 10 replaces seed 0, 15 joins (rep 12.5), then 18 joins as well even
        // though it is 18 from the seed.
        let reps = cluster_intercepts(&[0.0, 10.0, 15.0, 18.0], 10.0);
        assert_eq!(reps.len(), 1);
        assert!((reps[0] - 43.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_intercepts(&[], 10.0).is_empty());
    }

    #[test]
    fn test_short_segments_rejected() {
        let cal = BoundaryCalibrator::new(430.0, 30.0, 10.0).unwrap();
        let segments = [
            seg(90.0, 0.0, 90.0, 100.0),  // long, vertical
            seg(300.0, 0.0, 300.0, 20.0), // too short
        ];
        assert_eq!(cal.intercepts(&segments), vec![90.0]);
        assert_eq!(cal.calibrate(&segments), vec![90.0]);
    }

    #[test]
    fn test_calibrate_two_edges() {
        let cal = BoundaryCalibrator::new(430.0, 30.0, 10.0).unwrap();
        let segments = [
            seg(88.0, 100.0, 88.0, 400.0),
            seg(92.0, 50.0, 92.0, 300.0),
            seg(541.0, 60.0, 541.0, 420.0),
            seg(539.0, 10.0, 539.0, 200.0),
            seg(0.0, 240.0, 640.0, 240.0), // horizontal
        ];
        let boundaries = cal.calibrate(&segments);
        assert_eq!(boundaries.len(), 2);
        // Each edge is reported at its second sorted intercept
        assert!((boundaries[0] - 92.0).abs() < 1e-9);
        assert!((boundaries[1] - 541.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_thresholds() {
        assert!(BoundaryCalibrator::new(430.0, -1.0, 10.0).is_err());
        assert!(BoundaryCalibrator::new(430.0, 30.0, f64::NAN).is_err());
        assert!(BoundaryCalibrator::new(f64::INFINITY, 30.0, 10.0).is_err());
    }
}
