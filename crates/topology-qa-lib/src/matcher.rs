//! Segment matching predicate
//!
//! Two segments "match" when they overlap along their lengths, their mutual
//! projections are within a distance tolerance of each other, and their
//! directions agree within an angle tolerance under a chosen orientation mode.

use crate::geometry::coord_distance;
use crate::segment::{project_segment, projection_factor, segment_distance};
use crate::{Result, validate_tolerance};
use geo::{Coord, Line};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

// Coefficients of the polynomial arctangent approximation on [0, 1]
const ATAN_A: f64 = 0.0776509570923569;
const ATAN_B: f64 = -0.287434475393028;
const ATAN_C: f64 = FRAC_PI_4 - ATAN_A - ATAN_B;

/// Required relative direction of matched segments
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Orientation {
    /// Both segments point the same way
    Same,
    /// The segments point in opposite directions (shared coverage edges)
    #[default]
    Opposite,
    /// Any direction
    Either,
}

/// Tolerances used by [`SegmentMatcher`]
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchParameters {
    /// Maximum Hausdorff distance between the mutual projections
    pub distance_tolerance: f64,
    /// Maximum angle between the segment directions, in degrees
    pub angle_tolerance: f64,
    /// Orientation mode
    pub orientation: Orientation,
}

impl Default for MatchParameters {
    fn default() -> Self {
        Self {
            distance_tolerance: 1.0,
            angle_tolerance: 22.5,
            orientation: Orientation::Opposite,
        }
    }
}

impl MatchParameters {
    /// Reject negative or non-finite tolerances
    pub fn validate(&self) -> Result<()> {
        validate_tolerance("distance_tolerance", self.distance_tolerance)?;
        validate_tolerance("angle_tolerance", self.angle_tolerance)
    }

    /// The same tolerances with another orientation mode
    pub fn with_orientation(&self, orientation: Orientation) -> Self {
        Self {
            orientation,
            ..self.clone()
        }
    }
}

/// Distance/angle/orientation predicate over two segments
///
/// Immutable after construction, so one matcher can be shared by all query
/// workers.
#[derive(Clone, Debug)]
pub struct SegmentMatcher {
    distance_tolerance: f64,
    angle_tolerance_rad: f64,
    orientation: Orientation,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SegmentMatcher {
    /// Create a matcher, failing on invalid tolerances
    pub fn new(params: &MatchParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            distance_tolerance: params.distance_tolerance,
            angle_tolerance_rad: params.angle_tolerance.to_radians(),
            orientation: params.orientation,
        })
    }

    #[inline]
    pub fn distance_tolerance(&self) -> f64 {
        self.distance_tolerance
    }

    #[inline]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Check whether two segments match
    pub fn is_match(&self, a: &Line<f64>, b: &Line<f64>) -> bool {
        let (Some(proj_a), Some(proj_b)) = (project_segment(b, a), project_segment(a, b)) else {
            return false;
        };

        if hausdorff_distance(&proj_a, &proj_b) > self.distance_tolerance {
            return false;
        }

        let d_angle = angle_diff(a, b);
        let d_angle_inv = angle_diff(&reverse(a), b);
        match self.orientation {
            Orientation::Opposite => d_angle_inv <= self.angle_tolerance_rad,
            Orientation::Same => d_angle <= self.angle_tolerance_rad,
            Orientation::Either => {
                d_angle <= self.angle_tolerance_rad || d_angle_inv <= self.angle_tolerance_rad
            }
        }
    }

    /// Check whether either segment projects onto the other
    pub fn has_mutual_overlap(src: &Line<f64>, tgt: &Line<f64>) -> bool {
        Self::projects_onto(src, tgt) || Self::projects_onto(tgt, src)
    }

    /// Check whether the projection of `a` onto `b` intersects `b`
    pub fn projects_onto(a: &Line<f64>, b: &Line<f64>) -> bool {
        let pos0 = projection_factor(b, a.start);
        let pos1 = projection_factor(b, a.end);
        !((pos0 >= 1.0 && pos1 >= 1.0) || (pos0 <= 0.0 && pos1 <= 0.0))
    }

    /// Check whether `coord` is within `tolerance` of either endpoint of `segment`
    pub fn is_close_to(coord: Coord<f64>, segment: &Line<f64>, tolerance: f64) -> bool {
        coord_distance(coord, segment.start) < tolerance
            || coord_distance(coord, segment.end) < tolerance
    }
}

#[inline]
fn reverse(line: &Line<f64>) -> Line<f64> {
    Line::new(line.end, line.start)
}

/// Largest endpoint-to-segment distance between two segments
pub(crate) fn hausdorff_distance(a: &Line<f64>, b: &Line<f64>) -> f64 {
    segment_distance(a, b.start)
        .max(segment_distance(a, b.end))
        .max(segment_distance(b, a.start))
        .max(segment_distance(b, a.end))
}

/// Normalize an angle into [0, 2π)
#[inline]
pub(crate) fn normalized_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly 2π for tiny negative inputs
    if a >= TAU { 0.0 } else { a }
}

/// Smallest angle between the directions of two segments, in [0, π]
pub fn angle_diff(a: &Line<f64>, b: &Line<f64>) -> f64 {
    let a0 = normalized_angle(segment_angle(a));
    let a1 = normalized_angle(segment_angle(b));
    normalized_angle(a0 - a1).min(normalized_angle(a1 - a0))
}

#[inline]
fn segment_angle(line: &Line<f64>) -> f64 {
    let d = line.delta();
    fast_atan2(d.y, d.x)
}

#[inline]
fn fast_accurate_atan(x: f64) -> f64 {
    let xx = x * x;
    ((ATAN_A * xx + ATAN_B) * xx + ATAN_C) * x
}

/// Approximate `atan2(y, x)` in [-π, π]
///
/// Maximum absolute error is about 0.00085 rad.
pub fn fast_atan2(y: f64, x: f64) -> f64 {
    let (ay, ax) = (y.abs(), x.abs());
    if ax == 0.0 && ay == 0.0 {
        return 0.0;
    }
    let invert = ay > ax;
    let z = if invert { ax / ay } else { ay / ax };
    let mut th = fast_accurate_atan(z);
    if invert {
        th = FRAC_PI_2 - th;
    }
    if x < 0.0 {
        th = PI - th;
    }
    th.copysign(y)
}
