//! Feature segments and segment math
//!
//! A [`FeatureSegment`] is one edge of a feature geometry together with its
//! provenance (owning feature, ring index, position within the ring). Segment
//! projection is built on `geo::Line`, which has no notion of projection
//! factors of its own.

use crate::geometry::{coord_distance, coordinate_arrays};
use crate::index::segment_envelope;
use crate::{Feature, FeatureId};
use geo::{Coord, Line, Rect};
use std::fmt;
use std::sync::Arc;

/// Stable identity of a segment: owner, ring and position in the ring
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentId {
    pub feature: FeatureId,
    pub shell: usize,
    pub index: usize,
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.feature, self.shell, self.index)
    }
}

/// Undirected, bitwise exact key of a segment's endpoints
///
/// `key(s) == key(reversed(s))`, so rings traversed in opposite directions
/// produce equal keys for their shared edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SegmentKey([u64; 4]);

impl SegmentKey {
    fn new(a: Coord<f64>, b: Coord<f64>) -> Self {
        let (lo, hi) = if compare_coords(a, b).is_le() {
            (a, b)
        } else {
            (b, a)
        };
        Self([
            coord_bits(lo.x),
            coord_bits(lo.y),
            coord_bits(hi.x),
            coord_bits(hi.y),
        ])
    }
}

/// Bits of an ordinate with -0.0 folded onto 0.0
#[inline]
fn coord_bits(value: f64) -> u64 {
    (value + 0.0).to_bits()
}

#[inline]
fn compare_coords(a: Coord<f64>, b: Coord<f64>) -> std::cmp::Ordering {
    (a.x + 0.0)
        .total_cmp(&(b.x + 0.0))
        .then((a.y + 0.0).total_cmp(&(b.y + 0.0)))
}

/// One edge of a feature geometry
#[derive(Clone, Debug)]
pub struct FeatureSegment {
    /// Reference to the owning feature
    pub feature: Arc<Feature>,
    /// Start point
    pub p0: Coord<f64>,
    /// End point
    pub p1: Coord<f64>,
    /// Index of the coordinate sequence (ring or line) within the feature
    pub shell_index: usize,
    /// Index of the segment within its sequence
    pub segment_index: usize,
}

impl FeatureSegment {
    pub fn new(
        feature: Arc<Feature>,
        p0: Coord<f64>,
        p1: Coord<f64>,
        shell_index: usize,
        segment_index: usize,
    ) -> Self {
        Self {
            feature,
            p0,
            p1,
            shell_index,
            segment_index,
        }
    }

    /// Get the owning feature id
    #[inline]
    pub fn feature_id(&self) -> FeatureId {
        self.feature.id()
    }

    /// Get the stable identity of this segment
    #[inline]
    pub fn id(&self) -> SegmentId {
        SegmentId {
            feature: self.feature.id(),
            shell: self.shell_index,
            index: self.segment_index,
        }
    }

    /// Get the undirected key used for counting
    #[inline]
    pub fn key(&self) -> SegmentKey {
        SegmentKey::new(self.p0, self.p1)
    }

    #[inline]
    pub fn line(&self) -> Line<f64> {
        Line::new(self.p0, self.p1)
    }

    #[inline]
    pub fn envelope(&self) -> Rect<f64> {
        segment_envelope(&self.line())
    }

    #[inline]
    pub fn is_zero_length(&self) -> bool {
        self.p0 == self.p1
    }

    pub fn length(&self) -> f64 {
        coord_distance(self.p0, self.p1)
    }

    /// Check for undirected endpoint equality
    pub fn equals_topo(&self, other: &FeatureSegment) -> bool {
        (self.p0 == other.p0 && self.p1 == other.p1) || (self.p0 == other.p1 && self.p1 == other.p0)
    }

    /// The same edge traversed the other way (provenance is kept)
    pub fn reversed(&self) -> Self {
        Self {
            feature: Arc::clone(&self.feature),
            p0: self.p1,
            p1: self.p0,
            shell_index: self.shell_index,
            segment_index: self.segment_index,
        }
    }
}

/// Enumerate all edges of a feature in ring order
///
/// Ring indices run across all polygons of a multi-geometry, so the
/// resulting [`SegmentId`]s are unique within the feature.
pub fn feature_segments(feature: &Arc<Feature>, orient: bool) -> Vec<FeatureSegment> {
    coordinate_arrays(feature.geometry(), orient)
        .into_iter()
        .enumerate()
        .flat_map(|(shell_index, coords)| {
            coords
                .windows(2)
                .enumerate()
                .map(|(segment_index, pair)| {
                    FeatureSegment::new(
                        Arc::clone(feature),
                        pair[0],
                        pair[1],
                        shell_index,
                        segment_index,
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Position of the projection of `p` along `line`, as a fraction of its length
///
/// 0 is the start point and 1 the end point; values outside [0, 1] project
/// beyond the ends. A zero-length line projects everything onto its start.
pub fn projection_factor(line: &Line<f64>, p: Coord<f64>) -> f64 {
    if p == line.start {
        return 0.0;
    }
    if p == line.end {
        return 1.0;
    }
    let d = line.delta();
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return 0.0;
    }
    ((p.x - line.start.x) * d.x + (p.y - line.start.y) * d.y) / len2
}

/// Projection of `p` onto the infinite line through `line`
pub fn project_point(line: &Line<f64>, p: Coord<f64>) -> Coord<f64> {
    if p == line.start || p == line.end {
        return p;
    }
    let r = projection_factor(line, p);
    line.start + line.delta() * r
}

/// Project `segment` onto `line`, clamped to the extent of `line`
///
/// Returns None when the segment projects entirely before the start or
/// entirely past the end (no mutual overlap along the line).
pub fn project_segment(line: &Line<f64>, segment: &Line<f64>) -> Option<Line<f64>> {
    let pf0 = projection_factor(line, segment.start);
    let pf1 = projection_factor(line, segment.end);
    if pf0 >= 1.0 && pf1 >= 1.0 {
        return None;
    }
    if pf0 <= 0.0 && pf1 <= 0.0 {
        return None;
    }

    let clamp = |pf: f64, p: Coord<f64>| {
        if pf < 0.0 {
            line.start
        } else if pf > 1.0 {
            line.end
        } else {
            project_point(line, p)
        }
    };

    Some(Line::new(
        clamp(pf0, segment.start),
        clamp(pf1, segment.end),
    ))
}

/// Closest point of `line` to `p`
pub fn closest_point(line: &Line<f64>, p: Coord<f64>) -> Coord<f64> {
    let factor = projection_factor(line, p);
    if factor > 0.0 && factor < 1.0 {
        return project_point(line, p);
    }
    if coord_distance(line.start, p) < coord_distance(line.end, p) {
        line.start
    } else {
        line.end
    }
}

/// Distance from `p` to the closest point of `line`
pub fn segment_distance(line: &Line<f64>, p: Coord<f64>) -> f64 {
    coord_distance(p, closest_point(line, p))
}
