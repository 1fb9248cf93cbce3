//! Indicator construction
//!
//! Indicators are throwaway diagnostic geometries marking where an anomaly is
//! and how large it is:
//!
//! - **Size indicators** for a matched segment pair show the gap between the
//!   two segments ([`size_indicators`]).
//! - **Overlap indicators** for two overlapping features come from one of two
//!   strategies. [`OverlapBoundaryIndicators`] uses boolean operations on the
//!   areas and is preferred, but ill-conditioned input can defeat it.
//!   [`OverlapSegmentIndicators`] works edge by edge and always finds the
//!   overlapping edges. [`overlap_indicators`] runs them in that order and
//!   tags the result with the strategy that succeeded.

use crate::geometry::{
    boundary_lines, coord_distance, coordinate_arrays, indicator_length, interiors_intersect,
    is_inside, robust, to_multi_polygon, vertices,
};
use crate::segment::{closest_point, project_segment};
use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{
    Area, BooleanOps, BoundingRect, Closest, ClosestPoint, Coord, Geometry, Line, LineString,
    MultiLineString, MultiPolygon, Point,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which overlap indicator strategy produced a pair's indicators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IndicatorKind {
    /// Boolean-operation based boundary indicators
    Boundary,
    /// Segment-by-segment fallback
    Segment,
    /// Neither strategy produced anything
    Unresolved,
}

/// Count and length range of an indicator list
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndicatorStats {
    /// Number of indicators
    pub count: usize,
    /// Shortest indicator length (0 for points, or when empty)
    pub min_length: f64,
    /// Longest indicator length (0 when empty)
    pub max_length: f64,
}

impl IndicatorStats {
    pub fn from_geometries(geometries: &[Geometry<f64>]) -> Self {
        let lengths: Vec<f64> = geometries.iter().map(indicator_length).collect();
        if lengths.is_empty() {
            return Self::default();
        }
        Self {
            count: lengths.len(),
            min_length: lengths.iter().copied().fold(f64::INFINITY, f64::min),
            max_length: lengths.iter().copied().fold(0.0, f64::max),
        }
    }
}

/// Build the size indicators for a matched pair of segments
///
/// When both mutual projections are the same segment the pair is parallel
/// and overlapping, and the indicators are the projected endpoints not shared
/// by both segments. Otherwise a single line shows the largest distance
/// between the projections.
pub fn size_indicators(a: &Line<f64>, b: &Line<f64>) -> Vec<Geometry<f64>> {
    let (Some(proj_b_on_a), Some(proj_a_on_b)) = (project_segment(a, b), project_segment(b, a))
    else {
        return Vec::new();
    };

    if lines_equal_topo(&proj_b_on_a, &proj_a_on_b) {
        return equal_projection_indicators(a, b, &proj_b_on_a);
    }
    let line = vertex_hausdorff_line(&proj_b_on_a, &proj_a_on_b);
    vec![Geometry::LineString(LineString::new(vec![line.start, line.end]))]
}

/// Endpoints of a shared projection which are not endpoints of both segments
pub fn equal_projection_indicators(
    a: &Line<f64>,
    b: &Line<f64>,
    projection: &Line<f64>,
) -> Vec<Geometry<f64>> {
    [projection.start, projection.end]
        .into_iter()
        .filter(|p| {
            let in_a = *p == a.start || *p == a.end;
            let in_b = *p == b.start || *p == b.end;
            !(in_a && in_b)
        })
        .map(|p| Geometry::Point(Point::from(p)))
        .collect()
}

/// The vertex pair realizing the vertex Hausdorff distance of two segments
///
/// Each endpoint is paired with its closest point on the other segment and
/// the farthest such pair wins.
pub fn vertex_hausdorff_line(a: &Line<f64>, b: &Line<f64>) -> Line<f64> {
    [
        (a.start, closest_point(b, a.start)),
        (a.end, closest_point(b, a.end)),
        (b.start, closest_point(a, b.start)),
        (b.end, closest_point(a, b.end)),
    ]
    .into_iter()
    .map(|(p, q)| (coord_distance(p, q), Line::new(p, q)))
    .fold((f64::NEG_INFINITY, Line::new(a.start, a.start)), |best, next| {
        if next.0 > best.0 { next } else { best }
    })
    .1
}

#[inline]
fn lines_equal_topo(a: &Line<f64>, b: &Line<f64>) -> bool {
    (a.start == b.start && a.end == b.end) || (a.start == b.end && a.end == b.start)
}

/// Boundary-based overlap indicators
///
/// For each geometry, the part of its boundary lying strictly inside the
/// other geometry bounds the overlap region. When both parts exist, the
/// discrete Hausdorff distance between them measures the overlap size.
#[derive(Clone, Debug, Default)]
pub struct OverlapBoundaryIndicators {
    pub overlap_indicators: Vec<Geometry<f64>>,
    pub size_indicators: Vec<Geometry<f64>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl OverlapBoundaryIndicators {
    /// Compute the indicators; anything that cannot be computed stays empty
    pub fn compute(g0: &Geometry<f64>, g1: &Geometry<f64>) -> Self {
        let (Some(p0), Some(p1)) = (to_multi_polygon(g0), to_multi_polygon(g1)) else {
            return Self::default();
        };

        // A collapsed or failed intersection means the boolean ops can't be trusted here
        let area = robust(|| p0.intersection(&p1).unsigned_area());
        if !area.is_some_and(|a| a > 0.0) {
            tracing::trace!(?area, "Boundary indicators unavailable");
            return Self::default();
        }

        let Some((ob0, ob1)) =
            robust(|| (overlapping_boundary(&p0, &p1), overlapping_boundary(&p1, &p0)))
        else {
            tracing::trace!("Boundary clipping failed");
            return Self::default();
        };

        let mut result = Self::default();
        if !ob0.0.is_empty()
            && !ob1.0.is_empty()
            && let Some(line) = discrete_hausdorff_line(&ob0, &ob1)
        {
            result
                .size_indicators
                .push(Geometry::LineString(LineString::new(vec![line.start, line.end])));
        }
        if !ob0.0.is_empty() {
            result.overlap_indicators.push(Geometry::MultiLineString(ob0));
        }
        if !ob1.0.is_empty() {
            result.overlap_indicators.push(Geometry::MultiLineString(ob1));
        }
        result
    }
}

/// The part of `b`'s boundary strictly inside `a`
///
/// Edges running along `a`'s boundary are shared, not overlapping, and are
/// dropped.
fn overlapping_boundary(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiLineString<f64> {
    let clipped = a.clip(&boundary_lines(b), false);

    let mut lines = Vec::new();
    for piece in &clipped {
        let mut current: Vec<Coord<f64>> = Vec::new();
        for segment in piece.lines() {
            let mid = Coord {
                x: (segment.start.x + segment.end.x) / 2.0,
                y: (segment.start.y + segment.end.y) / 2.0,
            };
            if segment.start != segment.end && a.coordinate_position(&mid) == CoordPos::Inside {
                if current.last() != Some(&segment.start) {
                    flush(&mut current, &mut lines);
                    current.push(segment.start);
                }
                current.push(segment.end);
            } else {
                flush(&mut current, &mut lines);
            }
        }
        flush(&mut current, &mut lines);
    }
    MultiLineString::new(lines)
}

fn flush(current: &mut Vec<Coord<f64>>, lines: &mut Vec<LineString<f64>>) {
    if current.len() > 1 {
        lines.push(LineString::new(std::mem::take(current)));
    } else {
        current.clear();
    }
}

/// Line joining the vertex of one geometry farthest from the other with its
/// closest point there
fn discrete_hausdorff_line(
    a: &MultiLineString<f64>,
    b: &MultiLineString<f64>,
) -> Option<Line<f64>> {
    let directed = |from: &MultiLineString<f64>, to: &MultiLineString<f64>| {
        from.iter()
            .flat_map(|ls| ls.0.iter().copied())
            .filter_map(|v| match to.closest_point(&Point::from(v)) {
                Closest::Intersection(p) | Closest::SinglePoint(p) => Some((v, p.0)),
                Closest::Indeterminate => None,
            })
            .collect::<Vec<_>>()
    };

    directed(a, b)
        .into_iter()
        .chain(directed(b, a))
        .map(|(p, q)| (coord_distance(p, q), Line::new(p, q)))
        .max_by(|x, y| x.0.total_cmp(&y.0))
        .map(|(_, line)| line)
}

/// Segment-based overlap indicators
///
/// Every edge of one geometry whose interior meets the interior of the other
/// is an overlap indicator; every vertex strictly inside the other geometry is
/// a size indicator. Both directions are evaluated.
#[derive(Clone, Debug, Default)]
pub struct OverlapSegmentIndicators {
    pub overlap_indicators: Vec<Geometry<f64>>,
    pub size_indicators: Vec<Geometry<f64>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl OverlapSegmentIndicators {
    pub fn compute(g0: &Geometry<f64>, g1: &Geometry<f64>) -> Self {
        let mut result = Self::default();
        result.add(g0, g1);
        result.add(g1, g0);
        result
    }

    fn add(&mut self, g0: &Geometry<f64>, g1: &Geometry<f64>) {
        if let Some(envelope) = g1.bounding_rect() {
            self.size_indicators.extend(
                vertices(g0)
                    .into_iter()
                    .filter(|v| is_inside(*v, g1, &envelope))
                    .map(|v| Geometry::Point(Point::from(v))),
            );
        }

        for coords in coordinate_arrays(g0, true) {
            for pair in coords.windows(2) {
                let edge = Geometry::LineString(LineString::new(vec![pair[0], pair[1]]));
                if interiors_intersect(g1, &edge) == Some(true) {
                    self.overlap_indicators.push(edge);
                }
            }
        }
    }
}

/// Overlap indicators tagged with the strategy which produced them
#[derive(Clone, Debug)]
pub enum OverlapIndicators {
    Boundary {
        overlap: Vec<Geometry<f64>>,
        size: Vec<Geometry<f64>>,
    },
    Segment {
        overlap: Vec<Geometry<f64>>,
        size: Vec<Geometry<f64>>,
    },
    None,
}

impl OverlapIndicators {
    pub fn kind(&self) -> IndicatorKind {
        match self {
            OverlapIndicators::Boundary { .. } => IndicatorKind::Boundary,
            OverlapIndicators::Segment { .. } => IndicatorKind::Segment,
            OverlapIndicators::None => IndicatorKind::Unresolved,
        }
    }

    pub fn overlap(&self) -> &[Geometry<f64>] {
        match self {
            OverlapIndicators::Boundary { overlap, .. }
            | OverlapIndicators::Segment { overlap, .. } => overlap,
            OverlapIndicators::None => &[],
        }
    }

    pub fn size(&self) -> &[Geometry<f64>] {
        match self {
            OverlapIndicators::Boundary { size, .. } | OverlapIndicators::Segment { size, .. } => {
                size
            }
            OverlapIndicators::None => &[],
        }
    }
}

/// Compute overlap indicators, falling back from boundary to segment strategy
///
/// The boundary strategy is accepted only if it found both overlap and size
/// indicators; the segment strategy is accepted if it found anything.
pub fn overlap_indicators(g0: &Geometry<f64>, g1: &Geometry<f64>) -> OverlapIndicators {
    #[cfg(feature = "profiling")]
    profiling::scope!("indicators::overlap_indicators");

    let boundary = OverlapBoundaryIndicators::compute(g0, g1);
    if !boundary.overlap_indicators.is_empty() && !boundary.size_indicators.is_empty() {
        return OverlapIndicators::Boundary {
            overlap: boundary.overlap_indicators,
            size: boundary.size_indicators,
        };
    }

    let segment = OverlapSegmentIndicators::compute(g0, g1);
    if !segment.overlap_indicators.is_empty() || !segment.size_indicators.is_empty() {
        return OverlapIndicators::Segment {
            overlap: segment.overlap_indicators,
            size: segment.size_indicators,
        };
    }

    OverlapIndicators::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn parse(wkt_str: &str) -> Geometry<f64> {
        wkt::Wkt::<f64>::from_str(wkt_str)
            .unwrap()
            .try_into()
            .unwrap()
    }

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Line<f64> {
        Line::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 })
    }

    fn total_length(geometries: &[Geometry<f64>]) -> f64 {
        geometries.iter().map(indicator_length).sum()
    }

    #[test]
    fn test_size_indicator_for_offset_segments() {
        let a = line(0.0, 0.0, 10.0, 0.0);
        let b = line(10.0, 0.4, 0.0, 0.5);
        let indicators = size_indicators(&a, &b);
        assert_eq!(indicators.len(), 1);
        let length = indicator_length(&indicators[0]);
        assert!(length > 0.4 && length <= 0.5 + 1e-9, "length {length}");
    }

    #[test]
    fn test_equal_projection_indicators() {
        // Collinear, partially overlapping segments: projections coincide on [5, 10]
        let a = line(0.0, 0.0, 10.0, 0.0);
        let b = line(15.0, 0.0, 5.0, 0.0);
        let indicators = size_indicators(&a, &b);
        let points: Vec<Geometry<f64>> = vec![
            Geometry::Point(Point::new(5.0, 0.0)),
            Geometry::Point(Point::new(10.0, 0.0)),
        ];
        assert_eq!(indicators.len(), 2);
        for p in &points {
            assert!(indicators.contains(p));
        }

        // Sharing an endpoint removes it from the indicators
        let c = line(10.0, 0.0, 5.0, 0.0);
        let indicators = size_indicators(&a, &c);
        assert_eq!(indicators, vec![Geometry::Point(Point::new(5.0, 0.0))]);
    }

    #[test]
    fn test_size_indicators_no_overlap() {
        let a = line(0.0, 0.0, 10.0, 0.0);
        assert!(size_indicators(&a, &line(20.0, 0.0, 30.0, 0.0)).is_empty());
    }

    #[test]
    fn test_vertex_hausdorff_line() {
        let a = line(0.0, 0.0, 10.0, 0.0);
        let b = line(0.0, 1.0, 10.0, 3.0);
        let h = vertex_hausdorff_line(&a, &b);
        assert_eq!(coord_distance(h.start, h.end), 3.0);
        assert_eq!(h.start, Coord { x: 10.0, y: 3.0 });
    }

    #[test]
    fn test_boundary_indicators_partial_overlap() {
        let a = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        let b = parse("POLYGON((5 5,15 5,15 15,5 15,5 5))");
        let result = OverlapBoundaryIndicators::compute(&a, &b);

        assert_eq!(result.overlap_indicators.len(), 2);
        assert!((total_length(&result.overlap_indicators) - 20.0).abs() < 1e-9);
        assert_eq!(result.size_indicators.len(), 1);
        assert!((indicator_length(&result.size_indicators[0]) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_boundary_indicators_touching_collapse() {
        // Shared edge only: the intersection has no area
        let a = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        let b = parse("POLYGON((10 0,20 0,20 10,10 10,10 0))");
        let result = OverlapBoundaryIndicators::compute(&a, &b);
        assert!(result.overlap_indicators.is_empty());
        assert!(result.size_indicators.is_empty());
    }

    #[test]
    fn test_boundary_indicators_non_areal() {
        let a = parse("LINESTRING(0 0,10 10)");
        let b = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        let result = OverlapBoundaryIndicators::compute(&a, &b);
        assert!(result.overlap_indicators.is_empty());
    }

    #[test]
    fn test_segment_indicators_contained() {
        let outer = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        let inner = parse("POLYGON((2 2,4 2,4 4,2 4,2 2))");
        let result = OverlapSegmentIndicators::compute(&outer, &inner);

        // All inner edges, no outer edges
        assert_eq!(result.overlap_indicators.len(), 4);
        // All inner vertices are inside the outer polygon
        assert_eq!(result.size_indicators.len(), 4);
    }

    #[test]
    fn test_overlap_indicators_prefers_boundary() {
        let a = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        let b = parse("POLYGON((5 5,15 5,15 15,5 15,5 5))");
        let result = overlap_indicators(&a, &b);
        assert_eq!(result.kind(), IndicatorKind::Boundary);
        assert_eq!(result.overlap().len(), 2);
        assert_eq!(result.size().len(), 1);
    }

    #[test]
    fn test_overlap_indicators_falls_back_when_contained() {
        let outer = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        let inner = parse("POLYGON((2 2,4 2,4 4,2 4,2 2))");
        let result = overlap_indicators(&outer, &inner);
        assert_eq!(result.kind(), IndicatorKind::Segment);
        assert_eq!(result.overlap().len(), 4);
        assert_eq!(result.size().len(), 4);
    }

    #[test]
    fn test_overlap_indicators_unresolved() {
        let a = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        let b = parse("POLYGON((20 0,30 0,30 10,20 10,20 0))");
        let result = overlap_indicators(&a, &b);
        assert_eq!(result.kind(), IndicatorKind::Unresolved);
        assert!(result.overlap().is_empty());
        assert!(result.size().is_empty());
    }

    #[test]
    fn test_indicator_stats() {
        let geometries = vec![
            parse("LINESTRING(0 0,3 4)"),
            parse("LINESTRING(0 0,0 2)"),
            parse("POINT(1 1)"),
        ];
        let stats = IndicatorStats::from_geometries(&geometries);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_length, 0.0);
        assert_eq!(stats.max_length, 5.0);
        assert_eq!(IndicatorStats::from_geometries(&[]), IndicatorStats::default());
    }
}
