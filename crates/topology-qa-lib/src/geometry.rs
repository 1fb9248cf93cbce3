//! Geometry kernel glue
//!
//! Thin helpers on top of `geo` shared by the finders: decomposing geometries
//! into coordinate sequences, the interior-intersection predicate, strict
//! point-in-area tests and indicator measurement.

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::dimensions::Dimensions;
use geo::line_measures::Distance;
use geo::orient::{Direction, Orient};
use geo::{
    Coord, Euclidean, Geometry, LineString, MultiLineString, MultiPolygon, Point, Polygon, Rect,
    Relate,
};
use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::index::envelope_contains_coord;

/// Decompose a geometry into its coordinate sequences
///
/// Line components are returned as-is, polygons as one sequence per ring
/// (shell first). With `orient`, shells are normalized counter-clockwise and
/// holes clockwise, so two properly noded neighbours in a coverage traverse
/// their shared edges in opposite directions. Points produce single-coordinate
/// sequences, which contain no segments.
pub fn coordinate_arrays(geometry: &Geometry<f64>, orient: bool) -> Vec<Vec<Coord<f64>>> {
    let mut arrays = Vec::new();
    push_coordinate_arrays(geometry, orient, &mut arrays);
    arrays
}

fn push_coordinate_arrays(geometry: &Geometry<f64>, orient: bool, out: &mut Vec<Vec<Coord<f64>>>) {
    match geometry {
        Geometry::Point(p) => out.push(vec![p.0]),
        Geometry::MultiPoint(mp) => out.extend(mp.iter().map(|p| vec![p.0])),
        Geometry::Line(l) => out.push(vec![l.start, l.end]),
        Geometry::LineString(ls) => out.push(ls.0.clone()),
        Geometry::MultiLineString(mls) => out.extend(mls.iter().map(|ls| ls.0.clone())),
        Geometry::Polygon(poly) => push_rings(poly, orient, out),
        Geometry::MultiPolygon(mp) => {
            for poly in mp {
                push_rings(poly, orient, out);
            }
        }
        Geometry::Rect(r) => push_rings(&r.to_polygon(), orient, out),
        Geometry::Triangle(t) => push_rings(&t.to_polygon(), orient, out),
        Geometry::GeometryCollection(gc) => {
            for g in gc {
                push_coordinate_arrays(g, orient, out);
            }
        }
    }
}

fn push_rings(polygon: &Polygon<f64>, orient: bool, out: &mut Vec<Vec<Coord<f64>>>) {
    if orient {
        let oriented = polygon.orient(Direction::Default);
        out.push(oriented.exterior().0.clone());
        out.extend(oriented.interiors().iter().map(|ring| ring.0.clone()));
    } else {
        out.push(polygon.exterior().0.clone());
        out.extend(polygon.interiors().iter().map(|ring| ring.0.clone()));
    }
}

/// All distinct-position vertices of a geometry
///
/// Closed sequences lose their closing duplicate, so each ring vertex is
/// reported exactly once.
pub fn vertices(geometry: &Geometry<f64>) -> Vec<Coord<f64>> {
    coordinate_arrays(geometry, false)
        .into_iter()
        .flat_map(|mut seq| {
            if seq.len() > 1 && seq.first() == seq.last() {
                seq.pop();
            }
            seq
        })
        .collect()
}

/// Check whether the interiors of two geometries intersect
///
/// This is the `II` entry of the relate matrix. Unlike a boundary test it
/// holds when one geometry lies entirely inside the other. Returns None when
/// the relate computation failed, so callers can tell "disjoint" from
/// "unknown".
pub fn interiors_intersect(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<bool> {
    let result =
        robust(|| a.relate(b).get(CoordPos::Inside, CoordPos::Inside) != Dimensions::Empty);
    if result.is_none() {
        tracing::trace!("Relate failed");
    }
    result
}

/// Check whether a coordinate lies strictly inside a geometry
///
/// The envelope test is a cheap rejection before the exact point location.
pub fn is_inside(coord: Coord<f64>, geometry: &Geometry<f64>, envelope: &Rect<f64>) -> bool {
    envelope_contains_coord(envelope, coord)
        && geometry.coordinate_position(&coord) == CoordPos::Inside
}

/// Total length of the linear parts of an indicator (0 for points)
pub fn indicator_length(geometry: &Geometry<f64>) -> f64 {
    coordinate_arrays(geometry, false)
        .iter()
        .flat_map(|seq| seq.windows(2))
        .map(|pair| coord_distance(pair[0], pair[1]))
        .sum()
}

/// Euclidean distance between two coordinates
#[inline]
pub fn coord_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Euclidean.distance(&Point::from(a), &Point::from(b))
}

/// The areal part of a geometry, or None when it has no area
pub fn to_multi_polygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let polygons: Vec<Polygon<f64>> = match geometry {
        Geometry::Polygon(poly) => vec![poly.clone()],
        Geometry::MultiPolygon(mp) => mp.0.clone(),
        Geometry::Rect(r) => vec![r.to_polygon()],
        Geometry::Triangle(t) => vec![t.to_polygon()],
        Geometry::GeometryCollection(gc) => gc
            .iter()
            .filter_map(to_multi_polygon)
            .flat_map(|mp| mp.0)
            .collect(),
        _ => Vec::new(),
    };
    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon::new(polygons))
    }
}

/// The boundary rings of an areal geometry as lines
pub fn boundary_lines(polygons: &MultiPolygon<f64>) -> MultiLineString<f64> {
    MultiLineString::new(
        polygons
            .iter()
            .flat_map(|poly| std::iter::once(poly.exterior()).chain(poly.interiors()))
            .cloned()
            .collect::<Vec<LineString<f64>>>(),
    )
}

thread_local! {
    static IN_KERNEL: Cell<bool> = const { Cell::new(false) };
}

/// Run a geometric operation which may panic on ill-conditioned input
///
/// Returns None when the kernel panicked. The process panic hook still runs
/// for the caught panic and prints to stderr unless
/// [`quiet_kernel_panics`] was installed.
pub(crate) fn robust<T>(op: impl FnOnce() -> T) -> Option<T> {
    let previous = IN_KERNEL.with(|flag| flag.replace(true));
    let result = catch_unwind(AssertUnwindSafe(op)).ok();
    IN_KERNEL.with(|flag| flag.set(previous));
    result
}

#[inline]
fn in_kernel() -> bool {
    IN_KERNEL.with(Cell::get)
}

/// Install a panic hook which logs panics caught inside geometric operations
/// at `debug` instead of printing them
///
/// Any other panic is passed to the previously installed hook.
pub fn quiet_kernel_panics() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if in_kernel() {
            tracing::debug!("Geometry kernel panicked: {info}");
        } else {
            previous(info);
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{BoundingRect, Winding};
    use std::str::FromStr;

    fn parse(wkt_str: &str) -> Geometry<f64> {
        wkt::Wkt::<f64>::from_str(wkt_str)
            .unwrap()
            .try_into()
            .unwrap()
    }

    #[test]
    fn test_coordinate_arrays_polygon_with_hole() {
        let g = parse("POLYGON((0 0,10 0,10 10,0 10,0 0),(2 2,2 4,4 4,4 2,2 2))");
        let arrays = coordinate_arrays(&g, false);
        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays[0].len(), 5);
        assert_eq!(arrays[1].len(), 5);
    }

    #[test]
    fn test_coordinate_arrays_orients_rings() {
        // Clockwise shell, counter-clockwise hole
        let g = parse("POLYGON((0 0,0 10,10 10,10 0,0 0),(2 2,4 2,4 4,2 4,2 2))");
        let arrays = coordinate_arrays(&g, true);
        assert!(LineString::new(arrays[0].clone()).is_ccw());
        assert!(LineString::new(arrays[1].clone()).is_cw());

        let raw = coordinate_arrays(&g, false);
        assert!(LineString::new(raw[0].clone()).is_cw());
    }

    #[test]
    fn test_coordinate_arrays_collections() {
        let g = parse("GEOMETRYCOLLECTION(POINT(1 1),LINESTRING(0 0,1 1,2 0))");
        let arrays = coordinate_arrays(&g, true);
        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays[0].len(), 1);
        assert_eq!(arrays[1].len(), 3);
    }

    #[test]
    fn test_vertices_drop_closing_point() {
        let g = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        assert_eq!(vertices(&g).len(), 4);

        let line = parse("LINESTRING(0 0,5 5,10 0)");
        assert_eq!(vertices(&line).len(), 3);
    }

    #[test]
    fn test_interiors_intersect_contained() {
        let outer = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        let inner = parse("POLYGON((2 2,4 2,4 4,2 4,2 2))");
        assert_eq!(interiors_intersect(&outer, &inner), Some(true));
        assert_eq!(interiors_intersect(&inner, &outer), Some(true));
    }

    #[test]
    fn test_interiors_intersect_touching() {
        let a = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        let b = parse("POLYGON((10 0,20 0,20 10,10 10,10 0))");
        assert_eq!(interiors_intersect(&a, &b), Some(false));

        // A segment along the shared edge does not reach either interior
        let edge = parse("LINESTRING(10 2,10 8)");
        assert_eq!(interiors_intersect(&edge, &a), Some(false));
        let crossing = parse("LINESTRING(8 5,12 5)");
        assert_eq!(interiors_intersect(&crossing, &a), Some(true));
    }

    #[test]
    fn test_is_inside_is_strict() {
        let g = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))");
        let envelope = g.bounding_rect().unwrap();
        assert!(is_inside(Coord { x: 5.0, y: 5.0 }, &g, &envelope));
        assert!(!is_inside(Coord { x: 10.0, y: 5.0 }, &g, &envelope));
        assert!(!is_inside(Coord { x: 15.0, y: 5.0 }, &g, &envelope));
    }

    #[test]
    fn test_indicator_length() {
        assert_eq!(indicator_length(&parse("LINESTRING(0 0,3 4,3 10)")), 11.0);
        assert_eq!(indicator_length(&parse("POINT(1 2)")), 0.0);
    }

    #[test]
    fn test_to_multi_polygon() {
        assert!(to_multi_polygon(&parse("LINESTRING(0 0,1 1)")).is_none());
        let mp = to_multi_polygon(&parse("POLYGON((0 0,1 0,1 1,0 0))")).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert_eq!(boundary_lines(&mp).0.len(), 1);
    }

    #[test]
    fn test_robust_catches_panics() {
        assert_eq!(robust(|| 4), Some(4));
        let failed: Option<i32> = robust(|| panic!("kernel failure"));
        assert!(failed.is_none());
    }

    #[test]
    fn test_robust_marks_kernel_scope() {
        assert!(!in_kernel());
        assert_eq!(robust(in_kernel), Some(true));
        assert_eq!(robust(|| robust(in_kernel)), Some(Some(true)));
        // Restored after a caught panic too
        let _: Option<()> = robust(|| panic!("kernel failure"));
        assert!(!in_kernel());
    }
}
