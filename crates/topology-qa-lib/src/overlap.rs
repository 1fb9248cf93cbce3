//! Feature-level overlap detection
//!
//! Two features overlap when their interiors intersect. Touching boundaries
//! are not enough, and a feature lying entirely inside another does overlap.
//!
//! Features of collection 0 are indexed by envelope and the scanned
//! collection (collection 1, or collection 0 again in single mode) is queried
//! against it. In single mode a pair is only tested from the feature with the
//! smaller id, so every pair is tested once and nothing is compared with
//! itself. Overlap indicators for each overlapping pair come from
//! [`overlap_indicators`].

use crate::geometry::interiors_intersect;
use crate::indicators::overlap_indicators;
use crate::monitor::{Computation, par_map_monitored};
use crate::{
    Feature, FeatureId, FeatureSource, IndexKind, IndicatorKind, IndicatorStats,
    OverlapIndicators, SpatialIndex, TaskMonitor,
};
use geo::{BoundingRect, Geometry, Intersects};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Configuration for [`OverlapFinder`]
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OverlapConfig {
    /// Only scan features intersecting this geometry
    pub fence: Option<Geometry<f64>>,
    pub index: IndexKind,
}

/// One overlapping feature pair
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OverlapPair {
    /// Feature of the indexed collection
    pub f0: FeatureId,
    /// Feature of the scanned collection
    pub f1: FeatureId,
    /// Strategy which produced the pair's indicators
    pub kind: IndicatorKind,
}

/// Frozen results of an overlap computation
///
/// Pairs whose overlap could not be decided are kept as
/// [`IndicatorKind::Unresolved`] and their features count as overlapping.
#[derive(Debug, Clone, Default)]
pub struct OverlapResults {
    /// Overlapping features per collection (one map in single mode)
    overlapping: Vec<BTreeMap<FeatureId, Arc<Feature>>>,
    pairs: Vec<OverlapPair>,
    overlap_indicators: Vec<Geometry<f64>>,
    size_indicators: Vec<Geometry<f64>>,
}

impl OverlapResults {
    /// Overlapping features of a collection (0 or 1), ordered by id
    ///
    /// In single-collection mode everything is reported for collection 0.
    pub fn overlapping_features(&self, collection: usize) -> Vec<Arc<Feature>> {
        self.overlapping
            .get(collection)
            .map(|features| features.values().cloned().collect())
            .unwrap_or_default()
    }

    /// All overlapping pairs, in scan order
    #[inline]
    pub fn overlapping_pairs(&self) -> &[OverlapPair] {
        &self.pairs
    }

    /// Number of pairs no indicator strategy could resolve
    pub fn unresolved_pairs(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| p.kind == IndicatorKind::Unresolved)
            .count()
    }

    #[inline]
    pub fn overlap_indicators(&self) -> &[Geometry<f64>] {
        &self.overlap_indicators
    }

    #[inline]
    pub fn size_indicators(&self) -> &[Geometry<f64>] {
        &self.size_indicators
    }

    pub fn overlap_indicator_stats(&self) -> IndicatorStats {
        IndicatorStats::from_geometries(&self.overlap_indicators)
    }

    pub fn size_indicator_stats(&self) -> IndicatorStats {
        IndicatorStats::from_geometries(&self.size_indicators)
    }
}

/// Finds features whose interiors intersect
pub struct OverlapFinder<'a> {
    /// Indexed collection, and the scanned one in two-collection mode
    sources: (&'a dyn FeatureSource, Option<&'a dyn FeatureSource>),
    config: OverlapConfig,
    state: Computation<OverlapResults>,
}

/// An overlapping pair found while scanning one feature
struct PairOutcome {
    indexed: Arc<Feature>,
    indicators: OverlapIndicators,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> OverlapFinder<'a> {
    /// Find overlaps between features of one collection
    pub fn single(source: &'a dyn FeatureSource, config: OverlapConfig) -> Self {
        Self {
            sources: (source, None),
            config,
            state: Computation::default(),
        }
    }

    /// Find overlaps between features of two collections
    pub fn two(
        source0: &'a dyn FeatureSource,
        source1: &'a dyn FeatureSource,
        config: OverlapConfig,
    ) -> Self {
        Self {
            sources: (source0, Some(source1)),
            config,
            state: Computation::default(),
        }
    }

    #[inline]
    pub fn is_single(&self) -> bool {
        self.sources.1.is_none()
    }

    /// Run the computation once; None if it was cancelled
    pub fn compute_overlaps(&mut self, monitor: &dyn TaskMonitor) -> Option<&OverlapResults> {
        let (sources, config) = (self.sources, &self.config);
        self.state.get_or_run(|| compute(sources, config, monitor))
    }

    #[inline]
    pub fn results(&self) -> Option<&OverlapResults> {
        self.state.get()
    }

    #[inline]
    pub fn is_computed(&self) -> bool {
        self.state.is_settled()
    }
}

fn compute(
    sources: (&dyn FeatureSource, Option<&dyn FeatureSource>),
    config: &OverlapConfig,
    monitor: &dyn TaskMonitor,
) -> Option<OverlapResults> {
    #[cfg(feature = "profiling")]
    profiling::scope!("overlap::compute");

    let (indexed_source, other) = sources;
    let single = other.is_none();
    let scan_source = other.unwrap_or(indexed_source);

    monitor.allow_cancellation_requests();
    monitor.report("Creating feature index");
    let feature_index = config.index.build(
        indexed_source
            .features()
            .iter()
            .map(|f| (f.envelope(), Arc::clone(f)))
            .collect(),
    );

    let scanned = fenced_features(scan_source, config.fence.as_ref());
    tracing::debug!(
        indexed = feature_index.len(),
        scanned = scanned.len(),
        single,
        "Scanning for overlaps"
    );

    monitor.report("Finding overlapping features");
    let found = par_map_monitored(&scanned, monitor, "features", |feature| {
        find_overlaps(feature, feature_index.as_ref(), single)
    });
    let Some(found) = found else {
        tracing::debug!("Overlap computation cancelled");
        return None;
    };

    let mut results = OverlapResults {
        overlapping: vec![BTreeMap::new(); if single { 1 } else { 2 }],
        ..Default::default()
    };
    let scan_slot = if single { 0 } else { 1 };
    for (feature, outcomes) in scanned.iter().zip(found) {
        for outcome in outcomes {
            let kind = outcome.indicators.kind();
            if kind == IndicatorKind::Unresolved {
                tracing::warn!(
                    f0 = %outcome.indexed.id(),
                    f1 = %feature.id(),
                    g0 = ?outcome.indexed.geometry(),
                    g1 = ?feature.geometry(),
                    "Could not resolve overlap, reporting pair as unresolved"
                );
            }

            results.pairs.push(OverlapPair {
                f0: outcome.indexed.id(),
                f1: feature.id(),
                kind,
            });
            results
                .overlap_indicators
                .extend_from_slice(outcome.indicators.overlap());
            results
                .size_indicators
                .extend_from_slice(outcome.indicators.size());
            results.overlapping[0]
                .entry(outcome.indexed.id())
                .or_insert(outcome.indexed);
            results.overlapping[scan_slot]
                .entry(feature.id())
                .or_insert_with(|| Arc::clone(feature));
        }
    }

    tracing::debug!(
        pairs = results.pairs.len(),
        unresolved = results.unresolved_pairs(),
        "Overlaps computed"
    );
    Some(results)
}

/// Features of `source` intersecting the fence (all of them without one)
fn fenced_features(source: &dyn FeatureSource, fence: Option<&Geometry<f64>>) -> Vec<Arc<Feature>> {
    let Some(fence) = fence else {
        return source.features().to_vec();
    };
    let Some(envelope) = fence.bounding_rect() else {
        return Vec::new();
    };
    source
        .query(&envelope)
        .into_iter()
        .filter(|f| f.geometry().intersects(fence))
        .collect()
}

fn find_overlaps(
    feature: &Arc<Feature>,
    index: &dyn SpatialIndex<Arc<Feature>>,
    single: bool,
) -> Vec<PairOutcome> {
    let mut candidates = index.query(&feature.envelope());
    candidates.sort_unstable_by_key(|c| c.id());

    candidates
        .into_iter()
        .filter(|close| !single || feature.id() < close.id())
        .filter_map(|close| {
            let interiors = interiors_intersect(close.geometry(), feature.geometry());
            resolve_pair(close, feature, interiors)
        })
        .collect()
}

/// Turn the interior test of a candidate pair into an outcome
///
/// A failed interior test cannot rule the overlap out, so the pair is kept
/// without indicators and ends up unresolved.
fn resolve_pair(
    close: &Arc<Feature>,
    feature: &Arc<Feature>,
    interiors: Option<bool>,
) -> Option<PairOutcome> {
    let indicators = match interiors {
        Some(false) => return None,
        Some(true) => overlap_indicators(close.geometry(), feature.geometry()),
        None => OverlapIndicators::None,
    };
    Some(PairOutcome {
        indexed: Arc::clone(close),
        indicators,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::CancelAfter;
    use crate::{FeatureCollection, NullMonitor};
    use std::str::FromStr;

    fn parse(wkt_str: &str) -> Geometry<f64> {
        wkt::Wkt::<f64>::from_str(wkt_str)
            .unwrap()
            .try_into()
            .unwrap()
    }

    fn create_test_collection(wkts: &[&str]) -> FeatureCollection {
        FeatureCollection::from_geometries(wkts.iter().map(|w| parse(w))).unwrap()
    }

    fn ids(features: &[Arc<Feature>]) -> Vec<u64> {
        features.iter().map(|f| f.id().0).collect()
    }

    fn distance_to_lines(c: geo::Coord<f64>, lines: &[geo::Line<f64>]) -> f64 {
        lines
            .iter()
            .map(|l| crate::geometry::coord_distance(c, crate::segment::closest_point(l, c)))
            .fold(f64::INFINITY, f64::min)
    }

    /// Assert that an indicator covers exactly the given lines, up to
    /// vertex order and rounding
    fn assert_lines_match(actual: &Geometry<f64>, expected: &[&str]) {
        use crate::geometry::{coordinate_arrays, indicator_length};
        let lines = |arrays: Vec<Vec<geo::Coord<f64>>>| -> Vec<geo::Line<f64>> {
            arrays
                .iter()
                .flat_map(|seq| seq.windows(2).map(|w| geo::Line::new(w[0], w[1])))
                .collect()
        };
        let expected: Vec<Geometry<f64>> = expected.iter().map(|w| parse(w)).collect();
        let expected_lines = lines(expected.iter().flat_map(|g| coordinate_arrays(g, false)).collect());
        let actual_lines = lines(coordinate_arrays(actual, false));

        let expected_length: f64 = expected.iter().map(indicator_length).sum();
        assert!(
            (indicator_length(actual) - expected_length).abs() < 1e-6,
            "length of {actual:?}, expected {expected_length}"
        );
        for line in &actual_lines {
            for c in [line.start, line.end] {
                assert!(distance_to_lines(c, &expected_lines) < 1e-6, "{c:?} not expected");
            }
        }
        for line in &expected_lines {
            for c in [line.start, line.end] {
                assert!(distance_to_lines(c, &actual_lines) < 1e-6, "{c:?} missing");
            }
        }
    }

    #[test]
    fn test_contained_polygon_overlaps() {
        let outer = "POLYGON((0 0,10 0,10 10,0 10,0 0))";
        let inner = "POLYGON((2 2,4 2,4 4,2 4,2 2))";
        // Boundaries never meet, yet the interiors do
        let outer_boundary = parse("LINESTRING(0 0,10 0,10 10,0 10,0 0)");
        let inner_boundary = parse("LINESTRING(2 2,4 2,4 4,2 4,2 2)");
        assert!(!outer_boundary.intersects(&inner_boundary));
        assert_eq!(interiors_intersect(&parse(outer), &parse(inner)), Some(true));

        let collection = create_test_collection(&[outer, inner]);
        let mut finder = OverlapFinder::single(&collection, OverlapConfig::default());
        let results = finder.compute_overlaps(&NullMonitor).unwrap();

        assert_eq!(ids(&results.overlapping_features(0)), vec![0, 1]);
        assert!(results.overlapping_features(1).is_empty());
        assert_eq!(
            results.overlapping_pairs(),
            &[OverlapPair {
                f0: FeatureId(1),
                f1: FeatureId(0),
                kind: IndicatorKind::Segment,
            }]
        );
        assert_eq!(results.overlap_indicators().len(), 4);
        assert_eq!(results.size_indicators().len(), 4);
    }

    #[test]
    fn test_touching_polygons_do_not_overlap() {
        let collection = create_test_collection(&[
            "POLYGON((0 0,10 0,10 10,0 10,0 0))",
            "POLYGON((10 0,20 0,20 10,10 10,10 0))",
        ]);
        let mut finder = OverlapFinder::single(&collection, OverlapConfig::default());
        let results = finder.compute_overlaps(&NullMonitor).unwrap();
        assert!(results.overlapping_pairs().is_empty());
        assert!(results.overlapping_features(0).is_empty());
    }

    #[test]
    fn test_each_pair_tested_once() {
        let collection = create_test_collection(&[
            "POLYGON((0 0,10 0,10 10,0 10,0 0))",
            "POLYGON((5 5,15 5,15 15,5 15,5 5))",
            "POLYGON((8 8,18 8,18 18,8 18,8 8))",
        ]);
        let mut finder = OverlapFinder::single(&collection, OverlapConfig::default());
        let results = finder.compute_overlaps(&NullMonitor).unwrap();

        let mut pairs: Vec<(u64, u64)> = results
            .overlapping_pairs()
            .iter()
            .map(|p| (p.f1.0, p.f0.0))
            .collect();
        pairs.sort_unstable();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
        assert_eq!(results.unresolved_pairs(), 0);
    }

    #[test]
    fn test_two_collections() {
        let c0 = create_test_collection(&[
            "POLYGON((0 0,10 0,10 10,0 10,0 0))",
            "POLYGON((30 0,40 0,40 10,30 10,30 0))",
        ]);
        let c1 = create_test_collection(&["POLYGON((5 5,15 5,15 15,5 15,5 5))"]);
        let mut finder = OverlapFinder::two(&c0, &c1, OverlapConfig::default());
        assert!(!finder.is_single());
        let results = finder.compute_overlaps(&NullMonitor).unwrap();

        assert_eq!(ids(&results.overlapping_features(0)), vec![0]);
        assert_eq!(ids(&results.overlapping_features(1)), vec![0]);
        assert_eq!(results.overlapping_pairs()[0].kind, IndicatorKind::Boundary);
        assert_eq!(results.overlap_indicators().len(), 2);
        assert!((results.size_indicator_stats().max_length - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_two_collections_tests_every_pair() {
        // Equal ids in both collections must not suppress the pair
        let c0 = create_test_collection(&["POLYGON((0 0,10 0,10 10,0 10,0 0))"]);
        let c1 = create_test_collection(&["POLYGON((5 5,15 5,15 15,5 15,5 5))"]);
        let mut finder = OverlapFinder::two(&c0, &c1, OverlapConfig::default());
        let results = finder.compute_overlaps(&NullMonitor).unwrap();
        assert_eq!(results.overlapping_pairs().len(), 1);
    }

    #[test]
    fn test_star_shaped_overlap() {
        // Two triangles overlapping in a hexagon; each boundary crosses the
        // other three times
        let collection = create_test_collection(&[
            "POLYGON((0 0,6 0,3 6,0 0))",
            "POLYGON((0 4,3 -2,6 4,0 4))",
        ]);
        let mut finder = OverlapFinder::single(&collection, OverlapConfig::default());
        let results = finder.compute_overlaps(&NullMonitor).unwrap();

        assert_eq!(
            results.overlapping_pairs(),
            &[OverlapPair {
                f0: FeatureId(1),
                f1: FeatureId(0),
                kind: IndicatorKind::Boundary,
            }]
        );
        let overlap = results.overlap_indicators();
        assert_eq!(overlap.len(), 2);
        // Upright triangle inside the inverted one, then the reverse
        assert_lines_match(
            &overlap[0],
            &["LINESTRING(2 0,4 0)", "LINESTRING(1 2,2 4)", "LINESTRING(5 2,4 4)"],
        );
        assert_lines_match(
            &overlap[1],
            &["LINESTRING(2 4,4 4)", "LINESTRING(1 2,2 0)", "LINESTRING(5 2,4 0)"],
        );

        // Both boundary parts share every hexagon vertex
        assert_eq!(results.size_indicators().len(), 1);
        assert!(results.size_indicator_stats().max_length < 1e-9);
    }

    #[test]
    fn test_partially_shared_edge_overlap() {
        // The second square shares part of the bottom edge and also reaches
        // into the first one
        let collection = create_test_collection(&[
            "POLYGON((0 0,10 0,10 10,0 10,0 0))",
            "POLYGON((5 0,15 0,15 5,5 5,5 0))",
        ]);
        let mut finder = OverlapFinder::single(&collection, OverlapConfig::default());
        let results = finder.compute_overlaps(&NullMonitor).unwrap();

        assert_eq!(results.overlapping_pairs()[0].kind, IndicatorKind::Boundary);
        let overlap = results.overlap_indicators();
        assert_eq!(overlap.len(), 2);
        // The shared stretch (5 0,10 0) is in neither indicator
        assert_lines_match(&overlap[0], &["LINESTRING(10 0,10 5)"]);
        assert_lines_match(&overlap[1], &["LINESTRING(10 5,5 5,5 0)"]);

        let size = results.size_indicators();
        assert_eq!(size.len(), 1);
        assert_lines_match(&size[0], &["LINESTRING(5 0,10 0)"]);
    }

    #[test]
    fn test_failed_interior_test_is_unresolved() {
        let collection = create_test_collection(&[
            "POLYGON((0 0,10 0,10 10,0 10,0 0))",
            "POLYGON((5 5,15 5,15 15,5 15,5 5))",
        ]);
        let features = collection.features();
        let (f0, f1) = (&features[0], &features[1]);

        assert!(resolve_pair(f1, f0, Some(false)).is_none());
        let resolved = resolve_pair(f1, f0, Some(true)).unwrap();
        assert_eq!(resolved.indicators.kind(), IndicatorKind::Boundary);

        // The pair is kept, not dropped as disjoint
        let failed = resolve_pair(f1, f0, None).unwrap();
        assert_eq!(failed.indexed.id(), FeatureId(1));
        assert_eq!(failed.indicators.kind(), IndicatorKind::Unresolved);
        assert!(failed.indicators.overlap().is_empty());
    }

    #[test]
    fn test_fence_limits_scanned_features() {
        let collection = create_test_collection(&[
            "POLYGON((0 0,10 0,10 10,0 10,0 0))",
            "POLYGON((5 5,15 5,15 15,5 15,5 5))",
            "POLYGON((100 0,110 0,110 10,100 10,100 0))",
            "POLYGON((105 5,115 5,115 15,105 15,105 5))",
        ]);
        let config = OverlapConfig {
            fence: Some(parse("POLYGON((90 -5,120 -5,120 20,90 20,90 -5))")),
            ..Default::default()
        };
        let mut finder = OverlapFinder::single(&collection, config);
        let results = finder.compute_overlaps(&NullMonitor).unwrap();
        assert_eq!(ids(&results.overlapping_features(0)), vec![2, 3]);
    }

    #[test]
    fn test_all_index_kinds_agree() {
        let collection = create_test_collection(&[
            "POLYGON((0 0,10 0,10 10,0 10,0 0))",
            "POLYGON((5 5,15 5,15 15,5 15,5 5))",
            "POLYGON((2 2,4 2,4 4,2 4,2 2))",
        ]);
        let mut expected = None;
        for index in [IndexKind::RTree, IndexKind::Quadtree, IndexKind::BruteForce] {
            let mut finder =
                OverlapFinder::single(&collection, OverlapConfig { fence: None, index });
            let pairs = finder
                .compute_overlaps(&NullMonitor)
                .unwrap()
                .overlapping_pairs()
                .to_vec();
            match &expected {
                None => expected = Some(pairs),
                Some(e) => assert_eq!(e, &pairs, "index kind {index:?}"),
            }
        }
    }

    #[test]
    fn test_cancellation() {
        let collection = create_test_collection(&[
            "POLYGON((0 0,10 0,10 10,0 10,0 0))",
            "POLYGON((5 5,15 5,15 15,5 15,5 5))",
        ]);
        let mut finder = OverlapFinder::single(&collection, OverlapConfig::default());
        assert!(finder.compute_overlaps(&CancelAfter::new(0)).is_none());
        assert!(finder.is_computed());
        assert!(finder.results().is_none());
    }
}
