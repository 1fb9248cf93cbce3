//! Close vertex detection between two collections
//!
//! Reports vertex pairs which are nearer than a tolerance but not equal,
//! typically a snapping miss. Collection 1 is indexed by feature envelope;
//! each feature of collection 0 is queried with its envelope grown by the
//! tolerance, and all vertex pairs of each candidate feature pair are
//! compared.

use crate::geometry::coord_distance;
use crate::monitor::{Computation, par_map_monitored};
use crate::{
    Feature, FeatureSource, IndexKind, IndicatorStats, Result, SpatialIndex, TaskMonitor,
    expand_by, validate_tolerance,
};
use geo::{CoordsIter, Geometry, LineString};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for [`CloseVertexFinder`]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CloseVertexConfig {
    /// Vertices strictly closer than this (and not equal) are reported
    pub distance_tolerance: f64,
    pub index: IndexKind,
}

impl Default for CloseVertexConfig {
    fn default() -> Self {
        Self {
            distance_tolerance: 1.0,
            index: IndexKind::default(),
        }
    }
}

/// Frozen results of a close vertex computation
#[derive(Debug, Clone, Default)]
pub struct CloseVertexResults {
    indicators: Vec<Geometry<f64>>,
}

impl CloseVertexResults {
    /// One line per close vertex pair, from collection 0 to collection 1
    #[inline]
    pub fn indicators(&self) -> &[Geometry<f64>] {
        &self.indicators
    }

    pub fn indicator_stats(&self) -> IndicatorStats {
        IndicatorStats::from_geometries(&self.indicators)
    }
}

/// Finds close but distinct vertices across two collections
pub struct CloseVertexFinder<'a> {
    sources: [&'a dyn FeatureSource; 2],
    config: CloseVertexConfig,
    state: Computation<CloseVertexResults>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> CloseVertexFinder<'a> {
    /// Create a finder, failing on an invalid tolerance
    pub fn new(
        source0: &'a dyn FeatureSource,
        source1: &'a dyn FeatureSource,
        config: CloseVertexConfig,
    ) -> Result<Self> {
        validate_tolerance("distance_tolerance", config.distance_tolerance)?;
        Ok(Self {
            sources: [source0, source1],
            config,
            state: Computation::default(),
        })
    }

    /// Run the computation once; None if it was cancelled
    pub fn compute(&mut self, monitor: &dyn TaskMonitor) -> Option<&CloseVertexResults> {
        let (sources, config) = (self.sources, &self.config);
        self.state.get_or_run(|| compute(sources, config, monitor))
    }

    #[inline]
    pub fn results(&self) -> Option<&CloseVertexResults> {
        self.state.get()
    }

    #[inline]
    pub fn is_computed(&self) -> bool {
        self.state.is_settled()
    }
}

fn compute(
    [source0, source1]: [&dyn FeatureSource; 2],
    config: &CloseVertexConfig,
    monitor: &dyn TaskMonitor,
) -> Option<CloseVertexResults> {
    #[cfg(feature = "profiling")]
    profiling::scope!("close_vertex::compute");

    monitor.allow_cancellation_requests();
    monitor.report("Creating feature index");
    let feature_index = config.index.build(
        source1
            .features()
            .iter()
            .map(|f| (f.envelope(), Arc::clone(f)))
            .collect(),
    );

    monitor.report("Finding close vertices");
    let tolerance = config.distance_tolerance;
    let found = par_map_monitored(source0.features(), monitor, "features", |feature| {
        close_vertices(feature, feature_index.as_ref(), tolerance)
    })?;

    let indicators: Vec<Geometry<f64>> = found.into_iter().flatten().collect();
    tracing::debug!(indicators = indicators.len(), "Close vertices computed");
    Some(CloseVertexResults { indicators })
}

fn close_vertices(
    feature: &Arc<Feature>,
    index: &dyn SpatialIndex<Arc<Feature>>,
    tolerance: f64,
) -> Vec<Geometry<f64>> {
    let mut candidates = index.query(&expand_by(&feature.envelope(), tolerance));
    candidates.sort_unstable_by_key(|c| c.id());

    let mut indicators = Vec::new();
    for candidate in candidates {
        for p0 in feature.geometry().coords_iter() {
            for p1 in candidate.geometry().coords_iter() {
                if p0 != p1 && coord_distance(p0, p1) < tolerance {
                    indicators.push(Geometry::LineString(LineString::new(vec![p0, p1])));
                }
            }
        }
    }
    indicators
}
