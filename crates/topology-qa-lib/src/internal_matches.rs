//! Gap and sliver detection within a single coverage
//!
//! Adjacent polygons of a clean coverage share their edges exactly, so shared
//! edges are counted away first. What remains are *unique* segments; a unique
//! segment which nearly coincides with a unique segment of a neighbouring
//! feature marks a gap or an overlap between the two.
//!
//! The computation runs in three phases:
//!
//! 1. **Count**: [`FeatureSegmentCounter`] extracts the unique segments
//!    (zero-length segments excluded, optional fence applied).
//! 2. **Build**: the unique segments are bulk-loaded into a spatial index.
//! 3. **Query**: every unique segment is matched against its index
//!    candidates in parallel. Matching uses the opposite orientation only,
//!    since consistently wound neighbours traverse shared edges in reverse.

use crate::indicators::size_indicators;
use crate::monitor::{Computation, par_map_monitored};
use crate::{
    Feature, FeatureId, FeatureSegment, FeatureSegmentCounter, FeatureSource, IndexKind,
    IndicatorStats, MatchParameters, Orientation, Result, SegmentId, SegmentMatcher,
    SpatialIndex, TaskMonitor, expand_by,
};
use dashmap::DashMap;
use geo::{Geometry, LineString, Rect};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Partners of one segment in the match relation
type Partners = SmallVec<[SegmentId; 2]>;

/// Configuration for [`InternalMatchedSegmentFinder`]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InternalMatchConfig {
    /// Matching tolerances (the orientation is always forced to opposite)
    pub params: MatchParameters,
    /// Optional region of interest
    pub fence: Option<Geometry<f64>>,
    /// Build matched-segment and size-indicator geometries
    pub create_indicators: bool,
    /// Spatial index implementation
    pub index: IndexKind,
}

impl Default for InternalMatchConfig {
    fn default() -> Self {
        Self {
            params: MatchParameters::default(),
            fence: None,
            create_indicators: true,
            index: IndexKind::default(),
        }
    }
}

/// Outcome of a single query segment
struct QueryOutcome {
    matched: bool,
    indicators: Vec<Geometry<f64>>,
}

/// Frozen results of an internal match computation
pub struct InternalMatchResults {
    unique_segments: Vec<FeatureSegment>,
    matched_feature_segments: Vec<FeatureSegment>,
    matched_segments: Vec<Geometry<f64>>,
    size_indicators: Vec<Geometry<f64>>,
    partners: HashMap<SegmentId, Partners>,
    segment_index: Box<dyn SpatialIndex<FeatureSegment>>,
}

impl InternalMatchResults {
    /// Segments which no other ring shares
    #[inline]
    pub fn unique_segments(&self) -> &[FeatureSegment] {
        &self.unique_segments
    }

    /// Unique segments which matched at least one other segment
    #[inline]
    pub fn matched_feature_segments(&self) -> &[FeatureSegment] {
        &self.matched_feature_segments
    }

    /// Matched segments as line geometries (empty without indicators)
    #[inline]
    pub fn matched_segments(&self) -> &[Geometry<f64>] {
        &self.matched_segments
    }

    /// Gap size indicators (empty without indicators)
    ///
    /// A line marks the gap width between two matched segments. When the
    /// segments lie on the same line and one ends inside the other (an
    /// unnoded vertex, typical at zero tolerance), the indicator is a point at
    /// that vertex instead, once per matched pair.
    #[inline]
    pub fn size_indicators(&self) -> &[Geometry<f64>] {
        &self.size_indicators
    }

    pub fn size_indicator_stats(&self) -> IndicatorStats {
        IndicatorStats::from_geometries(&self.size_indicators)
    }

    /// Segments matched with `segment`, ordered by id
    pub fn match_partners(&self, segment: SegmentId) -> &[SegmentId] {
        self.partners.get(&segment).map_or(&[], |p| p.as_slice())
    }

    /// Features owning at least one matched segment, ordered by id
    pub fn matched_features(&self) -> Vec<Arc<Feature>> {
        features_by_id(self.matched_feature_segments.iter())
    }

    /// Features owning at least one unique segment, ordered by id
    pub fn unique_segment_features(&self) -> Vec<Arc<Feature>> {
        features_by_id(self.unique_segments.iter())
    }

    /// Features with a unique segment ending exactly at an endpoint of a
    /// matched segment, ordered by id
    pub fn adjacent_features_to_matches(&self) -> Vec<Arc<Feature>> {
        let mut features = BTreeMap::new();
        for matched in &self.matched_feature_segments {
            for pt in [matched.p0, matched.p1] {
                for candidate in self.segment_index.query(&Rect::new(pt, pt)) {
                    if candidate.p0 == pt || candidate.p1 == pt {
                        features
                            .entry(candidate.feature_id())
                            .or_insert_with(|| Arc::clone(&candidate.feature));
                    }
                }
            }
        }
        features.into_values().collect()
    }

    /// Matched segments bridged by a small triangular gap or overlap
    ///
    /// The segment has exactly two partners, both from the same feature, and
    /// each partner matched nothing else.
    pub fn triangle_matches(&self) -> Vec<FeatureSegment> {
        self.matched_feature_segments
            .iter()
            .filter(|segment| {
                let partners = self.match_partners(segment.id());
                partners.len() == 2
                    && partners[0].feature == partners[1].feature
                    && partners.iter().all(|p| self.match_partners(*p).len() == 1)
            })
            .cloned()
            .collect()
    }
}

/// Finds unique segments of one coverage which match but are not identical
pub struct InternalMatchedSegmentFinder<'a> {
    source: &'a dyn FeatureSource,
    config: InternalMatchConfig,
    matcher: SegmentMatcher,
    state: Computation<InternalMatchResults>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> InternalMatchedSegmentFinder<'a> {
    /// Create a finder, failing on invalid tolerances
    pub fn new(source: &'a dyn FeatureSource, config: InternalMatchConfig) -> Result<Self> {
        let matcher = SegmentMatcher::new(&config.params.with_orientation(Orientation::Opposite))?;
        Ok(Self {
            source,
            config,
            matcher,
            state: Computation::default(),
        })
    }

    #[inline]
    pub fn config(&self) -> &InternalMatchConfig {
        &self.config
    }

    /// Run the computation (only the first call does any work)
    ///
    /// Returns None if the computation was cancelled.
    pub fn compute_matches(&mut self, monitor: &dyn TaskMonitor) -> Option<&InternalMatchResults> {
        let (source, config, matcher) = (self.source, &self.config, &self.matcher);
        self.state
            .get_or_run(|| compute(source, config, matcher, monitor))
    }

    /// Results of a completed computation
    #[inline]
    pub fn results(&self) -> Option<&InternalMatchResults> {
        self.state.get()
    }

    /// Check whether the computation has run (completed or cancelled)
    #[inline]
    pub fn is_computed(&self) -> bool {
        self.state.is_settled()
    }
}

fn compute(
    source: &dyn FeatureSource,
    config: &InternalMatchConfig,
    matcher: &SegmentMatcher,
    monitor: &dyn TaskMonitor,
) -> Option<InternalMatchResults> {
    #[cfg(feature = "profiling")]
    profiling::scope!("internal_matches::compute");

    let mut counter = FeatureSegmentCounter::new(false).with_fence(config.fence.clone());
    if !counter.add_source(source, monitor) {
        tracing::debug!("Internal match computation cancelled while counting");
        return None;
    }
    let unique_segments = counter.unique_segments();

    monitor.allow_cancellation_requests();
    monitor.report("Creating segment index");
    let segment_index = config.index.build(
        unique_segments
            .iter()
            .filter(|s| !s.is_zero_length())
            .map(|s| (s.envelope(), s.clone()))
            .collect(),
    );
    tracing::debug!(
        unique = unique_segments.len(),
        indexed = segment_index.len(),
        "Indexed unique segments"
    );

    monitor.report("Finding segment matches");
    let partners: DashMap<SegmentId, Partners> = DashMap::new();
    let outcomes = par_map_monitored(&unique_segments, monitor, "segments", |segment| {
        find_matches(
            segment,
            segment_index.as_ref(),
            matcher,
            &partners,
            config.create_indicators,
        )
    });
    let Some(outcomes) = outcomes else {
        tracing::debug!("Internal match computation cancelled while matching");
        return None;
    };

    let mut matched_feature_segments = Vec::new();
    let mut matched_segments = Vec::new();
    let mut size_indicators = Vec::new();
    for (segment, outcome) in unique_segments.iter().zip(outcomes) {
        if outcome.matched {
            if config.create_indicators {
                matched_segments.push(Geometry::LineString(LineString::new(vec![
                    segment.p0, segment.p1,
                ])));
            }
            matched_feature_segments.push(segment.clone());
        }
        size_indicators.extend(outcome.indicators);
    }

    let partners: HashMap<SegmentId, Partners> = partners
        .into_iter()
        .map(|(id, mut list)| {
            list.sort_unstable();
            (id, list)
        })
        .collect();

    tracing::debug!(
        matched = matched_feature_segments.len(),
        indicators = size_indicators.len(),
        "Internal matches computed"
    );

    Some(InternalMatchResults {
        unique_segments,
        matched_feature_segments,
        matched_segments,
        size_indicators,
        partners,
        segment_index,
    })
}

/// Match one query segment against its index candidates
fn find_matches(
    segment: &FeatureSegment,
    index: &dyn SpatialIndex<FeatureSegment>,
    matcher: &SegmentMatcher,
    partners: &DashMap<SegmentId, Partners>,
    create_indicators: bool,
) -> QueryOutcome {
    let mut outcome = QueryOutcome {
        matched: false,
        indicators: Vec::new(),
    };
    if segment.is_zero_length() {
        return outcome;
    }

    let query_env = expand_by(&segment.envelope(), matcher.distance_tolerance());
    let mut candidates = index.query(&query_env);
    // Index traversal order differs between index kinds
    candidates.sort_unstable_by_key(|c| c.id());

    let line = segment.line();
    for candidate in candidates {
        if candidate.feature_id() == segment.feature_id()
            || segment.equals_topo(candidate)
            || candidate.is_zero_length()
        {
            continue;
        }
        if !matcher.is_match(&line, &candidate.line()) {
            continue;
        }

        tracing::trace!(query = %segment.id(), candidate = %candidate.id(), "Segments match");
        outcome.matched = true;
        add_partner(partners, segment.id(), candidate.id());
        add_partner(partners, candidate.id(), segment.id());

        // Only one direction of a pair emits indicators
        if create_indicators && segment.feature_id() > candidate.feature_id() {
            outcome
                .indicators
                .extend(size_indicators(&line, &candidate.line()));
        }
    }
    outcome
}

fn add_partner(partners: &DashMap<SegmentId, Partners>, from: SegmentId, to: SegmentId) {
    let mut entry = partners.entry(from).or_default();
    if !entry.contains(&to) {
        entry.push(to);
    }
}

/// Distinct owning features of some segments, ordered by id
pub(crate) fn features_by_id<'s>(
    segments: impl Iterator<Item = &'s FeatureSegment>,
) -> Vec<Arc<Feature>> {
    let mut features: BTreeMap<FeatureId, Arc<Feature>> = BTreeMap::new();
    for segment in segments {
        features
            .entry(segment.feature_id())
            .or_insert_with(|| Arc::clone(&segment.feature));
    }
    features.into_values().collect()
}
