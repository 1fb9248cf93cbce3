//! Matched segments between a reference and a subject collection
//!
//! Every reference edge is indexed (no counting step, duplicates included),
//! then every subject edge is matched against the index. Unlike the internal
//! finder, the orientation mode is up to the caller and each pair is seen
//! from the subject side only.

use crate::indicators::size_indicators;
use crate::internal_matches::features_by_id;
use crate::monitor::{Computation, par_map_monitored};
use crate::segment::feature_segments;
use crate::{
    Feature, FeatureSegment, FeatureSource, IndexKind, IndicatorStats, MatchParameters, Result,
    SegmentId, SegmentMatcher, SpatialIndex, TaskMonitor, expand_by,
};
use geo::{Geometry, LineString};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Configuration for [`MatchedSegmentFinder`]
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchConfig {
    pub params: MatchParameters,
    pub index: IndexKind,
}

/// Frozen results of a reference/subject match computation
#[derive(Debug, Clone, Default)]
pub struct MatchResults {
    reference_matched: Vec<FeatureSegment>,
    subject_matched: Vec<FeatureSegment>,
    size_indicators: Vec<Geometry<f64>>,
}

impl MatchResults {
    /// Reference segments matched by at least one subject segment, ordered by id
    #[inline]
    pub fn reference_matched(&self) -> &[FeatureSegment] {
        &self.reference_matched
    }

    /// Subject segments which matched at least one reference segment
    #[inline]
    pub fn subject_matched(&self) -> &[FeatureSegment] {
        &self.subject_matched
    }

    /// Matched subject segments as line geometries
    pub fn matched_segments(&self) -> Vec<Geometry<f64>> {
        self.subject_matched
            .iter()
            .map(|s| Geometry::LineString(LineString::new(vec![s.p0, s.p1])))
            .collect()
    }

    #[inline]
    pub fn size_indicators(&self) -> &[Geometry<f64>] {
        &self.size_indicators
    }

    pub fn size_indicator_stats(&self) -> IndicatorStats {
        IndicatorStats::from_geometries(&self.size_indicators)
    }

    /// Reference features owning a matched segment, ordered by id
    pub fn matched_reference_features(&self) -> Vec<Arc<Feature>> {
        features_by_id(self.reference_matched.iter())
    }

    /// Subject features owning a matched segment, ordered by id
    pub fn matched_subject_features(&self) -> Vec<Arc<Feature>> {
        features_by_id(self.subject_matched.iter())
    }
}

/// Finds subject segments matching reference segments
pub struct MatchedSegmentFinder<'a> {
    reference: &'a dyn FeatureSource,
    subject: &'a dyn FeatureSource,
    config: MatchConfig,
    matcher: SegmentMatcher,
    state: Computation<MatchResults>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> MatchedSegmentFinder<'a> {
    pub fn new(
        reference: &'a dyn FeatureSource,
        subject: &'a dyn FeatureSource,
        config: MatchConfig,
    ) -> Result<Self> {
        let matcher = SegmentMatcher::new(&config.params)?;
        Ok(Self {
            reference,
            subject,
            config,
            matcher,
            state: Computation::default(),
        })
    }

    #[inline]
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Run the computation once; None if it was cancelled
    pub fn compute_matches(&mut self, monitor: &dyn TaskMonitor) -> Option<&MatchResults> {
        let (reference, subject) = (self.reference, self.subject);
        let (index, matcher) = (self.config.index, &self.matcher);
        self.state
            .get_or_run(|| compute(reference, subject, index, matcher, monitor))
    }

    #[inline]
    pub fn results(&self) -> Option<&MatchResults> {
        self.state.get()
    }

    #[inline]
    pub fn is_computed(&self) -> bool {
        self.state.is_settled()
    }
}

/// Matches found for one subject segment
struct SubjectMatches {
    references: Vec<FeatureSegment>,
    indicators: Vec<Geometry<f64>>,
}

fn compute(
    reference: &dyn FeatureSource,
    subject: &dyn FeatureSource,
    index_kind: IndexKind,
    matcher: &SegmentMatcher,
    monitor: &dyn TaskMonitor,
) -> Option<MatchResults> {
    #[cfg(feature = "profiling")]
    profiling::scope!("matches::compute");

    monitor.allow_cancellation_requests();
    monitor.report("Creating segment index");
    let mut entries = Vec::new();
    for feature in reference.features() {
        if monitor.is_cancel_requested() {
            return None;
        }
        entries.extend(
            feature_segments(feature, true)
                .into_iter()
                .filter(|s| !s.is_zero_length())
                .map(|s| (s.envelope(), s)),
        );
    }
    let segment_index = index_kind.build(entries);

    let subject_segments: Vec<FeatureSegment> = subject
        .features()
        .iter()
        .flat_map(|f| feature_segments(f, true))
        .filter(|s| !s.is_zero_length())
        .collect();
    tracing::debug!(
        reference = segment_index.len(),
        subject = subject_segments.len(),
        "Indexed reference segments"
    );

    monitor.report("Finding segment matches");
    let found = par_map_monitored(&subject_segments, monitor, "segments", |segment| {
        match_subject_segment(segment, segment_index.as_ref(), matcher)
    });
    let Some(found) = found else {
        tracing::debug!("Segment match computation cancelled");
        return None;
    };

    let mut results = MatchResults::default();
    let mut reference_matched: BTreeMap<SegmentId, FeatureSegment> = BTreeMap::new();
    for (segment, matches) in subject_segments.into_iter().zip(found) {
        if matches.references.is_empty() {
            continue;
        }
        for matched in matches.references {
            reference_matched.entry(matched.id()).or_insert(matched);
        }
        results.size_indicators.extend(matches.indicators);
        results.subject_matched.push(segment);
    }
    results.reference_matched = reference_matched.into_values().collect();

    tracing::debug!(
        reference = results.reference_matched.len(),
        subject = results.subject_matched.len(),
        indicators = results.size_indicators.len(),
        "Segment matches computed"
    );
    Some(results)
}

fn match_subject_segment(
    segment: &FeatureSegment,
    index: &dyn SpatialIndex<FeatureSegment>,
    matcher: &SegmentMatcher,
) -> SubjectMatches {
    let mut candidates = index.query(&expand_by(&segment.envelope(), matcher.distance_tolerance()));
    candidates.sort_unstable_by_key(|c| c.id());

    let line = segment.line();
    let mut matches = SubjectMatches {
        references: Vec::new(),
        indicators: Vec::new(),
    };
    for candidate in candidates {
        // The same feature may appear in both collections
        if Arc::ptr_eq(&candidate.feature, &segment.feature) || segment.equals_topo(candidate) {
            continue;
        }
        let candidate_line = candidate.line();
        if matcher.is_match(&line, &candidate_line) {
            matches
                .indicators
                .extend(size_indicators(&line, &candidate_line));
            matches.references.push(candidate.clone());
        }
    }
    matches
}
