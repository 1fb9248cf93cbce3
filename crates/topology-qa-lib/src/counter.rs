//! Undirected segment counting
//!
//! [`FeatureSegmentCounter`] breaks features into their edges and counts how
//! often each undirected edge occurs. An edge seen exactly once is *unique*:
//! no other ring shares it, so it is a candidate for near-miss matching.

use crate::segment::feature_segments;
use crate::{Feature, FeatureSegment, FeatureSource, QaError, Result, SegmentKey, TaskMonitor};
use geo::{Geometry, Intersects};
use std::collections::HashMap;
use std::sync::Arc;

/// Counts normalized segment occurrences across features
#[derive(Debug, Default)]
pub struct FeatureSegmentCounter {
    /// Count zero-length segments too
    count_zero_length: bool,
    /// Optional region of interest
    fence: Option<Geometry<f64>>,
    /// Position of each key in `entries`
    slots: HashMap<SegmentKey, usize>,
    /// First segment seen for each key with its count, in insertion order
    entries: Vec<(FeatureSegment, usize)>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl FeatureSegmentCounter {
    pub fn new(count_zero_length: bool) -> Self {
        Self {
            count_zero_length,
            ..Default::default()
        }
    }

    /// Restrict counting to segments intersecting `fence`
    pub fn with_fence(mut self, fence: Option<Geometry<f64>>) -> Self {
        self.fence = fence;
        self
    }

    /// Add every feature of a source
    ///
    /// Returns false if the monitor requested cancellation before all
    /// features were added.
    pub fn add_source(&mut self, source: &dyn FeatureSource, monitor: &dyn TaskMonitor) -> bool {
        #[cfg(feature = "profiling")]
        profiling::scope!("counter::add_source");

        monitor.allow_cancellation_requests();
        monitor.report("Adding features to segment counter");
        let total = source.len();
        for (i, feature) in source.features().iter().enumerate() {
            if monitor.is_cancel_requested() {
                return false;
            }
            monitor.report_progress(i + 1, total, "features");
            self.add_feature(feature);
        }
        tracing::debug!(
            distinct = self.entries.len(),
            unique = self.entries.iter().filter(|(_, n)| *n == 1).count(),
            "Counted segments"
        );
        true
    }

    /// Add all edges of one feature
    ///
    /// With a fence, the feature must intersect it, and so must each edge.
    pub fn add_feature(&mut self, feature: &Arc<Feature>) {
        if let Some(fence) = &self.fence
            && !feature.geometry().intersects(fence)
        {
            return;
        }

        for segment in feature_segments(feature, true) {
            if let Some(fence) = &self.fence
                && !fence.intersects(&Geometry::Line(segment.line()))
            {
                continue;
            }
            self.add_segment(segment);
        }
    }

    /// Count one segment
    pub fn add_segment(&mut self, segment: FeatureSegment) {
        if !self.count_zero_length && segment.is_zero_length() {
            return;
        }
        match self.slots.get(&segment.key()) {
            Some(&slot) => self.entries[slot].1 += 1,
            None => {
                self.slots.insert(segment.key(), self.entries.len());
                self.entries.push((segment, 1));
            }
        }
    }

    /// Segments counted exactly once, in first-insertion order
    pub fn unique_segments(&self) -> Vec<FeatureSegment> {
        self.entries
            .iter()
            .filter(|(_, count)| *count == 1)
            .map(|(segment, _)| segment.clone())
            .collect()
    }

    /// Number of occurrences of a segment (in either direction)
    pub fn count(&self, segment: &FeatureSegment) -> Result<usize> {
        self.slots
            .get(&segment.key())
            .map(|&slot| self.entries[slot].1)
            .ok_or_else(|| QaError::SegmentNotFound {
                segment: format!("{:?} -> {:?}", segment.p0, segment.p1),
            })
    }

    /// Number of distinct undirected segments
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
