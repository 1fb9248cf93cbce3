//! Topology QA Library - Geometric Matching and Spatial Indexing Engine
//!
//! This library runs quality-assurance topology checks over one or two collections
//! of polygonal or linear features. It finds coverage gaps and slivers, boundary
//! segments which match but are not identical, overlapping features, and vertices
//! which are close but not equal.
//!
//! # Architecture
//!
//! - **[`Feature`]**: Immutable feature (stable id + geometry) owned by the caller
//! - **[`FeatureCollection`]**: Default [`FeatureSource`] with an envelope query
//! - **[`SegmentMatcher`]**: Distance/angle/orientation predicate over two segments
//! - **[`FeatureSegmentCounter`]**: Counts undirected edges to extract unpaired segments
//! - **[`SpatialIndex`]**: Build-then-query envelope index (R-tree, quadtree, brute force)
//! - **[`InternalMatchedSegmentFinder`]**: Gap/sliver detection inside one coverage
//! - **[`MatchedSegmentFinder`]**: Matched segments between a reference and a subject
//! - **[`OverlapFinder`]**: Features whose interiors intersect, with overlap indicators
//! - **[`CloseVertexFinder`]**: Vertex pairs closer than a tolerance but not equal
//!
//! # Execution Model
//!
//! Every finder runs a single computation: a **build** phase that bulk-loads a
//! spatial index and a **query** phase that scans candidates in parallel (rayon)
//! against the frozen index. Results are latched after the first `compute` call.
//! Long phases report to a [`TaskMonitor`] and stop early when cancellation is
//! requested.

mod close_vertex;
mod collection;
mod counter;
mod feature;
pub mod geometry;
mod index;
pub mod indicators;
mod internal_matches;
mod matcher;
mod matches;
mod monitor;
mod overlap;
mod quadtree;
mod segment;

// Public API exports
pub use close_vertex::{CloseVertexConfig, CloseVertexFinder, CloseVertexResults};
pub use collection::{CollectionInfo, FeatureCollection, FeatureSource};
pub use counter::FeatureSegmentCounter;
pub use feature::{Feature, FeatureId};
pub use index::{
    BruteForceIndex, IndexKind, RTreeIndex, SpatialIndex, envelopes_intersect, expand_by,
    segment_envelope,
};
pub use indicators::{IndicatorKind, IndicatorStats, OverlapIndicators};
pub use internal_matches::{InternalMatchConfig, InternalMatchResults, InternalMatchedSegmentFinder};
pub use matcher::{MatchParameters, Orientation, SegmentMatcher, angle_diff, fast_atan2};
pub use matches::{MatchConfig, MatchResults, MatchedSegmentFinder};
pub use monitor::{NullMonitor, TaskMonitor, TracingMonitor};
pub use overlap::{OverlapConfig, OverlapFinder, OverlapPair, OverlapResults};
pub use quadtree::Quadtree;
pub use segment::{FeatureSegment, SegmentId, SegmentKey};

/// Error types for the QA engine
#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error("Invalid tolerance `{name}`: {value} (must be finite and >= 0)")]
    InvalidTolerance { name: &'static str, value: f64 },

    #[error("Duplicate feature id {0} in collection")]
    DuplicateFeatureId(FeatureId),

    #[error("Feature {0} has an empty geometry")]
    EmptyGeometry(FeatureId),

    #[error("Segment not found in counter: {segment}")]
    SegmentNotFound { segment: String },
}

pub type Result<T> = std::result::Result<T, QaError>;

/// Check that a tolerance is usable before any computation phase starts
pub(crate) fn validate_tolerance(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(QaError::InvalidTolerance { name, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that the main entry points are accessible
        let _: fn() -> MatchParameters = MatchParameters::default;
        let _: fn() -> InternalMatchConfig = InternalMatchConfig::default;
        let _: fn() -> OverlapConfig = OverlapConfig::default;
    }

    #[test]
    fn test_validate_tolerance() {
        assert!(validate_tolerance("distance", 0.0).is_ok());
        assert!(validate_tolerance("distance", 2.5).is_ok());
        assert!(matches!(
            validate_tolerance("distance", -1.0),
            Err(QaError::InvalidTolerance { name: "distance", .. })
        ));
        assert!(validate_tolerance("angle", f64::NAN).is_err());
        assert!(validate_tolerance("angle", f64::INFINITY).is_err());
    }
}
