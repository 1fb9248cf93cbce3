//! FeatureCollection - the default feature source
//!
//! This module provides the [`FeatureSource`] contract the finders read their
//! input through, and [`FeatureCollection`], an in-memory implementation with
//! an R-tree over feature envelopes built once at construction.

use crate::index::envelope_union;
use crate::{Feature, FeatureId, QaError, RTreeIndex, Result, SpatialIndex};

use geo::{Geometry, Rect};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Read-only access to a set of features
///
/// Ids must be unique within one source.
pub trait FeatureSource: Sync {
    /// All features, in a stable order
    fn features(&self) -> &[Arc<Feature>];

    /// Features whose envelope intersects `envelope`, in source order
    fn query(&self, envelope: &Rect<f64>) -> Vec<Arc<Feature>>;

    fn len(&self) -> usize {
        self.features().len()
    }

    fn is_empty(&self) -> bool {
        self.features().is_empty()
    }
}

/// Information about the feature collection
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollectionInfo {
    /// Number of features
    pub feature_count: usize,
    /// Total number of coordinates
    pub vertex_count: usize,
    /// Envelope of all features (None if empty)
    pub envelope: Option<Rect<f64>>,
}

/// In-memory feature collection with an envelope index
pub struct FeatureCollection {
    /// All features in insertion order
    features: Vec<Arc<Feature>>,
    /// Spatial index of positions into `features`
    index: RTreeIndex<usize>,
    /// Cached statistics
    info: CollectionInfo,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl FeatureCollection {
    /// Create a collection from existing features
    ///
    /// Fails if two features share an id.
    pub fn new(features: Vec<Arc<Feature>>) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("collection::new");

        let mut seen = HashSet::with_capacity(features.len());
        for feature in &features {
            if !seen.insert(feature.id()) {
                return Err(QaError::DuplicateFeatureId(feature.id()));
            }
        }

        let info = CollectionInfo {
            feature_count: features.len(),
            vertex_count: features.iter().map(|f| f.vertex_count()).sum(),
            envelope: features
                .iter()
                .map(|f| f.envelope())
                .reduce(|acc, envelope| envelope_union(&acc, &envelope)),
        };

        let index = RTreeIndex::bulk_load(
            features
                .iter()
                .enumerate()
                .map(|(i, f)| (f.envelope(), i))
                .collect(),
        );

        tracing::debug!(
            features = info.feature_count,
            vertices = info.vertex_count,
            "Built feature collection"
        );

        Ok(Self {
            features,
            index,
            info,
        })
    }

    /// Create a collection from bare geometries, assigning ids `0..n`
    ///
    /// Features are built in parallel.
    pub fn from_geometries<I>(geometries: I) -> Result<Self>
    where
        I: IntoIterator<Item = Geometry<f64>>,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("collection::from_geometries");

        let geometries: Vec<Geometry<f64>> = geometries.into_iter().collect();
        let features = geometries
            .into_par_iter()
            .enumerate()
            .map(|(i, geometry)| Feature::new(FeatureId(i as u64), geometry))
            .collect::<Result<Vec<_>>>()?;
        Self::new(features)
    }

    /// Get collection information
    ///
    /// This is O(1) as all values are cached.
    #[inline]
    pub fn info(&self) -> CollectionInfo {
        self.info.clone()
    }

    /// Get a feature by position
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Arc<Feature>> {
        self.features.get(index)
    }
}

impl FeatureSource for FeatureCollection {
    #[inline]
    fn features(&self) -> &[Arc<Feature>] {
        &self.features
    }

    fn query(&self, envelope: &Rect<f64>) -> Vec<Arc<Feature>> {
        let mut hits: Vec<usize> = self.index.query(envelope).into_iter().copied().collect();
        hits.sort_unstable();
        hits.into_iter()
            .map(|i| Arc::clone(&self.features[i]))
            .collect()
    }
}
