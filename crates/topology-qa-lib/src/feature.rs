//! Feature storage module
//!
//! This module provides the `Feature` struct: a caller-owned geometry with a
//! stable identity and precomputed metadata like its envelope and vertex count.
//! The engine only ever reads feature geometry.

use crate::{QaError, Result};
use geo::{BoundingRect, CoordsIter, Geometry, Rect};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stable, totally ordered feature identity
///
/// Ids drive the canonical tie-breaks that keep symmetric pair checks from
/// reporting the same pair twice, so they must be unique within a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureId(pub u64);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FeatureId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A single feature with its geometry and precomputed metadata
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feature {
    /// Stable identity
    id: FeatureId,
    /// The feature geometry (never mutated)
    geometry: Geometry<f64>,
    /// Precomputed envelope
    envelope: Rect<f64>,
    /// Cached number of coordinates (computed once during construction)
    cached_vertex_count: usize,
    /// Opaque attributes carried along for the host
    attributes: BTreeMap<String, String>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Feature {
    /// Create a new feature
    ///
    /// # Returns
    /// An `Arc<Feature>` on success, or an error if the geometry has no coordinates
    pub fn new(id: impl Into<FeatureId>, geometry: Geometry<f64>) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::build(id.into(), geometry, BTreeMap::new())?))
    }

    /// Create a new feature carrying host attributes
    pub fn with_attributes(
        id: impl Into<FeatureId>,
        geometry: Geometry<f64>,
        attributes: BTreeMap<String, String>,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::build(id.into(), geometry, attributes)?))
    }

    fn build(
        id: FeatureId,
        geometry: Geometry<f64>,
        attributes: BTreeMap<String, String>,
    ) -> Result<Self> {
        let envelope = geometry
            .bounding_rect()
            .ok_or(QaError::EmptyGeometry(id))?;
        let cached_vertex_count = geometry.coords_count();

        Ok(Self {
            id,
            geometry,
            envelope,
            cached_vertex_count,
            attributes,
        })
    }

    /// Get the feature id
    #[inline]
    pub fn id(&self) -> FeatureId {
        self.id
    }

    /// Access the geometry
    #[inline]
    pub fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    /// Get the envelope
    #[inline]
    pub fn envelope(&self) -> Rect<f64> {
        self.envelope
    }

    /// Get the total number of coordinates
    ///
    /// This is O(1) as the value is cached during construction.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.cached_vertex_count
    }

    /// Get a single attribute value
    #[inline]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Get all attributes
    #[inline]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, LineString, MultiPolygon, polygon};

    fn create_test_square() -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ])
    }

    #[test]
    fn test_feature_creation() {
        let feature = Feature::new(7, create_test_square()).unwrap();

        assert_eq!(feature.id(), FeatureId(7));
        assert_eq!(feature.vertex_count(), 5);
        assert_eq!(feature.envelope().min(), Coord { x: 0.0, y: 0.0 });
        assert_eq!(feature.envelope().max(), Coord { x: 10.0, y: 10.0 });
    }

    #[test]
    fn test_empty_geometry_fails() {
        let empty = Geometry::MultiPolygon(MultiPolygon::<f64>(vec![]));
        let result = Feature::new(1, empty);
        assert!(matches!(result, Err(QaError::EmptyGeometry(FeatureId(1)))));

        let empty_line = Geometry::LineString(LineString::<f64>(vec![]));
        assert!(Feature::new(2, empty_line).is_err());
    }

    #[test]
    fn test_attributes() {
        let mut attributes = BTreeMap::new();
        attributes.insert("name".to_string(), "parcel".to_string());
        let feature = Feature::with_attributes(3, create_test_square(), attributes).unwrap();

        assert_eq!(feature.attribute("name"), Some("parcel"));
        assert_eq!(feature.attribute("missing"), None);
        assert_eq!(feature.attributes().len(), 1);
    }

    #[test]
    fn test_feature_id_ordering() {
        assert!(FeatureId(1) < FeatureId(2));
        assert_eq!(FeatureId::from(5).to_string(), "5");
    }
}
