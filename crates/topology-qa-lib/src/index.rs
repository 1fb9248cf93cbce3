//! Spatial index capability shared by all finders
//!
//! Indexes are bulk-loaded once per computation phase and are read-only
//! afterwards, so queries can run from many threads at once. Query results are
//! candidates only: anything whose envelope overlaps the query envelope. Exact
//! predicates must always be re-checked by the caller.

use crate::Quadtree;
use geo::{Coord, Line, Rect};
use rstar::{AABB, RTree, RTreeObject};

/// A read-only envelope index over items of type `T`
pub trait SpatialIndex<T>: Send + Sync {
    /// All items whose envelope intersects (or touches) `envelope`
    fn query(&self, envelope: &Rect<f64>) -> Vec<&T>;

    /// Number of indexed items
    fn len(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Available spatial index implementations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IndexKind {
    /// Bulk-loaded R*-tree (best general choice)
    #[default]
    RTree,
    /// Region quadtree over the extent of the items
    Quadtree,
    /// Linear scan, for very small inputs and as a reference in tests
    BruteForce,
}

impl IndexKind {
    /// Build an index of this kind from `(envelope, item)` pairs
    pub fn build<T: Send + Sync + 'static>(
        self,
        items: Vec<(Rect<f64>, T)>,
    ) -> Box<dyn SpatialIndex<T>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::build");

        tracing::debug!(kind = ?self, items = items.len(), "Building spatial index");
        match self {
            IndexKind::RTree => Box::new(RTreeIndex::bulk_load(items)),
            IndexKind::Quadtree => Box::new(Quadtree::bulk_load(items)),
            IndexKind::BruteForce => Box::new(BruteForceIndex::bulk_load(items)),
        }
    }
}

/// An R-tree entry: an item tagged with its envelope
struct Entry<T> {
    envelope: AABB<[f64; 2]>,
    item: T,
}

impl<T> RTreeObject for Entry<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Envelope index backed by an `rstar` R*-tree
pub struct RTreeIndex<T> {
    tree: RTree<Entry<T>>,
}

impl<T> RTreeIndex<T> {
    /// Bulk-load the tree from `(envelope, item)` pairs
    pub fn bulk_load(items: Vec<(Rect<f64>, T)>) -> Self {
        let entries = items
            .into_iter()
            .map(|(envelope, item)| Entry {
                envelope: to_aabb(&envelope),
                item,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }
}

impl<T: Send + Sync> SpatialIndex<T> for RTreeIndex<T> {
    fn query(&self, envelope: &Rect<f64>) -> Vec<&T> {
        self.tree
            .locate_in_envelope_intersecting(&to_aabb(envelope))
            .map(|entry| &entry.item)
            .collect()
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

/// Envelope index that scans every item
pub struct BruteForceIndex<T> {
    items: Vec<(Rect<f64>, T)>,
}

impl<T> BruteForceIndex<T> {
    pub fn bulk_load(items: Vec<(Rect<f64>, T)>) -> Self {
        Self { items }
    }
}

impl<T: Send + Sync> SpatialIndex<T> for BruteForceIndex<T> {
    fn query(&self, envelope: &Rect<f64>) -> Vec<&T> {
        self.items
            .iter()
            .filter(|(item_envelope, _)| envelopes_intersect(item_envelope, envelope))
            .map(|(_, item)| item)
            .collect()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

fn to_aabb(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Check if two envelopes intersect (touching counts)
#[inline]
pub fn envelopes_intersect(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    let (amin, amax) = (a.min(), a.max());
    let (bmin, bmax) = (b.min(), b.max());
    !(amax.x < bmin.x || amin.x > bmax.x || amax.y < bmin.y || amin.y > bmax.y)
}

/// Check if `outer` fully contains `inner`
#[inline]
pub(crate) fn envelope_contains(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && outer.max().x >= inner.max().x
        && outer.max().y >= inner.max().y
}

/// Check if an envelope contains a coordinate (boundary included)
#[inline]
pub(crate) fn envelope_contains_coord(envelope: &Rect<f64>, coord: Coord<f64>) -> bool {
    coord.x >= envelope.min().x
        && coord.x <= envelope.max().x
        && coord.y >= envelope.min().y
        && coord.y <= envelope.max().y
}

/// Envelope of a single segment
#[inline]
pub fn segment_envelope(line: &Line<f64>) -> Rect<f64> {
    Rect::new(line.start, line.end)
}

/// Grow an envelope by `distance` on every side
#[inline]
pub fn expand_by(envelope: &Rect<f64>, distance: f64) -> Rect<f64> {
    Rect::new(
        Coord {
            x: envelope.min().x - distance,
            y: envelope.min().y - distance,
        },
        Coord {
            x: envelope.max().x + distance,
            y: envelope.max().y + distance,
        },
    )
}

/// Smallest envelope covering both inputs
#[inline]
pub(crate) fn envelope_union(a: &Rect<f64>, b: &Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<f64> {
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 })
    }

    fn create_test_items() -> Vec<(Rect<f64>, usize)> {
        (0..100)
            .map(|i| {
                let x = (i % 10) as f64 * 10.0;
                let y = (i / 10) as f64 * 10.0;
                (rect(x, y, x + 5.0, y + 5.0), i)
            })
            .collect()
    }

    fn sorted(mut ids: Vec<usize>) -> Vec<usize> {
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_envelopes_intersect() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        assert!(envelopes_intersect(&a, &rect(5.0, 5.0, 15.0, 15.0)));
        // Touching edges count as intersecting
        assert!(envelopes_intersect(&a, &rect(10.0, 0.0, 20.0, 10.0)));
        assert!(!envelopes_intersect(&a, &rect(10.1, 0.0, 20.0, 10.0)));
    }

    #[test]
    fn test_expand_by() {
        let expanded = expand_by(&rect(0.0, 0.0, 10.0, 10.0), 1.5);
        assert_eq!(expanded.min(), Coord { x: -1.5, y: -1.5 });
        assert_eq!(expanded.max(), Coord { x: 11.5, y: 11.5 });
    }

    #[test]
    fn test_envelope_contains() {
        let outer = rect(0.0, 0.0, 10.0, 10.0);
        assert!(envelope_contains(&outer, &rect(1.0, 1.0, 10.0, 2.0)));
        assert!(!envelope_contains(&outer, &rect(1.0, 1.0, 11.0, 2.0)));
        assert!(envelope_contains_coord(&outer, Coord { x: 10.0, y: 0.0 }));
        assert!(!envelope_contains_coord(&outer, Coord { x: 10.0, y: -0.1 }));
    }

    #[test]
    fn test_all_kinds_return_same_candidates() {
        let query = rect(12.0, 12.0, 31.0, 24.0);
        let expected = sorted(
            BruteForceIndex::bulk_load(create_test_items())
                .query(&query)
                .into_iter()
                .copied()
                .collect(),
        );
        assert_eq!(expected, vec![11, 12, 13, 21, 22, 23]);

        for kind in [IndexKind::RTree, IndexKind::Quadtree, IndexKind::BruteForce] {
            let index = kind.build(create_test_items());
            assert_eq!(index.len(), 100);
            let found = sorted(index.query(&query).into_iter().copied().collect());
            assert_eq!(found, expected, "index kind {kind:?}");
        }
    }

    #[test]
    fn test_empty_index() {
        let index = IndexKind::RTree.build::<usize>(Vec::new());
        assert!(index.is_empty());
        assert!(index.query(&rect(0.0, 0.0, 1.0, 1.0)).is_empty());
    }

    #[test]
    fn test_degenerate_envelopes() {
        // Zero-size envelopes (points, axis-parallel segments) must still be found
        let items = vec![
            (rect(1.0, 1.0, 1.0, 1.0), 0usize),
            (rect(0.0, 5.0, 10.0, 5.0), 1),
        ];
        for kind in [IndexKind::RTree, IndexKind::Quadtree, IndexKind::BruteForce] {
            let index = kind.build(items.clone());
            let found = sorted(
                index
                    .query(&rect(1.0, 1.0, 1.0, 1.0))
                    .into_iter()
                    .copied()
                    .collect(),
            );
            assert_eq!(found, vec![0], "index kind {kind:?}");
            let found = sorted(
                index
                    .query(&rect(4.0, 4.0, 6.0, 6.0))
                    .into_iter()
                    .copied()
                    .collect(),
            );
            assert_eq!(found, vec![1], "index kind {kind:?}");
        }
    }
}
