//! Quadtree spatial index over item envelopes
//!
//! This module provides an adaptive region quadtree rooted at the extent of the
//! bulk-loaded items. Each item is stored at the deepest node whose bounding box
//! fully contains its envelope, so items straddling a split line stay at the
//! parent. Nodes subdivide lazily once they hold more than
//! [`MAX_ITEMS_PER_NODE`] items.

use crate::SpatialIndex;
use crate::index::{envelope_contains, envelope_union, envelopes_intersect};
use geo::{Coord, Rect};

/// Maximum depth of the quadtree to prevent infinite recursion
const MAX_DEPTH: u32 = 16;

/// Number of items a leaf holds before it is split
const MAX_ITEMS_PER_NODE: usize = 16;

/// Root container for the quadtree spatial index
#[derive(Debug, Clone)]
pub struct Quadtree<T> {
    /// Root node covering the extent of every item (None when empty)
    root: Option<QuadtreeNode<T>>,
    /// Number of items stored in the tree
    len: usize,
}

/// A single node in the quadtree
#[derive(Debug, Clone)]
struct QuadtreeNode<T> {
    /// Region covered by this node
    bounding_box: Rect<f64>,
    /// Depth level in the tree (0 = root)
    level: u32,
    /// Items stored at this node
    items: Vec<(Rect<f64>, T)>,
    /// Child nodes (NW, NE, SW, SE) if subdivided
    children: Option<Box<[QuadtreeNode<T>; 4]>>,
}

impl<T> Quadtree<T> {
    /// Build a quadtree for a batch of items
    ///
    /// The root covers the union of all item envelopes.
    pub fn bulk_load(items: Vec<(Rect<f64>, T)>) -> Self {
        let Some(extent) = items
            .iter()
            .map(|(envelope, _)| *envelope)
            .reduce(|acc, envelope| envelope_union(&acc, &envelope))
        else {
            return Self { root: None, len: 0 };
        };

        let len = items.len();
        let mut root = QuadtreeNode::new(extent, 0);
        for (envelope, item) in items {
            root.insert(envelope, item);
        }

        Self {
            root: Some(root),
            len,
        }
    }

    /// Depth of the deepest node (0 for a single root)
    pub fn depth(&self) -> u32 {
        self.root.as_ref().map_or(0, QuadtreeNode::depth)
    }
}

impl<T: Send + Sync> SpatialIndex<T> for Quadtree<T> {
    fn query(&self, envelope: &Rect<f64>) -> Vec<&T> {
        let mut results = Vec::new();
        if let Some(root) = &self.root {
            root.query_items(envelope, &mut results);
        }
        results
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl<T> QuadtreeNode<T> {
    fn new(bounding_box: Rect<f64>, level: u32) -> Self {
        Self {
            bounding_box,
            level,
            items: Vec::new(),
            children: None,
        }
    }

    /// Insert an item into the appropriate level of the tree
    fn insert(&mut self, envelope: Rect<f64>, item: T) {
        if let Some(children) = &mut self.children {
            if let Some(child) = children
                .iter_mut()
                .find(|child| envelope_contains(&child.bounding_box, &envelope))
            {
                child.insert(envelope, item);
                return;
            }
            // Straddles a split line - keep it here
            self.items.push((envelope, item));
            return;
        }

        self.items.push((envelope, item));

        if self.items.len() > MAX_ITEMS_PER_NODE && self.level < MAX_DEPTH {
            self.subdivide();
        }
    }

    /// Subdivide this node into 4 children and push down what fits
    fn subdivide(&mut self) {
        if self.children.is_some() {
            return; // Already subdivided
        }

        let min = self.bounding_box.min();
        let max = self.bounding_box.max();
        let mid_x = (min.x + max.x) / 2.0;
        let mid_y = (min.y + max.y) / 2.0;

        let child_level = self.level + 1;

        // Create 4 children: NW, NE, SW, SE
        let nw = QuadtreeNode::new(
            Rect::new(Coord { x: min.x, y: mid_y }, Coord { x: mid_x, y: max.y }),
            child_level,
        );
        let ne = QuadtreeNode::new(
            Rect::new(Coord { x: mid_x, y: mid_y }, Coord { x: max.x, y: max.y }),
            child_level,
        );
        let sw = QuadtreeNode::new(
            Rect::new(Coord { x: min.x, y: min.y }, Coord { x: mid_x, y: mid_y }),
            child_level,
        );
        let se = QuadtreeNode::new(
            Rect::new(Coord { x: mid_x, y: min.y }, Coord { x: max.x, y: mid_y }),
            child_level,
        );

        self.children = Some(Box::new([nw, ne, sw, se]));

        // Redistribute current items
        let items = std::mem::take(&mut self.items);
        for (envelope, item) in items {
            self.insert(envelope, item);
        }
    }

    /// Query this node and its children for items intersecting the envelope
    fn query_items<'a>(&'a self, envelope: &Rect<f64>, results: &mut Vec<&'a T>) {
        // Prune - check if this node intersects the query at all
        if !envelopes_intersect(&self.bounding_box, envelope) {
            return;
        }

        for (item_envelope, item) in &self.items {
            if envelopes_intersect(item_envelope, envelope) {
                results.push(item);
            }
        }

        // Recurse into children
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_items(envelope, results);
            }
        }
    }

    fn depth(&self) -> u32 {
        match &self.children {
            Some(children) => children.iter().map(QuadtreeNode::depth).max().unwrap_or(self.level),
            None => self.level,
        }
    }
}
