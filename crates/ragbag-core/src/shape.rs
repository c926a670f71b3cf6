//! Jagged shapes described by split-point edges.
//!
//! ```text
//!   [[a, b, c], [], [d]]
//!
//!   edge 0: [0, 3]        (1 parent -> 3 children)
//!   edge 1: [0, 3, 3, 4]  (3 parents -> 4 leaves)
//! ```

use crate::error::{RagbagError, Result};
use std::sync::Arc;

/// Maps `parent_size` groups onto a contiguous range of children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    split_points: Arc<[i64]>,
}

impl Edge {
    pub fn from_split_points(split_points: Vec<i64>) -> Result<Self> {
        let Some(&first) = split_points.first() else {
            return Err(RagbagError::invalid_argument(
                "split points must contain at least one element",
            ));
        };
        if first != 0 {
            return Err(RagbagError::invalid_argument(format!(
                "split points must start with 0, got {first}"
            )));
        }
        if split_points.windows(2).any(|w| w[0] > w[1]) {
            return Err(RagbagError::invalid_argument(
                "split points must be non-decreasing",
            ));
        }
        Ok(Self {
            split_points: split_points.into(),
        })
    }

    /// `parent_size` groups of `group_size` children each.
    pub fn uniform(parent_size: usize, group_size: usize) -> Self {
        let split_points: Vec<i64> = (0..=parent_size)
            .map(|i| (i * group_size) as i64)
            .collect();
        Self {
            split_points: split_points.into(),
        }
    }

    pub fn split_points(&self) -> &[i64] {
        &self.split_points
    }

    pub fn parent_size(&self) -> usize {
        self.split_points.len() - 1
    }

    pub fn child_size(&self) -> usize {
        self.split_points.last().map_or(0, |&v| v as usize)
    }

    /// Child range of group `i`.
    pub fn group(&self, i: usize) -> std::ops::Range<usize> {
        self.split_points[i] as usize..self.split_points[i + 1] as usize
    }

    pub fn groups(&self) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        (0..self.parent_size()).map(|i| self.group(i))
    }
}

/// Nested shape: a chain of edges, rank = number of edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct JaggedShape {
    edges: Vec<Edge>,
}

impl JaggedShape {
    pub fn scalar() -> Self {
        Self::default()
    }

    /// One dimension of `size` leaves.
    pub fn flat(size: usize) -> Self {
        Self {
            edges: vec![Edge::uniform(1, size)],
        }
    }

    pub fn from_edges(edges: Vec<Edge>) -> Result<Self> {
        let mut parent_size = 1;
        for (dim, edge) in edges.iter().enumerate() {
            if edge.parent_size() != parent_size {
                return Err(RagbagError::invalid_argument(format!(
                    "incompatible edge at dimension {dim}: expected parent size {parent_size}, got {}",
                    edge.parent_size()
                )));
            }
            parent_size = edge.child_size();
        }
        Ok(Self { edges })
    }

    pub fn rank(&self) -> usize {
        self.edges.len()
    }

    /// Number of leaves.
    pub fn size(&self) -> usize {
        self.edges.last().map_or(1, Edge::child_size)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn last_edge(&self) -> Option<&Edge> {
        self.edges.last()
    }

    /// Keeps the dimensions before `from`.
    pub fn remove_dims(&self, from: usize) -> Self {
        Self {
            edges: self.edges[..from.min(self.rank())].to_vec(),
        }
    }

    pub fn add_dims(&self, edges: impl IntoIterator<Item = Edge>) -> Result<Self> {
        let mut all = self.edges.clone();
        all.extend(edges);
        Self::from_edges(all)
    }

    pub fn is_equivalent_to(&self, other: &JaggedShape) -> bool {
        self.rank() == other.rank()
            && self
                .edges
                .iter()
                .zip(&other.edges)
                .all(|(a, b)| a.split_points() == b.split_points())
    }

    /// `self` is a prefix of `other`.
    pub fn is_broadcastable_to(&self, other: &JaggedShape) -> bool {
        self.rank() <= other.rank()
            && self
                .edges
                .iter()
                .zip(&other.edges)
                .all(|(a, b)| a.split_points() == b.split_points())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(points: &[i64]) -> Edge {
        Edge::from_split_points(points.to_vec()).unwrap()
    }

    #[test]
    fn test_edge_validation() {
        assert!(Edge::from_split_points(vec![]).is_err());
        assert!(Edge::from_split_points(vec![1, 2]).is_err());
        assert!(Edge::from_split_points(vec![0, 2, 1]).is_err());
        let e = edge(&[0, 3, 3, 4]);
        assert_eq!(e.parent_size(), 3);
        assert_eq!(e.child_size(), 4);
        assert_eq!(e.group(1), 3..3);
    }

    #[test]
    fn test_shape_chaining() {
        let shape = JaggedShape::from_edges(vec![edge(&[0, 3]), edge(&[0, 3, 3, 4])]).unwrap();
        assert_eq!(shape.rank(), 2);
        assert_eq!(shape.size(), 4);
        assert!(JaggedShape::from_edges(vec![edge(&[0, 2]), edge(&[0, 3, 3, 4])]).is_err());

        let prefix = shape.remove_dims(1);
        assert!(prefix.is_broadcastable_to(&shape));
        assert!(!shape.is_broadcastable_to(&prefix));
        let rebuilt = prefix.add_dims([edge(&[0, 3, 3, 4])]).unwrap();
        assert!(rebuilt.is_equivalent_to(&shape));
    }

    #[test]
    fn test_scalar_shape() {
        let shape = JaggedShape::scalar();
        assert_eq!(shape.rank(), 0);
        assert_eq!(shape.size(), 1);
        assert_eq!(JaggedShape::flat(5).size(), 5);
    }
}
