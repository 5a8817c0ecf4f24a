//! Adjacency-list digraph with a faithful duplication hook.
//!
//! [`AdjacencyGraph`] is the concrete graph used by the splitter's own test
//! suite and by callers that want node splitting on a plain labeled digraph
//! without bringing their own vertex representation.

use std::collections::BTreeMap;

use indexmap::IndexSet;

use crate::{GraphError, InsertionLocation, SplitDigraph};

/// Vertex handle into an [`AdjacencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexId(pub u32);

impl std::fmt::Display for VertexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A labeled directed graph backed by adjacency sets.
///
/// The first vertex added becomes the root. Labels are free-form; the
/// duplication hook derives clone labels by appending a prime (`b` → `b'`).
#[derive(Debug, Default, Clone)]
pub struct AdjacencyGraph {
    labels: Vec<String>,
    succs: Vec<IndexSet<VertexId>>,
    preds: Vec<IndexSet<VertexId>>,
}

impl AdjacencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex and returns its handle.
    pub fn add_vertex(&mut self, label: impl Into<String>) -> VertexId {
        let id = VertexId(self.labels.len() as u32);
        self.labels.push(label.into());
        self.succs.push(IndexSet::new());
        self.preds.push(IndexSet::new());
        id
    }

    /// Adds an edge; parallel edges collapse into one.
    pub fn add_edge(&mut self, from: VertexId, to: VertexId) {
        self.succs[from.0 as usize].insert(to);
        self.preds[to.0 as usize].insert(from);
    }

    /// Removes an edge if present.
    pub fn remove_edge(&mut self, from: VertexId, to: VertexId) {
        self.succs[from.0 as usize].shift_remove(&to);
        self.preds[to.0 as usize].shift_remove(&from);
    }

    /// Returns true if the edge exists.
    pub fn has_edge(&self, from: VertexId, to: VertexId) -> bool {
        self.succs[from.0 as usize].contains(&to)
    }

    /// Label of a vertex.
    pub fn label(&self, v: VertexId) -> &str {
        &self.labels[v.0 as usize]
    }

    /// Looks a vertex up by label.
    pub fn vertex(&self, label: &str) -> Option<VertexId> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| VertexId(i as u32))
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true if the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// All edges as `(from, to)` pairs, in vertex order.
    pub fn edges(&self) -> Vec<(VertexId, VertexId)> {
        let mut out = Vec::new();
        for (i, succs) in self.succs.iter().enumerate() {
            for &to in succs {
                out.push((VertexId(i as u32), to));
            }
        }
        out
    }

    /// All edges rendered as `"from->to"` labels, sorted.
    pub fn edge_labels(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .edges()
            .into_iter()
            .map(|(a, b)| format!("{}->{}", self.label(a), self.label(b)))
            .collect();
        out.sort();
        out
    }
}

impl SplitDigraph for AdjacencyGraph {
    type Vertex = VertexId;

    fn root(&self) -> VertexId {
        VertexId(0)
    }

    fn vertices(&self) -> Vec<VertexId> {
        (0..self.labels.len() as u32).map(VertexId).collect()
    }

    fn successors(&self, v: VertexId) -> Vec<VertexId> {
        self.succs[v.0 as usize].iter().copied().collect()
    }

    fn predecessors(&self, v: VertexId) -> Vec<VertexId> {
        self.preds[v.0 as usize].iter().copied().collect()
    }

    fn clone_region(
        &mut self,
        to_clone: &[VertexId],
        owned_by: &[VertexId],
    ) -> Result<Vec<(VertexId, InsertionLocation<VertexId>)>, GraphError> {
        let mut copies = BTreeMap::new();
        let mut added = Vec::with_capacity(to_clone.len());
        for &x in to_clone {
            let copy = self.add_vertex(format!("{}'", self.label(x)));
            copies.insert(x, copy);
            added.push((copy, InsertionLocation::Append));
        }

        // Entry edges owned by `owned_by` move over to the copies.
        for &x in to_clone {
            for p in self.predecessors(x) {
                if owned_by.binary_search(&p).is_ok() {
                    self.remove_edge(p, x);
                    self.add_edge(p, copies[&x]);
                }
            }
        }

        // Each copy mirrors the outgoing edges of its original; targets that
        // were cloned themselves map to their own copies.
        for &x in to_clone {
            for t in self.successors(x) {
                let target = copies.get(&t).copied().unwrap_or(t);
                self.add_edge(copies[&x], target);
            }
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(labels: &[&str], edges: &[(&str, &str)]) -> AdjacencyGraph {
        let mut g = AdjacencyGraph::new();
        for l in labels {
            g.add_vertex(*l);
        }
        for (a, b) in edges {
            let from = g.vertex(a).unwrap();
            let to = g.vertex(b).unwrap();
            g.add_edge(from, to);
        }
        g
    }

    #[test]
    fn edges_are_symmetric() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        for v in g.vertices() {
            for s in g.successors(v) {
                assert!(g.predecessors(s).contains(&v));
            }
        }
    }

    #[test]
    fn parallel_edges_collapse() {
        let mut g = graph(&["a", "b"], &[("a", "b")]);
        let a = g.vertex("a").unwrap();
        let b = g.vertex("b").unwrap();
        g.add_edge(a, b);
        assert_eq!(g.successors(a), vec![b]);
    }

    #[test]
    fn clone_region_redirects_owned_entries() {
        // a -> b, c -> b; cloning {b} owned by {c} must leave a -> b alone
        // and produce c -> b'.
        let mut g = graph(&["a", "b", "c"], &[("a", "b"), ("c", "b")]);
        let b = g.vertex("b").unwrap();
        let c = g.vertex("c").unwrap();
        let added = g.clone_region(&[b], &[c]).unwrap();
        assert_eq!(added.len(), 1);

        assert_eq!(
            g.edge_labels(),
            vec!["a->b".to_string(), "c->b'".to_string()]
        );
    }

    #[test]
    fn clone_region_maps_internal_targets() {
        // b -> c -> b cycle, cloned as a unit: the copies must form their own
        // cycle rather than pointing back into the originals.
        let mut g = graph(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "c"), ("c", "b")],
        );
        let a = g.vertex("a").unwrap();
        let b = g.vertex("b").unwrap();
        let c = g.vertex("c").unwrap();
        g.clone_region(&[b, c], &[a]).unwrap();

        assert_eq!(
            g.edge_labels(),
            vec![
                "a->b'".to_string(),
                "b'->c'".to_string(),
                "b->c".to_string(),
                "c'->b'".to_string(),
                "c->b".to_string(),
            ]
        );
    }

    #[test]
    fn clone_region_preserves_self_loops() {
        let mut g = graph(&["a", "b"], &[("a", "a"), ("b", "a")]);
        let a = g.vertex("a").unwrap();
        let b = g.vertex("b").unwrap();
        g.clone_region(&[a], &[b]).unwrap();
        let a2 = g.vertex("a'").unwrap();
        assert!(g.has_edge(a2, a2));
        assert!(g.has_edge(b, a2));
        assert!(g.has_edge(a, a));
    }
}
