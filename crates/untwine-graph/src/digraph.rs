//! Abstract rooted digraph consumed by the region splitter.

use std::fmt::Debug;
use std::hash::Hash;

use crate::GraphError;

/// Where a vertex produced during region duplication was inserted.
///
/// These are the only positions at which the duplication hook may introduce
/// vertices. The splitter uses them to route each new vertex into a region:
/// `Append` lands in the freshly created clone region, `Before`/`After` land
/// in whichever region already contains the anchor vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InsertionLocation<V> {
    /// Directly before an existing vertex.
    Before(V),
    /// Directly after an existing vertex.
    After(V),
    /// At the end of the vertex order.
    Append,
}

/// A rooted directed graph that supports node splitting.
///
/// Vertices are small copyable handles; their `Ord` must be stable across
/// mutation (the splitter keeps region member lists ordered by it).
///
/// [`clone_region`](Self::clone_region) is the duplication hook invoked once
/// per extra entry edge of a T3 step. Its obligations are exact:
///
/// 1. every edge from a vertex in `owned_by` into a vertex `x` of `to_clone`
///    is redirected to the fresh copy of `x`;
/// 2. every outgoing edge of `x ∈ to_clone` is also present on the copy, with
///    targets inside `to_clone` mapped to their own copies;
/// 3. no other edges are touched;
/// 4. every vertex created along the way is reported in the returned vector
///    together with its insertion location.
///
/// The splitter validates the region quotient after every duplication and
/// fails loudly when a hook breaks these rules.
pub trait SplitDigraph {
    type Vertex: Copy + Eq + Hash + Ord + Debug;

    /// The designated entry vertex.
    fn root(&self) -> Self::Vertex;

    /// All vertices in their stable order.
    fn vertices(&self) -> Vec<Self::Vertex>;

    /// Targets of the edges leaving `v`, without duplicates.
    fn successors(&self, v: Self::Vertex) -> Vec<Self::Vertex>;

    /// Sources of the edges entering `v`, without duplicates.
    fn predecessors(&self, v: Self::Vertex) -> Vec<Self::Vertex>;

    /// Duplicates `to_clone`, rerouting the entry edges owned by `owned_by`.
    ///
    /// Both slices are sorted ascending. Returns the created vertices.
    fn clone_region(
        &mut self,
        to_clone: &[Self::Vertex],
        owned_by: &[Self::Vertex],
    ) -> Result<Vec<(Self::Vertex, InsertionLocation<Self::Vertex>)>, GraphError>;
}
