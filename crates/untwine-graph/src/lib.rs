//! # untwine-graph
//!
//! Language-neutral elimination of irreducible loops from rooted digraphs.
//!
//! The engine performs the classical T1/T2/T3 region reduction: self-edge
//! removal, single-predecessor merging, and — when neither applies — node
//! splitting, where a multi-entry region is duplicated once per extra entry
//! so that every loop ends up with a single entry. Duplication itself is
//! delegated to the graph through [`SplitDigraph::clone_region`], which keeps
//! the engine independent of what a vertex actually is.

pub mod adjacency;
pub mod digraph;
pub mod error;
pub mod splitter;

pub use adjacency::{AdjacencyGraph, VertexId};
pub use digraph::{InsertionLocation, SplitDigraph};
pub use error::GraphError;
pub use splitter::split_irreducible;
