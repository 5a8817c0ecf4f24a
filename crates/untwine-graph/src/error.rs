//! Error types for untwine-graph.

use thiserror::Error;

/// Errors surfaced by the region splitter.
///
/// All of these indicate a bug in the duplication hook or in the splitter
/// itself; callers are expected to treat them as fatal for the graph being
/// processed.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Region edge sets no longer agree with the quotient of the underlying
    /// graph after a node-splitting step.
    #[error("region {region} diverged from the underlying graph: {detail}")]
    RegionEdgesDiverged { region: usize, detail: String },

    /// A vertex exists in the graph but belongs to no region.
    #[error("vertex {vertex} was introduced without being reported to the splitter")]
    UnreportedVertex { vertex: String },

    /// The duplication hook reported an insertion anchor that belongs to no
    /// region.
    #[error("insertion anchor {anchor} is not a member of any region")]
    UnknownAnchor { anchor: String },

    /// The duplication hook failed.
    #[error("region duplication failed")]
    Duplication(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl GraphError {
    /// Wraps an arbitrary duplication-hook failure.
    pub fn duplication<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Duplication(Box::new(err))
    }
}
