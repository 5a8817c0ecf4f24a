//! Method-level node splitting.

use std::collections::BTreeSet;

use tracing::{debug, trace};
use untwine_graph::{split_irreducible, GraphError, InsertionLocation, SplitDigraph};

use crate::cfg::MethodCfg;
use crate::cloner::clone_instructions;
use crate::error::BytecodeError;
use crate::insn::InsnId;
use crate::method::MethodBody;

/// The per-method digraph the generic splitter drives: instruction vertices
/// with normal and exception edges presented as one edge set. Only the
/// duplication hook tells the two kinds apart.
pub struct MethodSplitGraph<'a> {
    body: &'a mut MethodBody,
    cfg: MethodCfg,
}

impl<'a> MethodSplitGraph<'a> {
    pub fn new(body: &'a mut MethodBody) -> Result<Self, BytecodeError> {
        let cfg = MethodCfg::build(body)?;
        Ok(Self { body, cfg })
    }
}

impl SplitDigraph for MethodSplitGraph<'_> {
    type Vertex = InsnId;

    fn root(&self) -> InsnId {
        self.body.instructions.id_at(0)
    }

    fn vertices(&self) -> Vec<InsnId> {
        self.body.instructions.ids().collect()
    }

    fn successors(&self, v: InsnId) -> Vec<InsnId> {
        self.cfg.combined_successors(v)
    }

    fn predecessors(&self, v: InsnId) -> Vec<InsnId> {
        self.cfg.combined_predecessors(v)
    }

    fn clone_region(
        &mut self,
        to_clone: &[InsnId],
        owned_by: &[InsnId],
    ) -> Result<Vec<(InsnId, InsertionLocation<InsnId>)>, GraphError> {
        let to_clone: BTreeSet<InsnId> = to_clone.iter().copied().collect();
        let owned_by: BTreeSet<InsnId> = owned_by.iter().copied().collect();
        let added = clone_instructions(self.body, &self.cfg, &to_clone, &owned_by)
            .map_err(GraphError::duplication)?;
        // Edges are rebuilt wholesale rather than patched alongside the list
        // surgery; the splitter's quotient check runs against the result.
        self.cfg
            .reset_edges(self.body)
            .map_err(GraphError::duplication)?;
        self.body
            .validate_try_ranges()
            .map_err(GraphError::duplication)?;
        Ok(added)
    }
}

/// Removes all irreducible loops from `body` by node splitting.
///
/// Returns whether anything was duplicated. Instruction identities are
/// preserved; the transform only adds instructions (clones, labels, `goto`s)
/// and adds or splits exception-table entries.
///
/// When code was duplicated, the method is re-analyzed and split a second
/// time; that pass finding more work means the rewrite itself is broken and
/// is reported as [`BytecodeError::NotIdempotent`].
pub fn split_method(body: &mut MethodBody) -> Result<bool, BytecodeError> {
    if body.instructions.is_empty() {
        return Ok(false);
    }
    let cfg = MethodCfg::build(body)?;
    if cfg.guaranteed_acyclic() {
        trace!(method = %body.display_name(), "all edges go forward, nothing to do");
        return Ok(false);
    }

    let cloned = {
        let mut graph = MethodSplitGraph {
            body: &mut *body,
            cfg,
        };
        split_irreducible(&mut graph)?
    };

    if cloned {
        let second = {
            let cfg = MethodCfg::build(body)?;
            let mut graph = MethodSplitGraph {
                body: &mut *body,
                cfg,
            };
            split_irreducible(&mut graph)?
        };
        if second {
            return Err(BytecodeError::NotIdempotent {
                method: body.display_name(),
            });
        }
        debug!(
            method = %body.display_name(),
            instructions = body.instructions.len(),
            handlers = body.try_catch.len(),
            "irreducible control flow removed"
        );
    }
    Ok(cloned)
}
