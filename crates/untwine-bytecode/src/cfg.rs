//! Per-method control flow graph.
//!
//! Vertices are instruction nodes; normal edges (fall-through and explicit
//! branches) and exception edges (covered instruction to handler) are kept in
//! separate sets because the cloner rewires them differently — jump operands
//! on one side, exception-table surgery on the other. The generic region
//! splitter sees the union.
//!
//! Edges are not maintained incrementally: after the cloner has mutated the
//! instruction list, [`MethodCfg::reset_edges`] recomputes everything from
//! scratch. Keeping live edge sets correct through list surgery is far more
//! error-prone than one linear rebuild.

use std::collections::BTreeSet;

use crate::error::BytecodeError;
use crate::insn::{Insn, InsnId};
use crate::method::MethodBody;
use crate::opcodes;

/// Control flow graph over the instructions of one method.
#[derive(Debug, Default)]
pub struct MethodCfg {
    succs: Vec<BTreeSet<InsnId>>,
    preds: Vec<BTreeSet<InsnId>>,
    catch_succs: Vec<BTreeSet<InsnId>>,
    try_preds: Vec<BTreeSet<InsnId>>,
    guaranteed_acyclic: bool,
}

impl MethodCfg {
    /// Builds the CFG for `body`.
    pub fn build(body: &MethodBody) -> Result<Self, BytecodeError> {
        let mut cfg = Self::default();
        cfg.reset_edges(body)?;
        Ok(cfg)
    }

    /// Discards and recomputes all edges from the current instruction list
    /// and exception table.
    pub fn reset_edges(&mut self, body: &MethodBody) -> Result<(), BytecodeError> {
        let list = &body.instructions;
        let n = list.ids().map(|id| id.0 as usize + 1).max().unwrap_or(0);
        self.succs = vec![BTreeSet::new(); n];
        self.preds = vec![BTreeSet::new(); n];
        self.catch_succs = vec![BTreeSet::new(); n];
        self.try_preds = vec![BTreeSet::new(); n];
        self.guaranteed_acyclic = true;

        if list.is_empty() {
            return Ok(());
        }

        // Resolve exception ranges up front.
        let mut handlers = Vec::with_capacity(body.try_catch.len());
        for entry in &body.try_catch {
            let start = body.resolve(entry.start)?;
            let end = body.resolve(entry.end)?;
            let handler = list
                .label_insn(entry.handler)
                .ok_or(BytecodeError::UndefinedLabel(entry.handler))?;
            handlers.push((start, end, handler));
        }

        // Basic-value control-flow walk: only successor computation matters,
        // so the worklist carries bare instruction ids.
        let mut visited = vec![false; n];
        let mut worklist = vec![list.id_at(0)];
        while let Some(id) = worklist.pop() {
            if std::mem::replace(&mut visited[id.0 as usize], true) {
                continue;
            }
            let pos = list.index_of(id);

            let mut out: Vec<InsnId> = Vec::new();
            match list.get(id) {
                Insn::Op(op) => {
                    if opcodes::is_subroutine(op.opcode) {
                        return Err(BytecodeError::UnsupportedOpcode {
                            opcode: op.opcode,
                            index: pos,
                        });
                    }
                    for label in list.get(id).branch_targets() {
                        let target = list
                            .label_insn(label)
                            .ok_or(BytecodeError::UndefinedLabel(label))?;
                        out.push(target);
                    }
                    if op.is_terminator() {
                        // no fall-through
                    } else if pos + 1 < list.len() {
                        out.push(list.id_at(pos + 1));
                    }
                }
                // Labels, line numbers, and frames fall through.
                _ => {
                    if pos + 1 < list.len() {
                        out.push(list.id_at(pos + 1));
                    }
                }
            }

            for dst in out {
                self.add_flow_edge(list.index_of(dst), pos, id, dst);
                worklist.push(dst);
            }

            for &(start, end, handler) in &handlers {
                if start <= pos && pos < end {
                    self.add_catch_edge(list.index_of(handler), pos, id, handler);
                    worklist.push(handler);
                }
            }
        }

        Ok(())
    }

    fn add_flow_edge(&mut self, dst_pos: usize, src_pos: usize, src: InsnId, dst: InsnId) {
        if dst_pos <= src_pos {
            self.guaranteed_acyclic = false;
        }
        self.succs[src.0 as usize].insert(dst);
        self.preds[dst.0 as usize].insert(src);
    }

    fn add_catch_edge(&mut self, dst_pos: usize, src_pos: usize, src: InsnId, dst: InsnId) {
        if dst_pos <= src_pos {
            self.guaranteed_acyclic = false;
        }
        self.catch_succs[src.0 as usize].insert(dst);
        self.try_preds[dst.0 as usize].insert(src);
    }

    /// True when every edge goes forward in list order, i.e. the method
    /// cannot contain a loop of any kind.
    pub fn guaranteed_acyclic(&self) -> bool {
        self.guaranteed_acyclic
    }

    /// Normal control successors of `id`.
    pub fn flow_successors(&self, id: InsnId) -> &BTreeSet<InsnId> {
        &self.succs[id.0 as usize]
    }

    /// Normal control predecessors of `id`.
    pub fn flow_predecessors(&self, id: InsnId) -> &BTreeSet<InsnId> {
        &self.preds[id.0 as usize]
    }

    /// Handlers reachable from `id` by a thrown exception.
    pub fn catch_successors(&self, id: InsnId) -> &BTreeSet<InsnId> {
        &self.catch_succs[id.0 as usize]
    }

    /// Covered instructions that reach the handler `id`.
    pub fn try_predecessors(&self, id: InsnId) -> &BTreeSet<InsnId> {
        &self.try_preds[id.0 as usize]
    }

    /// Normal and exception successors together, as the region splitter sees
    /// them.
    pub fn combined_successors(&self, id: InsnId) -> Vec<InsnId> {
        self.succs[id.0 as usize]
            .union(&self.catch_succs[id.0 as usize])
            .copied()
            .collect()
    }

    /// Normal and exception predecessors together.
    pub fn combined_predecessors(&self, id: InsnId) -> Vec<InsnId> {
        self.preds[id.0 as usize]
            .union(&self.try_preds[id.0 as usize])
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::Insn;
    use crate::method::TryCatchEntry;
    use crate::opcodes::{GOTO, IFEQ, NOP, RETURN};

    fn body() -> MethodBody {
        MethodBody::new("com/example/A", "m", "()V")
    }

    #[test]
    fn linear_method_is_acyclic() {
        let mut b = body();
        let i0 = b.instructions.push(Insn::op(NOP));
        let i1 = b.instructions.push(Insn::op(NOP));
        let i2 = b.instructions.push(Insn::op(RETURN));

        let cfg = MethodCfg::build(&b).unwrap();
        assert!(cfg.guaranteed_acyclic());
        assert_eq!(cfg.flow_successors(i0).iter().copied().collect::<Vec<_>>(), vec![i1]);
        assert_eq!(cfg.flow_predecessors(i2).iter().copied().collect::<Vec<_>>(), vec![i1]);
        assert!(cfg.flow_successors(i2).is_empty());
    }

    #[test]
    fn conditional_branch_has_two_successors() {
        let mut b = body();
        let target = b.instructions.new_label();
        let i0 = b.instructions.push(Insn::jump(IFEQ, target));
        let i1 = b.instructions.push(Insn::op(NOP));
        let l = b.instructions.push(Insn::Label(target));
        b.instructions.push(Insn::op(RETURN));

        let cfg = MethodCfg::build(&b).unwrap();
        let succs: Vec<_> = cfg.flow_successors(i0).iter().copied().collect();
        assert_eq!(succs, vec![i1, l]);
        assert!(cfg.guaranteed_acyclic());
    }

    #[test]
    fn backward_goto_clears_acyclic_flag() {
        let mut b = body();
        let top = b.instructions.new_label();
        b.instructions.push(Insn::Label(top));
        b.instructions.push(Insn::op(NOP));
        b.instructions.push(Insn::jump(GOTO, top));

        let cfg = MethodCfg::build(&b).unwrap();
        assert!(!cfg.guaranteed_acyclic());
    }

    #[test]
    fn goto_does_not_fall_through() {
        let mut b = body();
        let target = b.instructions.new_label();
        let jump = b.instructions.push(Insn::jump(GOTO, target));
        let skipped = b.instructions.push(Insn::op(NOP));
        let l = b.instructions.push(Insn::Label(target));
        b.instructions.push(Insn::op(RETURN));

        let cfg = MethodCfg::build(&b).unwrap();
        assert_eq!(cfg.flow_successors(jump).iter().copied().collect::<Vec<_>>(), vec![l]);
        // The skipped instruction is unreachable and gets no edges.
        assert!(cfg.flow_successors(skipped).is_empty());
        assert!(cfg.flow_predecessors(skipped).is_empty());
    }

    #[test]
    fn exception_edges_cover_the_protected_range() {
        let mut b = body();
        let start = b.instructions.new_label();
        let end = b.instructions.new_label();
        let handler = b.instructions.new_label();

        b.instructions.push(Insn::Label(start));
        let covered = b.instructions.push(Insn::op(NOP));
        b.instructions.push(Insn::Label(end));
        b.instructions.push(Insn::op(RETURN));
        let h = b.instructions.push(Insn::Label(handler));
        b.instructions.push(Insn::op(RETURN));
        b.try_catch.push(TryCatchEntry {
            start,
            end,
            handler,
            catch_type: None,
        });

        let cfg = MethodCfg::build(&b).unwrap();
        assert!(cfg.catch_successors(covered).contains(&h));
        assert!(cfg.try_predecessors(h).contains(&covered));
        // The end label itself is outside the range.
        let end_insn = b.instructions.label_insn(end).unwrap();
        assert!(cfg.catch_successors(end_insn).is_empty());
        // Exception edges show up in the combined view.
        assert!(cfg.combined_successors(covered).contains(&h));
    }

    #[test]
    fn backward_handler_clears_acyclic_flag() {
        let mut b = body();
        let start = b.instructions.new_label();
        let end = b.instructions.new_label();
        let handler = b.instructions.new_label();

        b.instructions.push(Insn::Label(handler));
        b.instructions.push(Insn::op(NOP));
        b.instructions.push(Insn::Label(start));
        b.instructions.push(Insn::op(NOP));
        b.instructions.push(Insn::Label(end));
        b.instructions.push(Insn::op(RETURN));
        b.try_catch.push(TryCatchEntry {
            start,
            end,
            handler,
            catch_type: None,
        });

        let cfg = MethodCfg::build(&b).unwrap();
        assert!(!cfg.guaranteed_acyclic());
    }

    #[test]
    fn subroutines_are_rejected() {
        let mut b = body();
        let target = b.instructions.new_label();
        b.instructions.push(Insn::jump(crate::opcodes::JSR, target));
        b.instructions.push(Insn::Label(target));
        b.instructions.push(Insn::op(RETURN));

        assert!(matches!(
            MethodCfg::build(&b),
            Err(BytecodeError::UnsupportedOpcode { .. })
        ));
    }
}
