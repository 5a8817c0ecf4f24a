//! Instruction-level region duplication.
//!
//! This is the duplication hook the region splitter invokes for one T3 step:
//! duplicate the instructions of a multi-entry region and reroute the entry
//! edges owned by one predecessor region onto the copies. The work happens in
//! seven strictly ordered phases; each later phase relies on the list state
//! the earlier ones left behind.
//!
//! 1. map every label defined inside the cloned set to a fresh label;
//! 2. clone the instructions in original order, operands remapped, appended
//!    at the end of the list;
//! 3. reroute each owned entry edge: retarget the jump operand, or insert a
//!    `goto` where the edge was a fall-through;
//! 4. insert `goto`s between clones whose originals relied on adjacency the
//!    appended layout no longer provides;
//! 5. insert `goto`s from clones whose originals fell through out of the
//!    cloned set;
//! 6. split exception-table entries so owned code is covered by the cloned
//!    handler;
//! 7. give the cloned code the same exception coverage its originals had.
//!
//! The caller recomputes CFG edges afterwards; nothing here maintains them.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::trace;
use untwine_graph::InsertionLocation;

use crate::cfg::MethodCfg;
use crate::error::BytecodeError;
use crate::insn::{Insn, InsnId, LabelId, OpInsn, Payload};
use crate::method::{MethodBody, TryCatchEntry};
use crate::opcodes;

/// Duplicates `to_clone` inside `body`, rerouting the edges owned by
/// `owned_by`. Returns every instruction added, with its insertion location.
///
/// `cfg` must describe `body` as it is on entry; it is *not* updated — the
/// caller calls [`MethodCfg::reset_edges`] when this returns.
pub(crate) fn clone_instructions(
    body: &mut MethodBody,
    cfg: &MethodCfg,
    to_clone: &BTreeSet<InsnId>,
    owned_by: &BTreeSet<InsnId>,
) -> Result<Vec<(InsnId, InsertionLocation<InsnId>)>, BytecodeError> {
    let orig_order: Vec<InsnId> = body.instructions.ids().collect();
    let orig_pos: HashMap<InsnId, usize> = orig_order
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i))
        .collect();
    let mut ordered: Vec<InsnId> = to_clone.iter().copied().collect();
    ordered.sort_by_key(|id| orig_pos[id]);

    let mut cloner = Cloner {
        body,
        cfg,
        to_clone,
        owned_by,
        ordered,
        orig_order,
        orig_pos,
        label_map: HashMap::new(),
        clones: BTreeMap::new(),
        added: Vec::new(),
        added_ids: HashSet::new(),
    };
    cloner.run()
}

struct Cloner<'a> {
    body: &'a mut MethodBody,
    cfg: &'a MethodCfg,
    to_clone: &'a BTreeSet<InsnId>,
    owned_by: &'a BTreeSet<InsnId>,
    /// `to_clone` in original list order.
    ordered: Vec<InsnId>,
    /// List order before any mutation.
    orig_order: Vec<InsnId>,
    orig_pos: HashMap<InsnId, usize>,
    /// Labels defined inside the cloned set, mapped to their fresh twins.
    label_map: HashMap<LabelId, LabelId>,
    clones: BTreeMap<InsnId, InsnId>,
    added: Vec<(InsnId, InsertionLocation<InsnId>)>,
    added_ids: HashSet<InsnId>,
}

impl Cloner<'_> {
    fn run(mut self) -> Result<Vec<(InsnId, InsertionLocation<InsnId>)>, BytecodeError> {
        self.build_label_map();
        self.clone_nodes();
        self.rewire_entry_edges()?;
        self.fix_fallthroughs_between_clones();
        self.fix_fallthroughs_leaving_clones();
        self.split_owned_try_entries()?;
        self.clone_covering_try_entries()?;
        trace!(
            cloned = self.clones.len(),
            added = self.added.len(),
            "region duplication finished"
        );
        Ok(self.added)
    }

    fn record(&mut self, id: InsnId, loc: InsertionLocation<InsnId>) {
        self.added_ids.insert(id);
        self.added.push((id, loc));
    }

    /// Phase 1: fresh labels for every label defined in the cloned set, so
    /// jumps between cloned instructions land on cloned labels.
    fn build_label_map(&mut self) {
        for i in 0..self.ordered.len() {
            let x = self.ordered[i];
            if let Insn::Label(l) = *self.body.instructions.get(x) {
                let fresh = self.body.instructions.new_label();
                self.label_map.insert(l, fresh);
            }
        }
    }

    /// Phase 2: append one clone per instruction, in original order.
    fn clone_nodes(&mut self) {
        for i in 0..self.ordered.len() {
            let x = self.ordered[i];
            let clone = self.body.instructions.get(x).remapped(&self.label_map);
            let id = self.body.instructions.push(clone);
            self.clones.insert(x, id);
            self.record(id, InsertionLocation::Append);
        }
    }

    /// Phase 3: every owned normal edge into the cloned set moves to the
    /// clones — by retargeting the jump operand when the edge was a jump, or
    /// by a fresh `goto` when it was a fall-through. Exactly one of the two
    /// must apply per edge; anything else means the control-flow information
    /// is stale.
    fn rewire_entry_edges(&mut self) -> Result<(), BytecodeError> {
        for i in 0..self.ordered.len() {
            let x = self.ordered[i];
            let preds: Vec<InsnId> = self.cfg.flow_predecessors(x).iter().copied().collect();
            for p in preds {
                if !self.owned_by.contains(&p) {
                    continue;
                }
                if self.retarget_jump(p, x) {
                    continue;
                }
                if self.was_fall_through(p, x) {
                    let clone = self.clones[&x];
                    let label = self.label_before(clone);
                    let goto = self
                        .body
                        .instructions
                        .insert_after(p, Insn::jump(opcodes::GOTO, label));
                    self.record(goto, InsertionLocation::After(p));
                    continue;
                }
                return Err(BytecodeError::EntryRewiring {
                    from: self.orig_pos[&p],
                });
            }
        }
        Ok(())
    }

    /// Replaces every occurrence of `x`'s label in `p`'s operand with the
    /// cloned label. Returns whether anything was replaced.
    fn retarget_jump(&mut self, p: InsnId, x: InsnId) -> bool {
        let Insn::Label(lx) = *self.body.instructions.get(x) else {
            return false;
        };
        let mapped = self.label_map[&lx];
        let Insn::Op(OpInsn { payload, .. }) = self.body.instructions.get_mut(p) else {
            return false;
        };
        let mut hit = false;
        match payload {
            Payload::Jump(t) => {
                if *t == lx {
                    *t = mapped;
                    hit = true;
                }
            }
            Payload::TableSwitch {
                default, targets, ..
            }
            | Payload::LookupSwitch {
                default, targets, ..
            } => {
                if *default == lx {
                    *default = mapped;
                    hit = true;
                }
                for t in targets.iter_mut() {
                    if *t == lx {
                        *t = mapped;
                        hit = true;
                    }
                }
            }
            _ => {}
        }
        hit
    }

    /// Whether the pre-clone edge `p -> x` was a fall-through.
    fn was_fall_through(&self, p: InsnId, x: InsnId) -> bool {
        self.orig_pos[&x] == self.orig_pos[&p] + 1 && self.body.instructions.get(p).falls_through()
    }

    /// Phase 4: originals that relied on `x` falling into `x + 1`, both
    /// cloned, need a `goto` wherever the clones are no longer adjacent.
    fn fix_fallthroughs_between_clones(&mut self) {
        for i in 0..self.ordered.len().saturating_sub(1) {
            let x = self.ordered[i];
            let y = self.ordered[i + 1];
            if self.orig_pos[&y] != self.orig_pos[&x] + 1 {
                continue;
            }
            if !self.body.instructions.get(x).falls_through() {
                continue;
            }
            let cx = self.clones[&x];
            let cy = self.clones[&y];
            if self.fallthrough_reaches(cx, cy) {
                continue;
            }
            let label = self.label_before(cy);
            let goto = self
                .body
                .instructions
                .insert_after(cx, Insn::jump(opcodes::GOTO, label));
            self.record(goto, InsertionLocation::After(cx));
        }
    }

    /// Phase 5: originals that fell through to an instruction outside the
    /// cloned set; the clone sits at the end of the list and needs a `goto`
    /// back to that instruction.
    fn fix_fallthroughs_leaving_clones(&mut self) {
        for i in 0..self.ordered.len() {
            let x = self.ordered[i];
            let next = self.orig_pos[&x] + 1;
            if next >= self.orig_order.len() {
                continue;
            }
            let y = self.orig_order[next];
            if self.to_clone.contains(&y) {
                continue;
            }
            if !self.body.instructions.get(x).falls_through() {
                continue;
            }
            let label = self.label_before(y);
            let cx = self.clones[&x];
            let goto = self
                .body
                .instructions
                .insert_after(cx, Insn::jump(opcodes::GOTO, label));
            self.record(goto, InsertionLocation::After(cx));
        }
    }

    /// Phase 6: entries whose handler was cloned must cover owned code with
    /// the cloned handler instead. The five overlap shapes of an owned range
    /// against an entry — swallowing it, disjoint, covering its start, its
    /// end, or strictly inside — produce one, one, two, two, or three
    /// entries. Ranges are processed in reverse index order so label
    /// insertions never disturb a range still to be processed.
    fn split_owned_try_entries(&mut self) -> Result<(), BytecodeError> {
        let owned_runs = self.runs_of(self.owned_by);
        if owned_runs.is_empty() {
            return Ok(());
        }

        let entries = std::mem::take(&mut self.body.try_catch);
        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(&cloned_handler) = self.label_map.get(&entry.handler) else {
                result.push(entry);
                continue;
            };

            let mut pieces = vec![entry.clone()];
            for run in owned_runs.iter().rev() {
                let rs = self.body.instructions.index_of(run[0]);
                let re = self.body.instructions.index_of(*run.last().unwrap());

                let mut action = None;
                for (idx, piece) in pieces.iter().enumerate() {
                    if piece.handler != entry.handler {
                        continue;
                    }
                    let ps = self.body.resolve(piece.start)?;
                    let pe = self.body.resolve(piece.end)?;
                    if re < ps || rs >= pe {
                        continue;
                    }
                    action = Some((idx, rs <= ps, re >= pe - 1));
                    break;
                }
                let Some((idx, covers_start, covers_end)) = action else {
                    continue;
                };

                let piece = pieces[idx].clone();
                let with = |start, end, handler| TryCatchEntry {
                    start,
                    end,
                    handler,
                    catch_type: piece.catch_type.clone(),
                };
                let replacement = match (covers_start, covers_end) {
                    (true, true) => {
                        vec![with(piece.start, piece.end, cloned_handler)]
                    }
                    (true, false) => {
                        let after_run = self.body.instructions.id_at(re + 1);
                        let boundary = self.label_before(after_run);
                        vec![
                            with(piece.start, boundary, cloned_handler),
                            with(boundary, piece.end, entry.handler),
                        ]
                    }
                    (false, true) => {
                        let boundary = self.label_before(run[0]);
                        vec![
                            with(piece.start, boundary, entry.handler),
                            with(boundary, piece.end, cloned_handler),
                        ]
                    }
                    (false, false) => {
                        let after_run = self.body.instructions.id_at(re + 1);
                        let hi = self.label_before(after_run);
                        let lo = self.label_before(run[0]);
                        vec![
                            with(piece.start, lo, entry.handler),
                            with(lo, hi, cloned_handler),
                            with(hi, piece.end, entry.handler),
                        ]
                    }
                };
                // Reusing an adjacent label as the boundary can leave a
                // piece that covers nothing; such pieces are dropped rather
                // than written out with an inverted range.
                let mut kept = Vec::with_capacity(replacement.len());
                for piece in replacement {
                    if self.body.resolve(piece.start)? < self.body.resolve(piece.end)? {
                        kept.push(piece);
                    }
                }
                pieces.splice(idx..=idx, kept);
            }
            result.extend(pieces);
        }
        self.body.try_catch = result;
        Ok(())
    }

    /// Phase 7: cloned instructions keep the exception coverage of their
    /// originals — one fresh entry per covered contiguous run of clones,
    /// pointing at the cloned handler when the handler itself was cloned.
    fn clone_covering_try_entries(&mut self) -> Result<(), BytecodeError> {
        let clone_runs = self.runs_of(self.to_clone);
        if clone_runs.is_empty() {
            return Ok(());
        }

        let snapshot = self.body.try_catch.clone();
        let mut new_entries = Vec::new();
        for entry in &snapshot {
            for run in clone_runs.iter().rev() {
                let ps = self.body.resolve(entry.start)?;
                let pe = self.body.resolve(entry.end)?;
                let covered: Vec<InsnId> = run
                    .iter()
                    .copied()
                    .filter(|&id| {
                        let i = self.body.instructions.index_of(id);
                        ps <= i && i < pe
                    })
                    .collect();
                if covered.is_empty() {
                    continue;
                }

                let first_clone = self.clones[&covered[0]];
                let last_clone = self.clones[covered.last().unwrap()];
                let start = self.label_before(first_clone);
                let end = self.label_after(last_clone);
                let handler = self
                    .label_map
                    .get(&entry.handler)
                    .copied()
                    .unwrap_or(entry.handler);
                new_entries.push(TryCatchEntry {
                    start,
                    end,
                    handler,
                    catch_type: entry.catch_type.clone(),
                });
            }
        }
        self.body.try_catch.extend(new_entries);
        Ok(())
    }

    /// Maximal groups of `set` members that are consecutive in the current
    /// list, looking through nodes added during this duplication (labels and
    /// `goto`s cannot throw and never separate a covered range).
    fn runs_of(&self, set: &BTreeSet<InsnId>) -> Vec<Vec<InsnId>> {
        let mut runs = Vec::new();
        let mut current: Vec<InsnId> = Vec::new();
        for id in self.body.instructions.ids() {
            if set.contains(&id) {
                current.push(id);
            } else if self.added_ids.contains(&id) {
                // transparent
            } else if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }
        runs
    }

    /// Whether control entering at `from` reaches `to` purely by falling
    /// through pseudo nodes.
    fn fallthrough_reaches(&self, from: InsnId, to: InsnId) -> bool {
        let list = &self.body.instructions;
        let mut pos = list.index_of(from) + 1;
        while pos < list.len() {
            let id = list.id_at(pos);
            if id == to {
                return true;
            }
            if !list.get(id).is_pseudo() {
                return false;
            }
            pos += 1;
        }
        false
    }

    /// A label at `target`'s position: `target` itself when it is a label,
    /// a label this duplication already placed in front of it, or a fresh
    /// one inserted there.
    ///
    /// Pre-existing neighboring labels are never reused: they may belong to
    /// a different region than `target`, and a jump routed through them
    /// would put the new edge into the wrong region.
    fn label_before(&mut self, target: InsnId) -> LabelId {
        if let Insn::Label(l) = *self.body.instructions.get(target) {
            return l;
        }
        let pos = self.body.instructions.index_of(target);
        if pos > 0 {
            let prev = self.body.instructions.id_at(pos - 1);
            if self.added_ids.contains(&prev) {
                if let Insn::Label(l) = *self.body.instructions.get(prev) {
                    return l;
                }
            }
        }
        let l = self.body.instructions.new_label();
        let id = self.body.instructions.insert_before(target, Insn::Label(l));
        self.record(id, InsertionLocation::Before(target));
        l
    }

    /// A label directly behind `target`, reused when this duplication already
    /// placed one there.
    fn label_after(&mut self, target: InsnId) -> LabelId {
        let pos = self.body.instructions.index_of(target);
        if pos + 1 < self.body.instructions.len() {
            let next = self.body.instructions.id_at(pos + 1);
            if self.added_ids.contains(&next) {
                if let Insn::Label(l) = *self.body.instructions.get(next) {
                    return l;
                }
            }
        }
        let l = self.body.instructions.new_label();
        let id = self.body.instructions.insert_after(target, Insn::Label(l));
        self.record(id, InsertionLocation::After(target));
        l
    }
}
