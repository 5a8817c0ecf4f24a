//! Instruction nodes and the mutable instruction list.
//!
//! Instructions are identified by [`InsnId`], which stays valid across list
//! mutation; the position of an instruction is a separate, shifting notion
//! queried through [`InsnList::index_of`]. Labels live in their own namespace
//! ([`LabelId`]) and are defined by `Label` instruction nodes; jumps,
//! switches, and exception-table entries refer to labels, never to raw
//! offsets.

use std::collections::HashMap;

use crate::opcodes;

/// Identity of an instruction node, stable across list mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InsnId(pub u32);

impl std::fmt::Display for InsnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Identity of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelId(pub u32);

impl std::fmt::Display for LabelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Opaque stack-map payload, carried through cloning untouched.
///
/// The rewriter never interprets frames; the class writer recomputes them
/// when the method is re-serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame(pub Vec<u8>);

/// One node of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Insn {
    /// Defines a label position.
    Label(LabelId),
    /// Line-number metadata anchored at a label.
    Line { line: u16, start: LabelId },
    /// Stack-map frame metadata.
    Frame(Frame),
    /// A numbered bytecode operation.
    Op(OpInsn),
}

/// A numbered opcode plus whatever operand shape it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpInsn {
    pub opcode: u8,
    pub payload: Payload,
}

/// Operand payload of an [`OpInsn`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Payload {
    None,
    /// Single branch target (conditional branches and `goto`).
    Jump(LabelId),
    TableSwitch {
        default: LabelId,
        low: i32,
        high: i32,
        targets: Vec<LabelId>,
    },
    LookupSwitch {
        default: LabelId,
        keys: Vec<i32>,
        targets: Vec<LabelId>,
    },
    /// Operand bytes the rewriter treats as opaque (constant-pool refs,
    /// local slots, type operands, ...).
    Raw(Vec<u8>),
}

impl Insn {
    /// A plain operation without operands.
    pub fn op(opcode: u8) -> Self {
        Self::Op(OpInsn {
            opcode,
            payload: Payload::None,
        })
    }

    /// A branch (conditional or `goto`) to `target`.
    pub fn jump(opcode: u8, target: LabelId) -> Self {
        Self::Op(OpInsn {
            opcode,
            payload: Payload::Jump(target),
        })
    }

    /// An operation with opaque operand bytes.
    pub fn raw(opcode: u8, operands: Vec<u8>) -> Self {
        Self::Op(OpInsn {
            opcode,
            payload: Payload::Raw(operands),
        })
    }

    /// Label, line-number, and frame nodes take no part in execution.
    pub fn is_pseudo(&self) -> bool {
        !matches!(self, Self::Op(_))
    }

    /// Whether control never continues at the next list position.
    pub fn is_terminator(&self) -> bool {
        match self {
            Self::Op(op) => op.is_terminator(),
            _ => false,
        }
    }

    /// Whether control can continue at the next list position.
    pub fn falls_through(&self) -> bool {
        !self.is_terminator()
    }

    /// All labels this node jumps to (empty for non-branching nodes).
    pub fn branch_targets(&self) -> Vec<LabelId> {
        match self {
            Self::Op(OpInsn { payload, .. }) => match payload {
                Payload::Jump(t) => vec![*t],
                Payload::TableSwitch {
                    default, targets, ..
                }
                | Payload::LookupSwitch {
                    default, targets, ..
                } => {
                    let mut out = vec![*default];
                    out.extend(targets.iter().copied());
                    out
                }
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// A copy of this node with every label reference pushed through `map`;
    /// labels absent from the map stay as they are.
    pub fn remapped(&self, map: &HashMap<LabelId, LabelId>) -> Self {
        let resolve = |l: &LabelId| map.get(l).copied().unwrap_or(*l);
        match self {
            Self::Label(l) => Self::Label(resolve(l)),
            Self::Line { line, start } => Self::Line {
                line: *line,
                start: resolve(start),
            },
            Self::Frame(f) => Self::Frame(f.clone()),
            Self::Op(OpInsn { opcode, payload }) => {
                let payload = match payload {
                    Payload::None => Payload::None,
                    Payload::Jump(t) => Payload::Jump(resolve(t)),
                    Payload::TableSwitch {
                        default,
                        low,
                        high,
                        targets,
                    } => Payload::TableSwitch {
                        default: resolve(default),
                        low: *low,
                        high: *high,
                        targets: targets.iter().map(|t| resolve(t)).collect(),
                    },
                    Payload::LookupSwitch {
                        default,
                        keys,
                        targets,
                    } => Payload::LookupSwitch {
                        default: resolve(default),
                        keys: keys.clone(),
                        targets: targets.iter().map(|t| resolve(t)).collect(),
                    },
                    Payload::Raw(bytes) => Payload::Raw(bytes.clone()),
                };
                Self::Op(OpInsn {
                    opcode: *opcode,
                    payload,
                })
            }
        }
    }
}

impl OpInsn {
    /// Whether control never continues at the next list position.
    pub fn is_terminator(&self) -> bool {
        opcodes::is_unconditional_jump(self.opcode)
            || opcodes::is_return(self.opcode)
            || self.opcode == opcodes::ATHROW
            || self.opcode == opcodes::TABLESWITCH
            || self.opcode == opcodes::LOOKUPSWITCH
            || self.opcode == opcodes::RET
    }
}

/// Ordered instruction sequence with stable node identity.
///
/// Nodes are stored in an arena indexed by [`InsnId`]; the list order is kept
/// separately so inserts shift positions without invalidating ids. Label
/// definitions are tracked as labels enter the list.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InsnList {
    nodes: Vec<Insn>,
    order: Vec<InsnId>,
    positions: Vec<usize>,
    labels: HashMap<LabelId, InsnId>,
    next_label: u32,
}

impl InsnList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Instruction ids in list order.
    pub fn ids(&self) -> impl Iterator<Item = InsnId> + '_ {
        self.order.iter().copied()
    }

    pub fn get(&self, id: InsnId) -> &Insn {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: InsnId) -> &mut Insn {
        &mut self.nodes[id.0 as usize]
    }

    /// Current position of `id` in the list.
    pub fn index_of(&self, id: InsnId) -> usize {
        self.positions[id.0 as usize]
    }

    /// Instruction at position `index`.
    pub fn id_at(&self, index: usize) -> InsnId {
        self.order[index]
    }

    /// Allocates a label id that is not yet defined by any node.
    pub fn new_label(&mut self) -> LabelId {
        let l = LabelId(self.next_label);
        self.next_label += 1;
        l
    }

    /// The instruction node defining `label`.
    pub fn label_insn(&self, label: LabelId) -> Option<InsnId> {
        self.labels.get(&label).copied()
    }

    /// Appends a node.
    pub fn push(&mut self, insn: Insn) -> InsnId {
        let id = self.alloc(insn);
        self.positions[id.0 as usize] = self.order.len();
        self.order.push(id);
        id
    }

    /// Inserts a node directly before `anchor`.
    pub fn insert_before(&mut self, anchor: InsnId, insn: Insn) -> InsnId {
        let at = self.index_of(anchor);
        let id = self.alloc(insn);
        self.order.insert(at, id);
        self.reindex_from(at);
        id
    }

    /// Inserts a node directly after `anchor`.
    pub fn insert_after(&mut self, anchor: InsnId, insn: Insn) -> InsnId {
        let at = self.index_of(anchor) + 1;
        let id = self.alloc(insn);
        self.order.insert(at, id);
        self.reindex_from(at);
        id
    }

    fn alloc(&mut self, insn: Insn) -> InsnId {
        let id = InsnId(self.nodes.len() as u32);
        if let Insn::Label(l) = &insn {
            debug_assert!(
                !self.labels.contains_key(l),
                "label {l:?} defined twice"
            );
            self.labels.insert(*l, id);
            if l.0 >= self.next_label {
                self.next_label = l.0 + 1;
            }
        }
        self.nodes.push(insn);
        self.positions.push(usize::MAX);
        id
    }

    fn reindex_from(&mut self, at: usize) {
        for (pos, id) in self.order.iter().enumerate().skip(at) {
            self.positions[id.0 as usize] = pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::{GOTO, NOP, RETURN};

    #[test]
    fn push_assigns_positions() {
        let mut list = InsnList::new();
        let a = list.push(Insn::op(NOP));
        let b = list.push(Insn::op(RETURN));
        assert_eq!(list.index_of(a), 0);
        assert_eq!(list.index_of(b), 1);
        assert_eq!(list.id_at(1), b);
    }

    #[test]
    fn insert_before_shifts_later_positions() {
        let mut list = InsnList::new();
        let a = list.push(Insn::op(NOP));
        let b = list.push(Insn::op(RETURN));
        let l = list.new_label();
        let mid = list.insert_before(b, Insn::Label(l));

        assert_eq!(list.index_of(a), 0);
        assert_eq!(list.index_of(mid), 1);
        assert_eq!(list.index_of(b), 2);
        assert_eq!(list.label_insn(l), Some(mid));
    }

    #[test]
    fn insert_after_last_appends() {
        let mut list = InsnList::new();
        let a = list.push(Insn::op(NOP));
        let b = list.insert_after(a, Insn::op(RETURN));
        assert_eq!(list.index_of(b), 1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn labels_register_on_insertion() {
        let mut list = InsnList::new();
        let l = list.new_label();
        assert_eq!(list.label_insn(l), None);
        let id = list.push(Insn::Label(l));
        assert_eq!(list.label_insn(l), Some(id));
    }

    #[test]
    fn fresh_labels_never_collide_with_preexisting() {
        let mut list = InsnList::new();
        list.push(Insn::Label(LabelId(7)));
        let fresh = list.new_label();
        assert!(fresh.0 > 7);
    }

    #[test]
    fn remap_rewrites_only_mapped_labels() {
        let l0 = LabelId(0);
        let l1 = LabelId(1);
        let l9 = LabelId(9);
        let mut map = HashMap::new();
        map.insert(l0, l9);

        let jump = Insn::jump(GOTO, l0).remapped(&map);
        assert_eq!(jump, Insn::jump(GOTO, l9));

        let stay = Insn::jump(GOTO, l1).remapped(&map);
        assert_eq!(stay, Insn::jump(GOTO, l1));
    }

    #[test]
    fn switch_targets_all_remap() {
        let map: HashMap<_, _> = [(LabelId(0), LabelId(10)), (LabelId(1), LabelId(11))]
            .into_iter()
            .collect();
        let sw = Insn::Op(OpInsn {
            opcode: crate::opcodes::TABLESWITCH,
            payload: Payload::TableSwitch {
                default: LabelId(0),
                low: 0,
                high: 1,
                targets: vec![LabelId(1), LabelId(2)],
            },
        });
        let remapped = sw.remapped(&map);
        assert_eq!(
            remapped.branch_targets(),
            vec![LabelId(10), LabelId(11), LabelId(2)]
        );
    }

    #[test]
    fn terminator_classification() {
        assert!(Insn::op(RETURN).is_terminator());
        assert!(Insn::jump(GOTO, LabelId(0)).is_terminator());
        assert!(!Insn::jump(crate::opcodes::IFEQ, LabelId(0)).is_terminator());
        assert!(!Insn::op(NOP).is_terminator());
        assert!(!Insn::Label(LabelId(0)).is_terminator());
    }
}
