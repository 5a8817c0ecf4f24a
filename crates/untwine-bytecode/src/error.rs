//! Error types for untwine-bytecode.

use thiserror::Error;

use crate::insn::LabelId;

/// Errors surfaced while analyzing or rewriting a method body.
#[derive(Error, Debug)]
pub enum BytecodeError {
    /// A jump or exception-table label with no defining instruction.
    #[error("label {0:?} is not defined in the instruction list")]
    UndefinedLabel(LabelId),

    /// Opcode the rewriter refuses to analyze (jsr/ret subroutines).
    #[error("unsupported opcode {opcode:#04x} at instruction {index}")]
    UnsupportedOpcode { opcode: u8, index: usize },

    /// An exception-table entry whose range collapsed or inverted.
    #[error("exception table entry covers no instructions ({start} >= {end})")]
    TryRangeInverted { start: usize, end: usize },

    /// An entry edge into the cloned set that is neither a retargetable jump
    /// nor a fall-through. Indicates stale control-flow information.
    #[error("edge from instruction {from} into the cloned set is neither a jump nor a fall-through")]
    EntryRewiring { from: usize },

    /// A second splitting pass still found something to duplicate.
    #[error("{method}: node splitting did not converge; a second pass still duplicated code")]
    NotIdempotent { method: String },

    /// Failure inside the generic region splitter.
    #[error(transparent)]
    Graph(#[from] untwine_graph::GraphError),
}
