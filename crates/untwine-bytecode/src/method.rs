//! Method bodies and exception-table entries.

use crate::error::BytecodeError;
use crate::insn::{InsnList, LabelId};

/// One exception-table entry.
///
/// Every instruction `i` with `index(start) <= index(i) < index(end)` has an
/// exception edge to the instruction at `handler`. Entries are only ever
/// added, split, or retargeted by the rewriter, never removed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TryCatchEntry {
    pub start: LabelId,
    pub end: LabelId,
    pub handler: LabelId,
    /// Internal name of the caught class; `None` catches everything
    /// (`finally` blocks).
    pub catch_type: Option<String>,
}

/// A method body as the rewriter sees it: the ordered instruction list, the
/// exception table, and enough naming to report errors and resolve types.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MethodBody {
    /// Internal name of the enclosing class (`com/example/Foo`).
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub instructions: InsnList,
    pub try_catch: Vec<TryCatchEntry>,
}

impl MethodBody {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
            instructions: InsnList::new(),
            try_catch: Vec::new(),
        }
    }

    /// `owner.name descriptor`, for diagnostics.
    pub fn display_name(&self) -> String {
        format!("{}.{}{}", self.owner, self.name, self.descriptor)
    }

    /// Checks that every exception-table entry still covers at least one
    /// instruction. Run after any mutation of the instruction list.
    pub fn validate_try_ranges(&self) -> Result<(), BytecodeError> {
        for entry in &self.try_catch {
            let start = self.resolve(entry.start)?;
            let end = self.resolve(entry.end)?;
            self.resolve(entry.handler)?;
            if start >= end {
                return Err(BytecodeError::TryRangeInverted { start, end });
            }
        }
        Ok(())
    }

    /// Position of the instruction defining `label`.
    pub fn resolve(&self, label: LabelId) -> Result<usize, BytecodeError> {
        let id = self
            .instructions
            .label_insn(label)
            .ok_or(BytecodeError::UndefinedLabel(label))?;
        Ok(self.instructions.index_of(id))
    }
}
