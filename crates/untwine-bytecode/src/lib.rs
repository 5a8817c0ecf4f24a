//! # untwine-bytecode
//!
//! Irreducible-loop elimination for JVM method bodies.
//!
//! A method body is an ordered instruction list plus an exception handler
//! table. This crate builds the per-method control flow graph (normal and
//! exception edges kept apart), drives the generic node splitter from
//! `untwine-graph` over it, and implements the duplication hook that clones
//! instruction ranges: jump operands are rewired, broken fall-throughs get
//! explicit `goto`s, and exception-table entries are split or cloned so the
//! duplicated code keeps exactly the handler coverage of its originals.
//!
//! The entry point is [`split_method`]; it mutates the body in place and is
//! idempotent — a second invocation performs no duplication.

pub mod cfg;
mod cloner;
pub mod error;
pub mod insn;
pub mod method;
pub mod opcodes;
pub mod split;

pub use cfg::MethodCfg;
pub use error::BytecodeError;
pub use insn::{Frame, Insn, InsnId, InsnList, LabelId, OpInsn, Payload};
pub use method::{MethodBody, TryCatchEntry};
pub use split::{split_method, MethodSplitGraph};
