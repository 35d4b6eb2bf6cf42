//! Read/write access a [`crate::Detector`] is given into the traversal that is
//! currently visiting an instruction, mirroring `vm2`'s split between a tracer's
//! dispatch trait and the state interface it is handed.

use std::fmt;

use crate::{EvmOp, InstructionKind};

/// A taint label attached to a value during symbolic traversal.
///
/// Taints are namespaced per detector (`detector`), so two unrelated detectors can
/// independently taint the same value without interfering with each other's queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Taint {
    /// Name of the detector that attached this taint (its type name).
    pub detector: &'static str,
    /// The taint label itself, e.g. `"calldata"` or `"unprotected_caller"`.
    pub label: String,
    /// Optional free-form payload a detector can stash alongside the label.
    pub info: Option<String>,
}

impl Taint {
    /// Builds a taint with no extra payload.
    #[must_use]
    pub fn new(detector: &'static str, label: impl Into<String>) -> Self {
        Self {
            detector,
            label: label.into(),
            info: None,
        }
    }

    /// Builds a taint carrying an extra payload.
    #[must_use]
    pub fn with_info(detector: &'static str, label: impl Into<String>, info: impl Into<String>) -> Self {
        Self {
            detector,
            label: label.into(),
            info: Some(info.into()),
        }
    }
}

impl fmt::Display for Taint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.info {
            Some(info) => write!(f, "{}::{} ({info})", self.detector, self.label),
            None => write!(f, "{}::{}", self.detector, self.label),
        }
    }
}

/// Where in the original Solidity source an instruction came from, duplicated from
/// `hookaudit-ir`'s own `SourceMap` so this crate stays free of an IR dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLoc {
    pub file_index: u32,
    pub start: u32,
    pub len: u32,
}

/// Everything a [`crate::Detector`] callback can observe about the traversal it is
/// participating in, without reaching into the traversal engine's own types.
pub trait TraversalState {
    /// The instruction kind currently being visited.
    fn current_kind(&self) -> InstructionKind;

    /// Taints currently attached to the value produced by the current instruction.
    fn current_taints(&self) -> Vec<Taint>;

    /// Attaches a taint to the value produced by the current instruction.
    fn taint_current(&mut self, taint: Taint);

    /// Whether any value feeding the current instruction carries a taint with the
    /// given label, from any detector.
    fn is_tainted_by(&self, label: &str) -> bool;

    /// Whether the current path is inside a caller-protection check (e.g. an
    /// `if (msg.sender == poolManager)` guard that hasn't yet been shown bypassable).
    fn is_protected(&self) -> bool;

    /// Whether this DFS path was terminated by an unconditional revert.
    fn terminated_by_revert(&self) -> bool;

    /// Source-level function names called along the current path, outermost first.
    fn call_stack_names(&self) -> Vec<String>;

    /// Name of the function currently being traversed.
    fn current_function_name(&self) -> &str;

    /// Four-byte selector of the external entry point this traversal started from,
    /// if the entry point is a selector-dispatched external function.
    fn entry_selector(&self) -> Option<u32>;

    /// Whether the current entry point is the contract's fallback/receive function.
    fn is_fallback_entry(&self) -> bool;

    /// Marks the current DFS path as passing through a caller-protection check from
    /// this instruction onward (e.g. an `if (msg.sender == poolManager)` guard that
    /// hasn't yet been shown bypassable). Cleared automatically when the traversal
    /// backtracks past the instruction that called this.
    fn mark_protected(&mut self);

    /// Whether the function currently being traversed is runtime (post-deployment)
    /// code, as opposed to constructor/creation code.
    fn is_runtime(&self) -> bool;

    /// Whether this traversal's entry point function is non-static or payable.
    fn entry_mutable_or_payable(&self) -> bool;

    /// Number of raw operands the current instruction has (e.g. 7 for a `CALL`, 6 for
    /// a `DELEGATECALL`/`STATICCALL`).
    fn current_operand_count(&self) -> usize;

    /// Whether the current instruction's `index`-th raw operand, traced back through
    /// any type-conversion, ultimately comes from a storage read or an ABI-decoded
    /// (calldata/memory) value -- the "mutable address" shape a delegatecall target
    /// is flagged for.
    fn raw_operand_is_mutable_source(&self, index: usize) -> bool;

    /// Whether the current instruction's `index`-th raw operand, traced back through
    /// any type-conversion, ultimately resolves to this contract's own `ADDRESS`.
    fn raw_operand_is_self_address(&self, index: usize) -> bool;

    /// The opcode of the instruction the current instruction's `index`-th raw
    /// operand ultimately traces back to, through any type-conversion, if that
    /// origin is itself a raw EVM instruction (e.g. `CALLER`, `ADDRESS`).
    fn raw_operand_origin_opcode(&self, index: usize) -> Option<EvmOp>;

    /// The 4-byte selector of a call-family instruction currently being visited,
    /// recovered from the nearest preceding constant-valued `MSTORE` in the same
    /// block, if one exists.
    fn call_signature(&self) -> Option<u32>;

    /// The selector encoded by the `index`-th logical ABI argument the nearest
    /// preceding ABI-encode operation fed into this call, if one could be recovered
    /// (e.g. the callback selector packed into a pool manager `lock(bytes)` payload).
    fn logical_call_arg_selector(&self, index: usize) -> Option<u32>;

    /// Whether the `index`-th logical ABI argument the nearest preceding ABI-encode
    /// operation fed into this call ultimately resolves to this contract's own
    /// `ADDRESS` (the `lock(address,bytes)` "address is self" check).
    fn logical_call_arg_is_self_address(&self, index: usize) -> bool;

    /// Source location of the instruction currently being visited, if known.
    fn current_source(&self) -> Option<SourceLoc>;

    /// The Solidity-level name of the function dispatched to at `selector`, if any.
    fn function_name_for_selector(&self, selector: u32) -> Option<String>;
}
