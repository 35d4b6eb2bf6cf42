//! Path-sensitive symbolic traversal of a lifted [`Contract`], grounded in
//! `hookscan/core/traversal.py`/`traversal_info.py`.
//!
//! [`run`] drives one DFS walk of a single external (or fallback) entry point's
//! control-flow graph, forking at every conditional branch/switch and recursing into
//! callees, invoking a [`Detector`] at every instruction visited. Constant-folding and
//! mutual-exclusion checks on accumulated branch conditions ([`Constraint`]) prune
//! paths that can be proven unreachable without a full symbolic execution engine; loop
//! bodies and over-deep recursion are bounded rather than unrolled, since this crate
//! cares about reachability of dangerous instructions, not about computing concrete
//! results.
//!
//! Unlike the Python original, which tracks a parallel per-path graph of `ValueInstance`s
//! to give every operand a path-specific identity, this traversal leans on the fact that
//! every [`NodeId`] here is already contract-wide unique and phi nodes sit exactly at
//! syntactic join points: resolving a phi only needs to know which predecessor block the
//! DFS arrived from ([`PathFrame::pre_block`]), not a separate instance graph. Taint
//! *semantics* (what a value pattern means) stay out of this module entirely; it only
//! auto-merges whatever taints a detector already attached to an instruction's operands
//! onto that instruction, so detectors can ask [`TraversalState::is_tainted_by`] without
//! re-deriving reachability themselves.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use primitive_types::U256;

use hookaudit_interface::{dispatch_after, dispatch_before, Detector, EvmOp, InstructionKind, SourceLoc, Taint, TraversalState};

use crate::{
    basic_block::BasicBlockId,
    contract::Contract,
    function::{Function, FunctionId, FunctionType},
    instruction::{BranchInst, CallInst, Instruction, InstKind, MemoryOpKind, StorageOpKind, SwitchInst},
    value::{NodeId, ValueRef},
};

/// A single branch condition committed to on the current DFS path: `condition == 0`
/// (or the peeled-out value `!=`/`==` `case_value`) must hold for this path to be
/// reachable. Reduced from the Python `Constraint` dataclass to the parts that
/// actually prune unreachable paths here: constant folding of the condition, and
/// mutual exclusion against another constraint on the same condition.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub condition: ValueRef,
    /// `true` if `condition` must equal `case_value`; `false` if it must differ.
    pub is_eq: bool,
    pub case_value: U256,
}

impl Constraint {
    fn constant_value(contract: &Contract, value: ValueRef) -> Option<U256> {
        match value {
            ValueRef::Constant(id) => contract.constant(id)?.as_u256(),
            _ => None,
        }
    }

    /// Peels `iszero`/`eq`-against-constant wrappers off `condition` so semantically
    /// identical constraints compare equal and fold against each other, mirroring
    /// `Constraint._normalize`. Stops at the first operand it can't simplify further.
    #[must_use]
    pub fn normalize(mut self, contract: &Contract) -> Self {
        loop {
            let ValueRef::Instruction(id) = self.condition else { break };
            let Some(inst) = contract.instruction(id) else { break };
            match &inst.kind {
                InstKind::Evm {
                    op: EvmOp::Iszero,
                    args,
                } if args.len() == 1 && (self.case_value.is_zero() || self.case_value == U256::one()) => {
                    // iszero(x) == 1  <=>  x == 0; iszero(x) == 0  <=>  x != 0.
                    let wants_iszero_true = if self.case_value.is_zero() { !self.is_eq } else { self.is_eq };
                    self.condition = args[0];
                    self.is_eq = wants_iszero_true;
                    self.case_value = U256::zero();
                }
                InstKind::Evm {
                    op: EvmOp::Eq,
                    args,
                } if args.len() == 2 && (self.case_value.is_zero() || self.case_value == U256::one()) => {
                    let wants_eq_true = if self.case_value.is_zero() { !self.is_eq } else { self.is_eq };
                    if let Some(rhs) = Self::constant_value(contract, args[1]) {
                        self.condition = args[0];
                        self.is_eq = wants_eq_true;
                        self.case_value = rhs;
                    } else if let Some(lhs) = Self::constant_value(contract, args[0]) {
                        self.condition = args[1];
                        self.is_eq = wants_eq_true;
                        self.case_value = lhs;
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        self
    }

    /// Folds this constraint to a definite truth value when `condition` resolves to a
    /// compile-time constant, matching `Constraint._try_solve`.
    #[must_use]
    pub fn try_solve(&self, contract: &Contract) -> Option<bool> {
        let value = Self::constant_value(contract, self.condition)?;
        Some((value == self.case_value) == self.is_eq)
    }

    /// Whether this constraint and `other` can never both hold, because they pin the
    /// same condition to incompatible values.
    #[must_use]
    pub fn mutually_exclusive(&self, other: &Constraint) -> bool {
        if self.condition != other.condition {
            return false;
        }
        match (self.is_eq, other.is_eq) {
            (true, true) => self.case_value != other.case_value,
            (true, false) | (false, true) => self.case_value == other.case_value,
            (false, false) => false,
        }
    }
}

/// Tuning knobs for one traversal run, grounded in
/// `hookscan/components/timeout_handler.py`'s `TimeoutHandler` and the loop/recursion
/// bounds `Traversal.dfs` enforces inline.
///
/// Python redistributes a contract-wide time budget dynamically across external
/// functions as each one finishes; this is a flat per-run budget instead, since here
/// each [`run`] call already covers exactly one entry point. The CLI is what divides
/// an overall time budget across the contract's external functions.
#[derive(Debug, Clone)]
pub struct TraversalOptions {
    /// Wall-clock budget for exploring this one entry point before the DFS gives up
    /// on unexplored branches.
    pub timeout_per_round: Duration,
    /// When set, detectors are not dispatched for instructions on a path currently
    /// inside a caller-protection check (`--only-run-not-protected`).
    pub only_run_not_protected: bool,
    /// How many times the same function may appear re-entered on the call stack
    /// before further calls to it are treated as opaque (no further recursion).
    pub max_recursive_reentries: u32,
    /// How many times a loop's entry block may be revisited along one path before
    /// the DFS stops unrolling it further.
    pub max_loop_unroll: u32,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            timeout_per_round: Duration::from_secs(30),
            only_run_not_protected: false,
            max_recursive_reentries: 2,
            max_loop_unroll: 2,
        }
    }
}

/// One call frame on the traversal's own call stack, recording where to resume the
/// caller once a `return` inside the callee is reached.
#[derive(Debug, Clone)]
struct CallFrame {
    callee: FunctionId,
    call_inst: NodeId,
    return_block: BasicBlockId,
    return_index: usize,
    return_pre_block: BasicBlockId,
    caller_function_name: String,
}

/// One entry of the path currently being explored.
#[derive(Debug, Clone, Copy)]
struct PathFrame {
    block: BasicBlockId,
    /// The block control flow arrived from, used to pick the live incoming edge of a
    /// phi at the top of `block` instead of merging every edge's value.
    pre_block: BasicBlockId,
    /// Whether this point on the path is inside a caller-protection check. Inherited
    /// by every frame pushed afterward until the traversal backtracks past the frame
    /// that set it.
    protected: bool,
}

/// All mutable state belonging to one DFS run, and the read/write surface
/// [`Detector`]s are given through [`TraversalState`].
pub struct Engine<'c> {
    contract: &'c Contract,
    options: TraversalOptions,

    taints: HashMap<NodeId, Vec<Taint>>,
    path: Vec<PathFrame>,
    call_stack: Vec<CallFrame>,
    recursion_count: HashMap<FunctionId, u32>,
    fork_constraints: Vec<Constraint>,

    current_inst: Option<NodeId>,
    current_function_name: String,
    entry_selector: Option<u32>,
    is_fallback_entry: bool,
    entry_is_runtime: bool,
    entry_mutable_or_payable: bool,
    terminated_by_revert: bool,
    /// One-shot flag set by [`Traversal::handle_branch`] right before descending into
    /// the fork that represents a caller-identity check having passed; consumed the
    /// next time a [`PathFrame`] is pushed.
    force_protect: bool,

    timeout_started_at: Instant,
}

impl<'c> Engine<'c> {
    fn new(contract: &'c Contract, entry: &Function, options: TraversalOptions) -> Self {
        Self {
            contract,
            options,
            taints: HashMap::new(),
            path: Vec::new(),
            call_stack: Vec::new(),
            recursion_count: HashMap::new(),
            fork_constraints: Vec::new(),
            current_inst: None,
            current_function_name: entry.solidity_name().unwrap_or_else(|| entry.name.clone()),
            entry_selector: entry.selector,
            is_fallback_entry: matches!(entry.kind, FunctionType::Fallback),
            entry_is_runtime: entry.is_runtime,
            entry_mutable_or_payable: entry.mutable_or_payable_or_default(),
            terminated_by_revert: false,
            force_protect: false,
            timeout_started_at: Instant::now(),
        }
    }

    fn is_timeout(&self) -> bool {
        self.timeout_started_at.elapsed() >= self.options.timeout_per_round
    }

    fn set_force_protect(&mut self) {
        self.force_protect = true;
    }

    fn take_force_protect(&mut self) -> bool {
        std::mem::take(&mut self.force_protect)
    }

    /// Best-effort recognizer for a caller-identity protection check (`require(msg.sender
    /// == owner)` and its `!=`/`revert`-guard lowerings), a reduced stand-in for
    /// `clear_condition.py`'s full operand walk: peels `iszero` wrappers off a branch
    /// condition and looks for an `eq(caller(), x)`/`eq(x, caller())` shape underneath.
    /// Returns which side of the fork represents the check having passed (`true` for
    /// the branch taken when the condition is non-zero), or `None` if the condition
    /// isn't recognizably a caller check.
    fn caller_check_polarity(&self, mut condition: ValueRef) -> Option<bool> {
        let mut negations: u32 = 0;
        loop {
            let ValueRef::Instruction(id) = condition else { return None };
            let inst = self.contract.instruction(id)?;
            match &inst.kind {
                InstKind::Evm {
                    op: EvmOp::Iszero,
                    args,
                } if args.len() == 1 => {
                    condition = args[0];
                    negations += 1;
                }
                InstKind::Evm { op: EvmOp::Eq, args } if args.len() == 2 => {
                    let is_caller = |v: ValueRef| {
                        matches!(
                            self.origin_instruction(v).map(|inst| &inst.kind),
                            Some(InstKind::Evm { op: EvmOp::Caller, .. })
                        )
                    };
                    return if is_caller(args[0]) || is_caller(args[1]) {
                        Some(negations % 2 == 0)
                    } else {
                        None
                    };
                }
                _ => return None,
            }
        }
    }

    /// Whether `block`'s loop has already been walked around enough times on the
    /// current path that unrolling it further isn't worth the cost.
    fn loop_unrolled_enough(&self, block: BasicBlockId) -> bool {
        let visits = self.path.iter().filter(|f| f.block == block).count() as u32;
        visits > self.options.max_loop_unroll
    }

    /// Whether `constraint` can be proven unreachable given what's already committed
    /// to on this path, either by constant folding or by contradicting an existing
    /// constraint on the same condition.
    fn violates(&self, constraint: &Constraint) -> bool {
        let constraint = constraint.clone().normalize(self.contract);
        if constraint.try_solve(self.contract) == Some(false) {
            return true;
        }
        self.fork_constraints.iter().any(|existing| existing.mutually_exclusive(&constraint))
    }

    fn function_display_name(&self, id: FunctionId) -> String {
        self.contract
            .function(id)
            .and_then(Function::solidity_name)
            .unwrap_or_else(|| self.contract.function(id).map_or_else(String::new, |f| f.name.clone()))
    }

    /// Pulls whatever taints a detector already attached to `inst`'s operands onto
    /// `inst` itself, so detectors never need to walk the operand graph by hand. A
    /// phi only inherits taints from the incoming edge the DFS actually took.
    fn merge_operand_taints(&mut self, inst: &Instruction) {
        let pre_block = self.path.last().map(|f| f.pre_block);
        let operand_ids: Vec<NodeId> = match &inst.kind {
            InstKind::Phi(phi) => phi
                .incoming
                .iter()
                .filter(|incoming| Some(incoming.from_block) == pre_block)
                .map(|incoming| incoming.value.id())
                .collect(),
            _ => inst.operands().iter().map(|v| v.id()).collect(),
        };
        let mut merged = Vec::new();
        for id in operand_ids {
            if let Some(existing) = self.taints.get(&id) {
                for taint in existing {
                    if !merged.contains(taint) {
                        merged.push(taint.clone());
                    }
                }
            }
        }
        if !merged.is_empty() {
            self.taints.entry(inst.id).or_default().extend(merged);
        }
    }

    /// Merges `from`'s current taints onto `onto`, used to carry a `return`'s taints
    /// back onto the call site that consumes them, and a call's argument taints
    /// forward onto the callee's formal parameters.
    fn propagate_taint(&mut self, onto: NodeId, from: ValueRef) {
        let Some(existing) = self.taints.get(&from.id()).cloned() else {
            return;
        };
        let bucket = self.taints.entry(onto).or_default();
        for taint in existing {
            if !bucket.contains(&taint) {
                bucket.push(taint);
            }
        }
    }

    fn current_instruction(&self) -> Option<&Instruction> {
        self.current_inst.and_then(|id| self.contract.instruction(id))
    }

    fn raw_operand(&self, index: usize) -> Option<ValueRef> {
        self.current_instruction()?.operands().get(index).copied()
    }

    /// Walks a value back through type-conversion/extract-return-value/
    /// single-incoming-phi wrappers to the instruction that actually produced it,
    /// mirroring the `origin` property chain `ValueInstance` walks in the Python
    /// source, without needing a parallel per-path instance graph to do it.
    fn origin(&self, mut value: ValueRef) -> ValueRef {
        loop {
            let ValueRef::Instruction(id) = value else { return value };
            let Some(inst) = self.contract.instruction(id) else { return value };
            match &inst.kind {
                InstKind::TypeConvert(t) if t.args.len() == 1 => value = t.args[0],
                InstKind::ExtractReturnValue(e) => value = ValueRef::Instruction(e.call),
                InstKind::Phi(phi) if phi.incoming.len() == 1 => value = phi.incoming[0].value,
                _ => return value,
            }
        }
    }

    fn origin_instruction(&self, value: ValueRef) -> Option<&Instruction> {
        match self.origin(value) {
            ValueRef::Instruction(id) => self.contract.instruction(id),
            _ => None,
        }
    }

    /// The "mutable address" shape §4.8 flags a delegatecall target for: a value
    /// ultimately read out of storage or decoded straight off calldata/memory.
    fn is_mutable_source(&self, value: ValueRef) -> bool {
        match self.origin_instruction(value).map(|inst| &inst.kind) {
            Some(InstKind::Storage(s)) => matches!(s.kind, StorageOpKind::Read),
            Some(InstKind::Evm { op: EvmOp::Sload, .. }) => true,
            Some(InstKind::Memory(m)) => matches!(m.kind, MemoryOpKind::AbiDecodeFromCallData | MemoryOpKind::AbiDecodeFromMemory),
            _ => false,
        }
    }

    fn is_self_address(&self, value: ValueRef) -> bool {
        matches!(
            self.origin_instruction(value).map(|inst| &inst.kind),
            Some(InstKind::Evm { op: EvmOp::Address, .. })
        )
    }

    /// Scans backward from `from`'s own position for the nearest constant-valued
    /// `MSTORE` in the same block and recovers the selector it stored (the constant's
    /// top 4 bytes), mirroring the ABI-encode -> call recovery heuristic described in
    /// the module doc comment. A reduced stand-in for the full encode-pointer chain
    /// walk in the Python source's `get_call_signature`.
    fn recovered_selector_at(&self, from: NodeId) -> Option<u32> {
        let (_, bb_id, idx) = self.contract.instruction_location(from)?;
        let bb = self.contract.basic_blocks.get(&bb_id)?;
        bb.instructions[..idx].iter().rev().find_map(|inst| match &inst.kind {
            InstKind::Evm {
                op: EvmOp::Mstore,
                args,
            } if args.len() == 2 => match self.origin(args[1]) {
                ValueRef::Constant(id) => {
                    let value = self.contract.constant(id)?.as_u256()?;
                    Some((value >> 224).low_u32())
                }
                _ => None,
            },
            _ => None,
        })
    }

    /// The `index`-th logical ABI argument value fed to the nearest preceding
    /// ABI-encode operation before `from`.
    fn logical_call_arg(&self, from: NodeId, index: usize) -> Option<ValueRef> {
        let abi_encode = self.preceding_abi_encode(from)?;
        let InstKind::Memory(m) = &abi_encode.kind else {
            return None;
        };
        m.args.get(index).copied()
    }

    fn preceding_abi_encode(&self, from: NodeId) -> Option<&Instruction> {
        let (_, bb_id, idx) = self.contract.instruction_location(from)?;
        let bb = self.contract.basic_blocks.get(&bb_id)?;
        bb.instructions[..idx]
            .iter()
            .rev()
            .find(|inst| matches!(&inst.kind, InstKind::Memory(m) if matches!(m.kind, MemoryOpKind::AbiEncode)))
    }
}

impl TraversalState for Engine<'_> {
    fn current_kind(&self) -> InstructionKind {
        self.current_inst
            .and_then(|id| self.contract.instruction(id))
            .map(Instruction::kind_tag)
            .expect("current_kind queried outside instruction dispatch")
    }

    fn current_taints(&self) -> Vec<Taint> {
        self.current_inst.and_then(|id| self.taints.get(&id)).cloned().unwrap_or_default()
    }

    fn taint_current(&mut self, taint: Taint) {
        let id = self.current_inst.expect("taint_current called outside instruction dispatch");
        let bucket = self.taints.entry(id).or_default();
        if !bucket.contains(&taint) {
            bucket.push(taint);
        }
    }

    fn is_tainted_by(&self, label: &str) -> bool {
        self.current_taints().iter().any(|t| t.label == label)
    }

    fn is_protected(&self) -> bool {
        self.path.last().is_some_and(|f| f.protected)
    }

    fn terminated_by_revert(&self) -> bool {
        self.terminated_by_revert
    }

    fn call_stack_names(&self) -> Vec<String> {
        self.call_stack.iter().map(|f| self.function_display_name(f.callee)).collect()
    }

    fn current_function_name(&self) -> &str {
        &self.current_function_name
    }

    fn entry_selector(&self) -> Option<u32> {
        self.entry_selector
    }

    fn is_fallback_entry(&self) -> bool {
        self.is_fallback_entry
    }

    fn mark_protected(&mut self) {
        if let Some(frame) = self.path.last_mut() {
            frame.protected = true;
        }
    }

    fn is_runtime(&self) -> bool {
        self.entry_is_runtime
    }

    fn entry_mutable_or_payable(&self) -> bool {
        self.entry_mutable_or_payable
    }

    fn current_operand_count(&self) -> usize {
        self.current_instruction().map_or(0, |inst| inst.operands().len())
    }

    fn raw_operand_is_mutable_source(&self, index: usize) -> bool {
        self.raw_operand(index).is_some_and(|v| self.is_mutable_source(v))
    }

    fn raw_operand_is_self_address(&self, index: usize) -> bool {
        self.raw_operand(index).is_some_and(|v| self.is_self_address(v))
    }

    fn raw_operand_origin_opcode(&self, index: usize) -> Option<EvmOp> {
        let value = self.raw_operand(index)?;
        match self.origin_instruction(value).map(|inst| &inst.kind) {
            Some(InstKind::Evm { op, .. }) => Some(*op),
            _ => None,
        }
    }

    fn call_signature(&self) -> Option<u32> {
        self.recovered_selector_at(self.current_inst?)
    }

    fn logical_call_arg_selector(&self, index: usize) -> Option<u32> {
        let arg = self.logical_call_arg(self.current_inst?, index)?;
        match self.origin(arg) {
            ValueRef::Instruction(id) => self.recovered_selector_at(id),
            _ => None,
        }
    }

    fn logical_call_arg_is_self_address(&self, index: usize) -> bool {
        self.current_inst
            .and_then(|id| self.logical_call_arg(id, index))
            .is_some_and(|v| self.is_self_address(v))
    }

    fn current_source(&self) -> Option<SourceLoc> {
        let sm = self.current_instruction()?.source_map?;
        Some(SourceLoc {
            file_index: sm.file_index,
            start: sm.start,
            len: sm.len,
        })
    }

    fn function_name_for_selector(&self, selector: u32) -> Option<String> {
        let func = self.contract.function_by_selector(selector)?;
        Some(func.solidity_name().unwrap_or_else(|| func.name.clone()))
    }
}

/// Runs one detector set over one DFS starting from `entry`'s entry point, returning
/// the (possibly stateful) detectors once every reachable path has been explored or
/// the time budget runs out.
///
/// Callers iterate [`Contract::external_functions`] (and [`Contract::fallback_function`]
/// if present) and call this once per entry point, rather than this module tracking
/// "which external function is currently executing" itself.
pub fn run<D: Detector>(contract: &Contract, entry: &Function, detectors: D, options: TraversalOptions) -> D {
    let mut traversal = Traversal {
        engine: Engine::new(contract, entry, options),
        detectors,
    };
    if let Some(entry_point) = entry.entry_point {
        traversal.dfs(entry_point, entry_point, 0);
    }
    traversal.detectors
}

struct Traversal<'c, D: Detector> {
    engine: Engine<'c>,
    detectors: D,
}

impl<'c, D: Detector> Traversal<'c, D> {
    fn dispatch_before(&mut self, kind: InstructionKind) {
        if self.engine.options.only_run_not_protected && self.engine.is_protected() {
            return;
        }
        dispatch_before(kind, &mut self.detectors, &mut self.engine);
    }

    fn dispatch_after(&mut self, kind: InstructionKind) {
        if self.engine.options.only_run_not_protected && self.engine.is_protected() {
            return;
        }
        dispatch_after(kind, &mut self.detectors, &mut self.engine);
    }

    fn end_of_path(&mut self) {
        self.detectors.on_end_of_path(&mut self.engine);
    }

    /// Once a loop entry has been unrolled as many times as `loop_unrolled_enough`
    /// allows, forces the walk past it by jumping straight to the loop's exit edge
    /// instead of abandoning the path at the back-edge, mirroring how the Python
    /// traversal keeps exploring what comes after a bounded loop rather than treating
    /// loop-unroll exhaustion as a dead end.
    fn force_loop_exit(&mut self, loop_entry: BasicBlockId) {
        let contract = self.engine.contract;
        let Some(bb) = contract.basic_blocks.get(&loop_entry) else { return };
        let Some(compare_block) = bb.loop_compare else { return };
        let Some(compare_bb) = contract.basic_blocks.get(&compare_block) else { return };
        let Some(InstKind::Branch(branch)) = compare_bb.terminator().map(|inst| &inst.kind) else { return };
        if let Some(exit) = branch.false_target {
            self.dfs(exit, compare_block, 0);
        }
    }

    /// Walks `block`'s instructions from `start_index` onward, forking/recursing at
    /// whatever terminator ends the block. `pre_block` names the predecessor control
    /// flow entered `block` from, for phi resolution.
    fn dfs(&mut self, block: BasicBlockId, pre_block: BasicBlockId, start_index: usize) {
        let force_protect = self.engine.take_force_protect();
        if self.engine.is_timeout() {
            return;
        }
        if start_index == 0 && self.engine.loop_unrolled_enough(block) {
            self.force_loop_exit(block);
            return;
        }

        let protected = self.engine.is_protected() || force_protect;
        self.engine.path.push(PathFrame { block, pre_block, protected });

        let contract = self.engine.contract;
        let bb = contract.basic_blocks.get(&block).expect("basic block exists");

        for idx in start_index..bb.instructions.len() {
            let inst = &bb.instructions[idx];
            self.engine.current_inst = Some(inst.id);
            self.engine.merge_operand_taints(inst);
            let kind = inst.kind_tag();
            self.dispatch_before(kind);

            match &inst.kind {
                InstKind::Call(call) => {
                    self.dispatch_after(kind);
                    self.handle_call(call.clone(), inst.id, block, idx);
                    self.engine.path.pop();
                    return;
                }
                InstKind::Return(ret) => {
                    self.dispatch_after(kind);
                    let values = ret.values.clone();
                    self.handle_return(&values);
                    self.engine.path.pop();
                    return;
                }
                InstKind::Branch(b) => {
                    self.dispatch_after(kind);
                    let b = b.clone();
                    self.handle_branch(&b, block);
                    self.engine.path.pop();
                    return;
                }
                InstKind::Switch(s) => {
                    self.dispatch_after(kind);
                    let s = s.clone();
                    self.handle_switch(&s, block);
                    self.engine.path.pop();
                    return;
                }
                InstKind::Unreachable => {
                    self.dispatch_after(kind);
                    self.end_of_path();
                    self.engine.path.pop();
                    return;
                }
                InstKind::Evm { op, .. } if op.is_halt() => {
                    self.dispatch_after(kind);
                    self.engine.terminated_by_revert =
                        matches!(op, EvmOp::Revert | EvmOp::Invalid);
                    self.end_of_path();
                    self.engine.terminated_by_revert = false;
                    self.engine.path.pop();
                    return;
                }
                _ => self.dispatch_after(kind),
            }
        }

        // Every basic block is expected to end in a terminator; falling off the end
        // without hitting one is treated as a (defensive) end of path.
        self.end_of_path();
        self.engine.path.pop();
    }

    fn handle_call(&mut self, call: CallInst, call_inst: NodeId, at_block: BasicBlockId, at_index: usize) {
        let Some(callee) = self.engine.contract.function(call.callee) else {
            return;
        };
        let reentries = *self.engine.recursion_count.get(&call.callee).unwrap_or(&0);
        if reentries >= self.engine.options.max_recursive_reentries {
            // Treat as opaque: the call site itself was already dispatched to
            // detectors above, but its body isn't explored further, so there's
            // nothing left to continue into here — the caller's remaining
            // instructions after this call are simply unreachable from this path.
            return;
        }

        for (arg, param) in call.args.iter().zip(callee.arguments.iter()) {
            self.engine.propagate_taint(param.id, *arg);
        }

        let pre_block = self.engine.path.last().map(|f| f.pre_block).unwrap_or(at_block);
        *self.engine.recursion_count.entry(call.callee).or_insert(0) += 1;
        self.engine.call_stack.push(CallFrame {
            callee: call.callee,
            call_inst,
            return_block: at_block,
            return_index: at_index + 1,
            return_pre_block: pre_block,
            caller_function_name: self.engine.current_function_name.clone(),
        });
        self.engine.current_function_name = self.engine.function_display_name(call.callee);

        if let Some(entry_point) = callee.entry_point {
            self.dfs(entry_point, entry_point, 0);
        }

        self.engine.call_stack.pop();
        if let Some(count) = self.engine.recursion_count.get_mut(&call.callee) {
            *count = count.saturating_sub(1);
        }
    }

    /// Handles a `return` out of the function currently being traversed: if there is
    /// a caller on the call stack, recurses into its continuation for each distinct
    /// `return` site reached (so two branches of the callee ending in different
    /// `return`s each drive their own continuation of the caller), then restores the
    /// call frame so sibling branches inside the callee still see it. With no
    /// caller, this is the external entry point returning, i.e. an end of path.
    fn handle_return(&mut self, values: &[ValueRef]) {
        let Some(frame) = self.engine.call_stack.pop() else {
            self.end_of_path();
            return;
        };
        self.engine.current_function_name = frame.caller_function_name.clone();
        for value in values {
            self.engine.propagate_taint(frame.call_inst, *value);
        }

        self.dfs(frame.return_block, frame.return_pre_block, frame.return_index);

        self.engine.call_stack.push(frame);
    }

    fn handle_branch(&mut self, branch: &BranchInst, block: BasicBlockId) {
        let Some(condition) = branch.condition else {
            self.dfs(branch.true_target, block, 0);
            return;
        };

        // `Some(true)`: the non-zero side is the caller check passing; `Some(false)`:
        // the zero side is. `None`: this branch isn't a recognizable caller check.
        let polarity = self.engine.caller_check_polarity(condition);

        let taken = Constraint {
            condition,
            is_eq: false,
            case_value: U256::zero(),
        };
        if !self.engine.violates(&taken) {
            self.engine.fork_constraints.push(taken.normalize(self.engine.contract));
            if polarity == Some(true) {
                self.engine.set_force_protect();
            }
            self.dfs(branch.true_target, block, 0);
            self.engine.fork_constraints.pop();
        }

        if let Some(false_target) = branch.false_target {
            let not_taken = Constraint {
                condition,
                is_eq: true,
                case_value: U256::zero(),
            };
            if !self.engine.violates(&not_taken) {
                self.engine.fork_constraints.push(not_taken.normalize(self.engine.contract));
                if polarity == Some(false) {
                    self.engine.set_force_protect();
                }
                self.dfs(false_target, block, 0);
                self.engine.fork_constraints.pop();
            }
        }
    }

    fn handle_switch(&mut self, switch: &SwitchInst, block: BasicBlockId) {
        for (value, target) in &switch.cases {
            let constraint = Constraint {
                condition: switch.scrutinee,
                is_eq: true,
                case_value: *value,
            };
            if !self.engine.violates(&constraint) {
                self.engine.fork_constraints.push(constraint.normalize(self.engine.contract));
                self.dfs(*target, block, 0);
                self.engine.fork_constraints.pop();
            }
        }

        let not_any_case: Vec<Constraint> = switch
            .cases
            .iter()
            .map(|(value, _)| Constraint {
                condition: switch.scrutinee,
                is_eq: false,
                case_value: *value,
            })
            .collect();
        if !not_any_case.iter().any(|c| self.engine.violates(c)) {
            let pushed = not_any_case.len();
            for c in not_any_case {
                self.engine.fork_constraints.push(c.normalize(self.engine.contract));
            }
            self.dfs(switch.default, block, 0);
            for _ in 0..pushed {
                self.engine.fork_constraints.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{basic_block::BasicBlock, function::MutabilityInfo, instruction::ReturnInst, value::Argument};

    struct CountingDetector {
        visited: std::cell::RefCell<u32>,
        ends: std::cell::RefCell<u32>,
    }

    impl Detector for &CountingDetector {
        fn before_instruction<K: hookaudit_interface::InstructionKindType, S: TraversalState>(&mut self, _state: &mut S) {
            *self.visited.borrow_mut() += 1;
        }

        fn on_end_of_path<S: TraversalState>(&mut self, _state: &mut S) {
            *self.ends.borrow_mut() += 1;
        }
    }

    /// Builds a tiny contract with one external function that branches on its first
    /// argument and returns from both sides, to exercise branch forking end-to-end.
    fn branching_contract() -> (Contract, FunctionId) {
        let mut contract = Contract::new("Test");
        let id_group = contract.id_group.clone();
        let func_id = FunctionId(NodeId(id_group.alloc()));

        let entry = BasicBlockId(NodeId(id_group.alloc()));
        let then_block = BasicBlockId(NodeId(id_group.alloc()));
        let else_block = BasicBlockId(NodeId(id_group.alloc()));

        let arg = Argument {
            id: NodeId(id_group.alloc()),
            name: "x".to_string(),
            index: 0,
        };
        let arg_ref = ValueRef::Argument(arg.id);

        let mut entry_bb = BasicBlock::new(entry, func_id);
        entry_bb.successors = vec![then_block, else_block];
        entry_bb.instructions.push(Instruction {
            id: NodeId(id_group.alloc()),
            source_map: None,
            kind: InstKind::Branch(BranchInst {
                condition: Some(arg_ref),
                true_target: then_block,
                false_target: Some(else_block),
            }),
        });

        let mut then_bb = BasicBlock::new(then_block, func_id);
        then_bb.predecessors = vec![entry];
        then_bb.instructions.push(Instruction {
            id: NodeId(id_group.alloc()),
            source_map: None,
            kind: InstKind::Return(ReturnInst { values: vec![] }),
        });

        let mut else_bb = BasicBlock::new(else_block, func_id);
        else_bb.predecessors = vec![entry];
        else_bb.instructions.push(Instruction {
            id: NodeId(id_group.alloc()),
            source_map: None,
            kind: InstKind::Return(ReturnInst { values: vec![] }),
        });

        contract.insert_function(
            Function {
                id: func_id,
                name: "external_fun_hook_12345678".to_string(),
                kind: FunctionType::External,
                selector: Some(0x1234_5678),
                is_runtime: true,
                arguments: vec![arg],
                return_names: vec![],
                entry_point: Some(entry),
                basic_blocks: vec![entry, then_block, else_block],
                mutability: MutabilityInfo::default(),
            },
            vec![entry_bb, then_bb, else_bb],
        );

        (contract, func_id)
    }

    #[test]
    fn branch_with_unknown_condition_explores_both_sides() {
        let (contract, func_id) = branching_contract();
        let func = contract.function(func_id).unwrap();
        let detector = CountingDetector {
            visited: std::cell::RefCell::new(0),
            ends: std::cell::RefCell::new(0),
        };
        run(&contract, func, &detector, TraversalOptions::default());
        assert_eq!(*detector.ends.borrow(), 2);
    }

    #[test]
    fn constraint_normalizes_iszero_wrapper() {
        let mut contract = Contract::new("Test");
        let id_group = contract.id_group.clone();
        let func_id = FunctionId(NodeId(id_group.alloc()));
        let block = BasicBlockId(NodeId(id_group.alloc()));
        let x = NodeId(id_group.alloc());
        let iszero_id = NodeId(id_group.alloc());

        let mut bb = BasicBlock::new(block, func_id);
        bb.instructions.push(Instruction {
            id: iszero_id,
            source_map: None,
            kind: InstKind::Evm {
                op: EvmOp::Iszero,
                args: vec![ValueRef::Argument(x)],
            },
        });
        contract.basic_blocks.insert(block, bb);
        contract.reindex_block(block);

        let constraint = Constraint {
            condition: ValueRef::Instruction(iszero_id),
            is_eq: false,
            case_value: U256::zero(),
        }
        .normalize(&contract);

        assert_eq!(constraint.condition, ValueRef::Argument(x));
        assert!(constraint.is_eq);
        assert_eq!(constraint.case_value, U256::zero());
    }

    #[test]
    fn mutually_exclusive_detects_conflicting_equalities() {
        let cond = ValueRef::Argument(NodeId(crate::id_arena::Id(0)));
        let a = Constraint {
            condition: cond,
            is_eq: true,
            case_value: U256::from(1),
        };
        let b = Constraint {
            condition: cond,
            is_eq: true,
            case_value: U256::from(2),
        };
        assert!(a.mutually_exclusive(&b));

        let c = Constraint {
            condition: cond,
            is_eq: true,
            case_value: U256::from(1),
        };
        let d = Constraint {
            condition: cond,
            is_eq: false,
            case_value: U256::from(1),
        };
        assert!(c.mutually_exclusive(&d));
    }
}
