//! The top-level IR container, grounded in `uniscan/components/contract.py`.
//!
//! A [`Contract`] owns every node allocated while lifting and normalizing one
//! Solidity contract: its functions, their basic blocks, and the pool of constants
//! and arguments those blocks' instructions reference. Everything is addressed by
//! [`NodeId`] rather than by reference (see [`crate::value`] for why), so `Contract`
//! is also where [`NodeId`]s get resolved back into actual data.

use std::collections::{HashMap, HashSet};

use hookaudit_interface::EvmOp;
use indexmap::IndexMap;

use crate::{
    basic_block::{BasicBlock, BasicBlockId},
    constant::{Constant, ConstantKind},
    error::VerifyError,
    function::{Function, FunctionId, FunctionType},
    id_arena::IdGroup,
    instruction::{InstKind, Instruction, StorageOpKind},
    value::{Argument, NodeId, ValueRef},
};

/// A resolved operand: either a live instruction, a function argument plus the
/// function it belongs to, or a constant.
pub enum Resolved<'a> {
    Instruction(&'a Instruction),
    Argument(&'a Argument, FunctionId),
    Constant(&'a Constant),
}

/// A fully lifted and (optionally) normalized contract.
#[derive(Debug)]
pub struct Contract {
    pub id_group: IdGroup,
    pub name: String,
    pub creation_functions: IndexMap<String, Function>,
    pub runtime_functions: IndexMap<String, Function>,
    pub basic_blocks: HashMap<BasicBlockId, BasicBlock>,
    constants: HashMap<NodeId, Constant>,
    arguments: HashMap<NodeId, (Argument, FunctionId)>,
    inst_location: HashMap<NodeId, (FunctionId, BasicBlockId, usize)>,
}

impl Contract {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id_group: IdGroup::new(),
            name: name.into(),
            creation_functions: IndexMap::new(),
            runtime_functions: IndexMap::new(),
            basic_blocks: HashMap::new(),
            constants: HashMap::new(),
            arguments: HashMap::new(),
            inst_location: HashMap::new(),
        }
    }

    #[must_use]
    pub fn alloc_id(&self) -> NodeId {
        NodeId(self.id_group.alloc())
    }

    /// Iterates every function, creation side first then runtime side, matching
    /// `Contract.all_functions`.
    pub fn all_functions(&self) -> impl Iterator<Item = &Function> {
        self.creation_functions.values().chain(self.runtime_functions.values())
    }

    pub fn all_functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.creation_functions
            .values_mut()
            .chain(self.runtime_functions.values_mut())
    }

    #[must_use]
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.all_functions().find(|f| f.id == id)
    }

    pub fn function_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.all_functions_mut().find(|f| f.id == id)
    }

    /// Registers a function and indexes its basic blocks for id-based lookup. Takes
    /// the blocks separately since `Function` only stores their ids.
    pub fn insert_function(&mut self, func: Function, blocks: Vec<BasicBlock>) {
        for bb in blocks {
            self.basic_blocks.insert(bb.id, bb);
        }
        let entries: Vec<(NodeId, BasicBlockId, usize)> = self
            .basic_blocks
            .values()
            .filter(|bb| bb.function == func.id)
            .flat_map(|bb| bb.instructions.iter().enumerate().map(move |(i, inst)| (inst.id, bb.id, i)))
            .collect();
        for (inst_id, bb_id, i) in entries {
            self.inst_location.insert(inst_id, (func.id, bb_id, i));
        }
        for (i, arg) in func.arguments.iter().enumerate() {
            debug_assert_eq!(arg.index, i);
            self.arguments.insert(arg.id, (arg.clone(), func.id));
        }
        if func.is_runtime {
            self.runtime_functions.insert(func.name.clone(), func);
        } else {
            self.creation_functions.insert(func.name.clone(), func);
        }
    }

    /// Re-derives `inst_location` for one basic block. Must be called after any pass
    /// mutates `bb.instructions` in place (insertion/removal/replacement), since the
    /// `bb_index` each instruction is found at changes.
    pub fn reindex_block(&mut self, bb_id: BasicBlockId) {
        let Some(bb) = self.basic_blocks.get(&bb_id) else {
            return;
        };
        let func_id = bb.function;
        let entries: Vec<_> = bb
            .instructions
            .iter()
            .enumerate()
            .map(|(i, inst)| (inst.id, i))
            .collect();
        self.inst_location.retain(|_, (_, loc_bb, _)| *loc_bb != bb_id);
        for (inst_id, i) in entries {
            self.inst_location.insert(inst_id, (func_id, bb_id, i));
        }
    }

    pub fn intern_constant(&mut self, kind: ConstantKind) -> NodeId {
        if let Some(existing) = self.constants.values().find(|c| c.kind == kind) {
            return existing.id;
        }
        let id = self.alloc_id();
        self.constants.insert(id, Constant { id, kind });
        id
    }

    #[must_use]
    pub fn instruction(&self, id: NodeId) -> Option<&Instruction> {
        let (_, bb, idx) = self.inst_location.get(&id)?;
        self.basic_blocks.get(bb)?.instructions.get(*idx)
    }

    #[must_use]
    pub fn instruction_location(&self, id: NodeId) -> Option<(FunctionId, BasicBlockId, usize)> {
        self.inst_location.get(&id).copied()
    }

    #[must_use]
    pub fn argument(&self, id: NodeId) -> Option<&Argument> {
        self.arguments.get(&id).map(|(arg, _)| arg)
    }

    #[must_use]
    pub fn constant(&self, id: NodeId) -> Option<&Constant> {
        self.constants.get(&id)
    }

    #[must_use]
    pub fn resolve(&self, value: ValueRef) -> Option<Resolved<'_>> {
        match value {
            ValueRef::Instruction(id) => self.instruction(id).map(Resolved::Instruction),
            ValueRef::Argument(id) => self
                .arguments
                .get(&id)
                .map(|(arg, func)| Resolved::Argument(arg, *func)),
            ValueRef::Constant(id) => self.constant(id).map(Resolved::Constant),
        }
    }

    /// Every function whose Yul name starts with `external_fun`, in declaration
    /// order; these are the functions the dispatcher jumps to and what the
    /// traversal's external entry points are drawn from.
    pub fn external_functions(&self) -> impl Iterator<Item = &Function> {
        self.runtime_functions
            .values()
            .filter(|f| matches!(f.kind, FunctionType::External))
    }

    #[must_use]
    pub fn fallback_function(&self) -> Option<&Function> {
        self.runtime_functions.values().find(|f| matches!(f.kind, FunctionType::Fallback))
    }

    /// The runtime function the dispatcher jumps to for `selector`, if any, mirroring
    /// `Contract.dispatcher` in the Python source.
    #[must_use]
    pub fn function_by_selector(&self, selector: u32) -> Option<&Function> {
        self.runtime_functions.values().find(|f| f.selector == Some(selector))
    }

    /// Structural sanity check run once right after lifting, mirroring
    /// `Contract.verify()`. The Python source walks each instruction's bidirectional
    /// operand/user edges; this IR addresses everything by [`NodeId`] instead of
    /// keeping `users` back-pointers (see [`crate::value`]), so the equivalent check
    /// here is that every function has an entry point, every basic block ends in a
    /// terminator, and every operand an instruction reads actually resolves.
    pub fn verify(&self) -> Result<(), VerifyError> {
        for func in self.all_functions() {
            if func.entry_point.is_none() {
                return Err(VerifyError::MissingEntryPoint(func.name.clone()));
            }
            for bb in self.basic_blocks.values().filter(|bb| bb.function == func.id) {
                if bb.terminator().is_none() {
                    return Err(VerifyError::MissingTerminator(bb.id.0.to_string()));
                }
                for inst in &bb.instructions {
                    for operand in inst.operands() {
                        if self.resolve(operand).is_none() {
                            return Err(VerifyError::DanglingOperand(inst.id.to_string(), operand.to_string()));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// The basic block containing the sole call site for `callee`, mirroring
    /// `function.users[0].basic_block` in `identify_payable` (a function's only
    /// "user" in the Python source is the instruction that calls it).
    fn sole_caller_block(&self, callee: FunctionId) -> Option<BasicBlockId> {
        self.basic_blocks.values().find_map(|bb| {
            bb.instructions.iter().find_map(|inst| match &inst.kind {
                InstKind::Call(c) if c.callee == callee => Some(bb.id),
                _ => None,
            })
        })
    }

    /// Determines whether each `external`/`fallback` function is payable, mirroring
    /// `Contract.identify_payable()`. Must run before [`Contract::generate_mutability_info`]
    /// since the DFS folds payable-ness into every function's accumulated mutability.
    pub fn identify_payable(&mut self) {
        let ids: Vec<(FunctionId, FunctionType)> = self.all_functions().map(|f| (f.id, f.kind)).collect();
        for (id, kind) in ids {
            let payable = match kind {
                FunctionType::External => self.external_entry_payable(id),
                FunctionType::Fallback => self.fallback_payable(id),
                _ => None,
            };
            if let Some(payable) = payable {
                if let Some(func) = self.function_mut(id) {
                    func.mutability.set_payable(payable);
                }
            }
        }
    }

    /// An `external` function's entry block always opens on either a `calldatasize`
    /// check (payable, the function doesn't need `callvalue` to be zero) or an
    /// unconditional `callvalue`-is-zero branch (non-payable).
    fn external_entry_payable(&self, id: FunctionId) -> Option<bool> {
        let func = self.function(id)?;
        let entry = self.basic_blocks.get(&func.entry_point?)?;
        match entry.instructions.first().map(|inst| &inst.kind) {
            Some(InstKind::Evm { op: EvmOp::Calldatasize, .. }) => Some(true),
            Some(InstKind::Branch(_)) => Some(false),
            _ => {
                tracing::warn!(function = %func.name, "identify_payable: unrecognized external entry shape");
                None
            }
        }
    }

    /// A `fallback` function's payable-ness is read off the shape of the block that
    /// calls into it, ported from `Contract.identify_payable()`'s fallback branch.
    /// The Python source walks a basic block's `users` (instructions that reference
    /// it as a jump target); this IR tracks the same edge directly as `predecessors`,
    /// so `predecessor.users[i].basic_block` there is `predecessor.predecessors[i]` here.
    fn fallback_payable(&self, id: FunctionId) -> Option<bool> {
        let call_bb = self.basic_blocks.get(&self.sole_caller_block(id)?)?;
        if call_bb.predecessors.is_empty() {
            return Some(true);
        }
        let predecessor = self.basic_blocks.get(&call_bb.predecessors[0])?;
        let is_receive = matches!(
            predecessor.instructions.first().map(|inst| &inst.kind),
            Some(InstKind::Evm { op: EvmOp::Calldatasize, .. })
        );
        if is_receive {
            return Some(true);
        }
        let is_branch_first = matches!(predecessor.instructions.first().map(|inst| &inst.kind), Some(InstKind::Branch(_)));
        if is_branch_first && predecessor.predecessors.len() == 2 {
            let user1 = self.basic_blocks.get(&predecessor.predecessors[0])?;
            let user2_id = predecessor.predecessors[1];
            if user1.predecessors.contains(&user2_id) || self.basic_blocks.get(&user2_id)?.predecessors.contains(&predecessor.predecessors[0]) {
                Some(false)
            } else {
                Some(true)
            }
        } else {
            Some(true)
        }
    }

    /// Runs [`Contract::identify_payable`] and then folds each function's
    /// instructions (and, recursively, its callees') into its accumulated
    /// [`crate::function::MutabilityInfo`], mirroring
    /// `Contract.generate_mutability_info()` / `_generate_mutability_info_dfs`.
    pub fn generate_mutability_info(&mut self) {
        self.identify_payable();
        let ids: Vec<FunctionId> = self.all_functions().map(|f| f.id).collect();
        let mut visited = HashSet::new();
        for id in ids {
            self.mutability_dfs(id, &mut visited);
        }
    }

    fn mutability_dfs(&mut self, id: FunctionId, visited: &mut HashSet<FunctionId>) {
        if visited.contains(&id) {
            return;
        }
        visited.insert(id);

        let bb_ids: Vec<BasicBlockId> = self
            .basic_blocks
            .values()
            .filter(|bb| bb.function == id)
            .map(|bb| bb.id)
            .collect();

        let mut callees = Vec::new();
        let mut own = crate::function::MutabilityInfo::default();
        for bb_id in &bb_ids {
            let Some(bb) = self.basic_blocks.get(bb_id) else { continue };
            for inst in &bb.instructions {
                match &inst.kind {
                    InstKind::Evm {
                        op: EvmOp::Call | EvmOp::Delegatecall | EvmOp::Callcode,
                        ..
                    } => own.non_static_call = true,
                    InstKind::Evm {
                        op: EvmOp::Log0 | EvmOp::Log1 | EvmOp::Log2 | EvmOp::Log3 | EvmOp::Log4,
                        ..
                    } => own.log = true,
                    InstKind::Evm { op: EvmOp::Selfdestruct, .. } => own.self_destruct = true,
                    InstKind::Storage(s) if s.kind == StorageOpKind::Update => own.storage_write = true,
                    InstKind::Call(c) => callees.push(c.callee),
                    _ => {}
                }
            }
        }

        for callee in callees {
            self.mutability_dfs(callee, visited);
            if let Some(callee_info) = self.function(callee).map(|f| f.mutability.clone()) {
                own.update(&callee_info);
            }
        }

        if let Some(func) = self.function_mut(id) {
            func.mutability.update(&own);
        }
    }
}
