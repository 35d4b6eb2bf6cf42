//! The normalized instruction set: raw EVM opcodes plus everything the lifter and the
//! normalization pass (see [`crate::transform`]) introduce on top of them.
//!
//! Grounded in `uniscan/components/instruction.py`'s class hierarchy
//! (`Instruction`/`ReturnInst`/`CallInst`/`ExtractReturnValue`/`PHINode`/
//! `BranchInst`/`SwitchInst`/`AbstractEVMInst`/`AbstractYulInst`/`UnreachableInst`/
//! `MathInst`/`YulFuncInst`), but hoists the fields every instruction needs (its id and
//! source location) out of the per-kind structs the way `vm2`'s own
//! `Instruction<T, W>` hoists `handler`/`arguments` out of per-opcode logic.

pub mod memory;
pub mod storage;

use hookaudit_interface::{EvmOp, InstructionKind};

use crate::{
    basic_block::BasicBlockId,
    function::FunctionId,
    value::{NodeId, ValueRef},
};

pub use memory::{MemoryInst, MemoryOpKind};
pub use storage::{StorageInst, StorageOpKind};

/// Where in the original Solidity an instruction came from, recovered from Yul's
/// `///@src <file>:<start>:<len>` comments the way `value.py`'s
/// `source_code_source_map` property does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMap {
    pub file_index: u32,
    pub start: u32,
    pub len: u32,
}

/// A single IR instruction: a stable id, its location info, and its kind-specific data.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub id: NodeId,
    pub source_map: Option<SourceMap>,
    pub kind: InstKind,
}

/// An incoming edge of a [`PhiInst`]: the predecessor block and the value it supplies.
#[derive(Debug, Clone)]
pub struct PhiIncoming {
    pub from_block: BasicBlockId,
    pub value: ValueRef,
}

/// A call to another function in the same contract (internal/external/getter/modifier
/// dispatch all lower to this, as in `CallInst` in the Python source). A call with a
/// single return value is itself usable as that value; a call with more than one
/// return value is unpacked by one [`InstKind::ExtractReturnValue`] per result.
#[derive(Debug, Clone)]
pub struct CallInst {
    pub callee: FunctionId,
    pub args: Vec<ValueRef>,
}

/// Unpacks one result out of a multi-return [`CallInst`].
#[derive(Debug, Clone)]
pub struct ExtractReturnValueInst {
    pub call: NodeId,
    pub return_index: usize,
}

/// Returns zero or more values from the enclosing function.
#[derive(Debug, Clone)]
pub struct ReturnInst {
    pub values: Vec<ValueRef>,
}

/// An SSA phi node merging values from multiple predecessors.
#[derive(Debug, Clone)]
pub struct PhiInst {
    pub incoming: Vec<PhiIncoming>,
}

/// A conditional or unconditional jump terminating a basic block.
#[derive(Debug, Clone)]
pub struct BranchInst {
    pub condition: Option<ValueRef>,
    pub true_target: BasicBlockId,
    /// `None` for an unconditional jump.
    pub false_target: Option<BasicBlockId>,
}

/// A multi-way jump on an integer scrutinee (lowered from Yul's `switch`).
#[derive(Debug, Clone)]
pub struct SwitchInst {
    pub scrutinee: ValueRef,
    pub cases: Vec<(primitive_types::U256, BasicBlockId)>,
    pub default: BasicBlockId,
}

/// A call to a Yul helper function the normalization pass did not recognize (and so
/// left as-is), matching `YulFuncInst` in `transform.py`. Helper functions with more
/// than one return value are represented as one `YulFuncInst` per result, each
/// carrying the same `args` and a distinct `return_index`.
#[derive(Debug, Clone)]
pub struct YulFuncInst {
    pub name: String,
    pub args: Vec<ValueRef>,
    pub return_index: Option<usize>,
    pub return_count: usize,
}

/// A recognized arithmetic helper (`checked_add_t_uint256`, `wrapping_sub`, ...),
/// rewritten out of a generic [`YulFuncInst`] by `replace_math_function`.
#[derive(Debug, Clone)]
pub struct MathInst {
    pub name: String,
    pub args: Vec<ValueRef>,
    pub return_index: Option<usize>,
    pub return_count: usize,
}

/// A recognized Solidity ABI type conversion helper
/// (`convert_t_uint256_to_t_address`, ...), rewritten out of a `CallInst` by
/// `replace_type_convert_function`.
#[derive(Debug, Clone)]
pub struct TypeConvertInst {
    pub from_type_str: String,
    pub to_type_str: String,
    pub args: Vec<ValueRef>,
}

/// The seven Yul builtin object/linking operations from `yul_instructions.py`:
/// `setimmutable`, `dataoffset`, `datasize`, `loadimmutable`, `linkersymbol`,
/// `datacopy`, `memoryguard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YulBuiltinKind {
    SetImmutable,
    DataOffset,
    DataSize,
    LoadImmutable,
    LinkerSymbol,
    DataCopy,
    MemoryGuard,
}

#[derive(Debug, Clone)]
pub struct YulBuiltinInst {
    pub kind: YulBuiltinKind,
    /// The referenced immutable/data-object/link-library name, for the variants that
    /// take one (all but `datacopy`/`memoryguard`).
    pub name: Option<String>,
    pub args: Vec<ValueRef>,
}

/// The kind-specific payload of an [`Instruction`].
#[derive(Debug, Clone)]
pub enum InstKind {
    Evm { op: EvmOp, args: Vec<ValueRef> },
    Call(CallInst),
    ExtractReturnValue(ExtractReturnValueInst),
    Return(ReturnInst),
    Phi(PhiInst),
    Branch(BranchInst),
    Switch(SwitchInst),
    Unreachable,
    YulFunc(YulFuncInst),
    Math(MathInst),
    TypeConvert(TypeConvertInst),
    Memory(MemoryInst),
    Storage(StorageInst),
    YulBuiltin(YulBuiltinInst),
}

impl Instruction {
    /// The [`InstructionKind`] a detector dispatches on for this instruction.
    #[must_use]
    pub fn kind_tag(&self) -> InstructionKind {
        match &self.kind {
            InstKind::Evm { op, .. } => InstructionKind::Evm(*op),
            InstKind::Call(_) => InstructionKind::Call,
            InstKind::ExtractReturnValue(_) => InstructionKind::ExtractReturnValue,
            InstKind::Return(_) => InstructionKind::Return,
            InstKind::Phi(_) => InstructionKind::Phi,
            InstKind::Branch(_) => InstructionKind::Branch,
            InstKind::Switch(_) => InstructionKind::Switch,
            InstKind::Unreachable => InstructionKind::Unreachable,
            InstKind::YulFunc(_) => InstructionKind::YulFunc,
            InstKind::Math(_) => InstructionKind::Math,
            InstKind::TypeConvert(_) => InstructionKind::TypeConvert,
            InstKind::Memory(_) => InstructionKind::MemoryOp,
            InstKind::Storage(_) => InstructionKind::StorageOp,
            InstKind::YulBuiltin(_) => InstructionKind::YulFunc,
        }
    }

    /// Operands this instruction reads, in argument order. Phi incoming values are
    /// included; branch/switch targets are not (they are control flow, not data flow).
    #[must_use]
    pub fn operands(&self) -> Vec<ValueRef> {
        match &self.kind {
            InstKind::Evm { args, .. } => args.clone(),
            InstKind::Call(c) => c.args.clone(),
            InstKind::ExtractReturnValue(e) => vec![ValueRef::Instruction(e.call)],
            InstKind::Return(r) => r.values.clone(),
            InstKind::Phi(p) => p.incoming.iter().map(|i| i.value).collect(),
            InstKind::Branch(b) => b.condition.into_iter().collect(),
            InstKind::Switch(s) => vec![s.scrutinee],
            InstKind::Unreachable => vec![],
            InstKind::YulFunc(y) => y.args.clone(),
            InstKind::Math(m) => m.args.clone(),
            InstKind::TypeConvert(t) => t.args.clone(),
            InstKind::Memory(m) => m.args.clone(),
            InstKind::Storage(s) => s.args.clone(),
            InstKind::YulBuiltin(y) => y.args.clone(),
        }
    }

    /// Whether this instruction unconditionally ends the basic block it's in
    /// (`is_terminator_type` in the Python source).
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        match &self.kind {
            InstKind::Return(_) | InstKind::Branch(_) | InstKind::Switch(_) | InstKind::Unreachable => true,
            InstKind::Evm { op, .. } => op.is_halt(),
            _ => false,
        }
    }

    /// Whether this instruction produces a single value usable as an operand
    /// elsewhere. `false` for multi-return `CallInst`s (callers must go through
    /// [`InstKind::ExtractReturnValue`] instead) and for pure control flow.
    #[must_use]
    pub fn has_value(&self) -> bool {
        match &self.kind {
            InstKind::Evm { op, .. } => op.has_return(),
            InstKind::Call(_) => true,
            InstKind::ExtractReturnValue(_) | InstKind::Phi(_) => true,
            InstKind::Return(_) | InstKind::Branch(_) | InstKind::Switch(_) | InstKind::Unreachable => false,
            InstKind::YulFunc(y) => y.return_index.is_some(),
            InstKind::Math(m) => m.return_index.is_some(),
            InstKind::TypeConvert(_) => true,
            InstKind::Memory(_) | InstKind::Storage(_) => true,
            InstKind::YulBuiltin(y) => !matches!(y.kind, YulBuiltinKind::SetImmutable | YulBuiltinKind::DataCopy),
        }
    }
}
