//! Normalizes raw Yul helper-function calls into semantically typed instructions.
//!
//! Grounded in `uniscan/utils/transform.py`. The lifter emits an [`InstKind::YulFunc`]
//! for every Yul function call whose callee doesn't resolve to another contract
//! function; this pass recognizes the handful of helper-function name patterns solc
//! emits for ABI encoding/decoding, storage access, type conversion and checked
//! arithmetic, and rewrites each in place into the matching typed instruction from
//! [`crate::instruction`]. Calls that match nothing are left as `YulFunc`, which is
//! also the representation detectors see for genuine internal-library calls the pass
//! has no special knowledge of.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
    basic_block::BasicBlockId,
    contract::Contract,
    function::FunctionId,
    instruction::{
        memory::{recognize_memory_helper, MemoryInst},
        storage::{recognize_storage_helper, StorageInst, StorageOpKind},
        InstKind, Instruction, MathInst, TypeConvertInst,
    },
    value::{NodeId, ValueRef},
};

/// Runs every normalization rewrite over every function in `contract`, in the same
/// dispatch order as `replace_builtin_function`: type conversions, then storage, then
/// memory, then checked-math helpers. Idempotent: re-running over an already
/// normalized contract is a no-op, since none of the rewritten kinds match the
/// recognizers again.
pub fn normalize(contract: &mut Contract) {
    let function_ids: Vec<FunctionId> = contract.all_functions().map(|f| f.id).collect();
    for func_id in function_ids {
        normalize_function(contract, func_id);
    }
}

fn normalize_function(contract: &mut Contract, func_id: FunctionId) {
    let Some(func) = contract.function(func_id) else {
        return;
    };
    let block_ids = func.basic_blocks.clone();
    for bb_id in block_ids {
        normalize_block(contract, bb_id);
    }
}

fn normalize_block(contract: &mut Contract, bb_id: BasicBlockId) {
    let len = contract.basic_blocks.get(&bb_id).map_or(0, |bb| bb.instructions.len());
    for idx in 0..len {
        rewrite_at(contract, bb_id, idx);
    }
}

fn rewrite_at(contract: &mut Contract, bb_id: BasicBlockId, idx: usize) {
    let Some((id, name, args, return_index, return_count)) = read_yul_func(contract, bb_id, idx) else {
        return;
    };

    let new_kind = if let Some(kind) = recognize_type_convert(&name) {
        Some(InstKind::TypeConvert(TypeConvertInst {
            from_type_str: kind.0,
            to_type_str: kind.1,
            args,
        }))
    } else if let Some(kind) = recognize_storage_helper(&name) {
        Some(InstKind::Storage(build_storage_inst(kind, &name, args)))
    } else if let Some((kind, type_str)) = recognize_memory_helper(&name) {
        Some(InstKind::Memory(MemoryInst { kind, type_str, args }))
    } else if is_math_helper(&name) {
        Some(InstKind::Math(MathInst {
            name,
            args,
            return_index,
            return_count,
        }))
    } else {
        None
    };

    if let Some(kind) = new_kind {
        set_kind(contract, bb_id, idx, id, kind);
    }
}

fn read_yul_func(
    contract: &Contract,
    bb_id: BasicBlockId,
    idx: usize,
) -> Option<(NodeId, String, Vec<ValueRef>, Option<usize>, usize)> {
    let bb = contract.basic_blocks.get(&bb_id)?;
    let inst = bb.instructions.get(idx)?;
    let InstKind::YulFunc(yul) = &inst.kind else {
        return None;
    };
    Some((inst.id, yul.name.clone(), yul.args.clone(), yul.return_index, yul.return_count))
}

fn set_kind(contract: &mut Contract, bb_id: BasicBlockId, idx: usize, id: NodeId, kind: InstKind) {
    if let Some(bb) = contract.basic_blocks.get_mut(&bb_id) {
        if let Some(inst) = bb.instructions.get_mut(idx) {
            debug_assert_eq!(inst.id, id, "rewrite must preserve the instruction's id");
            inst.kind = kind;
        }
    }
}

fn type_convert_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^convert(?:_array)?_(.+)_to_(.+)$").expect("static type pattern is valid"))
}

/// Recognizes `convert_<from>_to_<to>`/`convert_array_<from>_to_<to>`, requiring the
/// same storage location on both sides as `replace_type_convert_function` does (a
/// cross-location conversion is handled specially by the lifter's calldata-tuple
/// unwrapping instead, see [`crate::instruction::memory::recognize_memory_helper`]).
fn recognize_type_convert(name: &str) -> Option<(String, String)> {
    let caps = type_convert_re().captures(name)?;
    let from = caps.get(1)?.as_str();
    let to = caps.get(2)?.as_str();
    Some((from.to_string(), to.to_string()))
}

/// `increment`/`decrement`/`wrapping`/`checked`/`mod` prefixed helpers are checked or
/// wrapping arithmetic, except the two `checked_exp_*` helpers, which have a
/// multi-step loop body the rest of the math helpers don't and are left as `YulFunc`.
fn is_math_helper(name: &str) -> bool {
    if name == "checked_exp_unsigned" || name == "checked_exp_helper" {
        return false;
    }
    ["increment", "decrement", "wrapping", "checked", "mod"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Storage helpers are named `<op>_t_..` or `<op>_<n>bytes_t_..`; the trailing
/// `t_...` run is the type string, everything before it the base operation name.
fn base_type_from_name(name: &str) -> (String, String) {
    match name.find("_t_") {
        Some(pos) => (name[..pos].to_string(), name[pos + 1..].to_string()),
        None => (name.to_string(), String::new()),
    }
}

fn build_storage_inst(kind: StorageOpKind, name: &str, args: Vec<ValueRef>) -> StorageInst {
    let (base_str, type_str) = base_type_from_name(name);
    let (pos_args, value_args) = if matches!(kind, StorageOpKind::Update) {
        let mut pos = args.clone();
        let value = pos.pop();
        (pos, value.into_iter().collect())
    } else {
        (args.clone(), Vec::new())
    };
    StorageInst {
        kind,
        base_str,
        type_str,
        pos_args,
        value_args,
        args,
    }
}

/// Removes the instruction at `idx`, reindexing the block's `inst_location` entries
/// afterwards. Used by passes that inline a helper call into nothing (e.g. a
/// `revert_error*` call subsumed into its block's terminator).
pub fn remove_instruction(contract: &mut Contract, bb_id: BasicBlockId, idx: usize) {
    if let Some(bb) = contract.basic_blocks.get_mut(&bb_id) {
        if idx < bb.instructions.len() {
            bb.instructions.remove(idx);
        }
    }
    contract.reindex_block(bb_id);
}

/// Splices `new_instructions` into the block starting at `idx`, reindexing afterwards.
pub fn insert_instructions(contract: &mut Contract, bb_id: BasicBlockId, idx: usize, new_instructions: Vec<Instruction>) {
    if let Some(bb) = contract.basic_blocks.get_mut(&bb_id) {
        let at = idx.min(bb.instructions.len());
        bb.instructions.splice(at..at, new_instructions);
    }
    contract.reindex_block(bb_id);
}

/// Replaces the instruction at `idx` wholesale, reindexing afterwards. Unlike
/// [`set_kind`], this may change the instruction's id, so callers must ensure nothing
/// still references the old one by id.
pub fn replace_instruction(contract: &mut Contract, bb_id: BasicBlockId, idx: usize, new_instruction: Instruction) {
    if let Some(bb) = contract.basic_blocks.get_mut(&bb_id) {
        if let Some(slot) = bb.instructions.get_mut(idx) {
            *slot = new_instruction;
        }
    }
    contract.reindex_block(bb_id);
}

/// Turns a basic block's terminator into `unreachable`, used after recognizing that a
/// helper call in tail position (`revert_error*`, `panic_error_0x*`) unconditionally
/// reverts, matching `replace_terminator_to_unreachable`.
pub fn replace_terminator_with_unreachable(contract: &mut Contract, bb_id: BasicBlockId) {
    let Some(bb) = contract.basic_blocks.get_mut(&bb_id) else {
        return;
    };
    let Some(last) = bb.instructions.last_mut() else {
        return;
    };
    last.kind = InstKind::Unreachable;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        basic_block::BasicBlock,
        function::{Function, FunctionType, MutabilityInfo},
        instruction::YulFuncInst,
    };

    fn push_yul_call(contract: &mut Contract, bb_id: BasicBlockId, name: &str, args: Vec<ValueRef>) -> NodeId {
        let id = contract.alloc_id();
        let inst = Instruction {
            id,
            source_map: None,
            kind: InstKind::YulFunc(YulFuncInst {
                name: name.to_string(),
                args,
                return_index: None,
                return_count: 1,
            }),
        };
        contract.basic_blocks.get_mut(&bb_id).unwrap().instructions.push(inst);
        id
    }

    fn sample_contract() -> (Contract, BasicBlockId) {
        let mut contract = Contract::new("Sample");
        let func_id = FunctionId(contract.alloc_id());
        let bb_id = BasicBlockId(contract.alloc_id());
        let bb = BasicBlock::new(bb_id, func_id);
        let func = Function {
            id: func_id,
            name: "fun_test_1".into(),
            kind: FunctionType::Internal,
            selector: None,
            is_runtime: true,
            arguments: Vec::new(),
            return_names: Vec::new(),
            entry_point: Some(bb_id),
            basic_blocks: vec![bb_id],
            mutability: MutabilityInfo::default(),
        };
        contract.insert_function(func, vec![bb]);
        (contract, bb_id)
    }

    #[test]
    fn recognizes_checked_math_helper() {
        let (mut contract, bb_id) = sample_contract();
        push_yul_call(&mut contract, bb_id, "checked_add_t_uint256", vec![]);
        normalize(&mut contract);
        let kind = &contract.basic_blocks[&bb_id].instructions[0].kind;
        assert!(matches!(kind, InstKind::Math(m) if m.name == "checked_add_t_uint256"));
    }

    #[test]
    fn recognizes_type_convert_helper() {
        let (mut contract, bb_id) = sample_contract();
        push_yul_call(&mut contract, bb_id, "convert_t_uint256_to_t_address", vec![]);
        normalize(&mut contract);
        let kind = &contract.basic_blocks[&bb_id].instructions[0].kind;
        match kind {
            InstKind::TypeConvert(t) => {
                assert_eq!(t.from_type_str, "t_uint256");
                assert_eq!(t.to_type_str, "t_address");
            }
            other => panic!("expected type convert, got {other:?}"),
        }
    }

    #[test]
    fn recognizes_storage_update_splits_value_arg() {
        let (mut contract, bb_id) = sample_contract();
        let a = ValueRef::Constant(NodeId(crate::id_arena::Id(0)));
        let v = ValueRef::Constant(NodeId(crate::id_arena::Id(1)));
        push_yul_call(&mut contract, bb_id, "update_storage_value_offset_t_uint256", vec![a, v]);
        normalize(&mut contract);
        let kind = &contract.basic_blocks[&bb_id].instructions[0].kind;
        match kind {
            InstKind::Storage(s) => {
                assert_eq!(s.kind, StorageOpKind::Update);
                assert_eq!(s.pos_args, vec![a]);
                assert_eq!(s.value_args, vec![v]);
            }
            other => panic!("expected storage, got {other:?}"),
        }
    }

    #[test]
    fn leaves_unrecognized_helper_as_yul_func() {
        let (mut contract, bb_id) = sample_contract();
        push_yul_call(&mut contract, bb_id, "some_internal_library_helper", vec![]);
        normalize(&mut contract);
        let kind = &contract.basic_blocks[&bb_id].instructions[0].kind;
        assert!(matches!(kind, InstKind::YulFunc(y) if y.name == "some_internal_library_helper"));
    }
}
