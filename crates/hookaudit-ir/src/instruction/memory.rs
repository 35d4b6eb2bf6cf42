//! Normalized memory operations, grounded in `uniscan/components/memory_instructions.py`.
//! Each variant of [`MemoryOpKind`] corresponds to one Python `AbstractMemoryInst`
//! subclass; [`crate::transform::replace_memory_function`] is what rewrites a generic
//! Yul helper call into one of these.

use crate::value::ValueRef;

/// One normalized memory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOpKind {
    /// `allocate_memory_<type>`: bump the free memory pointer.
    Allocate,
    /// `abi_encode_update_storage_value_offset` style direct stores.
    Write,
    Read,
    ReadFromCalldata,
    ArrayLength,
    CalldataArrayLength,
    ArrayDataSlot,
    CalldataArrayDataSlot,
    MemoryArrayIndexAccess,
    CalldataArrayIndexAccess,
    CalldataStructIndexAccess,
    Concat,
    CopyLiteral,
    ConvertStringLiteral,
    ConvertReference,
    CopyArray,
    ExtractReturnData,
    AbiEncode,
    AbiDecodeFromMemory,
    AbiDecodeFromCallData,
}

/// A normalized memory instruction: its kind, the Solidity ABI type string it
/// operates over (the `t_...` suffix of the Yul helper name it replaced, when one was
/// present), and its operands.
#[derive(Debug, Clone)]
pub struct MemoryInst {
    pub kind: MemoryOpKind,
    pub type_str: Option<String>,
    pub args: Vec<ValueRef>,
}

/// Recognizes a Yul memory helper function by name and returns the [`MemoryOpKind`]
/// and embedded type string it should normalize to, mirroring the dispatch at the top
/// of `memory_function_to_insts_and_returns`.
///
/// Returns `None` for names the normalization pass doesn't recognize as memory
/// helpers, in which case the caller leaves the call as a generic `YulFuncInst`.
#[must_use]
pub fn recognize_memory_helper(name: &str) -> Option<(MemoryOpKind, Option<String>)> {
    let strip = |prefix: &str| name.strip_prefix(prefix).map(str::to_string);

    if let Some(t) = strip("allocate_memory_") {
        return Some((MemoryOpKind::Allocate, Some(t)));
    }
    if let Some(t) = strip("copy_literal_to_memory_") {
        return Some((MemoryOpKind::CopyLiteral, Some(t)));
    }
    if let Some(t) = strip("convert_string_literal_to_") {
        return Some((MemoryOpKind::ConvertStringLiteral, Some(t)));
    }
    if let Some(t) = strip("read_from_calldata") {
        return Some((MemoryOpKind::ReadFromCalldata, non_empty(t)));
    }
    if let Some(t) = strip("array_length_") {
        if name.contains("calldata") {
            return Some((MemoryOpKind::CalldataArrayLength, Some(t)));
        }
        return Some((MemoryOpKind::ArrayLength, Some(t)));
    }
    if let Some(t) = strip("array_dataslot_") {
        if name.contains("calldata") {
            return Some((MemoryOpKind::CalldataArrayDataSlot, Some(t)));
        }
        return Some((MemoryOpKind::ArrayDataSlot, Some(t)));
    }
    if name.starts_with("calldata_array_index_access") {
        return Some((MemoryOpKind::CalldataArrayIndexAccess, None));
    }
    if name.starts_with("access_calldata_tail") {
        return Some((MemoryOpKind::CalldataStructIndexAccess, None));
    }
    if name.starts_with("array_index_access") {
        return Some((MemoryOpKind::MemoryArrayIndexAccess, None));
    }
    if name == "extract_returndata" {
        return Some((MemoryOpKind::ExtractReturnData, None));
    }
    if name.starts_with("copy_array_") {
        return Some((MemoryOpKind::CopyArray, None));
    }
    if name.starts_with("convert_array_") && (name.contains("to_storage") || name.contains("to_memory")) {
        return Some((MemoryOpKind::ConvertReference, None));
    }
    if name.starts_with("abi_encode_") {
        return Some((MemoryOpKind::AbiEncode, None));
    }
    if name.starts_with("abi_decode_") && name.contains("fromMemory") {
        return Some((MemoryOpKind::AbiDecodeFromMemory, None));
    }
    if name.starts_with("abi_decode_tuple") {
        return Some((MemoryOpKind::AbiDecodeFromCallData, None));
    }
    if name.starts_with("concat_") {
        return Some((MemoryOpKind::Concat, None));
    }
    None
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
