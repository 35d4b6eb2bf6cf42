//! Normalized storage operations, grounded in
//! `uniscan/components/storage_instructions.py`. Every `AbstractStorageInst` subclass
//! there shares the same four-field shape (`base_str`, `type_str`, `pos_args`,
//! `value_args`) on top of its operand list, which is why [`StorageInst`] models them
//! uniformly with a `kind` tag instead of one struct per subclass.

use crate::value::ValueRef;

/// One normalized storage operation, one per `AbstractStorageInst` subclass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOpKind {
    ArrayLength,
    /// `StorageIndexInst`: slot/offset pair for a plain storage variable.
    Index,
    /// `StorageOffsetInst`: byte offset of a packed field within a slot.
    Offset,
    ArrayIndex,
    MappingIndex,
    /// `StorageIOInst`/`StorageReadInst`: a value read out of storage.
    Read,
    /// `StorageUpdateInst`: a value written into storage.
    Update,
}

/// A normalized storage instruction.
#[derive(Debug, Clone)]
pub struct StorageInst {
    pub kind: StorageOpKind,
    /// The storage helper's declared base type, e.g. `t_mapping$_t_address_$_t_bool_$`.
    pub base_str: String,
    /// The concrete (possibly indexed/offset) Solidity ABI type string this access
    /// resolves to.
    pub type_str: String,
    /// Positional arguments (slot/key/index) that address the storage location.
    pub pos_args: Vec<ValueRef>,
    /// Value arguments, non-empty only for [`StorageOpKind::Update`].
    pub value_args: Vec<ValueRef>,
    pub args: Vec<ValueRef>,
}

/// Recognizes a Yul storage helper function by name, mirroring the dispatch at the
/// top of `storage_function_to_insts_and_returns`.
#[must_use]
pub fn recognize_storage_helper(name: &str) -> Option<StorageOpKind> {
    if name.starts_with("array_length_t_array") && name.contains("storage") {
        return Some(StorageOpKind::ArrayLength);
    }
    if name.starts_with("storage_array_index_access") {
        return Some(StorageOpKind::ArrayIndex);
    }
    if name.starts_with("mapping_index_access") {
        return Some(StorageOpKind::MappingIndex);
    }
    if name.starts_with("extract_from_storage_value_offset") {
        return Some(StorageOpKind::Offset);
    }
    if name.starts_with("update_storage_value_offset") {
        return Some(StorageOpKind::Update);
    }
    if name.starts_with("read_from_storage_split_offset") || name.starts_with("read_from_storage") {
        return Some(StorageOpKind::Read);
    }
    if name.starts_with("resolve_foreign_slot") || name.starts_with("storage_slot") {
        return Some(StorageOpKind::Index);
    }
    None
}
