//! Functions, grounded in `uniscan/components/function.py`.

use crate::{
    basic_block::BasicBlockId,
    value::{Argument, NodeId},
};

/// Id of a [`Function`] within its owning [`crate::contract::Contract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub NodeId);

/// What role a function plays, mirroring the Python `FunctionType` enum. Solidity's
/// dispatcher, getters and modifiers all lower to ordinary Yul functions, so this
/// distinction only exists post-lifting, recovered from the dispatcher shape and the
/// function's name mangling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionType {
    Creation,
    Constructor,
    Runtime,
    Constant,
    Getter,
    Modifier,
    External,
    Internal,
    /// Covers both `fallback` and `receive`, which are indistinguishable once lowered.
    Fallback,
    YulFunction,
}

/// Accumulated mutability facts about a function, propagated transitively through the
/// call graph by [`crate::contract::Contract::generate_mutability_info`].
#[derive(Debug, Clone, Default)]
pub struct MutabilityInfo {
    payable: Option<bool>,
    pub non_static_call: bool,
    pub storage_write: bool,
    pub log: bool,
    pub self_destruct: bool,
}

impl MutabilityInfo {
    /// Merges in facts from a callee. Payable-ness is never inferred from callees:
    /// Solidity itself rejects payable calls into non-payable functions, so a callee
    /// being payable says nothing about the caller.
    pub fn update(&mut self, other: &Self) {
        self.non_static_call |= other.non_static_call;
        self.storage_write |= other.storage_write;
        self.log |= other.log;
        self.self_destruct |= other.self_destruct;
    }

    pub fn set_payable(&mut self, payable: bool) {
        self.payable = Some(payable);
    }

    /// Like [`Self::payable`], but `false` when payable-ness hasn't been computed yet
    /// instead of panicking, for callers that may run before or without
    /// `Contract::identify_payable` (e.g. detector unit tests).
    #[must_use]
    pub fn payable_or_default(&self) -> bool {
        self.payable.unwrap_or(false)
    }

    /// Panics if payable-ness was never computed for this function, matching the
    /// Python property's `ValueError` -- callers must only ask for functions whose
    /// type is `External`/`Fallback`, after `Contract::identify_payable` has run.
    #[must_use]
    pub fn payable(&self) -> bool {
        self.payable.expect("payable info not set")
    }
}

/// A lifted, normalized Yul function.
#[derive(Debug, Clone)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub kind: FunctionType,
    pub selector: Option<u32>,
    pub is_runtime: bool,
    pub arguments: Vec<Argument>,
    pub return_names: Vec<String>,
    pub entry_point: Option<BasicBlockId>,
    pub basic_blocks: Vec<BasicBlockId>,
    pub mutability: MutabilityInfo,
}

impl Function {
    #[must_use]
    pub fn has_return(&self) -> bool {
        !self.return_names.is_empty()
    }

    #[must_use]
    pub fn return_count(&self) -> usize {
        self.return_names.len()
    }

    #[must_use]
    pub fn mutable(&self) -> bool {
        self.mutability.non_static_call
            || self.mutability.storage_write
            || self.mutability.log
            || self.mutability.self_destruct
    }

    #[must_use]
    pub fn mutable_or_payable(&self) -> bool {
        self.mutable() || self.mutability.payable()
    }

    /// Like [`Self::mutable_or_payable`], but safe to call before
    /// `Contract::identify_payable` has run.
    #[must_use]
    pub fn mutable_or_payable_or_default(&self) -> bool {
        self.mutable() || self.mutability.payable_or_default()
    }

    /// The user-facing Solidity name, recovered from the mangled Yul function name the
    /// way `Function.solidity_name` does: external dispatch functions are named
    /// `external_fun_<name>_<selector>`, internal ones `fun_<name>_<id>`.
    #[must_use]
    pub fn solidity_name(&self) -> Option<String> {
        match self.kind {
            FunctionType::Fallback => Some("(fallback or receive)".to_string()),
            FunctionType::External => {
                let parts: Vec<&str> = self.name.split('_').collect();
                if parts.len() > 3 {
                    Some(parts[2..parts.len() - 1].join("_"))
                } else {
                    None
                }
            }
            FunctionType::Internal => {
                let parts: Vec<&str> = self.name.split('_').collect();
                if parts.len() > 2 {
                    Some(parts[1..parts.len() - 1].join("_"))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}
