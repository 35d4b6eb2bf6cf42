//! The operand/user graph that ties instructions, arguments and constants together.
//!
//! `vm2`'s `Program` keeps a flat array of [`crate::instruction::Instruction`]s and
//! lets control flow reference array indices instead of other instructions directly;
//! we do the same thing one level up, for the data-flow graph. A [`NodeId`] is a
//! contract-wide unique index (shared with [`crate::basic_block::BasicBlockId`] and
//! [`crate::function::FunctionId`] -- everything in a [`crate::contract::Contract`]
//! is allocated from the same [`crate::id_arena::IdGroup`], matching the Python
//! `UniqueId` base class every node there derives from). [`ValueRef`] says which kind
//! of node an id refers to, since the three kinds share an id space but live in
//! different tables.

use std::fmt;

use crate::id_arena::Id;

/// A contract-wide unique node id. What it identifies depends on where it is stored;
/// see [`ValueRef`] for operand positions, which must disambiguate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub Id);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Something an instruction can take as an operand: the result of another
/// instruction, a function argument, or a compile-time constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueRef {
    /// Result of the instruction with this id.
    Instruction(NodeId),
    /// The function argument with this id.
    Argument(NodeId),
    /// The constant with this id.
    Constant(NodeId),
}

impl ValueRef {
    /// The underlying node id, regardless of kind.
    #[must_use]
    pub fn id(self) -> NodeId {
        match self {
            Self::Instruction(id) | Self::Argument(id) | Self::Constant(id) => id,
        }
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// A formal parameter of a [`crate::function::Function`].
#[derive(Debug, Clone)]
pub struct Argument {
    pub id: NodeId,
    pub name: String,
    /// Zero-based position in the function's parameter list.
    pub index: usize,
}
