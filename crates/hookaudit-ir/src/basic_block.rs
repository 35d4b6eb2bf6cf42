//! Basic blocks, grounded in `hookscan/components/basic_block.py`.

use crate::{function::FunctionId, instruction::Instruction, value::NodeId};

/// Id of a [`BasicBlock`] within its owning [`crate::contract::Contract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BasicBlockId(pub NodeId);

/// A single-entry, single-exit sequence of instructions ending in a terminator.
///
/// Loop metadata (`is_loop_entry`, `loop_compare`, `do_while_compare`,
/// `current_loop_entry`) is filled in by the lifter when it recognizes a Yul `for`
/// loop, and is read back by the traversal engine to decide when a loop body has been
/// explored "enough" (see `docs` on [`crate::traversal`]).
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BasicBlockId,
    pub function: FunctionId,
    pub instructions: Vec<Instruction>,
    pub predecessors: Vec<BasicBlockId>,
    pub successors: Vec<BasicBlockId>,

    pub is_loop_entry: bool,
    /// The nearest enclosing loop's entry block, if this block is inside a loop body
    /// (unset for the entry block itself, which is its own loop entry).
    pub current_loop_entry: Option<BasicBlockId>,
    /// Set on a loop entry block: the block holding the loop's condition check.
    pub loop_compare: Option<BasicBlockId>,
    /// Set on a loop entry block whose condition is checked at the bottom
    /// (`do { ... } while (cond)` lowering) rather than the top.
    pub do_while_compare: Option<BasicBlockId>,
}

impl BasicBlock {
    #[must_use]
    pub fn new(id: BasicBlockId, function: FunctionId) -> Self {
        Self {
            id,
            function,
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            is_loop_entry: false,
            current_loop_entry: None,
            loop_compare: None,
            do_while_compare: None,
        }
    }

    /// Whether this block is the condition-check block of its current loop.
    #[must_use]
    pub fn is_loop_compare(&self, loop_entry: &BasicBlock) -> bool {
        loop_entry.loop_compare == Some(self.id)
    }

    /// Whether this block is the bottom condition-check of a `do`/`while` loop.
    #[must_use]
    pub fn is_do_while_compare(&self, loop_entry: &BasicBlock) -> bool {
        loop_entry.do_while_compare == Some(self.id)
    }

    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last()
    }
}
