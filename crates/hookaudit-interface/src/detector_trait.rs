use crate::{opcodes, EvmOp, InstructionKind, InstructionKindType, TraversalState};

/// A pluggable vulnerability check, invoked once per instruction visited during a
/// path-sensitive traversal of a hook contract's control-flow graph.
///
/// `before_instruction`/`after_instruction` are generic over the instruction kind so a
/// detector only pays for the dispatch of the kinds it actually overrides; the default
/// implementations are no-ops. `on_end_of_path` fires once a DFS path reaches a
/// terminal node (a `return`/`revert`/`selfdestruct`, or the recursion/loop bound), for
/// detectors whose verdict can only be formed once the whole path is known.
pub trait Detector {
    /// Called before the current instruction's effects (if any) are applied.
    fn before_instruction<K: InstructionKindType, S: TraversalState>(&mut self, state: &mut S) {
        let _ = state;
    }

    /// Called after the current instruction's effects are applied.
    fn after_instruction<K: InstructionKindType, S: TraversalState>(&mut self, state: &mut S) {
        let _ = state;
    }

    /// Called once when a DFS path ends, in the reverse order detectors were
    /// registered in, so an outer detector can see the results of detectors that
    /// depend on it.
    fn on_end_of_path<S: TraversalState>(&mut self, state: &mut S) {
        let _ = state;
    }
}

impl Detector for () {}

impl<A: Detector, B: Detector> Detector for (A, B) {
    fn before_instruction<K: InstructionKindType, S: TraversalState>(&mut self, state: &mut S) {
        self.0.before_instruction::<K, S>(state);
        self.1.before_instruction::<K, S>(state);
    }

    fn after_instruction<K: InstructionKindType, S: TraversalState>(&mut self, state: &mut S) {
        self.0.after_instruction::<K, S>(state);
        self.1.after_instruction::<K, S>(state);
    }

    fn on_end_of_path<S: TraversalState>(&mut self, state: &mut S) {
        self.1.on_end_of_path(state);
        self.0.on_end_of_path(state);
    }
}

/// Dispatches a runtime [`EvmOp`] to the matching `opcodes::evm::*` marker type, so a
/// caller holding only the closed enum (not the marker type) can still invoke a
/// generic [`Detector`] callback. Declared with the full opcode list inline (rather
/// than reusing the `forall_evm_opcodes!` list this crate's [`opcodes`] module is built
/// from) since that macro isn't exported out of its defining module.
macro_rules! evm_dispatch {
    ($fn_name:ident, $method:ident) => {
        fn $fn_name<D: Detector, S: TraversalState>(op: EvmOp, detectors: &mut D, state: &mut S) {
            macro_rules! dispatch_arm {
                ($($name:ident),* $(,)?) => {
                    match op {
                        $(EvmOp::$name => detectors.$method::<opcodes::evm::$name, S>(state),)*
                    }
                };
            }
            dispatch_arm! {
                Stop, Add, Mul, Sub, Div, Sdiv, Mod, Smod, Addmod, Mulmod, Exp, Signextend,
                Lt, Gt, Slt, Sgt, Eq, Iszero, And, Or, Xor, Not, Byte, Shl, Shr, Sar,
                Keccak256,
                Address, Balance, Origin, Caller, Callvalue, Calldataload, Calldatasize,
                Calldatacopy, Codesize, Codecopy, Gasprice, Extcodesize, Extcodecopy,
                Returndatasize, Returndatacopy, Extcodehash,
                Blockhash, Coinbase, Timestamp, Number, Prevrandao, Gaslimit, Chainid,
                Selfbalance, Basefee,
                Pop, Mload, Mstore, Mstore8, Sload, Sstore, Pc, Msize, Gas,
                Log0, Log1, Log2, Log3, Log4,
                Create, Call, Callcode, Return, Delegatecall, Create2, Staticcall, Revert,
                Invalid, Selfdestruct,
            }
        }
    };
}
evm_dispatch!(dispatch_evm_before, before_instruction);
evm_dispatch!(dispatch_evm_after, after_instruction);

/// Dispatches [`Detector::before_instruction`] by runtime [`InstructionKind`], picking
/// the zero-sized marker type the generic callback needs. Lets the traversal engine
/// drive detectors without itself knowing the marker-type catalog in [`opcodes`].
pub fn dispatch_before<D: Detector, S: TraversalState>(kind: InstructionKind, detectors: &mut D, state: &mut S) {
    match kind {
        InstructionKind::Evm(op) => dispatch_evm_before(op, detectors, state),
        InstructionKind::Call => detectors.before_instruction::<opcodes::Call, S>(state),
        InstructionKind::ExtractReturnValue => detectors.before_instruction::<opcodes::ExtractReturnValue, S>(state),
        InstructionKind::Return => detectors.before_instruction::<opcodes::Return, S>(state),
        InstructionKind::Phi => detectors.before_instruction::<opcodes::Phi, S>(state),
        InstructionKind::Branch => detectors.before_instruction::<opcodes::Branch, S>(state),
        InstructionKind::Switch => detectors.before_instruction::<opcodes::Switch, S>(state),
        InstructionKind::Unreachable => detectors.before_instruction::<opcodes::Unreachable, S>(state),
        InstructionKind::YulFunc => detectors.before_instruction::<opcodes::YulFunc, S>(state),
        InstructionKind::Math => detectors.before_instruction::<opcodes::Math, S>(state),
        InstructionKind::TypeConvert => detectors.before_instruction::<opcodes::TypeConvert, S>(state),
        InstructionKind::MemoryOp => detectors.before_instruction::<opcodes::MemoryOp, S>(state),
        InstructionKind::StorageOp => detectors.before_instruction::<opcodes::StorageOp, S>(state),
    }
}

/// The [`Detector::after_instruction`] counterpart of [`dispatch_before`].
pub fn dispatch_after<D: Detector, S: TraversalState>(kind: InstructionKind, detectors: &mut D, state: &mut S) {
    match kind {
        InstructionKind::Evm(op) => dispatch_evm_after(op, detectors, state),
        InstructionKind::Call => detectors.after_instruction::<opcodes::Call, S>(state),
        InstructionKind::ExtractReturnValue => detectors.after_instruction::<opcodes::ExtractReturnValue, S>(state),
        InstructionKind::Return => detectors.after_instruction::<opcodes::Return, S>(state),
        InstructionKind::Phi => detectors.after_instruction::<opcodes::Phi, S>(state),
        InstructionKind::Branch => detectors.after_instruction::<opcodes::Branch, S>(state),
        InstructionKind::Switch => detectors.after_instruction::<opcodes::Switch, S>(state),
        InstructionKind::Unreachable => detectors.after_instruction::<opcodes::Unreachable, S>(state),
        InstructionKind::YulFunc => detectors.after_instruction::<opcodes::YulFunc, S>(state),
        InstructionKind::Math => detectors.after_instruction::<opcodes::Math, S>(state),
        InstructionKind::TypeConvert => detectors.after_instruction::<opcodes::TypeConvert, S>(state),
        InstructionKind::MemoryOp => detectors.after_instruction::<opcodes::MemoryOp, S>(state),
        InstructionKind::StorageOp => detectors.after_instruction::<opcodes::StorageOp, S>(state),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{opcodes, InstructionKind, Taint};

    #[derive(Default)]
    struct CallCounter {
        count: usize,
    }

    impl Detector for CallCounter {
        fn before_instruction<K: InstructionKindType, S: TraversalState>(&mut self, _state: &mut S) {
            if K::VALUE == InstructionKind::Call {
                self.count += 1;
            }
        }
    }

    #[derive(Default)]
    struct FakeState;

    impl TraversalState for FakeState {
        fn current_kind(&self) -> InstructionKind {
            InstructionKind::Call
        }
        fn current_taints(&self) -> Vec<Taint> {
            vec![]
        }
        fn taint_current(&mut self, _taint: Taint) {}
        fn is_tainted_by(&self, _label: &str) -> bool {
            false
        }
        fn is_protected(&self) -> bool {
            false
        }
        fn terminated_by_revert(&self) -> bool {
            false
        }
        fn call_stack_names(&self) -> Vec<String> {
            vec![]
        }
        fn current_function_name(&self) -> &str {
            "test"
        }
        fn entry_selector(&self) -> Option<u32> {
            None
        }
        fn is_fallback_entry(&self) -> bool {
            false
        }
        fn mark_protected(&mut self) {}
        fn is_runtime(&self) -> bool {
            true
        }
        fn entry_mutable_or_payable(&self) -> bool {
            false
        }
        fn current_operand_count(&self) -> usize {
            0
        }
        fn raw_operand_is_mutable_source(&self, _index: usize) -> bool {
            false
        }
        fn raw_operand_is_self_address(&self, _index: usize) -> bool {
            false
        }
        fn raw_operand_origin_opcode(&self, _index: usize) -> Option<EvmOp> {
            None
        }
        fn call_signature(&self) -> Option<u32> {
            None
        }
        fn logical_call_arg_selector(&self, _index: usize) -> Option<u32> {
            None
        }
        fn logical_call_arg_is_self_address(&self, _index: usize) -> bool {
            false
        }
        fn current_source(&self) -> Option<crate::SourceLoc> {
            None
        }
        fn function_name_for_selector(&self, _selector: u32) -> Option<String> {
            None
        }
    }

    #[test]
    fn tuple_detector_runs_both_members() {
        let mut state = FakeState;
        let mut detectors = (CallCounter::default(), CallCounter::default());
        detectors.before_instruction::<opcodes::Call, _>(&mut state);
        assert_eq!(detectors.0.count, 1);
        assert_eq!(detectors.1.count, 1);
    }
}
