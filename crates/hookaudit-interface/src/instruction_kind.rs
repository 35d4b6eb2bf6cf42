//! Zero-sized marker types for every normalized instruction kind a hook contract's
//! control-flow graph can contain, plus the closed [`InstructionKind`] enum they map to.
//!
//! This mirrors the "one marker struct per instruction class" approach used by Python
//! detector callback tables: a detector registers a callback for an exact instruction
//! class (not a superclass), and the traversal engine dispatches to it by matching
//! `OP::VALUE` against the registered key. Generics give us that same exact-type
//! dispatch at compile time instead of a runtime `isinstance` check.

/// Declares one zero-sized marker struct per name.
macro_rules! pub_struct {
    ($($x:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $x;
        )*
    };
}

/// Every EVM opcode that can appear in a normalized instruction stream, in the order
/// `all_evm_instructions` lists them (arithmetic, comparison/bitwise, environment,
/// block info, stack/memory/storage, logs, calls, halts).
macro_rules! forall_evm_opcodes {
    ($m:ident) => {
        $m! {
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
    };
}

/// Marker structs for EVM opcodes, under `opcodes::evm`.
pub mod opcodes {
    //! Marker structs for every [`super::InstructionKind`] variant, grouped the way the
    //! normalized instruction set is grouped: raw EVM opcodes, and the higher-level
    //! instructions introduced by lifting and normalization.

    /// One marker struct per EVM opcode.
    pub mod evm {
        forall_evm_opcodes!(pub_struct);
    }

    pub_struct!(
        Call,
        ExtractReturnValue,
        Return,
        Phi,
        Branch,
        Switch,
        Unreachable,
        YulFunc,
        Math,
        TypeConvert,
        MemoryOp,
        StorageOp,
    );
}

/// One variant per normalized EVM opcode. Built from the same name list as
/// [`opcodes::evm`] so the two can never drift apart.
macro_rules! evm_op_enum {
    ($($name:ident),* $(,)?) => {
        /// A single EVM-level opcode, as it survives after normalization.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[allow(missing_docs)]
        pub enum EvmOp {
            $($name),*
        }
    };
}
forall_evm_opcodes!(evm_op_enum);

/// The closed set of instruction kinds a detector can be invoked for.
///
/// Raw EVM opcodes are represented uniformly as `Evm(EvmOp)`; everything above them
/// (calls into Yul helper functions, normalized memory/storage accesses, control-flow
/// nodes, and the arithmetic/type-conversion instructions synthesized during
/// normalization) has its own variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum InstructionKind {
    Evm(EvmOp),
    Call,
    ExtractReturnValue,
    Return,
    Phi,
    Branch,
    Switch,
    Unreachable,
    YulFunc,
    Math,
    TypeConvert,
    MemoryOp,
    StorageOp,
}

/// Maps a marker type to the [`InstructionKind`] value it represents.
///
/// Implemented for every type in [`opcodes`]; never implemented by detector authors.
pub trait InstructionKindType {
    /// The instruction kind this marker type stands for.
    const VALUE: InstructionKind;
}

macro_rules! impl_evm_kind {
    ($($name:ident),* $(,)?) => {
        $(
            impl InstructionKindType for opcodes::evm::$name {
                const VALUE: InstructionKind = InstructionKind::Evm(EvmOp::$name);
            }
        )*
    };
}
forall_evm_opcodes!(impl_evm_kind);

macro_rules! impl_kind {
    ($($name:ident),* $(,)?) => {
        $(
            impl InstructionKindType for opcodes::$name {
                const VALUE: InstructionKind = InstructionKind::$name;
            }
        )*
    };
}
impl_kind!(
    Call,
    ExtractReturnValue,
    Return,
    Phi,
    Branch,
    Switch,
    Unreachable,
    YulFunc,
    Math,
    TypeConvert,
    MemoryOp,
    StorageOp,
);

impl EvmOp {
    /// Recognizes a Yul `FunctionCall` name as an EVM opcode mnemonic, the reverse of
    /// [`Self::mnemonic`]. Used by the lifter to tell an opcode call (`sstore(...)`)
    /// apart from a call to a user-defined or compiler-synthesized Yul function.
    #[must_use]
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Some(match name {
            "stop" => Self::Stop,
            "add" => Self::Add,
            "mul" => Self::Mul,
            "sub" => Self::Sub,
            "div" => Self::Div,
            "sdiv" => Self::Sdiv,
            "mod" => Self::Mod,
            "smod" => Self::Smod,
            "addmod" => Self::Addmod,
            "mulmod" => Self::Mulmod,
            "exp" => Self::Exp,
            "signextend" => Self::Signextend,
            "lt" => Self::Lt,
            "gt" => Self::Gt,
            "slt" => Self::Slt,
            "sgt" => Self::Sgt,
            "eq" => Self::Eq,
            "iszero" => Self::Iszero,
            "and" => Self::And,
            "or" => Self::Or,
            "xor" => Self::Xor,
            "not" => Self::Not,
            "byte" => Self::Byte,
            "shl" => Self::Shl,
            "shr" => Self::Shr,
            "sar" => Self::Sar,
            "keccak256" | "sha3" => Self::Keccak256,
            "address" => Self::Address,
            "balance" => Self::Balance,
            "origin" => Self::Origin,
            "caller" => Self::Caller,
            "callvalue" => Self::Callvalue,
            "calldataload" => Self::Calldataload,
            "calldatasize" => Self::Calldatasize,
            "calldatacopy" => Self::Calldatacopy,
            "codesize" => Self::Codesize,
            "codecopy" => Self::Codecopy,
            "gasprice" => Self::Gasprice,
            "extcodesize" => Self::Extcodesize,
            "extcodecopy" => Self::Extcodecopy,
            "returndatasize" => Self::Returndatasize,
            "returndatacopy" => Self::Returndatacopy,
            "extcodehash" => Self::Extcodehash,
            "blockhash" => Self::Blockhash,
            "coinbase" => Self::Coinbase,
            "timestamp" => Self::Timestamp,
            "number" => Self::Number,
            "prevrandao" | "difficulty" => Self::Prevrandao,
            "gaslimit" => Self::Gaslimit,
            "chainid" => Self::Chainid,
            "selfbalance" => Self::Selfbalance,
            "basefee" => Self::Basefee,
            "pop" => Self::Pop,
            "mload" => Self::Mload,
            "mstore" => Self::Mstore,
            "mstore8" => Self::Mstore8,
            "sload" => Self::Sload,
            "sstore" => Self::Sstore,
            "pc" => Self::Pc,
            "msize" => Self::Msize,
            "gas" => Self::Gas,
            "log0" => Self::Log0,
            "log1" => Self::Log1,
            "log2" => Self::Log2,
            "log3" => Self::Log3,
            "log4" => Self::Log4,
            "create" => Self::Create,
            "call" => Self::Call,
            "callcode" => Self::Callcode,
            "return" => Self::Return,
            "delegatecall" => Self::Delegatecall,
            "create2" => Self::Create2,
            "staticcall" => Self::Staticcall,
            "revert" => Self::Revert,
            "invalid" => Self::Invalid,
            "selfdestruct" => Self::Selfdestruct,
            _ => return None,
        })
    }

    /// The lowercase Yul mnemonic for this opcode, matching what the lifter sees in
    /// the `FunctionCall` it is built from (e.g. `sstore`, `delegatecall`).
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Add => "add",
            Self::Mul => "mul",
            Self::Sub => "sub",
            Self::Div => "div",
            Self::Sdiv => "sdiv",
            Self::Mod => "mod",
            Self::Smod => "smod",
            Self::Addmod => "addmod",
            Self::Mulmod => "mulmod",
            Self::Exp => "exp",
            Self::Signextend => "signextend",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Slt => "slt",
            Self::Sgt => "sgt",
            Self::Eq => "eq",
            Self::Iszero => "iszero",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Not => "not",
            Self::Byte => "byte",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Sar => "sar",
            Self::Keccak256 => "keccak256",
            Self::Address => "address",
            Self::Balance => "balance",
            Self::Origin => "origin",
            Self::Caller => "caller",
            Self::Callvalue => "callvalue",
            Self::Calldataload => "calldataload",
            Self::Calldatasize => "calldatasize",
            Self::Calldatacopy => "calldatacopy",
            Self::Codesize => "codesize",
            Self::Codecopy => "codecopy",
            Self::Gasprice => "gasprice",
            Self::Extcodesize => "extcodesize",
            Self::Extcodecopy => "extcodecopy",
            Self::Returndatasize => "returndatasize",
            Self::Returndatacopy => "returndatacopy",
            Self::Extcodehash => "extcodehash",
            Self::Blockhash => "blockhash",
            Self::Coinbase => "coinbase",
            Self::Timestamp => "timestamp",
            Self::Number => "number",
            Self::Prevrandao => "prevrandao",
            Self::Gaslimit => "gaslimit",
            Self::Chainid => "chainid",
            Self::Selfbalance => "selfbalance",
            Self::Basefee => "basefee",
            Self::Pop => "pop",
            Self::Mload => "mload",
            Self::Mstore => "mstore",
            Self::Mstore8 => "mstore8",
            Self::Sload => "sload",
            Self::Sstore => "sstore",
            Self::Pc => "pc",
            Self::Msize => "msize",
            Self::Gas => "gas",
            Self::Log0 => "log0",
            Self::Log1 => "log1",
            Self::Log2 => "log2",
            Self::Log3 => "log3",
            Self::Log4 => "log4",
            Self::Create => "create",
            Self::Call => "call",
            Self::Callcode => "callcode",
            Self::Return => "return",
            Self::Delegatecall => "delegatecall",
            Self::Create2 => "create2",
            Self::Staticcall => "staticcall",
            Self::Revert => "revert",
            Self::Invalid => "invalid",
            Self::Selfdestruct => "selfdestruct",
        }
    }

    /// Number of stack arguments this opcode consumes (`n_args`), and whether it
    /// produces a value (`n_rets == 1`) or unconditionally halts execution.
    #[must_use]
    pub fn arg_count(self) -> usize {
        match self {
            Self::Stop | Self::Invalid => 0,
            Self::Address
            | Self::Origin
            | Self::Caller
            | Self::Callvalue
            | Self::Calldatasize
            | Self::Codesize
            | Self::Gasprice
            | Self::Returndatasize
            | Self::Coinbase
            | Self::Timestamp
            | Self::Number
            | Self::Prevrandao
            | Self::Gaslimit
            | Self::Chainid
            | Self::Selfbalance
            | Self::Basefee
            | Self::Pc
            | Self::Msize
            | Self::Gas => 0,
            Self::Iszero
            | Self::Not
            | Self::Calldataload
            | Self::Extcodesize
            | Self::Extcodehash
            | Self::Blockhash
            | Self::Balance
            | Self::Pop
            | Self::Mload
            | Self::Sload
            | Self::Selfdestruct => 1,
            Self::Add
            | Self::Mul
            | Self::Sub
            | Self::Div
            | Self::Sdiv
            | Self::Mod
            | Self::Smod
            | Self::Exp
            | Self::Signextend
            | Self::Lt
            | Self::Gt
            | Self::Slt
            | Self::Sgt
            | Self::Eq
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::Byte
            | Self::Shl
            | Self::Shr
            | Self::Sar
            | Self::Keccak256
            | Self::Mstore
            | Self::Mstore8
            | Self::Sstore
            | Self::Return
            | Self::Revert
            | Self::Log0 => 2,
            Self::Addmod
            | Self::Mulmod
            | Self::Create
            | Self::Log1
            | Self::Calldatacopy
            | Self::Codecopy => 3,
            Self::Create2 | Self::Log2 | Self::Extcodecopy => 4,
            Self::Log3 => 5,
            Self::Delegatecall | Self::Staticcall | Self::Returndatacopy | Self::Log4 => 6,
            Self::Call | Self::Callcode => 7,
        }
    }

    /// Whether this opcode unconditionally terminates the basic block it appears in
    /// (`is_halt_inst` in the original instruction table).
    #[must_use]
    pub fn is_halt(self) -> bool {
        matches!(
            self,
            Self::Stop | Self::Return | Self::Revert | Self::Invalid | Self::Selfdestruct
        )
    }

    /// Whether this opcode produces a value consumers can use (`n_rets == 1`).
    #[must_use]
    pub fn has_return(self) -> bool {
        !matches!(
            self,
            Self::Stop
                | Self::Calldatacopy
                | Self::Codecopy
                | Self::Extcodecopy
                | Self::Returndatacopy
                | Self::Pop
                | Self::Mstore
                | Self::Mstore8
                | Self::Sstore
                | Self::Log0
                | Self::Log1
                | Self::Log2
                | Self::Log3
                | Self::Log4
                | Self::Return
                | Self::Revert
                | Self::Invalid
                | Self::Selfdestruct
        )
    }
}
