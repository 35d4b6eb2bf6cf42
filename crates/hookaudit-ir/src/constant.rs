//! Compile-time constants, grounded in `hookscan/components/constant.py`'s
//! `Constant`/`ConstantInt`/`ConstantStr`/`ConstantHexStr`/`ConstantBool` hierarchy.
//! Unlike instructions, constants are deduplicated by value within a function during
//! lifting (the same literal `0` appearing twice in Yul source becomes one constant
//! node), which is why [`Constant`] derives `Eq`/`Hash`.

use primitive_types::U256;

use crate::value::NodeId;

/// A literal value baked into the IR by the lifter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantKind {
    Int(U256),
    Str(String),
    /// A Yul hex-string literal (`hex"..."`), kept distinct from `Str` since Yul
    /// distinguishes the two literal forms and detectors may care about the
    /// distinction (e.g. raw selector bytes vs. a log message).
    HexStr(String),
    Bool(bool),
}

/// A deduplicated constant node.
#[derive(Debug, Clone)]
pub struct Constant {
    pub id: NodeId,
    pub kind: ConstantKind,
}

impl Constant {
    /// Reads this constant as a `U256`, if it is numeric (or a hex string, which Yul
    /// treats as a number when used in value position).
    #[must_use]
    pub fn as_u256(&self) -> Option<U256> {
        match &self.kind {
            ConstantKind::Int(v) => Some(*v),
            ConstantKind::HexStr(s) => U256::from_str_radix(s.trim_start_matches("0x"), 16).ok(),
            ConstantKind::Bool(b) => Some(U256::from(u8::from(*b))),
            ConstantKind::Str(_) => None,
        }
    }
}
