//! Lifts Solidity's Yul IR output into a typed control-flow graph, normalizes it, and
//! walks it with a path-sensitive symbolic traversal that pluggable [`Detector`]s
//! hook into to flag vulnerabilities specific to Uniswap v4-style hook contracts.
//!
//! ```text
//! Yul source --(yul::parse)--> Yul AST --(lifter::lift)--> Contract
//!     --(transform::normalize)--> normalized Contract
//!     --(traversal::run)--> per-detector DetectorResult list
//! ```

pub use hookaudit_interface::{self as interface, Detector};

pub mod basic_block;
pub mod constant;
pub mod contract;
pub mod detectors;
pub mod error;
pub mod function;
pub mod id_arena;
pub mod instruction;
pub mod lifter;
pub mod traversal;
pub mod transform;
pub mod type_parser;
pub mod value;
pub mod yul;

pub use contract::Contract;
pub use error::{HookauditError, Result};
