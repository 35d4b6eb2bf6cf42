//! Parses solc's normalized Yul IR output (`solc --ir`/`--ir-optimized`) into an AST.
//!
//! This is the textual form the Solidity compiler emits before its own Yul-to-EVM
//! backend runs; [`crate::lifter`] walks the AST this module produces into a
//! [`crate::contract::Contract`].

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{Block, Case, DataObject, Expression, FunctionDefinition, Literal, Object, Statement, TypedName};
pub use parser::parse_object;
