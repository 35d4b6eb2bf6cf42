//! Error types for every fallible stage of the pipeline (parsing, lifting,
//! verification, traversal), in the style of `thiserror`-based error enums used
//! throughout the rest of the pack.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, HookauditError>;

#[derive(Debug, Error)]
pub enum HookauditError {
    #[error("yul parse error at byte {offset}: {message}")]
    YulParse { offset: usize, message: String },

    #[error("unsupported yul construct: {0}")]
    UnsupportedYul(String),

    #[error("malformed type string {0:?}")]
    TypeString(String),

    #[error("contract verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("solc invocation failed: {0}")]
    Compile(String),

    #[error("contract {0:?} not found in compiler output")]
    ContractNotFound(String),
}

/// Structural invariants `Contract::verify` checks after normalization, mirroring
/// `Contract.verify()`'s operand/user symmetry assertions.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("instruction {0} references operand {1} which does not exist")]
    DanglingOperand(String, String),

    #[error("basic block {0} has no terminator")]
    MissingTerminator(String),

    #[error("function {0:?} has no entry point")]
    MissingEntryPoint(String),
}
