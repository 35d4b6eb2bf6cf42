//! CLI-level errors, grounded in `uniscan/utils/compiler.py`'s `CompileError` plus
//! the boundary exceptions `uniscan/__main__.py`'s `execute_and_output` catches.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("solc invocation failed: {0}")]
    Compile(String),

    #[error(transparent)]
    Ir(#[from] hookaudit_ir::HookauditError),

    #[error("{0}")]
    Usage(String),

    #[error("cannot find {0:?} under --base-path or --include-path")]
    SourceNotFound(String),

    #[error("output path exists: {0} (use --overwrite to replace it)")]
    OutputExists(String),
}
