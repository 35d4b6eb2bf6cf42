//! Argument surface, re-implemented faithfully from `uniscan/__main__.py`'s
//! `parse_cli_args`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Static vulnerability scanner for Uniswap v4-style hook contracts.
#[derive(Debug, Parser)]
#[command(name = "hookaudit", version, about)]
pub struct Args {
    /// Input file (standard input/output JSON or `.sol`), use "-" for stdin. The
    /// contract name is optional: `path/to/File.sol:ContractName`.
    #[arg(value_name = "INPUT_FILE[:CONTRACT_NAME]")]
    pub input: String,

    /// `detect` reports findings; `cfg` dumps one DOT file per function.
    #[arg(short, long, value_enum, default_value_t = Mode::Detect)]
    pub mode: Mode,

    /// The name of the contract to scan, if `INPUT_FILE` contains more than one.
    #[arg(short, long)]
    pub contract: Option<String>,

    /// Comma-separated detector names (default: all built-ins).
    #[arg(short, long, value_name = "D1,D2,...")]
    pub detector: Option<String>,

    /// Output file (detect mode) or directory (cfg mode); default: stdout.
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    pub output: Option<PathBuf>,

    /// Timeout budget for the whole runtime half of one round, in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub timeout_limit_per_round: Option<f64>,

    /// solc binary to invoke when `INPUT_FILE` is a `.sol` source.
    #[arg(long, default_value = "solc")]
    pub solc_bin: String,

    /// solc base path; default: current working directory.
    #[arg(long)]
    pub base_path: Option<PathBuf>,

    /// solc include path, may be repeated; default: `node_modules` under base path.
    #[arg(long = "include-path")]
    pub include_path: Vec<PathBuf>,

    /// solc remappings file; default: `remappings.txt` under base path.
    #[arg(long)]
    pub remappings_file: Option<PathBuf>,

    /// Overwrite an existing output file.
    #[arg(long)]
    pub overwrite: bool,

    /// Suppress exceptions and report them inside the JSON output instead.
    #[arg(long)]
    pub silent: bool,

    /// Only traverse paths that are not behind a recognized caller-protection check.
    #[arg(long)]
    pub only_run_not_protected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Detect,
    Cfg,
}

/// The detector names `-d/--detector` accepts, matching `all_detectors_dict`'s keys.
pub const ALL_DETECTOR_NAMES: &[&str] = &[
    "UniswapPublicCallback",
    "UniswapPublicHook",
    "UniswapSuicidalHook",
    "UniswapUpgradableHook",
];
