//! Drives the external `solc` binary, grounded in `uniscan/utils/compiler.py`.
//!
//! A `.sol` input is turned into solc's combined-JSON AST (to resolve its import
//! graph into a standard-JSON `sources` map), then compiled a second time through
//! solc's standard-JSON interface with `ir` requested in `outputSelection`.

use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::error::{CliError, Result};

/// Where solc should look for imports and remappings, mirroring the fields
/// `generate_standard_input_json` reads off `argparse.Namespace`.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub solc_bin: String,
    pub base_path: PathBuf,
    pub include_paths: Vec<PathBuf>,
    pub remappings_file: Option<PathBuf>,
}

fn run_solc(solc_bin: &str, args: &[&str], stdin: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut cmd = Command::new(solc_bin);
    cmd.args(args);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    }
    let mut child = cmd.spawn().map_err(|e| CliError::Compile(format!("failed to spawn {solc_bin}: {e}")))?;
    if let Some(input) = stdin {
        child
            .stdin
            .take()
            .expect("stdin was requested")
            .write_all(input)
            .map_err(|e| CliError::Compile(e.to_string()))?;
    }
    let output = child.wait_with_output().map_err(|e| CliError::Compile(e.to_string()))?;
    if !output.status.success() {
        return Err(CliError::Compile(format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(output.stdout)
}

/// Resolves `file_path`'s full import graph via `solc --combined-json ast`, mirroring
/// `compile_ast`.
pub fn compile_ast(file_path: &Path, opts: &CompileOptions, remappings: &[String]) -> Result<Value> {
    let base_path = opts.base_path.to_string_lossy().into_owned();
    let mut args = vec!["--combined-json".to_string(), "ast".to_string(), "--base-path".to_string(), base_path];
    for path in &opts.include_paths {
        args.push("--include-path".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    args.extend(remappings.iter().cloned());
    args.push(file_path.to_string_lossy().into_owned());
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let stdout = run_solc(&opts.solc_bin, &arg_refs, None)?;
    serde_json::from_slice(&stdout).map_err(CliError::from)
}

/// Reads `remappings_file` (or `<base_path>/remappings.txt` if it exists), one
/// `prefix=path` remapping per non-empty line, sorted for determinism, mirroring
/// `get_remappings`.
pub fn get_remappings(base_path: &Path, remappings_file: Option<&Path>) -> Result<Vec<String>> {
    let path = match remappings_file {
        Some(p) => p.to_path_buf(),
        None => {
            let default = base_path.join("remappings.txt");
            if default.is_file() {
                default
            } else {
                return Ok(Vec::new());
            }
        }
    };
    let contents = std::fs::read_to_string(path)?;
    let mut remappings: Vec<String> = contents.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string).collect();
    remappings.sort();
    Ok(remappings)
}

/// Turns a `.sol` entry point into a standard-input-JSON `{language, sources,
/// settings}` document by resolving its imports through [`compile_ast`], mirroring
/// `generate_standard_input_json`.
pub fn generate_standard_input_json(target_file: &Path, opts: &CompileOptions) -> Result<Value> {
    let remappings = get_remappings(&opts.base_path, opts.remappings_file.as_deref())?;

    let mut include_paths = opts.include_paths.clone();
    if include_paths.is_empty() {
        let node_modules = opts.base_path.join("node_modules");
        if node_modules.is_dir() {
            include_paths.push(node_modules);
        }
    }
    let scoped_opts = CompileOptions {
        include_paths: include_paths.clone(),
        ..opts.clone()
    };

    let ast_json = compile_ast(target_file, &scoped_opts, &remappings)?;
    let source_list = ast_json
        .get("sourceList")
        .and_then(Value::as_array)
        .ok_or_else(|| CliError::Compile("combined-json ast output missing sourceList".to_string()))?;

    let mut sources = Map::new();
    for file_name in source_list.iter().filter_map(Value::as_str) {
        let content = resolve_source_file(&opts.base_path, &include_paths, file_name)?;
        sources.insert(file_name.to_string(), json!({ "content": content }));
    }

    Ok(json!({
        "language": "Solidity",
        "sources": Value::Object(sources),
        "settings": { "remappings": remappings },
    }))
}

fn resolve_source_file(base_path: &Path, include_paths: &[PathBuf], file_name: &str) -> Result<String> {
    let direct = base_path.join(file_name);
    if direct.is_file() {
        return Ok(std::fs::read_to_string(direct)?);
    }
    for include_path in include_paths {
        let candidate = include_path.join(file_name);
        if candidate.is_file() {
            return Ok(std::fs::read_to_string(candidate)?);
        }
    }
    Err(CliError::SourceNotFound(file_name.to_string()))
}

static PRAGMA_RE: &str = r"pragma\s+solidity\s+([<=>\^]{0,2}(\s*\d+\s*\.){2}\s*\d+\s*)+;";
static MAX_UINT_RE: &str = r"uint(\d*)(\s*)\((\s*)-(\s*)1(\s*)\)";

/// Strips `pragma solidity` version pins and rewrites `uintN(-1)` into
/// `type(uintN).max` before sending a standard-input-JSON document to solc, then
/// requests `ir` in `outputSelection` and compiles it, mirroring
/// `compile_standard_json`.
///
/// `contract_name`, if given, narrows `outputSelection` to that one contract;
/// otherwise every contract in the unit is selected and the caller disambiguates
/// from solc's output (at most one will have non-empty `ir`).
pub fn compile_standard_json(mut std_input_json: Value, contract_name: Option<&str>, solc_bin: &str) -> Result<Value> {
    let pragma_re = Regex::new(PRAGMA_RE).expect("valid regex");
    let max_uint_re = Regex::new(MAX_UINT_RE).expect("valid regex");

    if let Some(sources) = std_input_json.get_mut("sources").and_then(Value::as_object_mut) {
        for source in sources.values_mut() {
            if let Some(content) = source.get_mut("content").and_then(Value::as_str).map(str::to_string) {
                let content = pragma_re.replace_all(&content, "");
                let content = max_uint_re.replace_all(&content, "type(uint$1).max $2$3$4$5");
                source["content"] = Value::String(content.into_owned());
            }
        }
    }

    let settings = std_input_json
        .as_object_mut()
        .ok_or_else(|| CliError::Usage("standard-input JSON must be an object".to_string()))?
        .entry("settings")
        .or_insert_with(|| json!({}));
    if contract_name.is_some() || settings.get("outputSelection").is_none() {
        let selector = contract_name.unwrap_or("*");
        settings["outputSelection"] = json!({ "*": { selector: ["ir"] } });
    }

    let stdout = run_solc(solc_bin, &["--standard-json", "-"], Some(serde_json::to_vec(&std_input_json)?.as_slice()))?;
    let std_output_json: Value = serde_json::from_slice(&stdout)?;
    if std_output_json.get("contracts").is_none() {
        let errors: Vec<&str> = std_output_json
            .get("errors")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|err| err.get("severity").and_then(Value::as_str) == Some("error"))
            .filter_map(|err| err.get("formattedMessage").and_then(Value::as_str))
            .collect();
        return Err(CliError::Compile(format!("compile error: {errors:?}")));
    }
    Ok(std_output_json)
}
