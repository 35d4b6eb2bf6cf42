//! Command-line front-end, grounded in `uniscan/__main__.py`.

mod cfg;
mod cli;
mod compiler;
mod detect;
mod error;
mod pipeline;
mod sourcemap;

use std::{
    io::Read as _,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use serde_json::{json, Value};

use crate::{
    cli::{Args, Mode},
    error::{CliError, Result},
};

fn parse_input_spec(input: &str, contract_arg: Option<&str>) -> Result<(String, Option<String>)> {
    match input.split_once(':') {
        Some((file_path, target)) => {
            if let Some(contract_arg) = contract_arg {
                if contract_arg != target {
                    return Err(CliError::Usage(format!(
                        "-c/--contract {contract_arg:?} conflicts with the contract named in INPUT_FILE ({target:?})"
                    )));
                }
            }
            Ok((file_path.to_string(), Some(target.to_string())))
        }
        None => Ok((input.to_string(), contract_arg.map(str::to_string))),
    }
}

struct HandledInput {
    std_input_json: Option<Value>,
    std_output_json: Value,
    contract_name: Option<String>,
}

fn handle_input(args: &Args) -> Result<HandledInput> {
    let (file_path, contract_name) = parse_input_spec(&args.input, args.contract.as_deref())?;

    if file_path == "-" || file_path.ends_with(".json") {
        let raw = if file_path == "-" {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            std::fs::read_to_string(&file_path)?
        };
        let parsed: Value = serde_json::from_str(&raw)?;
        if parsed.get("contracts").is_none() {
            let std_output_json = compiler::compile_standard_json(parsed.clone(), contract_name.as_deref(), &args.solc_bin)?;
            Ok(HandledInput {
                std_input_json: Some(parsed),
                std_output_json,
                contract_name,
            })
        } else {
            Ok(HandledInput {
                std_input_json: None,
                std_output_json: parsed,
                contract_name,
            })
        }
    } else if file_path.ends_with(".sol") {
        let base_path = args.base_path.clone().unwrap_or_else(|| PathBuf::from("."));
        let opts = compiler::CompileOptions {
            solc_bin: args.solc_bin.clone(),
            base_path,
            include_paths: args.include_path.clone(),
            remappings_file: args.remappings_file.clone(),
        };
        let std_input_json = compiler::generate_standard_input_json(Path::new(&file_path), &opts)?;
        let std_output_json = compiler::compile_standard_json(std_input_json.clone(), contract_name.as_deref(), &args.solc_bin)?;
        Ok(HandledInput {
            std_input_json: Some(std_input_json),
            std_output_json,
            contract_name,
        })
    } else {
        Err(CliError::Usage(format!("invalid input file: {file_path}")))
    }
}

fn function_selector_json(finding: &hookaudit_ir::detectors::Finding) -> Value {
    if finding.is_fallback {
        Value::String("(FALLBACK_OR_RECEIVE)".to_string())
    } else {
        match finding.function_selector {
            Some(selector) => Value::String(format!("0x{selector:08x}")),
            None => Value::Null,
        }
    }
}

fn run_detect_mode(args: &Args, handled: &HandledInput) -> Result<Value> {
    let unit = pipeline::select_ir_unit(&handled.std_output_json, handled.contract_name.as_deref())?;
    let contract = pipeline::build_contract(&unit)?;

    let selected = detect::parse_detector_selection(args.detector.as_deref()).map_err(CliError::Usage)?;
    let timeout = Duration::from_secs_f64(args.timeout_limit_per_round.unwrap_or(60.0));
    let outcome = detect::run_detect(&contract, &selected, args.only_run_not_protected, timeout);

    let resolver = sourcemap::SourceResolver::new(&handled.std_output_json, handled.std_input_json.as_ref());

    let detection_results: Vec<Value> = outcome
        .findings
        .iter()
        .map(|finding| {
            let mut entry = json!({
                "detector_name": finding.detector_name,
                "vulnerability": finding.vulnerability,
                "external_function": finding.external_function,
                "function_selector": function_selector_json(finding),
                "yul_call_stack": finding.yul_call_stack,
                "source_location": finding.source.map(|loc| resolver.render(loc)),
                "severity": finding.severity.as_str(),
                "confidence": finding.confidence.as_str(),
            });
            if let Some(info) = &finding.additional_info {
                entry["additional_info"] = json!(info);
            }
            entry
        })
        .collect();

    Ok(json!({
        "detection_results": detection_results,
        "info": {
            "contract_name": unit.contract_name,
            "is_timeout": outcome.is_timeout,
            "time_used": outcome.time_used.as_secs_f64(),
            "traversal_rounds": outcome.traversal_rounds,
        },
    }))
}

fn run_cfg_mode(args: &Args, handled: &HandledInput) -> Result<()> {
    let output = args
        .output
        .as_ref()
        .ok_or_else(|| CliError::Usage("cfg mode requires -o/--output to be a directory".to_string()))?;
    if !output.is_dir() {
        return Err(CliError::Usage(format!("CFG output should be a directory but isn't: {}", output.display())));
    }

    let unit = pipeline::select_ir_unit(&handled.std_output_json, handled.contract_name.as_deref())?;
    let contract = pipeline::build_contract(&unit)?;
    cfg::generate_cfg(&contract, &unit.contract_name, output)
}

fn write_output(args: &Args, result: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(result)?;
    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            if path.exists() && !args.overwrite {
                return Err(CliError::OutputExists(path.display().to_string()));
            }
            std::fs::write(path, rendered)?;
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn try_main(args: &Args) -> Result<()> {
    let handled = handle_input(args)?;
    match args.mode {
        Mode::Cfg => run_cfg_mode(args, &handled),
        Mode::Detect => {
            let result = run_detect_mode(args, &handled)?;
            write_output(args, &result)
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match try_main(&args) {
        Ok(()) => Ok(()),
        Err(err) if args.mode == Mode::Detect && args.silent => {
            tracing::warn!(error = %err, "suppressed under --silent");
            let result = json!({
                "error": err.to_string(),
                "error_type": error_type_name(&err),
            });
            write_output(&args, &result)?;
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "hookaudit failed");
            Err(err.into())
        }
    }
}

fn error_type_name(err: &CliError) -> &'static str {
    match err {
        CliError::Io(_) => "Io",
        CliError::Json(_) => "Json",
        CliError::Compile(_) => "CompileError",
        CliError::Ir(_) => "IrError",
        CliError::Usage(_) => "UsageError",
        CliError::SourceNotFound(_) => "SourceNotFound",
        CliError::OutputExists(_) => "OutputExists",
    }
}
