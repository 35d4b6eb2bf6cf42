//! Hand-rolled Graphviz DOT emission for `--mode cfg`, grounded in
//! `hookscan/utils/cfg_visualizer.py`. No `graphviz` crate dependency: one function's
//! worth of DOT text is simple enough to format directly and the teacher crate
//! doesn't otherwise touch the graphviz ecosystem.

use std::{fmt::Write as _, fs, path::Path};

use hookaudit_ir::{
    contract::Contract,
    function::{Function, FunctionType},
};

use crate::error::Result;

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\l")
}

fn function_dot(contract: &Contract, function: &Function) -> String {
    let mut out = String::new();
    let args = function
        .arguments
        .iter()
        .map(|arg| arg.name.clone())
        .collect::<Vec<_>>()
        .join(", ");
    let rets = function.return_names.join(", ");
    let _ = writeln!(out, "digraph CFG {{");
    let _ = writeln!(out, "  node [shape=box];");
    let _ = writeln!(
        out,
        "  label=\"{}\";",
        escape(&format!("{}\narguments: {args}\nreturn values: {rets}", function.name))
    );
    let _ = writeln!(out, "  labelloc=t;");

    for &bb_id in &function.basic_blocks {
        let Some(bb) = contract.basic_blocks.get(&bb_id) else { continue };
        let mut body = format!("basic block id:{}\n\n", bb_id.0);
        for inst in &bb.instructions {
            let _ = writeln!(body, "{:?}", inst.kind);
        }
        let _ = writeln!(out, "  \"{}\" [label=\"{}\"];", bb_id.0, escape(&body));
        for &pred in &bb.predecessors {
            let _ = writeln!(out, "  \"{}\" -> \"{}\";", pred.0, bb_id.0);
        }
    }

    let _ = writeln!(out, "}}");
    out
}

fn filename_for(contract_name: &str, function_name: &str) -> String {
    let base = format!("{contract_name}-{function_name}");
    if base.len() <= 100 {
        return base;
    }
    // Long Yul names (heavily mangled overload-disambiguated internal functions) can
    // overflow typical filename limits; collapse to a short deterministic stand-in.
    let digest = base.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01B3));
    let truncate_at = base.char_indices().map(|(i, _)| i).find(|&i| i >= 80).unwrap_or(base.len());
    format!("{}_{digest:016x}", &base[..truncate_at])
}

fn write_section(contract: &Contract, functions: &[&Function], dir: &Path, contract_name: &str) -> Result<()> {
    fs::create_dir_all(dir)?;
    for function in functions {
        let filename = filename_for(contract_name, &function.name);
        let path = dir.join(format!("{filename}.dot"));
        fs::write(path, function_dot(contract, function))?;
    }
    Ok(())
}

/// Writes one `.dot` file per function into `<output_dir>/creation/` and
/// `<output_dir>/runtime/`.
pub fn generate_cfg(contract: &Contract, contract_name: &str, output_dir: &Path) -> Result<()> {
    let creation: Vec<&Function> = contract
        .all_functions()
        .filter(|f| !f.is_runtime && !matches!(f.kind, FunctionType::YulFunction))
        .collect();
    let runtime: Vec<&Function> = contract.all_functions().filter(|f| f.is_runtime).collect();

    write_section(contract, &creation, &output_dir.join("creation"), contract_name)?;
    write_section(contract, &runtime, &output_dir.join("runtime"), contract_name)?;
    Ok(())
}
