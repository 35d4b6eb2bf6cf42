//! Turns the compiler's standard-output JSON into a verified, mutability-annotated
//! [`Contract`], grounded in `uniscan/uniscan.py`'s constructor (absent from the
//! retrieved source tree, reconstructed from `uniscan/components/contract.py` and
//! this crate's own `Contract` surface).

use hookaudit_ir::{contract::Contract, lifter, transform, yul, HookauditError};
use serde_json::Value;

use crate::error::{CliError, Result};

/// One candidate contract unit pulled out of solc's `contracts: {file: {name: {ir}}}`
/// map.
pub struct IrUnit {
    pub file_name: String,
    pub contract_name: String,
    pub ir: String,
}

/// Finds the contract whose `ir` output is non-empty, optionally narrowed by name;
/// errors if more than one remains ambiguous, matching §6's "at most one contract per
/// invocation has non-empty IR (disambiguation requires a contract-name filter)".
pub fn select_ir_unit(std_output_json: &Value, contract_name: Option<&str>) -> Result<IrUnit> {
    let contracts = std_output_json
        .get("contracts")
        .and_then(Value::as_object)
        .ok_or_else(|| CliError::Compile("standard-output JSON has no \"contracts\" field".to_string()))?;

    let mut candidates = Vec::new();
    for (file_name, units) in contracts {
        let Some(units) = units.as_object() else { continue };
        for (name, unit) in units {
            if let Some(target) = contract_name {
                if name != target {
                    continue;
                }
            }
            let ir = unit.get("ir").and_then(Value::as_str).unwrap_or("");
            if !ir.is_empty() {
                candidates.push(IrUnit {
                    file_name: file_name.clone(),
                    contract_name: name.clone(),
                    ir: ir.to_string(),
                });
            }
        }
    }

    match candidates.len() {
        0 => Err(CliError::Ir(HookauditError::ContractNotFound(
            contract_name.map_or_else(|| "<any>".to_string(), str::to_string),
        ))),
        1 => Ok(candidates.into_iter().next().expect("checked len == 1")),
        _ => Err(CliError::Usage(format!(
            "multiple contracts have non-empty IR ({}); pass -c/--contract to disambiguate",
            candidates.iter().map(|c| c.contract_name.as_str()).collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// Parses, lifts, normalizes, verifies, and annotates one [`IrUnit`]'s Yul text into a
/// ready-to-traverse [`Contract`].
pub fn build_contract(unit: &IrUnit) -> Result<Contract> {
    let object = yul::parse_object(&unit.ir)?;
    let mut contract = lifter::lift(&unit.contract_name, &object, &unit.ir)?;
    transform::normalize(&mut contract);
    contract.verify().map_err(HookauditError::from)?;
    contract.generate_mutability_info();
    Ok(contract)
}
