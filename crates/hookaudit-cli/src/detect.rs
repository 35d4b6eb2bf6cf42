//! Detect-mode scheduling: runs the internal-only callback-discovery detector over
//! every entry point first, then a second round that re-traverses every entry point
//! (plus any discovered callback selectors as entry points of their own) with the
//! four public detectors. See `detectors.rs`'s module doc comment and `DESIGN.md` for
//! why this two-round shape lives at the CLI layer instead of inside the engine.

use std::time::{Duration, Instant};

use hookaudit_ir::{
    contract::Contract,
    detectors::{Finding, UniswapGetCallback, UniswapPublicCallback, UniswapPublicHook, UniswapSuicidalHook, UniswapUpgradableHook},
    function::{Function, FunctionType},
    traversal::{self, TraversalOptions},
};

use crate::cli::ALL_DETECTOR_NAMES;

/// Everything `UniswapPublicCallback`, `UniswapPublicHook`, `UniswapSuicidalHook`, and
/// `UniswapUpgradableHook` found, bundled together since they always run in the same
/// pass (see `DESIGN.md` for why they aren't selected dynamically per-detector).
#[derive(Default)]
struct Round2Detectors {
    public_callback: UniswapPublicCallback,
    public_hook: UniswapPublicHook,
    suicidal_hook: UniswapSuicidalHook,
    upgradable_hook: UniswapUpgradableHook,
}

type Round2Tuple = (UniswapPublicCallback, (UniswapPublicHook, (UniswapSuicidalHook, UniswapUpgradableHook)));

impl Round2Detectors {
    fn into_tuple(self) -> Round2Tuple {
        (self.public_callback, (self.public_hook, (self.suicidal_hook, self.upgradable_hook)))
    }

    fn from_tuple(tuple: Round2Tuple) -> Self {
        let (public_callback, (public_hook, (suicidal_hook, upgradable_hook))) = tuple;
        Self {
            public_callback,
            public_hook,
            suicidal_hook,
            upgradable_hook,
        }
    }
}

/// One scan's worth of results plus the bookkeeping the detect-mode JSON `info` block
/// reports.
pub struct DetectOutcome {
    pub findings: Vec<Finding>,
    pub is_timeout: bool,
    pub time_used: Duration,
    pub traversal_rounds: u32,
}

fn split_budget(total: Duration, entries: usize) -> Duration {
    if entries == 0 {
        return total;
    }
    total / u32::try_from(entries).unwrap_or(u32::MAX)
}

fn entry_points(contract: &Contract) -> Vec<&Function> {
    let mut entries: Vec<&Function> = contract.external_functions().collect();
    entries.extend(contract.fallback_function());
    entries
}

/// Runs both rounds over every entry point in `contract`, then filters findings down
/// to `selected_detectors` (names from [`ALL_DETECTOR_NAMES`]).
///
/// `timeout_budget_per_round` is the whole round's wall-clock budget (`solc`'s
/// `--timeout-limit-per-round`, default 60s); each round divides it evenly across its
/// own entry points rather than redistributing dynamically as entries finish early, a
/// simplification from the Python `TimeoutHandler`'s dynamic per-entry reallocation
/// (see `DESIGN.md`).
pub fn run_detect(contract: &Contract, selected_detectors: &[&str], only_run_not_protected: bool, timeout_budget_per_round: Duration) -> DetectOutcome {
    let started = Instant::now();

    let round1_entries = entry_points(contract);
    let round1_options = TraversalOptions {
        timeout_per_round: split_budget(timeout_budget_per_round, round1_entries.len()),
        only_run_not_protected,
        ..TraversalOptions::default()
    };

    let mut get_callback = UniswapGetCallback::new();
    let mut traversal_rounds = 0u32;
    for &entry in &round1_entries {
        get_callback = traversal::run(contract, entry, get_callback, round1_options.clone());
        traversal_rounds += 1;
    }

    let mut round2 = Round2Detectors::default();
    let mut is_timeout = false;

    let mut second_round_entries: Vec<&Function> = entry_points(contract);
    for (selector, _) in get_callback.callback_functions() {
        if let Some(callback_fn) = contract.function_by_selector(*selector) {
            if !matches!(callback_fn.kind, FunctionType::External) {
                second_round_entries.push(callback_fn);
            }
        }
    }

    let round2_options = TraversalOptions {
        timeout_per_round: split_budget(timeout_budget_per_round, second_round_entries.len()),
        only_run_not_protected,
        ..TraversalOptions::default()
    };

    for entry in second_round_entries {
        let before = Instant::now();
        let detectors = traversal::run(contract, entry, round2.into_tuple(), round2_options.clone());
        round2 = Round2Detectors::from_tuple(detectors);
        traversal_rounds += 1;
        if before.elapsed() >= round2_options.timeout_per_round {
            is_timeout = true;
        }
    }

    let mut findings = Vec::new();
    findings.extend(round2.public_callback.results());
    findings.extend(round2.public_hook.results().iter().cloned());
    findings.extend(round2.suicidal_hook.results().iter().cloned());
    findings.extend(round2.upgradable_hook.results().iter().cloned());
    findings.retain(|f| selected_detectors.contains(&f.detector_name));

    DetectOutcome {
        findings,
        is_timeout,
        time_used: started.elapsed(),
        traversal_rounds,
    }
}

/// Parses `-d/--detector`'s comma-separated list, defaulting to every built-in.
pub fn parse_detector_selection(raw: Option<&str>) -> Result<Vec<&'static str>, String> {
    let Some(raw) = raw else {
        return Ok(ALL_DETECTOR_NAMES.to_vec());
    };
    raw.split(',')
        .map(|name| {
            ALL_DETECTOR_NAMES
                .iter()
                .find(|candidate| **candidate == name)
                .copied()
                .ok_or_else(|| format!("unknown detector: {name}"))
        })
        .collect()
}
