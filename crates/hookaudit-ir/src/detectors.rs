//! The built-in vulnerability checks, grounded in `uniscan/detectors/base_detector.py`
//! and the four registered checks in `uniscan/detectors/all_detectors.py`
//! (`UniswapPublicCallback`, `UniswapPublicHook`, `UniswapSuicidalHook`,
//! `UniswapUpgradableHook`), plus the internal-only `UniswapGetCallback` collaborator
//! `UniswapPublicCallback` depends on.
//!
//! Each detector implements [`Detector`] directly rather than going through a shared
//! base class: Rust's trait defaults already give every detector the same no-op
//! `before_instruction`/`after_instruction`/`on_end_of_path` the Python
//! `BaseDetector` spells out by hand, so there's no base-class state left to factor
//! out beyond the `callback_keys` filtering each detector does inline against
//! `K::VALUE`/`state.current_kind()`.
//!
//! Scheduling `UniswapGetCallback` before `UniswapPublicCallback` (§4.7's
//! `traversal_rounds_and_dependency`) is not built into this module: it is simple
//! enough, for exactly one dependency edge among five fixed detectors, for the CLI to
//! run `UniswapGetCallback` over every entry point first and feed its discovered
//! selectors into a second round that also traverses those callback functions as
//! their own entry points. See `DESIGN.md` for the rationale.

use hookaudit_interface::{opcodes, Detector, EvmOp, InstructionKind, InstructionKindType, SourceLoc, TraversalState};

/// How serious a finding is, matching the `severity` field of the detect-mode JSON
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }
}

/// How confident a detector is in a finding, matching the `confidence` field of the
/// detect-mode JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// One reported finding, shaped to match the `detection_results` entries of the
/// detect-mode JSON output one-for-one.
#[derive(Debug, Clone)]
pub struct Finding {
    pub detector_name: &'static str,
    pub vulnerability: &'static str,
    pub external_function: Option<String>,
    /// `None` when the entry point is the fallback/receive function.
    pub function_selector: Option<u32>,
    pub is_fallback: bool,
    pub yul_call_stack: Vec<String>,
    pub source: Option<SourceLoc>,
    pub severity: Severity,
    pub confidence: Confidence,
    pub additional_info: Option<String>,
}

fn entry_point_info<S: TraversalState>(state: &S) -> (Option<String>, Option<u32>, bool) {
    let name = if state.is_fallback_entry() {
        None
    } else {
        Some(state.current_function_name().to_string())
    };
    (name, state.entry_selector(), state.is_fallback_entry())
}

/// Finds the runtime calls matching the pool manager's `lock` signatures and records
/// the callback selector packed into their bytes payload, for
/// [`UniswapPublicCallback`] to check. Internal-only: it contributes no findings of
/// its own.
#[derive(Debug, Default)]
pub struct UniswapGetCallback {
    callback_functions: Vec<(u32, Option<String>)>,
}

const LOCK_BYTES: u32 = 0x8154_8319;
const LOCK_ADDRESS_BYTES: u32 = 0x9ca1_7998;

impl UniswapGetCallback {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The (selector, Solidity name) pairs discovered across every entry point this
    /// detector was run over, deduplicated.
    #[must_use]
    pub fn callback_functions(&self) -> &[(u32, Option<String>)] {
        &self.callback_functions
    }
}

impl Detector for UniswapGetCallback {
    fn before_instruction<K: InstructionKindType, S: TraversalState>(&mut self, state: &mut S) {
        if !state.is_runtime() {
            return;
        }
        let is_call_family = matches!(
            K::VALUE,
            InstructionKind::Evm(EvmOp::Call | EvmOp::Delegatecall | EvmOp::Staticcall | EvmOp::Callcode)
        );
        if !is_call_family {
            return;
        }
        let Some(sig) = state.call_signature() else {
            return;
        };

        let callback_selector = if sig == LOCK_BYTES {
            state.logical_call_arg_selector(0)
        } else if sig == LOCK_ADDRESS_BYTES && state.logical_call_arg_is_self_address(0) {
            state.logical_call_arg_selector(1)
        } else {
            None
        };

        if let Some(selector) = callback_selector.filter(|s| !TRANSFER_FAMILY_SELECTORS.contains(s)) {
            let name = state.function_name_for_selector(selector);
            if !self.callback_functions.iter().any(|(s, _)| *s == selector) {
                self.callback_functions.push((selector, name));
            }
        }
    }
}

/// ERC-20/ERC-721 selectors a callback detector should not treat as a discovered
/// hook callback even if it happens to match the bytes packed into a `lock(bytes)`
/// payload, copied verbatim from `not_consider_protect_standard_selector` (§6's
/// "transfer-family selectors").
const TRANSFER_FAMILY_SELECTORS: &[u32] = &[
    0x1816_0DDD, // totalSupply()
    0x70A0_8231, // balanceOf(address)
    0xA905_9CBB, // transfer(address,uint256)
    0x23B8_72DD, // transferFrom(address,address,uint256)
    0x095E_A7B3, // approve(address,uint256)
    0x4284_2E0E, // safeTransferFrom(address,address,uint256)
    0xB88D_4FDE, // safeTransferFrom(address,address,uint256,bytes)
    0xA22C_B465, // setApprovalForAll(address,bool)
];

/// Flags a callback function (reached only through the pool manager's `lock`) that
/// never checks `msg.sender == address(this)` before running, grounded in
/// `uniswap_public_callback.py`.
///
/// Takes no knowledge of [`UniswapGetCallback`]'s results itself beyond the selector
/// the current traversal entered at, which [`TraversalState::entry_selector`] already
/// gives it; it is the caller's job to run this detector once per callback function
/// [`UniswapGetCallback`] discovered, using the same selector as the entry point.
///
/// Mirrors the Python source's two-pass shape: a path ending without having seen the
/// self-check is only a *candidate* finding, kept pending rather than reported
/// immediately, because a later path for the same selector might still exhibit the
/// self-check and clear it. [`Self::results`] resolves candidates against the final
/// self-check set, matching `get_internal_result`'s late filter.
#[derive(Debug, Default)]
pub struct UniswapPublicCallback {
    self_checked: std::collections::HashSet<u32>,
    pending: std::collections::HashMap<u32, Finding>,
}

impl UniswapPublicCallback {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn results(&self) -> Vec<Finding> {
        self.pending
            .iter()
            .filter(|(selector, _)| !self.self_checked.contains(selector))
            .map(|(_, finding)| finding.clone())
            .collect()
    }
}

fn is_caller_eq_address<S: TraversalState>(state: &S) -> bool {
    if state.current_operand_count() != 2 {
        return false;
    }
    let a = state.raw_operand_origin_opcode(0);
    let b = state.raw_operand_origin_opcode(1);
    matches!(
        (a, b),
        (Some(EvmOp::Caller), Some(EvmOp::Address)) | (Some(EvmOp::Address), Some(EvmOp::Caller))
    )
}

impl Detector for UniswapPublicCallback {
    fn before_instruction<K: InstructionKindType, S: TraversalState>(&mut self, state: &mut S) {
        if !state.is_runtime() {
            return;
        }
        let Some(selector) = state.entry_selector() else {
            return;
        };
        if K::VALUE == InstructionKind::Evm(EvmOp::Eq)
            && !self.self_checked.contains(&selector)
            && is_caller_eq_address(state)
        {
            self.self_checked.insert(selector);
        }
    }

    fn on_end_of_path<S: TraversalState>(&mut self, state: &mut S) {
        if !state.is_runtime() {
            return;
        }
        let Some(selector) = state.entry_selector() else {
            return;
        };
        if self.pending.contains_key(&selector) || !state.entry_mutable_or_payable() {
            return;
        }
        let (external_function, function_selector, is_fallback) = entry_point_info(state);
        self.pending.insert(
            selector,
            Finding {
                detector_name: "UniswapPublicCallback",
                vulnerability: "unprotected Uniswap v4 hook callback",
                external_function,
                function_selector,
                is_fallback,
                yul_call_stack: state.call_stack_names(),
                source: state.current_source(),
                severity: Severity::High,
                confidence: Confidence::High,
                additional_info: None,
            },
        );
    }
}

/// The pre/post hook selectors across both retrieved hook-interface generations plus
/// the two `lockAcquired` variants, copied verbatim from the selector table referenced
/// by the detector that consumes it (§6's "dispatcher selector table").
const PUBLIC_HOOK_SELECTORS: &[u32] = &[
    // hooks at 3b724503d4c3fa4872ac0b4f9b12f694774224a4
    0x43C4_407E, // afterDonate(address,(address,address,uint24,int24,address),uint256,uint256)
    0x6FE7_E6EB, // afterInitialize(address,(address,address,uint24,int24,address),uint160,int24)
    0x0E20_59F5, // afterModifyPosition(address,(address,address,uint24,int24,address),(int24,int24,int256),int256)
    0xA5AA_370A, // afterSwap(address,(address,address,uint24,int24,address),(bool,int256,uint160),int256)
    0x4DBB_99A6, // beforeDonate(address,(address,address,uint24,int24,address),uint256,uint256)
    0xDC98_354E, // beforeInitialize(address,(address,address,uint24,int24,address),uint160)
    0x0DBE_5DBD, // beforeModifyPosition(address,(address,address,uint24,int24,address),(int24,int24,int256))
    0xB3F9_7F80, // beforeSwap(address,(address,address,uint24,int24,address),(bool,int256,uint160))
    // hooks at 06564d33b2fa6095830c914461ee64d34d39c305
    0xE1B4_AF69, // afterDonate(address,(address,address,uint24,int24,address),uint256,uint256,bytes)
    0xA910_F80F, // afterInitialize(address,(address,address,uint24,int24,address),uint160,int24,bytes)
    0x30B7_CDEF, // afterModifyPosition(address,(address,address,uint24,int24,address),(int24,int24,int256),int256,bytes)
    0xB47B_2FB1, // afterSwap(address,(address,address,uint24,int24,address),(bool,int256,uint160),int256,bytes)
    0xB6A8_B0FA, // beforeDonate(address,(address,address,uint24,int24,address),uint256,uint256,bytes)
    0x3440_D820, // beforeInitialize(address,(address,address,uint24,int24,address),uint160,bytes)
    0xFE9A_6F45, // beforeModifyPosition(address,(address,address,uint24,int24,address),(int24,int24,int256),bytes)
    0x575E_24B4, // beforeSwap(address,(address,address,uint24,int24,address),(bool,int256,uint160),bytes)
    // other functions
    0xAB62_91FE, // lockAcquired(bytes)
    0x15C7_AFB4, // lockAcquired(address,bytes)
];

/// Flags an unrestricted entry point matching the hook allow-list, grounded in
/// `uniswap_public_hook.py`.
#[derive(Debug, Default)]
pub struct UniswapPublicHook {
    findings: Vec<Finding>,
    reported: std::collections::HashSet<u32>,
}

impl UniswapPublicHook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn results(&self) -> &[Finding] {
        &self.findings
    }
}

impl Detector for UniswapPublicHook {
    fn on_end_of_path<S: TraversalState>(&mut self, state: &mut S) {
        if !state.is_runtime() || state.terminated_by_revert() || state.is_protected() {
            return;
        }
        let Some(selector) = state.entry_selector() else {
            return;
        };
        if !PUBLIC_HOOK_SELECTORS.contains(&selector) {
            return;
        }
        if !state.entry_mutable_or_payable() {
            return;
        }
        if !self.reported.insert(selector) {
            return;
        }
        let (external_function, function_selector, is_fallback) = entry_point_info(state);
        self.findings.push(Finding {
            detector_name: "UniswapPublicHook",
            vulnerability: "unrestricted Uniswap v4 hook caller",
            external_function,
            function_selector,
            is_fallback,
            yul_call_stack: state.call_stack_names(),
            source: state.current_source(),
            severity: Severity::High,
            confidence: Confidence::High,
            additional_info: None,
        });
    }
}

/// Flags any reachable `SELFDESTRUCT` in runtime code, grounded in
/// `uniswap_suicidal_hook.py`.
#[derive(Debug, Default)]
pub struct UniswapSuicidalHook {
    findings: Vec<Finding>,
}

impl UniswapSuicidalHook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn results(&self) -> &[Finding] {
        &self.findings
    }
}

impl Detector for UniswapSuicidalHook {
    fn before_instruction<K: InstructionKindType, S: TraversalState>(&mut self, state: &mut S) {
        if K::VALUE != InstructionKind::Evm(EvmOp::Selfdestruct) || !state.is_runtime() {
            return;
        }
        let (external_function, function_selector, is_fallback) = entry_point_info(state);
        self.findings.push(Finding {
            detector_name: "UniswapSuicidalHook",
            vulnerability: "containing self-destruct",
            external_function,
            function_selector,
            is_fallback,
            yul_call_stack: state.call_stack_names(),
            source: state.current_source(),
            severity: Severity::Medium,
            confidence: Confidence::High,
            additional_info: None,
        });
    }
}

/// Flags a `DELEGATECALL` whose target address is read from storage or decoded
/// straight off calldata/memory, grounded in `uniswap_upgradable_hook.py`.
#[derive(Debug, Default)]
pub struct UniswapUpgradableHook {
    findings: Vec<Finding>,
}

impl UniswapUpgradableHook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn results(&self) -> &[Finding] {
        &self.findings
    }
}

impl Detector for UniswapUpgradableHook {
    fn before_instruction<K: InstructionKindType, S: TraversalState>(&mut self, state: &mut S) {
        if K::VALUE != InstructionKind::Evm(EvmOp::Delegatecall) || !state.is_runtime() {
            return;
        }
        // DELEGATECALL args: [gas, addr, argsOffset, argsLength, retOffset, retLength].
        if !state.raw_operand_is_mutable_source(1) {
            return;
        }
        let (external_function, function_selector, is_fallback) = entry_point_info(state);
        self.findings.push(Finding {
            detector_name: "UniswapUpgradableHook",
            vulnerability: "containing delegate-call to mutable addresses",
            external_function,
            function_selector,
            is_fallback,
            yul_call_stack: state.call_stack_names(),
            source: state.current_source(),
            severity: Severity::High,
            confidence: Confidence::High,
            additional_info: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct FakeState {
        kind: InstructionKind,
        runtime: bool,
        selector: Option<u32>,
        fallback: bool,
        mutable_or_payable: bool,
        protected: bool,
        reverted: bool,
        operand_opcodes: Vec<Option<EvmOp>>,
        mutable_source: Vec<bool>,
    }

    impl Default for FakeState {
        fn default() -> Self {
            Self {
                kind: InstructionKind::Evm(EvmOp::Stop),
                runtime: false,
                selector: None,
                fallback: false,
                mutable_or_payable: false,
                protected: false,
                reverted: false,
                operand_opcodes: Vec::new(),
                mutable_source: Vec::new(),
            }
        }
    }

    impl TraversalState for FakeState {
        fn current_kind(&self) -> InstructionKind {
            self.kind
        }
        fn current_taints(&self) -> Vec<hookaudit_interface::Taint> {
            vec![]
        }
        fn taint_current(&mut self, _taint: hookaudit_interface::Taint) {}
        fn is_tainted_by(&self, _label: &str) -> bool {
            false
        }
        fn is_protected(&self) -> bool {
            self.protected
        }
        fn terminated_by_revert(&self) -> bool {
            self.reverted
        }
        fn call_stack_names(&self) -> Vec<String> {
            vec![]
        }
        fn current_function_name(&self) -> &str {
            "beforeSwap"
        }
        fn entry_selector(&self) -> Option<u32> {
            self.selector
        }
        fn is_fallback_entry(&self) -> bool {
            self.fallback
        }
        fn mark_protected(&mut self) {
            self.protected = true;
        }
        fn is_runtime(&self) -> bool {
            self.runtime
        }
        fn entry_mutable_or_payable(&self) -> bool {
            self.mutable_or_payable
        }
        fn current_operand_count(&self) -> usize {
            self.operand_opcodes.len()
        }
        fn raw_operand_is_mutable_source(&self, index: usize) -> bool {
            self.mutable_source.get(index).copied().unwrap_or(false)
        }
        fn raw_operand_is_self_address(&self, _index: usize) -> bool {
            false
        }
        fn raw_operand_origin_opcode(&self, index: usize) -> Option<EvmOp> {
            self.operand_opcodes.get(index).copied().flatten()
        }
        fn call_signature(&self) -> Option<u32> {
            None
        }
        fn logical_call_arg_selector(&self, _index: usize) -> Option<u32> {
            None
        }
        fn logical_call_arg_is_self_address(&self, _index: usize) -> bool {
            false
        }
        fn current_source(&self) -> Option<SourceLoc> {
            None
        }
        fn function_name_for_selector(&self, _selector: u32) -> Option<String> {
            None
        }
    }

    #[test]
    fn suicidal_hook_reports_reachable_selfdestruct() {
        let mut detector = UniswapSuicidalHook::new();
        let mut state = FakeState {
            runtime: true,
            ..FakeState::default()
        };
        detector.before_instruction::<opcodes::evm::Selfdestruct, _>(&mut state);
        assert_eq!(detector.results().len(), 1);
        assert_eq!(detector.results()[0].severity.as_str(), "medium");
    }

    #[test]
    fn suicidal_hook_ignores_creation_code() {
        let mut detector = UniswapSuicidalHook::new();
        let mut state = FakeState {
            runtime: false,
            ..FakeState::default()
        };
        detector.before_instruction::<opcodes::evm::Selfdestruct, _>(&mut state);
        assert!(detector.results().is_empty());
    }

    #[test]
    fn upgradable_hook_flags_storage_backed_target() {
        let mut detector = UniswapUpgradableHook::new();
        let mut state = FakeState {
            runtime: true,
            mutable_source: vec![false, true],
            ..FakeState::default()
        };
        detector.before_instruction::<opcodes::evm::Delegatecall, _>(&mut state);
        assert_eq!(detector.results().len(), 1);
    }

    #[test]
    fn upgradable_hook_ignores_immutable_target() {
        let mut detector = UniswapUpgradableHook::new();
        let mut state = FakeState {
            runtime: true,
            mutable_source: vec![false, false],
            ..FakeState::default()
        };
        detector.before_instruction::<opcodes::evm::Delegatecall, _>(&mut state);
        assert!(detector.results().is_empty());
    }

    #[test]
    fn public_hook_reports_unrestricted_allow_listed_selector() {
        let mut detector = UniswapPublicHook::new();
        let mut state = FakeState {
            runtime: true,
            selector: Some(0xb3f9_7f80),
            mutable_or_payable: true,
            ..FakeState::default()
        };
        detector.on_end_of_path(&mut state);
        assert_eq!(detector.results().len(), 1);
        assert_eq!(detector.results()[0].function_selector, Some(0xb3f9_7f80));
    }

    #[test]
    fn public_hook_skips_protected_path() {
        let mut detector = UniswapPublicHook::new();
        let mut state = FakeState {
            runtime: true,
            selector: Some(0xb3f9_7f80),
            mutable_or_payable: true,
            protected: true,
            ..FakeState::default()
        };
        detector.on_end_of_path(&mut state);
        assert!(detector.results().is_empty());
    }

    #[test]
    fn public_hook_dedupes_across_paths() {
        let mut detector = UniswapPublicHook::new();
        let mut state = FakeState {
            runtime: true,
            selector: Some(0xb3f9_7f80),
            mutable_or_payable: true,
            ..FakeState::default()
        };
        detector.on_end_of_path(&mut state);
        detector.on_end_of_path(&mut state);
        assert_eq!(detector.results().len(), 1);
    }

    #[test]
    fn public_callback_requires_self_check() {
        let mut detector = UniswapPublicCallback::new();
        let mut eq_state = FakeState {
            runtime: true,
            kind: InstructionKind::Evm(EvmOp::Eq),
            selector: Some(0x1234_5678),
            operand_opcodes: vec![Some(EvmOp::Caller), Some(EvmOp::Address)],
            ..FakeState::default()
        };
        detector.before_instruction::<opcodes::evm::Eq, _>(&mut eq_state);

        let mut end_state = FakeState {
            runtime: true,
            selector: Some(0x1234_5678),
            mutable_or_payable: true,
            ..FakeState::default()
        };
        detector.on_end_of_path(&mut end_state);
        assert!(detector.results().is_empty());
    }

    #[test]
    fn public_callback_reports_missing_self_check() {
        let mut detector = UniswapPublicCallback::new();
        let mut end_state = FakeState {
            runtime: true,
            selector: Some(0x1234_5678),
            mutable_or_payable: true,
            ..FakeState::default()
        };
        detector.on_end_of_path(&mut end_state);
        assert_eq!(detector.results().len(), 1);
    }
}
