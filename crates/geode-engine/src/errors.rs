//! The typed failure taxonomy.
//!
//! Every failure in the dispatch/registry core is synchronous, carries
//! its parameters, and aborts the enclosing call with full rollback.
//! Callers (including test harnesses) assert on the cause, not on a
//! generic failure, so each variant has a stable string code that is
//! never reused or renamed once assigned.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::selector::Selector;
use crate::word::Word;

// ---------------------------------------------------------------------------
// EngineError — the call-surface taxonomy
// ---------------------------------------------------------------------------

/// A typed, parameter-carrying failure. Surfaces to the original caller
/// as the revert value of the whole call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineError {
    /// Add targeted a selector that is already bound.
    SelectorAlreadyBound { selector: Selector, facet: Address },
    /// Replace or Remove targeted a selector with no current binding.
    SelectorNotBound { selector: Selector },
    /// A candidate facet (or init target) holds no executable code.
    FacetHasNoCode { facet: Address },
    /// Replace target equals the selector's current binding.
    ReplaceFacetMustDiffer { selector: Selector, facet: Address },
    /// Remove cuts signal intent with the zero address; anything else is
    /// a malformed batch, not a request.
    RemoveTargetMustBeZero { target: Address },
    /// A cut entry carried no selectors.
    EmptySelectorList { target: Address },
    /// The batch exceeds the published cut-entry bound.
    TooManyCuts { count: usize, max: usize },
    /// One cut entry exceeds the published selector bound.
    TooManySelectors { count: usize, max: usize },
    /// An action byte outside {0, 1, 2}.
    InvalidCutAction { value: u8 },
    /// Init target and init data disagree: a zero target with non-empty
    /// data (or the reverse, an empty payload for a real target).
    InvalidInitializationParameters {
        init_target: Address,
        init_data_len: usize,
    },
    /// Dispatch found no binding and no fallback facet is configured.
    NoSelectorMatch { selector: Selector },
    /// Beacon resolution failed: the beacon holds no code, the
    /// resolution call reverted, or the response was not an address.
    FetchImplementationFailed { beacon: Address, detail: String },
    /// An entry-point payload failed strict decoding.
    MalformedCallData { detail: String },
    /// The call target holds no code at all.
    CodeMissing { address: Address },
    /// An address already holds code; deployments never overwrite.
    CodeAlreadyDeployed { address: Address },
    /// Nested calls exceeded the depth bound.
    CallDepthExceeded { depth: usize, max: usize },
    /// A guarded entry point was re-entered while its lock was held.
    ReentrantCall { guard_slot: Word },
    /// The caller failed the mutation authorization gate.
    CallerNotAuthorized { caller: Address },
}

impl EngineError {
    /// Stable machine-readable code. Append-only: codes are permanent
    /// and never reused.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SelectorAlreadyBound { .. } => "selector_already_bound",
            Self::SelectorNotBound { .. } => "selector_not_bound",
            Self::FacetHasNoCode { .. } => "facet_has_no_code",
            Self::ReplaceFacetMustDiffer { .. } => "replace_facet_must_differ",
            Self::RemoveTargetMustBeZero { .. } => "remove_target_must_be_zero",
            Self::EmptySelectorList { .. } => "empty_selector_list",
            Self::TooManyCuts { .. } => "too_many_cuts",
            Self::TooManySelectors { .. } => "too_many_selectors",
            Self::InvalidCutAction { .. } => "invalid_cut_action",
            Self::InvalidInitializationParameters { .. } => "invalid_initialization_parameters",
            Self::NoSelectorMatch { .. } => "no_selector_match",
            Self::FetchImplementationFailed { .. } => "fetch_implementation_failed",
            Self::MalformedCallData { .. } => "malformed_call_data",
            Self::CodeMissing { .. } => "code_missing",
            Self::CodeAlreadyDeployed { .. } => "code_already_deployed",
            Self::CallDepthExceeded { .. } => "call_depth_exceeded",
            Self::ReentrantCall { .. } => "reentrant_call",
            Self::CallerNotAuthorized { .. } => "caller_not_authorized",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelectorAlreadyBound { selector, facet } => {
                write!(f, "selector {selector} is already bound to facet {facet}")
            }
            Self::SelectorNotBound { selector } => {
                write!(f, "selector {selector} has no current binding")
            }
            Self::FacetHasNoCode { facet } => {
                write!(f, "facet {facet} holds no executable code")
            }
            Self::ReplaceFacetMustDiffer { selector, facet } => {
                write!(
                    f,
                    "replace for selector {selector} names its current facet {facet}"
                )
            }
            Self::RemoveTargetMustBeZero { target } => {
                write!(f, "remove cut carries non-zero target {target}")
            }
            Self::EmptySelectorList { target } => {
                write!(f, "cut entry for {target} carries no selectors")
            }
            Self::TooManyCuts { count, max } => {
                write!(f, "batch has {count} cut entries, limit is {max}")
            }
            Self::TooManySelectors { count, max } => {
                write!(f, "cut entry has {count} selectors, limit is {max}")
            }
            Self::InvalidCutAction { value } => {
                write!(f, "invalid cut action byte {value}")
            }
            Self::InvalidInitializationParameters {
                init_target,
                init_data_len,
            } => write!(
                f,
                "init parameters disagree: target {init_target}, {init_data_len} data bytes"
            ),
            Self::NoSelectorMatch { selector } => {
                write!(f, "no facet bound for selector {selector} and no fallback")
            }
            Self::FetchImplementationFailed { beacon, detail } => {
                write!(f, "beacon {beacon} resolution failed: {detail}")
            }
            Self::MalformedCallData { detail } => {
                write!(f, "malformed call data: {detail}")
            }
            Self::CodeMissing { address } => {
                write!(f, "no code deployed at {address}")
            }
            Self::CodeAlreadyDeployed { address } => {
                write!(f, "code already deployed at {address}")
            }
            Self::CallDepthExceeded { depth, max } => {
                write!(f, "call depth {depth} exceeds limit {max}")
            }
            Self::ReentrantCall { guard_slot } => {
                write!(f, "reentrant call while guard at {guard_slot} is held")
            }
            Self::CallerNotAuthorized { caller } => {
                write!(f, "caller {caller} is not authorized to mutate")
            }
        }
    }
}

impl std::error::Error for EngineError {}
