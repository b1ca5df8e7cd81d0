//! The batch mutation engine for the facet registry.
//!
//! A cut is an ordered batch of Add / Replace / Remove entries applied
//! sequentially, followed by an optional one-shot delegated
//! initialization. The whole thing commits or none of it does: the
//! engine runs inside a host call frame, and any typed failure at entry
//! `k` unwinds bindings `1..k-1` along with everything else the frame
//! touched. There is no partial-apply state to reason about.
//!
//! Validation happens per selector, in array order, so a batch that
//! touches the same selector twice resolves to whatever the last entry
//! asked for.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::errors::EngineError;
use crate::events::EngineEvent;
use crate::facet_registry::{FacetRegistryView, FacetRegistryWriter};
use crate::host::{CallContext, Host};
use crate::selector::Selector;
use crate::wire::{Decoder, Encoder, WireError};

/// Most cut entries one batch may carry.
pub const MAX_CUTS_PER_BATCH: usize = 128;

/// Most selectors one cut entry may carry.
pub const MAX_SELECTORS_PER_CUT: usize = 256;

/// Most init-data bytes accepted over the wire.
pub const MAX_INIT_DATA_BYTES: usize = 8192;

/// Canonical signature of the mutation entry point.
pub const CUT_SIGNATURE: &str = "diamondCut((address,uint8,bytes4[])[],address,bytes)";

/// Selector of the mutation entry point.
pub fn cut_selector() -> Selector {
    Selector::of(CUT_SIGNATURE)
}

// ---------------------------------------------------------------------------
// CutAction / FacetCut
// ---------------------------------------------------------------------------

/// What one cut entry does to its selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CutAction {
    Add,
    Replace,
    Remove,
}

impl CutAction {
    /// Wire byte, per the published encoding.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Replace => 1,
            Self::Remove => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Add),
            1 => Some(Self::Replace),
            2 => Some(Self::Remove),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for CutAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One batch entry: a target facet, an action, and the selectors it
/// applies to. Ephemeral input, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCut {
    pub target: Address,
    pub action: CutAction,
    pub selectors: Vec<Selector>,
}

// ---------------------------------------------------------------------------
// Batch application
// ---------------------------------------------------------------------------

/// Apply a cut batch against the frame's storage owner.
///
/// Must run inside an executing call frame: atomicity is the frame's
/// rollback, which is why this is crate-private and only reachable
/// through the diamond and beacon entry points.
pub(crate) fn apply_cut(
    host: &mut Host,
    ctx: &CallContext,
    cuts: &[FacetCut],
    init_target: Address,
    init_data: &[u8],
) -> Result<(), EngineError> {
    if cuts.len() > MAX_CUTS_PER_BATCH {
        return Err(EngineError::TooManyCuts {
            count: cuts.len(),
            max: MAX_CUTS_PER_BATCH,
        });
    }
    for cut in cuts {
        if cut.selectors.is_empty() {
            return Err(EngineError::EmptySelectorList { target: cut.target });
        }
        if cut.selectors.len() > MAX_SELECTORS_PER_CUT {
            return Err(EngineError::TooManySelectors {
                count: cut.selectors.len(),
                max: MAX_SELECTORS_PER_CUT,
            });
        }
        match cut.action {
            CutAction::Add => apply_add(host, ctx.storage_owner, cut)?,
            CutAction::Replace => apply_replace(host, ctx.storage_owner, cut)?,
            CutAction::Remove => apply_remove(host, ctx.storage_owner, cut)?,
        }
    }
    host.emit(
        ctx.storage_owner,
        EngineEvent::DiamondCut {
            cuts: cuts.to_vec(),
            init_target,
            init_data: init_data.to_vec(),
        },
    );
    run_initializer(host, ctx, init_target, init_data)
}

fn apply_add(host: &mut Host, owner: Address, cut: &FacetCut) -> Result<(), EngineError> {
    for &selector in &cut.selectors {
        let existing = FacetRegistryView::at(host.storage(owner)).facet_of(selector);
        if let Some(facet) = existing {
            return Err(EngineError::SelectorAlreadyBound { selector, facet });
        }
        if !host.has_code(cut.target) {
            return Err(EngineError::FacetHasNoCode { facet: cut.target });
        }
        FacetRegistryWriter::at(host.storage_mut(owner)).bind(selector, cut.target);
    }
    Ok(())
}

fn apply_replace(host: &mut Host, owner: Address, cut: &FacetCut) -> Result<(), EngineError> {
    for &selector in &cut.selectors {
        let current = FacetRegistryView::at(host.storage(owner))
            .facet_of(selector)
            .ok_or(EngineError::SelectorNotBound { selector })?;
        if !host.has_code(cut.target) {
            return Err(EngineError::FacetHasNoCode { facet: cut.target });
        }
        if current == cut.target {
            return Err(EngineError::ReplaceFacetMustDiffer {
                selector,
                facet: cut.target,
            });
        }
        FacetRegistryWriter::at(host.storage_mut(owner)).rebind(selector, cut.target);
    }
    Ok(())
}

fn apply_remove(host: &mut Host, owner: Address, cut: &FacetCut) -> Result<(), EngineError> {
    if !cut.target.is_zero() {
        return Err(EngineError::RemoveTargetMustBeZero { target: cut.target });
    }
    for &selector in &cut.selectors {
        FacetRegistryWriter::at(host.storage_mut(owner))
            .unbind(selector)
            .ok_or(EngineError::SelectorNotBound { selector })?;
    }
    Ok(())
}

fn run_initializer(
    host: &mut Host,
    ctx: &CallContext,
    init_target: Address,
    init_data: &[u8],
) -> Result<(), EngineError> {
    if init_target.is_zero() {
        if !init_data.is_empty() {
            return Err(EngineError::InvalidInitializationParameters {
                init_target,
                init_data_len: init_data.len(),
            });
        }
        return Ok(());
    }
    if init_data.is_empty() {
        return Err(EngineError::InvalidInitializationParameters {
            init_target,
            init_data_len: 0,
        });
    }
    if !host.has_code(init_target) {
        return Err(EngineError::FacetHasNoCode { facet: init_target });
    }
    host.delegate_call(ctx, init_target, init_data.to_vec())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Wire encoding of the cut entry point
// ---------------------------------------------------------------------------

fn wire_err(err: WireError) -> EngineError {
    EngineError::MalformedCallData {
        detail: err.to_string(),
    }
}

/// Encode a cut payload (calldata minus the leading selector).
pub fn encode_cut_call(
    cuts: &[FacetCut],
    init_target: Address,
    init_data: &[u8],
) -> Result<Vec<u8>, WireError> {
    let mut enc = Encoder::new();
    enc.write_len(cuts.len())?;
    for cut in cuts {
        enc.write_address(cut.target);
        enc.write_u8(cut.action.as_u8());
        enc.write_len(cut.selectors.len())?;
        for selector in &cut.selectors {
            enc.write_selector(*selector);
        }
    }
    enc.write_address(init_target);
    enc.write_bytes(init_data)?;
    Ok(enc.finish())
}

/// Strictly decode a cut payload.
pub fn decode_cut_call(payload: &[u8]) -> Result<(Vec<FacetCut>, Address, Vec<u8>), EngineError> {
    let mut dec = Decoder::new(payload);
    let cut_count = dec.read_len(MAX_CUTS_PER_BATCH).map_err(wire_err)?;
    let mut cuts = Vec::with_capacity(cut_count);
    for _ in 0..cut_count {
        let target = dec.read_address().map_err(wire_err)?;
        let action_byte = dec.read_u8().map_err(wire_err)?;
        let action = CutAction::from_u8(action_byte)
            .ok_or(EngineError::InvalidCutAction { value: action_byte })?;
        let selector_count = dec.read_len(MAX_SELECTORS_PER_CUT).map_err(wire_err)?;
        let mut selectors = Vec::with_capacity(selector_count);
        for _ in 0..selector_count {
            selectors.push(dec.read_selector().map_err(wire_err)?);
        }
        cuts.push(FacetCut {
            target,
            action,
            selectors,
        });
    }
    let init_target = dec.read_address().map_err(wire_err)?;
    let init_data = dec.read_bytes(MAX_INIT_DATA_BYTES).map_err(wire_err)?;
    dec.finish().map_err(wire_err)?;
    Ok((cuts, init_target, init_data))
}
