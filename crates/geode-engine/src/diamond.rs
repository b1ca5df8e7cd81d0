//! The diamond: one deployed address behaving as many facets.
//!
//! The contract's own code handles exactly the registry-owned surfaces:
//! the cut entry point (gated), the loupe and interface-detection
//! queries, and the fallback-facet configuration. Every other selector
//! resolves through the registry and executes the bound facet's code
//! against the diamond's storage, caller, and value; unresolved
//! selectors go to the configured fallback facet or fail
//! `NoSelectorMatch`. Return and failure data propagate verbatim.

use std::sync::Arc;

use crate::address::Address;
use crate::cut_engine::{self, FacetCut};
use crate::errors::EngineError;
use crate::events::EngineEvent;
use crate::facet_registry::{FacetEntry, FacetRegistryView, FacetRegistryWriter};
use crate::host::{CallContext, ContractCode, Host};
use crate::loupe;
use crate::ownership::{self, AuthorizationGate};
use crate::selector::Selector;
use crate::wire::{Decoder, Encoder, WireError};

pub const SET_FALLBACK_FACET_SIGNATURE: &str = "setFallbackFacet(address)";
pub const FALLBACK_FACET_SIGNATURE: &str = "fallbackFacet()";

pub fn set_fallback_facet_selector() -> Selector {
    Selector::of(SET_FALLBACK_FACET_SIGNATURE)
}

pub fn fallback_facet_selector() -> Selector {
    Selector::of(FALLBACK_FACET_SIGNATURE)
}

fn wire_err(err: WireError) -> EngineError {
    EngineError::MalformedCallData {
        detail: err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Diamond
// ---------------------------------------------------------------------------

/// The deployable dispatcher. Construction fixes the authorization
/// collaborator; everything else is storage-resident and survives
/// upgrades.
#[derive(Debug)]
pub struct Diamond {
    gate: Arc<dyn AuthorizationGate>,
}

impl Diamond {
    pub fn new(gate: Arc<dyn AuthorizationGate>) -> Self {
        Self { gate }
    }

    /// Deploy a diamond and seed its account: owner slot written,
    /// interface ids registered, registry empty.
    pub fn deploy(
        host: &mut Host,
        address: Address,
        owner: Address,
        gate: Arc<dyn AuthorizationGate>,
    ) -> Result<(), EngineError> {
        host.deploy(address, Arc::new(Diamond::new(gate)))?;
        let storage = host.storage_mut(address);
        ownership::write_owner(storage, owner);
        let mut writer = FacetRegistryWriter::at(storage);
        writer.register_interface(loupe::erc165_interface_id());
        writer.register_interface(loupe::loupe_interface_id());
        writer.register_interface(cut_engine::cut_selector());
        Ok(())
    }
}

impl ContractCode for Diamond {
    fn call(&self, host: &mut Host, ctx: &CallContext) -> Result<Vec<u8>, EngineError> {
        let Some(selector) = ctx.selector() else {
            // Plain transfer: no selector to resolve, fallback or bust.
            return dispatch_fallback(host, ctx, Selector::ZERO);
        };

        if selector == cut_engine::cut_selector() {
            return handle_cut_entry_point(self.gate.as_ref(), host, ctx);
        }
        if selector == set_fallback_facet_selector() {
            return handle_set_fallback_facet(self.gate.as_ref(), host, ctx);
        }

        let answered = {
            let view = FacetRegistryView::at(host.storage(ctx.storage_owner));
            if selector == fallback_facet_selector() {
                Some(answer_fallback_facet(&view, ctx.payload()))
            } else {
                loupe::answer(&view, selector, ctx.payload())
            }
        };
        if let Some(result) = answered {
            return result;
        }

        dispatch(host, ctx, selector)
    }
}

/// Gated cut entry point, shared with the faceted beacon.
pub(crate) fn handle_cut_entry_point(
    gate: &dyn AuthorizationGate,
    host: &mut Host,
    ctx: &CallContext,
) -> Result<Vec<u8>, EngineError> {
    gate.authorize(host.storage(ctx.storage_owner), ctx.caller)?;
    let (cuts, init_target, init_data) = cut_engine::decode_cut_call(ctx.payload())?;
    cut_engine::apply_cut(host, ctx, &cuts, init_target, &init_data)?;
    Ok(Vec::new())
}

fn handle_set_fallback_facet(
    gate: &dyn AuthorizationGate,
    host: &mut Host,
    ctx: &CallContext,
) -> Result<Vec<u8>, EngineError> {
    gate.authorize(host.storage(ctx.storage_owner), ctx.caller)?;
    let mut dec = Decoder::new(ctx.payload());
    let facet = dec.read_address().map_err(wire_err)?;
    dec.finish().map_err(wire_err)?;
    if !facet.is_zero() && !host.has_code(facet) {
        return Err(EngineError::FacetHasNoCode { facet });
    }
    let previous = FacetRegistryWriter::at(host.storage_mut(ctx.storage_owner)).set_fallback_facet(facet);
    host.emit(
        ctx.storage_owner,
        EngineEvent::FallbackFacetChanged {
            previous,
            current: facet,
        },
    );
    Ok(Vec::new())
}

fn answer_fallback_facet(
    view: &FacetRegistryView<'_>,
    payload: &[u8],
) -> Result<Vec<u8>, EngineError> {
    Decoder::new(payload).finish().map_err(wire_err)?;
    let facet = view.fallback_facet().unwrap_or(Address::ZERO);
    Ok(loupe::encode_address_response(facet))
}

fn dispatch(host: &mut Host, ctx: &CallContext, selector: Selector) -> Result<Vec<u8>, EngineError> {
    let target = FacetRegistryView::at(host.storage(ctx.storage_owner)).facet_of(selector);
    match target {
        Some(facet) => host.delegate_call(ctx, facet, ctx.calldata.clone()),
        None => dispatch_fallback(host, ctx, selector),
    }
}

fn dispatch_fallback(
    host: &mut Host,
    ctx: &CallContext,
    selector: Selector,
) -> Result<Vec<u8>, EngineError> {
    let fallback = FacetRegistryView::at(host.storage(ctx.storage_owner)).fallback_facet();
    match fallback {
        Some(facet) => host.delegate_call(ctx, facet, ctx.calldata.clone()),
        None => Err(EngineError::NoSelectorMatch { selector }),
    }
}

// ---------------------------------------------------------------------------
// DiamondClient — typed encode/call/decode wrapper
// ---------------------------------------------------------------------------

/// Typed client over a deployed diamond (or faceted beacon): encodes the
/// entry-point payloads, performs the call, and decodes responses.
#[derive(Debug, Clone, Copy)]
pub struct DiamondClient {
    pub diamond: Address,
    pub caller: Address,
}

impl DiamondClient {
    pub fn new(diamond: Address, caller: Address) -> Self {
        Self { diamond, caller }
    }

    fn invoke(
        &self,
        host: &mut Host,
        selector: Selector,
        payload: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        host.call(self.caller, self.diamond, 0, selector.calldata(payload))
    }

    /// Submit a cut batch.
    pub fn cut(
        &self,
        host: &mut Host,
        cuts: &[FacetCut],
        init_target: Address,
        init_data: &[u8],
    ) -> Result<(), EngineError> {
        let payload = cut_engine::encode_cut_call(cuts, init_target, init_data).map_err(wire_err)?;
        self.invoke(host, cut_engine::cut_selector(), &payload)?;
        Ok(())
    }

    pub fn facets(&self, host: &mut Host) -> Result<Vec<FacetEntry>, EngineError> {
        let bytes = self.invoke(host, loupe::facets_selector(), &[])?;
        loupe::decode_facets_response(&bytes)
    }

    pub fn facet_addresses(&self, host: &mut Host) -> Result<Vec<Address>, EngineError> {
        let bytes = self.invoke(host, loupe::facet_addresses_selector(), &[])?;
        loupe::decode_addresses_response(&bytes)
    }

    pub fn facet_function_selectors(
        &self,
        host: &mut Host,
        facet: Address,
    ) -> Result<Vec<Selector>, EngineError> {
        let mut enc = Encoder::new();
        enc.write_address(facet);
        let bytes = self.invoke(host, loupe::facet_function_selectors_selector(), &enc.finish())?;
        loupe::decode_selectors_response(&bytes)
    }

    /// Bound facet for a selector; the zero address when unbound.
    pub fn facet_address(
        &self,
        host: &mut Host,
        selector: Selector,
    ) -> Result<Address, EngineError> {
        let mut enc = Encoder::new();
        enc.write_selector(selector);
        let bytes = self.invoke(host, loupe::facet_address_selector(), &enc.finish())?;
        loupe::decode_address_response(&bytes)
    }

    pub fn supports_interface(
        &self,
        host: &mut Host,
        id: Selector,
    ) -> Result<bool, EngineError> {
        let mut enc = Encoder::new();
        enc.write_selector(id);
        let bytes = self.invoke(host, loupe::supports_interface_selector(), &enc.finish())?;
        loupe::decode_bool_response(&bytes)
    }

    pub fn set_fallback_facet(
        &self,
        host: &mut Host,
        facet: Address,
    ) -> Result<(), EngineError> {
        let mut enc = Encoder::new();
        enc.write_address(facet);
        self.invoke(host, set_fallback_facet_selector(), &enc.finish())?;
        Ok(())
    }

    pub fn fallback_facet(&self, host: &mut Host) -> Result<Address, EngineError> {
        let bytes = self.invoke(host, fallback_facet_selector(), &[])?;
        loupe::decode_address_response(&bytes)
    }

    /// `owner()` through dispatch; requires an ownership facet to be
    /// bound.
    pub fn owner(&self, host: &mut Host) -> Result<Address, EngineError> {
        let bytes = self.invoke(host, ownership::owner_selector(), &[])?;
        loupe::decode_address_response(&bytes)
    }

    /// `transferOwnership(address)` through dispatch.
    pub fn transfer_ownership(
        &self,
        host: &mut Host,
        new_owner: Address,
    ) -> Result<(), EngineError> {
        let mut enc = Encoder::new();
        enc.write_address(new_owner);
        self.invoke(host, ownership::transfer_ownership_selector(), &enc.finish())?;
        Ok(())
    }
}
