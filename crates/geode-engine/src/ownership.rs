//! Ownership storage and the mutation authorization boundary.
//!
//! Who may mutate a registry is policy, supplied from outside the core
//! through the [`AuthorizationGate`] trait. The default gate compares
//! the caller against an owner address kept at its own namespace slot,
//! so the authority survives facet upgrades like any other persistent
//! state. The ownership entry points themselves ship as a bindable
//! facet rather than diamond built-ins.

use crate::address::Address;
use crate::errors::EngineError;
use crate::events::EngineEvent;
use crate::host::{CallContext, ContractCode, Host};
use crate::selector::Selector;
use crate::slot_derivation::namespace_slot;
use crate::storage::AccountStorage;
use crate::wire::{Decoder, Encoder, WireError};
use crate::word::Word;

/// Namespace seed of the owner slot.
pub const OWNER_NAMESPACE: &str = "geode.storage.owner";

pub const OWNER_SIGNATURE: &str = "owner()";
pub const TRANSFER_OWNERSHIP_SIGNATURE: &str = "transferOwnership(address)";

/// The owner slot, derived from the published seed.
pub fn owner_slot() -> Word {
    namespace_slot(OWNER_NAMESPACE)
}

pub fn owner_selector() -> Selector {
    Selector::of(OWNER_SIGNATURE)
}

pub fn transfer_ownership_selector() -> Selector {
    Selector::of(TRANSFER_OWNERSHIP_SIGNATURE)
}

/// Read the stored owner; zero when never set.
pub fn read_owner(storage: &AccountStorage) -> Address {
    Address::from_word(storage.load(owner_slot())).unwrap_or(Address::ZERO)
}

/// Overwrite the stored owner.
pub fn write_owner(storage: &mut AccountStorage, owner: Address) {
    storage.store(owner_slot(), owner.to_word());
}

// ---------------------------------------------------------------------------
// AuthorizationGate — the collaborator boundary
// ---------------------------------------------------------------------------

/// Decides whether a caller may mutate the registry it is aimed at. The
/// gate sees the mutated account's storage so policies can be
/// storage-resident.
pub trait AuthorizationGate: std::fmt::Debug + Send + Sync {
    fn authorize(&self, storage: &AccountStorage, caller: Address) -> Result<(), EngineError>;
}

/// Gate that admits only the address in the owner slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageOwnerGate;

impl AuthorizationGate for StorageOwnerGate {
    fn authorize(&self, storage: &AccountStorage, caller: Address) -> Result<(), EngineError> {
        if read_owner(storage) == caller {
            Ok(())
        } else {
            Err(EngineError::CallerNotAuthorized { caller })
        }
    }
}

/// Gate that admits everyone. Test and sandbox use.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveGate;

impl AuthorizationGate for PermissiveGate {
    fn authorize(&self, _storage: &AccountStorage, _caller: Address) -> Result<(), EngineError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OwnershipFacet — bindable entry points
// ---------------------------------------------------------------------------

fn wire_err(err: WireError) -> EngineError {
    EngineError::MalformedCallData {
        detail: err.to_string(),
    }
}

/// Facet exposing `owner()` and `transferOwnership(address)`. Runs under
/// delegated execution, so it reads and writes the *calling* contract's
/// owner slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipFacet;

impl ContractCode for OwnershipFacet {
    fn call(&self, host: &mut Host, ctx: &CallContext) -> Result<Vec<u8>, EngineError> {
        let selector = ctx.selector().ok_or(EngineError::NoSelectorMatch {
            selector: Selector::ZERO,
        })?;
        if selector == owner_selector() {
            Decoder::new(ctx.payload()).finish().map_err(wire_err)?;
            let owner = read_owner(host.storage(ctx.storage_owner));
            let mut enc = Encoder::new();
            enc.write_address(owner);
            Ok(enc.finish())
        } else if selector == transfer_ownership_selector() {
            let mut dec = Decoder::new(ctx.payload());
            let new_owner = dec.read_address().map_err(wire_err)?;
            dec.finish().map_err(wire_err)?;

            let previous_owner = read_owner(host.storage(ctx.storage_owner));
            if ctx.caller != previous_owner {
                return Err(EngineError::CallerNotAuthorized { caller: ctx.caller });
            }
            write_owner(host.storage_mut(ctx.storage_owner), new_owner);
            host.emit(
                ctx.storage_owner,
                EngineEvent::OwnershipTransferred {
                    previous_owner,
                    new_owner,
                },
            );
            Ok(Vec::new())
        } else {
            Err(EngineError::NoSelectorMatch { selector })
        }
    }
}
