//! Beacon indirection: one mutation point, many consumers.
//!
//! A beacon is a standalone contract holding its own registry (or a
//! single implementation address) that it is never delegated-to as
//! code. Proxies store only the beacon's address and re-resolve through
//! it on every call, so one registry mutation at the beacon changes
//! resolution for every proxy at its next call. Resolution failure is
//! loud: a beacon with no code, a reverting resolution call, or a
//! malformed response is `FetchImplementationFailed`, never a silent
//! fall-through to caller code.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::errors::EngineError;
use crate::events::EngineEvent;
use crate::host::{CallContext, ContractCode, Host};
use crate::loupe;
use crate::ownership::{self, AuthorizationGate};
use crate::selector::Selector;
use crate::slot_derivation::namespace_slot;
use crate::wire::{Decoder, Encoder, WireError};
use crate::word::Word;
use crate::{cut_engine, diamond, facet_registry::FacetRegistryWriter};

/// Namespace seed of the slot where a proxy keeps its beacon address.
pub const BEACON_NAMESPACE: &str = "geode.storage.beacon";

/// Namespace seed of the slot where a non-faceted beacon keeps its
/// implementation address.
pub const IMPLEMENTATION_NAMESPACE: &str = "geode.storage.beacon-implementation";

pub const IMPLEMENTATION_SIGNATURE: &str = "implementation()";
pub const UPGRADE_TO_SIGNATURE: &str = "upgradeTo(address)";

pub fn beacon_slot() -> Word {
    namespace_slot(BEACON_NAMESPACE)
}

pub fn implementation_slot() -> Word {
    namespace_slot(IMPLEMENTATION_NAMESPACE)
}

pub fn implementation_selector() -> Selector {
    Selector::of(IMPLEMENTATION_SIGNATURE)
}

pub fn upgrade_to_selector() -> Selector {
    Selector::of(UPGRADE_TO_SIGNATURE)
}

fn wire_err(err: WireError) -> EngineError {
    EngineError::MalformedCallData {
        detail: err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// FacetBeacon — a registry without a dispatcher
// ---------------------------------------------------------------------------

/// Beacon carrying a full facet registry. Answers the cut entry point
/// (gated) and the loupe queries; it dispatches nothing, because its
/// job is to be asked, not to execute.
#[derive(Debug)]
pub struct FacetBeacon {
    gate: Arc<dyn AuthorizationGate>,
}

impl FacetBeacon {
    pub fn new(gate: Arc<dyn AuthorizationGate>) -> Self {
        Self { gate }
    }

    /// Deploy a faceted beacon with its owner slot and interface ids
    /// seeded.
    pub fn deploy(
        host: &mut Host,
        address: Address,
        owner: Address,
        gate: Arc<dyn AuthorizationGate>,
    ) -> Result<(), EngineError> {
        host.deploy(address, Arc::new(FacetBeacon::new(gate)))?;
        let storage = host.storage_mut(address);
        ownership::write_owner(storage, owner);
        let mut writer = FacetRegistryWriter::at(storage);
        writer.register_interface(loupe::erc165_interface_id());
        writer.register_interface(loupe::loupe_interface_id());
        writer.register_interface(cut_engine::cut_selector());
        Ok(())
    }
}

impl ContractCode for FacetBeacon {
    fn call(&self, host: &mut Host, ctx: &CallContext) -> Result<Vec<u8>, EngineError> {
        let selector = ctx.selector().ok_or(EngineError::NoSelectorMatch {
            selector: Selector::ZERO,
        })?;
        if selector == cut_engine::cut_selector() {
            return diamond::handle_cut_entry_point(self.gate.as_ref(), host, ctx);
        }
        let view = crate::facet_registry::FacetRegistryView::at(host.storage(ctx.storage_owner));
        match loupe::answer(&view, selector, ctx.payload()) {
            Some(result) => result,
            None => Err(EngineError::NoSelectorMatch { selector }),
        }
    }
}

// ---------------------------------------------------------------------------
// UpgradeableBeacon — one implementation for everyone
// ---------------------------------------------------------------------------

/// Non-faceted beacon: a single implementation address served to every
/// proxy, swapped through a gated `upgradeTo`.
#[derive(Debug)]
pub struct UpgradeableBeacon {
    gate: Arc<dyn AuthorizationGate>,
}

impl UpgradeableBeacon {
    pub fn new(gate: Arc<dyn AuthorizationGate>) -> Self {
        Self { gate }
    }

    /// Deploy with an initial implementation (which must hold code) or
    /// the zero address to start unset.
    pub fn deploy(
        host: &mut Host,
        address: Address,
        owner: Address,
        gate: Arc<dyn AuthorizationGate>,
        implementation: Address,
    ) -> Result<(), EngineError> {
        if !implementation.is_zero() && !host.has_code(implementation) {
            return Err(EngineError::FacetHasNoCode {
                facet: implementation,
            });
        }
        host.deploy(address, Arc::new(UpgradeableBeacon::new(gate)))?;
        let storage = host.storage_mut(address);
        ownership::write_owner(storage, owner);
        if !implementation.is_zero() {
            storage.store(implementation_slot(), implementation.to_word());
            host.emit(address, EngineEvent::BeaconUpgraded { implementation });
        }
        Ok(())
    }
}

impl ContractCode for UpgradeableBeacon {
    fn call(&self, host: &mut Host, ctx: &CallContext) -> Result<Vec<u8>, EngineError> {
        let selector = ctx.selector().ok_or(EngineError::NoSelectorMatch {
            selector: Selector::ZERO,
        })?;
        if selector == implementation_selector() {
            Decoder::new(ctx.payload()).finish().map_err(wire_err)?;
            let implementation = Address::from_word(
                host.storage(ctx.storage_owner).load(implementation_slot()),
            )
            .unwrap_or(Address::ZERO);
            return Ok(loupe::encode_address_response(implementation));
        }
        if selector == upgrade_to_selector() {
            self.gate
                .authorize(host.storage(ctx.storage_owner), ctx.caller)?;
            let mut dec = Decoder::new(ctx.payload());
            let implementation = dec.read_address().map_err(wire_err)?;
            dec.finish().map_err(wire_err)?;
            if !host.has_code(implementation) {
                return Err(EngineError::FacetHasNoCode {
                    facet: implementation,
                });
            }
            host.storage_mut(ctx.storage_owner)
                .store(implementation_slot(), implementation.to_word());
            host.emit(
                ctx.storage_owner,
                EngineEvent::BeaconUpgraded { implementation },
            );
            return Ok(Vec::new());
        }
        Err(EngineError::NoSelectorMatch { selector })
    }
}

// ---------------------------------------------------------------------------
// BeaconProxy — resolve through the beacon, then delegate
// ---------------------------------------------------------------------------

/// How a proxy asks its beacon for code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeaconProxyKind {
    /// Ask `facetAddress(selector)`: per-selector resolution.
    Faceted,
    /// Ask `implementation()`: one implementation for every call.
    Single,
}

/// Proxy that stores only its beacon's address and re-resolves on every
/// call before delegating against its own storage.
#[derive(Debug, Clone, Copy)]
pub struct BeaconProxy {
    kind: BeaconProxyKind,
}

impl BeaconProxy {
    pub fn new(kind: BeaconProxyKind) -> Self {
        Self { kind }
    }
}

/// Deploy a proxy and point it at its beacon.
pub fn deploy_beacon_proxy(
    host: &mut Host,
    proxy: Address,
    beacon: Address,
    kind: BeaconProxyKind,
) -> Result<(), EngineError> {
    host.deploy(proxy, Arc::new(BeaconProxy::new(kind)))?;
    host.storage_mut(proxy).store(beacon_slot(), beacon.to_word());
    Ok(())
}

impl ContractCode for BeaconProxy {
    fn call(&self, host: &mut Host, ctx: &CallContext) -> Result<Vec<u8>, EngineError> {
        let beacon = Address::from_word(host.storage(ctx.storage_owner).load(beacon_slot()))
            .unwrap_or(Address::ZERO);
        if beacon.is_zero() || !host.has_code(beacon) {
            return Err(EngineError::FetchImplementationFailed {
                beacon,
                detail: "beacon address holds no code".to_string(),
            });
        }

        let selector = ctx.selector().unwrap_or(Selector::ZERO);
        let query = match self.kind {
            BeaconProxyKind::Faceted => {
                let mut enc = Encoder::new();
                enc.write_selector(selector);
                loupe::facet_address_selector().calldata(&enc.finish())
            }
            BeaconProxyKind::Single => implementation_selector().calldata(&[]),
        };

        let response = host
            .call(ctx.storage_owner, beacon, 0, query)
            .map_err(|err| EngineError::FetchImplementationFailed {
                beacon,
                detail: err.to_string(),
            })?;
        let implementation =
            loupe::decode_address_response(&response).map_err(|err| {
                EngineError::FetchImplementationFailed {
                    beacon,
                    detail: err.to_string(),
                }
            })?;
        if implementation.is_zero() {
            // The beacon answered; it just has nothing bound here.
            return Err(EngineError::NoSelectorMatch { selector });
        }
        host.delegate_call(ctx, implementation, ctx.calldata.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::{PermissiveGate, StorageOwnerGate};

    #[derive(Debug)]
    struct Echo(Vec<u8>);

    impl ContractCode for Echo {
        fn call(&self, _host: &mut Host, _ctx: &CallContext) -> Result<Vec<u8>, EngineError> {
            Ok(self.0.clone())
        }
    }

    const OWNER: Address = Address([0x0a; 20]);
    const BEACON: Address = Address([0xbb; 20]);
    const PROXY: Address = Address([0xcc; 20]);

    #[test]
    fn upgradeable_beacon_serves_and_swaps_implementation() {
        let mut host = Host::new();
        let v1 = Address::from_low_u64(1);
        let v2 = Address::from_low_u64(2);
        host.deploy(v1, Arc::new(Echo(vec![1]))).expect("deploy");
        host.deploy(v2, Arc::new(Echo(vec![2]))).expect("deploy");
        UpgradeableBeacon::deploy(&mut host, BEACON, OWNER, Arc::new(StorageOwnerGate), v1)
            .expect("beacon");

        let response = host
            .call(OWNER, BEACON, 0, implementation_selector().calldata(&[]))
            .expect("query");
        assert_eq!(
            loupe::decode_address_response(&response).expect("decode"),
            v1
        );

        let mut enc = Encoder::new();
        enc.write_address(v2);
        host.call(OWNER, BEACON, 0, upgrade_to_selector().calldata(&enc.finish()))
            .expect("upgrade");
        let response = host
            .call(OWNER, BEACON, 0, implementation_selector().calldata(&[]))
            .expect("query");
        assert_eq!(
            loupe::decode_address_response(&response).expect("decode"),
            v2
        );
        assert_eq!(host.events().len(), 2);
    }

    #[test]
    fn upgrade_is_gated_and_requires_code() {
        let mut host = Host::new();
        let v1 = Address::from_low_u64(1);
        host.deploy(v1, Arc::new(Echo(vec![1]))).expect("deploy");
        UpgradeableBeacon::deploy(&mut host, BEACON, OWNER, Arc::new(StorageOwnerGate), v1)
            .expect("beacon");

        let mut enc = Encoder::new();
        enc.write_address(Address::from_low_u64(0xdead));
        let err = host
            .call(OWNER, BEACON, 0, upgrade_to_selector().calldata(&enc.finish()))
            .expect_err("ghost implementation");
        assert_eq!(err.code(), "facet_has_no_code");

        let mut enc = Encoder::new();
        enc.write_address(v1);
        let err = host
            .call(
                Address::from_low_u64(0xbad),
                BEACON,
                0,
                upgrade_to_selector().calldata(&enc.finish()),
            )
            .expect_err("stranger");
        assert_eq!(err.code(), "caller_not_authorized");
    }

    #[test]
    fn single_proxy_delegates_against_its_own_storage() {
        #[derive(Debug)]
        struct SlotReader;

        impl ContractCode for SlotReader {
            fn call(&self, host: &mut Host, ctx: &CallContext) -> Result<Vec<u8>, EngineError> {
                let word = host.storage(ctx.storage_owner).load(Word::from_u64(5));
                Ok(word.as_bytes().to_vec())
            }
        }

        let mut host = Host::new();
        let implementation = Address::from_low_u64(1);
        host.deploy(implementation, Arc::new(SlotReader)).expect("deploy");
        UpgradeableBeacon::deploy(
            &mut host,
            BEACON,
            OWNER,
            Arc::new(PermissiveGate),
            implementation,
        )
        .expect("beacon");
        deploy_beacon_proxy(&mut host, PROXY, BEACON, BeaconProxyKind::Single).expect("proxy");
        host.storage_mut(PROXY)
            .store(Word::from_u64(5), Word::from_u64(0x51));

        let out = host
            .call(OWNER, PROXY, 0, Selector([1, 1, 1, 1]).calldata(&[]))
            .expect("proxied call");
        assert_eq!(out, Word::from_u64(0x51).as_bytes().to_vec());
    }

    #[test]
    fn codeless_beacon_fails_loudly() {
        let mut host = Host::new();
        deploy_beacon_proxy(&mut host, PROXY, BEACON, BeaconProxyKind::Single).expect("proxy");
        let err = host
            .call(OWNER, PROXY, 0, Selector([1, 1, 1, 1]).calldata(&[]))
            .expect_err("no beacon code");
        assert!(matches!(
            err,
            EngineError::FetchImplementationFailed { beacon, .. } if beacon == BEACON
        ));
    }

    #[test]
    fn unset_beacon_address_fails_loudly() {
        let mut host = Host::new();
        host.deploy(PROXY, Arc::new(BeaconProxy::new(BeaconProxyKind::Single)))
            .expect("proxy without beacon slot");
        let err = host
            .call(OWNER, PROXY, 0, Selector([1, 1, 1, 1]).calldata(&[]))
            .expect_err("zero beacon");
        assert_eq!(
            err,
            EngineError::FetchImplementationFailed {
                beacon: Address::ZERO,
                detail: "beacon address holds no code".to_string(),
            }
        );
    }
}
