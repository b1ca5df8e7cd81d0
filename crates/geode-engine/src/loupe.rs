//! Read-only registry introspection (the "loupe").
//!
//! Four queries, all side-effect free and always consistent with the
//! committed registry: enumerate facets with their selectors, list
//! facet addresses, list one facet's selectors, and reverse-look-up the
//! facet bound to a selector. Interface detection rides along, since
//! observers discover the loupe itself through it.

use crate::address::Address;
use crate::errors::EngineError;
use crate::facet_registry::{FacetEntry, FacetRegistryView};
use crate::selector::{Selector, interface_id};
use crate::wire::{Decoder, Encoder, WireError};

/// Most entries any enumeration response will carry.
pub const MAX_ENUMERATION: usize = 4096;

pub const FACETS_SIGNATURE: &str = "facets()";
pub const FACET_ADDRESSES_SIGNATURE: &str = "facetAddresses()";
pub const FACET_FUNCTION_SELECTORS_SIGNATURE: &str = "facetFunctionSelectors(address)";
pub const FACET_ADDRESS_SIGNATURE: &str = "facetAddress(bytes4)";
pub const SUPPORTS_INTERFACE_SIGNATURE: &str = "supportsInterface(bytes4)";

pub fn facets_selector() -> Selector {
    Selector::of(FACETS_SIGNATURE)
}

pub fn facet_addresses_selector() -> Selector {
    Selector::of(FACET_ADDRESSES_SIGNATURE)
}

pub fn facet_function_selectors_selector() -> Selector {
    Selector::of(FACET_FUNCTION_SELECTORS_SIGNATURE)
}

pub fn facet_address_selector() -> Selector {
    Selector::of(FACET_ADDRESS_SIGNATURE)
}

pub fn supports_interface_selector() -> Selector {
    Selector::of(SUPPORTS_INTERFACE_SIGNATURE)
}

/// Interface id of the four loupe functions.
pub fn loupe_interface_id() -> Selector {
    interface_id([
        facets_selector(),
        facet_addresses_selector(),
        facet_function_selectors_selector(),
        facet_address_selector(),
    ])
}

/// Interface id of interface detection itself.
pub fn erc165_interface_id() -> Selector {
    supports_interface_selector()
}

fn wire_err(err: WireError) -> EngineError {
    EngineError::MalformedCallData {
        detail: err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Entry-point answering
// ---------------------------------------------------------------------------

/// Answer a loupe or interface-detection call, or `None` if the
/// selector is not one of ours and should fall through to dispatch.
pub fn answer(
    view: &FacetRegistryView<'_>,
    selector: Selector,
    payload: &[u8],
) -> Option<Result<Vec<u8>, EngineError>> {
    if selector == facets_selector() {
        Some(answer_facets(view, payload))
    } else if selector == facet_addresses_selector() {
        Some(answer_facet_addresses(view, payload))
    } else if selector == facet_function_selectors_selector() {
        Some(answer_facet_function_selectors(view, payload))
    } else if selector == facet_address_selector() {
        Some(answer_facet_address(view, payload))
    } else if selector == supports_interface_selector() {
        Some(answer_supports_interface(view, payload))
    } else {
        None
    }
}

fn expect_empty(payload: &[u8]) -> Result<(), EngineError> {
    Decoder::new(payload).finish().map_err(wire_err)
}

fn answer_facets(view: &FacetRegistryView<'_>, payload: &[u8]) -> Result<Vec<u8>, EngineError> {
    expect_empty(payload)?;
    encode_facets_response(&view.facets()).map_err(wire_err)
}

fn answer_facet_addresses(
    view: &FacetRegistryView<'_>,
    payload: &[u8],
) -> Result<Vec<u8>, EngineError> {
    expect_empty(payload)?;
    encode_addresses_response(&view.facet_addresses()).map_err(wire_err)
}

fn answer_facet_function_selectors(
    view: &FacetRegistryView<'_>,
    payload: &[u8],
) -> Result<Vec<u8>, EngineError> {
    let mut dec = Decoder::new(payload);
    let facet = dec.read_address().map_err(wire_err)?;
    dec.finish().map_err(wire_err)?;
    encode_selectors_response(&view.selectors_of(facet)).map_err(wire_err)
}

fn answer_facet_address(
    view: &FacetRegistryView<'_>,
    payload: &[u8],
) -> Result<Vec<u8>, EngineError> {
    let mut dec = Decoder::new(payload);
    let selector = dec.read_selector().map_err(wire_err)?;
    dec.finish().map_err(wire_err)?;
    let facet = view.facet_of(selector).unwrap_or(Address::ZERO);
    Ok(encode_address_response(facet))
}

fn answer_supports_interface(
    view: &FacetRegistryView<'_>,
    payload: &[u8],
) -> Result<Vec<u8>, EngineError> {
    let mut dec = Decoder::new(payload);
    let id = dec.read_selector().map_err(wire_err)?;
    dec.finish().map_err(wire_err)?;
    Ok(encode_bool_response(view.supports_interface(id)))
}

// ---------------------------------------------------------------------------
// Response encodings
// ---------------------------------------------------------------------------

pub fn encode_facets_response(entries: &[FacetEntry]) -> Result<Vec<u8>, WireError> {
    let mut enc = Encoder::new();
    enc.write_len(entries.len())?;
    for entry in entries {
        enc.write_address(entry.facet);
        enc.write_len(entry.selectors.len())?;
        for selector in &entry.selectors {
            enc.write_selector(*selector);
        }
    }
    Ok(enc.finish())
}

pub fn decode_facets_response(bytes: &[u8]) -> Result<Vec<FacetEntry>, EngineError> {
    let mut dec = Decoder::new(bytes);
    let count = dec.read_len(MAX_ENUMERATION).map_err(wire_err)?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let facet = dec.read_address().map_err(wire_err)?;
        let selector_count = dec.read_len(MAX_ENUMERATION).map_err(wire_err)?;
        let mut selectors = Vec::with_capacity(selector_count);
        for _ in 0..selector_count {
            selectors.push(dec.read_selector().map_err(wire_err)?);
        }
        entries.push(FacetEntry { facet, selectors });
    }
    dec.finish().map_err(wire_err)?;
    Ok(entries)
}

pub fn encode_addresses_response(addresses: &[Address]) -> Result<Vec<u8>, WireError> {
    let mut enc = Encoder::new();
    enc.write_len(addresses.len())?;
    for address in addresses {
        enc.write_address(*address);
    }
    Ok(enc.finish())
}

pub fn decode_addresses_response(bytes: &[u8]) -> Result<Vec<Address>, EngineError> {
    let mut dec = Decoder::new(bytes);
    let count = dec.read_len(MAX_ENUMERATION).map_err(wire_err)?;
    let mut addresses = Vec::with_capacity(count);
    for _ in 0..count {
        addresses.push(dec.read_address().map_err(wire_err)?);
    }
    dec.finish().map_err(wire_err)?;
    Ok(addresses)
}

pub fn encode_selectors_response(selectors: &[Selector]) -> Result<Vec<u8>, WireError> {
    let mut enc = Encoder::new();
    enc.write_len(selectors.len())?;
    for selector in selectors {
        enc.write_selector(*selector);
    }
    Ok(enc.finish())
}

pub fn decode_selectors_response(bytes: &[u8]) -> Result<Vec<Selector>, EngineError> {
    let mut dec = Decoder::new(bytes);
    let count = dec.read_len(MAX_ENUMERATION).map_err(wire_err)?;
    let mut selectors = Vec::with_capacity(count);
    for _ in 0..count {
        selectors.push(dec.read_selector().map_err(wire_err)?);
    }
    dec.finish().map_err(wire_err)?;
    Ok(selectors)
}

pub fn encode_address_response(address: Address) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.write_address(address);
    enc.finish()
}

pub fn decode_address_response(bytes: &[u8]) -> Result<Address, EngineError> {
    let mut dec = Decoder::new(bytes);
    let address = dec.read_address().map_err(wire_err)?;
    dec.finish().map_err(wire_err)?;
    Ok(address)
}

pub fn encode_bool_response(value: bool) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.write_bool(value);
    enc.finish()
}

pub fn decode_bool_response(bytes: &[u8]) -> Result<bool, EngineError> {
    let mut dec = Decoder::new(bytes);
    let value = dec.read_bool().map_err(wire_err)?;
    dec.finish().map_err(wire_err)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AccountStorage;

    #[test]
    fn loupe_selectors_are_distinct() {
        let all = [
            facets_selector(),
            facet_addresses_selector(),
            facet_function_selectors_selector(),
            facet_address_selector(),
            supports_interface_selector(),
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn interface_id_is_xor_of_members() {
        let id = loupe_interface_id();
        let rebuilt = interface_id([
            facets_selector(),
            facet_addresses_selector(),
            facet_function_selectors_selector(),
            facet_address_selector(),
        ]);
        assert_eq!(id, rebuilt);
        assert_ne!(id, Selector::ZERO);
    }

    #[test]
    fn facets_response_round_trips() {
        let entries = vec![
            FacetEntry {
                facet: Address::from_low_u64(1),
                selectors: vec![Selector([1, 2, 3, 4]), Selector([5, 6, 7, 8])],
            },
            FacetEntry {
                facet: Address::from_low_u64(2),
                selectors: vec![Selector([9, 9, 9, 9])],
            },
        ];
        let bytes = encode_facets_response(&entries).expect("encode");
        assert_eq!(decode_facets_response(&bytes).expect("decode"), entries);
    }

    #[test]
    fn scalar_responses_round_trip() {
        let addr = Address::from_low_u64(7);
        assert_eq!(
            decode_address_response(&encode_address_response(addr)).expect("decode"),
            addr
        );
        assert!(decode_bool_response(&encode_bool_response(true)).expect("decode"));
        let selectors = vec![Selector([1, 1, 1, 1])];
        let bytes = encode_selectors_response(&selectors).expect("encode");
        assert_eq!(decode_selectors_response(&bytes).expect("decode"), selectors);
    }

    #[test]
    fn answers_reject_non_empty_payloads_for_nullary_queries() {
        let storage = AccountStorage::new();
        let view = FacetRegistryView::at(&storage);
        let result = answer(&view, facets_selector(), &[0xff])
            .expect("loupe selector")
            .expect_err("trailing payload");
        assert_eq!(result.code(), "malformed_call_data");
    }

    #[test]
    fn unknown_selector_falls_through() {
        let storage = AccountStorage::new();
        let view = FacetRegistryView::at(&storage);
        assert!(answer(&view, Selector([0, 1, 2, 3]), &[]).is_none());
    }

    #[test]
    fn facet_address_answers_zero_for_unbound() {
        let storage = AccountStorage::new();
        let view = FacetRegistryView::at(&storage);
        let mut enc = Encoder::new();
        enc.write_selector(Selector([1, 2, 3, 4]));
        let response = answer(&view, facet_address_selector(), &enc.finish())
            .expect("loupe selector")
            .expect("answer");
        assert_eq!(
            decode_address_response(&response).expect("decode"),
            Address::ZERO
        );
    }
}
