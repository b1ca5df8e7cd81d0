//! The persistent routing table, laid out in raw storage words.
//!
//! One registry lives in each diamond or beacon account, at a base slot
//! derived from a published namespace seed. Everything is addressed
//! relative to that base, so the registry coexists with facet state in
//! the same arena without collision:
//!
//! - `base + 0`: mapping `selector -> packed record` (facet address in
//!   the low 20 bytes, the selector's index within its facet's selector
//!   array as a u32 above it).
//! - `base + 1`: mapping `facet -> info pair`: slot `V` holds the
//!   selector-array length and `V + 1` the facet's index in the facet
//!   array; selector elements live at `keccak256(V) + i`, one per word.
//! - `base + 2`: facet-address array: length here, elements at
//!   `keccak256(base + 2) + i`.
//! - `base + 3`: fallback facet address (zero when unconfigured).
//! - `base + 4`: mapping `interface id -> registered flag`.
//!
//! Removal swap-removes in both arrays and fixes up the displaced
//! entry's stored index, so every mutation keeps the forward map, the
//! reverse index, and the facet set bidirectionally consistent. All
//! mutation goes through the crate-private writer; embedders only ever
//! see the read view.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{ADDRESS_BYTES, Address};
use crate::selector::Selector;
use crate::slot_derivation::{array_index, map_key_address, map_key_selector, namespace_slot, next, offset};
use crate::storage::AccountStorage;
use crate::word::{WORD_BYTES, Word};

/// Namespace seed under which every registry instance lives.
pub const FACET_REGISTRY_NAMESPACE: &str = "geode.storage.facet-registry";

/// The registry's base slot. Derived from the published seed, never from
/// runtime state.
pub fn registry_base_slot() -> Word {
    namespace_slot(FACET_REGISTRY_NAMESPACE)
}

// ---------------------------------------------------------------------------
// Relative layout
// ---------------------------------------------------------------------------

/// Mapping base for `selector -> packed record`.
pub fn selector_map_base(base: Word) -> Word {
    base
}

/// Mapping base for `facet -> (selector count, facet index)`.
pub fn facet_info_base(base: Word) -> Word {
    next(base)
}

/// Descriptor slot of the facet-address array.
pub fn facet_array_slot(base: Word) -> Word {
    offset(base, 2)
}

/// Slot holding the fallback facet address.
pub fn fallback_facet_slot(base: Word) -> Word {
    offset(base, 3)
}

/// Mapping base for registered interface ids.
pub fn interface_map_base(base: Word) -> Word {
    offset(base, 4)
}

// ---------------------------------------------------------------------------
// Packed selector record
// ---------------------------------------------------------------------------

fn pack_selector_record(facet: Address, position: u32) -> Word {
    let mut out = [0u8; WORD_BYTES];
    out[8..12].copy_from_slice(&position.to_be_bytes());
    out[WORD_BYTES - ADDRESS_BYTES..].copy_from_slice(facet.as_bytes());
    Word(out)
}

fn unpack_selector_record(record: Word) -> Option<(Address, u32)> {
    if record.is_zero() {
        return None;
    }
    let mut pos = [0u8; 4];
    pos.copy_from_slice(&record.0[8..12]);
    let mut addr = [0u8; ADDRESS_BYTES];
    addr.copy_from_slice(&record.0[WORD_BYTES - ADDRESS_BYTES..]);
    Some((Address(addr), u32::from_be_bytes(pos)))
}

// ---------------------------------------------------------------------------
// Shared reads
// ---------------------------------------------------------------------------

fn selector_record_slot(base: Word, selector: Selector) -> Word {
    map_key_selector(selector_map_base(base), selector)
}

fn facet_info_slot(base: Word, facet: Address) -> Word {
    map_key_address(facet_info_base(base), facet)
}

fn facet_position_slot(base: Word, facet: Address) -> Word {
    next(facet_info_slot(base, facet))
}

fn selector_element_slot(base: Word, facet: Address, i: u64) -> Word {
    array_index(facet_info_slot(base, facet), i)
}

fn facet_element_slot(base: Word, i: u64) -> Word {
    array_index(facet_array_slot(base), i)
}

fn read_selector_record(storage: &AccountStorage, base: Word, selector: Selector) -> Option<(Address, u32)> {
    unpack_selector_record(storage.load(selector_record_slot(base, selector)))
}

fn read_selector_count(storage: &AccountStorage, base: Word, facet: Address) -> u64 {
    storage
        .load(facet_info_slot(base, facet))
        .as_u64()
        .unwrap_or(0)
}

fn read_facet_position(storage: &AccountStorage, base: Word, facet: Address) -> u64 {
    storage
        .load(facet_position_slot(base, facet))
        .as_u64()
        .unwrap_or(0)
}

fn read_facet_count(storage: &AccountStorage, base: Word) -> u64 {
    storage.load(facet_array_slot(base)).as_u64().unwrap_or(0)
}

fn read_selectors_of(storage: &AccountStorage, base: Word, facet: Address) -> Vec<Selector> {
    let count = read_selector_count(storage, base, facet);
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count {
        let word = storage.load(selector_element_slot(base, facet, i));
        if let Some(sel) = Selector::from_word(word) {
            out.push(sel);
        }
    }
    out
}

fn read_facet_addresses(storage: &AccountStorage, base: Word) -> Vec<Address> {
    let count = read_facet_count(storage, base);
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count {
        let word = storage.load(facet_element_slot(base, i));
        if let Some(addr) = Address::from_word(word) {
            out.push(addr);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// FacetEntry — one loupe row
// ---------------------------------------------------------------------------

/// One facet and the selectors currently bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetEntry {
    pub facet: Address,
    pub selectors: Vec<Selector>,
}

// ---------------------------------------------------------------------------
// FacetRegistryView — the read surface
// ---------------------------------------------------------------------------

/// Read-only registry view over an account's storage.
#[derive(Debug)]
pub struct FacetRegistryView<'a> {
    storage: &'a AccountStorage,
    base: Word,
}

impl<'a> FacetRegistryView<'a> {
    pub fn new(storage: &'a AccountStorage, base: Word) -> Self {
        Self { storage, base }
    }

    /// View at the published registry namespace.
    pub fn at(storage: &'a AccountStorage) -> Self {
        Self::new(storage, registry_base_slot())
    }

    /// Facet currently bound to a selector.
    pub fn facet_of(&self, selector: Selector) -> Option<Address> {
        read_selector_record(self.storage, self.base, selector).map(|(facet, _)| facet)
    }

    /// Number of selectors bound to a facet.
    pub fn selector_count(&self, facet: Address) -> u64 {
        read_selector_count(self.storage, self.base, facet)
    }

    /// Selectors bound to a facet, in binding-array order. Empty for
    /// unknown facets.
    pub fn selectors_of(&self, facet: Address) -> Vec<Selector> {
        read_selectors_of(self.storage, self.base, facet)
    }

    /// Number of facets with at least one bound selector.
    pub fn facet_count(&self) -> u64 {
        read_facet_count(self.storage, self.base)
    }

    /// All facets with at least one bound selector.
    pub fn facet_addresses(&self) -> Vec<Address> {
        read_facet_addresses(self.storage, self.base)
    }

    /// Every facet paired with its bound selectors.
    pub fn facets(&self) -> Vec<FacetEntry> {
        self.facet_addresses()
            .into_iter()
            .map(|facet| FacetEntry {
                facet,
                selectors: self.selectors_of(facet),
            })
            .collect()
    }

    /// Configured fallback facet, if any.
    pub fn fallback_facet(&self) -> Option<Address> {
        let word = self.storage.load(fallback_facet_slot(self.base));
        Address::from_word(word).filter(|addr| !addr.is_zero())
    }

    /// Whether an interface id has been registered.
    pub fn supports_interface(&self, id: Selector) -> bool {
        !self
            .storage
            .load(map_key_selector(interface_map_base(self.base), id))
            .is_zero()
    }

    /// Exhaustive bidirectional-consistency check.
    ///
    /// The enumerable side (facet set, reverse index, stored positions)
    /// is checked outright; the forward map is hash-addressed, so the
    /// caller passes the selector universe it cares about and every
    /// bound member is checked against the reverse index.
    pub fn verify_consistency(&self, universe: &[Selector]) -> Vec<ConsistencyViolation> {
        let mut violations = Vec::new();
        let mut claimed: BTreeMap<Selector, Address> = BTreeMap::new();

        let facets = self.facet_addresses();
        for (i, facet) in facets.iter().copied().enumerate() {
            let count = self.selector_count(facet);
            if count == 0 {
                violations.push(ConsistencyViolation::FacetWithoutSelectors { facet });
            }
            let stored = read_facet_position(self.storage, self.base, facet);
            if stored != i as u64 {
                violations.push(ConsistencyViolation::FacetPositionMismatch {
                    facet,
                    stored,
                    actual: i as u64,
                });
            }
            for (j, selector) in self.selectors_of(facet).into_iter().enumerate() {
                match read_selector_record(self.storage, self.base, selector) {
                    Some((found, position)) if found == facet => {
                        if position as u64 != j as u64 {
                            violations.push(ConsistencyViolation::RecordPositionMismatch {
                                selector,
                                stored: position,
                                actual: j as u64,
                            });
                        }
                    }
                    other => violations.push(ConsistencyViolation::SelectorRecordMismatch {
                        selector,
                        expected_facet: facet,
                        found: other.map(|(facet, _)| facet),
                    }),
                }
                if let Some(first) = claimed.insert(selector, facet) {
                    violations.push(ConsistencyViolation::DuplicateSelectorClaim {
                        selector,
                        first,
                        second: facet,
                    });
                }
            }
        }

        for selector in universe.iter().copied() {
            if let Some(facet) = self.facet_of(selector) {
                if !self.selectors_of(facet).contains(&selector) {
                    violations.push(ConsistencyViolation::ReverseIndexMissing { selector, facet });
                }
            }
        }
        violations
    }
}

/// One way the registry's bidirectional invariant can be broken. The
/// writer never produces these; the checker exists so tests and auditors
/// can prove that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyViolation {
    FacetWithoutSelectors {
        facet: Address,
    },
    FacetPositionMismatch {
        facet: Address,
        stored: u64,
        actual: u64,
    },
    RecordPositionMismatch {
        selector: Selector,
        stored: u32,
        actual: u64,
    },
    SelectorRecordMismatch {
        selector: Selector,
        expected_facet: Address,
        found: Option<Address>,
    },
    DuplicateSelectorClaim {
        selector: Selector,
        first: Address,
        second: Address,
    },
    ReverseIndexMissing {
        selector: Selector,
        facet: Address,
    },
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FacetWithoutSelectors { facet } => {
                write!(f, "facet {facet} is listed with zero selectors")
            }
            Self::FacetPositionMismatch {
                facet,
                stored,
                actual,
            } => write!(f, "facet {facet} stores index {stored}, found at {actual}"),
            Self::RecordPositionMismatch {
                selector,
                stored,
                actual,
            } => write!(
                f,
                "selector {selector} record stores index {stored}, found at {actual}"
            ),
            Self::SelectorRecordMismatch {
                selector,
                expected_facet,
                found,
            } => match found {
                Some(found) => write!(
                    f,
                    "selector {selector} listed under {expected_facet} but maps to {found}"
                ),
                None => write!(
                    f,
                    "selector {selector} listed under {expected_facet} but has no record"
                ),
            },
            Self::DuplicateSelectorClaim {
                selector,
                first,
                second,
            } => write!(
                f,
                "selector {selector} claimed by both {first} and {second}"
            ),
            Self::ReverseIndexMissing { selector, facet } => write!(
                f,
                "selector {selector} maps to {facet} but is missing from its reverse index"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// FacetRegistryWriter — crate-private mutation
// ---------------------------------------------------------------------------

/// Mutation surface. Crate-private: every write path runs through the
/// cut engine so the bidirectional invariant is preserved by
/// construction.
#[derive(Debug)]
pub(crate) struct FacetRegistryWriter<'a> {
    storage: &'a mut AccountStorage,
    base: Word,
}

impl<'a> FacetRegistryWriter<'a> {
    pub(crate) fn new(storage: &'a mut AccountStorage, base: Word) -> Self {
        Self { storage, base }
    }

    pub(crate) fn at(storage: &'a mut AccountStorage) -> Self {
        Self::new(storage, registry_base_slot())
    }

    pub(crate) fn facet_of(&self, selector: Selector) -> Option<Address> {
        read_selector_record(self.storage, self.base, selector).map(|(facet, _)| facet)
    }

    /// Bind an unbound selector to a facet. The caller has already
    /// validated unboundness and code existence.
    pub(crate) fn bind(&mut self, selector: Selector, facet: Address) {
        let count = read_selector_count(self.storage, self.base, facet);
        if count == 0 {
            // First selector for this facet: append to the facet array.
            let facets = read_facet_count(self.storage, self.base);
            self.storage
                .store(facet_element_slot(self.base, facets), facet.to_word());
            self.storage
                .store(facet_array_slot(self.base), Word::from_u64(facets + 1));
            self.storage.store(
                facet_position_slot(self.base, facet),
                Word::from_u64(facets),
            );
        }
        self.storage.store(
            selector_element_slot(self.base, facet, count),
            selector.to_word(),
        );
        self.storage
            .store(facet_info_slot(self.base, facet), Word::from_u64(count + 1));
        self.storage.store(
            selector_record_slot(self.base, selector),
            pack_selector_record(facet, count as u32),
        );
    }

    /// Unbind a bound selector, swap-removing from the reverse index and
    /// pruning the facet from the facet array when it empties. Returns
    /// the facet the selector was bound to, `None` if it was unbound.
    pub(crate) fn unbind(&mut self, selector: Selector) -> Option<Address> {
        let (facet, position) = read_selector_record(self.storage, self.base, selector)?;
        let count = read_selector_count(self.storage, self.base, facet);
        let last = count.saturating_sub(1);

        if (position as u64) < last {
            let moved = self
                .storage
                .load(selector_element_slot(self.base, facet, last));
            self.storage
                .store(selector_element_slot(self.base, facet, position as u64), moved);
            if let Some(moved_selector) = Selector::from_word(moved) {
                self.storage.store(
                    selector_record_slot(self.base, moved_selector),
                    pack_selector_record(facet, position),
                );
            }
        }
        self.storage
            .store(selector_element_slot(self.base, facet, last), Word::ZERO);
        self.storage
            .store(facet_info_slot(self.base, facet), Word::from_u64(last));

        if last == 0 {
            self.prune_facet(facet);
        }
        self.storage
            .store(selector_record_slot(self.base, selector), Word::ZERO);
        Some(facet)
    }

    /// Move a bound selector to a new facet.
    pub(crate) fn rebind(&mut self, selector: Selector, new_facet: Address) -> Option<Address> {
        let previous = self.unbind(selector)?;
        self.bind(selector, new_facet);
        Some(previous)
    }

    fn prune_facet(&mut self, facet: Address) {
        let position = read_facet_position(self.storage, self.base, facet);
        let count = read_facet_count(self.storage, self.base);
        let last = count.saturating_sub(1);

        if position < last {
            let moved = self.storage.load(facet_element_slot(self.base, last));
            self.storage.store(facet_element_slot(self.base, position), moved);
            if let Some(moved_facet) = Address::from_word(moved) {
                self.storage.store(
                    facet_position_slot(self.base, moved_facet),
                    Word::from_u64(position),
                );
            }
        }
        self.storage
            .store(facet_element_slot(self.base, last), Word::ZERO);
        self.storage
            .store(facet_array_slot(self.base), Word::from_u64(last));
        self.storage
            .store(facet_position_slot(self.base, facet), Word::ZERO);
    }

    /// Swap the fallback facet, returning the previous configuration.
    pub(crate) fn set_fallback_facet(&mut self, facet: Address) -> Address {
        let slot = fallback_facet_slot(self.base);
        let previous = Address::from_word(self.storage.load(slot)).unwrap_or(Address::ZERO);
        self.storage.store(slot, facet.to_word());
        previous
    }

    /// Record an interface id as supported.
    pub(crate) fn register_interface(&mut self, id: Selector) {
        self.storage.store(
            map_key_selector(interface_map_base(self.base), id),
            Word::from_u64(1),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(n: u8) -> Selector {
        Selector([n, n, n, n])
    }

    fn facet(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn packed_record_round_trips() {
        let record = pack_selector_record(facet(77), 12);
        assert_eq!(unpack_selector_record(record), Some((facet(77), 12)));
        assert_eq!(unpack_selector_record(Word::ZERO), None);
    }

    #[test]
    fn bind_populates_all_three_structures() {
        let mut storage = AccountStorage::new();
        let mut writer = FacetRegistryWriter::at(&mut storage);
        writer.bind(sel(1), facet(1));
        writer.bind(sel(2), facet(1));
        writer.bind(sel(3), facet(2));

        let view = FacetRegistryView::at(&storage);
        assert_eq!(view.facet_of(sel(1)), Some(facet(1)));
        assert_eq!(view.facet_of(sel(3)), Some(facet(2)));
        assert_eq!(view.selectors_of(facet(1)), vec![sel(1), sel(2)]);
        assert_eq!(view.facet_addresses(), vec![facet(1), facet(2)]);
        assert!(view.verify_consistency(&[sel(1), sel(2), sel(3)]).is_empty());
    }

    #[test]
    fn unbind_swap_removes_and_fixes_positions() {
        let mut storage = AccountStorage::new();
        let mut writer = FacetRegistryWriter::at(&mut storage);
        for n in 1..=4 {
            writer.bind(sel(n), facet(1));
        }
        // Remove from the middle: the last selector takes its place.
        assert_eq!(writer.unbind(sel(2)), Some(facet(1)));

        let view = FacetRegistryView::at(&storage);
        assert_eq!(view.selectors_of(facet(1)), vec![sel(1), sel(4), sel(3)]);
        assert_eq!(view.facet_of(sel(2)), None);
        assert!(view.verify_consistency(&[sel(1), sel(2), sel(3), sel(4)]).is_empty());
    }

    #[test]
    fn last_unbind_prunes_the_facet() {
        let mut storage = AccountStorage::new();
        let mut writer = FacetRegistryWriter::at(&mut storage);
        writer.bind(sel(1), facet(1));
        writer.bind(sel(2), facet(2));
        writer.bind(sel(3), facet(3));
        // Empty the first facet: the last facet is swapped into its slot.
        writer.unbind(sel(1));

        let view = FacetRegistryView::at(&storage);
        assert_eq!(view.facet_addresses(), vec![facet(3), facet(2)]);
        assert!(view.verify_consistency(&[sel(1), sel(2), sel(3)]).is_empty());
    }

    #[test]
    fn full_round_trip_restores_empty_storage() {
        let mut storage = AccountStorage::new();
        let pristine = storage.clone();
        let mut writer = FacetRegistryWriter::at(&mut storage);
        for n in 1..=5 {
            writer.bind(sel(n), facet(u64::from(n % 2) + 1));
        }
        for n in 1..=5 {
            writer.unbind(sel(n));
        }
        assert_eq!(storage, pristine);
    }

    #[test]
    fn rebind_moves_between_facets() {
        let mut storage = AccountStorage::new();
        let mut writer = FacetRegistryWriter::at(&mut storage);
        writer.bind(sel(1), facet(1));
        writer.bind(sel(2), facet(1));
        assert_eq!(writer.rebind(sel(1), facet(2)), Some(facet(1)));

        let view = FacetRegistryView::at(&storage);
        assert_eq!(view.facet_of(sel(1)), Some(facet(2)));
        assert_eq!(view.selectors_of(facet(1)), vec![sel(2)]);
        assert_eq!(view.selectors_of(facet(2)), vec![sel(1)]);
        assert!(view.verify_consistency(&[sel(1), sel(2)]).is_empty());
    }

    #[test]
    fn unbinding_unknown_selector_is_none() {
        let mut storage = AccountStorage::new();
        let mut writer = FacetRegistryWriter::at(&mut storage);
        assert_eq!(writer.unbind(sel(9)), None);
    }

    #[test]
    fn fallback_facet_round_trips() {
        let mut storage = AccountStorage::new();
        let mut writer = FacetRegistryWriter::at(&mut storage);
        assert_eq!(writer.set_fallback_facet(facet(5)), Address::ZERO);
        assert_eq!(writer.set_fallback_facet(Address::ZERO), facet(5));
        let view = FacetRegistryView::at(&storage);
        assert_eq!(view.fallback_facet(), None);
    }

    #[test]
    fn interface_registration_is_visible() {
        let mut storage = AccountStorage::new();
        let mut writer = FacetRegistryWriter::at(&mut storage);
        let id = Selector([0x01, 0xff, 0xc9, 0xa7]);
        writer.register_interface(id);
        let view = FacetRegistryView::at(&storage);
        assert!(view.supports_interface(id));
        assert!(!view.supports_interface(Selector([9, 9, 9, 9])));
    }

    #[test]
    fn views_at_different_bases_do_not_collide() {
        let mut storage = AccountStorage::new();
        let other_base = namespace_slot("geode.test.other-registry");
        {
            let mut writer = FacetRegistryWriter::at(&mut storage);
            writer.bind(sel(1), facet(1));
        }
        let other = FacetRegistryView::new(&storage, other_base);
        assert_eq!(other.facet_of(sel(1)), None);
        assert!(other.facet_addresses().is_empty());
    }

    #[test]
    fn consistency_checker_flags_corruption() {
        let mut storage = AccountStorage::new();
        {
            let mut writer = FacetRegistryWriter::at(&mut storage);
            writer.bind(sel(1), facet(1));
        }
        let base = registry_base_slot();
        // Corrupt the forward record to point at a different facet.
        storage.store(
            selector_record_slot(base, sel(1)),
            pack_selector_record(facet(9), 0),
        );
        let view = FacetRegistryView::at(&storage);
        let violations = view.verify_consistency(&[sel(1)]);
        assert!(!violations.is_empty());
        assert!(violations
            .iter()
            .any(|v| matches!(v, ConsistencyViolation::SelectorRecordMismatch { .. })));
    }
}
