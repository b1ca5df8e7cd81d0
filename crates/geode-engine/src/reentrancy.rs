//! Storage-flag mutual exclusion for guarded entry points.
//!
//! Delegated execution shares storage with the outer frame, so a facet
//! that performs an external call can be re-entered mid-execution. The
//! guard is an explicit flag at its own namespace slot: checked and set
//! on entry, cleared on exit. A failure after `acquire` needs no manual
//! cleanup because the frame's rollback restores the flag with the rest
//! of state; the success path must `release` before returning.

use crate::errors::EngineError;
use crate::slot_derivation::namespace_slot;
use crate::storage::AccountStorage;
use crate::word::Word;

/// Namespace seed of the guard flag.
pub const REENTRANCY_NAMESPACE: &str = "geode.storage.reentrancy-guard";

/// The guard slot, derived from the published seed.
pub fn guard_slot() -> Word {
    namespace_slot(REENTRANCY_NAMESPACE)
}

/// Take the lock. Fails with [`EngineError::ReentrantCall`] if an
/// enclosing frame already holds it.
pub fn acquire(storage: &mut AccountStorage) -> Result<(), EngineError> {
    let slot = guard_slot();
    if !storage.load(slot).is_zero() {
        return Err(EngineError::ReentrantCall { guard_slot: slot });
    }
    storage.store(slot, Word::from_u64(1));
    Ok(())
}

/// Drop the lock.
pub fn release(storage: &mut AccountStorage) {
    storage.store(guard_slot(), Word::ZERO);
}

/// Whether the lock is currently held.
pub fn is_held(storage: &AccountStorage) -> bool {
    !storage.load(guard_slot()).is_zero()
}
