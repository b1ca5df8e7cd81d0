//! Deterministic call-and-rollback execution substrate.
//!
//! The host models the environment the dispatch core runs in: one call
//! executes to completion or fails, and a failed call leaves no trace.
//! Accounts pair a storage arena slice with optionally deployed code;
//! delegated execution is the primitive that runs one account's code
//! against another account's storage, caller identity, and value.
//!
//! Every frame snapshots state and the event log on entry and restores
//! both on failure, so atomicity anywhere above this layer is
//! structural rather than best-effort.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::errors::EngineError;
use crate::events::{EngineEvent, EventRecord};
use crate::selector::{SELECTOR_BYTES, Selector};
use crate::storage::AccountStorage;

/// Nested-call depth bound.
pub const MAX_CALL_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// ContractCode — deployable logic
// ---------------------------------------------------------------------------

/// Logic deployable at an address. Implementations receive the host (for
/// storage access, nested calls, and events) and the frame context; the
/// return value is the call's verbatim return data.
pub trait ContractCode: fmt::Debug + Send + Sync {
    fn call(&self, host: &mut Host, ctx: &CallContext) -> Result<Vec<u8>, EngineError>;
}

// ---------------------------------------------------------------------------
// CallContext — one frame
// ---------------------------------------------------------------------------

/// The identity and input of one call frame.
///
/// `storage_owner` and `code_address` coincide for a plain call and
/// differ under delegated execution: the target supplies code, the
/// owner supplies state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Account whose storage this frame reads and writes.
    pub storage_owner: Address,
    /// Account whose code is executing.
    pub code_address: Address,
    /// Originating caller, preserved across delegation.
    pub caller: Address,
    /// Value transferred with the call, observable by the callee.
    pub value: u128,
    /// Raw calldata: `selector || payload`, or shorter for plain
    /// transfers.
    pub calldata: Vec<u8>,
}

impl CallContext {
    /// Leading selector, if the calldata is long enough to carry one.
    pub fn selector(&self) -> Option<Selector> {
        Selector::from_calldata(&self.calldata)
    }

    /// Calldata past the selector. Empty for selector-less calls.
    pub fn payload(&self) -> &[u8] {
        if self.calldata.len() < SELECTOR_BYTES {
            &[]
        } else {
            &self.calldata[SELECTOR_BYTES..]
        }
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

fn empty_storage() -> &'static AccountStorage {
    static EMPTY: AccountStorage = AccountStorage::new();
    &EMPTY
}

/// The world: account storage, deployed code, and the audit log.
#[derive(Debug, Default)]
pub struct Host {
    accounts: BTreeMap<Address, AccountStorage>,
    code: BTreeMap<Address, Arc<dyn ContractCode>>,
    events: Vec<EventRecord>,
    depth: usize,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy code at an address. Addresses are never re-deployed.
    pub fn deploy(
        &mut self,
        address: Address,
        code: Arc<dyn ContractCode>,
    ) -> Result<(), EngineError> {
        if self.code.contains_key(&address) {
            return Err(EngineError::CodeAlreadyDeployed { address });
        }
        self.code.insert(address, code);
        Ok(())
    }

    /// The executable-code existence check consumed by cut validation
    /// and beacon resolution.
    pub fn has_code(&self, address: Address) -> bool {
        self.code.contains_key(&address)
    }

    /// Read-only view of an account's storage. Unknown accounts read as
    /// empty.
    pub fn storage(&self, address: Address) -> &AccountStorage {
        self.accounts.get(&address).unwrap_or_else(|| empty_storage())
    }

    /// Mutable storage, materializing the account on first write.
    pub fn storage_mut(&mut self, address: Address) -> &mut AccountStorage {
        self.accounts.entry(address).or_default()
    }

    /// Append an audit event. Rolls back with the frame that emitted it.
    pub fn emit(&mut self, emitter: Address, event: EngineEvent) {
        self.events.push(EventRecord { emitter, event });
    }

    /// Committed events, oldest first.
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Committed events emitted by one account.
    pub fn events_for(&self, emitter: Address) -> Vec<&EventRecord> {
        self.events.iter().filter(|r| r.emitter == emitter).collect()
    }

    /// Top-level or nested plain call: the target supplies both code and
    /// storage.
    pub fn call(
        &mut self,
        caller: Address,
        target: Address,
        value: u128,
        calldata: Vec<u8>,
    ) -> Result<Vec<u8>, EngineError> {
        self.execute(CallContext {
            storage_owner: target,
            code_address: target,
            caller,
            value,
            calldata,
        })
    }

    /// Delegated execution from an existing frame: code comes from
    /// `code_address`, while storage owner, caller, and value carry over
    /// from the outer frame.
    pub fn delegate_call(
        &mut self,
        outer: &CallContext,
        code_address: Address,
        calldata: Vec<u8>,
    ) -> Result<Vec<u8>, EngineError> {
        self.execute(CallContext {
            storage_owner: outer.storage_owner,
            code_address,
            caller: outer.caller,
            value: outer.value,
            calldata,
        })
    }

    fn execute(&mut self, ctx: CallContext) -> Result<Vec<u8>, EngineError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EngineError::CallDepthExceeded {
                depth: self.depth + 1,
                max: MAX_CALL_DEPTH,
            });
        }
        let code = self
            .code
            .get(&ctx.code_address)
            .cloned()
            .ok_or(EngineError::CodeMissing {
                address: ctx.code_address,
            })?;

        let snapshot = self.accounts.clone();
        let event_mark = self.events.len();
        self.depth += 1;
        let result = code.call(self, &ctx);
        self.depth -= 1;
        if result.is_err() {
            self.accounts = snapshot;
            self.events.truncate(event_mark);
        }
        result
    }
}
