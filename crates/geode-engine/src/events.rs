//! Structured audit events.
//!
//! Mutating entry points append typed records to the host's event log so
//! off-chain observers can reconstruct exactly what was applied and with
//! which parameters. The log is append-only within a call and rolls back
//! with state, so a reverted mutation leaves no trace.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::cut_engine::FacetCut;

/// One emitted event and the account that emitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub emitter: Address,
    pub event: EngineEvent,
}

/// The audit event vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A cut batch committed: the full batch and init parameters, for
    /// off-chain audit of every routing mutation.
    DiamondCut {
        cuts: Vec<FacetCut>,
        init_target: Address,
        init_data: Vec<u8>,
    },
    /// The owner slot changed hands.
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    /// The fallback facet configuration changed.
    FallbackFacetChanged { previous: Address, current: Address },
    /// A non-faceted beacon now serves a new implementation.
    BeaconUpgraded { implementation: Address },
}

impl EngineEvent {
    /// Stable event name for filtering and structured output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DiamondCut { .. } => "diamond_cut",
            Self::OwnershipTransferred { .. } => "ownership_transferred",
            Self::FallbackFacetChanged { .. } => "fallback_facet_changed",
            Self::BeaconUpgraded { .. } => "beacon_upgraded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cut_engine::CutAction;
    use crate::selector::Selector;

    #[test]
    fn names_are_stable() {
        let cut = EngineEvent::DiamondCut {
            cuts: vec![FacetCut {
                target: Address::from_low_u64(1),
                action: CutAction::Add,
                selectors: vec![Selector([1, 2, 3, 4])],
            }],
            init_target: Address::ZERO,
            init_data: Vec::new(),
        };
        assert_eq!(cut.name(), "diamond_cut");
        assert_eq!(
            EngineEvent::BeaconUpgraded {
                implementation: Address::ZERO
            }
            .name(),
            "beacon_upgraded"
        );
    }

    #[test]
    fn serde_round_trip() {
        let record = EventRecord {
            emitter: Address::from_low_u64(5),
            event: EngineEvent::OwnershipTransferred {
                previous_owner: Address::ZERO,
                new_owner: Address::from_low_u64(6),
            },
        };
        let json = serde_json::to_string(&record).expect("serialize");
        let back: EventRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, record);
    }
}
