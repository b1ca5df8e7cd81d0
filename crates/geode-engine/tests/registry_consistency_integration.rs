//! Registry invariant tests: after any committed sequence of cuts, the
//! forward map, the reverse index, and the facet set agree, and the
//! loupe views are mutually consistent.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use geode_engine::address::Address;
use geode_engine::cut_engine::{CutAction, FacetCut};
use geode_engine::diamond::{Diamond, DiamondClient};
use geode_engine::errors::EngineError;
use geode_engine::facet_registry::FacetRegistryView;
use geode_engine::host::{CallContext, ContractCode, Host};
use geode_engine::ownership::StorageOwnerGate;
use geode_engine::selector::Selector;

const OWNER: Address = Address([0x0a; 20]);
const DIAMOND: Address = Address([0xdd; 20]);

#[derive(Debug)]
struct Noop;

impl ContractCode for Noop {
    fn call(&self, _host: &mut Host, _ctx: &CallContext) -> Result<Vec<u8>, EngineError> {
        Ok(Vec::new())
    }
}

fn deployed_with_facets(n: u64) -> (Host, DiamondClient, Vec<Address>) {
    let mut host = Host::new();
    Diamond::deploy(&mut host, DIAMOND, OWNER, Arc::new(StorageOwnerGate)).expect("deploy");
    let facets: Vec<Address> = (1..=n).map(Address::from_low_u64).collect();
    for &facet in &facets {
        host.deploy(facet, Arc::new(Noop)).expect("facet");
    }
    (host, DiamondClient::new(DIAMOND, OWNER), facets)
}

fn sel(n: u8) -> Selector {
    Selector([0x40, 0x00, 0x00, n])
}

/// Cross-check every loupe view against every other and run the
/// word-level consistency checker.
fn assert_consistent(host: &mut Host, client: &DiamondClient, universe: &[Selector]) {
    let entries = client.facets(host).expect("facets");
    let addresses = client.facet_addresses(host).expect("addresses");
    assert_eq!(
        entries.iter().map(|e| e.facet).collect::<Vec<_>>(),
        addresses
    );

    let mut claimed: BTreeSet<Selector> = BTreeSet::new();
    for entry in &entries {
        assert!(!entry.selectors.is_empty(), "{} listed empty", entry.facet);
        assert_eq!(
            client
                .facet_function_selectors(host, entry.facet)
                .expect("selectors"),
            entry.selectors
        );
        for &selector in &entry.selectors {
            assert_eq!(
                client.facet_address(host, selector).expect("loupe"),
                entry.facet
            );
            assert!(claimed.insert(selector), "{selector} claimed twice");
        }
    }
    for &selector in universe {
        let bound = client.facet_address(host, selector).expect("loupe");
        assert_eq!(
            bound != Address::ZERO,
            claimed.contains(&selector),
            "loupe and enumeration disagree on {selector}"
        );
    }

    let violations = FacetRegistryView::at(host.storage(DIAMOND)).verify_consistency(universe);
    assert!(violations.is_empty(), "violations: {violations:?}");
}

#[test]
fn consistency_holds_through_an_interleaved_history() {
    let (mut host, client, facets) = deployed_with_facets(3);
    let universe: Vec<Selector> = (0..12).map(sel).collect();

    let steps: Vec<Vec<FacetCut>> = vec![
        vec![FacetCut {
            target: facets[0],
            action: CutAction::Add,
            selectors: universe[0..6].to_vec(),
        }],
        vec![FacetCut {
            target: facets[1],
            action: CutAction::Add,
            selectors: universe[6..9].to_vec(),
        }],
        vec![FacetCut {
            target: facets[2],
            action: CutAction::Replace,
            selectors: universe[2..5].to_vec(),
        }],
        vec![FacetCut {
            target: Address::ZERO,
            action: CutAction::Remove,
            selectors: vec![universe[0], universe[7]],
        }],
        vec![
            FacetCut {
                target: facets[1],
                action: CutAction::Add,
                selectors: vec![universe[0]],
            },
            FacetCut {
                target: facets[0],
                action: CutAction::Replace,
                selectors: vec![universe[8]],
            },
        ],
        vec![FacetCut {
            target: Address::ZERO,
            action: CutAction::Remove,
            selectors: universe[2..5].to_vec(),
        }],
    ];

    for (i, step) in steps.iter().enumerate() {
        client
            .cut(&mut host, step, Address::ZERO, &[])
            .unwrap_or_else(|err| panic!("step {i}: {err}"));
        assert_consistent(&mut host, &client, &universe);
    }
}

#[test]
fn emptying_the_registry_restores_the_deployment_state() {
    let (mut host, client, facets) = deployed_with_facets(2);
    let universe: Vec<Selector> = (0..8).map(sel).collect();
    let pristine = host.storage(DIAMOND).clone();

    client
        .cut(
            &mut host,
            &[
                FacetCut {
                    target: facets[0],
                    action: CutAction::Add,
                    selectors: universe[0..4].to_vec(),
                },
                FacetCut {
                    target: facets[1],
                    action: CutAction::Add,
                    selectors: universe[4..8].to_vec(),
                },
            ],
            Address::ZERO,
            &[],
        )
        .expect("populate");
    assert_consistent(&mut host, &client, &universe);

    client
        .cut(
            &mut host,
            &[FacetCut {
                target: Address::ZERO,
                action: CutAction::Remove,
                selectors: universe.clone(),
            }],
            Address::ZERO,
            &[],
        )
        .expect("empty");

    assert_eq!(host.storage(DIAMOND), &pristine);
    assert!(client.facets(&mut host).expect("facets").is_empty());
}

#[test]
fn removal_order_does_not_matter_for_the_final_state() {
    let universe: Vec<Selector> = (0..6).map(sel).collect();

    let run = |removal_order: Vec<Selector>| {
        let (mut host, client, facets) = deployed_with_facets(1);
        client
            .cut(
                &mut host,
                &[FacetCut {
                    target: facets[0],
                    action: CutAction::Add,
                    selectors: universe.clone(),
                }],
                Address::ZERO,
                &[],
            )
            .expect("populate");
        client
            .cut(
                &mut host,
                &[FacetCut {
                    target: Address::ZERO,
                    action: CutAction::Remove,
                    selectors: removal_order,
                }],
                Address::ZERO,
                &[],
            )
            .expect("remove");
        host.storage(DIAMOND).clone()
    };

    let forward = run(universe.clone());
    let mut reversed_order = universe.clone();
    reversed_order.reverse();
    let reversed = run(reversed_order);
    assert_eq!(forward, reversed);
}
