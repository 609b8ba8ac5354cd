use std::collections::HashMap;

use ethers::types::Address;
use serde_json::json;

use crate::abi::{parse_abi, AbiEntry, FunctionSignature, ParamType};
use crate::aggregate::{aggregate, DiamondAbiConfig, FacetAbi};
use crate::changes::{combine, facet_cuts, FacetCutAction, FacetDescriptor, RoutingTable};
use crate::error::EngineError;
use crate::filter::{InclusionPolicy, InclusionRule, OverlapTracker};

mod test_utils {
    use super::*;

    pub(super) fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    pub(super) fn sig(text: &str) -> FunctionSignature {
        FunctionSignature::parse("test", text).expect("signature should parse")
    }

    pub(super) fn descriptor(name: &str, address: Address, sigs: &[&str]) -> FacetDescriptor {
        let entries: Vec<AbiEntry> = sigs
            .iter()
            .map(|text| AbiEntry::Function(sig(text)))
            .collect();
        FacetDescriptor::from_entries(name, address, &entries)
    }

    pub(super) fn routed(
        table: &RoutingTable,
        facet: &FacetDescriptor,
        text: &str,
    ) -> Option<Address> {
        let _ = facet;
        table.route(sig(text).selector())
    }
}

mod codec_tests {
    use super::test_utils::*;
    use super::*;

    #[test]
    fn canonical_form_has_no_whitespace_and_widens_aliases() {
        assert_eq!(
            sig("transfer(address,uint)").canonical_form(),
            "transfer(address,uint256)"
        );
        assert_eq!(
            sig("init((string,string,string))").canonical_form(),
            "init((string,string,string))"
        );
        assert_eq!(
            sig("store(uint128,uint8[])").canonical_form(),
            "store(uint128,uint8[])"
        );
        assert_eq!(
            sig("grid(uint256[3][])").canonical_form(),
            "grid(uint256[3][])"
        );
    }

    #[test]
    fn selector_matches_known_vectors() {
        assert_eq!(
            sig("transfer(address,uint256)").selector().to_string(),
            "0xa9059cbb"
        );
        assert_eq!(
            sig("supportsInterface(bytes4)").selector().to_string(),
            "0x01ffc9a7"
        );
        // The EIP-2535 cut entry point itself.
        assert_eq!(
            sig("diamondCut((address,uint8,bytes4[])[],address,bytes)")
                .selector()
                .to_string(),
            "0x1f931c1c"
        );
    }

    #[test]
    fn selector_is_stable_across_calls() {
        let signature = sig("tokenURI(uint256)");
        assert_eq!(signature.selector(), signature.selector());
        assert_eq!(signature.selector(), sig("tokenURI(uint256)").selector());
    }

    #[test]
    fn no_collisions_over_a_generated_corpus() {
        let verbs = [
            "get", "set", "mint", "burn", "transfer", "approve", "store", "load", "update",
            "remove", "claim", "submit", "register", "withdraw", "deposit", "pause",
        ];
        let nouns = [
            "Token", "Owner", "Balance", "Medallion", "Emblem", "Record", "Quote", "Index",
            "Route", "Facet", "Supply", "Metadata",
        ];
        let params = [
            "",
            "uint256",
            "address",
            "address,uint256",
            "bytes32,address",
            "uint128,uint8[]",
            "(string,string,string)",
            "bytes4[],address",
            "string,uint64",
        ];
        let mut seen: HashMap<_, String> = HashMap::new();
        for verb in verbs {
            for noun in nouns {
                for param in params {
                    let signature = sig(&format!("{}{}({})", verb, noun, param));
                    let canonical = signature.canonical_form();
                    if let Some(previous) = seen.insert(signature.selector(), canonical.clone()) {
                        panic!(
                            "selector collision between `{}` and `{}`",
                            previous, canonical
                        );
                    }
                }
            }
        }
        assert_eq!(seen.len(), verbs.len() * nouns.len() * params.len());
    }

    #[test]
    fn parse_abi_classifies_by_declared_kind() {
        let abi = json!([
            { "type": "function", "name": "mint", "inputs": [{ "name": "to", "type": "address" }] },
            { "type": "event", "name": "Transfer", "inputs": [
                { "name": "from", "type": "address", "indexed": true },
                { "name": "to", "type": "address", "indexed": true },
                { "name": "tokenId", "type": "uint256", "indexed": true }
            ] },
            { "type": "error", "name": "NotOwner", "inputs": [] },
            { "type": "constructor", "inputs": [{ "name": "owner", "type": "address" }] },
            { "type": "fallback", "stateMutability": "payable" }
        ]);
        let entries = parse_abi("MedallionFacet", &abi).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(matches!(&entries[0], AbiEntry::Function(s) if s.canonical_form() == "mint(address)"));
        assert!(matches!(
            &entries[1],
            AbiEntry::Event(s) if s.canonical_form() == "Transfer(address,address,uint256)"
        ));
        assert!(matches!(&entries[2], AbiEntry::Error(s) if s.canonical_form() == "NotOwner()"));
    }

    #[test]
    fn parse_abi_resolves_tuple_components() {
        let abi = json!([
            { "type": "function", "name": "init", "inputs": [{
                "name": "args",
                "type": "tuple",
                "components": [
                    { "name": "name", "type": "string" },
                    { "name": "symbol", "type": "string" },
                    { "name": "baseURI", "type": "string" }
                ]
            }] }
        ]);
        let entries = parse_abi("MedallionInit", &abi).unwrap();
        assert_eq!(
            entries[0].canonical_form(),
            "init((string,string,string))"
        );
        let AbiEntry::Function(signature) = &entries[0] else {
            panic!("expected a function entry");
        };
        assert_eq!(
            signature.inputs[0],
            ParamType::Tuple(vec![
                ParamType::Elementary("string".to_owned()),
                ParamType::Elementary("string".to_owned()),
                ParamType::Elementary("string".to_owned()),
            ])
        );
    }

    #[test]
    fn malformed_type_is_rejected_with_facet_context() {
        let abi = json!([
            { "type": "function", "name": "broken", "inputs": [{ "name": "x", "type": "uint257" }] }
        ]);
        let err = parse_abi("EmblemFacet", &abi).unwrap_err();
        let EngineError::MalformedSignature { facet, reason } = err else {
            panic!("expected MalformedSignature");
        };
        assert_eq!(facet, "EmblemFacet");
        assert!(reason.contains("uint257"));
    }

    #[test]
    fn unknown_entry_kind_is_rejected() {
        let abi = json!([{ "type": "modifier", "name": "onlyOwner" }]);
        assert!(matches!(
            parse_abi("EmblemFacet", &abi),
            Err(EngineError::MalformedSignature { .. })
        ));
    }
}

mod filter_tests {
    use super::*;

    #[test]
    fn first_occurrence_wins_and_later_sources_are_duplicates() {
        let mut tracker = OverlapTracker::default();
        assert!(!tracker.is_duplicate_event("a.sol:A", "Transfer(address,address,uint256)"));
        assert!(tracker.is_duplicate_event("b.sol:B", "Transfer(address,address,uint256)"));
        assert_eq!(
            tracker.first_source("Transfer(address,address,uint256)"),
            Some("a.sol:A")
        );
        // Errors track independently of events.
        assert!(!tracker.is_duplicate_error("b.sol:B", "NotOwner()"));
        assert!(tracker.is_duplicate_error("c.sol:C", "NotOwner()"));
    }

    #[test]
    fn default_policy_includes_everything() {
        let policy = InclusionPolicy::default();
        assert!(policy.is_included("a.sol:A", "mint(address)"));
    }

    #[test]
    fn deny_rules_exclude_and_allow_rules_override() {
        let policy = InclusionPolicy {
            allow: vec![InclusionRule::Signature("transferOwnership(address)".to_owned())],
            deny: vec![InclusionRule::NamePrefix("transfer".to_owned())],
        };
        assert!(!policy.is_included("a.sol:A", "transfer(address,uint256)"));
        assert!(policy.is_included("a.sol:A", "transferOwnership(address)"));
        assert!(policy.is_included("a.sol:A", "mint(address)"));
    }
}

mod aggregate_tests {
    use super::test_utils::*;
    use super::*;

    fn facet(qualified_name: &str, functions: &[&str], events: &[&str]) -> FacetAbi {
        let mut entries: Vec<AbiEntry> = functions
            .iter()
            .map(|text| AbiEntry::Function(sig(text)))
            .collect();
        entries.extend(events.iter().map(|text| AbiEntry::Event(sig(text))));
        FacetAbi {
            qualified_name: qualified_name.to_owned(),
            entries,
        }
    }

    fn config(strict: bool) -> DiamondAbiConfig {
        DiamondAbiConfig {
            name: "Medallion".to_owned(),
            include: vec!["Facet".to_owned()],
            strict,
            policy: InclusionPolicy::default(),
        }
    }

    #[test]
    fn shared_event_appears_once_attributed_to_first_facet() {
        let facets = [
            facet(
                "MedallionFacet.sol:MedallionFacet",
                &["mint(address)"],
                &["Transfer(address,address,uint256)"],
            ),
            facet(
                "EmblemFacet.sol:EmblemFacet",
                &["storeEmblem(uint256,bytes)"],
                &["Transfer(address,address,uint256)"],
            ),
        ];
        let combined = aggregate(&facets, &config(true)).unwrap();
        let events: Vec<_> = combined
            .iter()
            .filter(|e| matches!(e, AbiEntry::Event(_)))
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(combined.len(), 3);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let facets = [
            facet("MedallionFacet.sol:MedallionFacet", &["mint(address)"], &[]),
            facet("EmblemFacet.sol:EmblemFacet", &["storeEmblem(uint256,bytes)"], &[]),
        ];
        let first = aggregate(&facets, &config(true)).unwrap();
        let second = aggregate(&facets, &config(true)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn strict_mode_rejects_cross_facet_selector_overlap() {
        let facets = [
            facet("MedallionFacet.sol:MedallionFacet", &["mint(address)"], &[]),
            facet("EmblemFacet.sol:EmblemFacet", &["mint(address)"], &[]),
        ];
        let err = aggregate(&facets, &config(true)).unwrap_err();
        assert!(matches!(err, EngineError::SelectorCollision { .. }));
    }

    #[test]
    fn non_matching_facets_are_skipped() {
        let facets = [
            facet("MedallionFacet.sol:MedallionFacet", &["mint(address)"], &[]),
            facet("LibStrings.sol:LibStrings", &["concat(string,string)"], &[]),
        ];
        let combined = aggregate(&facets, &config(true)).unwrap();
        assert_eq!(combined.len(), 1);
    }
}

mod change_engine_tests {
    use super::test_utils::*;
    use super::*;

    // Scenario: empty routing table, one facet with 3 selectors.
    #[test]
    fn fresh_facet_yields_a_single_add_cut() {
        let table = RoutingTable::default();
        let facet = descriptor(
            "MedallionFacet",
            addr(0xA),
            &["mint(address)", "burn(uint256)", "tokenURI(uint256)"],
        );
        let changes = facet_cuts(&table, &facet);
        assert_eq!(changes.cuts.len(), 1);
        assert_eq!(changes.cuts[0].action, FacetCutAction::Add);
        assert_eq!(changes.cuts[0].facet_address, addr(0xA));
        assert_eq!(changes.cuts[0].selectors.len(), 3);
    }

    // Scenario: facet drops one of its routed selectors.
    #[test]
    fn dropped_selector_yields_a_single_remove_cut() {
        let full = descriptor(
            "MedallionFacet",
            addr(0xA),
            &["mint(address)", "burn(uint256)", "tokenURI(uint256)"],
        );
        let table = facet_cuts(&RoutingTable::default(), &full).apply_to(&RoutingTable::default());
        let trimmed = descriptor("MedallionFacet", addr(0xA), &["mint(address)", "burn(uint256)"]);
        let changes = facet_cuts(&table, &trimmed);
        assert_eq!(changes.cuts.len(), 1);
        assert_eq!(changes.cuts[0].action, FacetCutAction::Remove);
        assert_eq!(changes.cuts[0].facet_address, Address::zero());
        assert_eq!(
            changes.cuts[0].selectors,
            vec![sig("tokenURI(uint256)").selector()]
        );
    }

    // Scenario: facet re-deployed to a new address with identical selectors.
    #[test]
    fn redeployed_facet_yields_a_single_replace_cut() {
        let old = descriptor("MedallionFacet", addr(0xA), &["mint(address)", "burn(uint256)"]);
        let table = facet_cuts(&RoutingTable::default(), &old).apply_to(&RoutingTable::default());
        let redeployed =
            descriptor("MedallionFacet", addr(0xB), &["mint(address)", "burn(uint256)"]);
        let changes = facet_cuts(&table, &redeployed);
        assert_eq!(changes.cuts.len(), 1);
        assert_eq!(changes.cuts[0].action, FacetCutAction::Replace);
        assert_eq!(changes.cuts[0].facet_address, addr(0xB));
        assert_eq!(changes.cuts[0].selectors.len(), 2);
    }

    #[test]
    fn converged_facet_yields_no_cuts() {
        let facet = descriptor("MedallionFacet", addr(0xA), &["mint(address)", "burn(uint256)"]);
        let table = facet_cuts(&RoutingTable::default(), &facet).apply_to(&RoutingTable::default());
        assert!(facet_cuts(&table, &facet).is_empty());
    }

    #[test]
    fn applying_the_change_set_converges_the_table() {
        let stale = descriptor(
            "MedallionFacet",
            addr(0xA),
            &["mint(address)", "burn(uint256)", "tokenURI(uint256)"],
        );
        let table = facet_cuts(&RoutingTable::default(), &stale).apply_to(&RoutingTable::default());

        // New address, one selector dropped, one added.
        let next = descriptor(
            "MedallionFacet",
            addr(0xB),
            &["mint(address)", "burn(uint256)", "pause()"],
        );
        let changes = facet_cuts(&table, &next);
        let converged = changes.apply_to(&table);

        for text in ["mint(address)", "burn(uint256)", "pause()"] {
            assert_eq!(routed(&converged, &next, text), Some(addr(0xB)));
        }
        // Stale address only: tokenURI was routed to 0xA, which the new
        // interface no longer declares, but 0xA is a different address so
        // removal is out of this facet's scope per the address-match rule.
        assert_eq!(routed(&converged, &next, "tokenURI(uint256)"), Some(addr(0xA)));
        // One action per selector.
        let mut seen = std::collections::HashSet::new();
        for cut in &changes.cuts {
            for selector in &cut.selectors {
                assert!(seen.insert(*selector), "selector listed twice: {}", selector);
            }
        }
    }

    #[test]
    fn selector_buckets_are_disjoint() {
        let mut table = RoutingTable::default();
        table.insert(sig("mint(address)").selector(), addr(0xC));
        table.insert(sig("burn(uint256)").selector(), addr(0xA));
        table.insert(sig("tokenURI(uint256)").selector(), addr(0xA));
        let facet = descriptor(
            "MedallionFacet",
            addr(0xA),
            &["mint(address)", "burn(uint256)", "pause()"],
        );
        let changes = facet_cuts(&table, &facet);
        // pause is new, mint moves from 0xC, tokenURI is removed, burn is
        // untouched.
        assert_eq!(changes.cuts.len(), 3);
        assert_eq!(changes.selector_count(), 3);
        let actions: Vec<FacetCutAction> = changes.cuts.iter().map(|c| c.action).collect();
        assert_eq!(
            actions,
            vec![FacetCutAction::Add, FacetCutAction::Replace, FacetCutAction::Remove]
        );
    }

    #[test]
    fn cross_facet_collision_aborts_the_combine() {
        let table = RoutingTable::default();
        let first = descriptor("MedallionFacet", addr(0xA), &["mint(address)", "pause()"]);
        let second = descriptor("EmblemFacet", addr(0xB), &["mint(address)"]);
        let computed = [
            (&first, facet_cuts(&table, &first)),
            (&second, facet_cuts(&table, &second)),
        ];
        let err = combine(&computed, false).unwrap_err();
        let EngineError::SelectorCollision {
            signature,
            first,
            second,
            ..
        } = err
        else {
            panic!("expected SelectorCollision");
        };
        assert_eq!(signature, "mint(address)");
        assert_eq!(first, "MedallionFacet");
        assert_eq!(second, "EmblemFacet");
    }

    #[test]
    fn flagged_reassignment_routes_to_the_later_facet() {
        let table = RoutingTable::default();
        let first = descriptor("MedallionFacet", addr(0xA), &["mint(address)", "pause()"]);
        let second = descriptor("EmblemFacet", addr(0xB), &["mint(address)"]);
        let computed = [
            (&first, facet_cuts(&table, &first)),
            (&second, facet_cuts(&table, &second)),
        ];
        let combined = combine(&computed, true).unwrap();
        let converged = combined.apply_to(&table);
        assert_eq!(routed(&converged, &second, "mint(address)"), Some(addr(0xB)));
        assert_eq!(routed(&converged, &first, "pause()"), Some(addr(0xA)));
    }

    #[test]
    fn removal_yields_to_another_facets_claim() {
        // MedallionFacet owned mint and drops it; EmblemFacet takes it over
        // in the same run. The remove must not fight the replace.
        let old_owner = descriptor("MedallionFacet", addr(0xA), &["mint(address)", "pause()"]);
        let table =
            facet_cuts(&RoutingTable::default(), &old_owner).apply_to(&RoutingTable::default());
        let shrunk = descriptor("MedallionFacet", addr(0xA), &["pause()"]);
        let taker = descriptor("EmblemFacet", addr(0xB), &["mint(address)"]);
        let computed = [
            (&shrunk, facet_cuts(&table, &shrunk)),
            (&taker, facet_cuts(&table, &taker)),
        ];
        let combined = combine(&computed, false).unwrap();
        let converged = combined.apply_to(&table);
        assert_eq!(routed(&converged, &taker, "mint(address)"), Some(addr(0xB)));
        let mut seen = std::collections::HashSet::new();
        for cut in &combined.cuts {
            for selector in &cut.selectors {
                assert!(seen.insert(*selector), "selector listed twice: {}", selector);
            }
        }
    }

    #[test]
    fn combined_order_follows_deployment_order() {
        let table = RoutingTable::default();
        let loupe = descriptor(
            "DiamondLoupeFacet",
            addr(2),
            &["facets()", "facetAddress(bytes4)"],
        );
        let ownership = descriptor(
            "OwnershipFacet",
            addr(3),
            &["owner()", "transferOwnership(address)"],
        );
        let computed = [
            (&loupe, facet_cuts(&table, &loupe)),
            (&ownership, facet_cuts(&table, &ownership)),
        ];
        let combined = combine(&computed, false).unwrap();
        assert_eq!(combined.cuts.len(), 2);
        assert_eq!(combined.cuts[0].facet_address, addr(2));
        assert_eq!(combined.cuts[1].facet_address, addr(3));
    }
}
