use std::collections::{BTreeMap, BTreeSet};

use ethers::types::Address;

use crate::abi::{AbiEntry, FunctionSignature, Selector};
use crate::error::EngineError;

/// The EIP-2535 cut action, wire-encoded as uint8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetCutAction {
    Add = 0,
    Replace = 1,
    Remove = 2,
}

impl FacetCutAction {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One atomic routing change for one facet.
///
/// Remove cuts carry the zero address: the selectors no longer route
/// anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetCut {
    pub facet_address: Address,
    pub action: FacetCutAction,
    pub selectors: Vec<Selector>,
}

/// Ordered collection of cuts, the unit submitted to the proxy.
///
/// Order is deterministic: facet deployment order, then Add/Replace/Remove
/// within a facet. A selector appears under at most one action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub cuts: Vec<FacetCut>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    pub fn selector_count(&self) -> usize {
        self.cuts.iter().map(|c| c.selectors.len()).sum()
    }

    /// The routing table that would result from applying this change-set.
    pub fn apply_to(&self, table: &RoutingTable) -> RoutingTable {
        let mut next = table.clone();
        for cut in &self.cuts {
            for selector in &cut.selectors {
                match cut.action {
                    FacetCutAction::Add | FacetCutAction::Replace => {
                        next.routes.insert(*selector, cut.facet_address);
                    }
                    FacetCutAction::Remove => {
                        next.routes.remove(selector);
                    }
                }
            }
        }
        next
    }
}

/// The proxy's current selector-to-facet routing, queried once per run and
/// never cached across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    routes: BTreeMap<Selector, Address>,
}

impl RoutingTable {
    pub fn route(&self, selector: Selector) -> Option<Address> {
        self.routes.get(&selector).copied()
    }

    pub fn insert(&mut self, selector: Selector, facet: Address) {
        self.routes.insert(selector, facet);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn selectors_of(&self, facet: Address) -> Vec<Selector> {
        self.routes
            .iter()
            .filter(|(_, addr)| **addr == facet)
            .map(|(selector, _)| *selector)
            .collect()
    }
}

impl FromIterator<(Selector, Address)> for RoutingTable {
    fn from_iter<I: IntoIterator<Item = (Selector, Address)>>(iter: I) -> Self {
        Self {
            routes: iter.into_iter().collect(),
        }
    }
}

/// A deployed facet's exported interface: address plus selector set.
/// Produced once per deployment, immediately after the address is known.
#[derive(Debug, Clone)]
pub struct FacetDescriptor {
    pub name: String,
    pub address: Address,
    pub selectors: BTreeSet<Selector>,
    pub signatures: BTreeMap<Selector, FunctionSignature>,
}

impl FacetDescriptor {
    /// Builds a descriptor from parsed interface entries; only functions
    /// carry selectors, events and errors never route.
    pub fn from_entries(name: &str, address: Address, entries: &[AbiEntry]) -> Self {
        let mut selectors = BTreeSet::new();
        let mut signatures = BTreeMap::new();
        for entry in entries {
            if let AbiEntry::Function(signature) = entry {
                let selector = signature.selector();
                selectors.insert(selector);
                signatures.insert(selector, signature.clone());
            }
        }
        Self {
            name: name.to_owned(),
            address,
            selectors,
            signatures,
        }
    }

    fn signature_text(&self, selector: Selector) -> String {
        self.signatures
            .get(&selector)
            .map(|s| s.canonical_form())
            .unwrap_or_else(|| selector.to_string())
    }
}

/// Computes the minimal change-set converging `table` toward one facet's
/// declared interface.
///
/// Selectors already routed to the facet's address are omitted entirely;
/// selectors routed to it but no longer declared are removed.
pub fn facet_cuts(table: &RoutingTable, facet: &FacetDescriptor) -> ChangeSet {
    let mut added = Vec::new();
    let mut replaced = Vec::new();
    for selector in &facet.selectors {
        match table.route(*selector) {
            None => added.push(*selector),
            Some(addr) if addr != facet.address => replaced.push(*selector),
            Some(_) => {}
        }
    }
    let removed: Vec<Selector> = table
        .selectors_of(facet.address)
        .into_iter()
        .filter(|selector| !facet.selectors.contains(selector))
        .collect();

    let mut cuts = Vec::new();
    if !added.is_empty() {
        cuts.push(FacetCut {
            facet_address: facet.address,
            action: FacetCutAction::Add,
            selectors: added,
        });
    }
    if !replaced.is_empty() {
        cuts.push(FacetCut {
            facet_address: facet.address,
            action: FacetCutAction::Replace,
            selectors: replaced,
        });
    }
    if !removed.is_empty() {
        cuts.push(FacetCut {
            facet_address: Address::zero(),
            action: FacetCutAction::Remove,
            selectors: removed,
        });
    }
    ChangeSet { cuts }
}

/// Concatenates per-facet change-sets in deployment order, validating that
/// no selector is claimed by two facets in the same run.
///
/// With `allow_reassignment`, a cross-facet claim is a deliberate handover:
/// the later facet wins and the earlier facet's claim on that selector is
/// dropped. Without it the collision is fatal.
pub fn combine(
    computed: &[(&FacetDescriptor, ChangeSet)],
    allow_reassignment: bool,
) -> Result<ChangeSet, EngineError> {
    let mut claimed: BTreeMap<Selector, usize> = BTreeMap::new();
    for (index, (facet, changes)) in computed.iter().enumerate() {
        for cut in &changes.cuts {
            if cut.action == FacetCutAction::Remove {
                continue;
            }
            for selector in &cut.selectors {
                if let Some(first) = claimed.insert(*selector, index) {
                    if !allow_reassignment {
                        return Err(EngineError::SelectorCollision {
                            selector: *selector,
                            signature: facet.signature_text(*selector),
                            first: computed[first].0.name.clone(),
                            second: facet.name.clone(),
                        });
                    }
                }
            }
        }
    }

    let mut combined = ChangeSet::default();
    for (index, (_, changes)) in computed.iter().enumerate() {
        for cut in &changes.cuts {
            let selectors: Vec<Selector> = match cut.action {
                // A selector another facet claims in this run stays routed;
                // dropping it from the Remove keeps one action per selector.
                FacetCutAction::Remove => cut
                    .selectors
                    .iter()
                    .filter(|selector| !claimed.contains_key(selector))
                    .copied()
                    .collect(),
                _ => cut
                    .selectors
                    .iter()
                    .filter(|selector| claimed.get(selector) == Some(&index))
                    .copied()
                    .collect(),
            };
            if !selectors.is_empty() {
                combined.cuts.push(FacetCut {
                    facet_address: cut.facet_address,
                    action: cut.action,
                    selectors,
                });
            }
        }
    }
    Ok(combined)
}
