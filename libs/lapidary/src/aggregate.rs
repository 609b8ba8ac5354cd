use std::collections::BTreeMap;

use crate::abi::{AbiEntry, Selector};
use crate::error::EngineError;
use crate::filter::{InclusionPolicy, OverlapTracker};

/// One facet's parsed interface, keyed by its fully-qualified name
/// (e.g. `contracts/facets/MedallionFacet.sol:MedallionFacet`).
#[derive(Debug, Clone)]
pub struct FacetAbi {
    pub qualified_name: String,
    pub entries: Vec<AbiEntry>,
}

/// Configuration for the combined-interface aggregation.
#[derive(Debug, Clone)]
pub struct DiamondAbiConfig {
    /// Display name of the combined interface.
    pub name: String,
    /// Substring rules selecting which facets participate; empty means all.
    pub include: Vec<String>,
    /// When set, two facets exporting the same function selector abort the
    /// aggregation instead of silently keeping the first.
    pub strict: bool,
    pub policy: InclusionPolicy,
}

impl DiamondAbiConfig {
    pub fn includes(&self, qualified_name: &str) -> bool {
        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|needle| qualified_name.contains(needle.as_str()))
    }
}

/// Aggregates facet interfaces into one combined description.
///
/// Events and errors deduplicate on canonical signature, first occurrence
/// kept; functions pass through the inclusion policy and, in strict mode,
/// cross-facet selector-collision validation. Output order follows input
/// order, so repeated runs over the same facet list are identical.
pub fn aggregate(
    facets: &[FacetAbi],
    config: &DiamondAbiConfig,
) -> Result<Vec<AbiEntry>, EngineError> {
    let mut tracker = OverlapTracker::default();
    let mut claimed: BTreeMap<Selector, (String, String)> = BTreeMap::new();
    let mut combined = Vec::new();

    for facet in facets {
        if !config.includes(&facet.qualified_name) {
            continue;
        }
        for entry in &facet.entries {
            let canonical = entry.canonical_form();
            match entry {
                AbiEntry::Event(_) => {
                    if tracker.is_duplicate_event(&facet.qualified_name, &canonical) {
                        continue;
                    }
                }
                AbiEntry::Error(_) => {
                    if tracker.is_duplicate_error(&facet.qualified_name, &canonical) {
                        continue;
                    }
                }
                AbiEntry::Function(signature) => {
                    if !config.policy.is_included(&facet.qualified_name, &canonical) {
                        continue;
                    }
                    if config.strict {
                        let selector = signature.selector();
                        if let Some((first, _)) = claimed.insert(
                            selector,
                            (facet.qualified_name.clone(), canonical.clone()),
                        ) {
                            return Err(EngineError::SelectorCollision {
                                selector,
                                signature: canonical,
                                first,
                                second: facet.qualified_name.clone(),
                            });
                        }
                    }
                }
            }
            combined.push(entry.clone());
        }
    }
    Ok(combined)
}
