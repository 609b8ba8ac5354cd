use std::collections::BTreeMap;

/// One allow/deny rule over a combined-interface entry.
#[derive(Debug, Clone)]
pub enum InclusionRule {
    /// Matches an exact canonical signature, e.g. `transferFrom(address,address,uint256)`.
    Signature(String),
    /// Matches any signature or fully-qualified source starting with the prefix.
    NamePrefix(String),
}

impl InclusionRule {
    fn matches(&self, qualified_name: &str, signature: &str) -> bool {
        match self {
            Self::Signature(exact) => exact == signature,
            Self::NamePrefix(prefix) => {
                signature.starts_with(prefix.as_str()) || qualified_name.starts_with(prefix.as_str())
            }
        }
    }
}

/// Injected allow/deny policy for the aggregated interface summary.
///
/// Default: include everything not explicitly denied. Allow rules override
/// deny rules, so a broad prefix deny can carry narrow exceptions.
#[derive(Debug, Clone, Default)]
pub struct InclusionPolicy {
    pub allow: Vec<InclusionRule>,
    pub deny: Vec<InclusionRule>,
}

impl InclusionPolicy {
    pub fn is_included(&self, qualified_name: &str, signature: &str) -> bool {
        if self
            .allow
            .iter()
            .any(|rule| rule.matches(qualified_name, signature))
        {
            return true;
        }
        !self
            .deny
            .iter()
            .any(|rule| rule.matches(qualified_name, signature))
    }
}

/// Tracks event/error signatures already seen while aggregating facets.
///
/// An entry is a duplicate if its canonical signature was first seen under a
/// different fully-qualified source (shared internal libraries re-expose the
/// same declarations through several facets). Traversal in facet deployment
/// order makes first-occurrence attribution reproducible.
#[derive(Debug, Default)]
pub struct OverlapTracker {
    events: BTreeMap<String, String>,
    errors: BTreeMap<String, String>,
}

impl OverlapTracker {
    /// Records the event and reports whether it duplicates an earlier one.
    pub fn is_duplicate_event(&mut self, qualified_name: &str, canonical: &str) -> bool {
        Self::observe(&mut self.events, qualified_name, canonical)
    }

    /// Records the error and reports whether it duplicates an earlier one.
    pub fn is_duplicate_error(&mut self, qualified_name: &str, canonical: &str) -> bool {
        Self::observe(&mut self.errors, qualified_name, canonical)
    }

    /// The fully-qualified source the signature was first attributed to.
    pub fn first_source(&self, canonical: &str) -> Option<&str> {
        self.events
            .get(canonical)
            .or_else(|| self.errors.get(canonical))
            .map(String::as_str)
    }

    fn observe(
        seen: &mut BTreeMap<String, String>,
        qualified_name: &str,
        canonical: &str,
    ) -> bool {
        match seen.get(canonical) {
            Some(first) => first != qualified_name,
            None => {
                seen.insert(canonical.to_owned(), qualified_name.to_owned());
                false
            }
        }
    }
}
