use thiserror::Error;

use crate::abi::Selector;

/// Errors raised while canonicalizing facet interfaces or computing cuts.
///
/// Both are configuration mistakes, not transients. Callers abort the run;
/// nothing here is retried.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed signature in {facet}: {reason}")]
    MalformedSignature { facet: String, reason: String },

    #[error(
        "selector collision on {selector} ({signature}): claimed by {first} and {second}"
    )]
    SelectorCollision {
        selector: Selector,
        signature: String,
        first: String,
        second: String,
    },
}
