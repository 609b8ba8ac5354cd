use ethers::types::{Address, H256, U256};
use thiserror::Error;

use lapidary::error::EngineError;

use crate::artifact::ArtifactError;

/// Orchestration failures. Every variant is fatal; re-running the
/// orchestration is the recovery path.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("deployer {account} holds {balance} wei, the run requires {required}")]
    InsufficientFunds {
        account: Address,
        required: U256,
        balance: U256,
    },

    #[error("deployment of {module} was not confirmed")]
    DeploymentFailure { module: String },

    #[error("diamondCut transaction {tx:?} reverted")]
    CutRejected { tx: H256 },
}
