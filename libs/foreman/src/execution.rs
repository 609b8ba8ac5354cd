use std::collections::BTreeMap;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256, U256};

use lapidary::abi::{AbiEntry, FunctionSignature};
use lapidary::changes::{ChangeSet, RoutingTable};

use crate::error::DeployError;

/// Outcome of one module deployment.
#[derive(Debug, Clone, Copy)]
pub struct Deployed {
    pub address: Address,
    pub confirmed: bool,
}

/// Outcome of the diamondCut submission.
#[derive(Debug, Clone, Copy)]
pub struct CutReceipt {
    pub tx_hash: H256,
    pub status_ok: bool,
}

/// Everything the orchestrator needs from the outside world.
///
/// The orchestrator never talks to a provider directly; it drives this
/// trait, so tests can substitute a recording double for the chain.
#[async_trait]
pub trait Execution {
    /// The account paying for the run.
    fn deployer(&self) -> Address;

    /// Parsed interface entries for a module, straight from its artifact.
    fn module_interface(&self, module: &str) -> eyre::Result<Vec<AbiEntry>>;

    /// Deploys one module with the given constructor arguments, splicing
    /// the named library addresses into its bytecode, and waits for the
    /// confirmation receipt.
    async fn deploy_module(
        &self,
        module: &str,
        constructor_args: Vec<Token>,
        linked_libraries: &BTreeMap<String, Address>,
    ) -> eyre::Result<Deployed>;

    /// The proxy's current selector routing, via its loupe facet.
    async fn routing_table(&self, proxy: Address) -> eyre::Result<RoutingTable>;

    /// Submits one atomic diamondCut transaction and waits for its receipt.
    async fn submit_cuts(
        &self,
        proxy: Address,
        changes: &ChangeSet,
        init_address: Address,
        init_calldata: Bytes,
    ) -> eyre::Result<CutReceipt>;

    async fn balance_of(&self, account: Address) -> eyre::Result<U256>;

    /// Balance floor enforced on production targets.
    fn minimum_balance(&self) -> U256;

    /// ABI-encoded call data for the initializer: four selector bytes
    /// followed by the encoded arguments.
    fn encode_init_call(
        &self,
        module: &str,
        function: &str,
        args: &[Token],
    ) -> eyre::Result<Bytes> {
        let signature =
            FunctionSignature::parse(module, function).map_err(DeployError::from)?;
        let mut data = signature.selector().as_bytes().to_vec();
        data.extend_from_slice(&ethers::abi::encode(args));
        Ok(Bytes::from(data))
    }
}
