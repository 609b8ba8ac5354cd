use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::contract::ContractFactory;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, U256};
use ethers::utils::parse_ether;
use eyre::{Context, OptionExt};
use itertools::Itertools;

use common_ethers::contracts::{DiamondCutFacet, DiamondLoupeFacet, FacetCut as WireFacetCut};
use common_ethers::tx_sender::TxClient;
use lapidary::abi::{parse_abi, AbiEntry, Selector};
use lapidary::changes::{ChangeSet, RoutingTable};
use lapidary::log_msg;

use crate::artifact::ArtifactStore;
use crate::execution::{CutReceipt, Deployed, Execution};

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Chain-backed execution over one signing client and one artifact
/// directory.
pub struct EthersExecution {
    client: Arc<Client>,
    deployer: Address,
    artifacts: ArtifactStore,
    minimum_balance: U256,
}

impl EthersExecution {
    pub fn new(client: &TxClient, artifacts: ArtifactStore) -> eyre::Result<Self> {
        Ok(Self {
            deployer: client.address(),
            client: client.client(),
            artifacts,
            minimum_balance: parse_ether("2.1")
                .map_err(|e| eyre::eyre!("bad balance floor: {}", e))?,
        })
    }
}

#[async_trait]
impl Execution for EthersExecution {
    fn deployer(&self) -> Address {
        self.deployer
    }

    fn module_interface(&self, module: &str) -> eyre::Result<Vec<AbiEntry>> {
        let artifact = self.artifacts.load(module)?;
        Ok(parse_abi(module, &artifact.abi)?)
    }

    async fn deploy_module(
        &self,
        module: &str,
        constructor_args: Vec<Token>,
        linked_libraries: &BTreeMap<String, Address>,
    ) -> eyre::Result<Deployed> {
        let artifact = self.artifacts.load(module)?;
        let abi = artifact.ethers_abi()?;
        let bytecode = artifact.linked_bytecode(linked_libraries)?;
        let factory = ContractFactory::new(abi, bytecode, self.client.clone());
        let (contract, receipt) = factory
            .deploy_tokens(constructor_args)
            .with_context(|| format!("Failed to prepare the deployment of {}", module))?
            .send_with_receipt()
            .await
            .with_context(|| format!("Failed to deploy {}", module))?;
        log_msg!("{} deployed at {:?}", module, contract.address());
        Ok(Deployed {
            address: contract.address(),
            confirmed: receipt.status == Some(1.into()),
        })
    }

    async fn routing_table(&self, proxy: Address) -> eyre::Result<RoutingTable> {
        let loupe = DiamondLoupeFacet::new(proxy, self.client.clone());
        let facets = loupe
            .facets()
            .call()
            .await
            .context("Failed to query the loupe for the current routing")?;
        Ok(facets
            .into_iter()
            .flat_map(|facet| {
                let address = facet.0;
                facet
                    .1
                    .into_iter()
                    .map(move |raw| (Selector(raw), address))
            })
            .collect())
    }

    async fn submit_cuts(
        &self,
        proxy: Address,
        changes: &ChangeSet,
        init_address: Address,
        init_calldata: Bytes,
    ) -> eyre::Result<CutReceipt> {
        let cuts: Vec<WireFacetCut> = changes
            .cuts
            .iter()
            .map(|cut| WireFacetCut {
                facet_address: cut.facet_address,
                action: cut.action.code(),
                function_selectors: cut.selectors.iter().map(Selector::as_bytes).collect(),
            })
            .collect();
        log_msg!(
            "submitting {} cuts: {}",
            cuts.len(),
            changes
                .cuts
                .iter()
                .map(|cut| format!("{:?} x{}", cut.action, cut.selectors.len()))
                .join(", ")
        );
        let cutter = DiamondCutFacet::new(proxy, self.client.clone());
        let receipt = cutter
            .diamond_cut(cuts, init_address, init_calldata)
            .send()
            .await
            .context("Failed to send the diamondCut transaction")?
            .await
            .context("Failed to obtain the diamondCut receipt")?
            .ok_or_eyre("diamondCut receipt missing")?;
        Ok(CutReceipt {
            tx_hash: receipt.transaction_hash,
            status_ok: receipt.status == Some(1.into()),
        })
    }

    async fn balance_of(&self, account: Address) -> eyre::Result<U256> {
        self.client
            .get_balance(account, None)
            .await
            .context("Failed to fetch the deployer balance")
    }

    fn minimum_balance(&self) -> U256 {
        self.minimum_balance
    }
}
