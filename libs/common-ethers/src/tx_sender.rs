use std::str::FromStr;
use std::sync::Arc;

use ethers::{
    abi::Address,
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
};
use eyre::Context;
use lapidary::log_msg;

/// A signing JSON-RPC client bound to one deployer key.
///
/// The chain id is fetched from the node at construction so the wallet
/// signs for whatever chain the RPC endpoint fronts.
pub struct TxClient {
    client: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
}

impl TxClient {
    pub async fn try_new_from_url(
        rpc_url: &str,
        get_private_key: impl Fn() -> String,
    ) -> eyre::Result<Self> {
        let this = Self {
            client: {
                let provider = Provider::<Http>::try_from(rpc_url)
                    .context("Failed to construct the HTTP provider")?;
                let priv_key = get_private_key();
                let wallet = LocalWallet::from_str(&priv_key)
                    .context("Failed to parse the deployer private key")?;
                let chain_id = provider
                    .get_chainid()
                    .await
                    .context("Failed to fetch the chain id from the Ethereum client")?
                    .as_u64();
                log_msg!("connected to chain {}", chain_id);
                Arc::new(SignerMiddleware::new(
                    provider,
                    wallet.clone().with_chain_id(chain_id),
                ))
            },
        };
        Ok(this)
    }

    pub fn client(&self) -> Arc<SignerMiddleware<Provider<Http>, LocalWallet>> {
        self.client.clone()
    }

    pub fn address(&self) -> Address {
        self.client.address()
    }
}
