use std::env;

use clap::{Parser, Subcommand};
use ethers::types::Address;
use eyre::Context;

use common_ethers::tx_sender::TxClient;
use foreman::artifact::ArtifactStore;
use foreman::config::{
    DeployConfig, FacetSpec, InitializerSpec, LibrarySpec, TargetKind, TokenMetadata,
    UpgradeConfig,
};
use foreman::deploy::{run_deployment, upgrade_facets};
use foreman::ethers::EthersExecution;
use lapidary::log_msg;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long)]
    rpc_url: Option<String>,

    /// Directory of compiled artifact JSON files.
    #[arg(long, default_value = "artifacts")]
    artifacts: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a fresh diamond and route every declared facet.
    Deploy {
        #[arg(long, default_value = "Medallion")]
        name: String,

        #[arg(long, default_value = "MDL")]
        symbol: String,

        #[arg(long, default_value = "https://medallions.example/token/")]
        base_uri: String,

        /// Proxy owner; defaults to the deployer account.
        #[arg(long)]
        owner: Option<String>,

        #[arg(long)]
        production: bool,

        #[arg(long)]
        allow_reassignment: bool,
    },
    /// Converge an existing diamond toward a new facet set.
    Upgrade {
        #[arg(long)]
        proxy: String,

        /// Facet module names to redeploy; all manifest facets when empty.
        #[arg(long = "facet")]
        facets: Vec<String>,

        #[arg(long)]
        allow_reassignment: bool,
    },
}

fn get_private_key() -> String {
    env::var("DEPLOYER_PRIVATE_KEY").expect("DEPLOYER_PRIVATE_KEY not found in environment")
}

fn medallion_manifest() -> (Vec<LibrarySpec>, Vec<FacetSpec>) {
    let library = |name: &str, links: &[&str]| LibrarySpec {
        name: name.to_owned(),
        links: links.iter().map(|&l| l.to_owned()).collect(),
    };
    let facet = |name: &str, links: &[&str]| FacetSpec {
        name: name.to_owned(),
        links: links.iter().map(|&l| l.to_owned()).collect(),
    };
    let libraries = vec![
        library("LibStrings", &[]),
        library("LibMeta", &[]),
        library("LibMedallion", &["LibStrings", "LibMeta"]),
        library("LibEmblem", &["LibMeta"]),
    ];
    let facets = vec![
        facet("MedallionFacet", &["LibMedallion", "LibStrings"]),
        facet("EmblemFacet", &["LibEmblem"]),
    ];
    (libraries, facets)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let rpc_url = cli.rpc_url.unwrap_or("http://localhost:8547".to_owned());

    let client = TxClient::try_new_from_url(&rpc_url, get_private_key).await?;
    let exec = EthersExecution::new(&client, ArtifactStore::new(&cli.artifacts))?;

    match cli.command {
        Command::Deploy {
            name,
            symbol,
            base_uri,
            owner,
            production,
            allow_reassignment,
        } => {
            let owner = match owner {
                Some(text) => text.parse().context("Failed to parse the owner address")?,
                None => client.address(),
            };
            let (libraries, facets) = medallion_manifest();
            let config = DeployConfig {
                target: if production {
                    TargetKind::Production
                } else {
                    TargetKind::Development
                },
                owner,
                token: TokenMetadata {
                    name,
                    symbol,
                    base_uri,
                },
                libraries,
                facets,
                initializer: InitializerSpec {
                    name: "MedallionInit".to_owned(),
                    function: "init((string,string,string))".to_owned(),
                },
                allow_reassignment,
            };
            let outcome = run_deployment(&config, &exec).await?;
            println!("Diamond deployed");
            println!("  proxy      : {:?}", outcome.proxy);
            println!("  initializer: {:?}", outcome.initializer);
            println!("  cut tx     : {:?}", outcome.cut_tx);
        }
        Command::Upgrade {
            proxy,
            facets,
            allow_reassignment,
        } => {
            let proxy: Address = proxy.parse().context("Failed to parse the proxy address")?;
            let (libraries, manifest) = medallion_manifest();
            let chosen: Vec<FacetSpec> = if facets.is_empty() {
                manifest
            } else {
                manifest
                    .into_iter()
                    .filter(|f| facets.contains(&f.name))
                    .collect()
            };
            let config = UpgradeConfig {
                proxy,
                libraries,
                facets: chosen,
                initializer: None,
                allow_reassignment,
            };
            let outcome = upgrade_facets(&config, &exec).await?;
            match outcome.cut_tx {
                Some(tx) => println!("Upgrade committed in {:?}", tx),
                None => println!("Routing already converged, nothing submitted"),
            }
        }
    }

    log_msg!("Done.");
    Ok(())
}
