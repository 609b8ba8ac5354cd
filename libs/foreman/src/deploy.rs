use std::collections::BTreeMap;

use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256};

use lapidary::abi::AbiEntry;
use lapidary::changes::{combine, facet_cuts, ChangeSet, FacetDescriptor, RoutingTable};
use lapidary::log_msg;

use crate::artifact::ArtifactError;
use crate::config::{DeployConfig, TargetKind, TokenMetadata, UpgradeConfig};
use crate::error::DeployError;
use crate::execution::{Deployed, Execution};

pub const CUT_FACET: &str = "DiamondCutFacet";
pub const LOUPE_FACET: &str = "DiamondLoupeFacet";
pub const OWNERSHIP_FACET: &str = "OwnershipFacet";
pub const PROXY: &str = "Diamond";

/// Progress marker for one orchestration run. On failure the error report
/// names the last phase completed, so the operator knows what is already
/// on-chain before re-running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    LibrariesDeployed,
    MandatoryFacetsDeployed,
    ProxyDeployed,
    InitializerDeployed,
    DomainFacetsDeployed,
    ChangesComputed,
    CutSubmitted,
    Committed,
}

#[derive(Debug, Clone, Copy)]
pub struct DeployOutcome {
    pub proxy: Address,
    pub initializer: Address,
    pub cut_tx: H256,
}

#[derive(Debug, Clone, Copy)]
pub struct UpgradeOutcome {
    pub proxy: Address,
    /// None when the routing was already converged and nothing was
    /// submitted.
    pub cut_tx: Option<H256>,
}

/// Deploys a fresh diamond: libraries, mandatory facets, proxy,
/// initializer, domain facets, then one atomic cut routing everything.
///
/// Strictly sequential; each deployment awaits its confirmation before the
/// next begins. There are no retries, re-running the orchestration is the
/// recovery path.
pub async fn run_deployment<X: Execution + Sync>(
    config: &DeployConfig,
    exec: &X,
) -> eyre::Result<DeployOutcome> {
    let mut phase = Phase::Idle;
    match drive_deployment(config, exec, &mut phase).await {
        Ok(outcome) => Ok(outcome),
        Err(report) => Err(report.wrap_err(format!("deployment halted after {:?}", phase))),
    }
}

async fn drive_deployment<X: Execution + Sync>(
    config: &DeployConfig,
    exec: &X,
    phase: &mut Phase,
) -> eyre::Result<DeployOutcome> {
    // Interfaces parse before anything is spent; a garbled artifact aborts
    // with zero deployments behind it.
    let mut interfaces: BTreeMap<String, Vec<AbiEntry>> = BTreeMap::new();
    for module in [CUT_FACET, LOUPE_FACET, OWNERSHIP_FACET]
        .into_iter()
        .chain([config.initializer.name.as_str()])
        .chain(config.facets.iter().map(|f| f.name.as_str()))
    {
        interfaces.insert(module.to_owned(), exec.module_interface(module)?);
    }

    if config.target == TargetKind::Production {
        let balance = exec.balance_of(exec.deployer()).await?;
        let required = exec.minimum_balance();
        if balance < required {
            return Err(DeployError::InsufficientFunds {
                account: exec.deployer(),
                required,
                balance,
            }
            .into());
        }
    }

    let mut links: BTreeMap<String, Address> = BTreeMap::new();
    for library in &config.libraries {
        let wanted = subset(&links, &library.links, &library.name)?;
        let deployed = deploy_one(exec, &library.name, Vec::new(), &wanted).await?;
        links.insert(library.name.clone(), deployed.address);
    }
    *phase = Phase::LibrariesDeployed;

    let cut_facet = deploy_one(exec, CUT_FACET, Vec::new(), &BTreeMap::new()).await?;
    let loupe = deploy_one(exec, LOUPE_FACET, Vec::new(), &BTreeMap::new()).await?;
    let ownership = deploy_one(exec, OWNERSHIP_FACET, Vec::new(), &BTreeMap::new()).await?;
    *phase = Phase::MandatoryFacetsDeployed;

    let proxy = deploy_one(
        exec,
        PROXY,
        vec![
            Token::Address(config.owner),
            Token::Address(cut_facet.address),
        ],
        &BTreeMap::new(),
    )
    .await?;
    *phase = Phase::ProxyDeployed;

    let initializer =
        deploy_one(exec, &config.initializer.name, Vec::new(), &BTreeMap::new()).await?;
    *phase = Phase::InitializerDeployed;

    // The proxy constructor routes only the cut facet, and the loupe
    // cannot answer until this run routes it, so the diff baseline is the
    // empty table.
    let table = RoutingTable::default();
    let mut descriptors = vec![
        descriptor(LOUPE_FACET, loupe.address, &interfaces),
        descriptor(OWNERSHIP_FACET, ownership.address, &interfaces),
    ];
    for spec in &config.facets {
        let wanted = subset(&links, &spec.links, &spec.name)?;
        let deployed = deploy_one(exec, &spec.name, Vec::new(), &wanted).await?;
        descriptors.push(descriptor(&spec.name, deployed.address, &interfaces));
    }
    *phase = Phase::DomainFacetsDeployed;

    let changes = combined_cuts(&table, &descriptors, config.allow_reassignment)?;
    *phase = Phase::ChangesComputed;

    let calldata = exec.encode_init_call(
        &config.initializer.name,
        &config.initializer.function,
        &init_args(&config.token),
    )?;
    let receipt = exec
        .submit_cuts(proxy.address, &changes, initializer.address, calldata)
        .await?;
    *phase = Phase::CutSubmitted;
    if !receipt.status_ok {
        return Err(DeployError::CutRejected {
            tx: receipt.tx_hash,
        }
        .into());
    }
    *phase = Phase::Committed;
    log_msg!("diamond {:?} committed in {:?}", proxy.address, receipt.tx_hash);

    Ok(DeployOutcome {
        proxy: proxy.address,
        initializer: initializer.address,
        cut_tx: receipt.tx_hash,
    })
}

/// Converges an existing proxy toward a new facet set: fresh routing
/// snapshot, new deployments, one atomic cut. The optional initializer
/// runs inside the cut with a parameterless call.
pub async fn upgrade_facets<X: Execution + Sync>(
    config: &UpgradeConfig,
    exec: &X,
) -> eyre::Result<UpgradeOutcome> {
    let mut interfaces: BTreeMap<String, Vec<AbiEntry>> = BTreeMap::new();
    for module in config
        .facets
        .iter()
        .map(|f| f.name.as_str())
        .chain(config.initializer.iter().map(|i| i.name.as_str()))
    {
        interfaces.insert(module.to_owned(), exec.module_interface(module)?);
    }

    // Snapshot per run, never cached across runs.
    let table = exec.routing_table(config.proxy).await?;
    log_msg!("{} selectors currently routed", table.len());

    let mut links: BTreeMap<String, Address> = BTreeMap::new();
    for library in &config.libraries {
        let wanted = subset(&links, &library.links, &library.name)?;
        let deployed = deploy_one(exec, &library.name, Vec::new(), &wanted).await?;
        links.insert(library.name.clone(), deployed.address);
    }

    let mut descriptors = Vec::new();
    for spec in &config.facets {
        let wanted = subset(&links, &spec.links, &spec.name)?;
        let deployed = deploy_one(exec, &spec.name, Vec::new(), &wanted).await?;
        descriptors.push(descriptor(&spec.name, deployed.address, &interfaces));
    }

    let changes = combined_cuts(&table, &descriptors, config.allow_reassignment)?;

    if changes.is_empty() && config.initializer.is_none() {
        log_msg!("routing already converged, nothing to submit");
        return Ok(UpgradeOutcome {
            proxy: config.proxy,
            cut_tx: None,
        });
    }

    let (init_address, calldata) = match &config.initializer {
        Some(spec) => {
            let deployed = deploy_one(exec, &spec.name, Vec::new(), &BTreeMap::new()).await?;
            let calldata = exec.encode_init_call(&spec.name, &spec.function, &[])?;
            (deployed.address, calldata)
        }
        None => (Address::zero(), Bytes::default()),
    };

    let receipt = exec
        .submit_cuts(config.proxy, &changes, init_address, calldata)
        .await?;
    if !receipt.status_ok {
        return Err(DeployError::CutRejected {
            tx: receipt.tx_hash,
        }
        .into());
    }
    Ok(UpgradeOutcome {
        proxy: config.proxy,
        cut_tx: Some(receipt.tx_hash),
    })
}

async fn deploy_one<X: Execution + Sync>(
    exec: &X,
    module: &str,
    args: Vec<Token>,
    links: &BTreeMap<String, Address>,
) -> eyre::Result<Deployed> {
    log_msg!("deploying {}...", module);
    let deployed = exec.deploy_module(module, args, links).await?;
    if !deployed.confirmed {
        return Err(DeployError::DeploymentFailure {
            module: module.to_owned(),
        }
        .into());
    }
    Ok(deployed)
}

fn descriptor(
    name: &str,
    address: Address,
    interfaces: &BTreeMap<String, Vec<AbiEntry>>,
) -> FacetDescriptor {
    let entries = interfaces.get(name).map(Vec::as_slice).unwrap_or(&[]);
    FacetDescriptor::from_entries(name, address, entries)
}

fn subset(
    links: &BTreeMap<String, Address>,
    wanted: &[String],
    module: &str,
) -> Result<BTreeMap<String, Address>, DeployError> {
    let mut chosen = BTreeMap::new();
    for name in wanted {
        let address = links.get(name).ok_or_else(|| ArtifactError::MissingLibrary {
            module: module.to_owned(),
            library: name.clone(),
        })?;
        chosen.insert(name.clone(), *address);
    }
    Ok(chosen)
}

fn combined_cuts(
    table: &RoutingTable,
    descriptors: &[FacetDescriptor],
    allow_reassignment: bool,
) -> Result<ChangeSet, DeployError> {
    let computed: Vec<(&FacetDescriptor, ChangeSet)> = descriptors
        .iter()
        .map(|facet| (facet, facet_cuts(table, facet)))
        .collect();
    let changes = combine(&computed, allow_reassignment)?;
    log_msg!(
        "{} selectors across {} cuts",
        changes.selector_count(),
        changes.cuts.len()
    );
    Ok(changes)
}

fn init_args(token: &TokenMetadata) -> [Token; 1] {
    [Token::Tuple(vec![
        Token::String(token.name.clone()),
        Token::String(token.symbol.clone()),
        Token::String(token.base_uri.clone()),
    ])]
}
