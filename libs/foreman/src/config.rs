use ethers::types::Address;

/// The kind of network a run targets. Production runs get the balance
/// pre-flight; development runs skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Development,
    Production,
}

/// Collection metadata forwarded verbatim into the initializer payload.
#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub base_uri: String,
}

/// A shared library deployed before the modules that link against it.
/// `links` names earlier libraries this one splices into its bytecode.
#[derive(Debug, Clone)]
pub struct LibrarySpec {
    pub name: String,
    pub links: Vec<String>,
}

/// A domain facet to deploy and route through the proxy.
#[derive(Debug, Clone)]
pub struct FacetSpec {
    pub name: String,
    pub links: Vec<String>,
}

/// The module whose init function runs inside the cut transaction via
/// delegatecall. Its function is never routed afterwards.
#[derive(Debug, Clone)]
pub struct InitializerSpec {
    pub name: String,
    /// Human-readable init signature, e.g. `init((string,string,string))`.
    pub function: String,
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub target: TargetKind,
    pub owner: Address,
    pub token: TokenMetadata,
    pub libraries: Vec<LibrarySpec>,
    pub facets: Vec<FacetSpec>,
    pub initializer: InitializerSpec,
    /// Treat a same-run cross-facet selector claim as a deliberate
    /// handover instead of aborting.
    pub allow_reassignment: bool,
}

/// Inputs for a cut against an existing proxy. The optional initializer
/// must declare a parameterless function.
#[derive(Debug, Clone)]
pub struct UpgradeConfig {
    pub proxy: Address,
    pub libraries: Vec<LibrarySpec>,
    pub facets: Vec<FacetSpec>,
    pub initializer: Option<InitializerSpec>,
    pub allow_reassignment: bool,
}
