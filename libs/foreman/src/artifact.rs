use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use ethers::abi::Abi;
use ethers::types::{Address, Bytes};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Problems with compiled artifact JSON. A compile-output problem is a
/// configuration error, never a transient, so every variant is fatal.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read the artifact for {module} at {path}: {source}")]
    Unreadable {
        module: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("artifact for {module} is not valid artifact JSON: {source}")]
    Garbled {
        module: String,
        source: serde_json::Error,
    },

    #[error("{module} links library {library}, which has no deployed address")]
    MissingLibrary { module: String, library: String },

    #[error("bytecode of {module} still carries an unresolved link placeholder")]
    UnlinkedReference { module: String },

    #[error("bytecode of {module} is not a hex string")]
    MalformedBytecode { module: String },
}

/// One byte range inside the bytecode where a library address goes.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LinkRef {
    pub start: usize,
    pub length: usize,
}

/// A hardhat-style compiled artifact: the compiler's output contract.
///
/// `bytecode` is the 0x-prefixed creation code, with 20-byte placeholder
/// gaps at the ranges named in `link_references`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub abi: Value,
    pub bytecode: String,
    #[serde(default)]
    pub link_references: BTreeMap<String, BTreeMap<String, Vec<LinkRef>>>,
}

impl Artifact {
    pub fn from_json(module: &str, text: &str) -> Result<Self, ArtifactError> {
        serde_json::from_str(text).map_err(|source| ArtifactError::Garbled {
            module: module.to_owned(),
            source,
        })
    }

    pub fn ethers_abi(&self) -> Result<Abi, ArtifactError> {
        serde_json::from_value(self.abi.clone()).map_err(|source| ArtifactError::Garbled {
            module: self.contract_name.clone(),
            source,
        })
    }

    /// Creation code with every link placeholder replaced by its library's
    /// deployed address.
    ///
    /// Splices hex text rather than bytes: a byte offset `start` in the
    /// binary is string range `2 + 2*start .. 2 + 2*(start+length)` behind
    /// the 0x prefix. Any placeholder character surviving the splice means
    /// a library the caller did not provide.
    pub fn linked_bytecode(
        &self,
        libraries: &BTreeMap<String, Address>,
    ) -> Result<Bytes, ArtifactError> {
        let mut code = self.bytecode.clone();
        for libs in self.link_references.values() {
            for (library, refs) in libs {
                let address = libraries.get(library).ok_or_else(|| {
                    ArtifactError::MissingLibrary {
                        module: self.contract_name.clone(),
                        library: library.clone(),
                    }
                })?;
                let hex_addr = hex::encode(address.as_bytes());
                for link in refs {
                    let from = 2 + 2 * link.start;
                    let to = from + 2 * link.length;
                    if link.length != 20 || to > code.len() {
                        return Err(ArtifactError::MalformedBytecode {
                            module: self.contract_name.clone(),
                        });
                    }
                    code.replace_range(from..to, &hex_addr);
                }
            }
        }
        let stripped = code.strip_prefix("0x").unwrap_or(&code);
        if stripped.contains(['$', '_']) {
            return Err(ArtifactError::UnlinkedReference {
                module: self.contract_name.clone(),
            });
        }
        let raw = hex::decode(stripped).map_err(|_| ArtifactError::MalformedBytecode {
            module: self.contract_name.clone(),
        })?;
        Ok(Bytes::from(raw))
    }
}

/// Loads artifacts by module name from one flat directory of
/// `<Module>.json` files.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn load(&self, module: &str) -> Result<Artifact, ArtifactError> {
        let path = self.dir.join(format!("{}.json", module));
        let text = fs::read_to_string(&path).map_err(|source| ArtifactError::Unreadable {
            module: module.to_owned(),
            path,
            source,
        })?;
        Artifact::from_json(module, &text)
    }
}
