use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use soulmint_core::{Identifier, NetworkId};
use soulmint_issuance::{ChunkSize, OrchestratorConfig};

use crate::error::{RootError, RootResult};

/// Target network and contract location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Chain id every write must target.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Address of the soulbound credential contract.
    #[serde(default = "default_contract_address")]
    pub contract_address: String,

    /// Block explorer base URL, without a trailing slash.
    #[serde(default = "default_explorer_url")]
    pub explorer_url: String,

    /// Gateway prefix that `ipfs://` URIs are rewritten to.
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,
}

fn default_chain_id() -> u64 {
    NetworkId::SEPOLIA.0
}

fn default_contract_address() -> String {
    "0x0000000000000000000000000000000000000000".to_string()
}

fn default_explorer_url() -> String {
    "https://sepolia.etherscan.io".to_string()
}

fn default_ipfs_gateway() -> String {
    "https://ipfs.io/ipfs/".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            contract_address: default_contract_address(),
            explorer_url: default_explorer_url(),
            ipfs_gateway: default_ipfs_gateway(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuanceConfig {
    /// Chunk size used when the command line does not give one.
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: i64,

    /// Seconds to wait for a submission to settle. Zero waits forever.
    #[serde(default)]
    pub submit_timeout_secs: u64,
}

fn default_chunk_size() -> i64 {
    ChunkSize::DEFAULT as i64
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: default_chunk_size(),
            submit_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory CSV exports and templates are written to.
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

/// Settings for the in-memory chain the CLI runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunConfig {
    /// Identity the simulated wallet reports as connected.
    #[serde(default = "default_operator")]
    pub operator: String,

    /// Owner the simulated contract reports. Defaults to the operator.
    #[serde(default)]
    pub owner: Option<String>,

    /// Prefix for simulated token URIs; the token id and `.json` follow.
    #[serde(default = "default_token_uri_base")]
    pub token_uri_base: String,

    /// Where minted tokens are kept between runs.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_operator() -> String {
    "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".to_string()
}

fn default_token_uri_base() -> String {
    "ipfs://soulmint-demo/".to_string()
}

fn default_state_file() -> PathBuf {
    dirs_or_default(".soulmint/dry-run.json")
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self {
            operator: default_operator(),
            owner: None,
            token_uri_base: default_token_uri_base(),
            state_file: default_state_file(),
        }
    }
}

/// Top-level configuration, loaded from `~/.soulmint/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub issuance: IssuanceConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub dry_run: DryRunConfig,
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl RootConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(RootError::Io)?;
        let config: RootConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(RootError::Io)?;
        }
        std::fs::write(path, contents).map_err(RootError::Io)?;
        Ok(())
    }

    pub fn validate(&self) -> RootResult<()> {
        if self.network.chain_id == 0 {
            return Err(RootError::Config("chain_id must be > 0".into()));
        }
        if !Identifier::is_well_formed(&self.network.contract_address) {
            return Err(RootError::Config(format!(
                "contract_address is not a valid address: '{}'",
                self.network.contract_address
            )));
        }
        if self.network.ipfs_gateway.is_empty() {
            return Err(RootError::Config("ipfs_gateway must not be empty".into()));
        }
        if !Identifier::is_well_formed(&self.dry_run.operator) {
            return Err(RootError::Config(format!(
                "dry_run.operator is not a valid address: '{}'",
                self.dry_run.operator
            )));
        }
        if let Some(owner) = &self.dry_run.owner {
            if !Identifier::is_well_formed(owner) {
                return Err(RootError::Config(format!(
                    "dry_run.owner is not a valid address: '{}'",
                    owner
                )));
            }
        }
        Ok(())
    }

    pub fn required_network(&self) -> NetworkId {
        NetworkId(self.network.chain_id)
    }

    pub fn contract_address(&self) -> RootResult<Identifier> {
        Ok(Identifier::parse(&self.network.contract_address)?)
    }

    /// Configured default chunk size, clamped.
    pub fn chunk_size(&self) -> ChunkSize {
        ChunkSize::new(self.issuance.default_chunk_size)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            required_network: self.required_network(),
            submit_timeout: match self.issuance.submit_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".soulmint/config.toml")
    }
}
