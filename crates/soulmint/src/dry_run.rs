//! In-memory chain used by the CLI.
//!
//! Plays all three collaborator roles (wallet, contract reads, contract
//! writes) plus the metadata host, and settles every accepted submission
//! immediately on the settlement channel. Minted tokens can be persisted to
//! a JSON state file so consecutive CLI runs see each other's writes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use soulmint_core::{
    ContractReader, ContractWriter, CoreError, CoreResult, Identifier, IdentityProvider,
    MetadataSource, NetworkId, Settlement, SettlementOutcome, SettlementSender, SubmissionId,
    TokenId, TxHandle, WriteCall,
};

use crate::error::RootResult;

/// Persisted token table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunState {
    /// Holder key (lowercase identifier) to token id.
    #[serde(default)]
    pub holders: BTreeMap<String, u64>,
    #[serde(default = "first_token_id")]
    pub next_token_id: u64,
}

fn first_token_id() -> u64 {
    1
}

impl Default for DryRunState {
    fn default() -> Self {
        Self {
            holders: BTreeMap::new(),
            next_token_id: first_token_id(),
        }
    }
}

impl DryRunState {
    /// Load state from a JSON file. A missing file is an empty chain.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn holder_of(&self, token_id: u64) -> Option<String> {
        self.holders
            .iter()
            .find(|(_, id)| **id == token_id)
            .map(|(holder, _)| holder.clone())
    }
}

pub struct DryRunChain {
    connected: Mutex<Option<Identifier>>,
    network: Mutex<Option<NetworkId>>,
    owner: Identifier,
    token_uri_base: String,
    state: Mutex<DryRunState>,
    settlements: SettlementSender,
    next_submission: AtomicU64,
    reject_next: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Deterministic transaction handle for a submission.
fn tx_handle(submission: SubmissionId, function: &str) -> TxHandle {
    let mut hasher = Keccak256::new();
    hasher.update(submission.0.to_be_bytes());
    hasher.update(function.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hasher.finalize());
    TxHandle::from_bytes(bytes)
}

impl DryRunChain {
    /// A chain with `operator` connected on `network` and `owner` as the
    /// contract owner.
    pub fn new(
        operator: Identifier,
        owner: Identifier,
        network: NetworkId,
        token_uri_base: impl Into<String>,
        state: DryRunState,
        settlements: SettlementSender,
    ) -> Self {
        Self {
            connected: Mutex::new(Some(operator)),
            network: Mutex::new(Some(network)),
            owner,
            token_uri_base: token_uri_base.into(),
            state: Mutex::new(state),
            settlements,
            next_submission: AtomicU64::new(0),
            reject_next: Mutex::new(None),
        }
    }

    pub fn connect(&self, identity: Option<Identifier>) {
        *lock(&self.connected) = identity;
    }

    pub fn set_network(&self, network: Option<NetworkId>) {
        *lock(&self.network) = network;
    }

    /// Make the next `submit` fail before broadcast with `message`.
    pub fn reject_next_submission(&self, message: impl Into<String>) {
        *lock(&self.reject_next) = Some(message.into());
    }

    pub fn state(&self) -> DryRunState {
        lock(&self.state).clone()
    }

    pub fn minted_count(&self) -> usize {
        lock(&self.state).holders.len()
    }

    fn token_uri_for(&self, token_id: u64) -> String {
        format!("{}{}.json", self.token_uri_base, token_id)
    }

    /// Apply a write to the token table, all or nothing.
    fn execute(&self, call: &WriteCall) -> Result<(), String> {
        let caller = lock(&self.connected).clone();
        match caller {
            Some(c) if c.same_account(&self.owner) => {}
            _ => return Err("caller is not the owner".into()),
        }

        let mut state = lock(&self.state);
        match call {
            WriteCall::Mint { student } => {
                if state.holders.contains_key(&student.key()) {
                    return Err(format!("already minted: {}", student));
                }
                let id = state.next_token_id;
                state.holders.insert(student.key(), id);
                state.next_token_id += 1;
            }
            WriteCall::MintBatch { students } => {
                if let Some(dup) = students
                    .iter()
                    .find(|s| state.holders.contains_key(&s.key()))
                {
                    return Err(format!("already minted: {}", dup));
                }
                for student in students {
                    let id = state.next_token_id;
                    state.holders.insert(student.key(), id);
                    state.next_token_id += 1;
                }
            }
            WriteCall::Revoke { token_id } => {
                let holder = u64::try_from(token_id.value())
                    .ok()
                    .and_then(|id| state.holder_of(id));
                match holder {
                    Some(holder) => {
                        state.holders.remove(&holder);
                    }
                    None => return Err(format!("token does not exist: {}", token_id)),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for DryRunChain {
    fn connected_identity(&self) -> Option<Identifier> {
        lock(&self.connected).clone()
    }

    fn current_network(&self) -> Option<NetworkId> {
        *lock(&self.network)
    }

    async fn switch_network(&self, target: NetworkId) -> CoreResult<()> {
        if lock(&self.connected).is_none() {
            return Err(CoreError::Wallet("no wallet connected".into()));
        }
        *lock(&self.network) = Some(target);
        tracing::debug!(network = %target, "dry-run wallet switched network");
        Ok(())
    }
}

#[async_trait]
impl ContractReader for DryRunChain {
    async fn owner(&self) -> CoreResult<Option<Identifier>> {
        Ok(Some(self.owner.clone()))
    }

    async fn token_id_of(&self, holder: &Identifier) -> CoreResult<Option<TokenId>> {
        let state = lock(&self.state);
        Ok(state
            .holders
            .get(&holder.key())
            .and_then(|id| TokenId::new(*id as u128)))
    }

    async fn token_uri(&self, token_id: TokenId) -> CoreResult<Option<String>> {
        let exists = u64::try_from(token_id.value())
            .ok()
            .and_then(|id| lock(&self.state).holder_of(id))
            .is_some();
        Ok(exists.then(|| self.token_uri_for(token_id.value() as u64)))
    }
}

#[async_trait]
impl ContractWriter for DryRunChain {
    async fn submit(&self, call: WriteCall) -> CoreResult<SubmissionId> {
        if let Some(message) = lock(&self.reject_next).take() {
            return Err(CoreError::ChainWrite(message));
        }

        let submission = SubmissionId(self.next_submission.fetch_add(1, Ordering::SeqCst) + 1);
        let function = call.function_name();
        let outcome = match self.execute(&call) {
            Ok(()) => SettlementOutcome::Confirmed {
                tx: tx_handle(submission, function),
            },
            Err(reason) => SettlementOutcome::Failed { reason },
        };
        tracing::debug!(%submission, function, "dry-run write executed");

        if self
            .settlements
            .send(Settlement {
                submission,
                outcome,
            })
            .is_err()
        {
            tracing::debug!(%submission, "settlement dropped: no listener");
        }
        Ok(submission)
    }
}

#[async_trait]
impl MetadataSource for DryRunChain {
    async fn fetch(&self, url: &str) -> CoreResult<Vec<u8>> {
        let token_id = url
            .rsplit('/')
            .next()
            .and_then(|name| name.strip_suffix(".json"))
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or_else(|| CoreError::ChainRead(format!("no metadata at {}", url)))?;

        let holder = lock(&self.state)
            .holder_of(token_id)
            .ok_or_else(|| CoreError::ChainRead(format!("no metadata at {}", url)))?;

        let doc = serde_json::json!({
            "name": format!("Soulbound credential #{}", token_id),
            "description": "Non-transferable course completion credential.",
            "image": format!("{}{}.png", self.token_uri_base, token_id),
            "attributes": [
                { "trait_type": "Holder", "value": holder },
                { "trait_type": "Token", "value": token_id },
            ],
        });
        serde_json::to_vec(&doc).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}
