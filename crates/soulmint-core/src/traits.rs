use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreResult;
use crate::types::{Identifier, NetworkId, Settlement, SubmissionId, TokenId, WriteCall};

// ---------------------------------------------------------------------------
// IdentityProvider — the connected wallet
//
// Reads are cheap snapshots of wallet state that may change between any two
// calls. Nothing here signs or constructs transactions.
// ---------------------------------------------------------------------------

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn connected_identity(&self) -> Option<Identifier>;
    fn current_network(&self) -> Option<NetworkId>;
    async fn switch_network(&self, target: NetworkId) -> CoreResult<()>;
}

// ---------------------------------------------------------------------------
// ContractReader — eventually-consistent contract views
//
// `None` means "not loaded / not present", never an error.
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContractReader: Send + Sync {
    async fn owner(&self) -> CoreResult<Option<Identifier>>;
    async fn token_id_of(&self, holder: &Identifier) -> CoreResult<Option<TokenId>>;
    async fn token_uri(&self, token_id: TokenId) -> CoreResult<Option<String>>;
}

// ---------------------------------------------------------------------------
// ContractWriter — submit one write, settle later
//
// `submit` resolves once the write is accepted (or rejected) for broadcast.
// The final outcome is delivered as a `Settlement` on the channel the writer
// was constructed with, keyed by the returned `SubmissionId`.
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContractWriter: Send + Sync {
    async fn submit(&self, call: WriteCall) -> CoreResult<SubmissionId>;
}

// ---------------------------------------------------------------------------
// MetadataSource — fetches credential metadata documents by URL
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, url: &str) -> CoreResult<Vec<u8>>;
}

pub type SettlementSender = mpsc::UnboundedSender<Settlement>;
pub type SettlementReceiver = mpsc::UnboundedReceiver<Settlement>;

/// Create the settlement channel shared by a writer and its listener.
pub fn settlement_channel() -> (SettlementSender, SettlementReceiver) {
    mpsc::unbounded_channel()
}
