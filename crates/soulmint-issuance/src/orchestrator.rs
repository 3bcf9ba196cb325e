//! Issuance orchestrator: gate, sequence and record every write.
//!
//! Every operation recomputes the authorization context before doing
//! anything, records each failure as an audit entry, and never submits a
//! write it can tell is invalid. Settlements arrive later on the listener
//! spawned at construction and are appended as separate entries.

use std::sync::Arc;
use std::time::Duration;

use soulmint_core::{
    AuthorizationContext, ContractReader, ContractWriter, Identifier, IdentityProvider, LogEntry,
    NetworkId, SettlementReceiver, SubmissionId, TokenId, WriteCall,
};
use tokio::task::JoinHandle;

use crate::audit::AuditLog;
use crate::chunk::{chunk, ChunkSize};
use crate::error::{IssuanceError, IssuanceResult};
use crate::normalize::{normalize, RecipientSet};
use crate::queue::{ChunkOutcome, ChunkQueue, Submitter};
use crate::session::SessionCounter;
use crate::settlement::spawn_settlement_listener;

pub const MINT_ACTION: &str = "mint";
pub const BATCH_ACTION: &str = "mintBatch";
pub const REVOKE_ACTION: &str = "revoke";
pub const IMPORT_ACTION: &str = "batch-import";
pub const SWITCH_NETWORK_ACTION: &str = "switch-network";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Network every write must target.
    pub required_network: NetworkId,
    /// Give up on a submission after this long. `None` waits forever.
    pub submit_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            required_network: NetworkId::SEPOLIA,
            submit_timeout: None,
        }
    }
}

/// Summary of one batch run. The audit log stays the record of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub chunk_size: ChunkSize,
    pub recipients: usize,
    pub chunks: Vec<ChunkOutcome>,
}

impl BatchReport {
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn submitted_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.result.is_ok()).count()
    }

    pub fn failed_chunks(&self) -> Vec<&ChunkOutcome> {
        self.chunks.iter().filter(|c| c.result.is_err()).collect()
    }
}

pub struct Orchestrator {
    identity: Arc<dyn IdentityProvider>,
    reader: Arc<dyn ContractReader>,
    submitter: Submitter,
    queue: ChunkQueue,
    log: Arc<AuditLog>,
    session: Arc<SessionCounter>,
    config: OrchestratorConfig,
    listener: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Wire up the collaborators and start the settlement listener and the
    /// chunk worker. Must be called from within a tokio runtime.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        reader: Arc<dyn ContractReader>,
        writer: Arc<dyn ContractWriter>,
        settlements: SettlementReceiver,
        config: OrchestratorConfig,
    ) -> Self {
        let log = Arc::new(AuditLog::new());
        let session = Arc::new(SessionCounter::new());
        let submitter = Submitter::new(writer, log.clone(), config.submit_timeout);
        let queue = ChunkQueue::spawn(submitter.clone(), session.clone());
        let listener = spawn_settlement_listener(settlements, log.clone());

        tracing::info!(
            required_network = %config.required_network,
            timeout_secs = config.submit_timeout.map(|d| d.as_secs()),
            "issuance orchestrator started"
        );

        Self {
            identity,
            reader,
            submitter,
            queue,
            log,
            session,
            config,
            listener: Some(listener),
        }
    }

    pub fn log(&self) -> &Arc<AuditLog> {
        &self.log
    }

    pub fn session_issued(&self) -> u64 {
        self.session.get()
    }

    pub fn required_network(&self) -> NetworkId {
        self.config.required_network
    }

    /// Fresh authorization context. An owner read that fails is treated as
    /// not yet loaded.
    pub async fn authorization(&self) -> AuthorizationContext {
        let owner = match self.reader.owner().await {
            Ok(owner) => owner,
            Err(e) => {
                tracing::warn!(error = %e, "owner read failed");
                None
            }
        };
        AuthorizationContext {
            connected: self.identity.connected_identity(),
            network: self.identity.current_network(),
            owner,
        }
    }

    async fn gate(&self, action: &str) -> IssuanceResult<Identifier> {
        let ctx = self.authorization().await;
        match ctx.authorize(self.config.required_network) {
            Ok(operator) => {
                tracing::debug!(action, operator = %operator, "authorization granted");
                Ok(operator.clone())
            }
            Err(denial) => {
                tracing::warn!(action, reason = %denial, "authorization denied");
                self.log.append(LogEntry::error(action, denial.to_string()));
                Err(denial.into())
            }
        }
    }

    /// Normalize imported text and record how many identifiers survived.
    pub fn import(&self, raw_text: &str) -> RecipientSet {
        let set = normalize(raw_text);
        tracing::info!(valid = set.len(), "recipient list imported");
        self.log.append(
            LogEntry::success(IMPORT_ACTION)
                .with_note(format!("import: {} valid addresses", set.len())),
        );
        set
    }

    /// Ask the wallet to move to the required network.
    pub async fn switch_network(&self) -> IssuanceResult<()> {
        let target = self.config.required_network;
        match self.identity.switch_network(target).await {
            Ok(()) => {
                self.log.append(
                    LogEntry::success(SWITCH_NETWORK_ACTION)
                        .with_note(format!("switched to {}", target)),
                );
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(network = %target, error = %message, "network switch failed");
                self.log
                    .append(LogEntry::error(SWITCH_NETWORK_ACTION, message.clone()));
                Err(IssuanceError::WrongNetwork(message))
            }
        }
    }

    /// Mint one credential. Fire-and-forget: returns once the write is
    /// submitted; confirmation is logged by the listener.
    pub async fn issue_single(&self, raw_identifier: &str) -> IssuanceResult<SubmissionId> {
        self.gate(MINT_ACTION).await?;

        let student = match Identifier::parse(raw_identifier.trim()) {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(input = raw_identifier, "mint rejected: malformed identifier");
                self.log
                    .append(LogEntry::error(MINT_ACTION, "malformed identifier"));
                return Err(IssuanceError::MalformedIdentifier(
                    raw_identifier.to_string(),
                ));
            }
        };

        self.log
            .append(LogEntry::pending(format!("{}({})", MINT_ACTION, student)));
        let result = self.submitter.submit(WriteCall::Mint { student }).await;
        let issued = self.session.add(1);
        tracing::debug!(session_issued = issued, "single mint submitted");
        result
    }

    /// Normalize, chunk and submit a roster, one chunk at a time.
    ///
    /// A chunk whose submission fails does not stop the batch; the report
    /// carries each chunk's outcome.
    pub async fn issue_batch(
        &self,
        raw_text: &str,
        chunk_size: ChunkSize,
    ) -> IssuanceResult<BatchReport> {
        self.gate(BATCH_ACTION).await?;

        let set = normalize(raw_text);
        if set.is_empty() {
            tracing::warn!("batch rejected: no valid identifiers");
            self.log.append(LogEntry::error(
                BATCH_ACTION,
                IssuanceError::EmptyRecipientSet.to_string(),
            ));
            return Err(IssuanceError::EmptyRecipientSet);
        }

        let recipients = set.len();
        let chunks = chunk(&set, chunk_size);
        tracing::info!(
            recipients,
            chunks = chunks.len(),
            chunk_size = chunk_size.get(),
            "batch started"
        );
        self.log.append(LogEntry::pending(BATCH_ACTION).with_note(format!(
            "sending {} chunk(s) of {}",
            chunks.len(),
            chunk_size
        )));

        let outcomes = self.queue.run_batch(chunks).await;
        let report = BatchReport {
            chunk_size,
            recipients,
            chunks: outcomes,
        };
        tracing::info!(
            submitted = report.submitted_chunks(),
            failed = report.failed_chunks().len(),
            "batch finished"
        );
        Ok(report)
    }

    /// Revoke (burn) a credential by token id.
    pub async fn revoke(&self, token_id_text: &str) -> IssuanceResult<SubmissionId> {
        self.gate(REVOKE_ACTION).await?;

        let token_id = match TokenId::parse(token_id_text) {
            Ok(id) => id,
            Err(_) => {
                let err = IssuanceError::InvalidTokenId(token_id_text.to_string());
                tracing::warn!(input = token_id_text, "revoke rejected: invalid token id");
                self.log
                    .append(LogEntry::error(REVOKE_ACTION, "invalid token id (must be > 0)"));
                return Err(err);
            }
        };

        self.log
            .append(LogEntry::pending(format!("{}({})", REVOKE_ACTION, token_id)));
        self.submitter.submit(WriteCall::Revoke { token_id }).await
    }

    /// Release the collaborators and wait until every settlement their
    /// writer already sent is in the log.
    ///
    /// Only returns once all other handles to the writer are dropped, since
    /// the listener runs until the settlement channel closes.
    pub async fn shutdown(mut self) -> Arc<AuditLog> {
        let listener = self.listener.take();
        let log = self.log.clone();
        drop(self);
        if let Some(listener) = listener {
            if let Err(e) = listener.await {
                tracing::warn!(error = %e, "settlement listener ended abnormally");
            }
        }
        log
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use soulmint_core::{
        settlement_channel, CoreError, CoreResult, LogStatus, Settlement, SettlementOutcome,
        SettlementSender, TxHandle,
    };
    use std::sync::Mutex;

    const OWNER: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    const STRANGER: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";
    const STUDENT: &str = "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB";

    struct Wallet {
        connected: Mutex<Option<Identifier>>,
        network: Mutex<Option<NetworkId>>,
    }

    impl Wallet {
        fn new(connected: Option<&str>, network: Option<NetworkId>) -> Self {
            Self {
                connected: Mutex::new(connected.map(|c| Identifier::parse(c).unwrap())),
                network: Mutex::new(network),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for Wallet {
        fn connected_identity(&self) -> Option<Identifier> {
            self.connected.lock().unwrap().clone()
        }

        fn current_network(&self) -> Option<NetworkId> {
            *self.network.lock().unwrap()
        }

        async fn switch_network(&self, target: NetworkId) -> CoreResult<()> {
            *self.network.lock().unwrap() = Some(target);
            Ok(())
        }
    }

    struct Contract {
        owner: Option<Identifier>,
    }

    #[async_trait]
    impl ContractReader for Contract {
        async fn owner(&self) -> CoreResult<Option<Identifier>> {
            Ok(self.owner.clone())
        }

        async fn token_id_of(&self, _holder: &Identifier) -> CoreResult<Option<TokenId>> {
            Ok(None)
        }

        async fn token_uri(&self, _token_id: TokenId) -> CoreResult<Option<String>> {
            Ok(None)
        }
    }

    /// Records calls; settles each one immediately unless told to reject.
    struct Writer {
        calls: Mutex<Vec<WriteCall>>,
        settlements: SettlementSender,
        reject_call: Option<usize>,
    }

    #[async_trait]
    impl ContractWriter for Writer {
        async fn submit(&self, call: WriteCall) -> CoreResult<SubmissionId> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(call);
                calls.len()
            };
            if Some(n) == self.reject_call {
                return Err(CoreError::ChainWrite("User rejected the request.".into()));
            }
            let id = SubmissionId(n as u64);
            let _ = self.settlements.send(Settlement {
                submission: id,
                outcome: SettlementOutcome::Confirmed {
                    tx: TxHandle::from_bytes([n as u8; 32]),
                },
            });
            Ok(id)
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        writer: Arc<Writer>,
        wallet: Arc<Wallet>,
    }

    fn harness(
        connected: Option<&str>,
        network: Option<NetworkId>,
        owner: Option<&str>,
        reject_call: Option<usize>,
    ) -> Harness {
        let (tx, rx) = settlement_channel();
        let wallet = Arc::new(Wallet::new(connected, network));
        let writer = Arc::new(Writer {
            calls: Mutex::new(Vec::new()),
            settlements: tx,
            reject_call,
        });
        let contract = Arc::new(Contract {
            owner: owner.map(|o| Identifier::parse(o).unwrap()),
        });
        let orchestrator = Orchestrator::new(
            wallet.clone(),
            contract,
            writer.clone(),
            rx,
            OrchestratorConfig::default(),
        );
        Harness {
            orchestrator,
            writer,
            wallet,
        }
    }

    fn authorized() -> Harness {
        harness(Some(OWNER), Some(NetworkId::SEPOLIA), Some(OWNER), None)
    }

    fn roster(n: usize) -> String {
        (0..n)
            .map(|i| format!("0x{:040x}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Let the settlement listener drain what has been sent so far.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_not_connected_blocks_every_write() {
        let h = harness(None, Some(NetworkId::SEPOLIA), Some(OWNER), None);
        let o = &h.orchestrator;

        assert_eq!(o.issue_single(STUDENT).await, Err(IssuanceError::NotConnected));
        assert_eq!(
            o.issue_batch(STUDENT, ChunkSize::default()).await,
            Err(IssuanceError::NotConnected)
        );
        assert_eq!(o.revoke("1").await, Err(IssuanceError::NotConnected));

        assert!(h.writer.calls.lock().unwrap().is_empty());
        let log = o.log().chronological();
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|e| e.status == LogStatus::Error));
        assert_eq!(log[0].action, "mint");
        assert_eq!(log[1].action, "mintBatch");
        assert_eq!(log[2].action, "revoke");
    }

    #[tokio::test]
    async fn test_wrong_network_then_switch() {
        let h = harness(Some(OWNER), Some(NetworkId(1)), Some(OWNER), None);
        let o = &h.orchestrator;

        let err = o.issue_single(STUDENT).await.unwrap_err();
        assert_eq!(err.code(), "wrong-network");
        assert!(h.writer.calls.lock().unwrap().is_empty());

        o.switch_network().await.unwrap();
        assert_eq!(h.wallet.current_network(), Some(NetworkId::SEPOLIA));
        assert!(o.issue_single(STUDENT).await.is_ok());
        assert_eq!(h.writer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_not_owner_rejected() {
        let h = harness(Some(STRANGER), Some(NetworkId::SEPOLIA), Some(OWNER), None);
        assert_eq!(
            h.orchestrator.revoke("3").await,
            Err(IssuanceError::NotAuthorized)
        );
        let entry = h.orchestrator.log().latest().unwrap();
        assert!(entry.note.unwrap().contains("not the contract owner"));
    }

    #[tokio::test]
    async fn test_owner_not_loaded_rejected() {
        let h = harness(Some(OWNER), Some(NetworkId::SEPOLIA), None, None);
        assert_eq!(
            h.orchestrator.issue_single(STUDENT).await,
            Err(IssuanceError::NotAuthorized)
        );
    }

    #[tokio::test]
    async fn test_owner_case_variant_is_authorized() {
        let lower = OWNER.to_ascii_lowercase();
        let h = harness(Some(&lower), Some(NetworkId::SEPOLIA), Some(OWNER), None);
        assert!(h.orchestrator.issue_single(STUDENT).await.is_ok());
    }

    #[tokio::test]
    async fn test_gate_rechecked_per_action() {
        let h = authorized();
        assert!(h.orchestrator.issue_single(STUDENT).await.is_ok());

        *h.wallet.connected.lock().unwrap() = Some(Identifier::parse(STRANGER).unwrap());
        assert_eq!(
            h.orchestrator.issue_single(STUDENT).await,
            Err(IssuanceError::NotAuthorized)
        );
        assert_eq!(h.writer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_issue_single_flow() {
        let h = authorized();
        let o = &h.orchestrator;

        let id = o.issue_single(&format!("  {}  ", STUDENT)).await.unwrap();
        assert_eq!(id, SubmissionId(1));
        assert_eq!(o.session_issued(), 1);
        assert_eq!(
            h.writer.calls.lock().unwrap()[0],
            WriteCall::Mint {
                student: Identifier::parse(STUDENT).unwrap()
            }
        );

        settle().await;
        let log = o.log().chronological();
        assert_eq!(log[0].action, format!("mint({})", STUDENT));
        assert_eq!(log[0].status, LogStatus::Pending);
        assert_eq!(log[1].action, "tx-confirmed");
        assert!(log[1].hash.is_some());
    }

    #[tokio::test]
    async fn test_issue_single_malformed() {
        let h = authorized();
        let err = h.orchestrator.issue_single("0x1234").await.unwrap_err();
        assert_eq!(err.code(), "malformed-identifier");
        assert_eq!(h.orchestrator.session_issued(), 0);
        assert!(h.writer.calls.lock().unwrap().is_empty());
        let entry = h.orchestrator.log().latest().unwrap();
        assert_eq!(entry.action, "mint");
        assert_eq!(entry.note.as_deref(), Some("malformed identifier"));
    }

    #[tokio::test]
    async fn test_issue_single_submission_rejected_still_counts() {
        let h = harness(Some(OWNER), Some(NetworkId::SEPOLIA), Some(OWNER), Some(1));
        let err = h.orchestrator.issue_single(STUDENT).await.unwrap_err();
        assert_eq!(
            err,
            IssuanceError::SubmissionFailed("User rejected the request.".into())
        );
        assert_eq!(h.orchestrator.session_issued(), 1);
        let entry = h.orchestrator.log().latest().unwrap();
        assert_eq!(entry.action, "tx-error");
        assert_eq!(entry.note.as_deref(), Some("User rejected the request."));
    }

    #[tokio::test]
    async fn test_batch_95_by_40() {
        let h = authorized();
        let o = &h.orchestrator;

        let report = o.issue_batch(&roster(95), ChunkSize::new(40)).await.unwrap();
        assert_eq!(report.chunk_count(), 3);
        assert_eq!(report.recipients, 95);
        assert_eq!(report.submitted_chunks(), 3);

        let sizes: Vec<usize> = h
            .writer
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(WriteCall::issued_count)
            .collect();
        assert_eq!(sizes, vec![40, 40, 15]);
        assert_eq!(o.session_issued(), 95);

        settle().await;
        let log = o.log().chronological();
        let started: Vec<_> = log
            .iter()
            .filter(|e| e.action == "mintBatch" && e.status == LogStatus::Pending)
            .collect();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].note.as_deref(), Some("sending 3 chunk(s) of 40"));

        let chunk_entries: Vec<_> = log
            .iter()
            .filter(|e| e.action.starts_with("mintBatch chunk"))
            .map(|e| e.action.as_str())
            .collect();
        assert_eq!(
            chunk_entries,
            vec![
                "mintBatch chunk 1/3 (40)",
                "mintBatch chunk 2/3 (40)",
                "mintBatch chunk 3/3 (15)",
            ]
        );
        let confirmed = log.iter().filter(|e| e.action == "tx-confirmed").count();
        assert_eq!(confirmed, 3);
        assert_eq!(log.len(), 1 + 3 + 3);
    }

    #[tokio::test]
    async fn test_batch_chunks_preserve_roster_order() {
        let h = authorized();
        let text = roster(95);
        h.orchestrator
            .issue_batch(&text, ChunkSize::new(40))
            .await
            .unwrap();

        let flat: Vec<Identifier> = h
            .writer
            .calls
            .lock()
            .unwrap()
            .iter()
            .flat_map(|c| match c {
                WriteCall::MintBatch { students } => students.clone(),
                _ => vec![],
            })
            .collect();
        assert_eq!(flat.as_slice(), normalize(&text).as_slice());
    }

    #[tokio::test]
    async fn test_batch_partial_failure_continues() {
        let h = harness(Some(OWNER), Some(NetworkId::SEPOLIA), Some(OWNER), Some(2));
        let report = h
            .orchestrator
            .issue_batch(&roster(95), ChunkSize::new(40))
            .await
            .unwrap();
        assert_eq!(report.chunk_count(), 3);
        assert_eq!(report.submitted_chunks(), 2);
        assert_eq!(report.failed_chunks()[0].index, 2);
        assert_eq!(h.writer.calls.lock().unwrap().len(), 3);
        assert_eq!(h.orchestrator.session_issued(), 95);
    }

    #[tokio::test]
    async fn test_batch_empty_set() {
        let h = authorized();
        let err = h
            .orchestrator
            .issue_batch("nothing, here; 0x12", ChunkSize::default())
            .await
            .unwrap_err();
        assert_eq!(err, IssuanceError::EmptyRecipientSet);
        let entry = h.orchestrator.log().latest().unwrap();
        assert_eq!(entry.action, "mintBatch");
        assert_eq!(entry.note.as_deref(), Some("no valid identifiers"));
        assert!(h.writer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_gate_failure_attempts_no_chunk() {
        let h = harness(Some(STRANGER), Some(NetworkId::SEPOLIA), Some(OWNER), None);
        let err = h
            .orchestrator
            .issue_batch(&roster(95), ChunkSize::new(40))
            .await
            .unwrap_err();
        assert_eq!(err, IssuanceError::NotAuthorized);
        assert_eq!(h.orchestrator.log().len(), 1);
        assert!(h.writer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoke_invalid_token_ids() {
        let h = authorized();
        for raw in ["0", "-3", "", "abc"] {
            let err = h.orchestrator.revoke(raw).await.unwrap_err();
            assert_eq!(err.code(), "invalid-token-id", "{raw:?}");
            let entry = h.orchestrator.log().latest().unwrap();
            assert_eq!(entry.action, "revoke");
            assert_eq!(entry.status, LogStatus::Error);
        }
        assert!(h.writer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoke_flow_does_not_count() {
        let h = authorized();
        h.orchestrator.revoke("12").await.unwrap();
        assert_eq!(h.orchestrator.session_issued(), 0);
        assert_eq!(
            h.writer.calls.lock().unwrap()[0],
            WriteCall::Revoke {
                token_id: TokenId::new(12).unwrap()
            }
        );
        settle().await;
        let log = h.orchestrator.log().chronological();
        assert_eq!(log[0].action, "revoke(12)");
        assert_eq!(log[1].action, "tx-confirmed");
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_settlements() {
        let Harness {
            orchestrator,
            writer,
            ..
        } = authorized();
        orchestrator
            .issue_batch(&roster(95), ChunkSize::new(40))
            .await
            .unwrap();
        drop(writer);

        let log = orchestrator.shutdown().await;
        let confirmed = log
            .chronological()
            .iter()
            .filter(|e| e.action == "tx-confirmed")
            .count();
        assert_eq!(confirmed, 3);
    }

    #[tokio::test]
    async fn test_import_logs_count() {
        let h = authorized();
        let text = format!("{}\n{}\n{}\ngarbage", STUDENT, STUDENT.to_ascii_lowercase(), OWNER);
        let set = h.orchestrator.import(&text);
        assert_eq!(set.len(), 2);
        let entry = h.orchestrator.log().latest().unwrap();
        assert_eq!(entry.action, "batch-import");
        assert_eq!(entry.status, LogStatus::Success);
        assert_eq!(entry.note.as_deref(), Some("import: 2 valid addresses"));
    }
}
