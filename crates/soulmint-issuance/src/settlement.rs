//! Settlement notifications from the write collaborator.
//!
//! Each settlement becomes a new audit entry. The original pending entry is
//! never looked up or patched.

use std::sync::Arc;

use soulmint_core::{LogEntry, Settlement, SettlementOutcome, SettlementReceiver};
use tokio::task::JoinHandle;

use crate::audit::AuditLog;

pub const CONFIRMED_ACTION: &str = "tx-confirmed";
pub const FAILED_ACTION: &str = "tx-failed";

/// Build the audit entry for one settlement.
pub fn settlement_entry(settlement: &Settlement) -> LogEntry {
    match &settlement.outcome {
        SettlementOutcome::Confirmed { tx } => {
            LogEntry::success(CONFIRMED_ACTION).with_hash(tx.clone())
        }
        SettlementOutcome::Failed { reason } => LogEntry::error(FAILED_ACTION, reason.clone()),
    }
}

pub fn record_settlement(log: &AuditLog, settlement: &Settlement) {
    match &settlement.outcome {
        SettlementOutcome::Confirmed { tx } => tracing::info!(
            submission = %settlement.submission,
            tx = %tx,
            "write confirmed"
        ),
        SettlementOutcome::Failed { reason } => tracing::warn!(
            submission = %settlement.submission,
            reason = %reason,
            "write failed"
        ),
    }
    log.append(settlement_entry(settlement));
}

/// Consume settlements until every sender is dropped.
pub fn spawn_settlement_listener(
    mut settlements: SettlementReceiver,
    log: Arc<AuditLog>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(settlement) = settlements.recv().await {
            record_settlement(&log, &settlement);
        }
        tracing::debug!("settlement channel closed");
    })
}
