//! Append-only, bounded audit log of every attempted action.
//!
//! Entries are stored newest-first. Once the log holds more than
//! [`AuditLog::CAPACITY`] entries the oldest are evicted from the tail.
//! Nothing else ever removes or edits an entry.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use soulmint_core::LogEntry;

use crate::export;

/// Thread-safe ring of [`LogEntry`] records.
///
/// Appends from the orchestrator, the chunk worker and the settlement
/// listener are serialized through the inner lock.
pub struct AuditLog {
    entries: Mutex<VecDeque<LogEntry>>,
}

impl AuditLog {
    pub const CAPACITY: usize = 200;

    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(Self::CAPACITY + 1)),
        }
    }

    // A poisoned lock still holds a consistent deque: every mutation below
    // is a single push or pop.
    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert at the front, evicting from the back past capacity.
    pub fn append(&self, entry: LogEntry) {
        tracing::debug!(
            action = %entry.action,
            status = %entry.status,
            "audit entry appended"
        );
        let mut entries = self.lock();
        entries.push_front(entry);
        while entries.len() > Self::CAPACITY {
            entries.pop_back();
        }
    }

    /// Newest-first copy of the log.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Oldest-first copy of the log.
    pub fn chronological(&self) -> Vec<LogEntry> {
        self.lock().iter().rev().cloned().collect()
    }

    /// Most recent entry, if any.
    pub fn latest(&self) -> Option<LogEntry> {
        self.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// CSV export in chronological order.
    pub fn export(&self) -> Vec<u8> {
        export::export_csv(&self.chronological())
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soulmint_core::{LogStatus, Timestamp};

    fn entry(n: u64) -> LogEntry {
        LogEntry::pending(format!("action-{n}")).at(Timestamp::from_seconds(n))
    }

    #[test]
    fn test_new_is_empty() {
        let log = AuditLog::new();
        assert!(log.is_empty());
        assert!(log.latest().is_none());
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_newest_first() {
        let log = AuditLog::new();
        for n in 1..=3 {
            log.append(entry(n));
        }
        let actions: Vec<_> = log.snapshot().into_iter().map(|e| e.action).collect();
        assert_eq!(actions, vec!["action-3", "action-2", "action-1"]);
        assert_eq!(log.latest().unwrap().action, "action-3");
    }

    #[test]
    fn test_chronological_oldest_first() {
        let log = AuditLog::new();
        for n in 1..=3 {
            log.append(entry(n));
        }
        let actions: Vec<_> = log.chronological().into_iter().map(|e| e.action).collect();
        assert_eq!(actions, vec!["action-1", "action-2", "action-3"]);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let log = AuditLog::new();
        for n in 0..1000 {
            log.append(entry(n));
            assert!(log.len() <= AuditLog::CAPACITY);
        }
        assert_eq!(log.len(), AuditLog::CAPACITY);
    }

    #[test]
    fn test_201st_evicts_exactly_the_oldest() {
        let log = AuditLog::new();
        for n in 1..=200 {
            log.append(entry(n));
        }
        assert_eq!(log.len(), 200);
        assert_eq!(log.chronological()[0].action, "action-1");

        log.append(entry(201));
        assert_eq!(log.len(), 200);
        let chrono = log.chronological();
        assert_eq!(chrono[0].action, "action-2");
        assert_eq!(chrono[199].action, "action-201");
    }

    #[test]
    fn test_entries_are_not_patched() {
        let log = AuditLog::new();
        log.append(LogEntry::pending("mint(x)"));
        log.append(LogEntry::success("tx-confirmed"));
        let snap = log.snapshot();
        assert_eq!(snap[1].status, LogStatus::Pending);
        assert_eq!(snap[0].status, LogStatus::Success);
    }

    #[test]
    fn test_export_uses_chronological_order() {
        let log = AuditLog::new();
        log.append(entry(1));
        log.append(entry(2));
        log.append(entry(3));
        let csv = String::from_utf8(log.export()).unwrap();
        let a = csv.find("action-1").unwrap();
        let b = csv.find("action-2").unwrap();
        let c = csv.find("action-3").unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_concurrent_appends_serialized() {
        let log = std::sync::Arc::new(AuditLog::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for n in 0..50 {
                        log.append(entry(t * 100 + n));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.len(), 200);
    }
}
