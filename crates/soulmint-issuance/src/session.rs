use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory count of credentials submitted this session.
///
/// Bumped when a write is submitted, not when it confirms, so it reads as
/// an in-flight count rather than a confirmed one.
#[derive(Debug, Default)]
pub struct SessionCounter {
    issued: AtomicU64,
}

impl SessionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) -> u64 {
        self.issued.fetch_add(n, Ordering::SeqCst) + n
    }

    pub fn get(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}
