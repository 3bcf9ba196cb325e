//! Batch credential issuance engine.
//!
//! Raw recipient text flows through [`normalize`] and [`chunk`] into the
//! [`Orchestrator`], which gates each write on a fresh authorization
//! context, submits chunks strictly one at a time, and records every
//! attempt and settlement in the bounded [`AuditLog`].

pub mod audit;
pub mod chunk;
pub mod error;
pub mod export;
pub mod normalize;
pub mod orchestrator;
pub mod queue;
pub mod session;
pub mod settlement;

pub use audit::AuditLog;
pub use chunk::{chunk, Chunk, ChunkSize};
pub use error::{IssuanceError, IssuanceResult};
pub use export::{export_csv, export_filename, template_filename, CSV_HEADER, TEMPLATE_BODY};
pub use normalize::{normalize, RecipientSet};
pub use orchestrator::{BatchReport, Orchestrator, OrchestratorConfig};
pub use queue::{ChunkOutcome, ChunkQueue, Submitter};
pub use session::SessionCounter;
pub use settlement::{record_settlement, settlement_entry, spawn_settlement_listener};
