//! Soulmint root library.
//!
//! Configuration, error handling and the wiring that connects the issuance
//! orchestrator to a chain. The binary drives an [`AdminSession`] against
//! the in-memory [`DryRunChain`]; the student-facing read path lives in
//! [`viewer`].

pub mod config;
pub mod dry_run;
pub mod error;
pub mod viewer;

pub use config::{DryRunConfig, ExportConfig, IssuanceConfig, NetworkConfig, RootConfig};
pub use dry_run::{DryRunChain, DryRunState};
pub use error::{RootError, RootResult};
pub use viewer::{CredentialCard, CredentialMetadata, CredentialView};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use soulmint_core::{settlement_channel, Identifier, LogEntry, Timestamp};
use soulmint_issuance::{export_filename, template_filename, AuditLog, Orchestrator, TEMPLATE_BODY};
use tracing::info;

/// One operator session: an orchestrator bound to the dry-run chain.
pub struct AdminSession {
    config: RootConfig,
    chain: Arc<DryRunChain>,
    orchestrator: Orchestrator,
}

impl AdminSession {
    /// Open a session, restoring previously minted tokens from the
    /// configured state file. Must be called from within a tokio runtime.
    pub fn dry_run(config: RootConfig) -> RootResult<Self> {
        let state = DryRunState::load(&config.dry_run.state_file)?;
        Self::with_state(config, state)
    }

    pub fn with_state(config: RootConfig, state: DryRunState) -> RootResult<Self> {
        config.validate()?;

        let operator = Identifier::parse(&config.dry_run.operator)?;
        let owner = match &config.dry_run.owner {
            Some(owner) => Identifier::parse(owner)?,
            None => operator.clone(),
        };

        let (tx, rx) = settlement_channel();
        let chain = Arc::new(DryRunChain::new(
            operator.clone(),
            owner,
            config.required_network(),
            config.dry_run.token_uri_base.clone(),
            state,
            tx,
        ));
        let orchestrator = Orchestrator::new(
            chain.clone(),
            chain.clone(),
            chain.clone(),
            rx,
            config.orchestrator_config(),
        );

        info!(operator = %operator, network = %config.required_network(), "dry-run session opened");
        Ok(Self {
            config,
            chain,
            orchestrator,
        })
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn chain(&self) -> &DryRunChain {
        &self.chain
    }

    pub fn log(&self) -> &Arc<AuditLog> {
        self.orchestrator.log()
    }

    /// Credential view for `holder`, with its metadata when it can be read.
    pub async fn view(
        &self,
        holder: &Identifier,
    ) -> RootResult<(CredentialView, Option<CredentialMetadata>)> {
        let view =
            viewer::load_view(self.chain.as_ref(), Some(holder), &self.config.network).await?;
        let metadata = match &view {
            CredentialView::Active(card) => {
                match viewer::load_metadata(self.chain.as_ref(), card).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        tracing::warn!(token_id = %card.token_id, error = %e, "metadata unavailable");
                        None
                    }
                }
            }
            _ => None,
        };
        Ok((view, metadata))
    }

    /// Persist the chain state, wait for outstanding settlements and hand
    /// back the finished log.
    pub async fn finish(self) -> RootResult<Arc<AuditLog>> {
        let Self {
            config,
            chain,
            orchestrator,
        } = self;
        chain.state().save(&config.dry_run.state_file)?;
        drop(chain);
        Ok(orchestrator.shutdown().await)
    }
}

/// Write the log as CSV into `dir`. Returns the path written.
pub fn export_log(log: &AuditLog, dir: &Path) -> RootResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(Timestamp::now()));
    std::fs::write(&path, log.export())?;
    info!(path = %path.display(), entries = log.len(), "audit log exported");
    Ok(path)
}

/// Write the import template into `dir`. Returns the path written.
pub fn write_template(dir: &Path) -> RootResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(template_filename(Timestamp::now()));
    std::fs::write(&path, TEMPLATE_BODY)?;
    Ok(path)
}

/// One log entry as a terminal line.
pub fn render_entry(entry: &LogEntry) -> String {
    let mut line = format!(
        "{}  {:<7}  {}",
        entry.at.to_iso8601(),
        entry.status.as_str(),
        entry.action
    );
    if let Some(note) = &entry.note {
        line.push_str("  ");
        line.push_str(note);
    }
    if let Some(hash) = &entry.hash {
        line.push_str("  ");
        line.push_str(hash.as_str());
    }
    line
}
