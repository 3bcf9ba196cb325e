use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use soulmint::{
    export_log, render_entry, viewer, write_template, AdminSession, CredentialView, RootConfig,
    RootError,
};
use soulmint_core::Identifier;
use soulmint_issuance::{AuditLog, ChunkSize};

/// Soulmint: issue and revoke soulbound course credentials
#[derive(Parser, Debug)]
#[command(name = "soulmint", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mint a credential to one student
    Mint {
        address: String,

        /// Write the session log as CSV to the export directory
        #[arg(long)]
        export: bool,
    },

    /// Mint credentials to a roster, chunk by chunk
    Batch {
        /// Roster file: identifiers separated by newlines, commas, semicolons or spaces
        #[arg(long, required_unless_present = "text", conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Roster given inline
        #[arg(long)]
        text: Option<String>,

        /// Identifiers per transaction (1-200)
        #[arg(long)]
        chunk_size: Option<String>,

        #[arg(long)]
        export: bool,
    },

    /// Revoke (burn) a credential by token id
    Revoke {
        token_id: String,

        #[arg(long)]
        export: bool,
    },

    /// Normalize a roster file and print the valid identifiers
    Import { path: PathBuf },

    /// Write an empty roster template to the export directory
    Template,

    /// Show the credential held by an address
    View { address: String },

    /// Show configuration and authorization status
    Status,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("soulmint=debug,soulmint_core=debug,soulmint_issuance=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("soulmint=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<RootConfig, RootError> {
    match path {
        Some(p) => RootConfig::load(p),
        None => {
            let default_path = RootConfig::default_config_path();
            RootConfig::load(&default_path)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RootError> {
    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Mint { address, export } => cmd_mint(config, &address, export).await,
        Commands::Batch {
            file,
            text,
            chunk_size,
            export,
        } => cmd_batch(config, file, text, chunk_size, export).await,
        Commands::Revoke { token_id, export } => cmd_revoke(config, &token_id, export).await,
        Commands::Import { path } => cmd_import(config, &path).await,
        Commands::Template => cmd_template(&config),
        Commands::View { address } => cmd_view(config, &address).await,
        Commands::Status => cmd_status(config).await,
    }
}

/// Print the finished log, newest first, and optionally export it.
fn report(config: &RootConfig, log: &AuditLog, export: bool) -> Result<(), RootError> {
    for entry in log.snapshot() {
        println!("{}", render_entry(&entry));
    }
    if export {
        let path = export_log(log, &config.export.dir)?;
        println!("Log exported to {}", path.display());
    }
    Ok(())
}

async fn finish(session: AdminSession) -> Result<(RootConfig, Arc<AuditLog>), RootError> {
    let config = session.config().clone();
    let log = session.finish().await?;
    Ok((config, log))
}

async fn cmd_mint(config: RootConfig, address: &str, export: bool) -> Result<(), RootError> {
    let session = AdminSession::dry_run(config)?;
    match session.orchestrator().issue_single(address).await {
        Ok(submission) => info!(%submission, "mint submitted"),
        Err(e) => info!(code = e.code(), "mint not submitted"),
    }
    let (config, log) = finish(session).await?;
    report(&config, &log, export)
}

async fn cmd_batch(
    config: RootConfig,
    file: Option<PathBuf>,
    text: Option<String>,
    chunk_size: Option<String>,
    export: bool,
) -> Result<(), RootError> {
    let raw = match (file, text) {
        (Some(path), _) => std::fs::read_to_string(path)?,
        (None, Some(text)) => text,
        (None, None) => String::new(),
    };
    let chunk_size = match chunk_size {
        Some(raw) => ChunkSize::parse(&raw),
        None => config.chunk_size(),
    };

    let session = AdminSession::dry_run(config)?;
    match session.orchestrator().issue_batch(&raw, chunk_size).await {
        Ok(batch) => {
            println!(
                "Batch: {} recipients in {} chunk(s) of {}; {} submitted, {} failed",
                batch.recipients,
                batch.chunk_count(),
                batch.chunk_size,
                batch.submitted_chunks(),
                batch.failed_chunks().len()
            );
            println!("Issued this session: {}", session.orchestrator().session_issued());
        }
        Err(e) => info!(code = e.code(), "batch not submitted"),
    }
    let (config, log) = finish(session).await?;
    report(&config, &log, export)
}

async fn cmd_revoke(config: RootConfig, token_id: &str, export: bool) -> Result<(), RootError> {
    let session = AdminSession::dry_run(config)?;
    match session.orchestrator().revoke(token_id).await {
        Ok(submission) => info!(%submission, "revoke submitted"),
        Err(e) => info!(code = e.code(), "revoke not submitted"),
    }
    let (config, log) = finish(session).await?;
    report(&config, &log, export)
}

async fn cmd_import(config: RootConfig, path: &Path) -> Result<(), RootError> {
    let raw = std::fs::read_to_string(path)?;
    let session = AdminSession::dry_run(config)?;
    let set = session.orchestrator().import(&raw);
    print!("{}", set.to_text());
    if !set.is_empty() {
        println!();
    }
    let (config, log) = finish(session).await?;
    report(&config, &log, false)
}

fn cmd_template(config: &RootConfig) -> Result<(), RootError> {
    let path = write_template(&config.export.dir)?;
    println!("Template written to {}", path.display());
    Ok(())
}

async fn cmd_view(config: RootConfig, address: &str) -> Result<(), RootError> {
    let holder = Identifier::parse(address.trim())?;
    let session = AdminSession::dry_run(config)?;
    let (view, metadata) = session.view(&holder).await?;
    let contract = session.config().contract_address()?;

    match view {
        CredentialView::NotConnected => println!("No identity connected."),
        CredentialView::NoCredential => println!("No active credential for {}.", holder),
        CredentialView::Active(card) => {
            println!("Token id:  {}", card.token_id);
            if let Some(uri) = &card.token_uri {
                println!("Token URI: {}", uri);
            }
            println!("Explorer:  {}", card.explorer_url);
            if let Some(meta) = metadata {
                println!("Name:      {}", meta.display_name());
                if let Some(description) = &meta.description {
                    println!("About:     {}", description);
                }
                if let Some(image) = meta.image_url(&session.config().network.ipfs_gateway) {
                    println!("Image:     {}", image);
                }
                for attr in &meta.attributes {
                    println!(
                        "  {}: {}",
                        attr.trait_type.as_deref().unwrap_or("-"),
                        attr.value
                    );
                }
            }
            let request = viewer::watch_asset_request(&contract, card.token_id);
            println!("Wallet request: {}", serde_json::to_string(&request)?);
        }
    }
    session.finish().await?;
    Ok(())
}

async fn cmd_status(config: RootConfig) -> Result<(), RootError> {
    let session = AdminSession::dry_run(config)?;
    let ctx = session.orchestrator().authorization().await;
    let required = session.orchestrator().required_network();

    println!("Soulmint status (dry run)");
    println!("  Network:    {}", required);
    println!("  Contract:   {}", session.config().network.contract_address);
    match &ctx.connected {
        Some(id) => println!("  Operator:   {}", id),
        None => println!("  Operator:   not connected"),
    }
    match &ctx.owner {
        Some(owner) => println!("  Owner:      {}", owner),
        None => println!("  Owner:      unknown"),
    }
    match ctx.authorize(required) {
        Ok(_) => println!("  Authorized: yes"),
        Err(denial) => println!("  Authorized: no ({})", denial),
    }
    println!("  Minted:     {}", session.chain().minted_count());
    println!("  State file: {}", session.config().dry_run.state_file.display());

    session.finish().await?;
    Ok(())
}
