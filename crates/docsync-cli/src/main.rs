//! docsync CLI - command-line front-end for the bidirectional sync engine.

mod embedder;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use docsync_core::config::SyncConfig;
use docsync_core::traits::{Embedder, StateStore, VsAdapter, XsAdapter};
use docsync_core::types::Collection;
use docsync_engine::manager::BootstrapOptions;
use docsync_engine::{vs_schema, SqliteStateStore, SyncManager};
use docsync_vs::CliVsAdapter;
use docsync_xs::SqliteXsAdapter;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use embedder::HashEmbedder;

/// docsync - keep a version-controlled document store and a vector store
/// in sync.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a docsync.toml config file; falls back to the user config
    /// directory, then a local docsync.toml, then defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage the whole vector store into a brand-new version store and commit.
    Init {
        /// Collection to initialize from
        collection: String,

        #[arg(long, default_value = "initial import")]
        message: String,
    },

    /// Stage pending vector-store changes and commit them to the version store.
    Commit {
        message: String,

        #[arg(long)]
        no_auto_stage: bool,
    },

    /// Pull from a remote and hydrate the vector store with the new changes.
    Pull {
        #[arg(long, default_value = "origin")]
        remote: String,

        #[arg(long, default_value = "main")]
        branch: String,

        #[arg(long)]
        force: bool,
    },

    /// Switch branches or commits and hydrate the vector store to match.
    Checkout {
        reference: String,

        #[arg(long)]
        create: bool,

        #[arg(long)]
        force: bool,
    },

    /// Merge a branch and hydrate the vector store with the merge result.
    Merge {
        source_branch: String,

        #[arg(long)]
        force: bool,
    },

    /// Hard-reset the version store and fully regenerate the vector store.
    Reset {
        commit: String,
    },

    /// Show repository and per-collection sync status.
    Status,

    /// Bring up version-store and vector-store infrastructure from a Manifest.
    Bootstrap {
        #[arg(long)]
        remote_url: Option<String>,

        #[arg(long, default_value = "main")]
        branch: String,
    },

    /// List pending vector-store-side changes for a collection.
    Pending {
        collection: String,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<PathBuf>) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(SyncConfig::load(&path)?),
        None => Ok(SyncConfig::load_default()?),
    }
}

async fn build_manager(
    config: &SyncConfig,
) -> Result<(SyncManager, Arc<dyn VsAdapter>), Box<dyn std::error::Error>> {
    let vs: Arc<dyn VsAdapter> = Arc::new(CliVsAdapter::new(
        config.vs.executable_path.clone(),
        config.vs.repository_path.clone(),
        config.vs.command_timeout_ms,
    ));
    vs.init().await?;

    let xs_path = config.xs.data_path.join("xs.sqlite3");
    let xs: Arc<dyn XsAdapter> = Arc::new(SqliteXsAdapter::open(&xs_path)?);

    let state_path = config.vs.repository_path.join(&config.sync.manifest_dir).join("state.sqlite3");
    let state: Arc<dyn StateStore> = Arc::new(SqliteStateStore::open(&state_path)?);

    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(256));

    let manager = SyncManager::new(vs.clone(), xs, state, embedder);
    Ok((manager, vs))
}

/// Look up a collection's configuration from the version store, falling
/// back to the codec defaults from config for a collection that does not
/// exist there yet (the case `init` is meant to handle).
async fn resolve_collection(
    vs: &dyn VsAdapter,
    config: &SyncConfig,
    name: &str,
) -> Result<Collection, Box<dyn std::error::Error>> {
    if vs_schema::schema_present(vs).await {
        if let Some(collection) = vs_schema::get_collection(vs, name).await? {
            return Ok(collection);
        }
    }
    Ok(Collection::new(
        name,
        config.codec.embedding_model.clone(),
        config.codec.chunk_size,
        config.codec.chunk_overlap,
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = load_config(cli.config)?;
    let (manager, vs) = build_manager(&config).await?;

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Init { collection, message } => {
            let collection = resolve_collection(vs.as_ref(), &config, &collection).await?;
            let result = manager.initialize_from_xs(&collection, &message, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Commit { message, no_auto_stage } => {
            let result = manager.commit(&message, !no_auto_stage, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Pull { remote, branch, force } => {
            let result = manager.pull(&remote, &branch, force, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Checkout { reference, create, force } => {
            let result = manager.checkout(&reference, create, force, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Merge { source_branch, force } => {
            let result = manager.merge(&source_branch, force, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Reset { commit } => {
            let result = manager.reset(&commit, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Status => {
            let status = manager.status(&cancel).await?;
            println!("branch: {}", status.branch);
            println!("head: {}", status.head.as_deref().unwrap_or("<none>"));
            println!("uncommitted (vs): {}", status.uncommitted_vs.len());
            for pending in &status.pending_xs_to_vs {
                println!(
                    "  {}: {} new, {} modified, {} deleted",
                    pending.collection,
                    pending.new.len(),
                    pending.modified.len(),
                    pending.deleted.len()
                );
            }
            for sync_state in &status.sync_state_per_collection {
                println!(
                    "collection {}: {:?} (last_sync_commit={:?})",
                    sync_state.collection, sync_state.sync_status, sync_state.last_sync_commit
                );
            }
        }
        Commands::Bootstrap { remote_url, branch } => {
            let options = BootstrapOptions { remote_url, branch };
            let result = manager.bootstrap(&options, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Pending { collection } => {
            let collection = resolve_collection(vs.as_ref(), &config, &collection).await?;
            let pending = manager.get_pending_changes(&collection).await?;
            println!("{}", serde_json::to_string_pretty(&pending)?);
        }
    }

    Ok(())
}
