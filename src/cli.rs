use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use playcanvas_sync_core::client::PlayCanvasClient;
use playcanvas_sync_core::context::PushContext;
use playcanvas_sync_core::log::LogLevel;
use playcanvas_sync_core::synchronise::{SyncEvent, SyncOrchestrator, SyncOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, CachedContext};
use crate::git::{self, GitPusher};
use crate::load_config::{load_settings, ContextInput};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
/// Conventional status for a run stopped by SIGINT.
pub const EXIT_CANCELLED: i32 = 130;

/// CLI for playcanvas-sync: export a PlayCanvas project into a git repository.
#[derive(Parser, Debug)]
#[clap(
    name = "playcanvas-sync",
    version,
    about = "Export a PlayCanvas project, unpack it into a local git repository and push it"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Push context fields given on the command line. Each one overrides the
/// same field from `--from-env` or `--from-cache`.
#[derive(Args, Debug, Clone, Default)]
pub struct ContextArgs {
    /// PlayCanvas API key token
    #[clap(long)]
    pub token: Option<String>,
    /// PlayCanvas project id
    #[clap(long)]
    pub project: Option<String>,
    /// Branch id; the default branch when omitted
    #[clap(long)]
    pub branch: Option<String>,
    /// Comma separated scene ids; all scenes when empty
    #[clap(long)]
    pub scenes: Option<String>,
    /// Local git working copy to install the export into
    #[clap(long)]
    pub dir: Option<PathBuf>,
    /// Remote the working copy is pushed to
    #[clap(long)]
    pub remote_url: Option<String>,
}

impl From<ContextArgs> for ContextInput {
    fn from(args: ContextArgs) -> Self {
        Self {
            token: args.token,
            project_id: args.project,
            branch_id: args.branch,
            scenes: args.scenes,
            directory: args.dir,
            remote_url: args.remote_url,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export, install and push a PlayCanvas project
    Sync {
        #[clap(flatten)]
        context: ContextArgs,
        /// Fill missing fields from PLAYCANVAS_* / GIT_* environment variables
        #[clap(long)]
        from_env: bool,
        /// Fill missing fields from the saved context
        #[clap(long)]
        from_cache: bool,
        /// Path to a YAML settings file
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// Manage the saved push context
    Cache {
        #[clap(subcommand)]
        action: CacheAction,
    },
    /// Print the origin URL of a local git repository
    Remote { dir: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Save a push context for later `sync --from-cache`
    Save {
        #[clap(flatten)]
        context: ContextArgs,
        /// Fill missing fields from the environment
        #[clap(long)]
        from_env: bool,
        /// Replace an existing saved context
        #[clap(long)]
        force: bool,
    },
    /// Print the saved push context with the token hidden
    Show,
}

/// CLI logic entrypoint for integration tests and main(). Returns the
/// process exit status; only main() actually exits.
pub async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Sync {
            context,
            from_env,
            from_cache,
            config,
        } => sync(context, from_env, from_cache, config).await,
        Commands::Cache { action } => cache(action).await,
        Commands::Remote { dir } => match git::remote_url(&dir).await {
            Some(url) => {
                println!("{url}");
                Ok(EXIT_SUCCESS)
            }
            None => {
                eprintln!("No origin remote configured in {}", dir.display());
                Ok(EXIT_FAILURE)
            }
        },
    }
}

pub fn exit_code(outcome: &SyncOutcome) -> i32 {
    match outcome {
        SyncOutcome::Success => EXIT_SUCCESS,
        SyncOutcome::Failed(_) => EXIT_FAILURE,
        SyncOutcome::Cancelled => EXIT_CANCELLED,
    }
}

async fn resolve_context(
    args: ContextArgs,
    from_env: bool,
    from_cache: bool,
) -> Result<PushContext> {
    let mut input = ContextInput::from(args);
    if from_env {
        input = input.or(ContextInput::from_env());
    }
    if from_cache {
        let store = CacheStore::default_location()?;
        match store.load()? {
            Some(cached) => input = input.or(ContextInput::from(cached)),
            None => warn!(path = %store.path().display(), "No cache file found"),
        }
    }
    if input.remote_url.is_none() {
        if let Some(dir) = &input.directory {
            input.remote_url = git::remote_url(dir).await;
        }
    }
    Ok(input.into_context())
}

async fn sync(
    args: ContextArgs,
    from_env: bool,
    from_cache: bool,
    config: Option<PathBuf>,
) -> Result<i32> {
    let settings = load_settings(config.as_deref())?;
    settings.trace_loaded();
    let context = resolve_context(args, from_env, from_cache).await?;
    debug!(?context, "Resolved push context");

    let client = Arc::new(PlayCanvasClient::new(&settings));
    let orchestrator =
        SyncOrchestrator::new(client.clone(), client, Arc::new(GitPusher::new()), settings);
    let mut handle = orchestrator
        .start_sync(context)
        .context("Failed to start sync")?;
    info!(run_id = %handle.run_id(), "Sync started");

    let token = handle.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling sync");
            token.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        match event {
            SyncEvent::Log(entry) => match entry.level {
                LogLevel::Error | LogLevel::Warning => {
                    eprintln!("[{}] {}", entry.level, entry.message)
                }
                _ => println!("[{}] {}", entry.level, entry.message),
            },
            SyncEvent::State(state) => debug!(?state, "Sync state changed"),
            SyncEvent::Finished(_) => {}
        }
    }
    interrupt.abort();

    let report = handle.finished().await;
    info!(
        run_id = %report.run_id,
        outcome = %report.outcome,
        polls = report.polls,
        scripts = report.scripts,
        "Sync run finished"
    );
    Ok(exit_code(&report.outcome))
}

async fn cache(action: CacheAction) -> Result<i32> {
    let store = CacheStore::default_location()?;
    match action {
        CacheAction::Save {
            context,
            from_env,
            force,
        } => {
            if store.path().exists() && !force {
                eprintln!(
                    "Cache file already exists at {}; pass --force to override it",
                    store.path().display()
                );
                return Ok(EXIT_FAILURE);
            }
            let context = resolve_context(context, from_env, false).await?;
            store.save(&CachedContext::from_context(&context))?;
            println!("Cache file written to {}", store.path().display());
            Ok(EXIT_SUCCESS)
        }
        CacheAction::Show => match store.load()? {
            Some(cached) => {
                let token = if cached.token.is_empty() { "(missing)" } else { "(set)" };
                println!("Token:      {token}");
                println!("Project ID: {}", cached.project_id);
                println!("Branch ID:  {}", cached.branch_id);
                println!("Scene IDs:  {}", cached.scene_ids.join(","));
                println!("Directory:  {}", cached.directory.display());
                Ok(EXIT_SUCCESS)
            }
            None => {
                eprintln!("No cache file found at {}", store.path().display());
                Ok(EXIT_FAILURE)
            }
        },
    }
}
