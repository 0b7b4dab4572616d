//! # Review-Relay Service
//!
//! Binary entry point. `review-relay serve` wires the pipeline together:
//! configuration, the event store, analyzer clients, the poster, the
//! provider watcher, and the orchestrator consuming the event channel.

mod config;
mod json_events;

use crate::config::RelayConfig;
use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use review_relay_core::store::{EventStore, FilesystemEventStore, MemoryEventStore};
use review_relay_core::{
    Analyzer, ChangeSource, HttpAnalyzerClient, LogPoster, OfflineChangeSource, Orchestrator,
    Poster, RepositoryInfo,
};
use review_relay_github::client::{Client, ClientOptions, ClientPool};
use review_relay_github::{GithubPoster, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Buffered events between the watcher and the orchestrator.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Parser)]
#[command(name = "review-relay", about = "Code review orchestration service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch repositories and dispatch events to analyzers
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Path to the configuration file
    #[arg(short = 'c', long, default_value = "config.yml", env = "RELAY_CONFIG_FILE")]
    config: String,

    /// User for the provider API
    #[arg(long, env = "GITHUB_USER")]
    github_user: Option<String>,

    /// Access token for the provider API
    #[arg(long, env = "GITHUB_TOKEN")]
    github_token: Option<String>,

    /// Event source to watch
    #[arg(long, value_enum, default_value_t = ProviderKind::Github, env = "RELAY_PROVIDER")]
    provider: ProviderKind,

    /// Log analysis results instead of posting them to the provider
    #[arg(long, env = "RELAY_DRY_RUN")]
    dry_run: bool,

    /// Event-store path; overrides the configuration file
    #[arg(long, env = "RELAY_STORE")]
    store: Option<PathBuf>,

    /// Repositories to watch, in addition to the configuration file
    #[arg(value_name = "REPOSITORY")]
    repositories: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    /// Poll or receive webhooks from GitHub
    Github,
    /// Read newline-delimited JSON events from stdin
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "review_relay=info,review_relay_service=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = RelayConfig::load(&args.config).context("loading configuration")?;

    let repositories = resolve_repositories(&args, &config)?;
    if repositories.is_empty() && args.provider == ProviderKind::Github && !config.providers.github.webhooks {
        anyhow::bail!("no repositories to watch; list them in the configuration or as arguments");
    }

    let store = open_store(&args, &config).await?;
    let analyzers = build_analyzers(&config)?;
    if analyzers.is_empty() {
        warn!("no analyzers configured; events will be processed without analysis");
    }

    let pool = Arc::new(ClientPool::new(vec![(
        Arc::new(Client::new(ClientOptions {
            user: args.github_user.clone(),
            token: args.github_token.clone(),
            ..ClientOptions::default()
        })),
        repositories,
    )]));

    let poster = build_poster(&args, &config, Arc::clone(&pool));
    let changes: Arc<dyn ChangeSource> = Arc::new(OfflineChangeSource::new());

    let mut orchestrator = Orchestrator::new(analyzers, store, changes, poster);
    if let Some(secs) = config.analyzer_timeout_secs {
        orchestrator = orchestrator.with_analyzer_timeout(Duration::from_secs(secs));
    }
    let orchestrator = Arc::new(orchestrator);

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator_task = tokio::spawn(Arc::clone(&orchestrator).run(events_rx));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let watch_result = match args.provider {
        ProviderKind::Github => {
            let watcher = Watcher::new(pool, config.providers.github.clone());
            watcher
                .watch(events_tx, shutdown_rx)
                .await
                .context("provider watcher failed")
        }
        ProviderKind::Json => json_events::watch_stdin(events_tx, shutdown_rx)
            .await
            .context("event ingestion failed"),
    };

    // the watcher dropped its sender; the orchestrator drains and exits
    orchestrator_task.await.context("orchestrator task panicked")?;

    watch_result
}

fn resolve_repositories(
    args: &ServeArgs,
    config: &RelayConfig,
) -> anyhow::Result<Vec<RepositoryInfo>> {
    config
        .repositories
        .iter()
        .chain(args.repositories.iter())
        .map(|url| {
            RepositoryInfo::parse(url).with_context(|| format!("invalid repository '{}'", url))
        })
        .collect()
}

async fn open_store(args: &ServeArgs, config: &RelayConfig) -> anyhow::Result<Arc<dyn EventStore>> {
    let path = args.store.as_ref().or(config.store.as_ref());
    match path {
        Some(path) => {
            info!(path = %path.display(), "opening filesystem event store");
            let store = FilesystemEventStore::open(path)
                .await
                .context("opening event store")?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("no store path configured; processed-event records will not survive restarts");
            Ok(Arc::new(MemoryEventStore::new()))
        }
    }
}

fn build_analyzers(config: &RelayConfig) -> anyhow::Result<Vec<Analyzer>> {
    let timeout = config
        .analyzer_timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(HttpAnalyzerClient::DEFAULT_TIMEOUT);

    config
        .analyzers
        .iter()
        .map(|analyzer_config| {
            let client = HttpAnalyzerClient::new(&analyzer_config.addr, timeout)
                .with_context(|| format!("analyzer '{}'", analyzer_config.name))?;
            info!(
                analyzer = %analyzer_config.name,
                addr = %analyzer_config.addr,
                disabled = analyzer_config.disabled,
                "configured analyzer"
            );
            Ok(Analyzer {
                client: Arc::new(client),
                config: analyzer_config.clone(),
            })
        })
        .collect()
}

fn build_poster(args: &ServeArgs, config: &RelayConfig, pool: Arc<ClientPool>) -> Arc<dyn Poster> {
    if args.dry_run || args.provider == ProviderKind::Json {
        if !args.dry_run {
            info!("json provider has no posting surface; logging analysis results");
        }
        return Arc::new(LogPoster::new());
    }

    Arc::new(GithubPoster::new(
        pool,
        config.providers.github.comment_footer.clone(),
    ))
}
