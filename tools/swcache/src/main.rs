//! Command-line driver for the swcache agent.
//!
//! Hosts one agent over a persistent on-disk cache and a real HTTP client,
//! so the cache behaviour can be exercised outside a browser.
//!
//! ## Usage
//!
//! ```bash
//! # Install, then resolve a page and its data
//! swcache run ./ ./products.json --config swcache.json
//!
//! # Treat the URLs as navigations (offline document on failure)
//! swcache run ./checkout --navigate
//!
//! # List cache stores on disk
//! swcache caches
//!
//! # Send a raw control message
//! swcache message '{"type":"GET_VERSION"}'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use swcache_agent::{
    AgentConfig, AgentEvent, CacheStorage, ControlMessage, FetchDisposition, FileStorage,
    LifecycleController,
};
use swcache_common::{init_logging, LogFormat};
use swcache_net::{HttpFetcher, LoaderConfig, Request};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

#[derive(Parser)]
#[command(name = "swcache")]
#[command(about = "Offline caching agent driver")]
struct Cli {
    /// Agent config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<Format>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install and activate the agent, then resolve each URL through it
    Run {
        /// URLs, absolute or relative to the configured scope
        #[arg(required = true)]
        urls: Vec<String>,
        /// Issue the requests as navigations
        #[arg(long)]
        navigate: bool,
    },

    /// List cache stores and their entries
    Caches,

    /// Print the agent's cache version
    Version,

    /// Send a raw control message to the agent
    Message {
        /// Message JSON, e.g. {"type":"SKIP_WAITING"}
        json: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Pretty,
    Compact,
    Json,
}

impl From<Format> for LogFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Pretty => LogFormat::Pretty,
            Format::Compact => LogFormat::Compact,
            Format::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AgentConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AgentConfig::default(),
    };

    let mut log = config.log.clone();
    if let Some(format) = cli.log_format {
        log = log.with_format(format.into());
    }
    init_logging(&log)?;

    let storage = Arc::new(
        FileStorage::open_dir(config.storage_dir())
            .await
            .context("opening cache directory")?,
    );

    match cli.command {
        Commands::Run { urls, navigate } => run(&config, storage, &urls, navigate).await?,

        Commands::Caches => {
            debug!(dir = %storage.dir().display(), "Listing caches");
            let mut listing = serde_json::Map::new();
            for name in storage.keys().await? {
                let entries: Vec<String> = storage
                    .entries(&name)
                    .await?
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                listing.insert(name, entries.into());
            }
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }

        Commands::Version => {
            let (agent, _events) = agent(&config, storage)?;
            let (tx, rx) = oneshot::channel();
            agent.handle_message(ControlMessage::GetVersion, Some(tx)).await?;
            println!("{}", rx.await?.version);
        }

        Commands::Message { json } => {
            let (agent, _events) = agent(&config, storage)?;
            let (tx, rx) = oneshot::channel();
            agent.handle_message_json(&json, Some(tx)).await?;
            match rx.await {
                Ok(reply) => println!("{}", serde_json::to_string(&reply)?),
                Err(_) => println!("state: {:?}", agent.state().await),
            }
        }
    }

    Ok(())
}

fn agent(
    config: &AgentConfig,
    storage: Arc<FileStorage>,
) -> Result<(LifecycleController, mpsc::UnboundedReceiver<AgentEvent>)> {
    let fetcher = HttpFetcher::new(&config.scope_url()?, LoaderConfig::default())?;
    Ok(LifecycleController::new(config, storage, Arc::new(fetcher))?)
}

async fn run(
    config: &AgentConfig,
    storage: Arc<FileStorage>,
    urls: &[String],
    navigate: bool,
) -> Result<()> {
    let (agent, mut events) = agent(config, storage)?;

    let install = agent.install().await?;
    if !install.failed.is_empty() {
        println!("Precache failed for {} entries:", install.failed.len());
        for failure in &install.failed {
            println!("  {failure}");
        }
    }

    for raw in urls {
        let url = config.resolve(raw)?;
        let request = if navigate {
            Request::navigate(url)
        } else {
            Request::get(url)
        };

        match agent.handle_fetch(&request).await {
            Ok(FetchDisposition::Respond(resolution)) => println!(
                "{:<36} {} {} ({} bytes{})",
                format!("{:?}", resolution.outcome),
                resolution.response.status.as_u16(),
                request.url,
                resolution.response.body.len(),
                if resolution.outcome.from_cache() { ", cached" } else { "" }
            ),
            Ok(FetchDisposition::Passthrough) => {
                println!("{:<36} {}", "Passthrough", request.url)
            }
            Err(e) => println!("{:<36} {} ({e})", "Failed", request.url),
        }
    }

    let refreshed = agent.settle().await;
    if refreshed > 0 {
        println!("Background refreshes completed: {refreshed}");
    }

    while let Ok(event) = events.try_recv() {
        debug!(?event, "Agent event");
    }

    Ok(())
}
