use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use webmention_core::endpoint::EndpointDiscoverer;
use webmention_core::monitor::FileSystemMonitor;
use webmention_core::outgoing::OutgoingProcessor;
use webmention_core::storage::sqlite::SqliteStorage;

#[derive(Parser)]
#[command(name = "webmention", about = "CLI for the Webmention protocol engine")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved config file path.
    Config,
    /// List mentions recorded for a resource.
    Mentions {
        resource: String,
        #[arg(long, default_value = "incoming")]
        direction: String,
    },
    /// Send a Webmention notification from source to target.
    Send { source: String, target: String },
    /// Watch a content directory and dispatch outgoing mentions as files change.
    Watch {
        root: PathBuf,
        /// Base URL that watched file paths are resolved against to form resource URLs.
        #[arg(long)]
        base_url: String,
    },
}

#[derive(Deserialize, Serialize)]
struct Config {
    base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Serialize)]
struct WebmentionRequest<'a> {
    source: &'a str,
    target: &'a str,
}

#[derive(Deserialize)]
struct WebmentionView {
    source: String,
    title: Option<String>,
    mention_type: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);
    let config = load_config(&config_path)?;
    let base_url = config.base_url.trim_end_matches('/').to_string();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build http client")?;

    match cli.command {
        Commands::Config => {
            println!("{}", config_path.display());
        }
        Commands::Mentions { resource, direction } => {
            let response = client
                .get(format!("{base_url}/webmentions"))
                .query(&[("resource", resource.as_str()), ("direction", direction.as_str())])
                .send()
                .await
                .context("failed to send mentions request")?;
            handle_mentions_response(response).await?;
        }
        Commands::Send { source, target } => {
            let response = client
                .post(format!("{base_url}/webmention"))
                .form(&WebmentionRequest {
                    source: &source,
                    target: &target,
                })
                .send()
                .await
                .context("failed to send webmention request")?;
            handle_response(response).await?;
        }
        Commands::Watch { root, base_url: watch_base_url } => {
            run_watch(root, watch_base_url).await?;
        }
    }

    Ok(())
}

async fn run_watch(root: PathBuf, base_url: String) -> Result<()> {
    if !root.exists() {
        anyhow::bail!("watch root {} does not exist", root.display());
    }

    let data_dir = root.join(".webmention-cli");
    fs::create_dir_all(&data_dir).context("failed to create state directory")?;
    let storage = Arc::new(
        SqliteStorage::connect(data_dir.join("outgoing.db"))
            .await
            .context("failed to open outgoing mention store")?,
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build http client")?;
    let discoverer = EndpointDiscoverer::new().context("failed to build endpoint discoverer")?;
    let processor = Arc::new(OutgoingProcessor::new(client, discoverer, storage));

    let mapper_root = root.clone();
    let mapper_base_url = base_url.trim_end_matches('/').to_string();
    let mapper: webmention_core::monitor::PathMapper = Box::new(move |path| {
        let relative = path.strip_prefix(&mapper_root).ok()?;
        Some(format!("{}/{}", mapper_base_url, relative.to_string_lossy()))
    });

    let runtime = tokio::runtime::Handle::current();
    let monitor = FileSystemMonitor::new(root.clone(), processor, mapper, runtime);
    monitor.start();

    println!("watching {} for changes (ctrl-c to stop)", root.display());
    tokio::signal::ctrl_c().await.context("failed to await ctrl-c")?;
    monitor.stop();
    Ok(())
}

fn resolve_config_path(config_arg: Option<PathBuf>) -> PathBuf {
    config_arg.unwrap_or_else(default_config_path)
}

fn default_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join("webmention").join("config.json");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("webmention")
            .join("config.json");
    }
    PathBuf::from("config.json")
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let config = Config::default();
        write_config(path, &config)?;
        return Ok(config);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

fn write_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let raw = serde_json::to_string_pretty(config).context("failed to serialize config file")?;
    fs::write(path, raw)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

async fn handle_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let body = response.text().await.context("failed to read response")?;
    if !status.is_success() {
        anyhow::bail!("request failed with status {}: {}", status, body);
    }
    println!("{}", body);
    Ok(())
}

async fn handle_mentions_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let body = response.text().await.context("failed to read response")?;
    if !status.is_success() {
        anyhow::bail!("request failed with status {}: {}", status, body);
    }
    let mentions: Vec<WebmentionView> =
        serde_json::from_str(&body).context("failed to parse mentions response")?;

    if mentions.is_empty() {
        println!("No mentions.");
        return Ok(());
    }

    let type_width = mentions
        .iter()
        .map(|m| m.mention_type.len())
        .max()
        .unwrap_or(4)
        .max("Type".len());
    let mut title_width = mentions
        .iter()
        .map(|m| m.title.as_deref().unwrap_or(m.source.as_str()).len())
        .max()
        .unwrap_or(5)
        .max("Title".len());
    let title_width_cap = 60usize;
    if title_width > title_width_cap {
        title_width = title_width_cap;
    }

    println!("{:<type_width$}  {:<title_width$}  Source", "Type", "Title");
    println!("{:-<type_width$}  {:-<title_width$}  {:-<6}", "", "", "");

    for mention in &mentions {
        let title = mention.title.as_deref().unwrap_or(mention.source.as_str());
        let title = truncate_with_ellipsis(title, title_width);
        println!(
            "{:<type_width$}  {:<title_width$}  {}",
            mention.mention_type, title, mention.source
        );
    }

    Ok(())
}

fn truncate_with_ellipsis(value: &str, max_width: usize) -> String {
    if value.len() <= max_width {
        return value.to_string();
    }
    if max_width <= 3 {
        return value.chars().take(max_width).collect();
    }
    format!("{}...", value.chars().take(max_width - 3).collect::<String>())
}
