//! redmine-mcp CLI - MCP server and tooling for the Redmine REST API.

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use redmine_mcp::{AppContext, HttpState, LineTransport, McpServer, Registry};
use redmine_mcp_client::RedmineClient;
use redmine_mcp_core::{AuthMode, Config, MetricsCollector};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Keys listed by `config show`, in display order.
const CONFIG_KEYS: &[&str] = &[
    "redmine.url",
    "redmine.api_key",
    "redmine.auth",
    "redmine.connect_timeout_secs",
    "redmine.read_timeout_secs",
    "redmine.max_pages",
    "server.host",
    "server.port",
    "server.environment",
    "metrics.slow_threshold_secs",
    "metrics.max_slow_requests",
];

#[derive(Parser)]
#[command(name = "redmine-mcp")]
#[command(author, version, about = "MCP server for the Redmine REST API", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server (stdio unless --http is given)
    Serve {
        /// Serve the HTTP API instead of stdio
        #[arg(long)]
        http: bool,

        /// Address to bind in HTTP mode
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on in HTTP mode
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check connectivity to the configured Redmine instance
    Check,

    /// List the available tools
    Tools,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Set a value, e.g. `config set redmine.url https://redmine.example.com`
    Set { key: String, value: String },

    /// Print a single value
    Get { key: String },

    /// Show the effective configuration
    Show,

    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout belongs to the stdio transport
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Serve { http, host, port }) => {
            let config = load_config()?;
            if http {
                serve_http(config, host, port).await
            } else {
                serve_stdio(config).await
            }
        }
        Some(Commands::Check) => check().await,
        Some(Commands::Tools) => {
            let registry = Registry::with_defaults();
            for tool in registry.tools() {
                println!("{:<20} {}", tool.name(), tool.description());
            }
            Ok(())
        }
        Some(Commands::Config { command }) => handle_config(command),
        None => {
            println!("redmine-mcp - MCP server for the Redmine REST API");
            println!("Run with --help for usage information");
            Ok(())
        }
    }
}

/// Config file plus environment overrides, validated.
fn load_config() -> anyhow::Result<Config> {
    let mut config = Config::load().context("Failed to load configuration")?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn build_client(config: &Config, metrics: &Arc<MetricsCollector>) -> anyhow::Result<RedmineClient> {
    Ok(RedmineClient::from_config(&config.redmine)?.with_metrics(Arc::clone(metrics)))
}

fn build_context(
    config: &Config,
    client: &RedmineClient,
    metrics: Arc<MetricsCollector>,
) -> AppContext {
    AppContext::new(
        Arc::new(Registry::with_defaults()),
        Arc::new(client.clone()),
        metrics,
    )
    .with_environment(config.server.environment)
}

/// Startup connectivity check. Never fatal.
async fn check_startup_connection(client: &RedmineClient) {
    match client.test_connection().await {
        Ok(true) => info!(url = client.base_url(), "Connected to Redmine"),
        Ok(false) => warn!(url = client.base_url(), "Unexpected response from Redmine"),
        Err(e) => warn!(url = client.base_url(), error = %e, "Redmine unreachable, continuing"),
    }
}

async fn serve_stdio(config: Config) -> anyhow::Result<()> {
    let metrics = Arc::new(MetricsCollector::from_config(&config.metrics));
    let client = build_client(&config, &metrics)?;
    check_startup_connection(&client).await;

    let ctx = build_context(&config, &client, metrics);
    info!(
        tools = ctx.registry().tools().len(),
        resources = ctx.registry().resources().len(),
        "Starting MCP server on stdio"
    );

    let mut server = McpServer::new(ctx);
    server.run(&mut LineTransport::stdio()).await?;
    info!("MCP server stopped");
    Ok(())
}

async fn serve_http(config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let metrics = Arc::new(MetricsCollector::from_config(&config.metrics));
    let client = build_client(&config, &metrics)?;
    check_startup_connection(&client).await;

    // Bearer mode without a default token has no fallback credential
    let require_bearer = config.redmine.auth == AuthMode::Bearer
        && config.redmine.api_key.as_deref().map_or(true, str::is_empty);

    let ctx = build_context(&config, &client, metrics);
    let state = HttpState::new(ctx, client.base_url())
        .with_client(client.clone())
        .require_bearer(require_bearer);

    let addr = format!(
        "{}:{}",
        host.unwrap_or(config.server.host),
        port.unwrap_or(config.server.port)
    );
    redmine_mcp::serve(state, &addr)
        .await
        .with_context(|| format!("HTTP server on {} failed", addr))
}

async fn check() -> anyhow::Result<()> {
    let config = load_config()?;
    let metrics = Arc::new(MetricsCollector::from_config(&config.metrics));
    let client = build_client(&config, &metrics)?;

    println!("Redmine URL: {}", client.base_url());
    match client.test_connection().await {
        Ok(true) => {
            println!("Connection OK");
            Ok(())
        }
        Ok(false) => bail!("Redmine answered without a current user"),
        Err(e) => bail!("Connection failed: {}", e),
    }
}

fn handle_config(command: ConfigCommands) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("Set {}", key);
        }
        ConfigCommands::Get { key } => match Config::load()?.get(&key)? {
            Some(value) => println!("{}", display_value(&key, &value)),
            None => println!("(not set)"),
        },
        ConfigCommands::Show => {
            let mut config = Config::load()?;
            config.apply_env_overrides()?;
            println!("Configuration ({})", Config::config_path()?.display());
            for key in CONFIG_KEYS {
                let value = config.get(key)?;
                match value {
                    Some(value) => println!("  {} = {}", key, display_value(key, &value)),
                    None => println!("  {} = (not set)", key),
                }
            }
        }
        ConfigCommands::Path => println!("{}", Config::config_path()?.display()),
    }
    Ok(())
}

/// Mask secrets, keeping a short prefix for recognition.
fn display_value(key: &str, value: &str) -> String {
    if key.ends_with("api_key") || key.ends_with(".key") {
        let prefix: String = value.chars().take(4).collect();
        format!("{}***", prefix)
    } else {
        value.to_string()
    }
}
