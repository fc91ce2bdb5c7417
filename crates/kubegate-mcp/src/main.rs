//! kubegate MCP server entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use kubegate::{MemoryCluster, ResourceBackend};

use kubegate_mcp::config::{resolve_fixture_path, Overrides, SettingsSource};
use kubegate_mcp::guard::Guard;
use kubegate_mcp::protocol::ProtocolHandler;
use kubegate_mcp::tools::{self, echo, SharedRegistry};
use kubegate_mcp::transport::StdioTransport;
use kubegate_mcp::types::InitializeResult;

#[derive(Parser)]
#[command(
    name = "kubegate-mcp",
    about = "MCP server exposing guarded Kubernetes-style operations to LLM agents",
    version
)]
struct Cli {
    /// Path to a cluster fixture YAML file.
    #[arg(short, long)]
    fixture: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server over stdio (default).
    Serve {
        /// Path to a cluster fixture YAML file.
        #[arg(short, long)]
        fixture: Option<String>,

        /// Block every mutating tool, regardless of the environment.
        #[arg(long)]
        read_only: bool,

        /// Per-call timeout in milliseconds (0 disables).
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Log level (trace, debug, info, warn, error).
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Validate a cluster fixture file.
    Validate,

    /// Print server capabilities and the tool catalogue as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   kubegate-mcp completions bash > ~/.local/share/bash-completion/completions/kubegate-mcp
    ///   kubegate-mcp completions zsh > ~/.zfunc/_kubegate-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_fixture(path: PathBuf) -> anyhow::Result<MemoryCluster> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || MemoryCluster::from_fixture_file(&path))
        .await
        .context("fixture loader task failed")?
        .with_context(|| format!("failed to load fixture {display}"))
}

async fn serve(fixture: Option<PathBuf>, overrides: Overrides) -> anyhow::Result<()> {
    let settings = Arc::new(SettingsSource::Environment(overrides));
    let guard = Arc::new(Guard::new(settings.clone()));
    let registry = SharedRegistry::new();
    tools::register_placeholders(&registry);

    let handler = ProtocolHandler::new(registry, settings).on_initialized(move |ctx| async move {
        let Some(path) = fixture else {
            tracing::warn!("No cluster fixture configured; domain tools stay unavailable");
            return;
        };

        let loaded = tokio::select! {
            _ = ctx.shutdown.cancelled() => return,
            loaded = load_fixture(path) => loaded,
        };
        match loaded {
            Ok(cluster) => {
                let backend: Arc<dyn ResourceBackend> = Arc::new(cluster);
                tools::register_backend_tools(&ctx.registry, backend, guard);
                tracing::info!("Cluster backend ready");
            }
            Err(e) => tracing::error!("Backend initialization failed: {e:#}"),
        }
    });

    let transport = StdioTransport::new(handler);
    let shutdown = transport.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            shutdown.cancel();
        }
    });

    transport.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match &cli.command {
        Some(Commands::Serve {
            log_level: Some(level),
            ..
        }) => level.clone(),
        _ => cli.log_level.clone(),
    };
    init_tracing(&level);

    match cli.command.unwrap_or(Commands::Serve {
        fixture: None,
        read_only: false,
        timeout_ms: None,
        log_level: None,
    }) {
        Commands::Serve {
            fixture,
            read_only,
            timeout_ms,
            log_level: _,
        } => {
            let fixture_path = resolve_fixture_path(fixture.or(cli.fixture).as_deref());
            match &fixture_path {
                Some(path) => tracing::info!("kubegate MCP server (fixture {})", path.display()),
                None => tracing::info!("kubegate MCP server (no fixture)"),
            }
            let overrides = Overrides {
                read_only: read_only.then_some(true),
                timeout_ms,
            };
            serve(fixture_path, overrides).await?;
        }

        Commands::Validate => {
            let Some(path) = resolve_fixture_path(cli.fixture.as_deref()) else {
                eprintln!("No fixture given and ./.kubegate/cluster.yaml does not exist");
                std::process::exit(1);
            };
            match load_fixture(path.clone()).await {
                Ok(cluster) => {
                    println!("Valid fixture: {}", path.display());
                    println!("  Contexts: {}", cluster.context_names().await.join(", "));
                    println!("  Objects: {}", cluster.object_count().await);
                }
                Err(e) => {
                    eprintln!("Invalid fixture: {e:#}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Info => {
            let init = InitializeResult::default_result();
            let mut catalogue = vec![echo::definition()];
            catalogue.extend(tools::definitions());
            let info = serde_json::json!({
                "server": init.server_info,
                "protocol_version": init.protocol_version,
                "capabilities": init.capabilities,
                "tools": catalogue.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": catalogue.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "kubegate-mcp", &mut std::io::stdout());
        }
    }

    Ok(())
}
