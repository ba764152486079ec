//! fte-mcp: entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use fte_dispatch::{Dispatcher, DEFAULT_MAX_PENDING_BYTES};
use fte_mcp::client::{HttpApiClient, DEFAULT_HTTP_TIMEOUT_SECS};
use fte_mcp::config::{self, AdapterConfig, MalformedMode};
use fte_mcp::tools::{build_registry, Adapter, ToolContext};
use fte_mcp::transport::StdioTransport;
use fte_mcp::types::{AdapterSummary, SERVER_NAME, SERVER_VERSION};

#[derive(Parser)]
#[command(
    name = "fte-mcp",
    about = "DigitalFTE adapter server: vendor tools over line-delimited JSON on stdio",
    version,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Adapter to serve over stdio when no subcommand is given.
    #[arg(short, long, value_enum)]
    adapter: Option<Adapter>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    run: RunOptions,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by every command that builds an adapter.
#[derive(Args, Clone)]
struct RunOptions {
    /// How to treat a line that is not a valid request.
    #[arg(long, value_enum, default_value = "reject")]
    malformed: MalformedMode,

    /// Largest incomplete request held in rebuffer mode.
    #[arg(long, default_value_t = DEFAULT_MAX_PENDING_BYTES)]
    max_pending_bytes: usize,

    /// Skip input-schema validation before calling a tool.
    #[arg(long)]
    no_validate: bool,

    /// Load environment variables from this file instead of ./.env.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Path to the Gmail token JSON file.
    #[arg(long)]
    gmail_credentials: Option<String>,

    /// Timeout for each vendor API call, in seconds.
    #[arg(long, default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    http_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve an adapter over stdio (default).
    Serve {
        #[arg(value_enum)]
        adapter: Adapter,

        #[command(flatten)]
        run: RunOptions,
    },

    /// Serve an adapter over HTTP.
    #[cfg(feature = "http")]
    ServeHttp {
        #[arg(value_enum)]
        adapter: Adapter,

        /// Listen address (host:port).
        #[arg(long, default_value = "127.0.0.1:3100")]
        addr: String,

        /// Bearer token for authentication.
        /// Also reads from FTE_TOKEN env var.
        #[arg(long)]
        token: Option<String>,

        #[command(flatten)]
        run: RunOptions,
    },

    /// Print an adapter's tool catalog.
    Tools {
        #[arg(value_enum)]
        adapter: Adapter,
    },

    /// Print every adapter and its tools as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   fte-mcp completions bash > ~/.local/share/bash-completion/completions/fte-mcp
    ///   fte-mcp completions zsh > ~/.zfunc/_fte-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl {
        #[arg(value_enum)]
        adapter: Adapter,

        #[command(flatten)]
        run: RunOptions,
    },
}

/// Resolve configuration and build the dispatcher for one adapter.
fn prepare(adapter: Adapter, run: &RunOptions) -> anyhow::Result<Dispatcher> {
    config::load_env_file(run.env_file.as_deref())?;

    let config = AdapterConfig::from_env(run.gmail_credentials.as_deref());
    tracing::info!(
        adapter = %adapter,
        credentials = ?config.configured(),
        "Configuration loaded"
    );

    let client = HttpApiClient::new(Duration::from_secs(run.http_timeout_secs))?;
    let ctx = ToolContext::new(Arc::new(client), Arc::new(config));
    let registry = build_registry(adapter, &ctx)?;
    tracing::info!(tools = registry.len(), "{adapter} adapter ready");

    Ok(Dispatcher::new(Arc::new(registry)).with_validation(!run.no_validate))
}

/// A registry for catalog listing only; no vendor call is ever made through it.
fn catalog_context() -> anyhow::Result<ToolContext> {
    let client = HttpApiClient::new(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))?;
    Ok(ToolContext::new(
        Arc::new(client),
        Arc::new(AdapterConfig::default()),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let command = match (cli.command, cli.adapter) {
        (Some(command), _) => command,
        (None, Some(adapter)) => Commands::Serve {
            adapter,
            run: cli.run,
        },
        (None, None) => {
            eprint!("{}", Cli::command().render_help());
            anyhow::bail!("no adapter selected; use `fte-mcp serve <adapter>` or --adapter");
        }
    };

    match command {
        Commands::Serve { adapter, run } => {
            let dispatcher = prepare(adapter, &run)?;
            let policy = run.malformed.policy(run.max_pending_bytes);
            let transport = StdioTransport::new(dispatcher).with_policy(policy);
            transport.run().await?;
        }

        #[cfg(feature = "http")]
        Commands::ServeHttp {
            adapter,
            addr,
            token,
            run,
        } => {
            use fte_mcp::transport::HttpTransport;

            // Resolve token: CLI flag > env var
            let effective_token = token.or_else(|| std::env::var("FTE_TOKEN").ok());

            let dispatcher = prepare(adapter, &run)?;
            if effective_token.is_some() {
                tracing::info!("Auth: bearer token required");
            }

            let transport = HttpTransport::new(adapter.name(), dispatcher, effective_token);
            transport.run(&addr).await?;
        }

        Commands::Tools { adapter } => {
            let registry = build_registry(adapter, &catalog_context()?)?;
            for tool in registry.list() {
                println!("{}: {}", tool.name, tool.description);
            }
        }

        Commands::Info => {
            let ctx = catalog_context()?;
            let adapters = Adapter::ALL
                .iter()
                .map(|&adapter| {
                    build_registry(adapter, &ctx)
                        .map(|registry| AdapterSummary::new(adapter.name(), &registry))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let info = serde_json::json!({
                "server": { "name": SERVER_NAME, "version": SERVER_VERSION },
                "adapters": adapters,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "fte-mcp", &mut std::io::stdout());
        }

        Commands::Repl { adapter, run } => {
            let dispatcher = prepare(adapter, &run)?;
            let runtime = tokio::runtime::Handle::current();
            tokio::task::spawn_blocking(move || {
                fte_mcp::repl::run(adapter.name(), dispatcher, runtime)
            })
            .await??;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_options_conflict_with_subcommand() {
        let err = Cli::try_parse_from(["fte-mcp", "--malformed", "rebuffer", "serve", "twitter"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);

        let cli = Cli::try_parse_from(["fte-mcp", "serve", "twitter", "--malformed", "rebuffer"])
            .unwrap();
        match cli.command {
            Some(Commands::Serve { run, .. }) => {
                assert!(matches!(run.malformed, MalformedMode::Rebuffer))
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_top_level_adapter_without_subcommand() {
        let cli = Cli::try_parse_from(["fte-mcp", "--adapter", "twitter", "--no-validate"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.run.no_validate);
    }
}
