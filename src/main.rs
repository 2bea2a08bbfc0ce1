use anyhow::Result;
use clap::{Parser, Subcommand};
use rmcp::ServiceExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geoglows_mcp::client::GeoglowsClient;
use geoglows_mcp::config::Config;
use geoglows_mcp::constants::DEFAULT_PLOT_FILE;
use geoglows_mcp::dispatcher::Dispatcher;
use geoglows_mcp::formatters::{format_payload, format_return_periods};
use geoglows_mcp::llm::{LlmToolSelector, ToolDefinition};
use geoglows_mcp::models::{ReturnPeriodTable, RiverReachId, ToolName};
use geoglows_mcp::plot::plot_outcome;
use geoglows_mcp::service::Geoglows;
use geoglows_mcp::transport::{RegistrySession, ServerCommand};

#[derive(Parser)]
#[command(name = "geoglows-mcp", version, about = "GEOGLOWS streamflow tools over MCP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the streamflow tools over stdin/stdout
    Serve,

    /// Answer a streamflow question using the tools
    Ask {
        /// Free-form task, e.g. "forecast for river 760701588"
        task: String,

        /// Render the result to a PNG file
        #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = DEFAULT_PLOT_FILE)]
        plot: Option<PathBuf>,

        /// Program that serves the tools (defaults to this binary)
        #[arg(long, value_name = "PROGRAM")]
        server_command: Option<PathBuf>,

        /// Argument passed to the server program; repeatable
        #[arg(long = "server-arg", value_name = "ARG", allow_hyphen_values = true)]
        server_args: Vec<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geoglows_mcp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!(api_base = %config.api_base, "Starting GEOGLOWS MCP server");

    let client = GeoglowsClient::new(&config)?;
    let server = Geoglows::new(client).serve(rmcp::transport::stdio()).await?;
    server.waiting().await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn ask(
    config: Config,
    task: String,
    plot: Option<PathBuf>,
    launcher: ServerCommand,
) -> Result<()> {
    let session = Arc::new(RegistrySession::new(launcher));
    let result = run_task(&config, &task, plot, session.clone()).await;

    if let Err(e) = session.shutdown().await {
        tracing::warn!(error = %e, "registry shutdown failed");
    }
    result
}

async fn run_task(
    config: &Config,
    task: &str,
    plot: Option<PathBuf>,
    session: Arc<RegistrySession>,
) -> Result<()> {
    let tools = session
        .list_tools()
        .await?
        .iter()
        .map(ToolDefinition::from)
        .collect();
    let selector = LlmToolSelector::new(config, tools)?;
    let dispatcher = Dispatcher::new(selector, session);

    let outcome = dispatcher.dispatch(task).await?;
    println!("{}", format_payload(&outcome.data)?);

    if outcome.tool == ToolName::GetReturnPeriods {
        if let Some(river_id) = outcome.river_id.and_then(|id| RiverReachId::new(id).ok()) {
            match ReturnPeriodTable::from_payload(&outcome.data) {
                Ok(table) => eprintln!("{}", format_return_periods(river_id, &table)),
                Err(e) => tracing::warn!(error = %e, "return period summary unavailable"),
            }
        }
    }

    if let Some(path) = plot {
        if let Some(written) = plot_outcome(&outcome, &path)? {
            eprintln!("Chart saved to {}", written.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Ask {
            task,
            plot,
            server_command,
            server_args,
        } => {
            let launcher = match server_command {
                Some(program) => ServerCommand::new(program, server_args),
                None => ServerCommand::current_exe()?,
            };
            ask(config, task, plot, launcher).await
        }
    }
}
