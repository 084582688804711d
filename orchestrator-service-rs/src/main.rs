// orchestrator-service-rs/src/main.rs
// Command-line entry point for the research pipeline

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator_service::{
    init_logging, LoggingConfig, OrchestrationError, SubmitRequest, WorkflowOrchestrator,
};
use shared_types_rs::{OverallStatus, Request, StatusRecord};
use tool_sdk::config::DEFAULT_PROVIDER;
use tool_sdk::{CompositeConfigProvider, ConfigProvider, EnvConfigProvider};
use tracing::info;

const DEMO_REQUEST: &str = "Summary of the latest AI policy news";

#[derive(Parser)]
#[command(
    name = "orchestrator-service",
    version,
    about = "Run research requests through the collector, processor, action and reporter stages."
)]
struct Cli {
    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true, env = "PIPELINE_LOG_LEVEL")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one request to completion and print its final status as JSON
    Run {
        /// Natural-language request text
        raw_text: String,

        /// Request id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Submit a sample request in the background and poll its progress
    Demo {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 50)]
        poll_ms: u64,
    },

    /// Serve the workflow API over HTTP until Ctrl-C
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:8080", env = "PIPELINE_BIND_ADDR")]
        bind: SocketAddr,
    },
}

fn build_orchestrator() -> Result<WorkflowOrchestrator> {
    let settings: Arc<dyn ConfigProvider> = DEFAULT_PROVIDER.clone();
    // credentials by their own names first, then PIPELINE_-prefixed
    let secrets = CompositeConfigProvider::new()
        .with_provider(Arc::new(EnvConfigProvider::new()))
        .with_provider(settings.clone());
    WorkflowOrchestrator::from_providers(settings.as_ref(), &secrets)
        .context("failed to configure the pipeline")
}

fn print_record(record: &StatusRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record).context("failed to serialize status")?;
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LoggingConfig {
        level: cli.log_level.clone(),
        json_format: cli.json_logs,
        ..LoggingConfig::default()
    })?;

    let orchestrator = build_orchestrator()?;
    info!(registry = ?orchestrator.registry(), "pipeline configured");

    let record = match cli.command {
        Command::Serve { bind } => return orchestrator_service::serve(orchestrator, bind).await,
        Command::Run { raw_text, id } => {
            let request = Request::new(raw_text, id).map_err(OrchestrationError::from)?;
            orchestrator.run(request).await?
        }
        Command::Demo { poll_ms } => {
            let handle = orchestrator.submit(SubmitRequest::new(DEMO_REQUEST))?;
            let request_id = handle.request_id.clone();

            let mut last_progress = -1.0;
            loop {
                let snapshot = orchestrator.status(&request_id)?;
                if snapshot.progress() != last_progress {
                    last_progress = snapshot.progress();
                    info!(
                        request_id = %request_id,
                        current_stage = ?snapshot.current_stage,
                        progress = last_progress,
                        "polled status"
                    );
                }
                if snapshot.is_terminal() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(poll_ms)).await;
            }
            handle.wait().await?
        }
    };

    info!(metrics = ?orchestrator.resolver_metrics(), "resolver metrics");
    print_record(&record)?;

    if record.overall_status != OverallStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}
