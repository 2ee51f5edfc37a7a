// Cadence orchestration engine
// Main entry point for the cadence binary

use clap::Parser;
use cadence_engine::cli::{Cli, Command};
use cadence_engine::conductor::TurnOptions;
use cadence_engine::config::Config;
use cadence_engine::handlers::{
    handle_approve, handle_capabilities, handle_doctor, handle_pending, handle_run, OutputFormat,
};
use cadence_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    // --log beats the config file; RUST_LOG beats both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Cadence v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Run {
            message,
            session,
            skip_extraction,
            skip_classification,
        } => {
            let options = TurnOptions {
                bypass_task_extraction: skip_extraction.then_some(true),
                bypass_classification: skip_classification.then_some(true),
            };
            handle_run(message, session, options, &config, format).await
        }

        Command::Approve { handle, reply } => {
            tracing::info!("Answering approval {}", handle);
            handle_approve(handle, reply, &config, format).await
        }

        Command::Pending => handle_pending(&config, format).await,

        Command::Capabilities => handle_capabilities(&config, format).await,

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
