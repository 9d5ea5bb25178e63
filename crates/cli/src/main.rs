use crate::{commands::Commands, error::CliError, shutdown::ShutdownCoordinator};
use clap::Parser;
use connectors::metrics_store::MetricsStore;
use engine_core::plan::ExecutionPlan;
use engine_processing::{executor, operators::builtin_registry};
use model::pipeline::PipelineSpec;
use tokio_util::sync::CancellationToken;
use tracing::Level;

mod commands;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "factoryctl",
    version = "0.0.1",
    about = "Record-processing pipeline tool"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    // Initialize logger
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    match dispatch(cli.command, &shutdown).await {
        Ok(()) => {}
        Err(CliError::ShutdownRequested) => {
            std::process::exit(shutdown::ExitCode::ShutdownRequested.as_i32());
        }
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(shutdown::ExitCode::GeneralError.as_i32());
        }
    }
}

async fn dispatch(command: Commands, shutdown: &ShutdownCoordinator) -> Result<(), CliError> {
    match command {
        Commands::Run { config } => {
            let plan = load_plan(&config).await?;
            let result = executor::run(plan, shutdown.cancel_token()).await;

            match result {
                Ok(summary) => {
                    output::print_run_summary(&summary);
                    Ok(())
                }
                Err(engine_processing::error::ExecutorError::Cancelled)
                    if shutdown.is_shutdown_requested() =>
                {
                    Err(CliError::ShutdownRequested)
                }
                Err(err) => Err(err.into()),
            }
        }
        Commands::Validate { config, json } => {
            let plan = load_plan(&config).await?;
            if json {
                let rendered = serde_json::to_string_pretty(&plan.spec)
                    .map_err(CliError::JsonSerialize)?;
                println!("{rendered}");
            } else {
                output::print_plan_summary(&plan);
            }
            Ok(())
        }
        Commands::Metrics { root, json } => show_metrics(&root, json),
        Commands::Operators => {
            for name in builtin_registry().names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

async fn load_plan(path: &str) -> Result<ExecutionPlan, CliError> {
    let source = tokio::fs::read_to_string(path).await?;
    let spec: PipelineSpec = serde_json::from_str(&source)?;
    let plan = ExecutionPlan::build(spec, &builtin_registry())?;
    Ok(plan)
}

fn show_metrics(root: &str, as_json: bool) -> Result<(), CliError> {
    let store = MetricsStore::new(root);
    let runs = store.load_runs()?;

    if as_json {
        let rendered = serde_json::to_string_pretty(&runs).map_err(CliError::JsonSerialize)?;
        println!("{rendered}");
    } else {
        output::print_run_table(&runs);
    }
    Ok(())
}
