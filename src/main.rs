use clap::{Parser, ValueEnum};
use ripd::config::Config;
use ripd::engine::Engine;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser)]
#[command(name = "ripd", version, about = "A RIPv2-style distance-vector routing daemon")]
struct Args {
    /// Path to the router's configuration file
    config: PathBuf,

    /// Print the forwarding table after every broadcast
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ripd=info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(instance_id = config.instance_id, "starting router");

    let engine = match Engine::start(config, args.verbose).await {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!(error = %err, "failed to start engine");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = engine.run().await {
        tracing::error!(error = %err, "engine terminated");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
