use anyhow::{Context, Result};
use clap::Parser;
use mistral::{logging, MistralConfig, MistralOrchestrator};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mistral")]
#[command(about = "HTTP metric ingestion gateway")]
#[command(disable_version_flag = true)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mistral.conf")]
    config: String,

    /// Print version information to stderr and exit
    #[arg(long)]
    version: bool,
}

fn print_version() {
    eprintln!("Mistral Metric API");
    eprintln!("Version  : {}", env!("CARGO_PKG_VERSION"));
    if let Some(hash) = option_env!("MISTRAL_GIT_HASH") {
        eprintln!("Git Hash : {}", hash);
    }
    if let Some(timestamp) = option_env!("MISTRAL_BUILD_TIME") {
        eprintln!("Timestamp: {}", timestamp);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        print_version();
        return Ok(());
    }

    let config = MistralConfig::load_from_file(&args.config)
        .with_context(|| format!("could not open configuration: {}", args.config))?;

    let log_guard = logging::init(&config.log).context("unable to open logfile")?;
    if config.log.rotate {
        logging::spawn_rotation_task(&log_guard);
    }

    info!("Starting MISTRAL...");

    let mut orchestrator = MistralOrchestrator::new(config);
    orchestrator.start()?;

    let exit_code = orchestrator.run().await?;

    info!("Mistral exited with code {}", exit_code);

    // process::exit skips destructors; flush the log worker first.
    drop(log_guard);
    std::process::exit(exit_code);
}
