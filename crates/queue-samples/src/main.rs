use clap::Parser;
use queue_samples::{initialize_logging, run_samples, Cli};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(&cli.log_level, cli.json_logs) {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }

    match run_samples(&cli).await {
        Ok(report) => {
            info!(completed = report.completed.len(), "All samples completed");
        }
        Err(e) => {
            error!("Samples failed: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
