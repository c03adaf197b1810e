#![forbid(unsafe_code)]

use clap::Parser;
use scorecard_tools::store_cli::{execute_store_command, resolve_config, Cli};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let output = execute_store_command(&cli, &config)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
