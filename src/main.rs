//! ctxcrop - contextual image-crop derivatives
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use ctxcrop::cli::{commands, Cli, Commands};
use ctxcrop::config::ConfigManager;
use ctxcrop::error::CropResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CropResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("ctxcrop=warn"),
        1 => EnvFilter::new("ctxcrop=info"),
        _ => EnvFilter::new("ctxcrop=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    match cli.command {
        Commands::Path(args) => commands::path(args, &config).await,
        Commands::Url(args) => commands::url(args, &config).await,
        Commands::Decode(args) => commands::decode(args, &config).await,
        Commands::Deliver(args) => commands::deliver(args, &config).await,
        Commands::Get(args) => commands::get(args, &config).await,
        Commands::Flush(args) => commands::flush(args, &config).await,
        Commands::Styles(args) => commands::styles(args, &config).await,
        Commands::Crop(args) => commands::crop(args, &config).await,
        Commands::Config(args) => commands::config(args, &config_manager, &config).await,
    }
}
