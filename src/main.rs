//! Modelbench CLI
//!
//! Command-line front end for the model workbench core.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use modelbench::cli::{commands, Cli, Commands};
use modelbench::config::WorkbenchConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Modelbench v{}", env!("CARGO_PKG_VERSION"));

    let mut config = WorkbenchConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.settings_dir {
        config.settings_dir = dir;
    }
    if let Some(dir) = cli.manifests_dir {
        config.manifests_dir = dir;
    }

    match cli.command {
        Some(cmd) => handle_command(&config, cmd),
        None => {
            println!("Modelbench v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(config: &WorkbenchConfig, cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Scan { models_dir } => commands::scan(config, models_dir.as_deref())?,
        Commands::Variants { files } => commands::variants(&files)?,
        Commands::Fit { display, native } => commands::fit(display, native)?,
        Commands::Settings => commands::settings(config)?,
        Commands::Download { module, models_dir } => {
            commands::download(config, &module, models_dir.as_deref())?
        }
    }
    Ok(())
}
