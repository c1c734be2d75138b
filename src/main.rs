//! vidjot - Video journal uploads with live AI processing progress
//!
//! Entry point for the vidjot CLI application.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vidjot::cli::commands;
use vidjot::cli::{Cli, Commands};
use vidjot::config::Settings;
use vidjot::VidjotError;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        vidjot::cli::completions::print(shell);
        return Ok(ExitCode::SUCCESS);
    }

    // Load configuration only for runtime commands.
    let settings = Settings::load()?;

    // Initialize logging
    let default_level = if cli.verbose {
        "debug"
    } else {
        settings.general.log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(cli.command, &settings).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) if needs_login(&err) => {
            eprintln!("Error: {:#}", err);
            eprintln!("Run `vidjot login` to sign in.");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err),
    }
}

async fn run(command: Commands, settings: &Settings) -> Result<()> {
    match command {
        Commands::Login { password } => commands::login(settings, password).await?,
        Commands::Logout => commands::logout(settings)?,
        Commands::Upload { file, watch } => commands::upload_video(settings, &file, watch).await?,
        Commands::List { status, tag, limit } => {
            commands::list_videos(settings, status.map(Into::into), tag, limit).await?;
        }
        Commands::View { id } => commands::view_video(settings, &id).await?,
        Commands::Process { id, watch } => commands::process_video(settings, &id, watch).await?,
        Commands::Watch { id, poll } => commands::watch_video(settings, &id, poll).await?,
        Commands::Delete { id } => commands::delete_video(settings, &id).await?,
        Commands::Tags => commands::list_tags(settings).await?,
        Commands::Doctor { json } => commands::run_doctor(settings, json).await?,
        Commands::Config(config_cmd) => commands::config_command(settings, config_cmd)?,
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}

/// Whether the failure means the stored credential is missing or was rejected
fn needs_login(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<VidjotError>(), Some(e) if e.is_auth()))
}
