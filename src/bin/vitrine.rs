use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vitrine::cli::Cli;
use vitrine::config::{BackendType, Config, ConfigError};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Exit status for configuration problems
const CONFIG_ERROR: u8 = 2;

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
  // Explicit path > auto-detect > defaults, then environment, then flags
  let mut config = if let Some(path) = &cli.config {
    Config::from_file(path)?
  } else {
    Config::find_and_load()?.unwrap_or_default()
  };
  config.apply_env();

  if let Some(path) = &cli.sqlite {
    config.database.sqlite.path = path.clone();
    config.database.backend = BackendType::Sqlite;
  }
  if let Some(level) = &cli.log_level {
    config.logging.level = level.clone();
  }

  if cli.command.needs_object_store() {
    config.validate()?;
  } else {
    config.validate_database()?;
  }
  Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();

  let config = match load_config(&cli) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("{} {}", "Configuration error:".red().bold(), e);
      return ExitCode::from(CONFIG_ERROR);
    }
  };

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  match vitrine::cli::run(cli, config).await {
    Ok(code) => code,
    Err(e) => {
      eprintln!("{} {:#}", "Error:".red().bold(), e);
      if e.downcast_ref::<ConfigError>().is_some() {
        ExitCode::from(CONFIG_ERROR)
      } else {
        ExitCode::FAILURE
      }
    }
  }
}
