use anyhow::Result;
use clap::Parser;

mod cli;

use cli::{Cli, Commands};
use tube_relay::config::{Config, LogFormat, LoggingConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Background start must fork BEFORE the Tokio runtime exists
    #[cfg(unix)]
    if let Commands::Serve { foreground: false } = cli.command {
        return cli::serve::daemonize_and_run(cli.config.as_deref(), cli.verbose);
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    let verbose = cli.verbose;

    match cli.command {
        Commands::Serve { .. } => {
            let config = Config::load(config_path)?;
            init_logging(&config.logging, verbose);
            cli::serve::run_foreground(config).await
        }
        Commands::Stop => {
            init_logging(&LoggingConfig::default(), verbose);
            cli::serve::stop().await
        }
        Commands::Status => {
            init_logging(&LoggingConfig::default(), verbose);
            cli::serve::status(config_path).await
        }
        Commands::Upload(args) => {
            init_logging(&LoggingConfig::default(), verbose);
            cli::upload::run(args, config_path).await
        }
        Commands::Auth(args) => {
            init_logging(&LoggingConfig::default(), verbose);
            cli::auth::run(args, config_path).await
        }
        Commands::Config(args) => {
            init_logging(&LoggingConfig::default(), verbose);
            cli::config::run(args, config_path).await
        }
    }
}

pub(crate) fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
