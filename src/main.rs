use anyhow::Result;
use boardcast::{
    app,
    cli::{handle_recordings_command, Cli, CliCommand},
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("boardcast {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Recordings(args)) => {
            handle_recordings_command(args)?;
            return Ok(());
        }
        None => {}
    }

    app::run_service().await
}
