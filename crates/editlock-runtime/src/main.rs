//! editlock: collaborative document edit-lock client.
//! Drives edit sessions against a lease authority over HTTP, with an
//! optional WebSocket push channel for lock events.

use clap::Parser;

mod cli;
mod cmd_status;
mod console;
mod event_loop;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Logs go to stderr; stdout carries the session dialogue.
    let filter = std::env::var("EDITLOCK_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        cli::Command::Edit(opts) => event_loop::run_edit(opts).await?,
        cli::Command::Status(opts) => cmd_status::cmd_status(opts).await?,
    }
    Ok(())
}
