mod api;
mod app;
mod cli;
mod config;
mod db;
mod entities;
mod error;
mod model;
mod ordering;
mod progress;

use std::io::{self, BufRead, Write};

use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::App;
use crate::cli::Cli;
use crate::config::Config;
use crate::error::AppError;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        debug!(error = %err, "command failed");
        eprintln!("Error: {}", err.public_message());
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_new(config::log_filter())
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = Config::resolve(cli.db, cli.user)?;
    debug!(db = %config.db_path.display(), user = %config.user, "resolved config");

    db::ensure_parent_dir(&config.db_path)?;
    let mut lock = db::open_lock(&config.db_path)?;
    let _guard = lock.write()?;

    let conn = db::connect(&config.db_path).await?;
    db::ensure_schema(&conn).await?;
    let app = App::new(conn, config.user);

    match cli.command.into_request() {
        Some(request) => {
            let data = api::dispatch(&app, request).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        None => serve_stdin(&app).await?,
    }
    Ok(())
}

/// Answers newline-delimited JSON requests until stdin closes. A failed
/// request produces an error line; it does not end the session.
async fn serve_stdin(app: &App) -> Result<(), AppError> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = api::handle_line(app, &line).await;
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }
    Ok(())
}
