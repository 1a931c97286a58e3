use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use time::OffsetDateTime;

mod app;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod mail;
mod query;
mod state;
mod tours;
mod users;

use crate::config::AppConfig;
use crate::state::AppState;
use crate::tours::model::TourPayload;

#[derive(Parser)]
#[command(name = "tourbook", about = "Tour booking REST backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Load a JSON array of tours, validated like POST /tours.
    ImportTours { file: PathBuf },
    /// Remove every tour.
    DeleteTours,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tourbook=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let (host, port) = (config.host.clone(), config.port);
    let state = AppState::init(config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => app::serve(app::build_app(state), &host, port).await,
        Command::ImportTours { file } => import_tours(&state, &file).await,
        Command::DeleteTours => {
            let removed = state.tours.delete_all().await?;
            tracing::info!(removed, "tours deleted");
            Ok(())
        }
    }
}

async fn import_tours(state: &AppState, file: &Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("read {}", file.display()))?;
    let payloads: Vec<TourPayload> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", file.display()))?;

    let total = payloads.len();
    for (i, payload) in payloads.into_iter().enumerate() {
        let doc = payload
            .into_new_document(OffsetDateTime::now_utc())
            .map_err(|e| anyhow::anyhow!("tour #{i}: {e}"))?;
        state
            .tours
            .insert(doc)
            .await
            .map_err(|e| anyhow::anyhow!("tour #{i}: {e}"))?;
    }
    tracing::info!(imported = total, "tours imported");
    Ok(())
}
