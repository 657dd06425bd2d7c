// src/main.rs
mod auth;
mod cli;
mod config;
mod db;
mod error;
mod extract;
mod handlers;
mod models;
mod poll;
mod routes;
mod state;
mod users;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Command};
use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("timed_polls=info,tower_http=debug")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load()?;

    // Create the database connection pool
    let pool = db::create_pool(&config.database_url, config.max_connections)
        .await
        .with_context(|| format!("failed to open database at {}", config.database_url))?;
    db::run_migrations(&pool).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(AppState::new(pool, config)).await,
        admin => cli::run_admin(&pool, admin).await,
    }
}

async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = state
        .config
        .bind_address()
        .parse()
        .context("HOST/PORT do not form a socket address")?;

    let routes = routes::create_routes(state);

    let handle = axum_server::Handle::new();
    tokio::spawn(shutdown_on_ctrl_c(handle.clone()));

    tracing::info!("listening on {addr}");
    axum_server::bind(addr)
        .handle(handle)
        .serve(routes.into_make_service())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_on_ctrl_c(handle: axum_server::Handle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown requested");
        handle.graceful_shutdown(Some(Duration::from_secs(10)));
    }
}
