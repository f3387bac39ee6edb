// SPDX-License-Identifier: Apache-2.0

//! The backend process: REST surface, simulation registry, and one
//! lifecycle actor per live simulation.

use clap::Parser;
use nrp_backend::{build_router, env, sweeper, AppState};
use nrp_storage::HttpStorageClient;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nrp-backend")]
struct Args {
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let storage = Arc::new(HttpStorageClient::new(nrp_core::env::storage_base_url()));
    let state = Arc::new(AppState::new(storage));

    if env::sweep_enabled() {
        tokio::spawn(sweeper::run(state.clone()));
    }

    let app = build_router(state);
    let address = env::listen_address();
    tracing::info!(%address, "starting backend");

    let listener = tokio::net::TcpListener::bind(&address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
