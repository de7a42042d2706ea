use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use webmention_core::storage::sqlite::SqliteStorage;
use webmention_core::{IncomingProcessor, Parser};

mod controllers;
mod error;
mod services;
mod types;

use crate::controllers::build_router;
use crate::services::Services;
use crate::types::{AppState, Dependencies};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    dotenvy::dotenv().ok();

    let data_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data");
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("create data dir")?;
    let db_path = data_dir.join("webmentions.db");

    let storage = Arc::new(
        SqliteStorage::connect(&db_path)
            .await
            .context("connect sqlite")?,
    );

    let site_base_url = load_site_base_url();
    let parser = Parser::new(site_base_url.clone()).context("build parser")?;
    let incoming = IncomingProcessor::new(parser, storage.clone());

    let deps = Arc::new(Dependencies { incoming, storage });
    let services = Services::new(deps);
    let state = AppState { services };

    let webmention_endpoint = site_base_url
        .map(|base| format!("{}/webmention", base.trim_end_matches('/')))
        .unwrap_or_else(|| "/webmention".to_string());

    let app = build_router(state, webmention_endpoint);

    let addr: SocketAddr = "0.0.0.0:3000".parse().unwrap();
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

fn load_site_base_url() -> Option<String> {
    env::var("SITE_BASE_URL")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
