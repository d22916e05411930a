// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! The Voyager agent edge daemon.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voy_agent::edge::{app, EdgeState};
use voy_agent::AgentState;
use voy_client::ServiceClient;
use voy_config::ServiceEndpoints;
use voy_contract::ContractRegistry;
use voy_memory::MemoryStore;
use voy_telemetry::tracer_from_env;

#[derive(Parser, Debug)]
#[command(name = "voy-agent", version, about = "Voyager agent edge")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: String,

    /// Append-only feedback JSONL path.
    #[arg(long, env = "FEEDBACK_PATH", default_value = "data/feedback/events.jsonl")]
    feedback_path: PathBuf,

    /// Enable request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("voy=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    let endpoints = ServiceEndpoints::from_env().context("read service endpoints")?;
    let registry = Arc::new(ContractRegistry::new());
    let state = Arc::new(EdgeState {
        agent: Arc::new(AgentState {
            services: Arc::new(ServiceClient::new(endpoints, registry.clone())),
            memory: MemoryStore::new(),
            tracer: tracer_from_env(),
            registry,
        }),
        feedback_path: args.feedback_path.clone(),
    });

    let router = app(state).layer(tower_http::cors::CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, "agent edge listening");
    axum::serve(listener, router).await.context("serve")?;
    Ok(())
}
