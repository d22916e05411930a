// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Serve one named retrieval service.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voy_cache::TtlCache;
use voy_config::{CacheTtls, ModelConfig};
use voy_contract::ContractRegistry;
use voy_services::openai::{OpenAiSttModel, OpenAiTtsModel, OpenAiVisionModel};
use voy_services::stores::{GraphStoreClient, VectorStoreClient};
use voy_services::{graph, knowledge, products, stt, tts, vision};
use voy_telemetry::ServiceMetrics;

#[derive(Parser, Debug)]
#[command(name = "voy-services", version, about = "Voyager retrieval services")]
struct Args {
    /// Which service to run: knowledge | products | graph | vision | stt | tts.
    service: String,

    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8010")]
    bind: String,

    /// Vector store base URL (knowledge/products).
    #[arg(long, env = "VECTOR_STORE_URL", default_value = "http://localhost:8080")]
    vector_store_url: String,

    /// Graph store HTTP base URL (graph).
    #[arg(long, env = "GRAPH_STORE_URL", default_value = "http://localhost:7474")]
    graph_store_url: String,

    /// Graph store database name.
    #[arg(long, env = "GRAPH_STORE_DATABASE", default_value = "neo4j")]
    graph_store_database: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let args = Args::parse();
    let ttls = CacheTtls::from_env().context("read cache TTL configuration")?;
    let models = ModelConfig::from_env();
    let registry = Arc::new(ContractRegistry::new());

    let app = match args.service.as_str() {
        "knowledge" => knowledge::router(Arc::new(knowledge::KnowledgeState {
            cache: TtlCache::new(ttls.evidence()),
            metrics: ServiceMetrics::new(),
            registry,
            backend: Arc::new(VectorStoreClient::new(args.vector_store_url.clone())),
        })),
        "products" => products::router(Arc::new(products::ProductsState {
            cache: TtlCache::new(ttls.products()),
            metrics: ServiceMetrics::new(),
            registry,
            backend: Arc::new(VectorStoreClient::new(args.vector_store_url.clone())),
        })),
        "graph" => {
            let auth = match (std::env::var("NEO4J_USER"), std::env::var("NEO4J_PASSWORD")) {
                (Ok(user), Ok(password)) if !user.is_empty() && !password.is_empty() => {
                    Some((user, password))
                }
                _ => None,
            };
            graph::router(Arc::new(graph::GraphState {
                cache: TtlCache::new(ttls.graph()),
                metrics: ServiceMetrics::new(),
                registry,
                backend: Arc::new(GraphStoreClient::new(
                    args.graph_store_url.clone(),
                    args.graph_store_database.clone(),
                    auth,
                )),
            }))
        }
        "vision" => vision::router(Arc::new(vision::VisionState {
            cache: TtlCache::new(ttls.vision()),
            metrics: ServiceMetrics::new(),
            registry,
            model: OpenAiVisionModel::from_config(&models)
                .map(|m| Arc::new(m) as Arc<dyn voy_services::backend::VisionModel>),
        })),
        "stt" => stt::router(Arc::new(stt::SttState {
            metrics: ServiceMetrics::new(),
            registry,
            model: OpenAiSttModel::from_config(&models)
                .map(|m| Arc::new(m) as Arc<dyn voy_services::backend::SttModel>),
            http: reqwest::Client::new(),
        })),
        "tts" => tts::router(Arc::new(tts::TtsState {
            metrics: ServiceMetrics::new(),
            registry,
            model: OpenAiTtsModel::from_config(&models)
                .map(|m| Arc::new(m) as Arc<dyn voy_services::backend::TtsModel>),
            default_voice: models.tts_voice.clone(),
        })),
        other => bail!("unknown service: {other}"),
    };

    let app = app.layer(tower_http::cors::CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(service = %args.service, bind = %args.bind, "service listening");
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}
