// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Ingestion worker and DLQ replay.
//!
//! Local mode drives the in-memory queue pair from a JSONL seed file and
//! drains it to completion; exhausted events are written back out as a DLQ
//! JSONL that `replay-dlq` can feed back in.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voy_config::{IngestionConfig, ModelConfig};
use voy_contract::ingestion::IngestionEvent;
use voy_ingest::enrich::LlmEnricher;
use voy_ingest::idempotency::InMemoryIdempotencyStore;
use voy_ingest::kg::LlmGraphExtractor;
use voy_ingest::pipeline::Pipeline;
use voy_ingest::stores::{CypherGraphSink, HttpVectorWriter};
use voy_ingest::subtitles::YtDlpFetcher;
use voy_queue::{replay_dlq, InMemoryQueue, MessageQueue, Worker};

#[derive(Parser, Debug)]
#[command(name = "voy-ingest", version, about = "Voyager ingestion pipeline")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drain a JSONL file of ingestion events through the pipeline.
    Worker {
        /// JSONL file of events to enqueue.
        #[arg(long)]
        events: PathBuf,

        /// Where exhausted events are written (JSONL).
        #[arg(long, default_value = "dlq.jsonl")]
        dlq_out: PathBuf,

        /// Vector store base URL.
        #[arg(long, env = "VECTOR_STORE_URL", default_value = "http://localhost:8080")]
        vector_store_url: String,

        /// Graph store HTTP base URL.
        #[arg(long, env = "GRAPH_STORE_URL", default_value = "http://localhost:7474")]
        graph_store_url: String,

        /// Graph store database name.
        #[arg(long, env = "GRAPH_STORE_DATABASE", default_value = "neo4j")]
        graph_store_database: String,
    },
    /// Move a DLQ JSONL back onto the end of an events JSONL, FIFO.
    ReplayDlq {
        /// DLQ file to drain.
        #[arg(long)]
        dlq: PathBuf,

        /// Events file to append to.
        #[arg(long)]
        out: PathBuf,
    },
}

async fn seed_queue(queue: &dyn MessageQueue, path: &PathBuf) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let mut seeded = 0;
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        // Validate early so malformed seeds are caught before the worker.
        let _: IngestionEvent =
            serde_json::from_str(line).with_context(|| format!("bad event line: {line}"))?;
        queue.send(line.to_string()).await?;
        seeded += 1;
    }
    Ok(seeded)
}

async fn run_worker(
    events: PathBuf,
    dlq_out: PathBuf,
    vector_store_url: String,
    graph_store_url: String,
    graph_store_database: String,
) -> Result<()> {
    let ingestion = IngestionConfig::from_env();
    let models = ModelConfig::from_env();

    let auth = match (std::env::var("NEO4J_USER"), std::env::var("NEO4J_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() && !password.is_empty() => {
            Some((user, password))
        }
        _ => None,
    };

    let pipeline = Pipeline {
        idempotency: Arc::new(InMemoryIdempotencyStore::new()),
        fetcher: Arc::new(YtDlpFetcher::default()),
        enricher: LlmEnricher::from_config(&models)
            .map(|e| Arc::new(e) as Arc<dyn voy_ingest::enrich::Enricher>),
        extractor: LlmGraphExtractor::from_config(&models)
            .map(|e| Arc::new(e) as Arc<dyn voy_ingest::kg::GraphExtractor>),
        vector_writer: Arc::new(HttpVectorWriter::new(vector_store_url)),
        graph_sink: Arc::new(CypherGraphSink::new(
            graph_store_url,
            graph_store_database,
            auth,
        )),
        subtitle_langs: ingestion.subtitle_langs.clone(),
    };

    let input: Arc<InMemoryQueue> = Arc::new(InMemoryQueue::new());
    let dlq: Arc<InMemoryQueue> = Arc::new(InMemoryQueue::new());
    let seeded = seed_queue(input.as_ref(), &events).await?;
    info!(seeded, "events enqueued");

    let worker = Worker::new(input.clone(), dlq.clone(), pipeline);
    let mut processed = 0usize;
    while worker.process_one().await? {
        processed += 1;
    }
    info!(processed, "queue drained");

    let mut dead = Vec::new();
    while let Some(message) = dlq.receive_one().await? {
        dead.push(message.body.clone());
        dlq.acknowledge(&message.handle).await?;
    }
    if dead.is_empty() {
        info!("DLQ empty");
    } else {
        tokio::fs::write(&dlq_out, dead.join("\n") + "\n")
            .await
            .with_context(|| format!("write {}", dlq_out.display()))?;
        info!(count = dead.len(), path = %dlq_out.display(), "DLQ written");
    }
    Ok(())
}

async fn run_replay(dlq_path: PathBuf, out: PathBuf) -> Result<()> {
    let dlq = InMemoryQueue::new();
    let input = InMemoryQueue::new();
    let seeded = seed_queue(&dlq, &dlq_path).await?;
    if seeded == 0 {
        eprintln!("No events in DLQ.");
        return Ok(());
    }
    let moved = replay_dlq(&dlq, &input).await?;

    let mut lines = Vec::new();
    while let Some(message) = input.receive_one().await? {
        lines.push(message.body.clone());
        input.acknowledge(&message.handle).await?;
    }
    let mut existing = tokio::fs::read_to_string(&out).await.unwrap_or_default();
    if !existing.is_empty() && !existing.ends_with('\n') {
        existing.push('\n');
    }
    existing.push_str(&(lines.join("\n") + "\n"));
    tokio::fs::write(&out, existing)
        .await
        .with_context(|| format!("write {}", out.display()))?;
    tokio::fs::write(&dlq_path, "")
        .await
        .with_context(|| format!("truncate {}", dlq_path.display()))?;
    println!("Replayed {moved} event(s) from DLQ to active pipeline.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    match Args::parse().command {
        Command::Worker {
            events,
            dlq_out,
            vector_store_url,
            graph_store_url,
            graph_store_database,
        } => {
            run_worker(
                events,
                dlq_out,
                vector_store_url,
                graph_store_url,
                graph_store_database,
            )
            .await
        }
        Command::ReplayDlq { dlq, out } => run_replay(dlq, out).await,
    }
}
