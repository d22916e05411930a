// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stage handlers and dispatch.
//!
//! Each handler is a pure function of the event plus its collaborators,
//! wrapped by the idempotency guard: check `content_source_id|next_stage`
//! first (already processed → completed, not failure), do the work, mark the
//! key, emit the successor. Failures return [`StageOutcome::Failed`] and are
//! retried or dead-lettered by the queue worker.

use crate::chunk::{chunk_segments, Chunk, ChunkParams};
use crate::enrich::{Enricher, ProductCard, ProductInput, RecommendationCard};
use crate::idempotency::{idempotency_key, IdempotencyStore};
use crate::kg::{merge_graph, ChunkContext, GraphExtractor, MergedGraph};
use crate::stores::{
    write_graph, write_products, write_youtube, GraphSink, VectorWriter, YoutubeWriteContext,
};
use crate::subtitles::{Segment, SubtitleFetcher, VideoMetadata};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use voy_contract::ingestion::{IngestionEvent, SourceType, Stage};
use voy_queue::{StageDispatcher, StageOutcome};

/// The pipeline with its collaborators; one instance serves all workers of a
/// process.
pub struct Pipeline {
    /// Idempotency marks.
    pub idempotency: Arc<dyn IdempotencyStore>,
    /// Subtitle tool.
    pub fetcher: Arc<dyn SubtitleFetcher>,
    /// Chunk/product enrichment model, when configured.
    pub enricher: Option<Arc<dyn Enricher>>,
    /// Graph extraction model, when configured.
    pub extractor: Option<Arc<dyn GraphExtractor>>,
    /// Vector store writer.
    pub vector_writer: Arc<dyn VectorWriter>,
    /// Graph store sink.
    pub graph_sink: Arc<dyn GraphSink>,
    /// Subtitle language preference, highest first.
    pub subtitle_langs: Vec<String>,
}

fn payload_str(payload: &Value, key: &str) -> String {
    payload[key].as_str().unwrap_or_default().to_string()
}

fn carry_youtube_context(from: &Value, into: &mut Value) {
    for key in [
        "video_metadata",
        "lang",
        "destination",
        "playlist_url",
        "playlist_name",
        "creator_tier",
    ] {
        if let Some(v) = from.get(key) {
            into[key] = v.clone();
        }
    }
}

impl Pipeline {
    async fn guard(&self, event: &IngestionEvent, next_stage: &str) -> Result<Option<String>, String> {
        let key = idempotency_key(&event.content_source_id, next_stage);
        match self.idempotency.already_processed(&key).await {
            Ok(true) => Ok(None),
            Ok(false) => Ok(Some(key)),
            Err(err) => Err(err.to_string()),
        }
    }

    async fn mark(&self, key: &str) -> Result<(), String> {
        self.idempotency
            .mark_processed(key)
            .await
            .map(|_| ())
            .map_err(|err| err.to_string())
    }

    // -- requested → transcript -----------------------------------------

    async fn handle_fetch(&self, event: &IngestionEvent) -> StageOutcome {
        let key = match self.guard(event, Stage::Transcript.as_str()).await {
            Err(err) => return StageOutcome::Failed(err),
            Ok(None) => return StageOutcome::Completed,
            Ok(Some(key)) => key,
        };

        let payload = match event.source_type() {
            Some(SourceType::Youtube) | Some(SourceType::YoutubeKg) => {
                let video_url = payload_str(&event.payload, "video_url");
                if video_url.is_empty() {
                    return StageOutcome::Failed("missing video_url".into());
                }
                let langs = match event.payload["language_hint"].as_str() {
                    Some(hint) if hint != "auto" => crate::subtitles::lang_preference(hint),
                    _ => self.subtitle_langs.clone(),
                };
                let fetched = match self.fetcher.fetch(&video_url, &langs).await {
                    Ok(fetched) => fetched,
                    Err(err) => return StageOutcome::Failed(err.to_string()),
                };
                let mut payload = json!({
                    "source_type": event.payload["source_type"],
                    "segments": fetched.segments,
                    "lang": fetched.chosen_lang,
                    "video_metadata": fetched.metadata,
                    "destination": payload_str(&event.payload, "destination"),
                    "playlist_url": payload_str(&event.payload, "playlist_url"),
                    "playlist_name": payload_str(&event.payload, "playlist_name"),
                    "creator_tier": payload_str(&event.payload, "creator_tier"),
                });
                // Chunk knobs travel with the event.
                for knob in [
                    "chunk_max_chars",
                    "chunk_min_chars",
                    "chunk_max_duration_s",
                    "chunk_min_duration_s",
                    "gap_split_s",
                ] {
                    if let Some(v) = event.payload.get(knob) {
                        payload[knob] = v.clone();
                    }
                }
                payload
            }
            Some(SourceType::Products) => {
                let products = event.payload["products"].as_array().cloned().unwrap_or_default();
                if products.is_empty() {
                    return StageOutcome::Failed("empty product batch".into());
                }
                json!({"source_type": "products", "products": products})
            }
            None => {
                return StageOutcome::Failed(format!(
                    "missing or unknown source_type: {}",
                    event.payload["source_type"]
                ));
            }
        };

        if let Err(err) = self.mark(&key).await {
            return StageOutcome::Failed(err);
        }
        StageOutcome::Advanced(event.advance(Stage::Transcript, payload))
    }

    // -- transcript → chunks ---------------------------------------------

    async fn handle_transcript(&self, event: &IngestionEvent) -> StageOutcome {
        let key = match self.guard(event, Stage::Chunks.as_str()).await {
            Err(err) => return StageOutcome::Failed(err),
            Ok(None) => return StageOutcome::Completed,
            Ok(Some(key)) => key,
        };

        let payload = match event.source_type() {
            Some(SourceType::Youtube) | Some(SourceType::YoutubeKg) => {
                let segments: Vec<Segment> =
                    match serde_json::from_value(event.payload["segments"].clone()) {
                        Ok(segments) => segments,
                        Err(err) => return StageOutcome::Failed(format!("bad segments: {err}")),
                    };
                let params = ChunkParams::from_payload(&event.payload);
                let chunks = chunk_segments(&segments, params);
                let mut payload = json!({
                    "source_type": event.payload["source_type"],
                    "chunks": chunks,
                });
                carry_youtube_context(&event.payload, &mut payload);
                payload
            }
            Some(SourceType::Products) => json!({
                "source_type": "products",
                "products": event.payload["products"],
            }),
            None => {
                return StageOutcome::Failed(format!(
                    "missing or unknown source_type: {}",
                    event.payload["source_type"]
                ));
            }
        };

        if let Err(err) = self.mark(&key).await {
            return StageOutcome::Failed(err);
        }
        StageOutcome::Advanced(event.advance(Stage::Chunks, payload))
    }

    // -- chunks → enrichment ---------------------------------------------

    async fn handle_chunk(&self, event: &IngestionEvent) -> StageOutcome {
        let key = match self.guard(event, Stage::Enrichment.as_str()).await {
            Err(err) => return StageOutcome::Failed(err),
            Ok(None) => return StageOutcome::Completed,
            Ok(Some(key)) => key,
        };

        let payload = match event.source_type() {
            Some(SourceType::Youtube) => {
                let Some(enricher) = &self.enricher else {
                    return StageOutcome::Failed("enrichment model not configured".into());
                };
                let chunks: Vec<Chunk> =
                    match serde_json::from_value(event.payload["chunks"].clone()) {
                        Ok(chunks) => chunks,
                        Err(err) => return StageOutcome::Failed(format!("bad chunks: {err}")),
                    };
                let destination = payload_str(&event.payload, "destination");
                let lang = payload_str(&event.payload, "lang");
                let mut cards: Vec<RecommendationCard> = Vec::with_capacity(chunks.len());
                for chunk in &chunks {
                    cards.push(enricher.enrich_chunk(&chunk.text, &destination, &lang).await);
                }
                let mut payload = json!({
                    "source_type": "youtube",
                    "cards": cards,
                    "chunks": chunks,
                });
                carry_youtube_context(&event.payload, &mut payload);
                payload
            }
            Some(SourceType::Products) => {
                let Some(enricher) = &self.enricher else {
                    return StageOutcome::Failed("enrichment model not configured".into());
                };
                let products: Vec<ProductInput> =
                    match serde_json::from_value(event.payload["products"].clone()) {
                        Ok(products) => products,
                        Err(err) => return StageOutcome::Failed(format!("bad products: {err}")),
                    };
                let mut cards: Vec<ProductCard> = Vec::with_capacity(products.len());
                for product in &products {
                    cards.push(enricher.enrich_product(product).await);
                }
                json!({
                    "source_type": "products",
                    "cards": cards,
                    "products": products,
                })
            }
            Some(SourceType::YoutubeKg) => {
                let Some(extractor) = &self.extractor else {
                    return StageOutcome::Failed("extraction model not configured".into());
                };
                let chunks: Vec<Chunk> =
                    match serde_json::from_value(event.payload["chunks"].clone()) {
                        Ok(chunks) => chunks,
                        Err(err) => return StageOutcome::Failed(format!("bad chunks: {err}")),
                    };
                let metadata: VideoMetadata =
                    serde_json::from_value(event.payload["video_metadata"].clone())
                        .unwrap_or_default();
                let destination = payload_str(&event.payload, "destination");
                let mut extractions = Vec::with_capacity(chunks.len());
                for (idx, chunk) in chunks.iter().enumerate() {
                    let context = ChunkContext {
                        video_url: metadata.webpage_url.clone(),
                        chunk_idx: idx as u32,
                        start_sec: chunk.start_sec,
                        end_sec: chunk.end_sec,
                        text: chunk.text.clone(),
                        destination_hint: (!destination.is_empty()).then(|| destination.clone()),
                    };
                    extractions.push(extractor.extract(&context).await);
                }
                let graph = merge_graph(&extractions);
                let mut payload = json!({
                    "source_type": "youtube_kg",
                    "graph": graph,
                });
                carry_youtube_context(&event.payload, &mut payload);
                payload
            }
            None => {
                return StageOutcome::Failed(format!(
                    "missing or unknown source_type: {}",
                    event.payload["source_type"]
                ));
            }
        };

        if let Err(err) = self.mark(&key).await {
            return StageOutcome::Failed(err);
        }
        StageOutcome::Advanced(event.advance(Stage::Enrichment, payload))
    }

    // -- enrichment → embeddings -----------------------------------------

    /// Pass-through: the vector store computes embeddings at write time.
    async fn handle_enrich(&self, event: &IngestionEvent) -> StageOutcome {
        let key = match self.guard(event, Stage::Embeddings.as_str()).await {
            Err(err) => return StageOutcome::Failed(err),
            Ok(None) => return StageOutcome::Completed,
            Ok(Some(key)) => key,
        };
        if let Err(err) = self.mark(&key).await {
            return StageOutcome::Failed(err);
        }
        StageOutcome::Advanced(event.advance(Stage::Embeddings, event.payload.clone()))
    }

    // -- embeddings → write_complete -------------------------------------

    async fn handle_embed(&self, event: &IngestionEvent) -> StageOutcome {
        let key = match self.guard(event, Stage::WriteComplete.as_str()).await {
            Err(err) => return StageOutcome::Failed(err),
            Ok(None) => return StageOutcome::Completed,
            Ok(Some(key)) => key,
        };
        if let Err(err) = self.mark(&key).await {
            return StageOutcome::Failed(err);
        }
        StageOutcome::Advanced(event.advance(Stage::WriteComplete, event.payload.clone()))
    }

    // -- write_complete (terminal) ---------------------------------------

    async fn handle_write(&self, event: &IngestionEvent) -> StageOutcome {
        let key = match self.guard(event, "write").await {
            Err(err) => return StageOutcome::Failed(err),
            Ok(None) => return StageOutcome::Completed,
            Ok(Some(key)) => key,
        };

        let result = match event.source_type() {
            Some(SourceType::Youtube) => {
                let metadata: VideoMetadata =
                    serde_json::from_value(event.payload["video_metadata"].clone())
                        .unwrap_or_default();
                let chunks: Vec<Chunk> =
                    serde_json::from_value(event.payload["chunks"].clone()).unwrap_or_default();
                let cards: Vec<RecommendationCard> =
                    match serde_json::from_value(event.payload["cards"].clone()) {
                        Ok(cards) => cards,
                        Err(err) => return StageOutcome::Failed(format!("bad cards: {err}")),
                    };
                let context = YoutubeWriteContext {
                    destination: payload_str(&event.payload, "destination"),
                    playlist_url: payload_str(&event.payload, "playlist_url"),
                    playlist_name: payload_str(&event.payload, "playlist_name"),
                    creator_tier: payload_str(&event.payload, "creator_tier"),
                    lang: payload_str(&event.payload, "lang"),
                };
                write_youtube(
                    self.vector_writer.as_ref(),
                    &metadata,
                    &chunks,
                    &cards,
                    &context,
                )
                .await
            }
            Some(SourceType::Products) => {
                let products: Vec<ProductInput> =
                    match serde_json::from_value(event.payload["products"].clone()) {
                        Ok(products) => products,
                        Err(err) => return StageOutcome::Failed(format!("bad products: {err}")),
                    };
                let cards: Vec<ProductCard> =
                    match serde_json::from_value(event.payload["cards"].clone()) {
                        Ok(cards) => cards,
                        Err(err) => return StageOutcome::Failed(format!("bad cards: {err}")),
                    };
                write_products(self.vector_writer.as_ref(), &products, &cards).await
            }
            Some(SourceType::YoutubeKg) => {
                let graph: MergedGraph =
                    match serde_json::from_value(event.payload["graph"].clone()) {
                        Ok(graph) => graph,
                        Err(err) => return StageOutcome::Failed(format!("bad graph: {err}")),
                    };
                write_graph(self.graph_sink.as_ref(), &graph).await
            }
            None => {
                return StageOutcome::Failed(format!(
                    "missing or unknown source_type: {}",
                    event.payload["source_type"]
                ));
            }
        };

        if let Err(err) = result {
            return StageOutcome::Failed(err.to_string());
        }
        if let Err(err) = self.mark(&key).await {
            return StageOutcome::Failed(err);
        }
        StageOutcome::Completed
    }
}

#[async_trait]
impl StageDispatcher for Pipeline {
    async fn dispatch(&self, event: &IngestionEvent) -> StageOutcome {
        match event.stage {
            Stage::Requested => self.handle_fetch(event).await,
            Stage::Transcript => self.handle_transcript(event).await,
            Stage::Chunks => self.handle_chunk(event).await,
            Stage::Enrichment => self.handle_enrich(event).await,
            Stage::Embeddings => self.handle_embed(event).await,
            Stage::WriteComplete => self.handle_write(event).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{fallback_card, fallback_product_card};
    use crate::idempotency::InMemoryIdempotencyStore;
    use crate::kg::GraphExtraction;
    use crate::stores::{RecordingGraphSink, RecordingVectorWriter};
    use crate::subtitles::FetchedTranscript;
    use voy_contract::graph::{EdgeEvidence, GraphEdge, GraphNode};
    use voy_error::VoyError;

    struct FakeFetcher {
        fail: bool,
    }

    #[async_trait]
    impl SubtitleFetcher for FakeFetcher {
        async fn fetch(
            &self,
            video_url: &str,
            lang_preference: &[String],
        ) -> Result<FetchedTranscript, VoyError> {
            if self.fail {
                return Err(VoyError::upstream("no subtitles"));
            }
            assert!(!lang_preference.is_empty());
            Ok(FetchedTranscript {
                segments: vec![
                    Segment {
                        start: 0.0,
                        duration: 4.0,
                        text: "dicas para evitar filas no magic kingdom".into(),
                    },
                    Segment {
                        start: 4.0,
                        duration: 4.0,
                        text: "chegue cedo aos parques".into(),
                    },
                ],
                chosen_lang: "pt".into(),
                metadata: VideoMetadata {
                    id: "abc12345678".into(),
                    title: "Orlando".into(),
                    channel: "Canal".into(),
                    upload_date: None,
                    webpage_url: video_url.to_string(),
                },
            })
        }
    }

    struct FakeEnricher;

    #[async_trait]
    impl Enricher for FakeEnricher {
        async fn enrich_chunk(
            &self,
            chunk_text: &str,
            _destination: &str,
            _lang: &str,
        ) -> RecommendationCard {
            fallback_card(chunk_text)
        }

        async fn enrich_product(&self, input: &ProductInput) -> ProductCard {
            fallback_product_card(input)
        }
    }

    struct FakeExtractor;

    #[async_trait]
    impl GraphExtractor for FakeExtractor {
        async fn extract(&self, context: &ChunkContext) -> GraphExtraction {
            GraphExtraction {
                nodes: vec![GraphNode {
                    id: "poi:magic_kingdom".into(),
                    node_type: "poi".into(),
                    name: "Magic Kingdom".into(),
                    aliases: vec![],
                    properties: Default::default(),
                }],
                edges: vec![GraphEdge {
                    source: "dayplan:d1".into(),
                    edge_type: "INCLUDES_POI".into(),
                    target: "poi:magic_kingdom".into(),
                    properties: Default::default(),
                    evidence: EdgeEvidence {
                        video_url: context.video_url.clone(),
                        timestamp_url: crate::ids::timestamp_url(
                            &context.video_url,
                            context.start_sec,
                        ),
                        start_sec: context.start_sec,
                        end_sec: context.end_sec,
                        chunk_idx: Some(context.chunk_idx),
                    },
                }],
            }
        }
    }

    struct Fixture {
        pipeline: Pipeline,
        idempotency: Arc<InMemoryIdempotencyStore>,
        vector_writer: Arc<RecordingVectorWriter>,
        graph_sink: Arc<RecordingGraphSink>,
    }

    fn fixture(fetch_fails: bool) -> Fixture {
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let vector_writer = Arc::new(RecordingVectorWriter::new());
        let graph_sink = Arc::new(RecordingGraphSink::new());
        let pipeline = Pipeline {
            idempotency: idempotency.clone(),
            fetcher: Arc::new(FakeFetcher { fail: fetch_fails }),
            enricher: Some(Arc::new(FakeEnricher)),
            extractor: Some(Arc::new(FakeExtractor)),
            vector_writer: vector_writer.clone(),
            graph_sink: graph_sink.clone(),
            subtitle_langs: vec!["pt".into(), "en".into()],
        };
        Fixture {
            pipeline,
            idempotency,
            vector_writer,
            graph_sink,
        }
    }

    fn youtube_event() -> IngestionEvent {
        IngestionEvent::requested(
            "youtube:abc12345678",
            json!({
                "source_type": "youtube",
                "video_url": "https://www.youtube.com/watch?v=abc12345678",
                "destination": "Orlando",
            }),
        )
    }

    async fn run_to_completion(pipeline: &Pipeline, mut event: IngestionEvent) -> u32 {
        let mut writes = 0;
        loop {
            match pipeline.dispatch(&event).await {
                StageOutcome::Advanced(next) => event = next,
                StageOutcome::Completed => {
                    writes += 1;
                    return writes;
                }
                StageOutcome::Failed(reason) => panic!("stage failed: {reason}"),
            }
        }
    }

    #[tokio::test]
    async fn youtube_pipeline_runs_end_to_end() {
        let f = fixture(false);
        run_to_completion(&f.pipeline, youtube_event()).await;

        let inserts = f.vector_writer.inserts();
        assert_eq!(inserts[0].0, "Video");
        assert!(inserts.len() >= 2);
        assert!(inserts[1..].iter().all(|(class, _, _)| class == "RecommendationCard"));
        assert_eq!(inserts[1].2["destination"], "Orlando");
    }

    #[tokio::test]
    async fn duplicate_delivery_is_suppressed_not_failed() {
        let f = fixture(false);
        let event = youtube_event();
        let first = f.pipeline.dispatch(&event).await;
        assert!(matches!(first, StageOutcome::Advanced(_)));
        let second = f.pipeline.dispatch(&event).await;
        assert_eq!(second, StageOutcome::Completed);
    }

    #[tokio::test]
    async fn duplicate_write_does_not_duplicate_inserts() {
        let f = fixture(false);
        let mut event = youtube_event();
        let write_event = loop {
            match f.pipeline.dispatch(&event).await {
                StageOutcome::Advanced(next) if next.stage == Stage::WriteComplete => break next,
                StageOutcome::Advanced(next) => event = next,
                other => panic!("unexpected outcome: {other:?}"),
            }
        };

        assert_eq!(f.pipeline.dispatch(&write_event).await, StageOutcome::Completed);
        let count = f.vector_writer.insert_count();
        // Redelivery of the terminal event: guard suppresses, no new writes.
        assert_eq!(f.pipeline.dispatch(&write_event).await, StageOutcome::Completed);
        assert_eq!(f.vector_writer.insert_count(), count);
    }

    #[tokio::test]
    async fn fetch_failure_is_failed_and_leaves_no_mark() {
        let f = fixture(true);
        let outcome = f.pipeline.dispatch(&youtube_event()).await;
        assert!(matches!(outcome, StageOutcome::Failed(_)));
        assert!(!f
            .idempotency
            .already_processed(&idempotency_key("youtube:abc12345678", "transcript"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_source_type_fails_routing_stages() {
        // The enrichment/embeddings handlers are pure pass-throughs; every
        // stage that routes by source_type must reject an untyped event.
        let f = fixture(false);
        for stage in [Stage::Requested, Stage::Transcript, Stage::Chunks, Stage::WriteComplete] {
            let mut event = IngestionEvent::requested("untyped:x", json!({}));
            event.stage = stage;
            assert!(
                matches!(f.pipeline.dispatch(&event).await, StageOutcome::Failed(_)),
                "stage {stage} accepted an event without source_type"
            );
        }
        assert_eq!(f.vector_writer.insert_count(), 0);
    }

    #[tokio::test]
    async fn unknown_source_type_fails() {
        let f = fixture(false);
        let event = IngestionEvent::requested("rss:x", json!({"source_type": "rss"}));
        assert!(matches!(
            f.pipeline.dispatch(&event).await,
            StageOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn empty_product_batch_fails() {
        let f = fixture(false);
        let event = IngestionEvent::requested(
            "products:empty",
            json!({"source_type": "products", "products": []}),
        );
        assert!(matches!(
            f.pipeline.dispatch(&event).await,
            StageOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn products_pipeline_writes_product_and_card() {
        let f = fixture(false);
        let event = IngestionEvent::requested(
            "products:batch1",
            json!({
                "source_type": "products",
                "products": [{
                    "question": "qual seguro comprar?",
                    "opportunity": "seguro viagem com cobertura completa",
                    "link": "https://shop.example/seguro",
                }],
            }),
        );
        run_to_completion(&f.pipeline, event).await;

        let classes: Vec<String> = f
            .vector_writer
            .inserts()
            .into_iter()
            .map(|(class, _, _)| class)
            .collect();
        assert_eq!(classes, vec!["Product", "ProductCard"]);
    }

    #[tokio::test]
    async fn youtube_kg_pipeline_writes_merged_graph() {
        let f = fixture(false);
        let event = IngestionEvent::requested(
            "youtube_kg:abc12345678",
            json!({
                "source_type": "youtube_kg",
                "video_url": "https://www.youtube.com/watch?v=abc12345678",
                "destination": "Orlando",
            }),
        );
        run_to_completion(&f.pipeline, event).await;

        let nodes = f.graph_sink.nodes();
        // Both chunks extracted the same node; the merge deduplicated it.
        assert_eq!(nodes, vec![("poi:magic_kingdom".to_string(), "poi".to_string())]);
        assert!(!f.graph_sink.edges().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_through_the_fetcher_seam() {
        let f = fixture(true);
        let outcome = f.pipeline.dispatch(&youtube_event()).await;
        match outcome {
            StageOutcome::Failed(reason) => assert!(reason.contains("UPSTREAM_UNAVAILABLE")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_enricher_fails_enrich_stage() {
        let mut f = fixture(false);
        f.pipeline.enricher = None;
        let event = IngestionEvent::requested("youtube:v2", json!({
            "source_type": "youtube",
            "video_url": "https://www.youtube.com/watch?v=v2",
        }));
        let transcript = match f.pipeline.dispatch(&event).await {
            StageOutcome::Advanced(next) => next,
            other => panic!("unexpected: {other:?}"),
        };
        let chunks = match f.pipeline.dispatch(&transcript).await {
            StageOutcome::Advanced(next) => next,
            other => panic!("unexpected: {other:?}"),
        };
        assert!(matches!(
            f.pipeline.dispatch(&chunks).await,
            StageOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn stage_events_carry_retry_bookkeeping() {
        let f = fixture(false);
        let mut event = youtube_event();
        event.retry_count = 1;
        event.max_retries = 5;
        match f.pipeline.dispatch(&event).await {
            StageOutcome::Advanced(next) => {
                assert_eq!(next.retry_count, 1);
                assert_eq!(next.max_retries, 5);
                assert_eq!(next.stage, Stage::Transcript);
                assert_eq!(next.content_source_id, "youtube:abc12345678");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
