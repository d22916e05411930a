// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store writers for the write stage.
//!
//! The vector store carries `Video`, `RecommendationCard`, `Product`, and
//! `ProductCard` classes; the graph store carries `Entity` nodes and `REL`
//! edges whose `evidence` field stores the JSON string of the contract
//! evidence. All writes address objects by deterministic UUIDs, so
//! re-running an upsert with the same key is a no-op.

use crate::enrich::{merchant_from_link, ProductCard, ProductInput, RecommendationCard};
use crate::ids::{card_uuid, product_card_uuid, product_uuid, timestamp_url, video_uuid};
use crate::kg::MergedGraph;
use crate::subtitles::VideoMetadata;
use crate::chunk::Chunk;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;
use voy_error::{ErrorKind, VoyError};

// ---------------------------------------------------------------------------
// VectorWriter
// ---------------------------------------------------------------------------

/// Object writes against the vector store.
#[async_trait]
pub trait VectorWriter: Send + Sync {
    /// Whether an object of `class` with this id exists.
    async fn exists(&self, class: &str, id: Uuid) -> Result<bool, VoyError>;

    /// Insert an object; `reference` is `(property_name, target_id)`.
    async fn insert(
        &self,
        class: &str,
        id: Uuid,
        properties: Value,
        reference: Option<(&str, Uuid)>,
    ) -> Result<(), VoyError>;
}

/// Vector writer over a Weaviate-style `/v1/objects` REST surface.
pub struct HttpVectorWriter {
    http: reqwest::Client,
    base_url: String,
}

impl HttpVectorWriter {
    /// New writer for the store at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl VectorWriter for HttpVectorWriter {
    async fn exists(&self, class: &str, id: Uuid) -> Result<bool, VoyError> {
        let url = format!(
            "{}/v1/objects/{class}/{id}",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| VoyError::new(ErrorKind::StoreFailure, err.to_string()))?;
        Ok(response.status().is_success())
    }

    async fn insert(
        &self,
        class: &str,
        id: Uuid,
        mut properties: Value,
        reference: Option<(&str, Uuid)>,
    ) -> Result<(), VoyError> {
        if let Some((property, target)) = reference {
            properties[property] = json!([{"beacon": format!("weaviate://localhost/{target}")}]);
        }
        let body = json!({"class": class, "id": id.to_string(), "properties": properties});
        let response = self
            .http
            .post(format!("{}/v1/objects", self.base_url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|err| VoyError::new(ErrorKind::StoreFailure, err.to_string()))?;
        if !response.status().is_success() {
            return Err(VoyError::new(
                ErrorKind::StoreFailure,
                format!("object insert returned status {}", response.status()),
            ));
        }
        Ok(())
    }
}

/// In-memory writer recording every insert; the test double.
#[derive(Debug, Default)]
pub struct RecordingVectorWriter {
    inner: Mutex<RecordingInner>,
}

#[derive(Debug, Default)]
struct RecordingInner {
    existing: HashSet<(String, Uuid)>,
    inserts: Vec<(String, Uuid, Value)>,
}

impl RecordingVectorWriter {
    /// New empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded inserts as `(class, id, properties)`.
    pub fn inserts(&self) -> Vec<(String, Uuid, Value)> {
        self.inner.lock().expect("store lock poisoned").inserts.clone()
    }

    /// Number of recorded inserts.
    pub fn insert_count(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").inserts.len()
    }
}

#[async_trait]
impl VectorWriter for RecordingVectorWriter {
    async fn exists(&self, class: &str, id: Uuid) -> Result<bool, VoyError> {
        Ok(self
            .inner
            .lock()
            .expect("store lock poisoned")
            .existing
            .contains(&(class.to_string(), id)))
    }

    async fn insert(
        &self,
        class: &str,
        id: Uuid,
        properties: Value,
        _reference: Option<(&str, Uuid)>,
    ) -> Result<(), VoyError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.existing.insert((class.to_string(), id));
        inner.inserts.push((class.to_string(), id, properties));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GraphSink
// ---------------------------------------------------------------------------

/// Node/edge writes against the graph store.
#[async_trait]
pub trait GraphSink: Send + Sync {
    /// `MERGE` an `Entity` node by id.
    async fn merge_node(
        &self,
        id: &str,
        node_type: &str,
        name: &str,
        aliases: &[String],
        properties: &Value,
    ) -> Result<(), VoyError>;

    /// `MERGE` a `REL` edge by its full key; `evidence_json` is stored as a
    /// string property.
    async fn merge_edge(
        &self,
        key: &str,
        source: &str,
        target: &str,
        edge_type: &str,
        evidence_json: &str,
    ) -> Result<(), VoyError>;
}

/// Graph sink speaking Cypher over HTTP.
pub struct CypherGraphSink {
    http: reqwest::Client,
    base_url: String,
    database: String,
    auth: Option<(String, String)>,
}

impl CypherGraphSink {
    /// New sink; `auth` is `(user, password)` when required.
    pub fn new(
        base_url: impl Into<String>,
        database: impl Into<String>,
        auth: Option<(String, String)>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            database: database.into(),
            auth,
        }
    }

    async fn run(&self, statement: &str, parameters: Value) -> Result<(), VoyError> {
        let url = format!(
            "{}/db/{}/tx/commit",
            self.base_url.trim_end_matches('/'),
            self.database
        );
        let mut builder = self.http.post(&url).json(&json!({
            "statements": [{"statement": statement, "parameters": parameters}],
        }));
        if let Some((user, password)) = &self.auth {
            builder = builder.basic_auth(user, Some(password));
        }
        let response = builder
            .send()
            .await
            .map_err(|err| VoyError::new(ErrorKind::StoreFailure, err.to_string()))?;
        if !response.status().is_success() {
            return Err(VoyError::new(
                ErrorKind::StoreFailure,
                format!("graph write returned status {}", response.status()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphSink for CypherGraphSink {
    async fn merge_node(
        &self,
        id: &str,
        node_type: &str,
        name: &str,
        aliases: &[String],
        properties: &Value,
    ) -> Result<(), VoyError> {
        self.run(
            "MERGE (x:Entity {id: $id}) \
             SET x.type = $type, x.name = $name, x.aliases = $aliases, x += $properties",
            json!({
                "id": id,
                "type": node_type,
                "name": name,
                "aliases": aliases,
                "properties": properties,
            }),
        )
        .await
    }

    async fn merge_edge(
        &self,
        key: &str,
        source: &str,
        target: &str,
        edge_type: &str,
        evidence_json: &str,
    ) -> Result<(), VoyError> {
        self.run(
            "MATCH (a:Entity {id: $source}), (b:Entity {id: $target}) \
             MERGE (a)-[r:REL {key: $key}]->(b) \
             SET r.type = $etype, r.evidence = $evidence",
            json!({
                "key": key,
                "source": source,
                "target": target,
                "etype": edge_type,
                "evidence": evidence_json,
            }),
        )
        .await
    }
}

/// In-memory graph sink recording merges; the test double.
#[derive(Debug, Default)]
pub struct RecordingGraphSink {
    nodes: Mutex<Vec<(String, String)>>,
    edges: Mutex<Vec<(String, String)>>,
}

impl RecordingGraphSink {
    /// New empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(id, type)` node merges.
    pub fn nodes(&self) -> Vec<(String, String)> {
        self.nodes.lock().expect("sink lock poisoned").clone()
    }

    /// Recorded `(key, evidence_json)` edge merges.
    pub fn edges(&self) -> Vec<(String, String)> {
        self.edges.lock().expect("sink lock poisoned").clone()
    }
}

#[async_trait]
impl GraphSink for RecordingGraphSink {
    async fn merge_node(
        &self,
        id: &str,
        node_type: &str,
        _name: &str,
        _aliases: &[String],
        _properties: &Value,
    ) -> Result<(), VoyError> {
        self.nodes
            .lock()
            .expect("sink lock poisoned")
            .push((id.to_string(), node_type.to_string()));
        Ok(())
    }

    async fn merge_edge(
        &self,
        key: &str,
        _source: &str,
        _target: &str,
        _edge_type: &str,
        evidence_json: &str,
    ) -> Result<(), VoyError> {
        self.edges
            .lock()
            .expect("sink lock poisoned")
            .push((key.to_string(), evidence_json.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Write operations
// ---------------------------------------------------------------------------

/// Context fields carried alongside a video write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YoutubeWriteContext {
    /// Destination the video covers.
    pub destination: String,
    /// Playlist URL, when ingested from one.
    pub playlist_url: String,
    /// Playlist name.
    pub playlist_name: String,
    /// Creator tier label.
    pub creator_tier: String,
    /// Subtitle language that was ingested.
    pub lang: String,
}

/// Upsert the video and insert its non-duplicate recommendation cards.
pub async fn write_youtube(
    store: &dyn VectorWriter,
    metadata: &VideoMetadata,
    chunks: &[Chunk],
    cards: &[RecommendationCard],
    context: &YoutubeWriteContext,
) -> Result<(), VoyError> {
    let vid = video_uuid(&metadata.webpage_url);
    if !store.exists("Video", vid).await? {
        let mut properties = json!({
            "videoId": metadata.id,
            "videoUrl": metadata.webpage_url,
            "title": metadata.title,
            "channel": metadata.channel,
            "lang": context.lang,
            "playlistUrl": context.playlist_url,
            "playlistName": context.playlist_name,
            "creatorTier": context.creator_tier,
        });
        if let Some(upload_date) = &metadata.upload_date {
            properties["uploadDate"] = json!(upload_date);
        }
        store.insert("Video", vid, properties, None).await?;
    }

    for (chunk, card) in chunks.iter().zip(cards.iter()) {
        let id = card_uuid(vid, chunk.start_sec, chunk.end_sec, &chunk.text);
        if store.exists("RecommendationCard", id).await? {
            continue;
        }
        let mut properties = json!({
            "summary": card.summary,
            "text": chunk.text,
            "startSec": chunk.start_sec as f64,
            "endSec": chunk.end_sec as f64,
            "timestampUrl": timestamp_url(&metadata.webpage_url, chunk.start_sec),
            "lang": context.lang,
            "destination": context.destination,
            "categories": card.categories,
            "primaryCategory": card.primary_category,
            "places": card.places,
            "signals": card.signals,
            "confidence": card.confidence,
            "rationale": card.rationale.clone().unwrap_or_default(),
        });
        if let Some(upload_date) = &metadata.upload_date {
            properties["videoUploadDate"] = json!(upload_date);
        }
        store
            .insert("RecommendationCard", id, properties, Some(("fromVideo", vid)))
            .await?;
    }
    Ok(())
}

/// Upsert products and insert their non-duplicate product cards.
pub async fn write_products(
    store: &dyn VectorWriter,
    products: &[ProductInput],
    cards: &[ProductCard],
) -> Result<(), VoyError> {
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    for (product, card) in products.iter().zip(cards.iter()) {
        let pid = product_uuid(&product.link, &product.question);
        if !store.exists("Product", pid).await? {
            store
                .insert(
                    "Product",
                    pid,
                    json!({
                        "question": product.question,
                        "opportunity": product.opportunity,
                        "link": product.link,
                        "destination": product.destination,
                        "lang": product.lang,
                        "market": product.market,
                        "merchant": merchant_from_link(&product.link),
                        "createdAt": now,
                    }),
                    None,
                )
                .await?;
        }

        let cid = product_card_uuid(pid, &product.question, &product.opportunity);
        if store.exists("ProductCard", cid).await? {
            continue;
        }
        store
            .insert(
                "ProductCard",
                cid,
                json!({
                    "summary": card.summary,
                    "question": product.question,
                    "opportunity": product.opportunity,
                    "link": product.link,
                    "merchant": merchant_from_link(&product.link),
                    "lang": product.lang,
                    "market": product.market,
                    "destination": product.destination,
                    "primaryCategory": card.primary_category,
                    "categories": card.categories,
                    "triggers": card.triggers,
                    "constraints": card.constraints,
                    "affiliatePriority": card.affiliate_priority,
                    "userValue": card.user_value,
                    "confidence": card.confidence,
                    "rationale": card.rationale.clone().unwrap_or_default(),
                    "createdAt": now,
                }),
                Some(("fromProduct", pid)),
            )
            .await?;
    }
    Ok(())
}

/// Persist a merged knowledge graph.
pub async fn write_graph(sink: &dyn GraphSink, graph: &MergedGraph) -> Result<(), VoyError> {
    for node in &graph.nodes {
        let properties = serde_json::to_value(&node.properties)
            .map_err(|err| VoyError::new(ErrorKind::StoreFailure, err.to_string()))?;
        sink.merge_node(&node.id, &node.node_type, &node.name, &node.aliases, &properties)
            .await?;
    }
    for edge in &graph.edges {
        let key = format!(
            "{}|{}|{}|{}|{}",
            edge.edge_type,
            edge.source,
            edge.target,
            edge.evidence.start_sec,
            edge.evidence.end_sec
        );
        let evidence_json = serde_json::to_string(&edge.evidence)
            .map_err(|err| VoyError::new(ErrorKind::StoreFailure, err.to_string()))?;
        sink.merge_edge(&key, &edge.source, &edge.target, &edge.edge_type, &evidence_json)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::fallback_card;
    use crate::kg::{GraphExtraction, merge_graph};
    use voy_contract::graph::{EdgeEvidence, GraphEdge, GraphNode};

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            id: "abc12345678".into(),
            title: "Orlando em 3 dias".into(),
            channel: "Canal Viagem".into(),
            upload_date: Some("2024-06-01T00:00:00Z".into()),
            webpage_url: "https://www.youtube.com/watch?v=abc12345678".into(),
        }
    }

    fn chunk(start: u32, end: u32, text: &str) -> Chunk {
        Chunk {
            start_sec: start,
            end_sec: end,
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn youtube_write_inserts_video_and_cards() {
        let store = RecordingVectorWriter::new();
        let chunks = vec![chunk(0, 30, "dicas sobre filas"), chunk(30, 60, "dicas de comida")];
        let cards = vec![
            fallback_card("dicas sobre filas"),
            fallback_card("dicas de comida"),
        ];
        write_youtube(
            &store,
            &metadata(),
            &chunks,
            &cards,
            &YoutubeWriteContext {
                destination: "Orlando".into(),
                lang: "pt".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let inserts = store.inserts();
        assert_eq!(inserts.len(), 3);
        assert_eq!(inserts[0].0, "Video");
        assert_eq!(inserts[1].0, "RecommendationCard");
        assert_eq!(
            inserts[1].2["timestampUrl"],
            "https://www.youtube.com/watch?v=abc12345678&t=0s"
        );
        assert_eq!(inserts[1].2["destination"], "Orlando");
        assert_eq!(inserts[1].2["videoUploadDate"], "2024-06-01T00:00:00Z");
    }

    #[tokio::test]
    async fn youtube_rewrite_is_noop() {
        let store = RecordingVectorWriter::new();
        let chunks = vec![chunk(0, 30, "dicas sobre filas")];
        let cards = vec![fallback_card("dicas sobre filas")];
        let context = YoutubeWriteContext {
            lang: "pt".into(),
            ..Default::default()
        };
        write_youtube(&store, &metadata(), &chunks, &cards, &context)
            .await
            .unwrap();
        write_youtube(&store, &metadata(), &chunks, &cards, &context)
            .await
            .unwrap();
        assert_eq!(store.insert_count(), 2);
    }

    #[tokio::test]
    async fn product_write_upserts_and_dedupes() {
        let store = RecordingVectorWriter::new();
        let products = vec![ProductInput {
            question: "qual seguro comprar?".into(),
            opportunity: "seguro viagem com cobertura completa".into(),
            link: "https://shop.example/seguro".into(),
            destination: "Orlando".into(),
            lang: "pt".into(),
            market: "BR".into(),
        }];
        let cards = vec![crate::enrich::fallback_product_card(&products[0])];

        write_products(&store, &products, &cards).await.unwrap();
        write_products(&store, &products, &cards).await.unwrap();

        let inserts = store.inserts();
        assert_eq!(inserts.len(), 2);
        assert_eq!(inserts[0].0, "Product");
        assert_eq!(inserts[0].2["merchant"], "shop.example");
        assert_eq!(inserts[1].0, "ProductCard");
    }

    #[tokio::test]
    async fn graph_write_stores_evidence_as_json_string() {
        let sink = RecordingGraphSink::new();
        let graph = merge_graph(&[GraphExtraction {
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
                    video_url: "https://youtube.com/watch?v=x".into(),
                    timestamp_url: "https://youtube.com/watch?v=x&t=120s".into(),
                    start_sec: 120,
                    end_sec: 180,
                    chunk_idx: Some(3),
                },
            }],
        }]);
        write_graph(&sink, &graph).await.unwrap();

        assert_eq!(sink.nodes(), vec![("poi:magic_kingdom".to_string(), "poi".to_string())]);
        let edges = sink.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].0, "INCLUDES_POI|dayplan:d1|poi:magic_kingdom|120|180");
        let evidence: serde_json::Value = serde_json::from_str(&edges[0].1).unwrap();
        assert_eq!(evidence["timestampUrl"], "https://youtube.com/watch?v=x&t=120s");
    }
}
