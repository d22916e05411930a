// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP store backends: near-text GraphQL queries against the vector store
//! and Cypher-over-HTTP against the graph store.
//!
//! Both speak plain REST so the services carry no driver dependency; every
//! failure surfaces as `UpstreamUnavailable` and the calling service falls
//! back per its own policy.

use crate::backend::{
    EvidenceBackend, GraphBackend, ProductBackend, RawEdge, RawNode, StoreRow,
};
use async_trait::async_trait;
use serde_json::json;
use voy_error::VoyError;

// ---------------------------------------------------------------------------
// Vector store (Weaviate-style GraphQL)
// ---------------------------------------------------------------------------

/// Near-text retrieval against a Weaviate-style `/v1/graphql` endpoint.
pub struct VectorStoreClient {
    http: reqwest::Client,
    base_url: String,
}

impl VectorStoreClient {
    /// New client for the store at `base_url` (e.g. `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn near_text(
        &self,
        class: &str,
        fields: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoreRow>, VoyError> {
        let graphql = format!(
            "{{ Get {{ {class}(nearText: {{concepts: [{}]}}, limit: {limit}) \
             {{ {fields} _additional {{ id distance }} }} }} }}",
            serde_json::Value::String(query.to_string()),
        );
        let response = self
            .http
            .post(format!("{}/v1/graphql", self.base_url.trim_end_matches('/')))
            .json(&json!({"query": graphql}))
            .send()
            .await
            .map_err(|err| VoyError::upstream(format!("vector store unreachable: {err}")))?;
        if !response.status().is_success() {
            return Err(VoyError::upstream(format!(
                "vector store returned status {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| VoyError::parse(format!("vector store returned non-JSON: {err}")))?;

        let objects = body["data"]["Get"][class]
            .as_array()
            .cloned()
            .unwrap_or_default();
        Ok(objects
            .into_iter()
            .filter_map(|mut obj| {
                let additional = obj.as_object_mut()?.remove("_additional")?;
                let id = additional.get("id")?.as_str()?.to_string();
                Some(StoreRow {
                    id,
                    distance: additional.get("distance").and_then(|v| v.as_f64()),
                    properties: obj,
                })
            })
            .collect())
    }
}

const CARD_FIELDS: &str = "summary signals places categories primaryCategory confidence \
timestampUrl videoUploadDate";

const PRODUCT_FIELDS: &str = "summary merchant link categories primaryCategory triggers \
constraints affiliatePriority userValue confidence";

#[async_trait]
impl EvidenceBackend for VectorStoreClient {
    async fn recommendation_cards(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoreRow>, VoyError> {
        self.near_text("RecommendationCard", CARD_FIELDS, query, limit)
            .await
    }
}

#[async_trait]
impl ProductBackend for VectorStoreClient {
    async fn product_cards(
        &self,
        query_signature: &str,
        limit: usize,
    ) -> Result<Vec<StoreRow>, VoyError> {
        self.near_text("ProductCard", PRODUCT_FIELDS, query_signature, limit)
            .await
    }
}

// ---------------------------------------------------------------------------
// Graph store (Cypher over HTTP)
// ---------------------------------------------------------------------------

/// Cypher retrieval against a Neo4j-style `tx/commit` endpoint.
pub struct GraphStoreClient {
    http: reqwest::Client,
    base_url: String,
    database: String,
    auth: Option<(String, String)>,
}

impl GraphStoreClient {
    /// New client; `auth` is `(user, password)` when the store requires it.
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

    async fn run_cypher(
        &self,
        statement: &str,
        parameters: serde_json::Value,
    ) -> Result<Vec<Vec<serde_json::Value>>, VoyError> {
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
            .map_err(|err| VoyError::upstream(format!("graph store unreachable: {err}")))?;
        if !response.status().is_success() {
            return Err(VoyError::upstream(format!(
                "graph store returned status {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| VoyError::parse(format!("graph store returned non-JSON: {err}")))?;
        if body["errors"]
            .as_array()
            .map(|errs| !errs.is_empty())
            .unwrap_or(false)
        {
            return Err(VoyError::upstream("graph store rejected the query"));
        }
        Ok(body["results"][0]["data"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| entry["row"].as_array().cloned())
            .collect())
    }

    fn row_to_node(row: &[serde_json::Value]) -> Option<RawNode> {
        Some(RawNode {
            id: row.first()?.as_str()?.to_string(),
            node_type: row.get(1)?.as_str().unwrap_or("place").to_string(),
            name: row.get(2)?.as_str().unwrap_or_default().to_string(),
            aliases: row
                .get(3)
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            properties: row.get(4).cloned().unwrap_or(serde_json::Value::Null),
        })
    }
}

const SEED_NODES_CYPHER: &str = "MATCH (n:Entity) \
WHERE toLower(n.name) CONTAINS $term \
   OR (n.aliases IS NOT NULL AND ANY(a IN n.aliases WHERE toLower(toString(a)) CONTAINS $term)) \
WITH n LIMIT $node_limit \
RETURN n.id, n.type, n.name, n.aliases, n.properties";

const ANY_NODES_CYPHER: &str =
    "MATCH (n:Entity) RETURN n.id, n.type, n.name, n.aliases, n.properties LIMIT $node_limit";

const EDGES_BETWEEN_CYPHER: &str = "MATCH (a:Entity)-[r:REL]->(b:Entity) \
WHERE a.id IN $ids AND b.id IN $ids \
RETURN a.id, b.id, r.type, r.evidence LIMIT $edge_limit";

#[async_trait]
impl GraphBackend for GraphStoreClient {
    async fn seed_nodes(&self, term: &str, limit: usize) -> Result<Vec<RawNode>, VoyError> {
        let rows = self
            .run_cypher(
                SEED_NODES_CYPHER,
                json!({"term": term, "node_limit": limit}),
            )
            .await?;
        Ok(rows.iter().filter_map(|r| Self::row_to_node(r)).collect())
    }

    async fn any_nodes(&self, limit: usize) -> Result<Vec<RawNode>, VoyError> {
        let rows = self
            .run_cypher(ANY_NODES_CYPHER, json!({"node_limit": limit}))
            .await?;
        Ok(rows.iter().filter_map(|r| Self::row_to_node(r)).collect())
    }

    async fn edges_between(
        &self,
        ids: &[String],
        limit: usize,
    ) -> Result<Vec<RawEdge>, VoyError> {
        let rows = self
            .run_cypher(
                EDGES_BETWEEN_CYPHER,
                json!({"ids": ids, "edge_limit": limit}),
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(RawEdge {
                    source: row.first()?.as_str()?.to_string(),
                    target: row.get(1)?.as_str()?.to_string(),
                    edge_type: row.get(2)?.as_str().unwrap_or("REL").to_string(),
                    evidence: row.get(3).cloned()?,
                })
            })
            .collect())
    }
}
