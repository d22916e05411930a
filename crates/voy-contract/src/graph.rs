// SPDX-License-Identifier: MIT OR Apache-2.0
//! Travel-graph contract (`graph_rag` schema).
//!
//! Edge evidence keeps the store's camelCase field names (`videoUrl`,
//! `timestampUrl`, `startSec`, `endSec`, `chunkIdx`) on the wire.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Allowed graph node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// A city.
    City,
    /// A neighborhood, street, square, or area.
    Place,
    /// A visitable attraction or venue.
    Poi,
    /// A multi-day itinerary.
    Itinerary,
    /// One day of an itinerary.
    Dayplan,
    /// A kind of activity (hiking, museums, ...).
    ActivityType,
    /// A piece of travel advice.
    Advice,
    /// A constraint (opening hours, booking requirements, ...).
    Constraint,
}

impl NodeType {
    /// All allowed node types.
    pub const ALL: [NodeType; 8] = [
        NodeType::City,
        NodeType::Place,
        NodeType::Poi,
        NodeType::Itinerary,
        NodeType::Dayplan,
        NodeType::ActivityType,
        NodeType::Advice,
        NodeType::Constraint,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::City => "city",
            Self::Place => "place",
            Self::Poi => "poi",
            Self::Itinerary => "itinerary",
            Self::Dayplan => "dayplan",
            Self::ActivityType => "activity_type",
            Self::Advice => "advice",
            Self::Constraint => "constraint",
        }
    }
}

impl FromStr for NodeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allowed graph edge types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// itinerary → city.
    ItineraryFor,
    /// itinerary → dayplan.
    HasDay,
    /// dayplan → poi.
    IncludesPoi,
    /// poi/place → place/city.
    InArea,
    /// Earlier thing → later thing.
    OrderBefore,
    /// Grouping relation.
    ClusteredBy,
    /// Suggested number of days.
    SuggestedDays,
    /// poi/dayplan/place → activity_type.
    HasActivityType,
    /// Any → advice.
    HasAdvice,
    /// dayplan/poi → constraint.
    HasConstraint,
}

impl EdgeType {
    /// All allowed edge types.
    pub const ALL: [EdgeType; 10] = [
        EdgeType::ItineraryFor,
        EdgeType::HasDay,
        EdgeType::IncludesPoi,
        EdgeType::InArea,
        EdgeType::OrderBefore,
        EdgeType::ClusteredBy,
        EdgeType::SuggestedDays,
        EdgeType::HasActivityType,
        EdgeType::HasAdvice,
        EdgeType::HasConstraint,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ItineraryFor => "ITINERARY_FOR",
            Self::HasDay => "HAS_DAY",
            Self::IncludesPoi => "INCLUDES_POI",
            Self::InArea => "IN_AREA",
            Self::OrderBefore => "ORDER_BEFORE",
            Self::ClusteredBy => "CLUSTERED_BY",
            Self::SuggestedDays => "SUGGESTED_DAYS",
            Self::HasActivityType => "HAS_ACTIVITY_TYPE",
            Self::HasAdvice => "HAS_ADVICE",
            Self::HasConstraint => "HAS_CONSTRAINT",
        }
    }
}

impl FromStr for EdgeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request parameters for graph retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRequest {
    /// Free-text user query (non-empty).
    pub user_query: String,
    /// Optional destination hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Optional IETF language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Node limit (1–50).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// When set, the response carries a `debug` object.
    #[serde(default)]
    pub debug: bool,
}

impl GraphRequest {
    /// New request with only the query set.
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            destination: None,
            lang: None,
            limit: None,
            debug: false,
        }
    }
}

/// Evidence backing an edge: a video segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeEvidence {
    /// Source video URL.
    #[serde(rename = "videoUrl")]
    pub video_url: String,
    /// Deep link into the segment (citation handle).
    #[serde(rename = "timestampUrl")]
    pub timestamp_url: String,
    /// Segment start, seconds.
    #[serde(rename = "startSec")]
    pub start_sec: u32,
    /// Segment end, seconds.
    #[serde(rename = "endSec")]
    pub end_sec: u32,
    /// Index of the transcript chunk the edge came from.
    #[serde(rename = "chunkIdx", default, skip_serializing_if = "Option::is_none")]
    pub chunk_idx: Option<u32>,
}

/// One node of the subgraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable node id, `<type>:<slug>`.
    pub id: String,
    /// Node type (one of the [`NodeType`] wire values).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display name.
    pub name: String,
    /// Alternative spellings.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Minimal extra properties.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// One edge of the subgraph, always carrying evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node id.
    pub source: String,
    /// Edge type (one of the [`EdgeType`] wire values).
    #[serde(rename = "type")]
    pub edge_type: String,
    /// Target node id.
    pub target: String,
    /// Minimal extra properties.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Backing video segment.
    pub evidence: EdgeEvidence,
}

/// The retrieved subgraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Subgraph {
    /// Nodes.
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    /// Edges between those nodes.
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

/// One narrative path (e.g. an itinerary day sequence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathItem {
    /// Path identifier (root node id).
    pub path_id: String,
    /// Display label (root node name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Ordered node ids along the path.
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Edge types traversed.
    #[serde(default)]
    pub edges: Vec<String>,
    /// Evidence of the traversed edges.
    #[serde(default)]
    pub evidence: Vec<EdgeEvidence>,
}

/// Response for `retrieve_travel_graph`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphResponse {
    /// Always [`crate::CONTRACT_VERSION`].
    pub x_contract_version: String,
    /// Echo of the inbound request.
    pub request: GraphRequest,
    /// Retrieved subgraph.
    pub subgraph: Subgraph,
    /// Up to three narrative paths, when any exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<PathItem>>,
    /// Debug detail (present only when requested).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}
