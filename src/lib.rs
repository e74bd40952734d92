// Fraud Ring Detection - Core Library
// Link-graph construction and risk scoring, used by the CLI, API server and tests

pub mod error;
pub mod fields;
pub mod entity;
pub mod linkage;        // Linkage Builder - shared-value grouping
pub mod risk;           // Risk Classifier - tiers from field diversity
pub mod graph;          // Annotated node/edge graph + analyst filters
pub mod config;
pub mod export;

#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use error::LinkError;
pub use fields::{
    FieldDefinition, FieldKey, FieldMapping,
    normalize_field_name, normalize_value, MAX_FIELDS,
};
pub use entity::{Entity, EntityTable, parse_column_input};
pub use linkage::{Connection, DuplicatePolicy, LinkageBuilder};
pub use risk::{Classification, EntityRisk, RiskClassifier, RiskTier};
pub use graph::{
    analyze, FraudGraph, GraphEdge, GraphFilter, GraphNode, GraphSummary,
};
pub use config::{AnalysisConfig, DEFAULT_TITLE};
pub use export::{
    GraphExport, FieldLegendEntry, graph_fingerprint,
    write_connections_csv, write_nodes_csv,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
