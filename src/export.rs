// 📦 Export - graph payload for renderers and static image exporters
// Adds title, timestamp, run id and a content fingerprint to a finished graph.

use crate::fields::{FieldKey, FieldMapping};
use crate::graph::{FraudGraph, GraphEdge, GraphNode, GraphSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ============================================================================
// LEGEND
// ============================================================================

/// One row of the "connection types" legend: a field that linked at least one pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLegendEntry {
    pub key: FieldKey,
    pub display_name: String,
    pub connections: usize,
}

pub fn field_legend(graph: &FraudGraph, mapping: &FieldMapping) -> Vec<FieldLegendEntry> {
    graph
        .field_usage()
        .into_iter()
        .map(|(key, connections)| FieldLegendEntry {
            key,
            display_name: mapping.display_name(key),
            connections,
        })
        .collect()
}

// ============================================================================
// GRAPH EXPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: Uuid,

    /// SHA-256 of the node and edge lists; equal graphs share it
    pub fingerprint: String,

    pub summary: GraphSummary,
    pub field_legend: Vec<FieldLegendEntry>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphExport {
    pub fn new(graph: &FraudGraph, title: &str, mapping: &FieldMapping) -> Result<Self> {
        Ok(GraphExport {
            title: title.to_string(),
            generated_at: Utc::now(),
            run_id: Uuid::new_v4(),
            fingerprint: graph_fingerprint(graph)?,
            summary: graph.summary(),
            field_legend: field_legend(graph, mapping),
            nodes: graph.nodes.clone(),
            edges: graph.edges.clone(),
        })
    }

    /// Footer text for image exports
    pub fn generated_label(&self) -> String {
        format!("Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S"))
    }

    /// File name suggestion, e.g. `fraud-network-20261016-142501.png`
    pub fn file_stem(&self) -> String {
        format!("fraud-network-{}", self.generated_at.format("%Y%m%d-%H%M%S"))
    }

    /// `<dir>/<file_stem>.json`
    pub fn default_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", self.file_stem()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize graph export")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write export to {}", path.display()))
    }
}

/// Hex SHA-256 over the canonical JSON of nodes and edges
pub fn graph_fingerprint(graph: &FraudGraph) -> Result<String> {
    let canonical = serde_json::to_vec(&(&graph.nodes, &graph.edges))
        .context("Failed to serialize graph for fingerprint")?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// CSV TABLES
// ============================================================================

/// One line per connection: both ids, shared field names, field count
pub fn write_connections_csv<W: Write>(graph: &FraudGraph, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["Client 1", "Client 2", "Shared Features", "Feature Count"])?;

    for edge in &graph.edges {
        wtr.write_record([
            edge.source.as_str(),
            edge.target.as_str(),
            edge.matched_names.join(", ").as_str(),
            edge.matched_fields.len().to_string().as_str(),
        ])?;
    }

    wtr.flush().context("Failed to flush connections CSV")?;
    Ok(())
}

/// One line per node, highest score first
pub fn write_nodes_csv<W: Write>(graph: &FraudGraph, mapping: &FieldMapping, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "ID",
        "Label",
        "Risk Level",
        "Risk Score",
        "Connections",
        "Shared Fields",
    ])?;

    for node in graph.high_risk_nodes(0) {
        let fields: Vec<String> = node
            .field_types
            .iter()
            .map(|key| mapping.display_name(*key))
            .collect();

        wtr.write_record([
            node.id.as_str(),
            node.label.as_str(),
            node.risk_tier.as_str(),
            node.risk_score.to_string().as_str(),
            node.connections.to_string().as_str(),
            fields.join(", ").as_str(),
        ])?;
    }

    wtr.flush().context("Failed to flush nodes CSV")?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
