// 🕸️ Fraud Graph - nodes with risk tiers, edges with shared-field labels
// This is the narrow interface renderers and exporters consume.

use crate::config::AnalysisConfig;
use crate::entity::Entity;
use crate::error::Result;
use crate::fields::{FieldKey, FieldMapping};
use crate::linkage::Connection;
use crate::risk::{Classification, RiskClassifier, RiskTier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Node labels are cut to this many characters
pub const LABEL_MAX_CHARS: usize = 30;

/// Score at or above which a node counts as high risk in summaries
pub const HIGH_RISK_SCORE: u32 = 80;

// ============================================================================
// NODES & EDGES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub risk_tier: RiskTier,
    pub risk_score: u32,

    /// Number of partner entities
    pub connections: usize,

    /// Distinct field keys across the node's edges, ascending
    pub field_types: Vec<FieldKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub matched_fields: Vec<FieldKey>,

    /// Display names of `matched_fields`, same order
    pub matched_names: Vec<String>,

    /// The shared value, only when exactly one field matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_value: Option<String>,
}

impl GraphEdge {
    fn from_connection(edge: &Connection, mapping: &FieldMapping) -> Self {
        let matched_fields: Vec<FieldKey> = edge.fields.iter().copied().collect();
        let matched_names = matched_fields
            .iter()
            .map(|key| mapping.display_name(*key))
            .collect();
        let shared_value = if matched_fields.len() == 1 {
            edge.shared_values.get(&matched_fields[0]).cloned()
        } else {
            None
        };

        GraphEdge {
            source: edge.source.clone(),
            target: edge.target.clone(),
            matched_fields,
            matched_names,
            shared_value,
        }
    }

    pub fn involves(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

// ============================================================================
// GRAPH FILTER
// ============================================================================

/// Analyst view over a finished graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphFilter {
    /// Keep nodes whose score is at least this
    pub min_risk_score: u32,

    /// Keep edges carrying any of these fields (empty = all fields)
    pub field_types: BTreeSet<FieldKey>,

    /// Keep edges with at least this many matched fields
    pub min_shared_fields: usize,
}

impl GraphFilter {
    fn keeps_edge(&self, edge: &GraphEdge) -> bool {
        edge.matched_fields.len() >= self.min_shared_fields
            && (self.field_types.is_empty()
                || edge.matched_fields.iter().any(|k| self.field_types.contains(k)))
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub total_entities: usize,
    pub total_connections: usize,
    pub by_tier: BTreeMap<RiskTier, usize>,
    pub high_risk_count: usize,
}

// ============================================================================
// FRAUD GRAPH
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Build, classify and assemble one run. Stateless: every call starts from scratch.
pub fn analyze(entities: &[Entity], config: &AnalysisConfig) -> Result<FraudGraph> {
    config.validate()?;

    let connections = config.linkage_builder().build(entities)?;
    let classification = RiskClassifier::classify(entities, &connections);
    let graph = FraudGraph::assemble(entities, &connections, &classification, &config.fields);

    let graph = if config.filter_isolated {
        graph.filter_isolated()
    } else {
        graph
    };

    tracing::info!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        filter_isolated = config.filter_isolated,
        "analysis complete"
    );
    Ok(graph)
}

impl FraudGraph {
    /// Nodes follow input order; a repeated id keeps its first row.
    pub fn assemble(
        entities: &[Entity],
        connections: &[Connection],
        classification: &Classification,
        mapping: &FieldMapping,
    ) -> Self {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut nodes = Vec::with_capacity(entities.len());

        for entity in entities {
            if !seen.insert(entity.id.as_str()) {
                continue;
            }

            let risk = classification.get(&entity.id).cloned().unwrap_or_default();
            nodes.push(GraphNode {
                id: entity.id.clone(),
                label: make_label(&entity.id),
                risk_tier: risk.tier,
                risk_score: risk.risk_score,
                connections: risk.connections,
                field_types: risk.field_types.into_iter().collect(),
            });
        }

        let edges = connections
            .iter()
            .map(|edge| GraphEdge::from_connection(edge, mapping))
            .collect();

        FraudGraph { nodes, edges }
    }

    /// Drop tier-None nodes. Applying it twice changes nothing.
    pub fn filter_isolated(&self) -> FraudGraph {
        let nodes: Vec<GraphNode> = self
            .nodes
            .iter()
            .filter(|n| n.risk_tier != RiskTier::None)
            .cloned()
            .collect();
        let kept: BTreeSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let edges = self
            .edges
            .iter()
            .filter(|e| kept.contains(e.source.as_str()) && kept.contains(e.target.as_str()))
            .cloned()
            .collect();

        FraudGraph { nodes, edges }
    }

    /// Filtered view; field types, tiers and degrees are recomputed from the kept edges.
    /// Scores keep their full-graph value.
    pub fn filter(&self, filter: &GraphFilter) -> FraudGraph {
        let mut nodes: Vec<GraphNode> = self
            .nodes
            .iter()
            .filter(|n| n.risk_score >= filter.min_risk_score)
            .cloned()
            .collect();

        let edges: Vec<GraphEdge> = {
            let kept: BTreeSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
            self.edges
                .iter()
                .filter(|e| kept.contains(e.source.as_str()) && kept.contains(e.target.as_str()))
                .filter(|e| filter.keeps_edge(e))
                .cloned()
                .collect()
        };

        let mut visible: BTreeMap<&str, (usize, BTreeSet<FieldKey>)> = BTreeMap::new();
        for edge in &edges {
            for id in [edge.source.as_str(), edge.target.as_str()] {
                let entry = visible.entry(id).or_default();
                entry.0 += 1;
                entry.1.extend(edge.matched_fields.iter().copied());
            }
        }

        for node in &mut nodes {
            let (degree, fields) = visible.remove(node.id.as_str()).unwrap_or_default();
            node.connections = degree;
            node.risk_tier = RiskTier::from_field_count(fields.len());
            node.field_types = fields.into_iter().collect();
        }

        FraudGraph { nodes, edges }
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Partner ids of a node, in edge order
    pub fn neighbours(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter_map(|e| {
                if e.source == id {
                    Some(e.target.as_str())
                } else if e.target == id {
                    Some(e.source.as_str())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Nodes scoring at least `min_score`, highest first (ties by id)
    pub fn high_risk_nodes(&self, min_score: u32) -> Vec<&GraphNode> {
        let mut nodes: Vec<&GraphNode> = self
            .nodes
            .iter()
            .filter(|n| n.risk_score >= min_score)
            .collect();
        nodes.sort_by(|a, b| b.risk_score.cmp(&a.risk_score).then_with(|| a.id.cmp(&b.id)));
        nodes
    }

    /// Number of edges that matched on each field
    pub fn field_usage(&self) -> BTreeMap<FieldKey, usize> {
        let mut usage = BTreeMap::new();
        for edge in &self.edges {
            for key in &edge.matched_fields {
                *usage.entry(*key).or_insert(0) += 1;
            }
        }
        usage
    }

    pub fn summary(&self) -> GraphSummary {
        let mut by_tier: BTreeMap<RiskTier, usize> =
            RiskTier::all().into_iter().map(|t| (t, 0)).collect();
        for node in &self.nodes {
            *by_tier.entry(node.risk_tier).or_insert(0) += 1;
        }

        GraphSummary {
            total_entities: self.nodes.len(),
            total_connections: self.edges.len(),
            by_tier,
            high_risk_count: self
                .nodes
                .iter()
                .filter(|n| n.risk_score >= HIGH_RISK_SCORE)
                .count(),
        }
    }
}

fn make_label(id: &str) -> String {
    id.chars().take(LABEL_MAX_CHARS).collect()
}

// ============================================================================
// TESTS
// ============================================================================
