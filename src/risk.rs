// 🚦 Risk Classifier - tier every entity by the diversity of its links
// Distinct field types drive the tier, not the number of partners.

use crate::entity::Entity;
use crate::fields::FieldKey;
use crate::linkage::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// RISK TIER
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    /// No connections at all
    #[default]
    None,
    /// Linked through one field type
    Low,
    /// Linked through two field types
    Medium,
    /// Linked through three or more field types
    High,
}

impl RiskTier {
    pub fn from_field_count(distinct_fields: usize) -> Self {
        match distinct_fields {
            0 => RiskTier::None,
            1 => RiskTier::Low,
            2 => RiskTier::Medium,
            _ => RiskTier::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::None => "None",
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        }
    }

    pub fn all() -> [RiskTier; 4] {
        [RiskTier::None, RiskTier::Low, RiskTier::Medium, RiskTier::High]
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PER-ENTITY RISK
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRisk {
    /// Union of field keys over every connection of the entity
    pub field_types: BTreeSet<FieldKey>,

    pub tier: RiskTier,

    /// Number of partner entities (degree)
    pub connections: usize,

    /// Sum of matched-field counts over all connections
    pub feature_occurrences: usize,

    /// 0..=100 composite, informational only
    pub risk_score: u32,
}

impl EntityRisk {
    fn record(&mut self, edge: &Connection) {
        self.connections += 1;
        self.feature_occurrences += edge.fields.len();
        self.field_types.extend(edge.fields.iter().copied());
    }

    fn finish(&mut self) {
        self.tier = RiskTier::from_field_count(self.field_types.len());
        self.risk_score = risk_score(
            self.connections,
            self.field_types.len(),
            self.feature_occurrences,
        );
    }
}

/// Composite score: degree (max 60) + field diversity (max 30) + feature frequency (max 10)
pub fn risk_score(connections: usize, distinct_fields: usize, feature_occurrences: usize) -> u32 {
    let connection_score = (connections * 15).min(60);
    let diversity_score = (distinct_fields * 10).min(30);
    let frequency_score = (feature_occurrences * 2).min(10);

    (connection_score + diversity_score + frequency_score).min(100) as u32
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    risks: BTreeMap<String, EntityRisk>,
}

impl Classification {
    pub fn get(&self, id: &str) -> Option<&EntityRisk> {
        self.risks.get(id)
    }

    /// Tier of an entity; unknown ids have no connections
    pub fn tier(&self, id: &str) -> RiskTier {
        self.risks.get(id).map(|r| r.tier).unwrap_or_default()
    }

    pub fn fields(&self, id: &str) -> Option<&BTreeSet<FieldKey>> {
        self.risks.get(id).map(|r| &r.field_types)
    }

    /// entity id → tier
    pub fn tiers(&self) -> BTreeMap<&str, RiskTier> {
        self.risks
            .iter()
            .map(|(id, risk)| (id.as_str(), risk.tier))
            .collect()
    }

    /// Ids with no connections
    pub fn isolated(&self) -> Vec<&str> {
        self.risks
            .iter()
            .filter(|(_, risk)| risk.tier == RiskTier::None)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.risks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.risks.is_empty()
    }
}

// ============================================================================
// RISK CLASSIFIER
// ============================================================================

pub struct RiskClassifier;

impl RiskClassifier {
    /// Aggregate the connection set per entity. Read-only over both inputs.
    pub fn classify(entities: &[Entity], connections: &[Connection]) -> Classification {
        let mut risks: BTreeMap<String, EntityRisk> = BTreeMap::new();
        for entity in entities {
            risks.entry(entity.id.clone()).or_default();
        }

        for edge in connections {
            for id in [&edge.source, &edge.target] {
                match risks.get_mut(id.as_str()) {
                    Some(risk) => risk.record(edge),
                    None => tracing::debug!(id = %id, "connection endpoint not in entity table"),
                }
            }
        }

        for risk in risks.values_mut() {
            risk.finish();
        }

        Classification { risks }
    }
}

// ============================================================================
// TESTS
// ============================================================================
