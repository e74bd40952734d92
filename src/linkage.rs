// 🔗 Linkage Builder - connect entities that share an attribute value
// Groups entities by normalized value per field, then merges pair candidates
// so every unordered pair gets at most one edge carrying all matching fields.

use crate::entity::Entity;
use crate::error::{LinkError, Result};
use crate::fields::{FieldKey, FieldMapping};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Entity count at which per-field grouping moves onto the rayon pool
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 5_000;

// ============================================================================
// DUPLICATE POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail the run on the first repeated identifier
    #[default]
    Reject,

    /// Keep the first row for an identifier, drop later ones
    KeepFirst,
}

// ============================================================================
// CONNECTION
// ============================================================================

/// Undirected edge between two distinct entities.
///
/// `source` is the entity that appears first in the input table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub source: String,
    pub target: String,

    /// Every field on which both entities hold the same non-empty value
    pub fields: BTreeSet<FieldKey>,

    /// The normalized value that matched, per field
    pub shared_values: BTreeMap<FieldKey, String>,
}

impl Connection {
    fn new(source: &Entity, target: &Entity) -> Self {
        Connection {
            source: source.id.clone(),
            target: target.id.clone(),
            fields: BTreeSet::new(),
            shared_values: BTreeMap::new(),
        }
    }

    pub fn involves(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }

    /// The far end of the edge as seen from `id`
    pub fn other(&self, id: &str) -> Option<&str> {
        if self.source == id {
            Some(&self.target)
        } else if self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }

    pub fn shares(&self, key: FieldKey) -> bool {
        self.fields.contains(&key)
    }
}

// ============================================================================
// LINKAGE BUILDER
// ============================================================================

/// normalized value → positions of the entities holding it (input order)
type ValueGroups = BTreeMap<String, Vec<usize>>;

pub struct LinkageBuilder {
    mapping: FieldMapping,

    /// What to do when an identifier repeats (default: reject)
    pub duplicate_policy: DuplicatePolicy,

    /// Entity count at which grouping runs in parallel (default: 5 000)
    pub parallel_threshold: usize,
}

impl LinkageBuilder {
    pub fn new(mapping: FieldMapping) -> Self {
        LinkageBuilder {
            mapping,
            duplicate_policy: DuplicatePolicy::default(),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Find every connected pair.
    ///
    /// Output is ordered by the input position of (source, target) and is
    /// identical for identical input, whichever grouping path ran.
    pub fn build(&self, entities: &[Entity]) -> Result<Vec<Connection>> {
        self.mapping.validate()?;

        let kept = self.resolve_duplicates(entities)?;
        let keys: Vec<FieldKey> = self.mapping.comparable_fields().map(|def| def.key).collect();

        let per_field: Vec<(FieldKey, ValueGroups)> = if kept.len() >= self.parallel_threshold {
            debug!(entities = kept.len(), fields = keys.len(), "grouping fields in parallel");
            keys.par_iter()
                .map(|&key| (key, group_by_value(&kept, key)))
                .collect()
        } else {
            keys.iter()
                .map(|&key| (key, group_by_value(&kept, key)))
                .collect()
        };

        let mut pairs: BTreeMap<(usize, usize), Connection> = BTreeMap::new();

        for (key, groups) in &per_field {
            let mut linked_groups = 0usize;

            for (value, members) in groups {
                if members.len() < 2 {
                    continue;
                }
                linked_groups += 1;

                for (i, &a) in members.iter().enumerate() {
                    for &b in &members[i + 1..] {
                        let edge = pairs
                            .entry((a, b))
                            .or_insert_with(|| Connection::new(kept[a], kept[b]));
                        edge.fields.insert(*key);
                        edge.shared_values.insert(*key, value.clone());
                    }
                }
            }

            debug!(
                field = %self.mapping.display_name(*key),
                values = groups.len(),
                shared_values = linked_groups,
                "grouped field"
            );
        }

        let connections: Vec<Connection> = pairs.into_values().collect();
        info!(
            entities = kept.len(),
            connections = connections.len(),
            "linkage complete"
        );

        Ok(connections)
    }

    /// Comparable fields whose value is present and identical on every entity.
    ///
    /// Only the first row of a repeated identifier counts, as with
    /// [`DuplicatePolicy::KeepFirst`]. The builder still links on these; callers
    /// that consider them noise can drop them with [`FieldMapping::without`]
    /// before building.
    pub fn constant_fields(&self, entities: &[Entity]) -> Vec<FieldKey> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let kept: Vec<&Entity> = entities
            .iter()
            .filter(|e| seen.insert(e.id.as_str()))
            .collect();

        if kept.len() < 2 {
            return Vec::new();
        }

        self.mapping
            .comparable_fields()
            .map(|def| def.key)
            .filter(|&key| {
                let first = match kept[0].normalized(key) {
                    Some(v) => v,
                    None => return false,
                };
                kept[1..]
                    .iter()
                    .all(|e| e.normalized(key).as_deref() == Some(first.as_str()))
            })
            .collect()
    }

    fn resolve_duplicates<'a>(&self, entities: &'a [Entity]) -> Result<Vec<&'a Entity>> {
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        let mut kept = Vec::with_capacity(entities.len());

        for entity in entities {
            if let Some(&first_row) = seen.get(entity.id.as_str()) {
                match self.duplicate_policy {
                    DuplicatePolicy::Reject => {
                        return Err(LinkError::DuplicateIdentifier {
                            id: entity.id.clone(),
                            first_row,
                            duplicate_row: entity.row,
                        });
                    }
                    DuplicatePolicy::KeepFirst => {
                        warn!(
                            id = %entity.id,
                            first_row,
                            duplicate_row = entity.row,
                            "dropping row with duplicate identifier"
                        );
                        continue;
                    }
                }
            }

            seen.insert(entity.id.as_str(), entity.row);
            kept.push(entity);
        }

        Ok(kept)
    }
}

fn group_by_value(entities: &[&Entity], key: FieldKey) -> ValueGroups {
    let mut groups: ValueGroups = BTreeMap::new();
    for (idx, entity) in entities.iter().enumerate() {
        if let Some(value) = entity.normalized(key) {
            groups.entry(value).or_default().push(idx);
        }
    }
    groups
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const PHONE: u8 = 2;
    const EMAIL: u8 = 3;
    const DEVICE: u8 = 4;

    fn key(k: u8) -> FieldKey {
        FieldKey::new(k).unwrap()
    }

    fn mapping() -> FieldMapping {
        FieldMapping::from_display_names(&["Client ID", "Phone", "Email", "Device"]).unwrap()
    }

    fn create_test_entity(id: &str, row: usize, values: &[(u8, &str)]) -> Entity {
        values
            .iter()
            .fold(Entity::new(id, row), |e, (k, v)| e.with_value(key(*k), *v))
    }

    fn fields(edge: &Connection) -> Vec<u8> {
        edge.fields.iter().map(|k| k.get()).collect()
    }

    fn ring() -> Vec<Entity> {
        vec![
            create_test_entity("A", 1, &[(PHONE, "555-0100")]),
            create_test_entity("B", 2, &[(PHONE, "555-0100")]),
            create_test_entity("C", 3, &[(PHONE, "555-0100"), (EMAIL, "x@y.com")]),
            create_test_entity("D", 4, &[(EMAIL, "x@y.com")]),
        ]
    }

    #[test]
    fn test_shared_phone_and_email_ring() {
        let edges = LinkageBuilder::new(mapping()).build(&ring()).unwrap();

        let pairs: Vec<(&str, &str, Vec<u8>)> = edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str(), fields(e)))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("A", "B", vec![PHONE]),
                ("A", "C", vec![PHONE]),
                ("B", "C", vec![PHONE]),
                ("C", "D", vec![EMAIL]),
            ]
        );
        assert_eq!(edges[3].shared_values[&key(EMAIL)], "x@y.com");
    }

    #[test]
    fn test_multiple_fields_merge_into_one_edge() {
        let entities = vec![
            create_test_entity("A", 1, &[(PHONE, "1"), (EMAIL, "e"), (DEVICE, "d1")]),
            create_test_entity("B", 2, &[(PHONE, "1"), (EMAIL, "e"), (DEVICE, "d2")]),
        ];
        let edges = LinkageBuilder::new(mapping()).build(&entities).unwrap();

        assert_eq!(edges.len(), 1);
        assert_eq!(fields(&edges[0]), vec![PHONE, EMAIL]);
        assert!(!edges[0].shares(key(DEVICE)));
    }

    #[test]
    fn test_matching_is_case_and_whitespace_insensitive() {
        let entities = vec![
            create_test_entity("A", 1, &[(EMAIL, "  Fraud@Example.COM")]),
            create_test_entity("B", 2, &[(EMAIL, "fraud@example.com ")]),
        ];
        let edges = LinkageBuilder::new(mapping()).build(&entities).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].shared_values[&key(EMAIL)], "fraud@example.com");
    }

    #[test]
    fn test_empty_and_placeholder_values_never_link() {
        let entities = vec![
            create_test_entity("A", 1, &[(PHONE, ""), (EMAIL, "null")]),
            create_test_entity("B", 2, &[(PHONE, "   "), (EMAIL, "NULL")]),
            create_test_entity("C", 3, &[]),
        ];
        let edges = LinkageBuilder::new(mapping()).build(&entities).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn test_distinct_values_do_not_link() {
        let entities = vec![
            create_test_entity("A", 1, &[(PHONE, "1")]),
            create_test_entity("B", 2, &[(PHONE, "2")]),
        ];
        let edges = LinkageBuilder::new(mapping()).build(&entities).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn test_invalid_mapping_fails_before_building() {
        let builder = LinkageBuilder::new(FieldMapping::new("Client ID"));
        let err = builder.build(&ring()).unwrap_err();
        assert!(matches!(err, LinkError::InvalidFieldMapping { .. }));
    }

    #[test]
    fn test_empty_table_yields_no_connections() {
        let edges = LinkageBuilder::new(mapping()).build(&[]).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let mut entities = ring();
        entities.push(create_test_entity("B", 5, &[(DEVICE, "z")]));

        let err = LinkageBuilder::new(mapping()).build(&entities).unwrap_err();
        assert_eq!(
            err,
            LinkError::DuplicateIdentifier {
                id: "B".to_string(),
                first_row: 2,
                duplicate_row: 5,
            }
        );
    }

    #[test]
    fn test_duplicate_identifier_keep_first() {
        let mut entities = ring();
        entities.push(create_test_entity("B", 5, &[(EMAIL, "x@y.com")]));

        let edges = LinkageBuilder::new(mapping())
            .with_duplicate_policy(DuplicatePolicy::KeepFirst)
            .build(&entities)
            .unwrap();

        // The second "B" row is gone, so B never links by email
        assert_eq!(edges.len(), 4);
        assert!(edges.iter().all(|e| !(e.involves("B") && e.shares(key(EMAIL)))));
    }

    #[test]
    fn test_constant_column_still_links() {
        let entities = vec![
            create_test_entity("A", 1, &[(DEVICE, "web"), (PHONE, "1")]),
            create_test_entity("B", 2, &[(DEVICE, "WEB")]),
            create_test_entity("C", 3, &[(DEVICE, "web ")]),
        ];
        let builder = LinkageBuilder::new(mapping());

        let edges = builder.build(&entities).unwrap();
        assert_eq!(edges.len(), 3);
        assert_eq!(builder.constant_fields(&entities), vec![key(DEVICE)]);
    }

    #[test]
    fn test_constant_fields_needs_every_row() {
        let entities = vec![
            create_test_entity("A", 1, &[(DEVICE, "web")]),
            create_test_entity("B", 2, &[]),
        ];
        let builder = LinkageBuilder::new(mapping());
        assert!(builder.constant_fields(&entities).is_empty());
        assert!(builder.constant_fields(&entities[..1]).is_empty());
    }

    #[test]
    fn test_constant_fields_ignores_dropped_duplicates() {
        let entities = vec![
            create_test_entity("A", 1, &[(DEVICE, "web")]),
            create_test_entity("B", 2, &[(DEVICE, "Web ")]),
            create_test_entity("A", 3, &[(DEVICE, "ios")]),
        ];
        let builder = LinkageBuilder::new(mapping()).with_duplicate_policy(DuplicatePolicy::KeepFirst);

        assert_eq!(builder.constant_fields(&entities), vec![key(DEVICE)]);
        assert!(builder.constant_fields(&entities[..1]).is_empty());
    }

    #[test]
    fn test_parallel_grouping_matches_sequential() {
        let entities: Vec<Entity> = (0..200)
            .map(|i| {
                let phone = format!("p{}", i % 7);
                let email = format!("e{}", i % 11);
                let device = format!("d{}", i % 13);
                create_test_entity(
                    &format!("C{}", i),
                    i + 1,
                    &[(PHONE, phone.as_str()), (EMAIL, email.as_str()), (DEVICE, device.as_str())],
                )
            })
            .collect();

        let sequential = LinkageBuilder::new(mapping())
            .with_parallel_threshold(usize::MAX)
            .build(&entities)
            .unwrap();
        let parallel = LinkageBuilder::new(mapping())
            .with_parallel_threshold(0)
            .build(&entities)
            .unwrap();

        assert_eq!(sequential, parallel);
        assert!(!sequential.is_empty());
    }

    #[test]
    fn test_connection_other_end() {
        let edges = LinkageBuilder::new(mapping()).build(&ring()).unwrap();
        let cd = &edges[3];
        assert_eq!(cd.other("C"), Some("D"));
        assert_eq!(cd.other("D"), Some("C"));
        assert_eq!(cd.other("A"), None);
    }
}
