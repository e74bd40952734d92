// Property-based tests for linkage and risk tiers.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::{BTreeMap, BTreeSet};

use fraud_rings::*;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn mapping() -> FieldMapping {
    FieldMapping::from_display_names(&["Client ID", "Phone", "Email", "Device"]).unwrap()
}

fn comparable_keys() -> Vec<FieldKey> {
    mapping().comparable_fields().map(|d| d.key).collect()
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Small alphabet so values collide often; includes blanks, placeholders and case variants.
fn arb_value() -> impl Strategy<Value = String> {
    prop_oneof![
        2 => Just(String::new()),
        1 => Just("nan".to_string()),
        2 => Just("a".to_string()),
        1 => Just(" A ".to_string()),
        2 => Just("b".to_string()),
        2 => Just("c".to_string()),
        1 => r"[d-z]{1,3}",
    ]
}

/// Entities with unique ids e0, e1, ... in input order
fn arb_entities() -> impl Strategy<Value = Vec<Entity>> {
    prop::collection::vec(prop::collection::vec(arb_value(), 3), 0..24).prop_map(|rows| {
        let keys = comparable_keys();
        rows.into_iter()
            .enumerate()
            .map(|(i, values)| {
                keys.iter()
                    .zip(values)
                    .fold(Entity::new(format!("e{}", i), i + 1), |e, (k, v)| {
                        e.with_value(*k, v)
                    })
            })
            .collect()
    })
}

fn config() -> AnalysisConfig {
    AnalysisConfig::new(mapping())
}

/// Reference answer: compare every pair on every field
fn brute_force(entities: &[Entity]) -> BTreeMap<(String, String), BTreeSet<FieldKey>> {
    let mut expected = BTreeMap::new();
    for (i, a) in entities.iter().enumerate() {
        for b in &entities[i + 1..] {
            let shared: BTreeSet<FieldKey> = comparable_keys()
                .into_iter()
                .filter(|k| match (a.normalized(*k), b.normalized(*k)) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                })
                .collect();
            if !shared.is_empty() {
                expected.insert((a.id.clone(), b.id.clone()), shared);
            }
        }
    }
    expected
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn edges_match_pairwise_comparison(entities in arb_entities()) {
        let graph = analyze(&entities, &config()).unwrap();

        let actual: BTreeMap<(String, String), BTreeSet<FieldKey>> = graph
            .edges
            .iter()
            .map(|e| ((e.source.clone(), e.target.clone()), e.matched_fields.iter().copied().collect()))
            .collect();

        prop_assert_eq!(actual.len(), graph.edges.len());
        prop_assert_eq!(actual, brute_force(&entities));
    }

    #[test]
    fn edges_are_simple_and_ordered(entities in arb_entities()) {
        let graph = analyze(&entities, &config()).unwrap();
        let position: BTreeMap<&str, usize> = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.as_str(), i))
            .collect();

        let mut seen = BTreeSet::new();
        for edge in &graph.edges {
            prop_assert_ne!(&edge.source, &edge.target);
            prop_assert!(position[edge.source.as_str()] < position[edge.target.as_str()]);
            prop_assert!(!edge.matched_fields.is_empty());
            prop_assert!(seen.insert((edge.source.clone(), edge.target.clone())));
            prop_assert!(!seen.contains(&(edge.target.clone(), edge.source.clone())));
        }
    }

    #[test]
    fn node_fields_are_union_of_edge_fields(entities in arb_entities()) {
        let graph = analyze(&entities, &config()).unwrap();

        for node in &graph.nodes {
            let mut union = BTreeSet::new();
            let mut degree = 0;
            for edge in graph.edges.iter().filter(|e| e.involves(&node.id)) {
                union.extend(edge.matched_fields.iter().copied());
                degree += 1;
            }

            prop_assert_eq!(&node.field_types, &union.iter().copied().collect::<Vec<_>>());
            prop_assert_eq!(node.connections, degree);
            prop_assert_eq!(node.risk_tier, RiskTier::from_field_count(union.len()));
            prop_assert!(node.risk_score <= 100);
        }
    }

    #[test]
    fn runs_are_deterministic(entities in arb_entities()) {
        let sequential = analyze(&entities, &config()).unwrap();
        let again = analyze(&entities, &config()).unwrap();

        let mut parallel_config = config();
        parallel_config.parallel_threshold = 0;
        let parallel = analyze(&entities, &parallel_config).unwrap();

        prop_assert_eq!(&sequential, &again);
        prop_assert_eq!(&sequential, &parallel);
        prop_assert_eq!(
            graph_fingerprint(&sequential).unwrap(),
            graph_fingerprint(&parallel).unwrap()
        );
    }

    #[test]
    fn isolated_filter_is_idempotent(entities in arb_entities()) {
        let graph = analyze(&entities, &config()).unwrap();
        let once = graph.filter_isolated();

        prop_assert_eq!(&once.filter_isolated(), &once);
        prop_assert_eq!(&once.edges, &graph.edges);
        prop_assert!(once.nodes.iter().all(|n| n.risk_tier != RiskTier::None));
        prop_assert_eq!(
            once.nodes.len(),
            graph.nodes.len() - graph.summary().by_tier[&RiskTier::None]
        );

        let via_config = analyze(&entities, &config().with_filter_isolated(true)).unwrap();
        prop_assert_eq!(via_config, once);
    }

    #[test]
    fn default_filter_is_identity(entities in arb_entities()) {
        let graph = analyze(&entities, &config()).unwrap();
        prop_assert_eq!(graph.filter(&GraphFilter::default()), graph);
    }

    #[test]
    fn tier_thresholds(count in 0usize..20) {
        let tier = RiskTier::from_field_count(count);
        let expected = match count {
            0 => RiskTier::None,
            1 => RiskTier::Low,
            2 => RiskTier::Medium,
            _ => RiskTier::High,
        };
        prop_assert_eq!(tier, expected);
    }
}
