//! End-to-end tests for construction, pruning and mutation.
//!
//! The fixed scenarios use small hand-written catalogs. The property tests
//! generate random catalogs from a seed, either layered (construction always
//! succeeds) or tangled (labels flow in both directions, so mutations often
//! abort), and check that every graph handed back is valid and that failed
//! mutations leave the graph untouched.

use std::num::NonZeroUsize;

use indexmap::IndexSet;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use svcgraph_core::{
    validate_graph, CompositionGraph, InvariantViolation, Qos, ServiceId, ServiceNode, Taxonomy,
    TaxonomyIndex, Weights,
};
use svcgraph_evolve::{
    construct, discover_relevant, mutate, mutate_at, prune, CandidateSource, ConstructionError,
    MutationError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build(
    tax: &TaxonomyIndex,
    start: &[&str],
    end: &[&str],
    weights: Weights,
) -> Result<(CompositionGraph, IndexSet<ServiceId>), ConstructionError> {
    let start = ServiceNode::start(start.iter().copied());
    let end = ServiceNode::end(end.iter().copied());
    let relevant = discover_relevant(tax, &start.outputs);
    let graph = construct(
        &start,
        &end,
        tax,
        CandidateSource::Taxonomy {
            relevant: &relevant,
        },
        weights,
    )?;
    Ok((graph, relevant))
}

/// A layered catalog with a guaranteed route `l0 -> l5 -> l9a` and twelve
/// random services in between. `l9a` specialises `l9`.
fn random_catalog(seed: u64) -> TaxonomyIndex {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut builder = TaxonomyIndex::builder()
        .concept("l9", None)
        .concept("l9a", Some("l9"))
        .service("bridge_a", ["l0"], ["l5"], Qos::default())
        .service("bridge_b", ["l5"], ["l9a"], Qos::default());
    for i in 0..12 {
        let low: usize = rng.gen_range(0..8);
        let inputs = vec![format!("l{}", low), format!("l{}", rng.gen_range(0..=low))];
        let outputs = vec![
            format!("l{}", rng.gen_range(low + 1..10)),
            format!("l{}", rng.gen_range(low + 1..10)),
        ];
        builder = builder.service(format!("s{}", i), inputs, outputs, Qos::default());
    }
    builder.build().unwrap()
}

/// Twenty-five services over ten labels with no layering: any label may feed
/// any other, so local replacements regularly fail to reattach.
fn tangled_catalog(seed: u64) -> TaxonomyIndex {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let pick = |rng: &mut ChaCha8Rng| -> Vec<String> {
        let count = rng.gen_range(1..=2);
        (0..count).map(|_| format!("t{}", rng.gen_range(0..10))).collect()
    };
    let mut builder = TaxonomyIndex::builder();
    for i in 0..25 {
        let inputs = pick(&mut rng);
        let outputs = pick(&mut rng);
        builder = builder.service(format!("s{}", i), inputs, outputs, Qos::default());
    }
    builder.build().unwrap()
}

/// Builds a graph for `t0, t1 -> t9`, or `None` if the catalog cannot.
fn tangled_graph(
    tax: &TaxonomyIndex,
    rng: &mut ChaCha8Rng,
) -> Option<(CompositionGraph, IndexSet<ServiceId>)> {
    let weights = Weights::random(tax.service_count(), rng);
    build(tax, &["t0", "t1"], &["t9"], weights).ok()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn two_service_chain() {
    let tax = TaxonomyIndex::builder()
        .service("S1", ["A"], ["B"], Qos::default())
        .service("S2", ["B"], ["C", "D"], Qos::default())
        .build()
        .unwrap();
    let (graph, _) = build(&tax, &["A"], &["D"], Weights::from_vec(vec![0.4, 0.6])).unwrap();

    insta::assert_snapshot!(graph.edge_list(), @"S1->S2{B} S2->end{D} start->S1{A}");
    assert!(validate_graph(&graph).is_empty());
}

#[test]
fn unproducible_end_label_fails() {
    let tax = TaxonomyIndex::builder()
        .service("S1", ["A"], ["B"], Qos::default())
        .build()
        .unwrap();
    let err = build(&tax, &["A"], &["Z"], Weights::from_vec(vec![0.5])).unwrap_err();
    assert!(matches!(err, ConstructionError::InputStarvation { .. }));
    assert!(err.to_string().contains("\"Z\""));
}

#[test]
fn vehicle_purchase_uses_subsumption() {
    let tax = TaxonomyIndex::builder()
        .concept("vehicle", None)
        .concept("car", Some("vehicle"))
        .concept("sedan", Some("car"))
        .service("dealer", ["money"], ["sedan"], Qos::default())
        .service("garage", ["car"], ["repair"], Qos::default())
        .service("museum", ["vehicle"], ["ticket"], Qos::default())
        .goal(["ticket"])
        .build()
        .unwrap();
    assert!(tax.is_goal_output("ticket"));

    let (graph, _) = build(
        &tax,
        &["money"],
        &["ticket", "repair"],
        Weights::from_vec(vec![0.3, 0.2, 0.1]),
    )
    .unwrap();
    insta::assert_snapshot!(
        graph.edge_list(),
        @"dealer->garage{car} dealer->museum{vehicle} garage->end{repair} museum->end{ticket} start->dealer{money}"
    );
}

#[test]
fn mutation_of_middle_node_splices_between_neighbours() {
    let tax = TaxonomyIndex::builder()
        .service("S1", ["A"], ["B"], Qos::default())
        .service("S2", ["B"], ["C"], Qos::default())
        .service("S3", ["C"], ["D"], Qos::default())
        .service("T1", ["B"], ["X"], Qos::default())
        .service("T2", ["X"], ["C"], Qos::default())
        .build()
        .unwrap();
    let (mut graph, relevant) = build(
        &tax,
        &["A"],
        &["D"],
        Weights::from_vec(vec![0.1, 0.2, 0.3, 0.8, 0.9]),
    )
    .unwrap();
    assert_eq!(
        graph.edge_list(),
        "S1->S2{B} S2->S3{C} S3->end{D} start->S1{A}"
    );

    let s2 = graph.node_id("S2").unwrap();
    let prefer_detour = Weights::from_vec(vec![0.5, 0.9, 0.5, 0.1, 0.2]);
    let report = mutate_at(&mut graph, s2, NonZeroUsize::MIN, &tax, &relevant, prefer_detour).unwrap();

    assert_eq!(report.region, vec!["S2"]);
    assert_eq!(report.task_input.iter().collect::<Vec<_>>(), vec!["B"]);
    assert_eq!(report.task_output.iter().collect::<Vec<_>>(), vec!["C"]);
    assert_eq!(report.inserted, vec!["T1", "T2"]);
    insta::assert_snapshot!(
        graph.to_string(),
        @"S1->T1{B} S3->end{D} T1->T2{X} T2->S3{C} start->S1{A}"
    );
    assert!(validate_graph(&graph).is_empty());
}

#[test]
fn construction_is_deterministic() {
    let tax = random_catalog(11);
    let weights = Weights::random(tax.service_count(), &mut ChaCha8Rng::seed_from_u64(3));
    let (a, _) = build(&tax, &["l0", "l1"], &["l9"], weights.clone()).unwrap();
    let (b, _) = build(&tax, &["l0", "l1"], &["l9"], weights).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn mutation_is_deterministic() {
    let tax = random_catalog(7);
    let weights = Weights::random(tax.service_count(), &mut ChaCha8Rng::seed_from_u64(1));
    let (graph, relevant) = build(&tax, &["l0", "l1"], &["l9"], weights).unwrap();
    let size = NonZeroUsize::new(2).unwrap();

    let mut a = graph.clone();
    let mut b = graph;
    let mut rng_a = ChaCha8Rng::seed_from_u64(42);
    let mut rng_b = ChaCha8Rng::seed_from_u64(42);
    for _ in 0..5 {
        let first = mutate(&mut a, size, &tax, &relevant, &mut rng_a);
        let second = mutate(&mut b, size, &tax, &relevant, &mut rng_b);
        assert_eq!(first, second);
        assert_eq!(a, b);
    }
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn tangled_catalogs_abort_and_roll_back() {
    let mut committed = 0;
    let mut aborted = 0;
    for seed in 0..40 {
        let tax = tangled_catalog(seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let Some((mut graph, relevant)) = tangled_graph(&tax, &mut rng) else {
            continue;
        };
        for _ in 0..15 {
            let size = NonZeroUsize::new(rng.gen_range(1..=3)).unwrap();
            let before = graph.clone();
            match mutate(&mut graph, size, &tax, &relevant, &mut rng) {
                Ok(_) => {
                    committed += 1;
                    assert!(validate_graph(&graph).is_empty(), "{}", graph);
                }
                Err(MutationError::InvariantViolated(violations)) => {
                    panic!("mutation produced an invalid graph: {:?}", violations)
                }
                Err(_) => {
                    aborted += 1;
                    assert_eq!(graph, before);
                    assert_eq!(graph.unused(), before.unused());
                }
            }
        }
    }
    assert!(committed > 0);
    assert!(aborted > 0);
}

#[test]
fn reference_graph_is_reproduced() {
    let tax = random_catalog(5);
    let weights = Weights::random(tax.service_count(), &mut ChaCha8Rng::seed_from_u64(9));
    let (parent, _) = build(&tax, &["l0", "l1"], &["l9"], weights).unwrap();

    let child = construct(
        &ServiceNode::start(["l0", "l1"]),
        &ServiceNode::end(["l9"]),
        &tax,
        CandidateSource::Reference(&parent),
        parent.weights().clone(),
    )
    .unwrap();
    assert!(validate_graph(&child).is_empty());
    for (_, node) in child.service_nodes() {
        assert!(parent.contains_name(&node.name), "{} not in parent", node.name);
    }
}

#[test]
fn graphs_serialize_to_json() {
    let tax = random_catalog(2);
    let weights = Weights::random(tax.service_count(), &mut ChaCha8Rng::seed_from_u64(2));
    let (graph, _) = build(&tax, &["l0", "l1"], &["l9"], weights).unwrap();
    let json = serde_json::to_string(&graph).unwrap();
    let back: CompositionGraph = serde_json::from_str(&json).unwrap();
    assert_eq!(back, graph);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn constructed_graphs_are_valid(catalog in any::<u64>(), seed in any::<u64>()) {
        let tax = random_catalog(catalog);
        let weights = Weights::random(tax.service_count(), &mut ChaCha8Rng::seed_from_u64(seed));
        let (mut graph, _) = build(&tax, &["l0", "l1"], &["l9"], weights).unwrap();

        prop_assert_eq!(validate_graph(&graph), Vec::<InvariantViolation>::new());

        let before = graph.clone();
        prop_assert!(prune(&mut graph).is_empty());
        prop_assert_eq!(graph, before);
    }

    #[test]
    fn mutation_keeps_graphs_valid(
        catalog in any::<u64>(),
        seed in any::<u64>(),
        size in 1usize..4,
        rounds in 1usize..6,
    ) {
        let tax = random_catalog(catalog);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let weights = Weights::random(tax.service_count(), &mut rng);
        let (mut graph, relevant) = build(&tax, &["l0", "l1"], &["l9"], weights).unwrap();
        let size = NonZeroUsize::new(size).unwrap();

        for _ in 0..rounds {
            let before = graph.clone();
            match mutate(&mut graph, size, &tax, &relevant, &mut rng) {
                Ok(_) => {
                    prop_assert_eq!(validate_graph(&graph), Vec::<InvariantViolation>::new());
                }
                Err(_) => {
                    prop_assert_eq!(&graph, &before);
                    prop_assert_eq!(graph.unused(), before.unused());
                }
            }
        }
    }

    #[test]
    fn tangled_mutation_keeps_graphs_valid_or_untouched(
        catalog in any::<u64>(),
        seed in any::<u64>(),
        size in 1usize..4,
        rounds in 1usize..8,
    ) {
        let tax = tangled_catalog(catalog);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let Some((mut graph, relevant)) = tangled_graph(&tax, &mut rng) else {
            return Ok(());
        };
        let size = NonZeroUsize::new(size).unwrap();

        for _ in 0..rounds {
            let before = graph.clone();
            match mutate(&mut graph, size, &tax, &relevant, &mut rng) {
                Ok(_) => {
                    prop_assert_eq!(validate_graph(&graph), Vec::<InvariantViolation>::new());
                }
                Err(err) => {
                    prop_assert!(
                        !matches!(err, MutationError::InvariantViolated(_)),
                        "invalid splice: {}",
                        err
                    );
                    prop_assert_eq!(&graph, &before);
                    prop_assert_eq!(graph.unused(), before.unused());
                }
            }
        }
    }

    #[test]
    fn failed_mutation_leaves_graph_untouched(catalog in any::<u64>(), seed in any::<u64>()) {
        let tax = random_catalog(catalog);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let weights = Weights::random(tax.service_count(), &mut rng);
        let (mut graph, _) = build(&tax, &["l0", "l1"], &["l9"], weights).unwrap();
        let fingerprint = graph.fingerprint();

        // Without relevant services only pass-through replacements can succeed.
        let nothing = IndexSet::new();
        if mutate(&mut graph, NonZeroUsize::MIN, &tax, &nothing, &mut rng).is_err() {
            prop_assert_eq!(graph.fingerprint(), fingerprint);
        } else {
            prop_assert_eq!(validate_graph(&graph), Vec::<InvariantViolation>::new());
        }
    }
}
