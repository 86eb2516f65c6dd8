//! Property tests for the coarsening hierarchy and the rescaled Laplacian.
//!
//! Covers:
//! - Determinism of repeated coarsening
//! - Pooling map coverage (every real fine node pooled exactly once)
//! - Power-of-two level sizes (finest level included) and non-increasing node counts
//! - Symmetry / zero diagonal of every coarse graph
//! - Spectral radius of the rescaled Laplacian
//! - Coverage preserved by the level combiner

use chebnet_graph::{build_laplacian, coarsen, combine, Graph, Hierarchy, LambdaMax, PAD};
use ndarray::Array2;
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────────

fn arb_graph() -> impl Strategy<Value = Graph> {
    (1usize..24).prop_flat_map(|n| {
        prop::collection::vec((0..n, 0..n, 0.1f64..4.0), 0..(3 * n)).prop_map(move |edges| {
            let mut a = Array2::<f64>::zeros((n, n));
            for (i, j, w) in edges {
                if i != j {
                    a[[i, j]] = w;
                    a[[j, i]] = w;
                }
            }
            Graph::from_dense(a.view()).expect("generated adjacency is valid")
        })
    })
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Every real fine node of map `i` is pooled by exactly one slot, and padding
/// nodes never are.
fn assert_coverage(h: &Hierarchy) {
    for (i, map) in h.maps().iter().enumerate() {
        let fine = &h.levels()[i];
        let coarse = &h.levels()[i + 1];
        assert_eq!(map.fine_nodes(), fine.node_count());
        assert_eq!(map.coarse_nodes(), coarse.node_count());

        let mut hits = vec![0usize; fine.node_count()];
        for &s in map.slots().iter().filter(|&&s| s != PAD) {
            hits[s] += 1;
        }
        for (node, &count) in hits.iter().enumerate() {
            let expected = usize::from(node < fine.real_nodes);
            assert_eq!(count, expected, "level {i}: node {node} pooled {count} times");
        }
        for row in coarse.real_nodes..coarse.node_count() {
            assert!(map.entry(row).iter().all(|&s| s == PAD), "padding row {row} references a node");
        }
    }
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn coarsening_is_deterministic(g in arb_graph(), levels in 0usize..5) {
        prop_assert_eq!(coarsen(&g, levels), coarsen(&g, levels));
    }

    #[test]
    fn maps_cover_real_nodes_once(g in arb_graph(), levels in 1usize..5) {
        assert_coverage(&coarsen(&g, levels));
    }

    #[test]
    fn level_sizes_are_powers_of_two_and_shrink(g in arb_graph(), levels in 1usize..6) {
        let h = coarsen(&g, levels);
        let counts = h.node_counts();
        prop_assert_eq!(counts.len(), levels + 1);
        prop_assert!(counts[0] >= g.node_count());
        for &c in &counts {
            prop_assert!(c.is_power_of_two(), "count {} is not a power of two", c);
        }
        for w in counts.windows(2) {
            prop_assert!(w[1] <= w[0], "node count grew: {:?}", counts);
        }
        for pair in h.levels().windows(2) {
            let (fine, coarse) = (&pair[0], &pair[1]);
            prop_assert!(coarse.real_nodes <= fine.real_nodes);
            if fine.graph.edge_count() > 0 {
                prop_assert!(coarse.real_nodes < fine.real_nodes);
            }
        }
    }

    #[test]
    fn coarse_graphs_stay_symmetric(g in arb_graph(), levels in 1usize..5) {
        for graph in coarsen(&g, levels).graphs() {
            let dense = graph.to_dense();
            prop_assert_eq!(&dense, &dense.t().to_owned());
            prop_assert!(dense.diag().iter().all(|&d| d == 0.0));
        }
    }

    #[test]
    fn total_weight_is_conserved(g in arb_graph(), levels in 1usize..5) {
        // Edge weight either crosses clusters or collapses into internal weight.
        let h = coarsen(&g, levels);
        let mass = |i: usize| {
            let level = &h.levels()[i];
            level.graph.degrees().iter().sum::<f64>() + level.internal_weight.iter().sum::<f64>()
        };
        let root = mass(0);
        for i in 1..=levels {
            prop_assert!((mass(i) - root).abs() <= 1e-9 * root.max(1.0));
        }
    }

    #[test]
    fn rescaled_spectral_radius_at_most_one(g in arb_graph()) {
        let lap = build_laplacian(&g, LambdaMax::Bound);
        let rho = lap.spectral_radius(100);
        prop_assert!(rho <= 1.0 + 1e-4, "spectral radius {}", rho);
    }

    #[test]
    fn estimated_spectrum_stays_in_unit_interval(
        g in arb_graph(),
        (iterations, tolerance) in prop_oneof![Just((100usize, 1e-3)), Just((30usize, 1e-6)), Just((1000usize, 1e-9))],
    ) {
        let lap = build_laplacian(&g, LambdaMax::Estimate { iterations, tolerance });
        prop_assert!(lap.lambda_max() > 0.0 && lap.lambda_max() <= 2.0);
        let rho = lap.spectral_radius(1000);
        prop_assert!(rho <= 1.0 + 1e-3, "spectral radius {}", rho);
    }

    #[test]
    fn combined_maps_cover_each_fine_node_once(g in arb_graph(), factor in 1usize..4, groups in 1usize..3) {
        let h = coarsen(&g, factor * groups);
        let c = combine(&h, factor).unwrap();
        prop_assert_eq!(c.depth(), groups);
        prop_assert_eq!(c.levels().len(), groups + 1);
        for (i, map) in c.maps().iter().enumerate() {
            prop_assert_eq!(map.width(), 1 << factor);
            prop_assert_eq!(map.covered(), c.levels()[i].real_nodes);
        }
        assert_coverage(&c);
    }
}

#[test]
fn readme_example_scenario() {
    let a = ndarray::array![
        [0.0, 1.0, 1.0, 0.0],
        [1.0, 0.0, 0.0, 1.0],
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
    ];
    let h = chebnet_graph::coarsen_dense(a.view(), 1).unwrap();
    assert_eq!(h.node_counts(), vec![4, 2]);
    let owner = h.maps()[0].assignment();
    assert_eq!(owner, vec![Some(0), Some(1), Some(0), Some(1)]);
}
