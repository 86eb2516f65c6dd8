//! Multilevel graph coarsening by heavy-edge matching.
//!
//! Each level pairs every node with at most one neighbour and contracts the
//! pairs into coarse nodes:
//!
//! ```text
//! 1. deg[u]   = Σ_v A[u,v] + internal[u]
//! 2. visit    u by decreasing deg, ties by ascending index
//! 3. partner  v = argmax  A[u,v] / (deg[u] + deg[v])   over unmatched neighbours
//!               (ties → smallest v; none → u stays a singleton)
//! 4. contract coarse A[c,d] = Σ A[u,v], u ∈ c, v ∈ d
//! 5. pad      coarse node count up to the next power of two
//! ```
//!
//! Weight inside a cluster is kept as the coarse node's *internal weight*: it
//! feeds the next level's degree, never the adjacency (no self-loops).
//!
//! Padding nodes are isolated and always sit at the tail of a level. They
//! carry the null signal and are left out of the next level's matching. The
//! finest level is padded too whenever at least one level is requested, so
//! node counts never grow from one level to the next.
//!
//! Every step iterates in index order or through a `BTreeMap`, so the same
//! input always produces bit-identical graphs and maps.

use std::collections::BTreeMap;

use ndarray::ArrayView2;

use crate::error::Result;
use crate::graph::Graph;
use crate::pooling_map::{PoolingMap, PAD};

// ─────────────────────────────────────────────
// Level / Hierarchy
// ─────────────────────────────────────────────

/// One level of the coarsening hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub graph: Graph,
    /// Nodes `0..real_nodes` carry signal; the rest are padding.
    pub real_nodes: usize,
    /// Edge weight collapsed into each node by earlier contractions.
    pub internal_weight: Vec<f64>,
}

impl Level {
    /// Finest level: the input graph, no padding, nothing collapsed.
    pub fn root(graph: Graph) -> Self {
        let n = graph.node_count();
        Self { graph, real_nodes: n, internal_weight: vec![0.0; n] }
    }

    /// Finest level with isolated tail nodes up to the next power of two.
    pub fn padded_root(graph: &Graph) -> Self {
        let n = graph.node_count();
        let target = if n == 0 { 0 } else { n.next_power_of_two() };
        Self {
            graph: graph.with_padding(target - n),
            real_nodes: n,
            internal_weight: vec![0.0; target],
        }
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn padding(&self) -> usize {
        self.node_count() - self.real_nodes
    }
}

/// Graphs of every level plus the pooling maps between them.
///
/// `maps[i]` has one row per node of `levels[i + 1]` and indexes nodes of
/// `levels[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Hierarchy {
    levels: Vec<Level>,
    maps: Vec<PoolingMap>,
}

impl Hierarchy {
    pub(crate) fn from_parts(levels: Vec<Level>, maps: Vec<PoolingMap>) -> Self {
        debug_assert_eq!(levels.len(), maps.len() + 1);
        Self { levels, maps }
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn maps(&self) -> &[PoolingMap] {
        &self.maps
    }

    pub fn graphs(&self) -> impl Iterator<Item = &Graph> + '_ {
        self.levels.iter().map(|l| &l.graph)
    }

    /// Node count per level, finest first.
    pub fn node_counts(&self) -> Vec<usize> {
        self.levels.iter().map(Level::node_count).collect()
    }

    /// Number of pooling steps.
    pub fn depth(&self) -> usize {
        self.maps.len()
    }

    pub fn into_parts(self) -> (Vec<Level>, Vec<PoolingMap>) {
        (self.levels, self.maps)
    }
}

// ─────────────────────────────────────────────
// Coarsening
// ─────────────────────────────────────────────

/// Coarsen `graph` `levels` times.
///
/// Returns `levels + 1` levels and `levels` pooling maps. With `levels == 0`
/// the hierarchy holds the input graph alone; otherwise level 0 is the input
/// graph padded to a power of two, and signals must be zero-padded to match.
pub fn coarsen(graph: &Graph, levels: usize) -> Hierarchy {
    let mut out_levels = Vec::with_capacity(levels + 1);
    let mut maps = Vec::with_capacity(levels);
    out_levels.push(if levels == 0 {
        Level::root(graph.clone())
    } else {
        Level::padded_root(graph)
    });

    for depth in 0..levels {
        let fine = &out_levels[depth];
        let (coarse, map) = coarsen_level(fine);
        tracing::debug!(
            level = depth + 1,
            fine = fine.node_count(),
            coarse = coarse.real_nodes,
            padded = coarse.node_count(),
            "coarsened graph level"
        );
        maps.push(map);
        out_levels.push(coarse);
    }

    Hierarchy::from_parts(out_levels, maps)
}

/// Validate a dense adjacency, then [`coarsen`] it.
pub fn coarsen_dense(adjacency: ArrayView2<'_, f64>, levels: usize) -> Result<Hierarchy> {
    let graph = Graph::from_dense(adjacency)?;
    Ok(coarsen(&graph, levels))
}

/// Heavy-edge matching over the real nodes of `level`.
///
/// Returns clusters in visit order: `[u, v]` for a pair, `[u, PAD]` for a
/// singleton.
pub fn heavy_edge_matching(level: &Level) -> Vec<[usize; 2]> {
    let n = level.real_nodes;
    let graph = &level.graph;

    let degree: Vec<f64> = (0..n)
        .map(|i| graph.degree(i) + level.internal_weight[i])
        .collect();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| degree[b].total_cmp(&degree[a]).then(a.cmp(&b)));

    let mut matched = vec![false; n];
    let mut clusters = Vec::with_capacity(n);

    for u in order {
        if matched[u] {
            continue;
        }
        matched[u] = true;

        // Neighbours come in ascending order, so a strict `>` keeps the
        // smallest index among equal scores.
        let mut best: Option<(usize, f64)> = None;
        for (v, w) in graph.neighbors(u) {
            if v >= n || matched[v] {
                continue;
            }
            let score = w / (degree[u] + degree[v]);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((v, score));
            }
        }

        match best {
            Some((v, _)) => {
                matched[v] = true;
                clusters.push([u, v]);
            }
            None => clusters.push([u, PAD]),
        }
    }

    clusters
}

/// Contract one level. Returns the coarse level and the map back to `fine`.
fn coarsen_level(fine: &Level) -> (Level, PoolingMap) {
    let clusters = heavy_edge_matching(fine);
    let real = clusters.len();
    let padded = if real == 0 { 0 } else { real.next_power_of_two() };

    let mut owner = vec![PAD; fine.real_nodes];
    for (c, members) in clusters.iter().enumerate() {
        for &m in members.iter().filter(|&&m| m != PAD) {
            owner[m] = c;
        }
    }

    // Each undirected fine edge is visited once (u < v) and summed under the
    // canonical (low, high) coarse pair, so A[c,d] and A[d,c] are the same
    // float, not two sums taken in different orders.
    let mut internal = vec![0.0; padded];
    let mut crossing: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for u in 0..fine.real_nodes {
        let c = owner[u];
        internal[c] += fine.internal_weight[u];
        // Padding nodes are isolated, so `v` is always real.
        for (v, w) in fine.graph.neighbors(u).filter(|&(v, _)| v > u) {
            let d = owner[v];
            if c == d {
                internal[c] += 2.0 * w;
            } else {
                *crossing.entry((c.min(d), c.max(d))).or_insert(0.0) += w;
            }
        }
    }

    let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); padded];
    for ((c, d), w) in crossing {
        rows[c].push((d, w));
        rows[d].push((c, w));
    }

    let mut pairs = clusters;
    pairs.resize(padded, [PAD, PAD]);

    let coarse = Level {
        graph: Graph::from_rows(rows),
        real_nodes: real,
        internal_weight: internal,
    };
    let map = PoolingMap::from_pairs(fine.node_count(), &pairs);
    (coarse, map)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
