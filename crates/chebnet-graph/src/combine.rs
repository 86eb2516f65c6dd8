//! Merge consecutive coarsening levels into coarser pooling steps.
//!
//! Binary coarsening halves the node count per level. Grouping `factor`
//! levels lets one pooling call reduce by `2^factor`, e.g. `factor = 2`
//! turns four binary levels into two 4-way pooling steps.

use crate::coarsen::Hierarchy;
use crate::error::{GraphError, Result};

/// Keep every `factor`-th level and compose the maps in between.
pub fn combine(hierarchy: &Hierarchy, factor: usize) -> Result<Hierarchy> {
    if factor == 0 {
        return Err(GraphError::Configuration("combine factor must be ≥ 1".into()));
    }
    let maps = hierarchy.maps();
    if maps.len() % factor != 0 {
        return Err(GraphError::Configuration(format!(
            "{} pooling maps cannot be grouped by {factor}",
            maps.len()
        )));
    }

    let levels = hierarchy.levels().iter().step_by(factor).cloned().collect();

    let mut combined = Vec::with_capacity(maps.len() / factor);
    for group in maps.chunks(factor) {
        let mut map = group[0].clone();
        for next in &group[1..] {
            map = map.compose(next)?;
        }
        combined.push(map);
    }

    tracing::debug!(
        factor,
        before = maps.len(),
        after = combined.len(),
        "combined pooling levels"
    );

    Ok(Hierarchy::from_parts(levels, combined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coarsen::coarsen;
    use crate::graph::Graph;
    use crate::pooling_map::PAD;
    use ndarray::array;

    fn path4() -> Graph {
        Graph::from_dense(
            array![
                [0.0, 1.0, 1.0, 0.0],
                [1.0, 0.0, 0.0, 1.0],
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
            ]
            .view(),
        )
        .unwrap()
    }

    #[test]
    fn factor_two_over_four_levels() {
        let h = coarsen(&path4(), 4);
        let c = combine(&h, 2).unwrap();
        assert_eq!(c.node_counts(), vec![4, 1, 1]);
        assert_eq!(c.depth(), 2);

        let first = &c.maps()[0];
        assert_eq!(first.width(), 4);
        assert_eq!(first.fine_nodes(), 4);
        assert_eq!(first.entry(0), &[0, 2, 1, 3]);

        let second = &c.maps()[1];
        assert_eq!(second.entry(0), &[0, PAD, PAD, PAD]);
    }

    #[test]
    fn factor_one_is_identity() {
        let h = coarsen(&path4(), 3);
        assert_eq!(combine(&h, 1).unwrap(), h);
    }

    #[test]
    fn rejects_zero_factor() {
        let h = coarsen(&path4(), 2);
        assert!(matches!(combine(&h, 0), Err(GraphError::Configuration(_))));
    }

    #[test]
    fn rejects_uneven_grouping() {
        let h = coarsen(&path4(), 3);
        assert!(matches!(combine(&h, 2), Err(GraphError::Configuration(_))));
    }

    #[test]
    fn zero_levels_combine_to_input() {
        let h = coarsen(&path4(), 0);
        let c = combine(&h, 3).unwrap();
        assert_eq!(c.levels().len(), 1);
        assert!(c.maps().is_empty());
    }
}
