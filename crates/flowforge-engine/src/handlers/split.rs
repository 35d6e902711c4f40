//! SPLIT - deterministic train/test partitioning.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use flowforge_core::{EngineResult, WorkflowNode};

use super::{node_err, require_data};
use crate::context::{ExecutionContext, SplitData};

const DEFAULT_TEST_SIZE: f64 = 0.2;
const DEFAULT_SEED: u64 = 42;

pub fn execute(
    ctx: &mut ExecutionContext,
    node: &WorkflowNode,
    _upstream: &[&str],
) -> EngineResult<()> {
    let test_size = node.config_f64("test_size").unwrap_or(DEFAULT_TEST_SIZE);
    let shuffle = node.config_bool("shuffle").unwrap_or(true);
    let stratify = node.config_bool("stratify").unwrap_or(false);
    let seed = node.config_u64("random_seed").unwrap_or(DEFAULT_SEED);

    let target = ctx
        .target_column
        .clone()
        .ok_or_else(|| node_err(node, "no target column set by an upstream DATASET node"))?;
    let data = require_data(ctx, node)?;
    let (x, y, feature_names) = data
        .features_and_target(&target)
        .map_err(|e| node_err(node, e.to_string()))?;

    let n = y.len();
    if n < 2 {
        return Err(node_err(node, "dataset has fewer than two rows"));
    }
    let n_test = ((test_size * n as f64).round() as usize).clamp(1, n - 1);

    let classification = ctx
        .problem_type
        .map(|p| p.is_classification())
        .unwrap_or(false);

    let test_indices: Vec<usize> = if stratify && classification {
        stratified_test_indices(&y, test_size, shuffle, seed)
    } else {
        let mut indices: Vec<usize> = (0..n).collect();
        if shuffle {
            let mut rng = StdRng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
        }
        indices.into_iter().take(n_test).collect()
    };

    let is_test = {
        let mut mask = vec![false; n];
        for &i in &test_indices {
            mask[i] = true;
        }
        mask
    };

    let mut split = SplitData::default();
    for i in 0..n {
        if is_test[i] {
            split.x_test.push(x[i].clone());
            split.y_test.push(y[i]);
        } else {
            split.x_train.push(x[i].clone());
            split.y_train.push(y[i]);
        }
    }

    tracing::debug!(
        execution_id = %ctx.execution_id,
        node_id = %node.id,
        train = split.y_train.len(),
        test = split.y_test.len(),
        seed,
        stratify,
        "Data split"
    );

    ctx.feature_names = feature_names;
    ctx.split = Some(split);
    Ok(())
}

/// Per-class proportional sampling. Each class contributes
/// `round(test_size * class_count)` rows, so class balance carries over into
/// the test set.
fn stratified_test_indices(y: &[f64], test_size: f64, shuffle: bool, seed: u64) -> Vec<usize> {
    let mut classes: Vec<f64> = y.iter().copied().filter(|v| !v.is_nan()).collect();
    classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    classes.dedup();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut test_indices = Vec::new();
    for class in classes {
        let mut members: Vec<usize> = (0..y.len()).filter(|&i| y[i] == class).collect();
        if shuffle {
            members.shuffle(&mut rng);
        }
        let take = ((test_size * members.len() as f64).round() as usize).min(members.len());
        test_indices.extend(members.into_iter().take(take));
    }
    test_indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stratified_sampling_keeps_class_balance() {
        // 60 zeros, 40 ones, 20% test -> 12 zeros + 8 ones.
        let mut y = vec![0.0; 60];
        y.extend(vec![1.0; 40]);

        let test = stratified_test_indices(&y, 0.2, true, 7);
        assert_eq!(test.len(), 20);
        let ones = test.iter().filter(|&&i| y[i] == 1.0).count();
        assert_eq!(ones, 8);
    }

    #[test]
    fn stratified_sampling_is_deterministic_per_seed() {
        let mut y = vec![0.0; 30];
        y.extend(vec![1.0; 30]);
        assert_eq!(
            stratified_test_indices(&y, 0.3, true, 11),
            stratified_test_indices(&y, 0.3, true, 11)
        );
        assert_ne!(
            stratified_test_indices(&y, 0.3, true, 11),
            stratified_test_indices(&y, 0.3, true, 12)
        );
    }
}
