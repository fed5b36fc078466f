//! Layer property tests.
//!
//! Checks the index algebra and composition guarantees over randomly
//! generated muscle-group partitions (seeded, so failures reproduce):
//! - leaders and followers partition the actuators, |followers| = M - G
//! - ascending contiguous groups expand without reordering
//! - amp = 0 makes the layer output equal the plain expansion
//! - deterministic evaluation is bit-identical
//! - the bounded variant never leaves [-1, 1]
//! - revert(expand(x)) == x

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use dynsyn::{
    ActionBatch, BoundedDynSynLayer, DynSynLayer, LinearProjection, MuscleGroupSpec,
    RevertibleDynSynLayer,
};

const HIDDEN: usize = 6;

/// Random partition of `[0, m)` into groups, with shuffled membership.
fn random_groups(rng: &mut ChaCha8Rng, m: usize) -> Vec<Vec<usize>> {
    let mut actuators: Vec<usize> = (0..m).collect();
    actuators.shuffle(rng);
    let mut groups = Vec::new();
    let mut rest = actuators.as_slice();
    while !rest.is_empty() {
        let take = rng.gen_range(1..=rest.len().min(4));
        groups.push(rest[..take].to_vec());
        rest = &rest[take..];
    }
    groups.shuffle(rng);
    groups
}

fn layer_for(groups: Vec<Vec<usize>>, amp: f32, seed: u64) -> DynSynLayer {
    let spec = MuscleGroupSpec::new(groups);
    let c = spec.build().unwrap().compressed_dim;
    DynSynLayer::new(spec, LinearProjection::seeded(HIDDEN, c, seed), -1.0, amp).unwrap()
}

fn random_batch(rng: &mut ChaCha8Rng, rows: usize, width: usize, bound: f32) -> ActionBatch {
    let data = (0..rows * width)
        .map(|_| rng.gen_range(-bound..=bound))
        .collect();
    ActionBatch::new(data, width).unwrap()
}

#[test]
fn test_partition_invariant_random_specs() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    for _ in 0..200 {
        let m = rng.gen_range(1..20);
        let groups = random_groups(&mut rng, m);
        let idx = MuscleGroupSpec::new(groups.clone()).build().unwrap();

        assert_eq!(idx.actuator_count, m);
        assert_eq!(idx.group_count, groups.len());
        assert_eq!(idx.weight_indices.len(), m - groups.len());
        assert_eq!(idx.non_weight_indices.len(), groups.len());

        let mut seen = vec![0u8; m];
        for &a in idx.weight_indices.iter().chain(&idx.non_weight_indices) {
            seen[a] += 1;
        }
        assert!(
            seen.iter().all(|&n| n == 1),
            "groups {:?} do not partition [0, {})",
            groups,
            m
        );

        let mut placement = idx.placement_table.clone();
        placement.sort_unstable();
        assert_eq!(placement, (0..m).collect::<Vec<_>>(), "placement is a permutation");
    }
}

#[test]
fn test_contiguous_groups_expand_in_place() {
    let groups = vec![vec![0, 1], vec![2], vec![3, 4, 5, 6], vec![7]];
    let idx = MuscleGroupSpec::new(groups).build().unwrap();
    assert!(idx.is_identity_placement());
    assert_eq!(idx.placement_table, (0..8).collect::<Vec<_>>());
}

#[test]
fn test_expansion_routes_group_value_to_every_member() {
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    for _ in 0..50 {
        let m = rng.gen_range(1..16);
        let groups = random_groups(&mut rng, m);
        let layer = layer_for(groups.clone(), 0.0, 0);
        let x = random_batch(&mut rng, 3, groups.len(), 1.0);
        let y = layer.expand(&x).unwrap();
        for r in 0..x.rows() {
            for (g, group) in groups.iter().enumerate() {
                for &a in group {
                    assert_eq!(y.row(r)[a], x.row(r)[g], "actuator {} of group {}", a, g);
                }
            }
        }
    }
}

#[test]
fn test_zero_amp_is_a_no_op_for_any_sample() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for trial in 0..50 {
        let m = rng.gen_range(1..16);
        let groups = random_groups(&mut rng, m);
        let layer = layer_for(groups.clone(), 0.0, trial);
        let x = random_batch(&mut rng, 4, groups.len(), 1.0);
        let h = random_batch(&mut rng, 4, HIDDEN, 3.0);

        let expanded = layer.expand(&x).unwrap();
        let stochastic = layer.forward(&x, &h, false, &mut rng).unwrap();
        let deterministic = layer.forward(&x, &h, true, &mut rng).unwrap();
        assert_eq!(stochastic, expanded);
        assert_eq!(deterministic, expanded);
    }
}

#[test]
fn test_weights_stay_within_amp_band() {
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let layer = layer_for(vec![vec![0, 1, 2, 3], vec![4, 5]], 0.03, 7);
    let h = random_batch(&mut rng, 32, HIDDEN, 5.0);
    let w = layer.sample_weights(&h, false, &mut rng).unwrap();
    assert_eq!(w.width(), 4);
    for &v in w.data() {
        assert!((0.97..=1.03).contains(&v), "weight {} outside 1 ± 0.03", v);
    }

    // The inner 0.1 bound holds even when amp is larger.
    layer.update_weight_amp(5.0).unwrap();
    let w = layer.sample_weights(&h, false, &mut rng).unwrap();
    for &v in w.data() {
        assert!((0.9..=1.1).contains(&v), "weight {} outside 1 ± 0.1", v);
    }
}

#[test]
fn test_deterministic_forward_is_bit_identical() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let layer = layer_for(vec![vec![3, 1], vec![0], vec![2, 5, 4]], 0.1, 21);
    let x = random_batch(&mut rng, 8, 3, 1.0);
    let h = random_batch(&mut rng, 8, HIDDEN, 2.0);

    let a = layer.forward(&x, &h, true, &mut ChaCha8Rng::seed_from_u64(100)).unwrap();
    let b = layer.forward(&x, &h, true, &mut ChaCha8Rng::seed_from_u64(200)).unwrap();
    let a_bits: Vec<u32> = a.data().iter().map(|v| v.to_bits()).collect();
    let b_bits: Vec<u32> = b.data().iter().map(|v| v.to_bits()).collect();
    assert_eq!(a_bits, b_bits, "deterministic path must ignore the rng");
}

#[test]
fn test_stochastic_forward_reproducible_from_seed() {
    let mut rng = ChaCha8Rng::seed_from_u64(6);
    let layer = layer_for(vec![vec![0, 1, 2], vec![3, 4]], 0.1, 3);
    let x = random_batch(&mut rng, 2, 2, 1.0);
    let h = random_batch(&mut rng, 2, HIDDEN, 1.0);

    let a = layer.forward(&x, &h, false, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
    let b = layer.forward(&x, &h, false, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_bounded_variant_never_exceeds_unit_box() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for trial in 0..30 {
        let m = rng.gen_range(2..16);
        let groups = random_groups(&mut rng, m);
        let bounded = BoundedDynSynLayer::new(layer_for(groups.clone(), 0.1, trial));
        let x = random_batch(&mut rng, 16, groups.len(), 1.0);
        let h = random_batch(&mut rng, 16, HIDDEN, 10.0);
        let y = bounded.forward(&x, &h, false, &mut rng).unwrap();
        for &v in y.data() {
            assert!((-1.0..=1.0).contains(&v), "bounded output {} escaped [-1, 1]", v);
        }
    }
}

#[test]
fn test_revert_recovers_compressed_action() {
    let mut rng = ChaCha8Rng::seed_from_u64(8);
    for trial in 0..50 {
        let m = rng.gen_range(1..16);
        let groups = random_groups(&mut rng, m);
        let revert = RevertibleDynSynLayer::new(layer_for(groups.clone(), 0.0, trial));
        let x = random_batch(&mut rng, 5, groups.len(), 1.0);
        let h = random_batch(&mut rng, 5, HIDDEN, 1.0);

        let expanded = revert.base().expand(&x).unwrap();
        assert_eq!(revert.revert(&expanded).unwrap(), x, "groups {:?}", groups);

        // Leaders are never weighted, so this also holds with amp > 0.
        revert.base().update_weight_amp(0.1).unwrap();
        let y = revert.forward(&x, &h, false, &mut rng).unwrap();
        assert_eq!(revert.revert(&y).unwrap(), x);
    }
}

#[test]
fn test_concrete_singleton_plus_triple_scenario() {
    let layer = layer_for(vec![vec![0], vec![1, 2, 3]], 0.0, 0);
    let idx = layer.index();
    assert_eq!(
        (idx.actuator_count, idx.group_count, idx.compressed_dim),
        (4, 2, 2)
    );
    assert_eq!(idx.weight_indices, vec![2, 3]);
    assert_eq!(idx.non_weight_indices, vec![0, 1]);
    assert!(idx.is_identity_placement());

    let (a, b) = (0.4f32, -0.7f32);
    let x = ActionBatch::from_row(vec![a, b]);
    let h = ActionBatch::from_row(vec![0.5; HIDDEN]);
    assert_eq!(layer.expand(&x).unwrap().data(), &[a, b, b, b]);

    let mut rng = ChaCha8Rng::seed_from_u64(0);
    assert_eq!(layer.forward(&x, &h, false, &mut rng).unwrap().data(), &[a, b, b, b]);

    layer.update_weight_amp(0.05).unwrap();
    let w = layer
        .sample_weights(&h, true, &mut ChaCha8Rng::seed_from_u64(0))
        .unwrap();
    let y = layer
        .forward(&x, &h, true, &mut ChaCha8Rng::seed_from_u64(0))
        .unwrap();
    let (w0, w1) = (w.data()[0], w.data()[1]);
    assert_eq!(y.data(), &[a, b, b * w0, b * w1]);
}

#[test]
fn test_shape_errors_are_reported() {
    let layer = layer_for(vec![vec![0], vec![1, 2]], 0.0, 0);
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let good_h = ActionBatch::from_row(vec![0.0; HIDDEN]);

    let wrong_x = ActionBatch::from_row(vec![0.0; 3]);
    assert!(layer.forward(&wrong_x, &good_h, true, &mut rng).is_err());

    let good_x = ActionBatch::from_row(vec![0.0; 2]);
    let wrong_h = ActionBatch::from_row(vec![0.0; HIDDEN + 1]);
    assert!(layer.forward(&good_x, &wrong_h, true, &mut rng).is_err());

    let revert = RevertibleDynSynLayer::new(layer);
    assert!(revert.revert(&ActionBatch::from_row(vec![0.0; 2])).is_err());
}

#[test]
fn test_all_singleton_groups_have_no_followers() {
    let layer = layer_for(vec![vec![1], vec![0], vec![2]], 0.1, 0);
    assert_eq!(layer.compressed_dim(), 0);
    let x = ActionBatch::new(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3).unwrap();
    let h = ActionBatch::zeros(2, HIDDEN);
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let (y, stats) = layer.forward_with_stats(&x, &h, false, &mut rng).unwrap();
    assert_eq!(y.data(), &[0.2, 0.1, 0.3, 0.5, 0.4, 0.6]);
    assert_eq!(stats.weight_min, None);
}
