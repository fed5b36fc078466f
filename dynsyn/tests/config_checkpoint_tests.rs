//! Config -> layer -> checkpoint round trip, plus the episode-level
//! collaborators (wrappers, telemetry, traces) wired the way a rollout
//! loop uses them.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use dynsyn::{
    ActionBatch, CurriculumSchedule, DynSynError, EpisodeTrace, LayerCheckpoint, LayerConfig,
    LayerTelemetry, LayerVariant, TraceWriter, WrapperRegistry,
};

const CONFIG: &str = r#"
muscle_groups:
  - [0]
  - [3, 1, 2]
  - [5, 4]
hidden_dim: 4
log_std: -1.0
initial_weight_amp: 0.02
variant: ppo
seed: 42
schedule:
  kind: linear
  start: 0.0
  end: 0.08
  ramp_steps: 4
wrappers:
  - name: clip_action
    args: { low: -0.5, high: 0.5 }
"#;

#[test]
fn test_config_to_checkpoint_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("layer.yaml");
    std::fs::write(&config_path, CONFIG).unwrap();

    let cfg = LayerConfig::from_yaml_file(&config_path).unwrap();
    let layer = cfg.build_layer().unwrap();
    assert_eq!(layer.variant(), LayerVariant::Revert);
    assert_eq!(layer.weight_amp(), 0.02);

    // Same seed, same projection.
    let again = cfg.build_layer().unwrap();
    assert_eq!(layer.base().projection(), again.base().projection());

    let ckpt_path = dir.path().join("out").join("checkpoint.json");
    LayerCheckpoint::from_layer(&layer).save(&ckpt_path).unwrap();
    let restored = LayerCheckpoint::load(&ckpt_path)
        .unwrap()
        .into_layer()
        .unwrap();

    let x = ActionBatch::from_rows(&[vec![0.1, 0.9, -0.4], vec![-1.0, 0.0, 0.6]]).unwrap();
    let h = ActionBatch::from_rows(&[vec![0.1, 0.2, 0.3, 0.4], vec![-0.4, -0.3, -0.2, -0.1]])
        .unwrap();
    for deterministic in [true, false] {
        let a = layer
            .forward(&x, &h, deterministic, &mut ChaCha8Rng::seed_from_u64(3))
            .unwrap();
        let b = restored
            .forward(&x, &h, deterministic, &mut ChaCha8Rng::seed_from_u64(3))
            .unwrap();
        assert_eq!(a, b, "restored layer diverged (deterministic={})", deterministic);
        assert_eq!(restored.revert(&b).unwrap(), x);
    }
}

#[test]
fn test_checkpoint_keeps_mid_curriculum_amp() {
    let cfg = LayerConfig::from_yaml_str(CONFIG).unwrap();
    let layer = cfg.build_layer().unwrap();
    layer.update_weight_amp(0.07).unwrap();

    let json = LayerCheckpoint::from_layer(&layer).to_json().unwrap();
    let restored = LayerCheckpoint::from_json(&json).unwrap().into_layer().unwrap();
    assert_eq!(restored.weight_amp(), 0.07);
    assert_eq!(restored.base().log_std(), -1.0);
}

#[test]
fn test_checkpoint_with_foreign_tables_is_rejected() {
    let cfg = LayerConfig::from_yaml_str(CONFIG).unwrap();
    let layer = cfg.build_layer().unwrap();
    let mut ckpt = LayerCheckpoint::from_layer(&layer);
    // Tables built with followers ordered differently.
    ckpt.index.weight_indices.reverse();
    assert_eq!(
        ckpt.into_layer().unwrap_err(),
        DynSynError::CheckpointMismatch {
            field: "weight_indices"
        }
    );
}

#[test]
fn test_rollout_with_schedule_wrappers_telemetry_and_trace() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = LayerConfig::from_yaml_str(CONFIG).unwrap();
    let layer = cfg.build_layer().unwrap();
    let wrappers = cfg.build_wrappers(&WrapperRegistry::with_builtins()).unwrap();
    let schedule = cfg.effective_schedule();
    assert!(matches!(schedule, CurriculumSchedule::Linear { .. }));

    let telemetry_path = dir.path().join("telemetry.jsonl");
    let mut telemetry = LayerTelemetry::enable(telemetry_path.clone());
    let index = layer.base().index();
    let mut trace = EpisodeTrace::new(index.group_count, index.actuator_count);
    let mut rng = ChaCha8Rng::seed_from_u64(11);

    let mut previous = layer.weight_amp();
    for step in 0..6u64 {
        let amp = schedule.amp_at(step);
        layer.update_weight_amp(amp).unwrap();
        telemetry.log_amp_update(step, previous, amp);
        previous = amp;

        let x = ActionBatch::from_row(vec![0.9, -0.9, 0.3]);
        let h = ActionBatch::from_row(vec![step as f32 * 0.1; 4]);
        let (mut actions, stats) = layer.forward_with_stats(&x, &h, false, &mut rng).unwrap();
        assert_eq!(stats.amp, amp);
        telemetry.log_forward(&stats);

        wrappers.apply(&mut actions);
        assert!(actions.data().iter().all(|v| (-0.5..=0.5).contains(v)));
        trace
            .record_step(x.row(0), actions.row(0), layer.weight_amp())
            .unwrap();
    }
    telemetry.flush();
    assert_eq!(telemetry.records_written(), 12);

    let writer = TraceWriter::new(dir.path().join("traces"), "policy");
    writer.write(0, &trace).unwrap();
    assert!(writer.actions_path(0).exists());
    let summary = trace.summary();
    assert_eq!(summary.steps, 6);
    assert_eq!(summary.amp_first, Some(0.0));
    assert_eq!(summary.amp_last, Some(0.08));

    let lines = std::fs::read_to_string(&telemetry_path).unwrap();
    let records: Vec<serde_json::Value> = lines
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 12);
    assert_eq!(records[1]["record"], "forward");
    assert_eq!(records[1]["call_index"], 0);
}
