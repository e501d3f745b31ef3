//! Checkpoint round trips through the public API

use segmentar::checkpoint::{load_checkpoint, save_checkpoint, HookState, LoadPolicy};
use segmentar::config::{build_runner, parse_config, restore_from_spec, RunSpec};
use segmentar::model::{Segmentor, SyntheticBatch, SyntheticHead, SyntheticSegmentor};
use segmentar::runner::{EventClock, TrainingRunner};
use segmentar::Result;
use std::path::Path;

fn batch(clock: &EventClock) -> Result<SyntheticBatch> {
    // varies with the iteration so a misaligned resume shows up
    Ok(SyntheticBatch { target: 0.5 + 0.01 * (clock.iteration() % 7) as f32 })
}

fn spec(work_dir: &Path, max_iters: usize) -> RunSpec {
    let yaml = format!(
        r#"
runner:
  max_iters: {max_iters}
  checkpoint_interval: 25
  iters_per_epoch: 10
  work_dir: {}
optimizer:
  lr: 0.01
  momentum: 0.9
  weight_decay: 0.0005
  grad_clip: 40.0
lr_config:
  fixed_iters: 20
  fixed_ratio: 10.0
  warmup_iters: 30
  warmup_ratio: 0.01
  steps: [80]
params_config:
  open_after_iterations: 40
  name_patterns: ['^backbone\.']
ema:
  momentum: 0.95
  warmup_iterations: 5
  interval: 2
reweighter:
  enabled: true
  momentum: 0.9
  initial_weights:
    decode_0.loss_seg: 1.0
    decode_1.loss_seg: 0.4
"#,
        work_dir.display()
    );
    parse_config(&yaml).expect("valid config")
}

fn runner(spec: &RunSpec) -> TrainingRunner<SyntheticSegmentor> {
    build_runner(spec, SyntheticSegmentor::default()).expect("runner should build")
}

#[test]
fn test_resume_is_indistinguishable_from_uninterrupted_run() {
    let straight_dir = tempfile::tempdir().expect("tempdir");
    let mut straight = runner(&spec(straight_dir.path(), 100));
    straight.run(batch).expect("straight run");

    // interrupted before the freeze opens, resumed past every transition
    let resumed_dir = tempfile::tempdir().expect("tempdir");
    let mut resumed_spec = spec(resumed_dir.path(), 100);
    resumed_spec.resume_from = Some(straight_dir.path().join("iter_25.json"));
    let mut resumed = runner(&resumed_spec);
    restore_from_spec(&mut resumed, &resumed_spec).expect("resume");
    assert_eq!(resumed.clock().iteration(), 25);
    assert_eq!(resumed.clock().epoch(), 2);
    resumed.run(batch).expect("resumed run");

    let a = load_checkpoint(straight_dir.path().join("iter_100.json")).expect("straight checkpoint");
    let b = load_checkpoint(resumed_dir.path().join("iter_100.json")).expect("resumed checkpoint");
    assert_eq!(a.clock, b.clock);
    assert_eq!(a.model_parameters, b.model_parameters);
    assert_eq!(a.optimizer_state, b.optimizer_state);
    assert_eq!(a.hook_states, b.hook_states);
    assert_eq!(a.hook_states["param_freeze"], HookState::ParamFreeze { open_since: Some(40) });
}

#[test]
fn test_resume_after_freeze_opened_keeps_groups_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    runner(&spec(dir.path(), 50)).run(batch).expect("first run");

    let mut resumed_spec = spec(dir.path(), 60);
    resumed_spec.resume_from = Some(dir.path().join("iter_50.json"));
    let mut resumed = runner(&resumed_spec);
    restore_from_spec(&mut resumed, &resumed_spec).expect("resume");
    resumed.run(batch).expect("resumed run");

    let params = resumed.model().params();
    assert!(params.get("backbone.stem.weight").expect("backbone").requires_grad());
    assert_eq!(
        resumed.hooks().state_of("param_freeze"),
        Some(HookState::ParamFreeze { open_since: Some(40) })
    );
}

#[test]
fn test_corrupted_freeze_state_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    runner(&spec(dir.path(), 25)).run(batch).expect("first run");

    // claims the groups opened although iteration 25 is below the threshold
    let path = dir.path().join("iter_25.json");
    let mut checkpoint = load_checkpoint(&path).expect("checkpoint");
    checkpoint
        .hook_states
        .insert("param_freeze".to_string(), HookState::ParamFreeze { open_since: Some(40) });
    save_checkpoint(&checkpoint, &path).expect("rewrite");

    let mut resumed_spec = spec(dir.path(), 50);
    resumed_spec.resume_from = Some(path);
    let mut resumed = runner(&resumed_spec);
    restore_from_spec(&mut resumed, &resumed_spec).expect("state loads");
    let err = resumed.run(batch).expect_err("inconsistent state must halt");
    assert!(err.is_state_consistency(), "{err}");
    assert_eq!(resumed.clock().iteration(), 25);
}

#[test]
fn test_load_from_into_model_with_different_heads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut source = runner(&spec(dir.path(), 25));
    source.run(batch).expect("source run");
    let trained_neck = source.model().params().get("neck.fuse.weight").expect("neck").data().to_vec();

    let heads = vec![SyntheticHead {
        loss_name: "decode_0.loss_seg".to_string(),
        param_name: "decode_head.0.conv_seg.weight".to_string(),
        scale: 1.0,
    }];
    let target_model =
        SyntheticSegmentor::new(&["backbone.stem.weight", "backbone.aggregator.weight", "neck.fuse.weight"], heads);

    let mut target_spec = parse_config("runner:\n  max_iters: 5\n").expect("valid config");
    target_spec.load_from = Some(dir.path().join("iter_25.json"));
    target_spec.ignore_keys = vec![r"^decode_head\.".to_string()];
    let mut target = build_runner(&target_spec, target_model).expect("runner should build");
    restore_from_spec(&mut target, &target_spec).expect("strict load with ignored heads");

    assert_eq!(target.clock().iteration(), 0);
    assert_eq!(target.model().params().get("neck.fuse.weight").expect("neck").data().to_vec(), trained_neck);

    // without the ignore list the extra head is an unexpected key
    target_spec.ignore_keys.clear();
    let mut strict = build_runner(&target_spec, SyntheticSegmentor::new(&["neck.fuse.weight"], Vec::new()))
        .expect("runner should build");
    assert!(restore_from_spec(&mut strict, &target_spec).is_err());

    target_spec.load_policy = LoadPolicy::Lenient;
    let mut lenient = build_runner(&target_spec, SyntheticSegmentor::new(&["neck.fuse.weight"], Vec::new()))
        .expect("runner should build");
    restore_from_spec(&mut lenient, &target_spec).expect("lenient load");
    assert_eq!(lenient.model().params().get("neck.fuse.weight").expect("neck").data().to_vec(), trained_neck);
}
