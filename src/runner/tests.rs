//! Runner tests

use super::*;
use crate::checkpoint::{load_checkpoint, save_checkpoint, HookState, LoadPolicy};
use crate::data::{DatasetStatCollector, InMemoryAnnotations};
use crate::hooks::{EmaHook, Hook, HookContext, HookEvent, ParamFreezeController, Priority};
use crate::loss::{LossReweighter, ReweightConfig};
use crate::model::{Segmentor, SyntheticBatch, SyntheticSegmentor};
use crate::optim::SGD;
use crate::{Error, Result};
use ndarray::array;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<(HookEvent, usize)>>>;

struct Recorder {
    name: String,
    log: Log,
    fail_at: Option<(HookEvent, usize)>,
}

impl Recorder {
    fn new(name: &str, log: &Log) -> Self {
        Self { name: name.to_string(), log: Arc::clone(log), fail_at: None }
    }
}

impl Hook for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn events(&self) -> &[HookEvent] {
        &HookEvent::ALL
    }

    fn handle(&mut self, event: HookEvent, ctx: &mut HookContext<'_>) -> Result<()> {
        self.log.lock().unwrap().push((event, ctx.iteration()));
        if self.fail_at == Some((event, ctx.iteration())) {
            return Err(Error::runtime(self.name.clone(), ctx.iteration(), "boom"));
        }
        Ok(())
    }
}

fn batch(_: &EventClock) -> Result<SyntheticBatch> {
    Ok(SyntheticBatch { target: 0.5 })
}

fn reweighter() -> LossReweighter {
    let mut initial_weights = BTreeMap::new();
    initial_weights.insert("decode_0.loss_seg".to_string(), 1.0);
    initial_weights.insert("decode_1.loss_seg".to_string(), 1.0);
    LossReweighter::new(ReweightConfig { enabled: true, momentum: 0.9, initial_weights, total: 1.0 }).unwrap()
}

fn full_runner(max_iters: usize, work_dir: &Path) -> TrainingRunner<SyntheticSegmentor> {
    let config = RunnerConfig::new(max_iters).with_checkpoints(work_dir, 2).with_grad_clip(40.0);
    let mut runner =
        TrainingRunner::new(SyntheticSegmentor::default(), Box::new(SGD::new(0.05, 0.9, 5e-4)), config);
    runner.set_reweighter(reweighter());
    runner
        .register_hook(ParamFreezeController::new(3, &[r"^backbone\."]).unwrap(), Priority::High)
        .unwrap();
    runner.register_hook(EmaHook::new(0.9, 1).unwrap(), Priority::Normal).unwrap();
    runner
}

#[test]
fn test_run_reaches_max_iterations() {
    let mut runner = TrainingRunner::new(
        SyntheticSegmentor::default(),
        Box::new(SGD::new(0.01, 0.0, 0.0)),
        RunnerConfig::new(5),
    );
    let result = runner.run(batch).unwrap();
    assert_eq!(result.final_iteration, 5);
    assert!(result.final_loss.is_some());
    assert!(runner.clock().is_finished());
    assert_eq!(result.weights.len(), 2);
}

#[test]
fn test_loss_decreases() {
    let mut runner = TrainingRunner::new(
        SyntheticSegmentor::default(),
        Box::new(SGD::new(0.05, 0.0, 0.0)),
        RunnerConfig::new(1),
    );
    let first = runner.run(batch).unwrap().final_loss.unwrap();

    let mut runner = TrainingRunner::new(
        SyntheticSegmentor::default(),
        Box::new(SGD::new(0.05, 0.0, 0.0)),
        RunnerConfig::new(50),
    );
    let last = runner.run(batch).unwrap().final_loss.unwrap();
    assert!(last < first);
}

#[test]
fn test_event_order_and_iterations() {
    let log = Log::default();
    let mut runner = TrainingRunner::new(
        SyntheticSegmentor::default(),
        Box::new(SGD::new(0.01, 0.0, 0.0)),
        RunnerConfig::new(2),
    );
    runner.register_hook(Recorder::new("recorder", &log), Priority::Normal).unwrap();
    runner.run(batch).unwrap();

    let events = log.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            (HookEvent::BeforeRun, 0),
            (HookEvent::BeforeIteration, 0),
            (HookEvent::AfterIteration, 0),
            (HookEvent::BeforeIteration, 1),
            (HookEvent::AfterIteration, 1),
            (HookEvent::AfterRun, 2),
        ]
    );
}

#[test]
fn test_checkpoints_at_interval_and_final() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let config = RunnerConfig::new(5).with_checkpoints(dir.path(), 2);
    let mut runner =
        TrainingRunner::new(SyntheticSegmentor::default(), Box::new(SGD::new(0.01, 0.0, 0.0)), config);
    runner.register_hook(Recorder::new("recorder", &log), Priority::Normal).unwrap();
    runner.run(batch).unwrap();

    for k in [2, 4, 5] {
        assert!(dir.path().join(format!("iter_{k}.json")).exists(), "iter_{k} missing");
    }
    assert!(!dir.path().join("iter_1.json").exists());

    let saves: Vec<usize> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|(e, _)| *e == HookEvent::BeforeSaveCheckpoint)
        .map(|(_, it)| *it)
        .collect();
    assert_eq!(saves, vec![2, 4, 5]);

    let ckpt = load_checkpoint(dir.path().join("iter_4.json")).unwrap();
    assert_eq!(ckpt.iteration(), 4);
    assert!(ckpt.hook_states.contains_key("loss_reweighter"));
}

#[test]
fn test_fetch_failure_halts_at_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunnerConfig::new(10).with_checkpoints(dir.path(), 2);
    let mut runner =
        TrainingRunner::new(SyntheticSegmentor::default(), Box::new(SGD::new(0.01, 0.0, 0.0)), config);

    let err = runner
        .run(|clock| {
            if clock.iteration() == 3 {
                Err(Error::state("loader", "corrupt batch"))
            } else {
                batch(clock)
            }
        })
        .unwrap_err();

    assert_eq!(err.iteration(), Some(3));
    assert_eq!(err.component(), "data_loader");
    assert_eq!(runner.clock().iteration(), 3);
    assert!(dir.path().join("iter_2.json").exists());
    assert!(!dir.path().join("iter_4.json").exists());
}

#[test]
fn test_hook_failure_aborts_run() {
    let log = Log::default();
    let mut runner = TrainingRunner::new(
        SyntheticSegmentor::default(),
        Box::new(SGD::new(0.01, 0.0, 0.0)),
        RunnerConfig::new(10),
    );
    let mut failing = Recorder::new("failing", &log);
    failing.fail_at = Some((HookEvent::AfterIteration, 2));
    runner.register_hook(failing, Priority::High).unwrap();
    let after = Log::default();
    runner.register_hook(Recorder::new("after", &after), Priority::Low).unwrap();

    match runner.run(batch).unwrap_err() {
        Error::Hook { hook, event, iteration, .. } => {
            assert_eq!(hook, "failing");
            assert_eq!(event, HookEvent::AfterIteration);
            assert_eq!(iteration, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    // the lower-priority hook never saw the failing event
    assert_eq!(after.lock().unwrap().last(), Some(&(HookEvent::BeforeIteration, 2)));
}

#[test]
fn test_reserved_hook_name_rejected() {
    let log = Log::default();
    let mut runner = TrainingRunner::new(
        SyntheticSegmentor::default(),
        Box::new(SGD::new(0.01, 0.0, 0.0)),
        RunnerConfig::new(1),
    );
    let err = runner.register_hook(Recorder::new("loss_reweighter", &log), Priority::Normal).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_unknown_reweighter_loss_rejected_before_run() {
    let mut initial_weights = BTreeMap::new();
    initial_weights.insert("aux.loss_ce".to_string(), 1.0);
    let mut runner = TrainingRunner::new(
        SyntheticSegmentor::default(),
        Box::new(SGD::new(0.01, 0.0, 0.0)),
        RunnerConfig::new(3),
    );
    runner.set_reweighter(
        LossReweighter::new(ReweightConfig { enabled: true, initial_weights, ..Default::default() }).unwrap(),
    );
    assert!(runner.run(batch).unwrap_err().is_config());
    assert_eq!(runner.clock().iteration(), 0);
}

#[test]
fn test_reweighted_weights_sum_to_total() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = full_runner(6, dir.path());
    let result = runner.run(batch).unwrap();
    let sum: f32 = result.weights.values().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    // the larger head gets the smaller weight
    assert!(result.weights["decode_0.loss_seg"] < result.weights["decode_1.loss_seg"]);
}

#[test]
fn test_calibration_required_before_run() {
    let mut runner = TrainingRunner::new(
        SyntheticSegmentor::default().with_calibration(3),
        Box::new(SGD::new(0.01, 0.0, 0.0)),
        RunnerConfig::new(2),
    );
    assert!(runner.run(batch).unwrap_err().is_config());

    let source = InMemoryAnnotations::new(vec![array![[0u8, 1, 2], [0, 0, 255]]], 3);
    let stats = runner.prepare_calibration(&source, &DatasetStatCollector::default()).unwrap().unwrap();
    assert_eq!(stats.total_pixels, 5);
    assert!(runner.model().class_statistics().is_some());
    assert!(runner.prepare_calibration(&source, &DatasetStatCollector::default()).is_err());

    assert_eq!(runner.run(batch).unwrap().final_iteration, 2);
}

#[test]
fn test_calibration_skipped_for_plain_model() {
    let mut runner = TrainingRunner::new(
        SyntheticSegmentor::default(),
        Box::new(SGD::new(0.01, 0.0, 0.0)),
        RunnerConfig::new(2),
    );
    let source = InMemoryAnnotations::new(Vec::new(), 3);
    assert!(runner.prepare_calibration(&source, &DatasetStatCollector::default()).unwrap().is_none());
    assert!(runner.class_statistics().is_none());
}

#[test]
fn test_resume_matches_uninterrupted_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut straight = full_runner(6, dir.path());
    straight.run(batch).unwrap();

    let resumed_dir = tempfile::tempdir().unwrap();
    let mut resumed = full_runner(6, resumed_dir.path());
    resumed.resume(dir.path().join("iter_2.json")).unwrap();
    assert_eq!(resumed.clock().iteration(), 2);
    assert_eq!(
        resumed.hooks().state_of("param_freeze"),
        Some(HookState::ParamFreeze { open_since: None })
    );
    resumed.run(batch).unwrap();

    assert_eq!(straight.model().params().snapshot(), resumed.model().params().snapshot());
    assert_eq!(straight.hooks().state_of("ema"), resumed.hooks().state_of("ema"));
    assert_eq!(straight.hooks().state_of("param_freeze"), Some(HookState::ParamFreeze { open_since: Some(3) }));
    assert_eq!(straight.hooks().state_of("param_freeze"), resumed.hooks().state_of("param_freeze"));
    assert_eq!(straight.reweighter().running_averages(), resumed.reweighter().running_averages());
}

#[test]
fn test_resume_fires_after_load_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    full_runner(2, dir.path()).run(batch).unwrap();

    let log = Log::default();
    let mut runner = full_runner(4, dir.path());
    runner.register_hook(Recorder::new("recorder", &log), Priority::Lowest).unwrap();
    runner.resume(dir.path().join("iter_2.json")).unwrap();
    assert_eq!(log.lock().unwrap().clone(), vec![(HookEvent::AfterLoadCheckpoint, 2)]);
}

#[test]
fn test_failed_strict_resume_leaves_runner_untouched() {
    let dir = tempfile::tempdir().unwrap();
    full_runner(2, dir.path()).run(batch).unwrap();
    let saved = load_checkpoint(dir.path().join("iter_2.json")).unwrap();

    let mut missing_param = saved.clone();
    missing_param.model_parameters.remove("neck.fuse.weight");
    let missing_path = dir.path().join("missing_param.json");
    save_checkpoint(&missing_param, &missing_path).unwrap();

    let mut wrong_hook_state = saved;
    wrong_hook_state.hook_states.insert("ema".to_string(), HookState::ParamFreeze { open_since: None });
    let wrong_path = dir.path().join("wrong_hook_state.json");
    save_checkpoint(&wrong_hook_state, &wrong_path).unwrap();

    for path in [missing_path, wrong_path] {
        let run_dir = tempfile::tempdir().unwrap();
        let mut runner = full_runner(4, run_dir.path());
        let before = runner.checkpoint();
        assert!(runner.resume(&path).unwrap_err().is_state_consistency());

        assert_eq!(runner.clock().iteration(), 0);
        assert!(runner.reweighter().running_averages().is_empty());
        assert_eq!(runner.checkpoint(), before);

        // the runner still trains exactly like one that never saw the checkpoint
        let fresh_dir = tempfile::tempdir().unwrap();
        let mut fresh = full_runner(4, fresh_dir.path());
        runner.run(batch).unwrap();
        fresh.run(batch).unwrap();
        assert_eq!(runner.checkpoint(), fresh.checkpoint());
    }
}

#[test]
fn test_strict_resume_rejects_unexpected_hook_state() {
    let dir = tempfile::tempdir().unwrap();
    full_runner(2, dir.path()).run(batch).unwrap();

    let config = RunnerConfig::new(4);
    let mut runner =
        TrainingRunner::new(SyntheticSegmentor::default(), Box::new(SGD::new(0.05, 0.9, 5e-4)), config);
    runner.set_reweighter(reweighter());
    runner.register_hook(EmaHook::new(0.9, 1).unwrap(), Priority::Normal).unwrap();
    let err = runner.resume(dir.path().join("iter_2.json")).unwrap_err();
    assert!(err.is_state_consistency() || err.is_config(), "{err}");

    let config = RunnerConfig::new(4).with_load_policy(LoadPolicy::Lenient);
    let mut lenient =
        TrainingRunner::new(SyntheticSegmentor::default(), Box::new(SGD::new(0.05, 0.9, 5e-4)), config);
    lenient.set_reweighter(reweighter());
    lenient.register_hook(EmaHook::new(0.9, 1).unwrap(), Priority::Normal).unwrap();
    lenient.resume(dir.path().join("iter_2.json")).unwrap();
    assert_eq!(lenient.clock().iteration(), 2);
}

#[test]
fn test_load_weights_ignores_matching_keys() {
    let dir = tempfile::tempdir().unwrap();
    let mut trained = full_runner(4, dir.path());
    trained.run(batch).unwrap();

    let mut fresh = TrainingRunner::new(
        SyntheticSegmentor::default(),
        Box::new(SGD::new(0.01, 0.0, 0.0)),
        RunnerConfig::new(1),
    );
    let before = fresh.model().params().snapshot();
    let ignore = [regex::Regex::new(r"^decode_head\.").unwrap()];
    let report = fresh.load_weights(dir.path().join("iter_4.json"), LoadPolicy::Strict, &ignore).unwrap();

    assert_eq!(report.ignored.len(), 2);
    let after = fresh.model().params().snapshot();
    let trained_params = trained.model().params().snapshot();
    assert_eq!(after["neck.fuse.weight"], trained_params["neck.fuse.weight"]);
    assert_eq!(after["decode_head.0.conv_seg.weight"], before["decode_head.0.conv_seg.weight"]);
    assert_eq!(fresh.clock().iteration(), 0);
}
