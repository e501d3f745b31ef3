//! Train command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{
    build_runner, build_stat_collector, load_config, restore_from_spec, validate_config, RunSpec,
    TrainArgs,
};
use crate::data::InMemoryAnnotations;
use crate::model::{SyntheticBatch, SyntheticSegmentor};
use ndarray::Array2;

/// Side length of the generated annotation maps
const ANNOTATION_SIDE: usize = 16;

/// Number of generated annotation maps
const ANNOTATION_ITEMS: usize = 4;

pub fn run_train(args: TrainArgs, level: LogLevel) -> Result<(), String> {
    log(level, LogLevel::Normal, &format!("Segmentar: training from {}", args.config.display()));

    let mut spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    apply_overrides(&mut spec, &args);
    validate_config(&spec).map_err(|e| format!("Config error: {e}"))?;

    if args.dry_run {
        log(level, LogLevel::Normal, "Dry run - config validated successfully");
        log(level, LogLevel::Verbose, &format!("  Max iterations: {}", spec.runner.max_iters));
        log(level, LogLevel::Verbose, &format!("  Work dir: {}", spec.runner.work_dir.display()));
        if let Some(path) = &spec.resume_from {
            log(level, LogLevel::Verbose, &format!("  Resume from: {}", path.display()));
        }
        return Ok(());
    }

    let model = match &spec.calibration {
        Some(calibration) => SyntheticSegmentor::default().with_calibration(calibration.num_classes),
        None => SyntheticSegmentor::default(),
    };
    let mut runner = build_runner(&spec, model).map_err(|e| format!("Setup error: {e}"))?;

    if let (Some(collector), Some(calibration)) =
        (build_stat_collector(&spec).map_err(|e| format!("Setup error: {e}"))?, &spec.calibration)
    {
        let source = striped_annotations(calibration.num_classes);
        runner
            .prepare_calibration(&source, &collector)
            .map_err(|e| format!("Calibration error: {e}"))?;
    }

    restore_from_spec(&mut runner, &spec).map_err(|e| format!("Checkpoint error: {e}"))?;

    let result = runner
        .run(|_| Ok(SyntheticBatch { target: 0.5 }))
        .map_err(|e| format!("Training error: {e}"))?;

    log(
        level,
        LogLevel::Normal,
        &format!(
            "Training complete: iteration {} (epoch {}), loss {}",
            result.final_iteration,
            result.final_epoch,
            result.final_loss.map_or_else(|| "n/a".to_string(), |l| format!("{l:.6}"))
        ),
    );
    for (name, weight) in &result.weights {
        log(level, LogLevel::Verbose, &format!("  {name}: weight {weight:.4}"));
    }
    Ok(())
}

/// Apply command-line overrides to the loaded run configuration
pub(super) fn apply_overrides(spec: &mut RunSpec, args: &TrainArgs) {
    if let Some(max_iters) = args.max_iters {
        spec.runner.max_iters = max_iters;
    }
    if let Some(resume) = &args.resume {
        spec.resume_from = Some(resume.clone());
    }
    if let Some(work_dir) = &args.work_dir {
        spec.runner.work_dir = work_dir.clone();
    }
}

/// Annotation maps where every class covers a near-equal share of pixels
fn striped_annotations(num_classes: usize) -> InMemoryAnnotations {
    let n = num_classes.max(1);
    let maps = (0..ANNOTATION_ITEMS)
        .map(|i| {
            Array2::from_shape_fn((ANNOTATION_SIDE, ANNOTATION_SIDE), |(r, c)| {
                ((r * ANNOTATION_SIDE + c + i) % n) as u8
            })
        })
        .collect();
    InMemoryAnnotations::new(maps, num_classes)
}
