//! 程序运行函数.

use std::error::Error;
use std::fs;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::thread;

use spot_berry::archive::AnalysisArchive;
use spot_berry::error::PipelineError;
use spot_berry::pipeline::{Analysis, Pipeline, Stage};
use spot_berry::IntensitySeries;
use utils::loader;
use utils::synth::{synth_series, SynthConfig};

use crate::profile::Profile;
use crate::result::AblationResult;

/// 待比较的分块大小, 升序去重.
fn chunk_sizes(frames: usize) -> Vec<usize> {
    let cpus = utils::cpus();
    let mut v: Vec<usize> = [1, 2, cpus, cpus * 3, frames]
        .into_iter()
        .filter(|&s| s > 0 && s <= frames)
        .collect();
    v.sort_unstable();
    v.dedup();
    v
}

/// 以 `pipeline` 运行一次, 并与 `reference` 比较.
fn profile_one(
    pipeline: &Pipeline,
    series: &IntensitySeries,
    reference: &Analysis,
) -> Result<Profile, PipelineError> {
    let chunk = pipeline.detector().chunk_size();
    let profile = Mutex::new(Profile::new(chunk));
    let a = pipeline.run_with(series, |stage: Stage, _, _| {
        if let Ok(mut p) = profile.lock() {
            p.observe(stage);
        }
    })?;
    let mut profile = profile
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .finish();

    let consistent = a.detection == reference.detection && a.tracked == reference.tracked;
    if !consistent {
        log::warn!("Chunk size {chunk} changes the result");
    }
    profile.record(a.detection.coords.len(), a.tracked.len(), consistent);
    Ok(profile)
}

/// 实际运行.
pub fn run() -> Result<AblationResult, Box<dyn Error>> {
    let cfg = loader::config_from_env();
    let synth = SynthConfig {
        frames: loader::frames_from_env(),
        ..SynthConfig::default()
    };
    let series = synth_series(&synth);
    log::info!(
        "Synthesized {} frames of shape {:?}",
        series.len_t(),
        series.frame_shape()
    );

    // 整个序列作为一块, 作为参照.
    let mut whole = cfg.clone();
    whole.detect.chunk_size = NonZeroUsize::new(synth.frames);
    let reference = Pipeline::new(whole.clone())?.run(&series)?;

    let path = loader::archive_path_from_env_or_home();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    AnalysisArchive::save(&reference, &whole, &path)?;
    let reopened = AnalysisArchive::open(&path)?;
    let archive_ok = reopened.config == whole
        && reopened.analysis.detection == reference.detection
        && reopened.analysis.tracked == reference.tracked;

    let pipelines = chunk_sizes(synth.frames)
        .into_iter()
        .map(|size| {
            let mut c = cfg.clone();
            c.detect.chunk_size = NonZeroUsize::new(size);
            Pipeline::new(c)
        })
        .collect::<Result<Vec<_>, _>>()?;

    utils::sep();
    println!("Running ablation studies...");
    let profiles = thread::scope(|s| {
        let (series, reference) = (&series, &reference);
        let handles: Vec<_> = pipelines
            .iter()
            .map(|p| s.spawn(move || profile_one(p, series, reference)))
            .collect();
        handles
            .into_iter()
            .map(|th| th.join().map_err(|_| "ablation thread panicked"))
            .collect::<Result<Vec<_>, _>>()
    })?
    .into_iter()
    .collect::<Result<Vec<_>, _>>()?;

    Ok(AblationResult::new(path, archive_ok, profiles))
}
