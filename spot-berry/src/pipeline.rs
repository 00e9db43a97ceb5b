//! 完整分析流程: 分块检测 -> 追踪 -> 特征提取.

use crate::config::PipelineConfig;
use crate::detect::{ChunkedDetection, ChunkedDetector};
use crate::error::PipelineError;
use crate::feature::{FeatureExtractor, FeatureTensor};
use crate::track::{SpotTracker, Tracked};
use crate::IntensitySeries;

/// 分析阶段.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    /// 分块检测, 进度单位为帧.
    Detect,

    /// 追踪, 进度单位为 spot 候选.
    Track,

    /// 特征提取, 进度单位为帧.
    Extract,
}

/// 一次完整分析的全部结果.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// 分块检测结果.
    pub detection: ChunkedDetection,

    /// 追踪结果.
    pub tracked: Tracked,

    /// 特征.
    pub features: FeatureTensor,
}

/// 分析流程.
#[derive(Debug, Clone)]
pub struct Pipeline {
    cfg: PipelineConfig,
    detector: ChunkedDetector,
    tracker: SpotTracker,
    extractor: FeatureExtractor,
}

impl Pipeline {
    /// 检查全部参数并构造.
    pub fn new(cfg: PipelineConfig) -> Result<Self, PipelineError> {
        cfg.validate()?;
        Ok(Self {
            detector: ChunkedDetector::new(cfg.detect.clone())?,
            tracker: SpotTracker::new(cfg.track.clone())?,
            extractor: FeatureExtractor::new(cfg.feature.clone())?,
            cfg,
        })
    }

    /// 全部参数.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// 分块检测器.
    #[inline]
    pub fn detector(&self) -> &ChunkedDetector {
        &self.detector
    }

    /// 运行完整分析.
    #[inline]
    pub fn run(&self, series: &IntensitySeries) -> Result<Analysis, PipelineError> {
        self.run_with(series, |_: Stage, _: usize, _: usize| {})
    }

    /// 运行完整分析, 以 `(阶段, 已完成, 总数)` 报告进度.
    pub fn run_with<F>(&self, series: &IntensitySeries, progress: F) -> Result<Analysis, PipelineError>
    where
        F: Fn(Stage, usize, usize) + Sync,
    {
        let progress = &progress;
        let staged = |stage: Stage| move |done: usize, total: usize| progress(stage, done, total);

        log::info!("Detecting spots in {} frames", series.len_t());
        let detection = self
            .detector
            .run_with(series, &staged(Stage::Detect));

        log::info!("Tracking spots");
        let tracked = self
            .tracker
            .track_with(detection.labels_2d.view(), &staged(Stage::Track));

        log::info!("Extracting features");
        let features = self.extractor.extract_with(
            tracked.volume.view(),
            &detection.coords,
            series,
            &staged(Stage::Extract),
        )?;

        Ok(Analysis {
            detection,
            tracked,
            features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::Feature;
    use crate::data::TrackTag;
    use crate::test_utils::{blob_series, init_logger};
    use std::sync::Mutex;

    /// 4 帧, 单个亮斑沿 x 每帧移动 1 个像素.
    fn moving_blob() -> IntensitySeries {
        let centers: Vec<_> = (0..4).map(|t| vec![(4.5, 8.0 + t as f64, 10.0)]).collect();
        blob_series((10, 20, 20), &centers, 500.0, 10)
    }

    #[test]
    fn test_end_to_end_single_track() {
        init_logger();
        let series = moving_blob();
        let a = Pipeline::new(PipelineConfig::default())
            .unwrap()
            .run(&series)
            .unwrap();

        assert_eq!(a.tracked.len(), 1);
        assert_eq!(a.features.tags(), &[TrackTag(1)]);
        assert_eq!(a.features.activations(), vec![1, 1, 1, 1]);
        assert!(a.features.empty_cages().is_empty());

        let cx = a.features.trace(TrackTag(1), Feature::CentroidX).unwrap();
        assert!(cx.windows(2).into_iter().all(|w| w[1] > w[0]));
        let ratio = a.features.trace(TrackTag(1), Feature::Ratio).unwrap();
        assert!(ratio.iter().all(|&r| r > 1.0));
        let vol = a.features.trace(TrackTag(1), Feature::Volume).unwrap();
        assert!(vol.iter().all(|&v| v > 4.0));
    }

    #[test]
    fn test_stage_progress() {
        let series = moving_blob();
        let seen = Mutex::new(Vec::new());
        Pipeline::new(PipelineConfig::default())
            .unwrap()
            .run_with(&series, |s, d, t| {
                if d == t {
                    seen.lock().unwrap().push(s);
                }
            })
            .unwrap();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![Stage::Detect, Stage::Track, Stage::Extract]);
    }

    #[test]
    fn test_invalid_config() {
        let mut cfg = PipelineConfig::default();
        cfg.feature.cage_inner = 9.0;
        assert!(matches!(Pipeline::new(cfg), Err(PipelineError::Config(_))));
    }
}
