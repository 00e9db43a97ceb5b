//! 分析参数.
//!
//! 所有参数均在调用时显式传入, 库本身从不隐式读取磁盘或环境变量.

use std::num::NonZeroUsize;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::ConfigError;

#[inline]
fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// 检测参数.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectConfig {
    /// 高斯平滑标准差 (体素).
    pub kernel_size: f64,

    /// 检测灵敏度: 响应需大于 `mu + threshold_sigma * sigma`.
    pub threshold_sigma: f64,

    /// 最小 spot 体积. 体积 **不大于** 该值的候选被丢弃.
    pub min_volume: usize,

    /// 2D 合并半径. 0 表示不合并.
    pub merge_radius: usize,

    /// 分块大小 (帧数). `None` 表示 `可用核心数 * 3`.
    pub chunk_size: Option<NonZeroUsize>,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            kernel_size: DEFAULT_KERNEL_SIZE,
            threshold_sigma: DEFAULT_THRESHOLD_SIGMA,
            min_volume: DEFAULT_MIN_VOLUME,
            merge_radius: 0,
            chunk_size: None,
        }
    }
}

impl DetectConfig {
    /// 检查参数合法性.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !positive(self.kernel_size) {
            return Err(ConfigError::KernelSize(self.kernel_size));
        }
        if !positive(self.threshold_sigma) {
            return Err(ConfigError::ThresholdSigma(self.threshold_sigma));
        }
        if self.min_volume == 0 {
            return Err(ConfigError::MinVolume);
        }
        Ok(())
    }
}

/// 追踪参数.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackConfig {
    /// 相邻 (含空缺) 帧间质心最大位移.
    pub distance_threshold: f64,

    /// 允许连续空缺的最大帧数.
    pub max_gap: usize,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            max_gap: MAX_GAP_FRAMES,
        }
    }
}

impl TrackConfig {
    /// 检查参数合法性.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if positive(self.distance_threshold) {
            Ok(())
        } else {
            Err(ConfigError::Distance(self.distance_threshold))
        }
    }
}

/// 特征提取参数.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureConfig {
    /// 轨迹最少出现的帧数, 不足者在提取前被抹除.
    pub min_active_frames: usize,

    /// 背景笼内半径.
    pub cage_inner: f64,

    /// 背景笼外半径.
    pub cage_outer: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_active_frames: DEFAULT_MIN_ACTIVE_FRAMES,
            cage_inner: CAGE_INNER,
            cage_outer: CAGE_OUTER,
        }
    }
}

impl FeatureConfig {
    /// 检查参数合法性.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_active_frames == 0 {
            return Err(ConfigError::MinActiveFrames);
        }
        let (i, o) = (self.cage_inner, self.cage_outer);
        if !(i.is_finite() && o.is_finite() && i >= 0.0 && i < o) {
            return Err(ConfigError::CageRadii(i, o));
        }
        Ok(())
    }
}

/// 完整分析流程的参数.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    /// 检测参数.
    pub detect: DetectConfig,

    /// 追踪参数.
    pub track: TrackConfig,

    /// 特征提取参数.
    pub feature: FeatureConfig,
}

impl PipelineConfig {
    /// 依次检查各阶段参数.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detect.validate()?;
        self.track.validate()?;
        self.feature.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert_eq!(DetectConfig::default().min_volume, 4);
        assert_eq!(TrackConfig::default().max_gap, 8);
    }

    #[test]
    fn test_rejects_bad_values() {
        let cfg = DetectConfig {
            kernel_size: 0.0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::KernelSize(0.0)));

        let cfg = DetectConfig {
            threshold_sigma: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ThresholdSigma(_))));

        let cfg = TrackConfig {
            distance_threshold: -1.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = FeatureConfig {
            cage_inner: 5.0,
            cage_outer: 5.0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::CageRadii(5.0, 5.0)));

        let cfg = FeatureConfig {
            min_active_frames: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::MinActiveFrames));
    }
}
