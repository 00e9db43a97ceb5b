//! 参数向量.
//!
//! 布局 (均为 `f64`):
//!
//! | 下标 | 含义 |
//! |-----|------|
//! | 0 | `kernel_size` |
//! | 1 | `threshold_sigma` |
//! | 2 | `min_volume` |
//! | 3 | `merge_radius` |
//! | 4 | `distance_threshold` |
//! | 5 | `max_gap` |
//! | 6 | `min_active_frames` |
//! | 7 | `cage_inner` |
//! | 8 | `cage_outer` |
//! | 9 | `chunk_size`, 0 表示自动 |

use std::num::NonZeroUsize;

use ndarray::{Array1, ArrayView1};
use num::ToPrimitive;

use super::ArchiveError;
use crate::config::{DetectConfig, FeatureConfig, PipelineConfig, TrackConfig};

pub(super) const PARAMS_LEN: usize = 10;

pub(super) fn encode(cfg: &PipelineConfig) -> Array1<f64> {
    let (d, t, f) = (&cfg.detect, &cfg.track, &cfg.feature);
    Array1::from(vec![
        d.kernel_size,
        d.threshold_sigma,
        d.min_volume as f64,
        d.merge_radius as f64,
        t.distance_threshold,
        t.max_gap as f64,
        f.min_active_frames as f64,
        f.cage_inner,
        f.cage_outer,
        d.chunk_size.map_or(0, NonZeroUsize::get) as f64,
    ])
}

/// 非负整数项. 带小数部分或无法表示时报错.
fn whole(v: &ArrayView1<f64>, i: usize) -> Result<usize, ArchiveError> {
    let x = v[i];
    if x.fract() != 0.0 {
        return Err(ArchiveError::Params(i));
    }
    x.to_usize().ok_or(ArchiveError::Params(i))
}

pub(super) fn decode(v: ArrayView1<f64>) -> Result<PipelineConfig, ArchiveError> {
    if v.len() != PARAMS_LEN {
        return Err(ArchiveError::ParamsLen(v.len()));
    }
    let cfg = PipelineConfig {
        detect: DetectConfig {
            kernel_size: v[0],
            threshold_sigma: v[1],
            min_volume: whole(&v, 2)?,
            merge_radius: whole(&v, 3)?,
            chunk_size: NonZeroUsize::new(whole(&v, 9)?),
        },
        track: TrackConfig {
            distance_threshold: v[4],
            max_gap: whole(&v, 5)?,
        },
        feature: FeatureConfig {
            min_active_frames: whole(&v, 6)?,
            cage_inner: v[7],
            cage_outer: v[8],
        },
    };
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_layout() {
        let mut cfg = PipelineConfig::default();
        cfg.detect.chunk_size = NonZeroUsize::new(6);
        cfg.detect.merge_radius = 3;
        let v = encode(&cfg);
        assert_eq!(v.len(), PARAMS_LEN);
        assert_eq!(v[9], 6.0);
        assert_eq!(decode(v.view()).unwrap(), cfg);

        let v = encode(&PipelineConfig::default());
        assert_eq!(v[9], 0.0);
        assert_eq!(decode(v.view()).unwrap().detect.chunk_size, None);
    }

    #[test]
    fn test_bad_params() {
        let mut v = encode(&PipelineConfig::default());
        v[2] = 2.5;
        assert!(matches!(decode(v.view()), Err(ArchiveError::Params(2))));
        v[2] = -1.0;
        assert!(matches!(decode(v.view()), Err(ArchiveError::Params(2))));
        v[2] = f64::NAN;
        assert!(matches!(decode(v.view()), Err(ArchiveError::Params(2))));

        let mut v = encode(&PipelineConfig::default());
        v[8] = 1.0;
        assert!(matches!(decode(v.view()), Err(ArchiveError::Config(_))));

        let short = Array1::<f64>::zeros(4);
        assert!(matches!(
            decode(short.view()),
            Err(ArchiveError::ParamsLen(4))
        ));
    }
}
