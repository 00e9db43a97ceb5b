//! 合成时间序列.
//!
//! 若干各向异性高斯亮斑在 xy 平面上随机游走, 偶尔 "熄灭" 一帧,
//! 叠加在带均匀噪声的常数背景上.

use ndarray::{Array4, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spot_berry::{Centroid3d, IntensitySeries};

/// 亮斑的 z 方向与 xy 方向高斯宽度.
const SIGMA_Z: f64 = 1.0;
const SIGMA_XY: f64 = 1.5;

/// 合成参数.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    /// 帧数.
    pub frames: usize,

    /// 单帧形状 `(z, x, y)`.
    pub shape: (usize, usize, usize),

    /// 亮斑个数.
    pub spots: usize,

    /// 亮斑峰值强度.
    pub peak: f64,

    /// 常数背景.
    pub background: u16,

    /// 均匀噪声的幅度, 取值于 `[0, noise]`.
    pub noise: u16,

    /// 每帧亮斑熄灭的概率.
    pub blink: f64,

    /// 随机种子.
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            frames: 24,
            shape: (12, 64, 64),
            spots: 6,
            peak: 600.0,
            background: 100,
            noise: 8,
            blink: 0.05,
            seed: 2024,
        }
    }
}

/// 每帧可见亮斑的中心.
fn walk(cfg: &SynthConfig, rng: &mut StdRng) -> Vec<Vec<Centroid3d>> {
    let (z, x, y) = cfg.shape;
    let margin = 4.0;
    let clamp = |v: f64, hi: usize| v.clamp(margin, hi as f64 - 1.0 - margin);
    let mut centers: Vec<Centroid3d> = (0..cfg.spots)
        .map(|_| {
            (
                z as f64 / 2.0,
                rng.random_range(margin..x as f64 - margin),
                rng.random_range(margin..y as f64 - margin),
            )
        })
        .collect();

    (0..cfg.frames)
        .map(|_| {
            for c in centers.iter_mut() {
                c.1 = clamp(c.1 + rng.random_range(-1.0..=1.0), x);
                c.2 = clamp(c.2 + rng.random_range(-1.0..=1.0), y);
            }
            centers
                .iter()
                .copied()
                .filter(|_| !rng.random_bool(cfg.blink))
                .collect()
        })
        .collect()
}

/// 按 `cfg` 生成时间序列.
pub fn synth_series(cfg: &SynthConfig) -> IntensitySeries {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let visible = walk(cfg, &mut rng);
    let (z, x, y) = cfg.shape;
    let (sz2, sxy2) = (2.0 * SIGMA_Z * SIGMA_Z, 2.0 * SIGMA_XY * SIGMA_XY);

    let mut data = Array4::<u16>::zeros((cfg.frames, z, x, y));
    for (mut frame, centers) in data.axis_iter_mut(Axis(0)).zip(visible.iter()) {
        for ((k, i, j), v) in frame.indexed_iter_mut() {
            let (zf, xf, yf) = (k as f64, i as f64, j as f64);
            let signal: f64 = centers
                .iter()
                .map(|&(cz, cx, cy)| {
                    let e = (zf - cz).powi(2) / sz2
                        + ((xf - cx).powi(2) + (yf - cy).powi(2)) / sxy2;
                    cfg.peak * (-e).exp()
                })
                .sum();
            let noise = rng.random_range(0..=cfg.noise) as f64;
            *v = (cfg.background as f64 + signal + noise)
                .round()
                .min(u16::MAX as f64) as u16;
        }
    }
    IntensitySeries::new(data)
}
