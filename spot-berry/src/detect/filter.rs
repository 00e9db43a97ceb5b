//! 高斯平滑、离散拉普拉斯与噪声模型拟合.

use ndarray::{Array3, ArrayView3, Axis, Zip};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::GAUSS_TRUNCATE;

const TRUNC_EPS: f64 = 1e-9;

/// 半样本对称 (reflect) 边界: `d c b a | a b c d | d c b a`.
#[inline]
fn reflect(i: isize, n: usize) -> usize {
    debug_assert!(n > 0);
    let period = 2 * n as isize;
    let m = i.rem_euclid(period) as usize;
    if m >= n {
        2 * n - 1 - m
    } else {
        m
    }
}

/// 截断于 `GAUSS_TRUNCATE` 倍标准差的归一化一维高斯核.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (GAUSS_TRUNCATE * sigma + 0.5) as isize;
    let denom = -0.5 / (sigma * sigma);
    let mut w: Vec<f64> = (-radius..=radius)
        .map(|x| ((x * x) as f64 * denom).exp())
        .collect();
    let s: f64 = w.iter().sum();
    w.iter_mut().for_each(|v| *v /= s);
    w
}

/// 沿 `axis` 做一维相关运算, 原地写回. 核长度必须为奇数.
fn correlate_axis(data: &mut Array3<f64>, axis: usize, weights: &[f64]) {
    debug_assert_eq!(weights.len() % 2, 1);
    let r = (weights.len() / 2) as isize;
    let mut buf = Vec::new();
    for mut lane in data.lanes_mut(Axis(axis)) {
        let n = lane.len();
        buf.clear();
        buf.extend(lane.iter().copied());
        for (i, v) in lane.iter_mut().enumerate() {
            *v = weights
                .iter()
                .enumerate()
                .map(|(k, w)| w * buf[reflect(i as isize + k as isize - r, n)])
                .sum();
        }
    }
}

/// 各向同性可分离高斯平滑.
///
/// # 注意
///
/// 平滑结果与输入保持同一精度: 每个轴处理完后都截断为整数
/// (容忍 `TRUNC_EPS` 以内的浮点舍入误差).
pub fn gaussian_blur(volume: ArrayView3<u16>, sigma: f64) -> Array3<f64> {
    let mut out = volume.mapv(f64::from);
    if out.is_empty() {
        return out;
    }
    let w = gaussian_kernel(sigma);
    for axis in 0..3 {
        correlate_axis(&mut out, axis, &w);
        out.mapv_inplace(|v| (v + TRUNC_EPS).trunc());
    }
    out
}

/// 离散拉普拉斯: 每个轴上 `[1, -2, 1]` 二阶差分之和, reflect 边界.
pub fn laplace(data: &Array3<f64>) -> Array3<f64> {
    let mut acc = Array3::<f64>::zeros(data.raw_dim());
    if data.is_empty() {
        return acc;
    }
    for axis in 0..3 {
        let mut d = data.clone();
        correlate_axis(&mut d, axis, &[1.0, -2.0, 1.0]);
        acc += &d;
    }
    acc
}

/// 对 `|response|` 的正态分布极大似然拟合结果.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NoiseFit {
    /// 正常拟合. `sigma` 为总体标准差.
    Fitted {
        /// 均值.
        mu: f64,
        /// 标准差.
        sigma: f64,
    },

    /// 空数据, 方差为 0, 或出现非有限值. 此时没有体素通过阈值.
    Degenerate,
}

impl NoiseFit {
    /// 拟合 `|response|` 的均值与总体标准差.
    pub fn fit(response: &Array3<f64>) -> Self {
        let n = response.len();
        if n == 0 {
            return Self::Degenerate;
        }
        let mu = response.iter().map(|v| v.abs()).sum::<f64>() / n as f64;
        let var = response
            .iter()
            .map(|v| (v.abs() - mu).powi(2))
            .sum::<f64>()
            / n as f64;
        let sigma = var.sqrt();
        if !mu.is_finite() || !sigma.is_finite() || sigma <= 0.0 {
            Self::Degenerate
        } else {
            Self::Fitted { mu, sigma }
        }
    }

    /// 阈值 `mu + k * sigma`. 退化时为 `None`.
    #[inline]
    pub fn threshold(&self, k: f64) -> Option<f64> {
        match *self {
            Self::Fitted { mu, sigma } => Some(mu + k * sigma),
            Self::Degenerate => None,
        }
    }

    /// 是否退化?
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::Degenerate)
    }
}

/// `|response| > threshold` 的掩码. 退化拟合得到全 `false`.
pub fn threshold_mask(response: &Array3<f64>, fit: &NoiseFit, k: f64) -> Array3<bool> {
    let mut mask = Array3::from_elem(response.raw_dim(), false);
    if let Some(thr) = fit.threshold(k) {
        Zip::from(&mut mask)
            .and(response)
            .for_each(|m, &r| *m = r.abs() > thr);
    }
    mask
}
