//! 单帧 3D spot 检测.
//!
//! 流程: 高斯平滑 -> 离散拉普拉斯 -> 对 `|响应|` 拟合正态噪声模型 -> 阈值化
//! -> 26-连通标记 -> 按体积与 z 平面数过滤.

use itertools::Itertools;
use ndarray::{Array2, Array3, ArrayView3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::DetectConfig;
use crate::data::FrameLabel;
use crate::{Area3d, Areas3d, Centroid3d, Idx3d};

pub mod chunked;
pub mod filter;
pub mod label;

pub use chunked::{relabel_frame, ChunkedDetection, ChunkedDetector};
pub use filter::NoiseFit;

/// 单帧中一个通过过滤的 spot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpotRecord {
    /// 帧内标签, 从 1 开始.
    pub label: FrameLabel,

    /// 全部体素, 行优先顺序.
    pub voxels: Vec<Idx3d>,

    /// 积分强度 (原始强度之和).
    pub intensity: u64,

    /// 质心 `(z, x, y)`.
    pub centroid: Centroid3d,
}

impl SpotRecord {
    /// 体积 (体素个数).
    #[inline]
    pub fn volume(&self) -> usize {
        self.voxels.len()
    }
}

/// 单帧检测结果.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Detection {
    /// 3D 标签矩阵, 与输入同形状.
    pub labels: Array3<u32>,

    /// 沿 z 累加的原始强度, 形状 `(x, y)`.
    pub z_intensity: Array2<u64>,

    /// 沿 z 累加的 spot 体素个数, 形状 `(x, y)`.
    pub z_volume: Array2<u32>,

    /// 所有 spot 的体素坐标: 按标签分组, 组内行优先顺序.
    pub coords: Vec<Idx3d>,

    /// 每个 spot 的统计.
    pub spots: Vec<SpotRecord>,

    /// 噪声模型拟合结果.
    pub noise: NoiseFit,
}

impl Detection {
    /// 检测到的 spot 个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.spots.len()
    }

    /// 是否没有检测到任何 spot?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }
}

/// 候选区域是否跨越至少两个 z 平面?
///
/// 排序后的 z 值相邻差之和为 0, 即所有体素都在同一平面上.
fn spans_planes(area: &Area3d) -> bool {
    area.iter()
        .map(|p| p.0)
        .sorted_unstable()
        .tuple_windows()
        .map(|(a, b)| b - a)
        .sum::<usize>()
        > 0
}

/// 候选区域是否保留? 体积必须 **严格大于** `min_volume`, 且跨越多个 z 平面.
#[inline]
fn keep_candidate(area: &Area3d, min_volume: usize) -> bool {
    area.len() > min_volume && spans_planes(area)
}

/// 标记 `mask` 的 26-连通分量, 只保留体积足够且跨越多个 z 平面的分量.
fn candidates(mask: ArrayView3<bool>, min_volume: usize) -> Areas3d {
    label::areas_3d(mask)
        .into_iter()
        .filter(|a| keep_candidate(a, min_volume))
        .collect()
}

/// 检测单帧 `volume` (`(z, x, y)`) 中的 spot.
///
/// # 注意
///
/// 1. `cfg` 应已通过 [`DetectConfig::validate`].
/// 2. 空体数据得到全零输出; 噪声拟合退化时没有体素通过阈值, 均不视为错误.
/// 3. 通过过滤的 spot 按扫描顺序重新编号为 `1..=n`.
pub fn detect(volume: ArrayView3<u16>, cfg: &DetectConfig) -> Detection {
    debug_assert!(cfg.validate().is_ok());
    let (z, x, y) = volume.dim();

    let response = filter::laplace(&filter::gaussian_blur(volume, cfg.kernel_size));
    let noise = NoiseFit::fit(&response);
    if noise.is_degenerate() {
        log::debug!("Degenerate noise fit on a {z}x{x}x{y} volume, no voxel passes");
    }
    let mask = filter::threshold_mask(&response, &noise, cfg.threshold_sigma);

    let mut labels = Array3::<u32>::zeros((z, x, y));
    let mut z_intensity = Array2::<u64>::zeros((x, y));
    let mut z_volume = Array2::<u32>::zeros((x, y));
    let mut coords = Vec::new();
    let mut spots = Vec::new();

    for area in candidates(mask.view(), cfg.min_volume) {
        let tag = spots.len() as u32 + 1;
        let mut intensity = 0u64;
        let (mut cz, mut cx, mut cy) = (0usize, 0usize, 0usize);
        for &p in &area {
            let v = volume[p] as u64;
            labels[p] = tag;
            z_intensity[(p.1, p.2)] += v;
            z_volume[(p.1, p.2)] += 1;
            intensity += v;
            cz += p.0;
            cx += p.1;
            cy += p.2;
        }
        let n = area.len() as f64;
        coords.extend_from_slice(&area);
        spots.push(SpotRecord {
            label: FrameLabel(tag),
            voxels: area,
            intensity,
            centroid: (cz as f64 / n, cx as f64 / n, cy as f64 / n),
        });
    }

    Detection {
        labels,
        z_intensity,
        z_volume,
        coords,
        spots,
        noise,
    }
}

/// 单帧检测预览: 检测结果加上按合并半径重标记后的 2D 投影.
#[derive(Debug, Clone)]
pub struct Preview {
    /// 单帧检测结果.
    pub detection: Detection,

    /// z 投影的 2D 标签, 已按 `merge_radius` 合并.
    pub labels_2d: Array2<u32>,
}

/// 以与分块检测完全相同的规则处理单帧, 便于调参.
pub fn preview(volume: ArrayView3<u16>, cfg: &DetectConfig) -> Preview {
    let detection = detect(volume, cfg);
    let occupancy = detection.z_intensity.mapv(|v| v > 0);
    let labels_2d = relabel_frame(occupancy.view(), cfg.merge_radius);
    Preview {
        detection,
        labels_2d,
    }
}
