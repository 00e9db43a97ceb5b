//! 分块检测.
//!
//! 长时间序列整体检测的内存峰值不可接受. 我们把序列按帧切成若干块,
//! 块内多帧并行检测, 块间顺序执行, 最后按帧序拼接.

use std::num::NonZeroUsize;

use cfg_if::cfg_if;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayView4, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{detect, label};
use crate::config::DetectConfig;
use crate::consts::CHUNK_FACTOR;
use crate::data::{CoordsBuilder, IntensitySeries, VoxelCoords};
use crate::error::ConfigError;
use crate::morph::dilate_square;
use crate::progress::{NoProgress, Progress, Ticker};
use crate::Idx3d;

/// 分块检测的拼接结果.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChunkedDetection {
    /// 每帧沿 z 累加的 spot 强度, 形状 `(frame, x, y)`.
    pub spots_intensity: Array3<u64>,

    /// 每帧沿 z 累加的 spot 体积, 形状 `(frame, x, y)`.
    pub spots_volume: Array3<u32>,

    /// 全部 spot 体素坐标, 已封口.
    pub coords: VoxelCoords,

    /// 每帧的 2D 标签 (按合并半径处理后), 形状 `(frame, x, y)`. 标签仅在帧内有意义.
    pub labels_2d: Array3<u32>,
}

/// 单帧检测中拼接所需的部分. 标签矩阵在 worker 内即被丢弃.
struct FrameOutput {
    z_intensity: Array2<u64>,
    z_volume: Array2<u32>,
    coords: Vec<Idx3d>,
}

/// 获得可并行核心数.
fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 默认分块大小: `可用核心数 * CHUNK_FACTOR`, 至少为 1.
pub fn default_chunk_size() -> NonZeroUsize {
    NonZeroUsize::new(cpus() * CHUNK_FACTOR).unwrap_or(NonZeroUsize::MIN)
}

cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;

        fn detect_chunk<P: Progress + ?Sized>(
            chunk: ArrayView4<u16>,
            cfg: &DetectConfig,
            ticker: &Ticker<'_, P>,
        ) -> Vec<FrameOutput> {
            chunk
                .axis_iter(Axis(0))
                .into_par_iter()
                .map(|frame| detect_one(frame, cfg, ticker))
                .collect()
        }
    } else {
        fn detect_chunk<P: Progress + ?Sized>(
            chunk: ArrayView4<u16>,
            cfg: &DetectConfig,
            ticker: &Ticker<'_, P>,
        ) -> Vec<FrameOutput> {
            chunk
                .axis_iter(Axis(0))
                .map(|frame| detect_one(frame, cfg, ticker))
                .collect()
        }
    }
}

fn detect_one<P: Progress + ?Sized>(
    frame: ArrayView3<u16>,
    cfg: &DetectConfig,
    ticker: &Ticker<'_, P>,
) -> FrameOutput {
    let d = detect(frame, cfg);
    ticker.tick();
    FrameOutput {
        z_intensity: d.z_intensity,
        z_volume: d.z_volume,
        coords: d.coords,
    }
}

/// 单帧 2D 重标记.
///
/// 1. 对占据掩码做 8-连通标记;
/// 2. 若 `merge_radius > 0`, 先以 `merge_radius x merge_radius` 方块膨胀掩码再标记,
///   然后只保留原本被占据的像素. 距离足够近的碎片因此获得同一个标签.
pub fn relabel_frame(occupancy: ArrayView2<bool>, merge_radius: usize) -> Array2<u32> {
    if merge_radius == 0 {
        return label::label_2d(occupancy).0;
    }
    let dilated = dilate_square(occupancy, merge_radius);
    let (mut labels, _) = label::label_2d(dilated.view());
    labels.zip_mut_with(&occupancy, |l, &o| {
        if !o {
            *l = 0;
        }
    });
    labels
}

/// 分块检测器.
#[derive(Debug, Clone)]
pub struct ChunkedDetector {
    cfg: DetectConfig,
    chunk: NonZeroUsize,
}

impl ChunkedDetector {
    /// 检查参数并确定分块大小.
    pub fn new(cfg: DetectConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let chunk = cfg.chunk_size.unwrap_or_else(default_chunk_size);
        Ok(Self { cfg, chunk })
    }

    /// 分块大小 (帧数).
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk.get()
    }

    /// 检测参数.
    #[inline]
    pub fn config(&self) -> &DetectConfig {
        &self.cfg
    }

    /// 检测整个序列.
    #[inline]
    pub fn run(&self, series: &IntensitySeries) -> ChunkedDetection {
        self.run_with(series, &NoProgress)
    }

    /// 检测整个序列, 每完成一帧通知 `progress`.
    ///
    /// # 注意
    ///
    /// 输出与分块大小无关: 分块大小为 1 与分块大小等于帧数时结果完全一致.
    pub fn run_with<P: Progress + ?Sized>(
        &self,
        series: &IntensitySeries,
        progress: &P,
    ) -> ChunkedDetection {
        let (t_len, _, x, y) = series.shape();
        let mut spots_intensity = Array3::<u64>::zeros((t_len, x, y));
        let mut spots_volume = Array3::<u32>::zeros((t_len, x, y));
        let mut coords = CoordsBuilder::new();
        let ticker = Ticker::new(progress, t_len);

        for (start, chunk) in series.chunks(self.chunk) {
            let n = chunk.len_of(Axis(0));
            log::info!("Detecting spots in frames {start}..{} of {t_len}", start + n);

            let mut local = CoordsBuilder::new();
            for (i, out) in detect_chunk(chunk, &self.cfg, &ticker).into_iter().enumerate() {
                spots_intensity
                    .index_axis_mut(Axis(0), start + i)
                    .assign(&out.z_intensity);
                spots_volume
                    .index_axis_mut(Axis(0), start + i)
                    .assign(&out.z_volume);
                local.push_frame_rows(i, &out.coords);
            }
            coords.append(local, start);
        }

        let mut labels_2d = Array3::<u32>::zeros((t_len, x, y));
        for (mut dst, src) in labels_2d
            .axis_iter_mut(Axis(0))
            .zip(spots_intensity.axis_iter(Axis(0)))
        {
            let occupancy = src.mapv(|v| v > 0);
            dst.assign(&relabel_frame(occupancy.view(), self.cfg.merge_radius));
        }

        ChunkedDetection {
            spots_intensity,
            spots_volume,
            coords: coords.seal_unchecked(series.shape()),
            labels_2d,
        }
    }
}
