//! 背景笼与特征提取.
//!
//! 对每条轨迹的每一帧: 由体素坐标重建 3D 足迹, 以轨迹的 2D 标签着色,
//! 再在足迹外围构造空心的 "笼", 以笼内平均强度作为局部背景.

use std::collections::BTreeMap;

use cfg_if::cfg_if;
use ndarray::{Array3, ArrayView2, ArrayView3, Axis};

use crate::config::FeatureConfig;
use crate::consts::label::is_spot;
use crate::consts::{Feature, FEATURE_LEN};
use crate::data::{IntensitySeries, TrackTag, VoxelCoords};
use crate::error::{ConfigError, ShapeError};
use crate::morph::cage_stats;
use crate::progress::{NoProgress, Progress, Ticker};

mod tensor;

pub use tensor::FeatureTensor;

/// 单个 spot 在单帧内的累加量.
#[derive(Debug, Default, Copy, Clone)]
struct SpotAcc {
    count: usize,
    sum: u64,
    z: usize,
    x: usize,
    y: usize,
}

/// 单帧的提取结果: `(列号, 特征)` 与空笼标签.
struct FrameFeatures {
    columns: Vec<(usize, [f64; FEATURE_LEN])>,
    empty: Vec<TrackTag>,
}

/// 特征提取器.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    cfg: FeatureConfig,
}

cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;

        fn collect_frames<F>(t_len: usize, f: F) -> Vec<FrameFeatures>
        where
            F: Fn(usize) -> FrameFeatures + Sync + Send,
        {
            (0..t_len).into_par_iter().map(f).collect()
        }
    } else {
        fn collect_frames<F>(t_len: usize, f: F) -> Vec<FrameFeatures>
        where
            F: Fn(usize) -> FrameFeatures + Sync + Send,
        {
            (0..t_len).map(f).collect()
        }
    }
}

impl FeatureExtractor {
    /// 检查参数并构造.
    pub fn new(cfg: FeatureConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// 特征提取参数.
    #[inline]
    pub fn config(&self) -> &FeatureConfig {
        &self.cfg
    }

    /// 抹除出现帧数少于 `min_active_frames` 的轨迹, 返回新的标签矩阵.
    pub fn prune(&self, tracked: ArrayView3<u32>) -> Array3<u32> {
        let mut frames_of: BTreeMap<u32, usize> = BTreeMap::new();
        for slice in tracked.axis_iter(Axis(0)) {
            let mut here: Vec<u32> = slice.iter().copied().filter(|&l| is_spot(l)).collect();
            here.sort_unstable();
            here.dedup();
            for l in here {
                *frames_of.entry(l).or_default() += 1;
            }
        }
        let min = self.cfg.min_active_frames;
        tracked.mapv(|l| match frames_of.get(&l) {
            Some(&n) if n >= min => l,
            _ => 0,
        })
    }

    /// 提取特征.
    #[inline]
    pub fn extract(
        &self,
        tracked: ArrayView3<u32>,
        coords: &VoxelCoords,
        series: &IntensitySeries,
    ) -> Result<FeatureTensor, ShapeError> {
        self.extract_with(tracked, coords, series, &NoProgress)
    }

    /// 提取特征, 每完成一帧通知 `progress`.
    ///
    /// # 注意
    ///
    /// 1. `tracked` 形状必须为 `(frame, x, y)`, 与 `series` 以及 `coords` 的哨兵一致,
    ///   否则返回 [`ShapeError::SeriesMismatch`].
    /// 2. `tracked` 不会被修改; 剪枝在内部副本上进行.
    /// 3. 背景笼为空时, 背景与比值记为 `NaN`, 其余字段照常填写,
    ///   并记录在 [`FeatureTensor::empty_cages`] 中.
    /// 4. 相同输入的结果逐位相同.
    pub fn extract_with<P: Progress + ?Sized>(
        &self,
        tracked: ArrayView3<u32>,
        coords: &VoxelCoords,
        series: &IntensitySeries,
        progress: &P,
    ) -> Result<FeatureTensor, ShapeError> {
        let shape = series.shape();
        let (t_len, _, x, y) = shape;
        let (tt, tx, ty) = tracked.dim();
        if (tt, tx, ty) != (t_len, x, y) {
            return Err(ShapeError::SeriesMismatch(
                "tracked labels",
                (t_len, 0, x, y),
                (tt, 0, tx, ty),
            ));
        }
        if coords.shape() != shape {
            return Err(ShapeError::SeriesMismatch(
                "voxel coordinates",
                shape,
                coords.shape(),
            ));
        }

        let pruned = self.prune(tracked);
        let mut tags: Vec<u32> = pruned.iter().copied().filter(|&l| is_spot(l)).collect();
        tags.sort_unstable();
        tags.dedup();
        let column: BTreeMap<u32, usize> = tags.iter().enumerate().map(|(i, &t)| (t, i)).collect();
        log::info!(
            "Extracting features of {} tracks over {t_len} frames",
            tags.len()
        );

        let ticker = Ticker::new(progress, t_len);
        let frames = collect_frames(t_len, |t| {
            let f = self.frame_features(
                t,
                pruned.index_axis(Axis(0), t),
                coords,
                series.frame_at(t),
                &column,
            );
            ticker.tick();
            f
        });

        let mut data = Array3::<f64>::zeros((t_len, FEATURE_LEN, tags.len()));
        let mut empty_cages = Vec::new();
        for (t, f) in frames.into_iter().enumerate() {
            for (col, values) in f.columns {
                for (field, v) in values.into_iter().enumerate() {
                    data[(t, field, col)] = v;
                }
            }
            empty_cages.extend(f.empty.into_iter().map(|tag| (t, tag)));
        }

        Ok(FeatureTensor::new(
            data,
            tags.into_iter().map(TrackTag).collect(),
            empty_cages,
        ))
    }

    fn frame_features(
        &self,
        t: usize,
        tags_2d: ArrayView2<u32>,
        coords: &VoxelCoords,
        raw: ArrayView3<u16>,
        column: &BTreeMap<u32, usize>,
    ) -> FrameFeatures {
        let occupancy = coords.reconstruct_frame(t);
        let footprint = Array3::from_shape_fn(occupancy.raw_dim(), |(i, j, k)| {
            if occupancy[(i, j, k)] {
                tags_2d[(j, k)]
            } else {
                0
            }
        });

        let mut spots: BTreeMap<u32, SpotAcc> = BTreeMap::new();
        for ((i, j, k), &tag) in footprint.indexed_iter() {
            if !is_spot(tag) {
                continue;
            }
            let acc = spots.entry(tag).or_default();
            acc.count += 1;
            acc.sum += raw[(i, j, k)] as u64;
            acc.z += i;
            acc.x += j;
            acc.y += k;
        }

        let cages = cage_stats(
            footprint.view(),
            raw,
            self.cfg.cage_inner,
            self.cfg.cage_outer,
        );

        let mut out = FrameFeatures {
            columns: Vec::with_capacity(spots.len()),
            empty: Vec::new(),
        };
        for (tag, acc) in spots {
            let Some(&col) = column.get(&tag) else {
                continue;
            };
            let background = cages.get(&tag).map_or(f64::NAN, |c| c.mean());
            if background.is_nan() {
                log::warn!("Empty background cage for track {tag} in frame {t}");
                out.empty.push(TrackTag(tag));
            }
            let n = acc.count as f64;
            let intensity = acc.sum as f64;
            let mut v = [0.0; FEATURE_LEN];
            v[Feature::Volume.index()] = n;
            v[Feature::Intensity.index()] = intensity;
            v[Feature::Background.index()] = background;
            v[Feature::Ratio.index()] = intensity / background;
            v[Feature::CentroidZ.index()] = acc.z as f64 / n;
            v[Feature::CentroidX.index()] = acc.x as f64 / n;
            v[Feature::CentroidY.index()] = acc.y as f64 / n;
            out.columns.push((col, v));
        }
        out
    }
}
