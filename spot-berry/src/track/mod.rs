//! 贪心时空追踪.
//!
//! 以 2D 质心最近邻规则把各帧的 spot 串联成轨迹. 追踪只依赖 z 投影后的 2D 标签,
//! 3D 信息通过 [`VoxelCoords`](crate::VoxelCoords) 保留, 在特征提取阶段重建.

use std::collections::BTreeMap;

use ndarray::{Array3, ArrayView3, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::TrackConfig;
use crate::consts::label::is_spot;
use crate::data::{FrameLabel, TrackTag};
use crate::error::ConfigError;
use crate::progress::{NoProgress, Progress, Ticker};

mod pool;

use pool::{Candidate, CandidatePool};

/// 一条轨迹的来源信息.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackOrigin {
    /// 轨迹标签.
    pub tag: TrackTag,

    /// 轨迹起始帧.
    pub first_frame: usize,

    /// 起始帧中的帧内标签.
    pub seed: FrameLabel,

    /// 轨迹覆盖的帧数 (含起始帧).
    pub linked: usize,
}

/// 追踪结果.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tracked {
    /// 轨迹标签矩阵, 形状 `(frame, x, y)`. 同一轨迹在所有帧中标签相同.
    pub volume: Array3<u32>,

    /// 每条轨迹的来源, 按标签升序.
    pub origins: Vec<TrackOrigin>,
}

impl Tracked {
    /// 由已有的轨迹标签矩阵重建 (例如从归档文件加载后).
    ///
    /// 来源信息由每个标签首次出现的帧推断; 帧内标签无法恢复, 记为 0.
    pub fn from_volume(volume: Array3<u32>) -> Self {
        let mut seen: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
        for (frame, slice) in volume.axis_iter(Axis(0)).enumerate() {
            let mut here: Vec<u32> = slice.iter().copied().filter(|&l| is_spot(l)).collect();
            here.sort_unstable();
            here.dedup();
            for l in here {
                seen.entry(l).or_insert((frame, 0)).1 += 1;
            }
        }
        let origins = seen
            .into_iter()
            .map(|(tag, (first_frame, linked))| TrackOrigin {
                tag: TrackTag(tag),
                first_frame,
                seed: FrameLabel(0),
                linked,
            })
            .collect();
        Self { volume, origins }
    }

    /// 全部轨迹标签, 升序.
    pub fn tags(&self) -> Vec<TrackTag> {
        self.origins.iter().map(|o| o.tag).collect()
    }

    /// 轨迹条数.
    #[inline]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// 是否没有任何轨迹?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

/// 追踪器.
#[derive(Debug, Clone)]
pub struct SpotTracker {
    cfg: TrackConfig,
}

fn paint(volume: &mut Array3<u32>, c: &Candidate, tag: u32) {
    for &(x, y) in &c.pixels {
        volume[(c.frame, x, y)] = tag;
    }
}

impl SpotTracker {
    /// 检查参数并构造.
    pub fn new(cfg: TrackConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// 追踪参数.
    #[inline]
    pub fn config(&self) -> &TrackConfig {
        &self.cfg
    }

    /// 追踪 `(frame, x, y)` 形状的逐帧 2D 标签.
    #[inline]
    pub fn track(&self, labels_2d: ArrayView3<u32>) -> Tracked {
        self.track_with(labels_2d, &NoProgress)
    }

    /// 追踪, 每处理完一个候选 (作为起点或被串联) 通知 `progress`.
    ///
    /// # 注意
    ///
    /// 1. 每次外层循环都会从池中移除起点, 因此轨迹条数不超过候选总数, 循环必然终止.
    /// 2. 空缺计数在每条轨迹开始时清零. 连续空缺达到 `max_gap` 帧后,
    ///   下一次未能串联即结束该轨迹.
    pub fn track_with<P: Progress + ?Sized>(
        &self,
        labels_2d: ArrayView3<u32>,
        progress: &P,
    ) -> Tracked {
        let t_len = labels_2d.len_of(Axis(0));
        let mut pool = CandidatePool::from_labels(labels_2d);
        let total = pool.len();
        let ticker = Ticker::new(progress, total);
        let mut volume = Array3::<u32>::zeros(labels_2d.raw_dim());
        let mut origins = Vec::new();

        while let Some(seed) = pool.pop_seed() {
            let tag = origins.len() as u32 + 1;
            paint(&mut volume, &seed, tag);
            ticker.tick();

            let (mut t, mut reference) = (seed.frame, seed.centroid);
            let (mut gap, mut linked) = (0usize, 1usize);
            while t + 1 < t_len {
                match pool
                    .nearest(t + 1, reference)
                    .filter(|&(_, d)| d <= self.cfg.distance_threshold)
                {
                    Some((idx, _)) => {
                        let c = pool.take(t + 1, idx);
                        paint(&mut volume, &c, tag);
                        ticker.tick();
                        reference = c.centroid;
                        t += 1;
                        gap = 0;
                        linked += 1;
                    }
                    None if gap < self.cfg.max_gap => {
                        gap += 1;
                        t += 1;
                    }
                    None => break,
                }
            }

            origins.push(TrackOrigin {
                tag: TrackTag(tag),
                first_frame: seed.frame,
                seed: seed.label,
                linked,
            });
        }
        debug_assert!(origins.len() <= total);
        log::info!("Linked {total} spots into {} tracks", origins.len());

        Tracked { volume, origins }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::paint_square;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn tracker() -> SpotTracker {
        SpotTracker::new(TrackConfig::default()).unwrap()
    }

    fn gap_labels(gap: usize) -> Array3<u32> {
        let mut l = Array3::<u32>::zeros((gap + 2, 12, 12));
        paint_square(&mut l, 0, (5, 5), 2, 1);
        paint_square(&mut l, gap + 1, (6, 5), 2, 1);
        l
    }

    #[test]
    fn test_gap_tolerance() {
        for gap in [0, 1, 5, 8] {
            let t = tracker().track(gap_labels(gap).view());
            assert_eq!(t.len(), 1, "gap {gap}");
            assert_eq!(t.origins[0].linked, 2);
        }
        for gap in [9, 12] {
            let t = tracker().track(gap_labels(gap).view());
            assert_eq!(t.len(), 2, "gap {gap}");
            assert_eq!(t.origins[1].first_frame, gap + 1);
        }
    }

    #[test]
    fn test_gap_counter_resets_after_link() {
        // 0 -> (5 空) -> 6 -> (5 空) -> 12: 两段空缺各自计数.
        let mut l = Array3::<u32>::zeros((13, 12, 12));
        for t in [0, 6, 12] {
            paint_square(&mut l, t, (5, 5), 2, 3);
        }
        let t = tracker().track(l.view());
        assert_eq!(t.len(), 1);
        assert_eq!(t.origins[0].linked, 3);
    }

    #[test]
    fn test_distance_threshold() {
        let mut l = Array3::<u32>::zeros((2, 16, 16));
        paint_square(&mut l, 0, (2, 2), 2, 1);
        paint_square(&mut l, 1, (6, 2), 2, 1);
        let t = tracker().track(l.view());
        assert_eq!(t.len(), 2);
        assert_eq!(t.volume[(1, 6, 2)], 2);
    }

    #[test]
    fn test_tie_is_deterministic() {
        let mut l = Array3::<u32>::zeros((2, 12, 12));
        l[(0, 5, 5)] = 1;
        l[(1, 5, 3)] = 1;
        l[(1, 5, 7)] = 2;
        let a = tracker().track(l.view());
        let b = tracker().track(l.view());
        assert_eq!(a, b);
        // 两个候选距离均为 2, 池顺序中的第一个 (帧内标签 1) 胜出.
        assert_eq!(a.volume[(1, 5, 3)], 1);
        assert_eq!(a.volume[(1, 5, 7)], 2);
    }

    #[test]
    fn test_termination_and_coverage() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let frames = rng.random_range(1..12);
            let mut l = Array3::<u32>::zeros((frames, 20, 20));
            for t in 0..frames {
                for k in 0..rng.random_range(0..5u32) {
                    let (x, y) = (rng.random_range(0..18), rng.random_range(0..18));
                    paint_square(&mut l, t, (x, y), 2, k + 1);
                }
            }
            let pool_size = CandidatePool::from_labels(l.view()).len();
            let t = tracker().track(l.view());
            assert!(t.len() <= pool_size);
            assert_eq!(
                t.origins.iter().map(|o| o.linked).sum::<usize>(),
                pool_size
            );
            for (a, b) in l.iter().zip(t.volume.iter()) {
                assert_eq!(*a > 0, *b > 0);
            }
        }
    }

    #[test]
    fn test_from_volume() {
        let t = tracker().track(gap_labels(3).view());
        let again = Tracked::from_volume(t.volume.clone());
        assert_eq!(again.tags(), t.tags());
        assert_eq!(again.origins[0].first_frame, 0);
        assert_eq!(again.origins[0].linked, 2);
    }
}
