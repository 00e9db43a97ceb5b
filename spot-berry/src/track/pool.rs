//! 待追踪的 spot 候选池.

use std::collections::BTreeMap;

use ndarray::{ArrayView3, Axis};
use ordered_float::NotNan;

use crate::consts::label::is_spot;
use crate::data::FrameLabel;
use crate::{Area2d, Idx2d};

/// 单帧中的一个 2D spot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub(crate) label: FrameLabel,
    pub(crate) frame: usize,

    /// 像素均值, 四舍六入五成双.
    pub(crate) centroid: (f64, f64),
    pub(crate) pixels: Area2d,
}

/// 半数取偶的质心.
fn rounded_centroid(pixels: &[Idx2d]) -> (f64, f64) {
    debug_assert!(!pixels.is_empty());
    let n = pixels.len() as f64;
    let (sx, sy) = pixels
        .iter()
        .fold((0usize, 0usize), |(a, b), &(x, y)| (a + x, b + y));
    (
        (sx as f64 / n).round_ties_even(),
        (sy as f64 / n).round_ties_even(),
    )
}

/// 按帧分桶的候选池. 桶内按标签升序, 即稳定的 `(frame, label)` 顺序.
#[derive(Debug, Clone)]
pub(crate) struct CandidatePool {
    frames: Vec<Vec<Candidate>>,
    remaining: usize,

    /// 第一个可能非空的桶.
    cursor: usize,
}

impl CandidatePool {
    /// 收集 `(frame, x, y)` 标签矩阵中每一帧的每一个标签.
    pub(crate) fn from_labels(labels: ArrayView3<u32>) -> Self {
        let frames: Vec<Vec<Candidate>> = labels
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(frame, slice)| {
                let mut groups: BTreeMap<u32, Area2d> = BTreeMap::new();
                for (pos, &l) in slice.indexed_iter() {
                    if is_spot(l) {
                        groups.entry(l).or_default().push(pos);
                    }
                }
                groups
                    .into_iter()
                    .map(|(l, pixels)| Candidate {
                        label: FrameLabel(l),
                        frame,
                        centroid: rounded_centroid(&pixels),
                        pixels,
                    })
                    .collect()
            })
            .collect();
        let remaining = frames.iter().map(Vec::len).sum();
        Self {
            frames,
            remaining,
            cursor: 0,
        }
    }

    /// 剩余候选个数.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.remaining
    }

    /// 取出最早一帧中的第一个候选.
    pub(crate) fn pop_seed(&mut self) -> Option<Candidate> {
        while self.cursor < self.frames.len() && self.frames[self.cursor].is_empty() {
            self.cursor += 1;
        }
        let bucket = self.frames.get_mut(self.cursor)?;
        self.remaining -= 1;
        Some(bucket.remove(0))
    }

    /// 第 `frame` 帧中离 `reference` 最近的候选: `(桶内下标, 欧氏距离)`.
    /// 距离相同时取池顺序中的第一个. 该帧没有候选时返回 `None`.
    pub(crate) fn nearest(&self, frame: usize, reference: (f64, f64)) -> Option<(usize, f64)> {
        self.frames
            .get(frame)?
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let d = (c.centroid.0 - reference.0).hypot(c.centroid.1 - reference.1);
                NotNan::new(d).ok().map(|d| (d, i))
            })
            .min_by_key(|&(d, _)| d)
            .map(|(d, i)| (i, d.into_inner()))
    }

    /// 从池中移除第 `frame` 帧桶内下标为 `idx` 的候选.
    pub(crate) fn take(&mut self, frame: usize, idx: usize) -> Candidate {
        self.remaining -= 1;
        self.frames[frame].remove(idx)
    }
}
