use ndarray::{Array3, ArrayView1, ArrayView3, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::{Feature, FEATURE_LEN};
use crate::data::TrackTag;

/// 特征张量, 形状 `(frame, FEATURE_LEN, track)`.
///
/// 第三维按 [`FeatureTensor::tags`] 的顺序 (标签升序) 排列.
/// 某帧中不存在的轨迹, 该帧所有字段均为 0.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureTensor {
    data: Array3<f64>,
    tags: Vec<TrackTag>,
    empty_cages: Vec<(usize, TrackTag)>,
}

impl FeatureTensor {
    pub(crate) fn new(
        data: Array3<f64>,
        tags: Vec<TrackTag>,
        empty_cages: Vec<(usize, TrackTag)>,
    ) -> Self {
        debug_assert_eq!(data.len_of(Axis(1)), FEATURE_LEN);
        debug_assert_eq!(data.len_of(Axis(2)), tags.len());
        Self {
            data,
            tags,
            empty_cages,
        }
    }

    /// 由持久化的数据重建. 空笼记录由 "有体积但背景为 `NaN`" 的位置推断.
    ///
    /// 若 `data` 的形状与 `tags` 不匹配, 返回 `None`.
    pub fn from_parts(data: Array3<f64>, tags: Vec<TrackTag>) -> Option<Self> {
        let (_, fields, n) = data.dim();
        if fields != FEATURE_LEN || n != tags.len() {
            return None;
        }
        let mut empty_cages = Vec::new();
        for (t, frame) in data.axis_iter(Axis(0)).enumerate() {
            let vol = frame.index_axis(Axis(0), Feature::Volume.index());
            let bg = frame.index_axis(Axis(0), Feature::Background.index());
            for (i, tag) in tags.iter().enumerate() {
                if vol[i] > 0.0 && bg[i].is_nan() {
                    empty_cages.push((t, *tag));
                }
            }
        }
        Some(Self {
            data,
            tags,
            empty_cages,
        })
    }

    /// 底层张量.
    #[inline]
    pub fn data(&self) -> ArrayView3<f64> {
        self.data.view()
    }

    /// 取出底层张量与标签.
    #[inline]
    pub fn into_parts(self) -> (Array3<f64>, Vec<TrackTag>) {
        (self.data, self.tags)
    }

    /// 轨迹标签, 升序.
    #[inline]
    pub fn tags(&self) -> &[TrackTag] {
        &self.tags
    }

    /// 背景笼为空的 `(frame, tag)`.
    #[inline]
    pub fn empty_cages(&self) -> &[(usize, TrackTag)] {
        &self.empty_cages
    }

    /// 帧数.
    #[inline]
    pub fn len_t(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 第 `frame` 帧第 `col` 列的字段 `field`.
    #[inline]
    pub fn get(&self, frame: usize, field: Feature, col: usize) -> f64 {
        self.data[(frame, field.index(), col)]
    }

    /// 标签 `tag` 的字段 `field` 随时间的变化. 标签不存在时返回 `None`.
    pub fn trace(&self, tag: TrackTag, field: Feature) -> Option<ArrayView1<f64>> {
        let col = self.tags.binary_search(&tag).ok()?;
        Some(
            self.data
                .index_axis(Axis(2), col)
                .index_axis_move(Axis(1), field.index()),
        )
    }

    /// 每帧中出现的轨迹个数 (体积非零).
    pub fn activations(&self) -> Vec<usize> {
        self.data
            .axis_iter(Axis(0))
            .map(|frame| {
                frame
                    .index_axis(Axis(0), Feature::Volume.index())
                    .iter()
                    .filter(|&&v| v > 0.0)
                    .count()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_and_from_parts() {
        let mut data = Array3::<f64>::zeros((3, FEATURE_LEN, 2));
        data[(0, Feature::Volume.index(), 1)] = 5.0;
        data[(0, Feature::Background.index(), 1)] = f64::NAN;
        data[(2, Feature::Volume.index(), 0)] = 4.0;
        data[(2, Feature::Volume.index(), 1)] = 6.0;
        let tags = vec![TrackTag(2), TrackTag(7)];

        let f = FeatureTensor::from_parts(data, tags.clone()).unwrap();
        assert_eq!(f.empty_cages(), &[(0, TrackTag(7))]);
        assert_eq!(f.activations(), vec![1, 0, 2]);
        assert_eq!(
            f.trace(TrackTag(7), Feature::Volume).unwrap().to_vec(),
            vec![5.0, 0.0, 6.0]
        );
        assert!(f.trace(TrackTag(3), Feature::Volume).is_none());

        assert!(FeatureTensor::from_parts(Array3::zeros((1, 3, 2)), tags).is_none());
    }
}
