use std::num::NonZeroUsize;
use std::ops::Index;

use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ShapeError;
use crate::{Idx3d, Idx4d};

/// 时序 3D 荧光强度数据, 按 `(frame, z, x, y)` 组织. 构造后不可变.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntensitySeries {
    data: Array4<u16>,
}

impl Index<Idx4d> for IntensitySeries {
    type Output = u16;

    #[inline]
    fn index(&self, index: Idx4d) -> &Self::Output {
        &self.data[index]
    }
}

impl From<Array4<u16>> for IntensitySeries {
    #[inline]
    fn from(data: Array4<u16>) -> Self {
        Self::new(data)
    }
}

impl IntensitySeries {
    /// 直接由 4D 数组构造. 四维数组天然保证每帧形状一致.
    #[inline]
    pub fn new(data: Array4<u16>) -> Self {
        Self { data }
    }

    /// 由若干帧构造.
    ///
    /// # 注意
    ///
    /// 所有帧的形状必须与第一帧一致, 否则返回 [`ShapeError::FrameMismatch`].
    /// 空迭代器得到 0 帧的序列.
    pub fn from_frames<I>(frames: I) -> Result<Self, ShapeError>
    where
        I: IntoIterator<Item = Array3<u16>>,
    {
        let frames: Vec<Array3<u16>> = frames.into_iter().collect();
        let Some(first) = frames.first() else {
            return Ok(Self::new(Array4::zeros((0, 0, 0, 0))));
        };
        let expected = first.dim();
        if let Some((frame, found)) = frames
            .iter()
            .map(|f| f.dim())
            .enumerate()
            .find(|(_, d)| *d != expected)
        {
            return Err(ShapeError::FrameMismatch {
                frame,
                expected,
                found,
            });
        }

        let (z, x, y) = expected;
        let data = Array4::from_shape_fn((frames.len(), z, x, y), |(t, i, j, k)| {
            frames[t][(i, j, k)]
        });
        Ok(Self::new(data))
    }

    /// 形状 `(frame, z, x, y)`.
    #[inline]
    pub fn shape(&self) -> Idx4d {
        self.data.dim()
    }

    /// 单帧形状 `(z, x, y)`.
    #[inline]
    pub fn frame_shape(&self) -> Idx3d {
        let (_, z, x, y) = self.shape();
        (z, x, y)
    }

    /// 帧数.
    #[inline]
    pub fn len_t(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 是否不含任何帧?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len_t() == 0
    }

    /// 第 `t` 帧的只读视图.
    ///
    /// # 注意
    ///
    /// 越界时 panic.
    #[inline]
    pub fn frame_at(&self, t: usize) -> ArrayView3<u16> {
        self.data.index_axis(Axis(0), t)
    }

    /// 按帧序遍历.
    pub fn frame_iter(&self) -> impl ExactSizeIterator<Item = ArrayView3<u16>> {
        self.data.axis_iter(Axis(0))
    }

    /// 按每块至多 `size` 帧分块. 产出 `(起始帧, 块视图)`, 块按帧序排列, 最后一块可能较小.
    pub fn chunks(&self, size: NonZeroUsize) -> impl Iterator<Item = (usize, ArrayView4<u16>)> {
        let size = size.get();
        self.data
            .axis_chunks_iter(Axis(0), size)
            .enumerate()
            .map(move |(i, c)| (i * size, c))
    }

    /// 底层 4D 数组.
    #[inline]
    pub fn data(&self) -> ArrayView4<u16> {
        self.data.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_frames_mismatch() {
        let frames = vec![
            Array3::<u16>::zeros((2, 3, 3)),
            Array3::<u16>::zeros((2, 3, 3)),
            Array3::<u16>::zeros((2, 3, 4)),
        ];
        assert_eq!(
            IntensitySeries::from_frames(frames),
            Err(ShapeError::FrameMismatch {
                frame: 2,
                expected: (2, 3, 3),
                found: (2, 3, 4),
            })
        );
    }

    #[test]
    fn test_from_frames_and_chunks() {
        let frames = (0..5u16).map(|t| Array3::from_elem((1, 2, 2), t));
        let s = IntensitySeries::from_frames(frames).unwrap();
        assert_eq!(s.shape(), (5, 1, 2, 2));
        assert_eq!(s[(3, 0, 1, 1)], 3);

        let chunks: Vec<_> = s
            .chunks(NonZeroUsize::new(2).unwrap())
            .map(|(start, c)| (start, c.len_of(Axis(0))))
            .collect();
        assert_eq!(chunks, vec![(0, 2), (2, 2), (4, 1)]);
        assert_eq!(s.frame_iter().len(), 5);
        assert!(IntensitySeries::from_frames(vec![]).unwrap().is_empty());
    }
}
