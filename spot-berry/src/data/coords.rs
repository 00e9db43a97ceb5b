use ndarray::{Array2, Array3, ArrayView2, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ShapeError;
use crate::{shape_fits, Idx3d, Idx4d};

/// 逐帧累积 spot 体素坐标. 调用 [`CoordsBuilder::seal`] 后得到 [`VoxelCoords`].
#[derive(Debug, Clone, Default)]
pub struct CoordsBuilder {
    rows: Vec<[u32; 4]>,
}

impl CoordsBuilder {
    /// 空的构造器.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加第 `frame` 帧的体素.
    pub fn push_frame_rows(&mut self, frame: usize, voxels: &[Idx3d]) {
        let t = frame as u32;
        self.rows.extend(
            voxels
                .iter()
                .map(|&(z, x, y)| [t, z as u32, x as u32, y as u32]),
        );
    }

    /// 将另一块的坐标追加到末尾, 其帧号统一加上 `offset`.
    pub fn append(&mut self, other: CoordsBuilder, offset: usize) {
        let offset = offset as u32;
        self.rows.extend(
            other
                .rows
                .into_iter()
                .map(|[t, z, x, y]| [t + offset, z, x, y]),
        );
    }

    /// 已累积的行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否尚未累积任何行?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 以形状 `shape = (frame, z, x, y)` 封口. 每一行都必须位于 `shape` 之内.
    pub fn seal(self, shape: Idx4d) -> Result<VoxelCoords, ShapeError> {
        VoxelCoords::from_rows(self.rows, shape)
    }

    /// 以形状 `shape` 封口, 不做越界检查. 调用者保证所有行都位于 `shape` 之内,
    /// 且行已按帧号排序.
    pub(crate) fn seal_unchecked(self, shape: Idx4d) -> VoxelCoords {
        let (t, z, x, y) = shape;
        debug_assert!(self.rows.iter().all(|r| (r[0] as usize) < t
            && (r[1] as usize) < z
            && (r[2] as usize) < x
            && (r[3] as usize) < y));
        debug_assert!(self.rows.windows(2).all(|w| w[0][0] <= w[1][0]));
        VoxelCoords {
            rows: self.rows,
            shape,
        }
    }
}

/// 已封口的体素坐标列表: 若干 `(frame, z, x, y)` 行, 加上尾部形状哨兵.
///
/// # 注意
///
/// 1. 哨兵单独保存, 永远不会被当作体素. [`VoxelCoords::to_array`]
///   会把它作为最后一行输出.
/// 2. 行按帧号稳定排序, 同一帧内保持追加顺序.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoxelCoords {
    rows: Vec<[u32; 4]>,
    shape: Idx4d,
}

impl VoxelCoords {
    /// 由行和形状构造, 并检查所有行都位于形状之内.
    ///
    /// # 注意
    ///
    /// 形状须能以 8 字节元素整体寻址, 否则返回 [`ShapeError::ShapeTooLarge`].
    /// 之后按帧重建掩码或分配逐体素缓冲时因此不会溢出.
    pub fn from_rows(mut rows: Vec<[u32; 4]>, shape: Idx4d) -> Result<Self, ShapeError> {
        let (t, z, x, y) = shape;
        if !shape_fits(&[t, z, x, y], std::mem::size_of::<u64>()) {
            return Err(ShapeError::ShapeTooLarge(shape));
        }
        let bounds = [t, z, x, y];
        if let Some((row, coord)) = rows.iter().enumerate().find(|(_, r)| {
            r.iter()
                .zip(bounds.iter())
                .any(|(&v, &b)| v as usize >= b)
        }) {
            return Err(ShapeError::CoordOutOfBounds {
                row,
                coord: *coord,
                shape,
            });
        }
        if !rows.windows(2).all(|w| w[0][0] <= w[1][0]) {
            rows.sort_by_key(|r| r[0]);
        }
        Ok(Self { rows, shape })
    }

    /// 由 N x 4 数组构造, 最后一行为形状哨兵.
    pub fn from_array(arr: ArrayView2<u32>) -> Result<Self, ShapeError> {
        let (n, cols) = arr.dim();
        if cols != 4 || n == 0 {
            return Err(ShapeError::MissingSentinel);
        }
        let last = arr.row(n - 1);
        let shape = (
            last[0] as usize,
            last[1] as usize,
            last[2] as usize,
            last[3] as usize,
        );
        let rows = arr
            .slice(ndarray::s![..n - 1, ..])
            .axis_iter(Axis(0))
            .map(|r| [r[0], r[1], r[2], r[3]])
            .collect();
        Self::from_rows(rows, shape)
    }

    /// 转换为 (N + 1) x 4 数组, 最后一行为形状哨兵.
    pub fn to_array(&self) -> Array2<u32> {
        let (t, z, x, y) = self.shape;
        let sentinel = [t as u32, z as u32, x as u32, y as u32];
        let mut arr = Array2::zeros((self.rows.len() + 1, 4));
        for (mut dst, src) in arr
            .axis_iter_mut(Axis(0))
            .zip(self.rows.iter().chain(std::iter::once(&sentinel)))
        {
            dst.iter_mut().zip(src).for_each(|(d, s)| *d = *s);
        }
        arr
    }

    /// 形状哨兵 `(frame, z, x, y)`.
    #[inline]
    pub fn shape(&self) -> Idx4d {
        self.shape
    }

    /// 所有体素行 (不含哨兵).
    #[inline]
    pub fn rows(&self) -> &[[u32; 4]] {
        &self.rows
    }

    /// 体素行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否不含任何体素?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 第 `frame` 帧的体素行.
    pub fn frame_rows(&self, frame: usize) -> &[[u32; 4]] {
        let t = frame as u32;
        let lo = self.rows.partition_point(|r| r[0] < t);
        let hi = self.rows.partition_point(|r| r[0] <= t);
        &self.rows[lo..hi]
    }

    /// 重建第 `frame` 帧的 3D 占据掩码, 形状为 `(z, x, y)`.
    pub fn reconstruct_frame(&self, frame: usize) -> Array3<bool> {
        let (_, z, x, y) = self.shape;
        let mut mask = Array3::from_elem((z, x, y), false);
        for &[_, i, j, k] in self.frame_rows(frame) {
            // 构造时已检查越界.
            mask[(i as usize, j as usize, k as usize)] = true;
        }
        mask
    }
}
