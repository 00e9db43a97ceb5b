//! 稀疏标签编解码.
//!
//! 检测与追踪产生的标签矩阵体积巨大且几乎全为 0. 我们只保存非零体素,
//! 每个体素一行 `(tag, z, x, y)`, 并在末尾追加一行形状哨兵 `(0, z_len, x_len, y_len)`.
//! 由于 `tag == 0` 表示背景, 哨兵永远不会与真实体素混淆.

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::label::{is_spot, BACKGROUND};
use crate::error::CodecError;
use crate::{shape_fits, Idx3d};

/// 单行字节数.
const ROW_BYTES: usize = 4 * std::mem::size_of::<u32>();

/// 稀疏编码的 3D 标签矩阵. 最后一行恒为形状哨兵.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SparseLabels {
    rows: Vec<[u32; 4]>,
}

impl SparseLabels {
    /// 编码. 非零体素按行优先顺序输出, 随后是哨兵.
    pub fn encode(labels: ArrayView3<u32>) -> Self {
        let (d0, d1, d2) = labels.dim();
        let mut rows: Vec<[u32; 4]> = labels
            .indexed_iter()
            .filter(|(_, &v)| is_spot(v))
            .map(|((z, x, y), &v)| [v, z as u32, x as u32, y as u32])
            .collect();
        rows.push([BACKGROUND, d0 as u32, d1 as u32, d2 as u32]);
        Self { rows }
    }

    /// 解码为稠密标签矩阵.
    ///
    /// # 注意
    ///
    /// 任何结构损坏都会返回带行号的 [`CodecError`], 而不是产出部分结果.
    pub fn decode(&self) -> Result<Array3<u32>, CodecError> {
        let shape = self.shape().ok_or(CodecError::MissingSentinel)?;
        let (d0, d1, d2) = shape;
        if !shape_fits(&[d0, d1, d2], std::mem::size_of::<u32>()) {
            return Err(CodecError::ShapeTooLarge(shape));
        }
        let mut out = Array3::<u32>::zeros(shape);
        for (row, &[tag, z, x, y]) in self.data_rows().iter().enumerate() {
            if !is_spot(tag) {
                return Err(CodecError::MisplacedSentinel(row));
            }
            let coord = (z as usize, x as usize, y as usize);
            if coord.0 >= d0 || coord.1 >= d1 || coord.2 >= d2 {
                return Err(CodecError::OutOfBounds { row, coord, shape });
            }
            let slot = &mut out[coord];
            if is_spot(*slot) {
                return Err(CodecError::DuplicateVoxel { row, coord });
            }
            *slot = tag;
        }
        Ok(out)
    }

    /// 直接由行构造. 不做任何检查, 损坏会在 [`SparseLabels::decode`] 时暴露.
    #[inline]
    pub fn from_rows(rows: Vec<[u32; 4]>) -> Self {
        Self { rows }
    }

    /// 全部行, 包括哨兵.
    #[inline]
    pub fn rows(&self) -> &[[u32; 4]] {
        &self.rows
    }

    /// 哨兵之前的数据行. 缺少哨兵时返回全部行.
    pub fn data_rows(&self) -> &[[u32; 4]] {
        match self.rows.split_last() {
            Some((last, data)) if !is_spot(last[0]) => data,
            _ => &self.rows,
        }
    }

    /// 哨兵记录的形状. 缺少哨兵时返回 `None`.
    pub fn shape(&self) -> Option<Idx3d> {
        match self.rows.last() {
            Some(&[tag, z, x, y]) if !is_spot(tag) => Some((z as usize, x as usize, y as usize)),
            _ => None,
        }
    }

    /// 非零体素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.data_rows().len()
    }

    /// 是否不含任何非零体素?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 转换为 N x 4 数组, 以便以 npy 格式持久化.
    pub fn into_array(self) -> Array2<u32> {
        let rows = self.rows;
        Array2::from_shape_fn((rows.len(), 4), |(i, j)| rows[i][j])
    }

    /// 由 N x 4 数组构造.
    pub fn from_array(arr: ArrayView2<u32>) -> Result<Self, CodecError> {
        let cols = arr.ncols();
        if cols != 4 {
            return Err(CodecError::BadLayout(cols));
        }
        let rows = arr
            .axis_iter(Axis(0))
            .map(|r| [r[0], r[1], r[2], r[3]])
            .collect();
        Ok(Self { rows })
    }

    /// 以 zlib 压缩行数据 (小端序).
    pub fn compress(&self) -> Result<CompactSparseLabels, CodecError> {
        let mut e = ZlibEncoder::new(
            Vec::with_capacity(self.rows.len() * ROW_BYTES / 4),
            Compression::best(),
        );
        for row in &self.rows {
            for v in row {
                e.write_all(&v.to_le_bytes())?;
            }
        }
        Ok(CompactSparseLabels {
            buf: e.finish()?,
            rows: self.rows.len(),
        })
    }
}

/// 压缩存储的 [`SparseLabels`]; 不透明类型.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompactSparseLabels {
    /// 压缩的不透明字节流.
    buf: Vec<u8>,

    /// 行数, 包括哨兵.
    rows: usize,
}

impl CompactSparseLabels {
    /// 压缩后的字节数.
    #[inline]
    pub fn compressed_len(&self) -> usize {
        self.buf.len()
    }

    /// 解压缩数据.
    pub fn decompress(&self) -> Result<SparseLabels, CodecError> {
        let mut d = ZlibDecoder::new(self.buf.as_slice());
        let mut buf = Vec::with_capacity(self.rows * ROW_BYTES);
        d.read_to_end(&mut buf)?;
        if buf.len() != self.rows * ROW_BYTES {
            return Err(CodecError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} bytes for {} rows", buf.len(), self.rows),
            )));
        }
        let rows = buf
            .chunks_exact(ROW_BYTES)
            .map(|c| {
                let mut row = [0u32; 4];
                for (v, b) in row.iter_mut().zip(c.chunks_exact(4)) {
                    *v = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                }
                row
            })
            .collect();
        Ok(SparseLabels { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_labels(rng: &mut StdRng, shape: Idx3d, density: f64) -> Array3<u32> {
        Array3::from_shape_fn(shape, |_| {
            if rng.random_bool(density) {
                rng.random_range(1..1000)
            } else {
                0
            }
        })
    }

    #[test]
    fn test_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for shape in [(1, 1, 1), (3, 7, 5), (9, 16, 16), (0, 4, 4)] {
            for density in [0.0, 0.01, 0.3, 1.0] {
                let l = random_labels(&mut rng, shape, density);
                let s = SparseLabels::encode(l.view());
                assert_eq!(s.shape(), Some(shape));
                assert_eq!(s.len(), l.iter().filter(|&&v| v != 0).count());
                assert_eq!(s.decode().unwrap(), l);
            }
        }
    }

    #[test]
    fn test_row_major_order() {
        let mut l = Array3::<u32>::zeros((2, 2, 2));
        l[(1, 0, 1)] = 4;
        l[(0, 1, 0)] = 9;
        let s = SparseLabels::encode(l.view());
        assert_eq!(s.rows(), &[[9, 0, 1, 0], [4, 1, 0, 1], [0, 2, 2, 2]]);
    }

    #[test]
    fn test_integrity_errors() {
        let missing = SparseLabels::from_rows(vec![]);
        assert!(matches!(missing.decode(), Err(CodecError::MissingSentinel)));

        let no_tail = SparseLabels::from_rows(vec![[1, 0, 0, 0]]);
        assert!(matches!(no_tail.decode(), Err(CodecError::MissingSentinel)));

        let two_sentinels = SparseLabels::from_rows(vec![[1, 0, 0, 0], [0, 2, 2, 2], [0, 2, 2, 2]]);
        assert!(matches!(
            two_sentinels.decode(),
            Err(CodecError::MisplacedSentinel(1))
        ));

        let outside = SparseLabels::from_rows(vec![[3, 0, 0, 0], [3, 1, 2, 0], [0, 2, 2, 2]]);
        match outside.decode() {
            Err(CodecError::OutOfBounds { row, coord, shape }) => {
                assert_eq!((row, coord, shape), (1, (1, 2, 0), (2, 2, 2)));
            }
            e => panic!("unexpected {e:?}"),
        }

        let dup = SparseLabels::from_rows(vec![[3, 0, 1, 0], [5, 0, 1, 0], [0, 2, 2, 2]]);
        assert!(matches!(
            dup.decode(),
            Err(CodecError::DuplicateVoxel {
                row: 1,
                coord: (0, 1, 0)
            })
        ));

        let huge = SparseLabels::from_rows(vec![[0, u32::MAX, u32::MAX, u32::MAX]]);
        let max = u32::MAX as usize;
        assert!(matches!(
            huge.decode(),
            Err(CodecError::ShapeTooLarge(s)) if s == (max, max, max)
        ));
        // 零长度轴不掩盖其余轴的溢出.
        let flat_huge = SparseLabels::from_rows(vec![[0, 0, u32::MAX, u32::MAX]]);
        assert!(matches!(flat_huge.decode(), Err(CodecError::ShapeTooLarge(_))));

        let bad = Array2::<u32>::zeros((3, 3));
        assert!(matches!(
            SparseLabels::from_array(bad.view()),
            Err(CodecError::BadLayout(3))
        ));
    }

    #[test]
    fn test_compress_and_array() {
        let mut rng = StdRng::seed_from_u64(7);
        let l = random_labels(&mut rng, (4, 32, 32), 0.05);
        let s = SparseLabels::encode(l.view());
        let c = s.compress().unwrap();
        let back = c.decompress().unwrap();
        assert_eq!(back, s);

        let arr = back.into_array();
        assert_eq!(arr.ncols(), 4);
        let again = SparseLabels::from_array(arr.view()).unwrap();
        assert_eq!(again.decode().unwrap(), l);
    }
}
