//! 运行时错误.
//!
//! 结构性错误 (输入形状, 编码损坏, 非法参数) 均是致命的, 以 `Err` 返回给调用者.
//! 数值退化 (噪声拟合退化, 背景笼为空) 不是错误, 见 [`NoiseFit`] 与
//! [`FeatureTensor::empty_cages`].
//!
//! [`NoiseFit`]: crate::detect::NoiseFit
//! [`FeatureTensor::empty_cages`]: crate::feature::FeatureTensor::empty_cages

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::{Idx3d, Idx4d};

/// 输入数据形状错误.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// 时间序列中某一帧的形状与第一帧不一致.
    FrameMismatch {
        /// 出错的帧序号.
        frame: usize,
        /// 期望的 `(z, x, y)` 形状.
        expected: Idx3d,
        /// 实际的形状.
        found: Idx3d,
    },

    /// 参与同一运算的两份数据形状不一致.
    ///
    /// 第一个参数描述出错的数据, 后两个参数分别为期望与实际形状 `(frame, z, x, y)`.
    /// 对于二维 (帧, x, y) 数据, z 维记为 0.
    SeriesMismatch(&'static str, Idx4d, Idx4d),

    /// 坐标行超出了哨兵给定的形状.
    CoordOutOfBounds {
        /// 出错行的序号.
        row: usize,
        /// 出错行.
        coord: [u32; 4],
        /// 哨兵形状.
        shape: Idx4d,
    },

    /// 坐标列表缺少尾部形状哨兵, 或其布局不是 N x 4.
    MissingSentinel,

    /// 哨兵形状的元素总数超出可寻址范围.
    ShapeTooLarge(Idx4d),
}

impl Display for ShapeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameMismatch {
                frame,
                expected,
                found,
            } => write!(
                f,
                "frame {frame} has shape {found:?}, expected {expected:?}"
            ),
            Self::SeriesMismatch(what, expected, found) => {
                write!(f, "{what} has shape {found:?}, expected {expected:?}")
            }
            Self::CoordOutOfBounds { row, coord, shape } => write!(
                f,
                "coordinate row {row} {coord:?} lies outside shape {shape:?}"
            ),
            Self::MissingSentinel => f.write_str("coordinate list has no shape sentinel"),
            Self::ShapeTooLarge(shape) => write!(f, "shape {shape:?} is too large to address"),
        }
    }
}

impl Error for ShapeError {}

/// 稀疏标签解码错误. 均携带出错的行号或坐标, 便于定位损坏位置.
#[derive(Debug)]
pub enum CodecError {
    /// 编码为空, 或最后一行不是 `tag == 0` 的形状哨兵.
    MissingSentinel,

    /// 哨兵之前出现了 `tag == 0` 的行 (第二个哨兵候选). 参数为行号.
    MisplacedSentinel(usize),

    /// 数据行超出哨兵给定的形状.
    OutOfBounds {
        /// 出错行的序号.
        row: usize,
        /// 出错行的 `(z, x, y)`.
        coord: Idx3d,
        /// 哨兵形状.
        shape: Idx3d,
    },

    /// 两个数据行指向同一个体素.
    DuplicateVoxel {
        /// 第二次出现该体素的行号.
        row: usize,
        /// 重复的 `(z, x, y)`.
        coord: Idx3d,
    },

    /// 哨兵形状过大, 无法分配对应的稠密矩阵.
    ShapeTooLarge(Idx3d),

    /// 持久化数组不是 N x 4 布局. 参数为实际列数.
    BadLayout(usize),

    /// 压缩/解压的底层 I/O 错误.
    Io(std::io::Error),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSentinel => f.write_str("sparse labels have no trailing shape sentinel"),
            Self::MisplacedSentinel(row) => {
                write!(f, "row {row} has tag 0 but is not the last row")
            }
            Self::OutOfBounds { row, coord, shape } => {
                write!(f, "row {row} at {coord:?} lies outside shape {shape:?}")
            }
            Self::DuplicateVoxel { row, coord } => {
                write!(f, "row {row} repeats voxel {coord:?}")
            }
            Self::ShapeTooLarge(shape) => {
                write!(f, "sentinel shape {shape:?} is too large to decode")
            }
            Self::BadLayout(cols) => write!(f, "expected 4 columns, found {cols}"),
            Self::Io(e) => write!(f, "zlib stream: {e}"),
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// 参数非法.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 高斯核大小必须是正的有限数.
    KernelSize(f64),

    /// 检测灵敏度必须是正的有限数.
    ThresholdSigma(f64),

    /// 最小体积必须大于 0.
    MinVolume,

    /// 追踪距离阈值必须是正的有限数.
    Distance(f64),

    /// 最少活跃帧数必须大于 0.
    MinActiveFrames,

    /// 背景笼内外半径必须满足 `0 <= inner < outer`. 参数依次为内外半径.
    CageRadii(f64, f64),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::KernelSize(v) => write!(f, "kernel size must be positive, got {v}"),
            Self::ThresholdSigma(v) => write!(f, "threshold sigma must be positive, got {v}"),
            Self::MinVolume => f.write_str("min volume must be at least 1"),
            Self::Distance(v) => write!(f, "distance threshold must be positive, got {v}"),
            Self::MinActiveFrames => f.write_str("min active frames must be at least 1"),
            Self::CageRadii(i, o) => write!(f, "cage radii must satisfy 0 <= {i} < {o}"),
        }
    }
}

impl Error for ConfigError {}

/// 完整分析流程的错误.
#[derive(Debug)]
pub enum PipelineError {
    /// 参数非法.
    Config(ConfigError),

    /// 中间结果形状不一致.
    Shape(ShapeError),
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid options: {e}"),
            Self::Shape(e) => write!(f, "inconsistent shapes: {e}"),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Shape(e) => Some(e),
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ShapeError> for PipelineError {
    fn from(e: ShapeError) -> Self {
        Self::Shape(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_location() {
        let e = CodecError::DuplicateVoxel {
            row: 7,
            coord: (1, 2, 3),
        };
        assert!(e.to_string().contains("row 7"));

        let e = ShapeError::FrameMismatch {
            frame: 2,
            expected: (3, 4, 4),
            found: (3, 4, 5),
        };
        assert!(e.to_string().contains("frame 2"));
    }

    #[test]
    fn test_pipeline_error_source() {
        let e = PipelineError::from(ConfigError::MinVolume);
        assert!(e.source().is_some());
    }
}
