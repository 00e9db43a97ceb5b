//! 通用常量.

/// 标签矩阵中的取值约定.
pub mod label {
    /// 背景的标签值.
    pub const BACKGROUND: u32 = 0;

    /// 标签是否是背景?
    #[inline]
    pub const fn is_background(p: u32) -> bool {
        p == BACKGROUND
    }

    /// 标签是否属于某个 spot?
    #[inline]
    pub const fn is_spot(p: u32) -> bool {
        p != BACKGROUND
    }
}

/// 默认高斯平滑核大小 (标准差, 以体素为单位).
pub const DEFAULT_KERNEL_SIZE: f64 = 1.0;

/// 默认检测灵敏度: 阈值为 `mu + k * sigma` 中的 `k`.
pub const DEFAULT_THRESHOLD_SIGMA: f64 = 5.0;

/// 默认最小 spot 体积 (体素个数). 体积 **不大于** 该值的候选会被丢弃.
pub const DEFAULT_MIN_VOLUME: usize = 4;

/// 默认的相邻帧间质心最大位移 (像素).
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 3.0;

/// 默认的轨迹最少活跃帧数.
pub const DEFAULT_MIN_ACTIVE_FRAMES: usize = 2;

/// 背景笼内半径 (体素).
pub const CAGE_INNER: f64 = 3.0;

/// 背景笼外半径 (体素).
pub const CAGE_OUTER: f64 = 5.0;

/// 追踪时允许连续空缺的最大帧数.
pub const MAX_GAP_FRAMES: usize = 8;

/// 分块大小 = 可用并行核心数 * `CHUNK_FACTOR`.
pub const CHUNK_FACTOR: usize = 3;

/// 高斯核截断位置 (以标准差为单位).
pub const GAUSS_TRUNCATE: f64 = 4.0;

/// 特征张量中每个 spot 每帧的字段个数.
pub const FEATURE_LEN: usize = 7;

/// 特征张量的字段. 取值即为该字段在特征维上的下标.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Feature {
    /// 体积 (体素个数).
    Volume = 0,

    /// 积分强度.
    Intensity = 1,

    /// 背景笼内平均强度.
    Background = 2,

    /// 积分强度 / 背景.
    Ratio = 3,

    /// 质心 z 坐标.
    CentroidZ = 4,

    /// 质心 x 坐标.
    CentroidX = 5,

    /// 质心 y 坐标.
    CentroidY = 6,
}

impl Feature {
    /// 按特征维顺序排列的全部字段.
    pub const ALL: [Feature; FEATURE_LEN] = [
        Feature::Volume,
        Feature::Intensity,
        Feature::Background,
        Feature::Ratio,
        Feature::CentroidZ,
        Feature::CentroidX,
        Feature::CentroidY,
    ];

    /// 字段在特征维上的下标.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 字段的可读名称.
    pub const fn name(self) -> &'static str {
        match self {
            Feature::Volume => "volume",
            Feature::Intensity => "intensity",
            Feature::Background => "background",
            Feature::Ratio => "ints by bckg",
            Feature::CentroidZ => "z-coord",
            Feature::CentroidX => "x-coord",
            Feature::CentroidY => "y-coord",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Feature, FEATURE_LEN};

    #[test]
    fn test_feature_index_order() {
        for (i, f) in Feature::ALL.iter().enumerate() {
            assert_eq!(f.index(), i);
        }
        assert_eq!(Feature::ALL.len(), FEATURE_LEN);
    }
}
