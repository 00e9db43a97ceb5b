#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 对时序 3D 荧光显微图像 (每帧为 z-x-y 体数据) 中的转录位点 (spot)
//! 进行检测、跨帧追踪和背景/强度特征提取.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 输入数据按 `(frame, z, x, y)` 组织, 体素值为非负整数 (`u16`).
//!   原始文件格式 (czi, tiff 等) 的解析不在本 crate 的范围内.
//! 2. 每帧检测得到的标签 ([`FrameLabel`]) 只在该帧内有意义;
//!   追踪完成后赋予的标签 ([`TrackTag`]) 才在整个时间序列内一致.
//!   两者不可混用.
//! 3. 结构性错误 (形状不一致, 编码损坏) 以 `Err` 返回;
//!   数值退化情形 (噪声拟合方差为零, 背景笼为空) 在局部恢复, 以约定的哨兵值表示.
//!
//! # 开发计划
//!
//! ### 稀疏标签编解码 ✅
//!
//! 以 `(tag, z, x, y)` 行 + 尾部形状哨兵的形式无损地保存大体积、稀疏的标签矩阵,
//! 并提供 zlib 压缩形式.
//!
//! 实现位于 `spot-berry/src/codec.rs`.
//!
//! ### 单帧 3D spot 检测 ✅
//!
//! 高斯平滑 -> 离散拉普拉斯 -> 噪声模型拟合阈值 -> 26-连通区域标记 -> 体积与
//! z 平面数过滤. 同时输出 z 方向投影的强度图与体积图.
//!
//! 实现位于 `spot-berry/src/detect`.
//!
//! ### 分块检测 ✅
//!
//! 将长时间序列切分为若干块以限制内存峰值, 块内多帧并行检测,
//! 再按帧序拼接, 并做 2D 重标记与合并半径融合.
//!
//! 实现位于 `spot-berry/src/detect/chunked.rs`.
//!
//! ### 贪心时空追踪 ✅
//!
//! 以 2D 质心最近邻规则将各帧 spot 串联成轨迹, 容忍短暂的检测空缺.
//!
//! 实现位于 `spot-berry/src/track`.
//!
//! ### 背景笼与特征提取 ✅
//!
//! 对每条轨迹的每一帧重建 3D 足迹, 构造外围空心 "笼" 估计局部背景,
//! 计算体积、积分强度、背景、强度/背景比值与质心.
//!
//! 实现位于 `spot-berry/src/feature`.
//!
//! ### 分析结果归档 ✅
//!
//! 将一次完整分析 (检测, 追踪, 特征, 参数) 保存为 npz 文件并可重新加载.
//!
//! 实现位于 `spot-berry/src/archive`.

/// 二维索引 `(x, y)`, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引 `(z, x, y)`, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 带时间维的四维索引 `(frame, z, x, y)`.
pub type Idx4d = (usize, usize, usize, usize);

/// 浮点质心 `(z, x, y)`.
pub type Centroid3d = (f64, f64, f64);

type Area2d = Vec<Idx2d>;
type Areas2d = Vec<Area2d>;
type Area3d = Vec<Idx3d>;
type Areas3d = Vec<Area3d>;

/// 以 `elem` 字节的元素分配形状 `dims` 的稠密数组是否可行?
///
/// 与 `ndarray` 的判定一致: 忽略长度为 0 的轴, 其余轴长之积的字节数不得超过 `isize::MAX`.
pub(crate) fn shape_fits(dims: &[usize], elem: usize) -> bool {
    dims.iter()
        .filter(|&&d| d > 0)
        .try_fold(elem, |acc, &d| acc.checked_mul(d))
        .is_some_and(|bytes| bytes <= isize::MAX as usize)
}

/// 时间序列与体素坐标等基础数据结构.
mod data;

pub use data::{CoordsBuilder, FrameLabel, IntensitySeries, TrackTag, VoxelCoords};

pub mod archive;
pub mod codec;
pub mod config;
pub mod consts;
pub mod detect;
pub mod error;
pub mod feature;
pub mod morph;
pub mod pipeline;
pub mod prelude;
pub mod progress;
pub mod track;

#[cfg(test)]
mod test_utils;
