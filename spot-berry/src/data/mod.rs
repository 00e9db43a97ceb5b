use std::fmt::{self, Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod coords;
mod series;

pub use coords::{CoordsBuilder, VoxelCoords};
pub use series::IntensitySeries;

/// 单帧检测得到的 spot 标签. 仅在该帧内有意义, 不同帧的相同取值毫无关联.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameLabel(pub u32);

/// 追踪完成后赋予的轨迹标签. 在整个时间序列内一致.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackTag(pub u32);

impl FrameLabel {
    /// 底层标签值.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl TrackTag {
    /// 底层标签值.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Display for FrameLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl Display for TrackTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
