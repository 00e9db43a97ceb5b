//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Centroid3d, Idx2d, Idx3d, Idx4d};
pub use crate::{CoordsBuilder, FrameLabel, IntensitySeries, TrackTag, VoxelCoords};

pub use crate::config::{DetectConfig, FeatureConfig, PipelineConfig, TrackConfig};
pub use crate::consts::label::{is_background, is_spot, BACKGROUND};
pub use crate::consts::{Feature, FEATURE_LEN};

pub use crate::codec::{CompactSparseLabels, SparseLabels};
pub use crate::detect::{detect, preview, ChunkedDetection, ChunkedDetector, NoiseFit};
pub use crate::feature::{FeatureExtractor, FeatureTensor};
pub use crate::track::{SpotTracker, Tracked};

pub use crate::pipeline::{Analysis, Pipeline, Stage};
pub use crate::progress::{LogProgress, NoProgress, Progress};

pub use crate::archive::{home_analysis_dir_with, AnalysisArchive, ArchiveError};
pub use crate::error::{CodecError, ConfigError, PipelineError, ShapeError};
