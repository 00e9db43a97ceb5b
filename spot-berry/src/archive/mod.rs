//! 分析结果归档.
//!
//! 一次完整分析保存为单个压缩 npz 文件, 包含以下条目:
//!
//! | 条目 | 类型 | 内容 |
//! |-----|------|-----|
//! | `features` | `f64`, 3D | 特征张量 `(frame, field, track)` |
//! | `tags` | `u32`, 1D | 特征张量第三维对应的轨迹标签 |
//! | `coords` | `u32`, N x 4 | 全部 spot 体素坐标, 尾行为形状哨兵 |
//! | `spots_intensity` | `u32`, N x 4 | 强度投影的稀疏编码 |
//! | `spots_volume` | `u32`, N x 4 | 体积投影的稀疏编码 |
//! | `labels_2d` | `u32`, N x 4 | 逐帧 2D 标签的稀疏编码 |
//! | `tracked` | `u32`, N x 4 | 轨迹标签矩阵的稀疏编码 |
//! | `origins` | `u32`, N x 4 | 轨迹来源 `(tag, first_frame, seed, linked)` |
//! | `params` | `f64`, 1D | 分析参数, 见 `params.rs` |
//!
//! 稀疏编码见 [`SparseLabels`]. 其中 `(tag, z, x, y)` 的 `z` 位置存放帧号.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use ndarray::{Array, Array1, Array2, Array3, Dimension, Ix1, Ix2, Ix3, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpzError, ReadableElement, WriteNpzError};

use crate::codec::SparseLabels;
use crate::config::PipelineConfig;
use crate::data::{FrameLabel, TrackTag};
use crate::detect::ChunkedDetection;
use crate::error::{CodecError, ConfigError, ShapeError};
use crate::feature::FeatureTensor;
use crate::pipeline::Analysis;
use crate::track::{TrackOrigin, Tracked};
use crate::VoxelCoords;

mod params;

const FEATURES: &str = "features";
const TAGS: &str = "tags";
const COORDS: &str = "coords";
const SPOTS_INTENSITY: &str = "spots_intensity";
const SPOTS_VOLUME: &str = "spots_volume";
const LABELS_2D: &str = "labels_2d";
const TRACKED: &str = "tracked";
const ORIGINS: &str = "origins";
const PARAMS: &str = "params";

/// 读写归档文件错误.
#[derive(Debug)]
pub enum ArchiveError {
    /// 底层 I/O 错误.
    Io(io::Error),

    /// 读取 npz 文件错误.
    ReadNpz(ReadNpzError),

    /// 写入 npz 文件错误.
    WriteNpz(WriteNpzError),

    /// 稀疏编码损坏.
    Codec(CodecError),

    /// 坐标列表损坏.
    Shape(ShapeError),

    /// 缺少条目.
    MissingEntry(&'static str),

    /// 条目之间形状不一致.
    Inconsistent(&'static str),

    /// 参数向量长度不对.
    ParamsLen(usize),

    /// 参数向量中给定下标的整数项非法.
    Params(usize),

    /// 参数向量可以解析, 但参数本身非法.
    Config(ConfigError),

    /// 强度投影的值超出了 `u32` 的表示范围, 无法稀疏编码.
    Overflow(u64),
}

impl Display for ArchiveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::ReadNpz(e) => write!(f, "cannot read npz: {e}"),
            Self::WriteNpz(e) => write!(f, "cannot write npz: {e}"),
            Self::Codec(e) => write!(f, "corrupted sparse entry: {e}"),
            Self::Shape(e) => write!(f, "corrupted coordinates: {e}"),
            Self::MissingEntry(name) => write!(f, "entry `{name}` not found"),
            Self::Inconsistent(name) => write!(f, "entry `{name}` disagrees with the others"),
            Self::ParamsLen(n) => write!(
                f,
                "params has {n} entries, expected {}",
                params::PARAMS_LEN
            ),
            Self::Params(i) => write!(f, "params[{i}] is not a non-negative integer"),
            Self::Config(e) => write!(f, "invalid stored options: {e}"),
            Self::Overflow(v) => write!(f, "intensity {v} does not fit in u32"),
        }
    }
}

impl Error for ArchiveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::ReadNpz(e) => Some(e),
            Self::WriteNpz(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Shape(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($src: ty => $variant: ident),* $(,)?) => {
        $(
            impl From<$src> for ArchiveError {
                fn from(e: $src) -> Self {
                    Self::$variant(e)
                }
            }
        )*
    };
}

impl_from! {
    io::Error => Io,
    ReadNpzError => ReadNpz,
    WriteNpzError => WriteNpz,
    CodecError => Codec,
    ShapeError => Shape,
    ConfigError => Config,
}

/// 获取 `{用户主目录}/analysis` 目录下给定继续项组成的全路径.
pub fn home_analysis_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("analysis");
    ans.extend(it);
    Some(ans)
}

/// 从硬盘加载的一次完整分析.
#[derive(Debug, Clone)]
pub struct AnalysisArchive {
    /// 分析结果.
    pub analysis: Analysis,

    /// 产生该结果的参数.
    pub config: PipelineConfig,
}

/// 按条目名读取. 兼容带或不带 `.npy` 后缀的条目名.
struct Entries {
    npz: NpzReader<File>,
    names: Vec<String>,
}

impl Entries {
    fn new(file: File) -> Result<Self, ArchiveError> {
        let mut npz = NpzReader::new(file)?;
        let names = npz.names()?;
        Ok(Self { npz, names })
    }

    fn resolve(&self, stem: &'static str) -> Option<&str> {
        self.names
            .iter()
            .map(String::as_str)
            .find(|n| n.strip_suffix(".npy").unwrap_or(n) == stem)
    }

    fn read<A: ReadableElement, D: Dimension>(
        &mut self,
        stem: &'static str,
    ) -> Result<Array<A, D>, ArchiveError> {
        let name = self
            .resolve(stem)
            .ok_or(ArchiveError::MissingEntry(stem))?
            .to_owned();
        Ok(self.npz.by_name::<OwnedRepr<A>, D>(&name)?)
    }

    fn read_sparse(&mut self, stem: &'static str) -> Result<Array3<u32>, ArchiveError> {
        let rows = self.read::<u32, Ix2>(stem)?;
        Ok(SparseLabels::from_array(rows.view())?.decode()?)
    }
}

fn origins_to_array(origins: &[TrackOrigin]) -> Array2<u32> {
    Array2::from_shape_fn((origins.len(), 4), |(i, j)| {
        let o = &origins[i];
        match j {
            0 => o.tag.get(),
            1 => o.first_frame as u32,
            2 => o.seed.get(),
            _ => o.linked as u32,
        }
    })
}

fn origins_from_array(arr: Array2<u32>) -> Result<Vec<TrackOrigin>, ArchiveError> {
    if arr.ncols() != 4 {
        return Err(ArchiveError::Inconsistent(ORIGINS));
    }
    Ok(arr
        .rows()
        .into_iter()
        .map(|r| TrackOrigin {
            tag: TrackTag(r[0]),
            first_frame: r[1] as usize,
            seed: FrameLabel(r[2]),
            linked: r[3] as usize,
        })
        .collect())
}

impl AnalysisArchive {
    /// 把 `analysis` 及其参数 `cfg` 写入路径 `path`, 已存在的文件会被覆盖.
    ///
    /// # 注意
    ///
    /// 强度投影以 `u32` 稀疏编码. 若某一像素的累加强度超出 `u32`,
    /// 返回 [`ArchiveError::Overflow`] 且不会创建文件.
    pub fn save<P: AsRef<Path>>(
        analysis: &Analysis,
        cfg: &PipelineConfig,
        path: P,
    ) -> Result<(), ArchiveError> {
        let det = &analysis.detection;
        if let Some(&v) = det
            .spots_intensity
            .iter()
            .find(|&&v| v > u64::from(u32::MAX))
        {
            return Err(ArchiveError::Overflow(v));
        }
        let intensity = det.spots_intensity.mapv(|v| v as u32);
        let tags: Array1<u32> = analysis.features.tags().iter().map(|t| t.get()).collect();

        let file = File::create(path.as_ref())?;
        let mut npz = NpzWriter::new_compressed(file);
        npz.add_array(FEATURES, &analysis.features.data())?;
        npz.add_array(TAGS, &tags)?;
        npz.add_array(COORDS, &det.coords.to_array())?;
        for (name, labels) in [
            (SPOTS_INTENSITY, &intensity),
            (SPOTS_VOLUME, &det.spots_volume),
            (LABELS_2D, &det.labels_2d),
            (TRACKED, &analysis.tracked.volume),
        ] {
            npz.add_array(name, &SparseLabels::encode(labels.view()).into_array())?;
        }
        npz.add_array(ORIGINS, &origins_to_array(&analysis.tracked.origins))?;
        npz.add_array(PARAMS, &params::encode(cfg))?;
        npz.finish()?;

        log::info!("Saved analysis to {}", path.as_ref().display());
        Ok(())
    }

    /// 从路径 `path` 加载归档. 缺少 `origins` 条目时由轨迹标签矩阵推断.
    ///
    /// # 注意
    ///
    /// 归档不保存原始序列, 坐标哨兵中的 z 只受越界与可寻址检查.
    /// 与实际序列的深度不符时, 由 [`FeatureExtractor::extract`] 报告
    /// [`ShapeError::SeriesMismatch`].
    ///
    /// [`FeatureExtractor::extract`]: crate::feature::FeatureExtractor::extract
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let file = OpenOptions::new().read(true).open(path.as_ref())?;
        let mut entries = Entries::new(file)?;

        let config = params::decode(entries.read::<f64, Ix1>(PARAMS)?.view())?;

        let spots_intensity = entries.read_sparse(SPOTS_INTENSITY)?.mapv(u64::from);
        let spots_volume = entries.read_sparse(SPOTS_VOLUME)?;
        let labels_2d = entries.read_sparse(LABELS_2D)?;
        let volume = entries.read_sparse(TRACKED)?;
        let dim = labels_2d.dim();
        for (name, other) in [
            (SPOTS_INTENSITY, spots_intensity.dim()),
            (SPOTS_VOLUME, spots_volume.dim()),
            (TRACKED, volume.dim()),
        ] {
            if other != dim {
                return Err(ArchiveError::Inconsistent(name));
            }
        }

        let coords = VoxelCoords::from_array(entries.read::<u32, Ix2>(COORDS)?.view())?;
        let (t, _, x, y) = coords.shape();
        let voxels: usize = spots_volume.iter().map(|&v| v as usize).sum();
        if (t, x, y) != dim || voxels != coords.len() {
            return Err(ArchiveError::Inconsistent(COORDS));
        }

        let tracked = if entries.resolve(ORIGINS).is_some() {
            let origins = origins_from_array(entries.read::<u32, Ix2>(ORIGINS)?)?;
            Tracked { volume, origins }
        } else {
            Tracked::from_volume(volume)
        };

        let data = entries.read::<f64, Ix3>(FEATURES)?;
        let tags = entries
            .read::<u32, Ix1>(TAGS)?
            .iter()
            .map(|&t| TrackTag(t))
            .collect();
        let features =
            FeatureTensor::from_parts(data, tags).ok_or(ArchiveError::Inconsistent(TAGS))?;
        if features.len_t() != dim.0 {
            return Err(ArchiveError::Inconsistent(FEATURES));
        }

        Ok(Self {
            analysis: Analysis {
                detection: ChunkedDetection {
                    spots_intensity,
                    spots_volume,
                    coords,
                    labels_2d,
                },
                tracked,
                features,
            },
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureExtractor;
    use crate::pipeline::Pipeline;
    use crate::test_utils::{blob_series, init_logger};
    use crate::IntensitySeries;

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("spot-berry-{}-{name}.npz", std::process::id()));
        p
    }

    fn analysis() -> (Analysis, PipelineConfig, IntensitySeries) {
        let centers: Vec<_> = (0..3)
            .map(|t| vec![(4.5, 6.0 + t as f64, 8.0), (4.5, 14.0, 14.0 - t as f64)])
            .collect();
        let series = blob_series((10, 20, 20), &centers, 500.0, 10);
        let mut cfg = PipelineConfig::default();
        cfg.detect.merge_radius = 2;
        let a = Pipeline::new(cfg.clone()).unwrap().run(&series).unwrap();
        (a, cfg, series)
    }

    /// 复制归档 `from` 到 `to`, 其间以 `edit` 改写坐标条目.
    fn rewrite_coords(from: &Path, to: &Path, edit: impl FnOnce(Array2<u32>) -> Array2<u32>) {
        let mut src = NpzReader::new(File::open(from).unwrap()).unwrap();
        let mut dst = NpzWriter::new_compressed(File::create(to).unwrap());
        let mut edit = Some(edit);
        for name in src.names().unwrap() {
            let stem = name.strip_suffix(".npy").unwrap_or(&name);
            match stem {
                FEATURES => dst.add_array(stem, &src.by_name::<OwnedRepr<f64>, Ix3>(&name).unwrap()),
                PARAMS => dst.add_array(stem, &src.by_name::<OwnedRepr<f64>, Ix1>(&name).unwrap()),
                TAGS => dst.add_array(stem, &src.by_name::<OwnedRepr<u32>, Ix1>(&name).unwrap()),
                COORDS => {
                    let c = src.by_name::<OwnedRepr<u32>, Ix2>(&name).unwrap();
                    let edit = edit.take().unwrap();
                    dst.add_array(stem, &edit(c))
                }
                _ => dst.add_array(stem, &src.by_name::<OwnedRepr<u32>, Ix2>(&name).unwrap()),
            }
            .unwrap();
        }
        dst.finish().unwrap();
    }

    #[test]
    fn test_save_and_open() {
        init_logger();
        let (a, cfg, _) = analysis();
        assert_eq!(a.tracked.len(), 2);
        let path = temp_path("roundtrip");
        AnalysisArchive::save(&a, &cfg, &path).unwrap();
        let back = AnalysisArchive::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(back.config, cfg);
        assert_eq!(back.analysis.detection, a.detection);
        assert_eq!(back.analysis.tracked, a.tracked);
        assert_eq!(back.analysis.features.tags(), a.features.tags());
        assert!(back
            .analysis
            .features
            .data()
            .iter()
            .zip(a.features.data().iter())
            .all(|(p, q)| p.to_bits() == q.to_bits()));
    }

    #[test]
    fn test_intensity_overflow() {
        let (mut a, cfg, _) = analysis();
        a.detection.spots_intensity[(0, 0, 0)] = u64::from(u32::MAX) + 1;
        let path = temp_path("overflow");
        assert!(matches!(
            AnalysisArchive::save(&a, &cfg, &path),
            Err(ArchiveError::Overflow(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_coords_sentinel() {
        let (a, cfg, series) = analysis();
        let path = temp_path("coords-src");
        AnalysisArchive::save(&a, &cfg, &path).unwrap();
        let last_row = |c: &Array2<u32>| c.nrows() - 1;

        // 超出可寻址范围的哨兵.
        let huge = temp_path("coords-huge");
        rewrite_coords(&path, &huge, |mut c| {
            let n = last_row(&c);
            // (t, z) 均取最大值.
            c[(n, 0)] = u32::MAX;
            c[(n, 1)] = u32::MAX;
            c
        });
        assert!(matches!(
            AnalysisArchive::open(&huge),
            Err(ArchiveError::Shape(ShapeError::ShapeTooLarge(_)))
        ));

        // 丢失一行体素.
        let dropped = temp_path("coords-dropped");
        rewrite_coords(&path, &dropped, |c| c.slice(ndarray::s![1.., ..]).to_owned());
        assert!(matches!(
            AnalysisArchive::open(&dropped),
            Err(ArchiveError::Inconsistent(COORDS))
        ));

        // 可寻址但过深的 z: 打开成功, 提取特征时与序列不符.
        let deep = temp_path("coords-deep");
        rewrite_coords(&path, &deep, |mut c| {
            let n = last_row(&c);
            c[(n, 1)] = u32::MAX;
            c
        });
        let back = AnalysisArchive::open(&deep).unwrap();
        let extractor = FeatureExtractor::new(cfg.feature.clone()).unwrap();
        assert!(matches!(
            extractor.extract(
                back.analysis.tracked.volume.view(),
                &back.analysis.detection.coords,
                &series
            ),
            Err(ShapeError::SeriesMismatch("voxel coordinates", _, _))
        ));

        for p in [path, huge, dropped, deep] {
            std::fs::remove_file(p).unwrap();
        }
    }

    #[test]
    fn test_missing_entry() {
        let path = temp_path("missing");
        let mut npz = NpzWriter::new_compressed(File::create(&path).unwrap());
        npz.add_array(PARAMS, &params::encode(&PipelineConfig::default()))
            .unwrap();
        npz.finish().unwrap();

        let e = AnalysisArchive::open(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(e, ArchiveError::MissingEntry(SPOTS_INTENSITY)));
    }

    #[test]
    fn test_home_analysis_dir() {
        if let Some(p) = home_analysis_dir_with(["run1", "a.npz"]) {
            assert!(p.ends_with("analysis/run1/a.npz"));
        }
    }
}
