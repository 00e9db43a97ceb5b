//! 从环境变量加载实验参数.
//!
//! | 变量 | 对应参数 |
//! |-----|---------|
//! | `SPOT_KERNEL_SIZE` | `detect.kernel_size` |
//! | `SPOT_THRESHOLD_SIGMA` | `detect.threshold_sigma` |
//! | `SPOT_MIN_VOLUME` | `detect.min_volume` |
//! | `SPOT_MERGE_RADIUS` | `detect.merge_radius` |
//! | `SPOT_DISTANCE` | `track.distance_threshold` |
//! | `SPOT_MIN_ACTIVE` | `feature.min_active_frames` |
//! | `SPOT_FRAMES` | 合成序列的帧数 |
//! | `SPOT_ARCHIVE` | 结果归档路径 |
//!
//! 未设置的变量取默认值. 无法解析的变量会被忽略并输出警告.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use spot_berry::archive::home_analysis_dir_with;
use spot_berry::config::PipelineConfig;

/// 合成序列的默认帧数.
pub const DEFAULT_FRAMES: usize = 24;

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring ${key}: cannot parse `{raw}`");
            None
        }
    }
}

/// 以默认参数为基础, 用环境变量覆盖其中的若干项.
///
/// # 注意
///
/// 这里不检查参数的合法性, 由 `Pipeline::new` 负责.
pub fn config_from_env() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    if let Some(v) = env_parse("SPOT_KERNEL_SIZE") {
        cfg.detect.kernel_size = v;
    }
    if let Some(v) = env_parse("SPOT_THRESHOLD_SIGMA") {
        cfg.detect.threshold_sigma = v;
    }
    if let Some(v) = env_parse("SPOT_MIN_VOLUME") {
        cfg.detect.min_volume = v;
    }
    if let Some(v) = env_parse("SPOT_MERGE_RADIUS") {
        cfg.detect.merge_radius = v;
    }
    if let Some(v) = env_parse("SPOT_DISTANCE") {
        cfg.track.distance_threshold = v;
    }
    if let Some(v) = env_parse("SPOT_MIN_ACTIVE") {
        cfg.feature.min_active_frames = v;
    }
    cfg
}

/// 合成序列的帧数. 取 `$SPOT_FRAMES`, 否则为 [`DEFAULT_FRAMES`].
pub fn frames_from_env() -> usize {
    env_parse("SPOT_FRAMES").unwrap_or(DEFAULT_FRAMES)
}

/// 获取结果归档路径.
///
/// 1. 若环境变量 `$SPOT_ARCHIVE` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/analysis/ablation/chunking.npz`;
/// 3. 无法确定主目录时, 使用系统临时目录.
pub fn archive_path_from_env_or_home() -> PathBuf {
    if let Some(p) = env::var_os("SPOT_ARCHIVE").filter(|p| !p.is_empty()) {
        return PathBuf::from(p);
    }
    home_analysis_dir_with(["ablation", "chunking.npz"]).unwrap_or_else(|| {
        let mut p = env::temp_dir();
        p.push("chunking.npz");
        p
    })
}
