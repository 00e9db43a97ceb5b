//! 测试用的合成数据.

use ndarray::{Array3, Array4, Axis};

use crate::{Centroid3d, IntensitySeries};

/// 初始化测试日志. 多个测试重复初始化时忽略错误.
pub(crate) fn init_logger() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init();
}

/// z 方向与 xy 方向的高斯宽度.
const BLOB_SIGMA_Z: f64 = 1.0;
const BLOB_SIGMA_XY: f64 = 1.5;

/// 常数背景上叠加若干各向异性高斯亮斑.
pub(crate) fn blob_volume(
    shape: (usize, usize, usize),
    centers: &[Centroid3d],
    peak: f64,
    background: u16,
) -> Array3<u16> {
    let (sz2, sxy2) = (
        2.0 * BLOB_SIGMA_Z * BLOB_SIGMA_Z,
        2.0 * BLOB_SIGMA_XY * BLOB_SIGMA_XY,
    );
    Array3::from_shape_fn(shape, |(z, x, y)| {
        let (z, x, y) = (z as f64, x as f64, y as f64);
        let v = centers.iter().fold(background as f64, |acc, &(cz, cx, cy)| {
            let e = (z - cz).powi(2) / sz2 + ((x - cx).powi(2) + (y - cy).powi(2)) / sxy2;
            acc + peak * (-e).exp()
        });
        v.round() as u16
    })
}

/// 每帧一组亮斑中心的时间序列.
pub(crate) fn blob_series(
    shape: (usize, usize, usize),
    centers_per_frame: &[Vec<Centroid3d>],
    peak: f64,
    background: u16,
) -> IntensitySeries {
    let (z, x, y) = shape;
    let mut data = Array4::<u16>::zeros((centers_per_frame.len(), z, x, y));
    for (mut frame, centers) in data.axis_iter_mut(Axis(0)).zip(centers_per_frame) {
        frame.assign(&blob_volume(shape, centers, peak, background));
    }
    IntensitySeries::new(data)
}

/// 在 `(frame, x, y)` 标签矩阵的指定帧上画一个 `w x w` 方块.
pub(crate) fn paint_square(
    labels: &mut Array3<u32>,
    frame: usize,
    (x, y): (usize, usize),
    w: usize,
    tag: u32,
) {
    for i in x..x + w {
        for j in y..y + w {
            labels[(frame, i, j)] = tag;
        }
    }
}
