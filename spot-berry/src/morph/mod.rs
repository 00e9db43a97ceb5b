//! 形态学算子: 2D 方形膨胀, 以及 3D 标签按欧氏距离扩张 (背景笼).

use ndarray::{Array2, ArrayView2};

mod cage;

pub use cage::{cage_stats, nearest_labels, CageStats, NearestLabels};

/// 以 `size x size` 全 1 结构元做二值膨胀, 边界外视为背景.
///
/// 结构元原点位于 `size / 2`: 像素 `p` 被置位, 当且仅当窗口
/// `[p - (size - 1) / 2, p + size / 2]` (两个轴上均如此) 内存在前景像素.
/// `size == 0` 时返回原掩码的副本.
pub fn dilate_square(mask: ArrayView2<bool>, size: usize) -> Array2<bool> {
    if size == 0 {
        return mask.to_owned();
    }
    let (h, w) = mask.dim();
    let (lo, hi) = ((size - 1) / 2, size / 2);
    Array2::from_shape_fn((h, w), |(x, y)| {
        let xs = x.saturating_sub(lo)..=x.saturating_add(hi).min(h.saturating_sub(1));
        xs.into_iter().any(|i| {
            let ys = y.saturating_sub(lo)..=y.saturating_add(hi).min(w.saturating_sub(1));
            ys.into_iter().any(|j| mask[(i, j)])
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dilate_odd() {
        let m = array![
            [false, false, false, false],
            [false, true, false, false],
            [false, false, false, false],
        ];
        let d = dilate_square(m.view(), 3);
        assert_eq!(
            d,
            array![
                [true, true, true, false],
                [true, true, true, false],
                [true, true, true, false],
            ]
        );
        assert_eq!(dilate_square(m.view(), 1), m);
    }

    #[test]
    fn test_dilate_even_is_shifted() {
        let m = array![
            [false, false, false, false],
            [false, true, false, false],
            [false, false, false, false],
        ];
        // 窗口为 [p, p + 1]: 前景向左上方扩张.
        let d = dilate_square(m.view(), 2);
        assert_eq!(
            d,
            array![
                [true, true, false, false],
                [true, true, false, false],
                [false, false, false, false],
            ]
        );
    }
}
