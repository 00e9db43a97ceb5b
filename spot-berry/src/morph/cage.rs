use std::collections::BTreeMap;

use ndarray::{Array3, ArrayView3, Zip};

use crate::consts::label::{is_background, is_spot, BACKGROUND};

/// 半径为 `r` 的球内所有非零偏移及其距离平方, 按距离平方升序排列.
fn ball_offsets(r: f64) -> Vec<((isize, isize, isize), i64)> {
    let n = r.floor() as isize;
    let r2 = r * r;
    let mut v = Vec::new();
    for dz in -n..=n {
        for dx in -n..=n {
            for dy in -n..=n {
                let d2 = (dz * dz + dx * dx + dy * dy) as i64;
                if d2 > 0 && d2 as f64 <= r2 {
                    v.push(((dz, dx, dy), d2));
                }
            }
        }
    }
    v.sort_by_key(|&(_, d2)| d2);
    v
}

/// 背景体素到最近标签的归属.
#[derive(Debug, Clone)]
pub struct NearestLabels {
    /// 最近标签. 标签体素本身保留原值; 超出半径的背景为 0.
    pub labels: Array3<u32>,

    /// 到最近标签的距离平方. 标签体素为 0; 超出半径的背景为 `i64::MAX`.
    pub dist2: Array3<i64>,
}

/// 以欧氏距离把每个标签扩张到半径 `outer` 之内的背景体素.
///
/// # 注意
///
/// 1. 每个背景体素归属于距其最近的标签; 距离相同时较小的标签胜出.
/// 2. 扩张永远不会覆盖其他标签的体素.
pub fn nearest_labels(labels: ArrayView3<u32>, outer: f64) -> NearestLabels {
    let sh = labels.dim();
    let (d0, d1, d2) = sh;
    let mut near = labels.to_owned();
    let mut dist2 = Array3::from_elem(sh, i64::MAX);
    Zip::from(&mut dist2).and(&labels).for_each(|d, &l| {
        if is_spot(l) {
            *d = 0;
        }
    });

    let ball = ball_offsets(outer);
    for ((z, x, y), &tag) in labels.indexed_iter() {
        if is_background(tag) {
            continue;
        }
        for &((dz, dx, dy), d) in &ball {
            let (Some(nz), Some(nx), Some(ny)) = (
                z.checked_add_signed(dz).filter(|&v| v < d0),
                x.checked_add_signed(dx).filter(|&v| v < d1),
                y.checked_add_signed(dy).filter(|&v| v < d2),
            ) else {
                continue;
            };
            let q = (nz, nx, ny);
            if is_spot(labels[q]) {
                continue;
            }
            let best = dist2[q];
            if d < best || (d == best && tag < near[q]) {
                dist2[q] = d;
                near[q] = tag;
            }
        }
    }
    NearestLabels {
        labels: near,
        dist2,
    }
}

/// 单个标签背景笼的统计量.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CageStats {
    /// 笼内强度之和.
    pub sum: u64,

    /// 笼内体素个数.
    pub count: usize,
}

impl CageStats {
    /// 笼内平均强度. 空笼为 `NaN`.
    #[inline]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

/// 计算每个标签的背景笼统计量.
///
/// 标签 `T` 的背景笼由最近标签为 `T`, 且距离 `d` 满足 `inner < d <= outer` 的背景体素构成.
/// 在 `labels` 中出现但笼为空的标签同样出现在结果中, 其 `count` 为 0.
pub fn cage_stats(
    labels: ArrayView3<u32>,
    intensity: ArrayView3<u16>,
    inner: f64,
    outer: f64,
) -> BTreeMap<u32, CageStats> {
    debug_assert_eq!(labels.dim(), intensity.dim());
    let mut ans: BTreeMap<u32, CageStats> = labels
        .iter()
        .filter(|&&l| is_spot(l))
        .map(|&l| (l, CageStats::default()))
        .collect();

    let NearestLabels { labels: near, dist2 } = nearest_labels(labels, outer);
    let inner2 = inner * inner;
    Zip::from(&near)
        .and(&dist2)
        .and(&intensity)
        .for_each(|&tag, &d, &v| {
            if tag == BACKGROUND || d == 0 || d == i64::MAX || d as f64 <= inner2 {
                return;
            }
            let e = ans.entry(tag).or_default();
            e.sum += v as u64;
            e.count += 1;
        });
    ans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ball_sizes() {
        assert_eq!(ball_offsets(1.0).len(), 6);
        assert_eq!(ball_offsets(1.5).len(), 18);
        let b = ball_offsets(5.0);
        assert!(b.windows(2).all(|w| w[0].1 <= w[1].1));
        assert!(b.iter().all(|&(_, d)| d <= 25));
    }

    #[test]
    fn test_ties_go_to_smaller_label() {
        let mut l = Array3::<u32>::zeros((1, 1, 5));
        l[(0, 0, 0)] = 9;
        l[(0, 0, 4)] = 2;
        let n = nearest_labels(l.view(), 3.0);
        assert_eq!(n.labels[(0, 0, 2)], 2);
        assert_eq!(n.labels[(0, 0, 1)], 9);
        assert_eq!(n.labels[(0, 0, 4)], 2);
        assert_eq!(n.dist2[(0, 0, 2)], 4);
    }

    #[test]
    fn test_single_voxel_cage() {
        let sh = (11, 11, 11);
        let mut l = Array3::<u32>::zeros(sh);
        l[(5, 5, 5)] = 1;
        let v = Array3::<u16>::from_elem(sh, 3);
        let stats = cage_stats(l.view(), v.view(), 3.0, 5.0);
        let s = stats[&1];
        let expected = ball_offsets(5.0).iter().filter(|&&(_, d)| d > 9).count();
        assert_eq!(s.count, expected);
        assert_eq!(s.mean(), 3.0);
    }

    #[test]
    fn test_empty_cage_is_nan() {
        // 体积太小, 笼完全落在边界外.
        let mut l = Array3::<u32>::zeros((1, 3, 3));
        l[(0, 1, 1)] = 4;
        let v = Array3::<u16>::ones((1, 3, 3));
        let stats = cage_stats(l.view(), v.view(), 3.0, 5.0);
        assert_eq!(stats[&4].count, 0);
        assert!(stats[&4].mean().is_nan());
    }
}
