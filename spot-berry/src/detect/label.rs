//! 连通区域标记.
//!
//! 区域编号遵循扫描顺序: 区域按其第一个 (行优先意义下最小的) 体素的位置排序.

use std::collections::VecDeque;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

use crate::{Area2d, Area3d, Areas2d, Areas3d, Idx2d, Idx3d};

/// `p` 在形状 `sh` 内的 26-邻域.
fn neighbours_3d((z, x, y): Idx3d, (d0, d1, d2): Idx3d) -> impl Iterator<Item = Idx3d> {
    (-1isize..=1)
        .flat_map(|dz| (-1isize..=1).flat_map(move |dx| (-1isize..=1).map(move |dy| (dz, dx, dy))))
        .filter(|&d| d != (0, 0, 0))
        .filter_map(move |(dz, dx, dy)| {
            let nz = z.checked_add_signed(dz).filter(|&v| v < d0)?;
            let nx = x.checked_add_signed(dx).filter(|&v| v < d1)?;
            let ny = y.checked_add_signed(dy).filter(|&v| v < d2)?;
            Some((nz, nx, ny))
        })
}

/// `p` 在形状 `sh` 内的 8-邻域.
fn neighbours_2d((x, y): Idx2d, (d0, d1): Idx2d) -> impl Iterator<Item = Idx2d> {
    (-1isize..=1)
        .flat_map(|dx| (-1isize..=1).map(move |dy| (dx, dy)))
        .filter(|&d| d != (0, 0))
        .filter_map(move |(dx, dy)| {
            let nx = x.checked_add_signed(dx).filter(|&v| v < d0)?;
            let ny = y.checked_add_signed(dy).filter(|&v| v < d1)?;
            Some((nx, ny))
        })
}

/// 按照 26-相邻规则获取掩码中的所有区域.
///
/// 区域按扫描顺序排列, 每个区域内的体素按行优先顺序排列.
pub fn areas_3d(mask: ArrayView3<bool>) -> Areas3d {
    let sh = mask.dim();
    let mut seen = Array3::from_elem(sh, false);
    let mut ans = Areas3d::new();
    let mut bfs_q = VecDeque::with_capacity(16);

    for (pos, &m) in mask.indexed_iter() {
        if !m || seen[pos] {
            continue;
        }
        seen[pos] = true;
        bfs_q.push_back(pos);
        let mut this_area = Area3d::with_capacity(8);
        while let Some(cur) = bfs_q.pop_front() {
            this_area.push(cur);
            for nb in neighbours_3d(cur, sh) {
                if mask[nb] && !seen[nb] {
                    seen[nb] = true;
                    bfs_q.push_back(nb);
                }
            }
        }
        this_area.sort_unstable();
        ans.push(this_area);
    }
    ans
}

/// 按照 8-相邻规则获取掩码中的所有区域. 顺序约定同 [`areas_3d`].
pub fn areas_2d(mask: ArrayView2<bool>) -> Areas2d {
    let sh = mask.dim();
    let mut seen = Array2::from_elem(sh, false);
    let mut ans = Areas2d::new();
    let mut bfs_q = VecDeque::with_capacity(8);

    for (pos, &m) in mask.indexed_iter() {
        if !m || seen[pos] {
            continue;
        }
        seen[pos] = true;
        bfs_q.push_back(pos);
        let mut this_area = Area2d::with_capacity(4);
        while let Some(cur) = bfs_q.pop_front() {
            this_area.push(cur);
            for nb in neighbours_2d(cur, sh) {
                if mask[nb] && !seen[nb] {
                    seen[nb] = true;
                    bfs_q.push_back(nb);
                }
            }
        }
        this_area.sort_unstable();
        ans.push(this_area);
    }
    ans
}

/// 8-连通标记. 返回标签矩阵 (背景为 0, 区域从 1 开始按扫描顺序编号) 与区域个数.
pub fn label_2d(mask: ArrayView2<bool>) -> (Array2<u32>, usize) {
    let areas = areas_2d(mask);
    let mut out = Array2::zeros(mask.raw_dim());
    for (i, area) in areas.iter().enumerate() {
        let tag = i as u32 + 1;
        for &p in area {
            out[p] = tag;
        }
    }
    (out, areas.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_diagonal_is_connected_3d() {
        let mut m = Array3::from_elem((3, 3, 5), false);
        m[(0, 0, 0)] = true;
        m[(1, 1, 1)] = true;
        m[(2, 2, 2)] = true;
        // 与 (1, 1, 1) 仅共一个顶点.
        m[(0, 2, 0)] = true;
        m[(0, 0, 4)] = true;
        let areas = areas_3d(m.view());
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0], vec![(0, 0, 0), (0, 2, 0), (1, 1, 1), (2, 2, 2)]);
        assert_eq!(areas[1], vec![(0, 0, 4)]);
    }

    #[test]
    fn test_label_2d_scan_order() {
        let m = array![
            [false, false, true, false],
            [true, false, false, false],
            [false, true, false, true],
        ];
        let (l, n) = label_2d(m.view());
        assert_eq!(n, 3);
        assert_eq!(
            l,
            array![[0, 0, 1, 0], [2, 0, 0, 0], [0, 2, 0, 3]]
        );
    }
}
