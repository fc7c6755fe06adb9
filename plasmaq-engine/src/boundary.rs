use std::f64::consts::PI;

use plasmaq_core::geometry::{Bounds2D, Point2, shoelace_area};
use tracing::debug;

/// 闭合轮廓候选，仅在拓扑判定内部使用。
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub bounds: Bounds2D,
    pub area: f64,
    pub perimeter: f64,
    pub shape: BoundaryShape,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryShape {
    Polygon(Vec<Point2>),
    Circle { center: Point2, radius: f64 },
}

impl Boundary {
    pub fn circle(center: Point2, radius: f64) -> Self {
        let bounds = Bounds2D::new(
            Point2::new(center.x() - radius, center.y() - radius),
            Point2::new(center.x() + radius, center.y() + radius),
        );
        Self {
            bounds,
            area: PI * radius * radius,
            perimeter: 2.0 * PI * radius,
            shape: BoundaryShape::Circle { center, radius },
        }
    }

    /// 多边形面积取鞋带公式。
    pub fn polygon(points: Vec<Point2>, perimeter: f64) -> Self {
        Self {
            bounds: Bounds2D::from_points(&points),
            area: shoelace_area(&points),
            perimeter,
            shape: BoundaryShape::Polygon(points),
        }
    }

    /// 包围盒包含测试：圆看圆心，多边形要求全部顶点落在框内。
    pub fn lies_within(&self, outer: &Bounds2D) -> bool {
        match &self.shape {
            BoundaryShape::Circle { center, .. } => outer.contains_point(*center),
            BoundaryShape::Polygon(points) => {
                !points.is_empty() && points.iter().all(|point| outer.contains_point(*point))
            }
        }
    }
}

/// 切割层上的开放路径（直线、圆弧），坐标已换算到英寸。
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPath {
    pub points: Vec<Point2>,
    pub length: f64,
}

impl OpenPath {
    fn start(&self) -> Point2 {
        self.points[0]
    }

    fn end(&self) -> Point2 {
        self.points[self.points.len() - 1]
    }
}

/// 把端点在 `tolerance` 内相接的开放路径串成闭合环，每个环作为多边形候选。
/// 路径可反向接入；串不回起点的链丢弃。
pub fn chain_loops(paths: &[OpenPath], tolerance: f64) -> Vec<Boundary> {
    let mut used = vec![false; paths.len()];
    let mut loops = Vec::new();
    for (index, path) in paths.iter().enumerate() {
        if used[index] || path.points.len() < 2 {
            continue;
        }
        used[index] = true;
        let mut ring = path.points.clone();
        let mut perimeter = path.length;
        let mut segments = 1usize;
        let first = ring[0];
        loop {
            let current = ring[ring.len() - 1];
            if ring.len() > 2 && current.distance(first) < tolerance {
                break;
            }
            let Some((next, reversed)) = next_path(paths, &used, current, tolerance) else {
                break;
            };
            used[next] = true;
            segments += 1;
            perimeter += paths[next].length;
            if reversed {
                ring.extend(paths[next].points.iter().rev().skip(1).copied());
            } else {
                ring.extend(paths[next].points.iter().skip(1).copied());
            }
        }

        let current = ring[ring.len() - 1];
        if current.distance(first) >= tolerance {
            debug!(segments, "开放路径未闭合");
            continue;
        }
        ring.pop();
        if ring.len() < 3 {
            continue;
        }
        let candidate = Boundary::polygon(ring, perimeter);
        if candidate.area <= 0.0 {
            continue;
        }
        debug!(segments, area = candidate.area, perimeter, "开放路径串成闭合环");
        loops.push(candidate);
    }
    loops
}

fn next_path(
    paths: &[OpenPath],
    used: &[bool],
    current: Point2,
    tolerance: f64,
) -> Option<(usize, bool)> {
    paths.iter().enumerate().find_map(|(index, path)| {
        if used[index] || path.points.len() < 2 {
            None
        } else if path.start().distance(current) < tolerance {
            Some((index, false))
        } else if path.end().distance(current) < tolerance {
            Some((index, true))
        } else {
            None
        }
    })
}

/// 外轮廓与内孔的判定结果。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Topology {
    pub outer_area: f64,
    pub cutout_area: f64,
    pub net_area: f64,
    pub contour_count: u32,
    pub cutout_count: u32,
    pub pierce_count: u32,
}

/// 面积最大的候选为外轮廓（并列时取先出现者），落在其包围盒内的其余候选为内孔。
pub fn resolve(candidates: &[Boundary], total_cut_length: f64) -> Topology {
    let contour_count = candidates.len() as u32;
    let Some(outer_index) = largest(candidates) else {
        let pierce_count = if total_cut_length > 0.0 { 1 } else { 0 };
        return Topology {
            pierce_count,
            ..Topology::default()
        };
    };

    let outer = &candidates[outer_index];
    let mut cutout_area = 0.0;
    let mut cutout_count = 0u32;
    for (index, candidate) in candidates.iter().enumerate() {
        if index == outer_index {
            continue;
        }
        if candidate.lies_within(&outer.bounds) {
            cutout_area += candidate.area;
            cutout_count += 1;
        } else {
            debug!(area = candidate.area, "轮廓不在外轮廓包围盒内，不计为内孔");
        }
    }

    Topology {
        outer_area: outer.area,
        cutout_area,
        net_area: (outer.area - cutout_area).max(0.0),
        contour_count,
        cutout_count,
        pierce_count: 1 + cutout_count,
    }
}

fn largest(candidates: &[Boundary]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        match best {
            Some(current) if candidates[current].area >= candidate.area => {}
            _ => best = Some(index),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(origin: (f64, f64), side: f64) -> Boundary {
        let (x, y) = origin;
        Boundary::polygon(
            vec![
                Point2::new(x, y),
                Point2::new(x + side, y),
                Point2::new(x + side, y + side),
                Point2::new(x, y + side),
            ],
            4.0 * side,
        )
    }

    #[test]
    fn concentric_circles_subtract_the_hole() {
        let candidates = vec![
            Boundary::circle(Point2::new(0.0, 0.0), 2.0),
            Boundary::circle(Point2::new(0.0, 0.0), 5.0),
        ];
        let topology = resolve(&candidates, 14.0 * PI);
        assert!((topology.net_area - PI * 21.0).abs() < 1e-9);
        assert_eq!(topology.contour_count, 2);
        assert_eq!(topology.cutout_count, 1);
        assert_eq!(topology.pierce_count, 2);
    }

    #[test]
    fn outside_candidates_are_not_cutouts() {
        let candidates = vec![
            square((0.0, 0.0), 10.0),
            square((2.0, 2.0), 2.0),
            square((20.0, 0.0), 3.0),
            Boundary::circle(Point2::new(9.0, 9.0), 2.0),
        ];
        let topology = resolve(&candidates, 100.0);
        // 圆只看圆心，越出外框的部分仍整体扣除
        let expected = 100.0 - 4.0 - PI * 4.0;
        assert!((topology.net_area - expected).abs() < 1e-9);
        assert_eq!(topology.cutout_count, 2);
        assert_eq!(topology.contour_count, 4);
        assert_eq!(topology.pierce_count, 3);
    }

    #[test]
    fn equal_areas_keep_the_first_as_outer() {
        let candidates = vec![square((0.0, 0.0), 4.0), square((1.0, 1.0), 4.0)];
        assert_eq!(largest(&candidates), Some(0));
        let topology = resolve(&candidates, 32.0);
        assert_eq!(topology.cutout_count, 0);
        assert_eq!(topology.net_area, 16.0);
    }

    #[test]
    fn net_area_is_floored_at_zero() {
        let candidates = vec![
            square((0.0, 0.0), 4.0),
            square((0.0, 0.0), 3.0),
            square((1.0, 1.0), 3.0),
        ];
        let topology = resolve(&candidates, 1.0);
        assert_eq!(topology.net_area, 0.0);
    }

    fn segment(a: (f64, f64), b: (f64, f64)) -> OpenPath {
        let (a, b) = (Point2::new(a.0, a.1), Point2::new(b.0, b.1));
        OpenPath {
            points: vec![a, b],
            length: a.distance(b),
        }
    }

    #[test]
    fn four_lines_chain_into_a_square() {
        // 第三段方向相反，需要反向接入
        let paths = vec![
            segment((0.0, 0.0), (10.0, 0.0)),
            segment((10.0, 0.0), (10.0, 10.0)),
            segment((0.0, 10.0), (10.0, 10.0)),
            segment((0.0, 10.0), (0.0005, 0.0)),
        ];
        let loops = chain_loops(&paths, 0.001);
        assert_eq!(loops.len(), 1);
        assert!((loops[0].area - 100.0).abs() < 0.01);
        assert!((loops[0].perimeter - 40.0).abs() < 0.01);
        assert_eq!(resolve(&loops, 40.0).pierce_count, 1);
    }

    #[test]
    fn open_chains_and_stray_segments_are_dropped() {
        let paths = vec![
            segment((0.0, 0.0), (5.0, 0.0)),
            segment((5.0, 0.0), (5.0, 5.0)),
            segment((20.0, 20.0), (30.0, 20.0)),
            segment((1.0, 1.0), (1.0, 1.0)),
        ];
        assert!(chain_loops(&paths, 0.001).is_empty());
    }

    #[test]
    fn separate_rings_become_separate_candidates() {
        let mut paths = vec![
            segment((0.0, 0.0), (10.0, 0.0)),
            segment((10.0, 0.0), (10.0, 10.0)),
            segment((10.0, 10.0), (0.0, 10.0)),
            segment((0.0, 10.0), (0.0, 0.0)),
        ];
        paths.extend([
            segment((2.0, 2.0), (4.0, 2.0)),
            segment((4.0, 2.0), (3.0, 4.0)),
            segment((3.0, 4.0), (2.0, 2.0)),
        ]);
        let loops = chain_loops(&paths, 0.001);
        assert_eq!(loops.len(), 2);
        let topology = resolve(&loops, 40.0 + 2.0 + 2.0 * 5f64.sqrt());
        assert!((topology.net_area - 98.0).abs() < 1e-9);
        assert_eq!(topology.pierce_count, 2);
    }

    #[test]
    fn open_geometry_pierces_once() {
        assert_eq!(resolve(&[], 12.0).pierce_count, 1);
        assert_eq!(resolve(&[], 0.0), Topology::default());
    }
}
