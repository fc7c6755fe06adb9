use plasmaq_config::ExtractionConfig;
use plasmaq_core::geometry::{Bounds2D, Point2};
use tracing::{error, info, warn};

use crate::boundary;
use crate::extract::{Accumulator, ExtractionOutcome};
use crate::result::{EntityCounts, GeometryRecord, ParseFailure, ParseResult};

/// 把遍历状态组装为最终结果：拓扑判定、包围盒修复与合理性检查。
pub fn assemble(outcome: ExtractionOutcome, config: &ExtractionConfig) -> ParseResult {
    let ExtractionOutcome {
        mut accumulator,
        fault,
    } = outcome;
    if let Some(fault) = fault {
        error!(error = %fault, length = accumulator.total_length, "提取超时，返回部分结果");
        return timed_out(accumulator, &fault.to_string());
    }

    if accumulator.preview.is_empty() && accumulator.total_length <= 0.0 {
        warn!(counts = ?accumulator.counts, "图纸中没有可切割几何");
        return ParseResult::zeroed(
            accumulator.counts,
            GeometryRecord::warning("no cuttable geometry found in drawing"),
        );
    }

    let loops = boundary::chain_loops(&accumulator.open_paths, config.loop_tolerance);
    if !loops.is_empty() {
        info!(loops = loops.len(), "直线与圆弧串接出闭合环");
    }
    accumulator.candidates.extend(loops);
    let topology = boundary::resolve(&accumulator.candidates, accumulator.total_length);
    let bounds = recover_bounds(&accumulator);
    let (min_x, min_y, max_x, max_y) = finite_box(&bounds);
    let (width, height) = (max_x - min_x, max_y - min_y);

    if width > config.max_extent || height > config.max_extent {
        error!(width, height, limit = config.max_extent, "包围盒超出尺寸上限");
        let mut result = ParseResult::zeroed(
            accumulator.counts,
            GeometryRecord::error(format!(
                "invalid bounds: {width:.3} x {height:.3} in exceeds the {} in limit",
                config.max_extent
            )),
        );
        result.failure = Some(ParseFailure::InvalidBounds);
        return result;
    }

    let gross_area = width * height;
    let mut net_area = topology.net_area;
    if net_area > gross_area && net_area > 0.0 && gross_area > 0.0 {
        warn!(net_area, gross_area, "净面积大于毛面积，按毛面积截断");
        net_area = gross_area;
    }

    ParseResult {
        total_cut_length: accumulator.total_length,
        net_area,
        gross_min_x: min_x,
        gross_min_y: min_y,
        gross_max_x: max_x,
        gross_max_y: max_y,
        gross_area,
        entity_counts: accumulator.counts,
        preview: accumulator.preview,
        pierce_count: topology.pierce_count,
        contour_count: topology.contour_count,
        failure: None,
    }
}

/// 有切割长度但没有闭合轮廓，或切割包围盒为空、某一轴退化时，改用全部预览坐标重新计算。
fn recover_bounds(accumulator: &Accumulator) -> Bounds2D {
    let bounds = accumulator.cut_bounds;
    let degenerate = bounds.is_empty() || bounds.width() <= 0.0 || bounds.height() <= 0.0;
    if accumulator.total_length <= 0.0 || !(accumulator.candidates.is_empty() || degenerate) {
        return bounds;
    }
    let coordinates: Vec<Point2> = accumulator
        .preview
        .iter()
        .flat_map(GeometryRecord::coordinates)
        .collect();
    let recovered = Bounds2D::from_points(&coordinates);
    if recovered.is_empty() {
        return bounds;
    }
    if recovered != bounds {
        warn!(
            min_x = recovered.min().x(),
            min_y = recovered.min().y(),
            max_x = recovered.max().x(),
            max_y = recovered.max().y(),
            "包围盒由预览坐标重新计算"
        );
    }
    recovered
}

/// 空框的 ±∞ 哨兵替换为 0。
fn finite_box(bounds: &Bounds2D) -> (f64, f64, f64, f64) {
    if bounds.is_empty() {
        return (0.0, 0.0, 0.0, 0.0);
    }
    (
        bounds.min().x(),
        bounds.min().y(),
        bounds.max().x(),
        bounds.max().y(),
    )
}

/// 超时：保留已累计的长度、包围盒与计数，净面积为 0，预览仅一条错误记录。
fn timed_out(accumulator: Accumulator, message: &str) -> ParseResult {
    let (min_x, min_y, max_x, max_y) = finite_box(&accumulator.cut_bounds);
    ParseResult {
        total_cut_length: accumulator.total_length,
        net_area: 0.0,
        gross_min_x: min_x,
        gross_min_y: min_y,
        gross_max_x: max_x,
        gross_max_y: max_y,
        gross_area: (max_x - min_x) * (max_y - min_y),
        entity_counts: accumulator.counts,
        preview: vec![GeometryRecord::error(message)],
        pierce_count: 0,
        contour_count: 0,
        failure: Some(ParseFailure::Timeout),
    }
}

/// 文件缺失或损坏时的零结果。
pub fn unreadable(message: &str) -> ParseResult {
    let mut result = ParseResult::zeroed(
        EntityCounts::default(),
        GeometryRecord::error(format!("failed to read drawing: {message}")),
    );
    result.failure = Some(ParseFailure::FileUnreadable);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::Boundary;
    use crate::errors::ExtractionFault;
    use crate::result::EntityKind;

    fn outcome(accumulator: Accumulator) -> ExtractionOutcome {
        ExtractionOutcome {
            accumulator,
            fault: None,
        }
    }

    #[test]
    fn empty_accumulator_gives_single_warning() {
        let result = assemble(outcome(Accumulator::default()), &ExtractionConfig::default());
        assert_eq!(result.preview.len(), 1);
        assert!(matches!(result.preview[0], GeometryRecord::Warning { .. }));
        assert_eq!(result.gross_area, 0.0);
        assert_eq!(result.pierce_count, 0);
        assert!(result.failure.is_none());
    }

    #[test]
    fn open_geometry_recovers_bounds_from_preview() {
        let mut acc = Accumulator::default();
        acc.total_length = 10.0;
        acc.cut_bounds.include_point(Point2::new(0.0, 0.0));
        acc.cut_bounds.include_point(Point2::new(10.0, 0.0));
        acc.preview.push(GeometryRecord::Line {
            start: Point2::new(0.0, 0.0),
            end: Point2::new(10.0, 0.0),
        });
        acc.preview.push(GeometryRecord::Circle {
            center: Point2::new(5.0, 0.0),
            radius: 1.0,
        });
        let result = assemble(outcome(acc), &ExtractionConfig::default());
        assert_eq!((result.gross_min_y, result.gross_max_y), (-1.0, 1.0));
        assert_eq!(result.gross_area, 20.0);
        assert_eq!(result.pierce_count, 1);
    }

    #[test]
    fn oversized_bounds_are_rejected() {
        let mut acc = Accumulator::default();
        acc.total_length = 4.0;
        acc.counts.increment(EntityKind::Line);
        acc.cut_bounds.include_point(Point2::new(0.0, 0.0));
        acc.cut_bounds.include_point(Point2::new(2.0e6, 1.0));
        acc.candidates.push(Boundary::circle(Point2::new(1.0, 1.0), 1.0));
        acc.preview.push(GeometryRecord::warning("kept?"));
        let result = assemble(outcome(acc), &ExtractionConfig::default());
        assert_eq!(result.failure, Some(ParseFailure::InvalidBounds));
        assert_eq!(result.total_cut_length, 0.0);
        assert_eq!(result.entity_counts.get(EntityKind::Line), 1);
        assert_eq!(result.preview.len(), 1);
        assert!(matches!(result.preview[0], GeometryRecord::Error { .. }));
    }

    #[test]
    fn net_area_is_clamped_to_gross() {
        let mut acc = Accumulator::default();
        acc.total_length = 2.0 * std::f64::consts::PI;
        let circle = Boundary::circle(Point2::new(0.0, 0.0), 1.0);
        // 人为收窄切割包围盒，制造净面积大于毛面积
        acc.cut_bounds.include_point(Point2::new(-1.0, -1.0));
        acc.cut_bounds.include_point(Point2::new(0.0, 0.0));
        acc.candidates.push(circle);
        acc.preview.push(GeometryRecord::Circle {
            center: Point2::new(0.0, 0.0),
            radius: 1.0,
        });
        let result = assemble(outcome(acc), &ExtractionConfig::default());
        assert_eq!(result.gross_area, 1.0);
        assert_eq!(result.net_area, 1.0);
    }

    #[test]
    fn timeout_keeps_partial_totals() {
        let mut acc = Accumulator::default();
        acc.total_length = 3.0;
        acc.cut_bounds.include_point(Point2::new(1.0, 1.0));
        acc.cut_bounds.include_point(Point2::new(4.0, 3.0));
        acc.counts.increment(EntityKind::Line);
        acc.preview.push(GeometryRecord::Line {
            start: Point2::new(1.0, 1.0),
            end: Point2::new(4.0, 3.0),
        });
        let result = assemble(
            ExtractionOutcome {
                accumulator: acc,
                fault: Some(ExtractionFault::Timeout { elapsed_ms: 31_000 }),
            },
            &ExtractionConfig::default(),
        );
        assert_eq!(result.failure, Some(ParseFailure::Timeout));
        assert_eq!(result.total_cut_length, 3.0);
        assert_eq!(result.gross_area, 6.0);
        assert_eq!(result.net_area, 0.0);
        assert_eq!(result.preview.len(), 1);
    }

    #[test]
    fn unreadable_result_is_zeroed() {
        let result = unreadable("missing");
        assert_eq!(result.failure, Some(ParseFailure::FileUnreadable));
        assert_eq!(result.entity_counts.total(), 0);
        match &result.preview[0] {
            GeometryRecord::Error { message } => assert!(message.contains("missing")),
            other => panic!("unexpected record {other:?}"),
        }
    }
}
