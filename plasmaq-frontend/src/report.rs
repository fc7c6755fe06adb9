use std::fmt::Write;

use plasmaq_engine::{GeometryRecord, ParseFailure, ParseResult};

use crate::errors::FrontendError;
use crate::loader::ExtractedDrawing;
use crate::quote::QuoteReport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// 渲染提取结果。JSON 输出为 `ExtractedDrawing` 数组。
pub fn render_parse(
    drawings: &[ExtractedDrawing],
    format: OutputFormat,
) -> Result<String, FrontendError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(drawings)?),
        OutputFormat::Text => {
            let mut out = String::new();
            for drawing in drawings {
                write_drawing(&mut out, drawing);
            }
            Ok(out)
        }
    }
}

pub fn render_quote(report: &QuoteReport, format: OutputFormat) -> Result<String, FrontendError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            let mut out = String::new();
            for drawing in &report.drawings {
                write_drawing(&mut out, drawing);
            }
            let breakdown = &report.breakdown;
            let _ = writeln!(out, "报价明细:");
            for line in &breakdown.detailed_breakdown {
                let _ = writeln!(
                    out,
                    "  {} | {} {:.3} in | 数量 {} | 单件成本 ${:.2} | 单价 ${:.2} | 小计 ${:.2}",
                    line.part_id,
                    line.material,
                    line.thickness,
                    line.quantity,
                    line.cogs_per_part,
                    line.unit_price,
                    line.sell_price_per_part
                );
            }
            for excluded in &breakdown.excluded {
                let _ = writeln!(out, "  未计价: {} ({:?})", excluded.part_id, excluded.reason);
            }
            for rejected in &report.rejected {
                let _ = writeln!(
                    out,
                    "  提取失败: {} ({})",
                    rejected.part_id,
                    failure_label(rejected.failure)
                );
            }
            let _ = writeln!(out, "合计: ${:.2}", breakdown.total_sell_price);
            Ok(out)
        }
    }
}

fn write_drawing(out: &mut String, drawing: &ExtractedDrawing) {
    let result: &ParseResult = &drawing.result;
    let _ = writeln!(out, "图纸: {}", drawing.path.display());
    if let Some(failure) = result.failure {
        let _ = writeln!(out, "  失败: {}", failure_label(failure));
    }
    let _ = writeln!(out, "  切割长度: {:.3} in", result.total_cut_length);
    let _ = writeln!(
        out,
        "  净面积: {:.3} in²  毛面积: {:.3} in²",
        result.net_area, result.gross_area
    );
    let _ = writeln!(
        out,
        "  包围盒: ({:.3}, {:.3}) - ({:.3}, {:.3})",
        result.gross_min_x, result.gross_min_y, result.gross_max_x, result.gross_max_y
    );
    let _ = writeln!(out, "  尺寸: {:.3} x {:.3} in", result.width(), result.height());
    let _ = writeln!(
        out,
        "  穿孔: {}  轮廓: {}",
        result.pierce_count, result.contour_count
    );

    if let Some(weights) = drawing.weights {
        let _ = writeln!(
            out,
            "  重量: 毛重 {:.3} lb  净重 {:.3} lb",
            weights.gross, weights.net
        );
    }

    let counts: Vec<String> = result
        .entity_counts
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(key, count)| format!("{key}={count}"))
        .collect();
    if !counts.is_empty() {
        let _ = writeln!(out, "  实体: {}", counts.join(", "));
    }

    for record in result.preview.iter().filter(|record| record.is_diagnostic()) {
        match record {
            GeometryRecord::Error { message } => {
                let _ = writeln!(out, "  错误: {message}");
            }
            GeometryRecord::Warning { message } => {
                let _ = writeln!(out, "  警告: {message}");
            }
            _ => {}
        }
    }
}

fn failure_label(failure: ParseFailure) -> &'static str {
    match failure {
        ParseFailure::FileUnreadable => "file_unreadable",
        ParseFailure::Timeout => "timeout",
        ParseFailure::InvalidBounds => "invalid_bounds",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasmaq_config::ExtractionConfig;
    use plasmaq_engine::{PartWeights, parse_dxf_str};
    use std::path::PathBuf;

    fn drawing(source: &str) -> ExtractedDrawing {
        ExtractedDrawing {
            path: PathBuf::from("part.dxf"),
            result: parse_dxf_str(source, &ExtractionConfig::default()),
            weights: None,
        }
    }

    const CIRCLE_DXF: &str = "0\nSECTION\n2\nENTITIES\n0\nCIRCLE\n8\nCUT\n10\n0\n20\n0\n40\n1\n0\nENDSEC\n0\nEOF\n";

    #[test]
    fn text_report_lists_counts_and_totals() {
        let text = render_parse(&[drawing(CIRCLE_DXF)], OutputFormat::Text).unwrap();
        assert!(text.contains("图纸: part.dxf"));
        assert!(text.contains("切割长度: 6.283 in"));
        assert!(text.contains("CIRCLE=1"));
        assert!(text.contains("尺寸: 2.000 x 2.000 in"));
        assert!(!text.contains("LINE="));
    }

    #[test]
    fn weights_are_listed_when_known() {
        let mut weighed = drawing(CIRCLE_DXF);
        weighed.weights = Some(PartWeights {
            gross: 1.0,
            net: 0.785,
        });
        let text = render_parse(&[weighed.clone()], OutputFormat::Text).unwrap();
        assert!(text.contains("重量: 毛重 1.000 lb  净重 0.785 lb"));
        assert!(!render_parse(&[drawing(CIRCLE_DXF)], OutputFormat::Text)
            .unwrap()
            .contains("重量"));

        let json = render_parse(&[weighed], OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["weights"]["net"], 0.785);
    }

    #[test]
    fn failures_are_labelled() {
        let text = render_parse(&[drawing("garbage\n")], OutputFormat::Text).unwrap();
        assert!(text.contains("失败: file_unreadable"));
        assert!(text.contains("错误: failed to read drawing"));
    }

    #[test]
    fn json_report_uses_field_names() {
        let json = render_parse(&[drawing(CIRCLE_DXF)], OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let result = &value[0]["result"];
        assert_eq!(result["pierce_count"], 1);
        assert_eq!(result["entity_counts"]["CIRCLE"], 1);
        assert_eq!(result["preview"][0]["type"], "circle");
        assert!(result.get("failure").is_none());
        assert!(value[0].get("weights").is_none());
    }
}
