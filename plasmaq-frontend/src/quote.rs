use std::path::PathBuf;

use plasmaq_config::{AppConfig, MaterialDensities};
use plasmaq_engine::{CartItem, CostBreakdown, ParseFailure, PartSpec, calculate_costs};
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::FrontendError;
use crate::loader::{ExtractedDrawing, collect_drawings, extract_batch};

/// 一次报价请求：所有图纸共用同一材料、板厚与数量。
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub material: String,
    pub thickness: f64,
    pub quantity: u32,
}

/// 提取失败、未进入购物车的图纸。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedDrawing {
    pub part_id: String,
    pub failure: ParseFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteReport {
    pub drawings: Vec<ExtractedDrawing>,
    pub rejected: Vec<RejectedDrawing>,
    pub breakdown: CostBreakdown,
}

/// 校验材料与板厚后提取全部图纸并计算报价。校验失败时不读取任何图纸。
pub fn quote_drawings(
    paths: &[PathBuf],
    request: &QuoteRequest,
    config: &AppConfig,
) -> Result<QuoteReport, FrontendError> {
    let spec = PartSpec::new(&request.material, request.thickness)?;
    let mut drawings = extract_batch(&collect_drawings(paths)?, &config.extraction);
    let densities = config.costing.load_densities();
    weigh_drawings(&mut drawings, &spec, &densities);

    let mut cart = Vec::new();
    let mut rejected = Vec::new();
    for drawing in &drawings {
        let part_id = drawing.part_id();
        if let Some(failure) = drawing.result.failure {
            warn!(part = %part_id, ?failure, "图纸提取失败，不计入报价");
            rejected.push(RejectedDrawing { part_id, failure });
            continue;
        }
        cart.push(
            CartItem::from_parse_result(part_id, &drawing.result)
                .with_material(spec.material.name(), spec.thickness)
                .with_quantity(request.quantity),
        );
    }

    let inputs = config.costing.load_inputs();
    let breakdown = calculate_costs(&cart, &inputs, &densities);
    info!(
        material = %spec.material,
        thickness = spec.thickness,
        parts = cart.len(),
        total = breakdown.total_sell_price,
        "报价完成"
    );

    Ok(QuoteReport {
        drawings,
        rejected,
        breakdown,
    })
}

/// 为提取成功的图纸填入毛重与净重。密度表缺少该材料时不填。
pub fn weigh_drawings(
    drawings: &mut [ExtractedDrawing],
    spec: &PartSpec,
    densities: &MaterialDensities,
) {
    let density = match densities.density(spec.material.name()) {
        Ok(density) => density,
        Err(err) => {
            warn!(material = %spec.material, error = %err, "密度表缺少该材料，不计算重量");
            return;
        }
    };
    for drawing in drawings.iter_mut().filter(|d| !d.result.is_failed()) {
        drawing.weights = Some(drawing.result.weights(spec.thickness, density));
    }
}

/// 解析结果附加重量：先校验材料与板厚，再按配置的密度表计算。
pub fn weigh_parsed(
    drawings: &mut [ExtractedDrawing],
    material: &str,
    thickness: f64,
    config: &AppConfig,
) -> Result<(), FrontendError> {
    let spec = PartSpec::new(material, thickness)?;
    weigh_drawings(drawings, &spec, &config.costing.load_densities());
    Ok(())
}
