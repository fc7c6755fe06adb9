//! 订单成本分摊：材料成本逐件计算，订单级人工与机时按单件工时占比分摊。

use std::collections::HashSet;

use plasmaq_config::{CostInputs, MaterialDensities};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::QuoteError;
use crate::result::ParseResult;

const THICK_PLATE: f64 = 0.75;

/// 购物车中的一个零件，作为成本计算的只读输入。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub part_id: String,
    pub material: Option<String>,
    pub thickness: Option<f64>,
    pub quantity: u32,
    pub length: f64,
    pub net_area: f64,
    pub gross_area: f64,
    pub pierce_count: u32,
}

impl CartItem {
    /// 复制提取结果中的数值字段，材料与板厚留空，数量为 1。
    pub fn from_parse_result(part_id: impl Into<String>, result: &ParseResult) -> Self {
        Self {
            part_id: part_id.into(),
            material: None,
            thickness: None,
            quantity: 1,
            length: result.total_cut_length,
            net_area: result.net_area,
            gross_area: result.gross_area,
            pierce_count: result.pierce_count,
        }
    }

    pub fn with_material(mut self, material: impl Into<String>, thickness: f64) -> Self {
        self.material = Some(material.into());
        self.thickness = Some(thickness);
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// 数量为 0 按 1 计。
    #[inline]
    pub fn effective_quantity(&self) -> u32 {
        self.quantity.max(1)
    }

    fn material_and_thickness(&self) -> Option<(&str, f64)> {
        match (self.material.as_deref(), self.thickness) {
            (Some(material), Some(thickness)) if !material.trim().is_empty() && thickness > 0.0 => {
                Some((material, thickness))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub part_id: String,
    pub quantity: u32,
    pub material: String,
    pub thickness: f64,
    /// 单件售价。
    pub unit_price: f64,
    /// 单价 × 数量。
    pub sell_price_per_part: f64,
    pub cogs_per_part: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    MissingMaterialOrThickness,
    MaterialNotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedItem {
    pub part_id: String,
    pub reason: ExclusionReason,
}

/// 整单报价，每次调用都从头计算。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub total_sell_price: f64,
    pub detailed_breakdown: Vec<LineItem>,
    pub excluded: Vec<ExcludedItem>,
}

/// 参与计价的零件及其单件工时（分钟）。
struct PricedItem<'a> {
    item: &'a CartItem,
    material: &'a str,
    thickness: f64,
    material_cost: f64,
    cut_time: f64,
    labor_time: f64,
}

/// 计算整单成本。纯函数，不持有任何状态。
pub fn calculate_costs(
    items: &[CartItem],
    inputs: &CostInputs,
    densities: &MaterialDensities,
) -> CostBreakdown {
    let mut excluded = Vec::new();

    // 材料名与密度查询一致：忽略大小写与首尾空白
    let combinations: HashSet<(String, u64)> = items
        .iter()
        .filter_map(CartItem::material_and_thickness)
        .map(|(material, thickness)| (material.trim().to_ascii_lowercase(), thickness.to_bits()))
        .collect();
    let changeover_time = if combinations.len() > 1 {
        (combinations.len() - 1) as f64 * inputs.minutes("thickness_changeover_time")
    } else {
        0.0
    };
    let setup_time = inputs.minutes("order_setup_time");

    let efficiency = inputs.value("material_efficiency");
    let steel_cost_per_lb = inputs.value("steel_cost_per_lb");
    let pierce_minutes = inputs.minutes("pierce_time");

    let mut priced = Vec::new();
    for item in items {
        let Some((material, thickness)) = item.material_and_thickness() else {
            info!(part = %item.part_id, "零件缺少材料或板厚，不参与报价");
            excluded.push(ExcludedItem {
                part_id: item.part_id.clone(),
                reason: ExclusionReason::MissingMaterialOrThickness,
            });
            continue;
        };
        let density = match densities.density(material) {
            Ok(density) => density,
            Err(err) => {
                warn!(part = %item.part_id, error = %err, "材料密度缺失，不参与报价");
                excluded.push(ExcludedItem {
                    part_id: item.part_id.clone(),
                    reason: ExclusionReason::MaterialNotFound,
                });
                continue;
            }
        };

        let adjusted_area = if efficiency > 0.0 {
            item.gross_area / efficiency
        } else {
            item.gross_area
        };
        let material_cost = adjusted_area * thickness * density * steel_cost_per_lb;

        let speed = inputs.value(cut_speed_key(thickness));
        let cut_time = if speed > 0.0 { item.length / speed } else { 0.0 };
        let pierce_time = f64::from(item.pierce_count) * pierce_minutes;
        let cleanup_time = if thickness >= THICK_PLATE {
            inputs.minutes("cleanup_assembly_time_thick")
        } else {
            inputs.minutes("cleanup_assembly_time_thin")
        };
        let labor_time = cut_time + pierce_time + cleanup_time;
        debug!(
            part = %item.part_id,
            material_cost,
            cut_time,
            pierce_time,
            cleanup_time,
            "单件成本"
        );

        priced.push(PricedItem {
            item,
            material,
            thickness,
            material_cost,
            cut_time,
            labor_time,
        });
    }

    let total_labor_time: f64 = priced
        .iter()
        .map(|p| f64::from(p.item.effective_quantity()) * p.labor_time)
        .sum();
    let order_labor_time = total_labor_time + setup_time + changeover_time;
    let labor_cost = order_labor_time * inputs.per_minute("direct_labor_rate");
    let machine_rate = inputs.per_minute("machine_rate_per_min");
    let order_machine_cost = (setup_time + changeover_time) * machine_rate;
    let margin = inputs.value("margin");

    let mut breakdown = CostBreakdown {
        excluded,
        ..CostBreakdown::default()
    };
    for p in &priced {
        let share = if total_labor_time > 0.0 {
            p.labor_time / total_labor_time
        } else {
            0.0
        };
        let machine_cost = order_machine_cost * share + p.cut_time * machine_rate;
        let cogs = p.material_cost + labor_cost * share + machine_cost;
        let unit_price = if margin < 1.0 { cogs / (1.0 - margin) } else { cogs };
        let quantity = p.item.effective_quantity();
        let sell_price = unit_price * f64::from(quantity);
        breakdown.total_sell_price += sell_price;
        breakdown.detailed_breakdown.push(LineItem {
            part_id: p.item.part_id.clone(),
            quantity,
            material: p.material.to_string(),
            thickness: p.thickness,
            unit_price,
            sell_price_per_part: sell_price,
            cogs_per_part: cogs,
        });
    }

    info!(
        parts = breakdown.detailed_breakdown.len(),
        excluded = breakdown.excluded.len(),
        total = breakdown.total_sell_price,
        "报价计算完成"
    );
    breakdown
}

/// 切割速度档位：≤0.375、≤0.75、其余。
fn cut_speed_key(thickness: f64) -> &'static str {
    if thickness <= 0.375 {
        "cut_speed_0.375"
    } else if thickness <= 0.75 {
        "cut_speed_0.75"
    } else {
        "cut_speed_1.0"
    }
}

/// 把会被排除的零件作为错误返回，供需要硬性前置校验的调用方使用。
pub fn validate_cart(items: &[CartItem], densities: &MaterialDensities) -> Result<(), QuoteError> {
    for item in items {
        let Some((material, _)) = item.material_and_thickness() else {
            return Err(QuoteError::MissingMaterialOrThickness {
                part_id: item.part_id.clone(),
            });
        };
        if densities.density(material).is_err() {
            return Err(QuoteError::MaterialNotFound {
                material: material.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasmaq_config::Unit;

    fn densities() -> MaterialDensities {
        MaterialDensities::default()
            .with_density("A36 Steel", 0.2836)
            .with_density("Aluminum 6061", 0.0975)
    }

    fn item(part_id: &str, material: &str, thickness: f64) -> CartItem {
        CartItem {
            part_id: part_id.to_string(),
            material: Some(material.to_string()),
            thickness: Some(thickness),
            quantity: 1,
            length: 120.0,
            net_area: 80.0,
            gross_area: 100.0,
            pierce_count: 3,
        }
    }

    fn priced_inputs() -> CostInputs {
        CostInputs::default()
            .with_input("direct_labor_rate", 60.0, Unit::DollarsPerHour)
            .with_input("machine_rate_per_min", 2.0, Unit::DollarsPerMinute)
            .with_input("pierce_time", 30.0, Unit::Second)
            .with_input("steel_cost_per_lb", 1.0, Unit::DollarsPerPound)
            .with_input("order_setup_time", 10.0, Unit::Minute)
            .with_input("thickness_changeover_time", 5.0, Unit::Minute)
    }

    #[test]
    fn single_item_without_margin_prices_at_cogs() {
        let breakdown = calculate_costs(&[item("P1", "A36 Steel", 0.25)], &priced_inputs(), &densities());
        assert_eq!(breakdown.detailed_breakdown.len(), 1);
        let line = &breakdown.detailed_breakdown[0];

        // 材料：100 / 0.9 × 0.25 × 0.2836 × 1
        let material = 100.0 / 0.9 * 0.25 * 0.2836;
        // 工时：切割 120/60 = 2，穿孔 3 × 0.5 = 1.5，清理 15 s = 0.25
        let labor_time = 2.0 + 1.5 + 0.25;
        let labor_cost = (labor_time + 10.0) * 1.0;
        let machine = 10.0 * 2.0 + 2.0 * 2.0;
        let cogs = material + labor_cost + machine;
        assert!((line.cogs_per_part - cogs).abs() < 1e-9);
        assert_eq!(line.unit_price, line.cogs_per_part);
        assert!((breakdown.total_sell_price - cogs).abs() < 1e-9);
    }

    #[test]
    fn margin_divides_unless_at_least_one() {
        let inputs = priced_inputs().with_input("margin", 0.2, Unit::Unitless);
        let breakdown = calculate_costs(&[item("P1", "A36 Steel", 0.5)], &inputs, &densities());
        let line = &breakdown.detailed_breakdown[0];
        assert!((line.unit_price - line.cogs_per_part / 0.8).abs() < 1e-9);

        let inputs = priced_inputs().with_input("margin", 1.0, Unit::Unitless);
        let breakdown = calculate_costs(&[item("P1", "A36 Steel", 0.5)], &inputs, &densities());
        let line = &breakdown.detailed_breakdown[0];
        assert_eq!(line.unit_price, line.cogs_per_part);
    }

    #[test]
    fn items_without_material_are_excluded() {
        let mut bare = item("P1", "A36 Steel", 0.5);
        bare.material = None;
        let breakdown = calculate_costs(&[bare.clone()], &priced_inputs(), &densities());
        assert!(breakdown.detailed_breakdown.is_empty());
        assert_eq!(breakdown.total_sell_price, 0.0);
        assert_eq!(
            breakdown.excluded,
            vec![ExcludedItem {
                part_id: "P1".to_string(),
                reason: ExclusionReason::MissingMaterialOrThickness,
            }]
        );
        assert!(matches!(
            validate_cart(&[bare], &densities()),
            Err(QuoteError::MissingMaterialOrThickness { .. })
        ));
    }

    #[test]
    fn unknown_density_is_excluded() {
        let cart = [item("P1", "Stainless 316", 0.5), item("P2", "A36 Steel", 0.5)];
        let breakdown = calculate_costs(&cart, &priced_inputs(), &densities());
        assert_eq!(breakdown.detailed_breakdown.len(), 1);
        assert_eq!(breakdown.excluded[0].reason, ExclusionReason::MaterialNotFound);
        assert_eq!(
            validate_cart(&cart, &densities()),
            Err(QuoteError::MaterialNotFound {
                material: "Stainless 316".to_string()
            })
        );
        assert!(validate_cart(&cart[1..], &densities()).is_ok());
    }

    #[test]
    fn changeover_counts_distinct_pairs_and_splits_by_labor() {
        let mut heavy = item("THICK", "A36 Steel", 1.0);
        heavy.quantity = 2;
        let cart = [
            item("A", "A36 Steel", 0.25),
            item("B", "A36 Steel", 0.25),
            heavy,
            item("AL", "Aluminum 6061", 0.25),
        ];
        let inputs = CostInputs::default()
            .with_input("direct_labor_rate", 60.0, Unit::DollarsPerHour)
            .with_input("thickness_changeover_time", 5.0, Unit::Minute)
            .with_input("cleanup_assembly_time_thin", 0.0, Unit::Second)
            .with_input("cleanup_assembly_time_thick", 0.0, Unit::Second);
        let breakdown = calculate_costs(&cart, &inputs, &densities());

        // 三种组合 → 两次换型 = 10 分钟；单件工时：薄板 120/60 = 2，厚板 120/25 = 4.8
        let total_labor = 2.0 + 2.0 + 2.0 * 4.8 + 2.0;
        let labor_cost = total_labor + 10.0;
        let thin = &breakdown.detailed_breakdown[0];
        assert!((thin.cogs_per_part - labor_cost * 2.0 / total_labor).abs() < 1e-9);
        let thick = &breakdown.detailed_breakdown[2];
        assert_eq!(thick.quantity, 2);
        assert!((thick.sell_price_per_part - 2.0 * labor_cost * 4.8 / total_labor).abs() < 1e-9);

        let sum: f64 = breakdown.detailed_breakdown.iter().map(|l| l.sell_price_per_part).sum();
        assert!((breakdown.total_sell_price - sum).abs() < 1e-9);
        assert!((breakdown.total_sell_price - labor_cost).abs() < 1e-9);
    }

    #[test]
    fn material_case_does_not_add_a_changeover() {
        let inputs = priced_inputs().with_input("thickness_changeover_time", 5.0, Unit::Minute);
        let same = [item("A", "A36 Steel", 0.25), item("B", "A36 Steel", 0.25)];
        let mixed = [item("A", "A36 Steel", 0.25), item("B", " a36 STEEL ", 0.25)];
        let same = calculate_costs(&same, &inputs, &densities());
        let mixed = calculate_costs(&mixed, &inputs, &densities());
        assert_eq!(mixed.detailed_breakdown.len(), 2);
        assert!((mixed.total_sell_price - same.total_sell_price).abs() < 1e-9);
    }

    #[test]
    fn zero_quantity_counts_as_one_and_zero_speed_skips_cutting() {
        let mut zero = item("Z", "A36 Steel", 0.25);
        zero.quantity = 0;
        let inputs = priced_inputs().with_input("cut_speed_0.375", 0.0, Unit::InchesPerMinute);
        let breakdown = calculate_costs(&[zero], &inputs, &densities());
        let line = &breakdown.detailed_breakdown[0];
        assert_eq!(line.quantity, 1);
        assert_eq!(line.sell_price_per_part, line.unit_price);
    }

    #[test]
    fn cart_item_copies_parse_result_numbers() {
        use crate::result::{EntityCounts, GeometryRecord};
        let mut result = ParseResult::zeroed(EntityCounts::default(), GeometryRecord::warning("x"));
        result.total_cut_length = 40.0;
        result.net_area = 100.0;
        result.gross_area = 100.0;
        result.pierce_count = 1;
        let item = CartItem::from_parse_result("square.dxf", &result)
            .with_material("A36 Steel", 0.25)
            .with_quantity(4);
        assert_eq!(item.length, 40.0);
        assert_eq!(item.pierce_count, 1);
        assert_eq!(item.quantity, 4);
        assert_eq!(item.thickness, Some(0.25));
    }
}
