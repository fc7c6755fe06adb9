//! 实体遍历与逐类测量。遍历以显式的 `Accumulator` 汇总长度、包围盒、轮廓候选、计数与预览。

use std::collections::HashSet;

use glam::DVec2;
use plasmaq_config::ExtractionConfig;
use plasmaq_core::document::{
    Arc, BlockReference, Circle, Document, Ellipse, Entity, EntityId, Hatch, HatchEdge, Line,
    Polyface, Polyline, PolylineVariant, Spline, ThreeDFace,
};
use plasmaq_core::geometry::{Bounds2D, Point2};
use tracing::{debug, info, warn};

use crate::boundary::{Boundary, OpenPath};
use crate::curves;
use crate::errors::ExtractionFault;
use crate::result::{EntityCounts, EntityKind, GeometryRecord, PolylineSource};
use crate::transform::{BlockEntry, TransformContext, UnitSystem};

/// 无论配置如何都视为参考层的构造图层。
const CONSTRUCTION_LAYERS: &[&str] = &["construction", "reference", "center", "centerline"];

const CLOSURE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerRole {
    Cut,
    Reference,
    Skipped,
}

/// 图层分类规则，名称统一 trim + 小写后比较。
#[derive(Debug, Clone)]
pub struct LayerRules {
    cut: HashSet<String>,
    reference: HashSet<String>,
    layer_one_is_reference: bool,
}

fn clean_layer(name: &str) -> String {
    name.trim().to_lowercase()
}

impl LayerRules {
    pub fn new(config: &ExtractionConfig) -> Self {
        let mut reference: HashSet<String> =
            config.reference_layers.iter().map(|l| clean_layer(l)).collect();
        reference.extend(CONSTRUCTION_LAYERS.iter().map(|l| l.to_string()));
        Self {
            cut: config.cut_layers.iter().map(|l| clean_layer(l)).collect(),
            reference,
            layer_one_is_reference: false,
        }
    }

    /// 若模型空间中图层 0 上存在可切割几何，则图层 1 整体作为参考层。
    pub fn for_document(document: &Document, config: &ExtractionConfig) -> Self {
        let mut rules = Self::new(config);
        if config.layer_one_is_reference {
            rules.layer_one_is_reference = document.entities().any(|(_, entity)| {
                entity.is_cuttable_kind()
                    && entity.layer_name().is_some_and(|layer| clean_layer(layer) == "0")
            });
            if rules.layer_one_is_reference {
                info!("图层 0 上存在切割几何，图层 1 按参考层处理");
            }
        }
        rules
    }

    pub fn classify(&self, layer: &str) -> LayerRole {
        let cleaned = clean_layer(layer);
        if self.layer_one_is_reference && cleaned == "1" {
            return LayerRole::Reference;
        }
        if self.reference.contains(&cleaned) {
            LayerRole::Reference
        } else if self.cut.contains(&cleaned) {
            LayerRole::Cut
        } else {
            LayerRole::Skipped
        }
    }
}

/// 单个实体的测量结果（英寸坐标）。
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub kind: EntityKind,
    pub length: f64,
    /// 计入包围盒的坐标。
    pub points: Vec<Point2>,
    pub boundary: Option<Boundary>,
    /// 可与其他直线、圆弧首尾相接成环的路径。
    pub open_path: Option<OpenPath>,
    pub preview: Vec<GeometryRecord>,
}

impl Measurement {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            length: 0.0,
            points: Vec::new(),
            boundary: None,
            open_path: None,
            preview: Vec::new(),
        }
    }
}

/// 叶子实体的统一测量接口；块参照与网格由遍历展开。
pub trait MeasureEntity {
    fn measure(
        &self,
        ctx: &TransformContext,
        config: &ExtractionConfig,
    ) -> Result<Measurement, ExtractionFault>;
}

fn ensure_finite(kind: &str, points: &[Point2]) -> Result<(), ExtractionFault> {
    if points.iter().all(|point| point.is_finite()) {
        Ok(())
    } else {
        Err(ExtractionFault::Degenerate(format!(
            "{kind} has non-finite coordinates"
        )))
    }
}

fn to_points(points: impl IntoIterator<Item = DVec2>) -> Vec<Point2> {
    points.into_iter().map(Point2::from_vec).collect()
}

impl MeasureEntity for Line {
    fn measure(
        &self,
        ctx: &TransformContext,
        _config: &ExtractionConfig,
    ) -> Result<Measurement, ExtractionFault> {
        let start = ctx.apply(self.start);
        let end = ctx.apply(self.end);
        ensure_finite("LINE", &[start, end])?;
        let mut measurement = Measurement::new(EntityKind::Line);
        measurement.length = start.distance(end);
        measurement.points = vec![start, end];
        measurement.open_path = Some(OpenPath {
            points: vec![start, end],
            length: measurement.length,
        });
        measurement.preview.push(GeometryRecord::Line { start, end });
        Ok(measurement)
    }
}

impl MeasureEntity for Arc {
    fn measure(
        &self,
        ctx: &TransformContext,
        _config: &ExtractionConfig,
    ) -> Result<Measurement, ExtractionFault> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(ExtractionFault::Degenerate(format!(
                "ARC radius {} is not positive",
                self.radius
            )));
        }
        let span = curves::arc_span(self.start_angle, self.end_angle);
        if !span.is_finite() {
            return Err(ExtractionFault::Degenerate(
                "ARC angles are not finite".to_string(),
            ));
        }
        let center = ctx.apply(self.center);
        let radius = ctx.scale_length(self.radius);
        ensure_finite("ARC", &[center])?;

        let samples = curves::sample_arc(
            self.center.as_vec2(),
            self.radius,
            self.start_angle,
            span,
        );
        let (start_angle, end_angle) = ctx.transform_arc_angles(self.start_angle, self.end_angle);
        let mut measurement = Measurement::new(EntityKind::Arc);
        measurement.length = radius * span;
        measurement.points = to_points(samples.into_iter().map(|p| ctx.apply_vec(p)));
        measurement.open_path = Some(OpenPath {
            points: measurement.points.clone(),
            length: measurement.length,
        });
        measurement.preview.push(GeometryRecord::Arc {
            center,
            radius,
            start_angle,
            end_angle,
        });
        Ok(measurement)
    }
}

impl MeasureEntity for Circle {
    fn measure(
        &self,
        ctx: &TransformContext,
        _config: &ExtractionConfig,
    ) -> Result<Measurement, ExtractionFault> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(ExtractionFault::Degenerate(format!(
                "CIRCLE radius {} is not positive",
                self.radius
            )));
        }
        let center = ctx.apply(self.center);
        ensure_finite("CIRCLE", &[center])?;
        let radius = ctx.scale_length(self.radius);
        let boundary = Boundary::circle(center, radius);

        let mut measurement = Measurement::new(EntityKind::Circle);
        measurement.length = boundary.perimeter;
        measurement.points = vec![boundary.bounds.min(), boundary.bounds.max()];
        measurement.boundary = Some(boundary);
        measurement
            .preview
            .push(GeometryRecord::Circle { center, radius });
        Ok(measurement)
    }
}

impl MeasureEntity for Polyline {
    fn measure(
        &self,
        ctx: &TransformContext,
        _config: &ExtractionConfig,
    ) -> Result<Measurement, ExtractionFault> {
        let kind = match self.variant {
            PolylineVariant::Lightweight => EntityKind::LwPolyline,
            PolylineVariant::Heavy => EntityKind::Polyline,
        };
        let vertices = &self.vertices;
        if vertices.len() < 2 {
            return Err(ExtractionFault::Degenerate(format!(
                "polyline has {} vertices",
                vertices.len()
            )));
        }
        let world: Vec<Point2> = vertices.iter().map(|v| ctx.apply(v.position)).collect();
        ensure_finite("polyline", &world)?;

        let first = vertices[0].position;
        let last = vertices[vertices.len() - 1].position;
        let implicitly_closed = vertices.len() > 2 && first.approx_eq(last, CLOSURE_TOLERANCE);
        let closed = self.is_closed || implicitly_closed;

        let mut length = 0.0;
        for (i, pair) in world.windows(2).enumerate() {
            length += curves::bulge_arc_length(pair[0].as_vec2(), pair[1].as_vec2(), vertices[i].bulge);
        }
        if self.is_closed && !implicitly_closed {
            let bulge = vertices[vertices.len() - 1].bulge;
            length += curves::bulge_arc_length(
                world[world.len() - 1].as_vec2(),
                world[0].as_vec2(),
                bulge,
            );
        }

        // 凸度段在局部坐标中采样后再变换，非等比缩放下仍保持形状
        let mut ring = vec![first.as_vec2()];
        for pair in vertices.windows(2) {
            curves::append_bulge_points(
                pair[0].position.as_vec2(),
                pair[1].position.as_vec2(),
                pair[0].bulge,
                &mut ring,
            );
        }
        if self.is_closed && !implicitly_closed {
            let tail = &vertices[vertices.len() - 1];
            curves::append_bulge_points(tail.position.as_vec2(), first.as_vec2(), tail.bulge, &mut ring);
        }
        if closed && ring.len() > 1 {
            ring.pop();
        }
        let ring = to_points(ring.into_iter().map(|p| ctx.apply_vec(p)));

        let mut measurement = Measurement::new(kind);
        measurement.length = length;
        if closed && distinct_count(&ring) >= 3 {
            measurement.boundary = Some(Boundary::polygon(ring.clone(), length));
        }
        measurement.points = ring.clone();
        measurement.preview.push(GeometryRecord::Polyline {
            points: ring,
            closed,
            source: None,
        });
        Ok(measurement)
    }
}

fn distinct_count(points: &[Point2]) -> usize {
    let mut distinct: Vec<Point2> = Vec::new();
    for point in points {
        if !distinct.iter().any(|seen| seen.approx_eq(*point, CLOSURE_TOLERANCE)) {
            distinct.push(*point);
        }
        if distinct.len() >= 3 {
            break;
        }
    }
    distinct.len()
}

impl MeasureEntity for Spline {
    fn measure(
        &self,
        ctx: &TransformContext,
        config: &ExtractionConfig,
    ) -> Result<Measurement, ExtractionFault> {
        // 仿射变换与 B 样条求值可交换，直接在世界坐标下展平
        let control: Vec<DVec2> = self
            .control_points
            .iter()
            .map(|p| ctx.apply_vec(p.as_vec2()))
            .collect();
        let flattened = curves::flatten_spline(
            self.degree,
            &control,
            &self.knot_values,
            &self.weights,
            config.spline_tolerance,
        );

        let (points, source) = match flattened {
            Some(points) => (points, PolylineSource::Spline),
            None => {
                warn!(
                    degree = self.degree,
                    control_points = self.control_points.len(),
                    knots = self.knot_values.len(),
                    "样条展平失败，退回控制多边形"
                );
                let fallback = if control.len() >= 2 {
                    control
                } else {
                    self.fit_points
                        .iter()
                        .map(|p| ctx.apply_vec(p.as_vec2()))
                        .collect()
                };
                if fallback.len() < 2 || fallback.iter().any(|p| !p.is_finite()) {
                    return Err(ExtractionFault::Degenerate(
                        "SPLINE has no usable control or fit points".to_string(),
                    ));
                }
                (fallback, PolylineSource::SplineControlFallback)
            }
        };

        let points = to_points(points);
        let mut measurement = Measurement::new(EntityKind::Spline);
        measurement.length = plasmaq_core::geometry::polyline_length(&points, false);
        measurement.points = points.clone();
        measurement.preview.push(GeometryRecord::Polyline {
            points,
            closed: false,
            source: Some(source),
        });
        Ok(measurement)
    }
}

impl MeasureEntity for Ellipse {
    fn measure(
        &self,
        ctx: &TransformContext,
        config: &ExtractionConfig,
    ) -> Result<Measurement, ExtractionFault> {
        let major = self.major_axis.as_vec2();
        if !major.is_finite() || major.length_squared() <= f64::EPSILON {
            return Err(ExtractionFault::Degenerate(
                "ELLIPSE major axis is zero".to_string(),
            ));
        }
        if !self.ratio.is_finite() || self.ratio <= 0.0 {
            return Err(ExtractionFault::Degenerate(format!(
                "ELLIPSE axis ratio {} is not positive",
                self.ratio
            )));
        }
        let samples = curves::sample_ellipse(
            self.center.as_vec2(),
            major,
            self.ratio,
            self.start_parameter,
            self.end_parameter,
            config.ellipse_segments,
        );
        let points = to_points(samples.into_iter().map(|p| ctx.apply_vec(p)));
        ensure_finite("ELLIPSE", &points)?;

        let mut measurement = Measurement::new(EntityKind::Ellipse);
        measurement.length = plasmaq_core::geometry::polyline_length(&points, false);
        measurement.points = points.clone();
        measurement.preview.push(GeometryRecord::Ellipse { points });
        Ok(measurement)
    }
}

impl MeasureEntity for Hatch {
    fn measure(
        &self,
        ctx: &TransformContext,
        _config: &ExtractionConfig,
    ) -> Result<Measurement, ExtractionFault> {
        let mut measurement = Measurement::new(EntityKind::Hatch);
        for boundary_loop in &self.loops {
            let mut loop_points: Vec<DVec2> = Vec::new();
            for edge in &boundary_loop.edges {
                match edge {
                    HatchEdge::Line { start, end } => {
                        let (start, end) = (ctx.apply_vec(start.as_vec2()), ctx.apply_vec(end.as_vec2()));
                        measurement.length += start.distance(end);
                        loop_points.extend([start, end]);
                    }
                    HatchEdge::PolylineSegment { start, end, bulge } => {
                        let (start, end) = (start.as_vec2(), end.as_vec2());
                        measurement.length +=
                            curves::bulge_arc_length(ctx.apply_vec(start), ctx.apply_vec(end), *bulge);
                        let mut local = vec![start];
                        curves::append_bulge_points(start, end, *bulge, &mut local);
                        loop_points.extend(local.into_iter().map(|p| ctx.apply_vec(p)));
                    }
                    HatchEdge::Arc {
                        center,
                        radius,
                        start_angle,
                        end_angle,
                        is_counter_clockwise,
                    } => {
                        let span = curves::arc_span(*start_angle, *end_angle);
                        if !span.is_finite() || !radius.is_finite() {
                            return Err(ExtractionFault::Degenerate(
                                "HATCH arc edge is not finite".to_string(),
                            ));
                        }
                        measurement.length += ctx.scale_length(radius.abs()) * span;
                        let sweep = if *is_counter_clockwise { span } else { -span };
                        let samples =
                            curves::sample_arc(center.as_vec2(), radius.abs(), *start_angle, sweep);
                        loop_points.extend(samples.into_iter().map(|p| ctx.apply_vec(p)));
                    }
                    HatchEdge::Unsupported { edge_type } => {
                        debug!(edge_type, "填充边界边类型不参与测量");
                    }
                }
            }
            if loop_points.is_empty() {
                continue;
            }
            let points = to_points(loop_points);
            ensure_finite("HATCH", &points)?;
            measurement.points.extend(points.iter().copied());
            measurement.preview.push(GeometryRecord::Hatch { points });
        }
        Ok(measurement)
    }
}

impl MeasureEntity for ThreeDFace {
    fn measure(
        &self,
        ctx: &TransformContext,
        _config: &ExtractionConfig,
    ) -> Result<Measurement, ExtractionFault> {
        let ring: Vec<Point2> = self
            .distinct_vertices()
            .into_iter()
            .map(|vertex| ctx.apply(vertex))
            .collect();
        if ring.len() < 2 {
            return Err(ExtractionFault::Degenerate(
                "3DFACE collapses to a single point".to_string(),
            ));
        }
        ensure_finite("3DFACE", &ring)?;
        let perimeter: f64 = (0..ring.len())
            .map(|i| ring[i].distance(ring[(i + 1) % ring.len()]))
            .sum();

        let mut measurement = Measurement::new(EntityKind::Face3D);
        measurement.length = perimeter;
        measurement.points = ring.clone();
        measurement.preview.push(GeometryRecord::Polyline {
            points: ring,
            closed: true,
            source: Some(PolylineSource::Face),
        });
        Ok(measurement)
    }
}

/// 遍历期间的累加状态。
#[derive(Debug, Clone)]
pub struct Accumulator {
    pub total_length: f64,
    /// 仅由切割层几何构成的包围盒。
    pub cut_bounds: Bounds2D,
    pub candidates: Vec<Boundary>,
    /// 切割层直线与圆弧，组装阶段串接成环。
    pub open_paths: Vec<OpenPath>,
    pub counts: EntityCounts,
    pub preview: Vec<GeometryRecord>,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            total_length: 0.0,
            cut_bounds: Bounds2D::empty(),
            candidates: Vec::new(),
            open_paths: Vec::new(),
            counts: EntityCounts::default(),
            preview: Vec::new(),
        }
    }
}

impl Accumulator {
    /// 合并一次测量：切割层计入长度、包围盒与轮廓候选，参考层只保留预览与计数。
    pub fn absorb(&mut self, measurement: Measurement, role: LayerRole) {
        let Measurement {
            kind,
            length,
            points,
            boundary,
            open_path,
            preview,
        } = measurement;
        if role == LayerRole::Cut {
            self.total_length += length;
            for point in points {
                self.cut_bounds.include_point(point);
            }
            if let Some(boundary) = boundary {
                self.candidates.push(boundary);
            }
            self.open_paths.extend(open_path);
        }
        self.counts.increment(kind);
        self.preview.extend(preview);
    }

    /// 单实体故障：错误记录 + OTHER 计数。
    pub fn record_fault(&mut self, entity_type: &str, fault: &ExtractionFault) {
        warn!(entity = entity_type, error = %fault, "实体测量失败");
        self.counts.increment(EntityKind::Other);
        self.preview
            .push(GeometryRecord::error(format!("{entity_type}: {fault}")));
    }
}

/// 遍历结束时的状态。`fault` 仅在超时中止时存在。
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub accumulator: Accumulator,
    pub fault: Option<ExtractionFault>,
}

struct Traversal<'a> {
    document: &'a Document,
    config: &'a ExtractionConfig,
    rules: LayerRules,
}

/// 遍历模型空间，每个顶层实体调用一次，块参照递归展开。
pub fn extract(document: &Document, config: &ExtractionConfig) -> ExtractionOutcome {
    let traversal = Traversal {
        document,
        config,
        rules: LayerRules::for_document(document, config),
    };
    let units = UnitSystem::from_insunits(document.insunits());
    info!(units = ?units, scale = units.scale_to_inches(), entities = document.entity_count(), "开始提取几何");
    let mut ctx = TransformContext::new(units, config);
    let mut accumulator = Accumulator::default();

    for (index, (id, entity)) in document.entities().enumerate() {
        if index >= config.max_entities {
            warn!(max_entities = config.max_entities, "实体数量达到上限，停止遍历");
            accumulator.preview.push(GeometryRecord::warning(format!(
                "entity limit of {} reached, remaining entities were not processed",
                config.max_entities
            )));
            break;
        }
        if let Err(fault) = traversal.visit(&mut ctx, &mut accumulator, Some(*id), entity, None) {
            return ExtractionOutcome {
                accumulator,
                fault: Some(fault),
            };
        }
    }

    ExtractionOutcome {
        accumulator,
        fault: None,
    }
}

impl Traversal<'_> {
    /// 只有超时会以 `Err` 返回，其余故障在本地转为错误记录。
    fn visit(
        &self,
        ctx: &mut TransformContext,
        acc: &mut Accumulator,
        id: Option<EntityId>,
        entity: &Entity,
        inherited_layer: Option<&str>,
    ) -> Result<(), ExtractionFault> {
        ctx.check_deadline()?;
        if let Some(id) = id {
            if !ctx.mark_visited(id) {
                return Ok(());
            }
        }

        let layer = effective_layer(entity.layer_name().unwrap_or_default(), inherited_layer);
        let role = self.rules.classify(layer);
        if role == LayerRole::Skipped {
            debug!(entity = entity.type_name(), layer, "图层不参与切割，跳过");
            return Ok(());
        }

        let measurable: &dyn MeasureEntity = match entity {
            Entity::BlockReference(reference) => {
                return self.visit_insert(ctx, acc, reference, layer);
            }
            Entity::Polyface(mesh) => return self.visit_mesh(ctx, acc, mesh, layer),
            Entity::Other(other) => {
                debug!(entity = %other.kind, layer, "实体类型不参与测量");
                acc.counts.increment(EntityKind::Other);
                return Ok(());
            }
            Entity::Malformed(malformed) => {
                let fault = ExtractionFault::UnsupportedGeometry(malformed.message.clone());
                acc.record_fault(&malformed.kind, &fault);
                return Ok(());
            }
            Entity::Line(line) => line,
            Entity::Arc(arc) => arc,
            Entity::Circle(circle) => circle,
            Entity::Polyline(polyline) => polyline,
            Entity::Spline(spline) => spline,
            Entity::Ellipse(ellipse) => ellipse,
            Entity::Hatch(hatch) => hatch,
            Entity::Face3D(face) => face,
        };
        self.measure_into(measurable, entity.type_name(), role, ctx, acc);
        Ok(())
    }

    /// 块参照本身不测量，计一次 INSERT 后压入坐标系展开块内实体。
    fn visit_insert(
        &self,
        ctx: &mut TransformContext,
        acc: &mut Accumulator,
        reference: &BlockReference,
        layer: &str,
    ) -> Result<(), ExtractionFault> {
        acc.counts.increment(EntityKind::Insert);
        let Some(block) = self.document.block(&reference.name) else {
            warn!(block = %reference.name, "块定义不存在");
            acc.preview.push(GeometryRecord::warning(format!(
                "block {} is not defined",
                reference.name
            )));
            return Ok(());
        };
        match ctx.enter_block(reference, block.base_point) {
            BlockEntry::Entered => {
                let result = block.entities.iter().try_for_each(|(child_id, child)| {
                    self.visit(ctx, acc, Some(*child_id), child, Some(layer))
                });
                ctx.leave_block();
                result
            }
            BlockEntry::Cyclic => {
                acc.preview.push(GeometryRecord::warning(format!(
                    "block {} references itself, skipped",
                    reference.name
                )));
                Ok(())
            }
            BlockEntry::TooDeep => {
                acc.preview.push(GeometryRecord::warning(format!(
                    "block {} exceeds the nesting limit of {}",
                    reference.name, self.config.max_recursion_depth
                )));
                Ok(())
            }
        }
    }

    /// 网格计一次 POLYFACE，各面作为下一层的 3DFACE 处理。
    fn visit_mesh(
        &self,
        ctx: &mut TransformContext,
        acc: &mut Accumulator,
        mesh: &Polyface,
        layer: &str,
    ) -> Result<(), ExtractionFault> {
        acc.counts.increment(EntityKind::Polyface);
        if !ctx.enter_nested() {
            acc.preview.push(GeometryRecord::warning(format!(
                "mesh faces exceed the nesting limit of {}",
                self.config.max_recursion_depth
            )));
            return Ok(());
        }
        let result = mesh.faces.iter().try_for_each(|face| {
            ctx.check_deadline()?;
            let role = self.rules.classify(effective_layer(&face.layer, Some(layer)));
            if role != LayerRole::Skipped {
                self.measure_into(face, "3DFACE", role, ctx, acc);
            }
            Ok(())
        });
        ctx.leave_nested();
        result
    }

    fn measure_into(
        &self,
        entity: &dyn MeasureEntity,
        entity_type: &str,
        role: LayerRole,
        ctx: &TransformContext,
        acc: &mut Accumulator,
    ) {
        match entity.measure(ctx, self.config) {
            Ok(measurement) => {
                debug!(
                    entity = entity_type,
                    role = ?role,
                    length = measurement.length,
                    "实体测量完成"
                );
                acc.absorb(measurement, role);
            }
            Err(fault) => acc.record_fault(entity_type, &fault),
        }
    }
}

/// 块内图层 0 上的实体继承块参照的图层。
fn effective_layer<'a>(layer: &'a str, inherited: Option<&'a str>) -> &'a str {
    match inherited {
        Some(parent) if layer.trim() == "0" => parent,
        _ => layer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasmaq_core::document::{PolylineVertex, ThreeDFace};
    use plasmaq_core::geometry::Vector2;
    use std::f64::consts::PI;

    fn ctx() -> TransformContext {
        TransformContext::new(UnitSystem::Inches, &ExtractionConfig::default())
    }

    fn polyline(points: &[(f64, f64, f64)], is_closed: bool) -> Polyline {
        Polyline {
            vertices: points
                .iter()
                .map(|(x, y, bulge)| PolylineVertex::with_bulge(Point2::new(*x, *y), *bulge))
                .collect(),
            is_closed,
            variant: PolylineVariant::Lightweight,
            layer: "CUT".to_string(),
        }
    }

    #[test]
    fn layer_rules_prefer_reference_and_handle_layer_one() {
        let config = ExtractionConfig::default();
        let rules = LayerRules::new(&config);
        assert_eq!(rules.classify(" CUT "), LayerRole::Cut);
        assert_eq!(rules.classify("Centerline"), LayerRole::Reference);
        assert_eq!(rules.classify("1"), LayerRole::Cut);
        assert_eq!(rules.classify("Mystery"), LayerRole::Skipped);

        let mut doc = Document::new();
        doc.add_line(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), "0");
        let rules = LayerRules::for_document(&doc, &config);
        assert_eq!(rules.classify("1"), LayerRole::Reference);

        let custom = config.with_reference_layers(Vec::<String>::new());
        assert_eq!(LayerRules::new(&custom).classify("construction"), LayerRole::Reference);
    }

    #[test]
    fn closed_square_polyline_is_a_polygon_candidate() {
        let square = polyline(
            &[(0.0, 0.0, 0.0), (10.0, 0.0, 0.0), (10.0, 10.0, 0.0), (0.0, 10.0, 0.0)],
            true,
        );
        let m = square.measure(&ctx(), &ExtractionConfig::default()).unwrap();
        assert_eq!(m.kind, EntityKind::LwPolyline);
        assert!((m.length - 40.0).abs() < 1e-12);
        let boundary = m.boundary.unwrap();
        assert!((boundary.area - 100.0).abs() < 1e-12);
    }

    #[test]
    fn coincident_endpoints_close_the_polyline() {
        let square = polyline(
            &[
                (0.0, 0.0, 0.0),
                (2.0, 0.0, 0.0),
                (2.0, 2.0, 0.0),
                (0.0, 2.0, 0.0),
                (0.0, 0.0, 0.0),
            ],
            false,
        );
        let m = square.measure(&ctx(), &ExtractionConfig::default()).unwrap();
        assert!((m.length - 8.0).abs() < 1e-12);
        assert!((m.boundary.unwrap().area - 4.0).abs() < 1e-12);
        match &m.preview[0] {
            GeometryRecord::Polyline { points, closed, .. } => {
                assert!(*closed);
                assert_eq!(points.len(), 4);
            }
            other => panic!("unexpected preview {other:?}"),
        }
    }

    #[test]
    fn bulged_slot_uses_arc_length_and_sampled_area() {
        // 两段直边加两个半圆端头的长圆孔
        let slot = polyline(
            &[(0.0, 0.0, 0.0), (4.0, 0.0, 1.0), (4.0, 2.0, 0.0), (0.0, 2.0, 1.0)],
            true,
        );
        let m = slot.measure(&ctx(), &ExtractionConfig::default()).unwrap();
        assert!((m.length - (8.0 + 2.0 * PI)).abs() < 1e-9);
        let area = m.boundary.unwrap().area;
        assert!((area - (8.0 + PI)).abs() < 0.02, "area = {area}");
    }

    #[test]
    fn open_polyline_has_no_boundary() {
        let open = polyline(&[(0.0, 0.0, 0.0), (3.0, 4.0, 0.0)], false);
        let m = open.measure(&ctx(), &ExtractionConfig::default()).unwrap();
        assert_eq!(m.length, 5.0);
        assert!(m.boundary.is_none());
        let single = polyline(&[(0.0, 0.0, 0.0)], false);
        assert!(matches!(
            single.measure(&ctx(), &ExtractionConfig::default()),
            Err(ExtractionFault::Degenerate(_))
        ));
    }

    #[test]
    fn arc_length_wraps_past_zero() {
        let arc = Arc {
            center: Point2::new(0.0, 0.0),
            radius: 2.0,
            start_angle: 270f64.to_radians(),
            end_angle: 90f64.to_radians(),
            layer: "CUT".to_string(),
        };
        let m = arc.measure(&ctx(), &ExtractionConfig::default()).unwrap();
        assert!((m.length - 2.0 * PI).abs() < 1e-9);
        match &m.preview[0] {
            GeometryRecord::Arc { start_angle, end_angle, .. } => {
                assert!((start_angle - 270.0).abs() < 1e-9);
                assert!((end_angle - 90.0).abs() < 1e-9);
            }
            other => panic!("unexpected preview {other:?}"),
        }
        let bounds = Bounds2D::from_points(&m.points);
        assert!((bounds.max().x() - 2.0).abs() < 1e-9);
        assert!(bounds.min().x().abs() < 1e-9);
    }

    #[test]
    fn circle_is_a_boundary_and_zero_radius_is_degenerate() {
        let circle = Circle {
            center: Point2::new(1.0, 1.0),
            radius: 5.0,
            layer: "CUT".to_string(),
        };
        let m = circle.measure(&ctx(), &ExtractionConfig::default()).unwrap();
        assert!((m.length - 10.0 * PI).abs() < 1e-12);
        assert!((m.boundary.unwrap().area - 25.0 * PI).abs() < 1e-12);

        let dot = Circle { radius: 0.0, ..circle };
        assert!(dot.measure(&ctx(), &ExtractionConfig::default()).is_err());
    }

    #[test]
    fn spline_falls_back_to_control_polygon() {
        let spline = Spline {
            degree: 3,
            is_rational: false,
            is_closed: false,
            is_periodic: false,
            control_points: vec![Point2::new(0.0, 0.0), Point2::new(3.0, 4.0)],
            fit_points: Vec::new(),
            knot_values: vec![0.0, 1.0],
            weights: Vec::new(),
            layer: "CUT".to_string(),
        };
        let m = spline.measure(&ctx(), &ExtractionConfig::default()).unwrap();
        assert_eq!(m.length, 5.0);
        assert!(matches!(
            &m.preview[0],
            GeometryRecord::Polyline { source: Some(PolylineSource::SplineControlFallback), .. }
        ));

        let empty = Spline {
            control_points: Vec::new(),
            fit_points: vec![Point2::new(1.0, 1.0)],
            ..spline
        };
        assert!(matches!(
            empty.measure(&ctx(), &ExtractionConfig::default()),
            Err(ExtractionFault::Degenerate(_))
        ));
    }

    #[test]
    fn face_perimeter_wraps_around() {
        let face = ThreeDFace {
            vertices: [
                Point2::new(0.0, 0.0),
                Point2::new(3.0, 0.0),
                Point2::new(3.0, 4.0),
                Point2::new(3.0, 4.0),
            ],
            layer: "CUT".to_string(),
        };
        let m = face.measure(&ctx(), &ExtractionConfig::default()).unwrap();
        assert!((m.length - 12.0).abs() < 1e-12);
        assert!(m.boundary.is_none());
    }

    #[test]
    fn hatch_measures_line_and_arc_edges_only() {
        use plasmaq_core::document::HatchLoop;
        let hatch = Hatch {
            pattern_name: "SOLID".to_string(),
            is_solid: true,
            loops: vec![HatchLoop {
                is_polyline: false,
                is_closed: true,
                edges: vec![
                    HatchEdge::Line {
                        start: Point2::new(0.0, 0.0),
                        end: Point2::new(2.0, 0.0),
                    },
                    HatchEdge::Arc {
                        center: Point2::new(1.0, 0.0),
                        radius: 1.0,
                        start_angle: 0.0,
                        end_angle: PI,
                        is_counter_clockwise: true,
                    },
                    HatchEdge::Unsupported { edge_type: 3 },
                ],
            }],
            layer: "CUT".to_string(),
        };
        let m = hatch.measure(&ctx(), &ExtractionConfig::default()).unwrap();
        assert!((m.length - (2.0 + PI)).abs() < 1e-12);
        assert_eq!(m.preview.len(), 1);
        assert!(m.boundary.is_none());
    }

    #[test]
    fn inserted_block_is_expanded_with_its_transform() {
        let mut doc = Document::new();
        doc.add_block_definition(
            "TAB",
            Point2::new(0.0, 0.0),
            vec![Entity::Line(Line {
                start: Point2::new(0.0, 0.0),
                end: Point2::new(1.0, 0.0),
                layer: "0".to_string(),
            })],
        );
        doc.add_block_reference("TAB", Point2::new(5.0, 5.0), Vector2::new(3.0, 3.0), 0.0, "CUT");
        doc.add_block_reference("TAB", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0, "CUT");
        doc.add_block_reference("MISSING", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0, "CUT");

        let outcome = extract(&doc, &ExtractionConfig::default());
        let acc = outcome.accumulator;
        assert!(outcome.fault.is_none());
        assert!((acc.total_length - 4.0).abs() < 1e-12);
        assert_eq!(acc.counts.get(EntityKind::Insert), 3);
        assert_eq!(acc.counts.get(EntityKind::Line), 2);
        assert!(acc
            .preview
            .iter()
            .any(|r| matches!(r, GeometryRecord::Warning { message } if message.contains("MISSING"))));
    }

    #[test]
    fn reference_entities_preview_without_length() {
        let mut doc = Document::new();
        doc.add_line(Point2::new(0.0, 0.0), Point2::new(4.0, 0.0), "CUT");
        doc.add_line(Point2::new(0.0, 0.0), Point2::new(0.0, 9.0), "CENTER");
        doc.add_line(Point2::new(0.0, 0.0), Point2::new(0.0, 7.0), "unknown");

        let acc = extract(&doc, &ExtractionConfig::default()).accumulator;
        assert_eq!(acc.total_length, 4.0);
        assert_eq!(acc.counts.get(EntityKind::Line), 2);
        assert_eq!(acc.preview.len(), 2);
        assert_eq!(acc.cut_bounds.height(), 0.0);
    }
}
