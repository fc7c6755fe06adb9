pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，序列化为 `[x, y]`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        /// 两点在给定容差内重合。
        #[inline]
        pub fn approx_eq(self, other: Point2, tolerance: f64) -> bool {
            (self.x() - other.x()).abs() <= tolerance && (self.y() - other.y()).abs() <= tolerance
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量，用于椭圆主轴、块缩放等。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        /// 逆时针旋转 90° 的垂直向量。
        #[inline]
        pub fn perp(self) -> Self {
            Self(self.0.perp())
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框。空框以 ±∞ 作为哨兵值。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        /// 由点集构建边界框，点集为空时返回空框。
        pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2>) -> Self {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(*point);
            }
            bounds
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            if !point.is_finite() {
                return;
            }
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        /// 宽度，空框为 0。
        #[inline]
        pub fn width(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.x() - self.min.x()
            }
        }

        /// 高度，空框为 0。
        #[inline]
        pub fn height(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.y() - self.min.y()
            }
        }

        /// 闭区间包含测试（边界上的点视为在内）。
        #[inline]
        pub fn contains_point(&self, point: Point2) -> bool {
            !self.is_empty()
                && self.min.x() <= point.x()
                && point.x() <= self.max.x()
                && self.min.y() <= point.y()
                && point.y() <= self.max.y()
        }
    }

    /// 折线长度；`closed` 时计入首尾闭合段。
    pub fn polyline_length(points: &[Point2], closed: bool) -> f64 {
        let mut length: f64 = points
            .windows(2)
            .map(|pair| pair[0].distance(pair[1]))
            .sum();
        if closed && points.len() > 2 {
            if let (Some(first), Some(last)) = (points.first(), points.last()) {
                length += last.distance(*first);
            }
        }
        length
    }

    /// 鞋带公式求多边形面积（取绝对值，与顶点方向无关）。
    pub fn shoelace_area(points: &[Point2]) -> f64 {
        let n = points.len();
        if n < 3 {
            return 0.0;
        }
        let mut twice_area = 0.0;
        for i in 0..n {
            let a = points[i];
            let b = points[(i + 1) % n];
            twice_area += a.x() * b.y() - b.x() * a.y();
        }
        twice_area.abs() / 2.0
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn bounds_track_points_and_extent() {
            let mut bounds = Bounds2D::empty();
            assert!(bounds.is_empty());
            assert_eq!(bounds.width(), 0.0);

            bounds.include_point(Point2::new(2.0, -1.0));
            bounds.include_point(Point2::new(-3.0, 4.0));
            bounds.include_point(Point2::new(f64::NAN, 100.0));

            assert!(!bounds.is_empty());
            assert!((bounds.width() - 5.0).abs() < 1e-12);
            assert!((bounds.height() - 5.0).abs() < 1e-12);
            assert!(bounds.contains_point(Point2::new(-3.0, 0.0)));
            assert!(!bounds.contains_point(Point2::new(2.5, 0.0)));
        }

        #[test]
        fn shoelace_matches_unit_square_in_either_orientation() {
            let ccw = [
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(10.0, 10.0),
                Point2::new(0.0, 10.0),
            ];
            let mut cw = ccw;
            cw.reverse();
            assert!((shoelace_area(&ccw) - 100.0).abs() < 1e-9);
            assert!((shoelace_area(&cw) - 100.0).abs() < 1e-9);
            assert_eq!(shoelace_area(&ccw[..2]), 0.0);
        }

        #[test]
        fn polyline_length_adds_closing_segment_only_when_closed() {
            let points = [
                Point2::new(0.0, 0.0),
                Point2::new(3.0, 0.0),
                Point2::new(3.0, 4.0),
            ];
            assert!((polyline_length(&points, false) - 7.0).abs() < 1e-12);
            assert!((polyline_length(&points, true) - 12.0).abs() < 1e-12);
        }
    }
}

pub mod document {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point2, Vector2};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        Ellipse(Ellipse),
        Polyline(Polyline),
        Spline(Spline),
        BlockReference(BlockReference),
        Hatch(Hatch),
        Face3D(ThreeDFace),
        Polyface(Polyface),
        /// 已识别但不参与测量的实体（TEXT、DIMENSION 等）。
        Other(OtherEntity),
        /// 解析阶段损坏的实体，保留诊断信息。
        Malformed(MalformedEntity),
    }

    impl Entity {
        /// 实体所在图层；损坏实体可能没有图层信息。
        pub fn layer_name(&self) -> Option<&str> {
            match self {
                Entity::Line(line) => Some(&line.layer),
                Entity::Circle(circle) => Some(&circle.layer),
                Entity::Arc(arc) => Some(&arc.layer),
                Entity::Ellipse(ellipse) => Some(&ellipse.layer),
                Entity::Polyline(polyline) => Some(&polyline.layer),
                Entity::Spline(spline) => Some(&spline.layer),
                Entity::BlockReference(reference) => Some(&reference.layer),
                Entity::Hatch(hatch) => Some(&hatch.layer),
                Entity::Face3D(face) => Some(&face.layer),
                Entity::Polyface(mesh) => Some(&mesh.layer),
                Entity::Other(other) => Some(&other.layer),
                Entity::Malformed(malformed) => Some(&malformed.layer),
            }
        }

        /// DXF 实体类型名，用于日志。
        pub fn type_name(&self) -> &str {
            match self {
                Entity::Line(_) => "LINE",
                Entity::Circle(_) => "CIRCLE",
                Entity::Arc(_) => "ARC",
                Entity::Ellipse(_) => "ELLIPSE",
                Entity::Polyline(polyline) => match polyline.variant {
                    PolylineVariant::Lightweight => "LWPOLYLINE",
                    PolylineVariant::Heavy => "POLYLINE",
                },
                Entity::Spline(_) => "SPLINE",
                Entity::BlockReference(_) => "INSERT",
                Entity::Hatch(_) => "HATCH",
                Entity::Face3D(_) => "3DFACE",
                Entity::Polyface(_) => "POLYFACE",
                Entity::Other(other) => &other.kind,
                Entity::Malformed(malformed) => &malformed.kind,
            }
        }

        /// 是否属于可切割几何类型（用于图层 0/1 约定判定）。
        pub fn is_cuttable_kind(&self) -> bool {
            !matches!(
                self,
                Entity::BlockReference(_) | Entity::Other(_) | Entity::Malformed(_)
            )
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        pub layer: String,
    }

    /// 圆弧实体，角度以弧度形式储存，遵循数学正方向。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub layer: String,
    }

    /// 椭圆实体，记录主轴向量与参数范围（单位为弧度）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Ellipse {
        pub center: Point2,
        pub major_axis: Vector2,
        pub ratio: f64,
        pub start_parameter: f64,
        pub end_parameter: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum PolylineVariant {
        /// LWPOLYLINE
        Lightweight,
        /// 带 VERTEX 序列的二维 POLYLINE
        Heavy,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
        pub variant: PolylineVariant,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point2,
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point2) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }

        #[inline]
        pub fn with_bulge(position: Point2, bulge: f64) -> Self {
            Self { position, bulge }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Spline {
        pub degree: i32,
        pub is_rational: bool,
        pub is_closed: bool,
        pub is_periodic: bool,
        pub control_points: Vec<Point2>,
        pub fit_points: Vec<Point2>,
        pub knot_values: Vec<f64>,
        pub weights: Vec<f64>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct HatchLoop {
        pub is_polyline: bool,
        pub is_closed: bool,
        pub edges: Vec<HatchEdge>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum HatchEdge {
        Line {
            start: Point2,
            end: Point2,
        },
        /// 角度为弧度。
        Arc {
            center: Point2,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            is_counter_clockwise: bool,
        },
        PolylineSegment {
            start: Point2,
            end: Point2,
            bulge: f64,
        },
        /// 椭圆、样条等暂不测量的边，仅记录 DXF 边类型编号。
        Unsupported {
            edge_type: i32,
        },
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Hatch {
        pub pattern_name: String,
        pub is_solid: bool,
        pub loops: Vec<HatchLoop>,
        pub layer: String,
    }

    /// 3DFACE 的平面投影。第 4 个顶点缺省时与第 3 个相同。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ThreeDFace {
        pub vertices: [Point2; 4],
        pub layer: String,
    }

    impl ThreeDFace {
        /// 去掉相邻重复点后的闭合环顶点。
        pub fn distinct_vertices(&self) -> Vec<Point2> {
            let mut ring: Vec<Point2> = Vec::with_capacity(4);
            for vertex in self.vertices {
                if ring
                    .last()
                    .is_none_or(|last: &Point2| !last.approx_eq(vertex, 1e-12))
                {
                    ring.push(vertex);
                }
            }
            if ring.len() > 1 {
                if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
                    if first.approx_eq(*last, 1e-12) {
                        ring.pop();
                    }
                }
            }
            ring
        }
    }

    /// 多面网格（POLYLINE polyface / polygon mesh），每个面按 3DFACE 处理。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyface {
        pub faces: Vec<ThreeDFace>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct OtherEntity {
        pub kind: String,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MalformedEntity {
        pub kind: String,
        pub message: String,
        pub layer: String,
    }

    /// 块参照，旋转角以弧度储存。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point2,
        pub scale: Vector2,
        pub rotation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point2,
        pub entities: Vec<(EntityId, Entity)>,
    }

    /// 解析后的图纸：模型空间实体与具名块定义。实体 ID 在两者之间共享编号。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        entities: Vec<(EntityId, Entity)>,
        blocks: HashMap<String, BlockDefinition>,
        next_id: u64,
        /// 头段 `$INSUNITS`。
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insunits: Option<i16>,
    }

    impl Document {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            let id = self.allocate_id();
            self.entities.push((id, entity));
            id
        }

        pub fn add_line(&mut self, start: Point2, end: Point2, layer: impl Into<String>) -> EntityId {
            self.add_entity(Entity::Line(Line {
                start,
                end,
                layer: layer.into(),
            }))
        }

        /// `rotation` 为弧度。
        pub fn add_block_reference(
            &mut self,
            name: impl Into<String>,
            insert: Point2,
            scale: Vector2,
            rotation: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::BlockReference(BlockReference {
                name: name.into(),
                insert,
                scale,
                rotation,
                layer: layer.into(),
            }))
        }

        /// 同名块后登记者覆盖先登记者。
        pub fn add_block_definition(
            &mut self,
            name: impl Into<String>,
            base_point: Point2,
            entities: Vec<Entity>,
        ) {
            let name = name.into();
            let entities = entities
                .into_iter()
                .map(|entity| (self.allocate_id(), entity))
                .collect();
            self.blocks.insert(
                name.clone(),
                BlockDefinition {
                    name,
                    base_point,
                    entities,
                },
            );
        }

        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        pub fn entity_count(&self) -> usize {
            self.entities.len()
        }

        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(name)
        }

        pub fn set_insunits(&mut self, units: Option<i16>) {
            self.insunits = units;
        }

        pub fn insunits(&self) -> Option<i16> {
            self.insunits
        }

        fn allocate_id(&mut self) -> EntityId {
            let id = EntityId::new(self.next_id);
            self.next_id += 1;
            id
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn block_entities_share_the_id_sequence() {
            let mut doc = Document::new();
            let line = doc.add_line(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), "CUT");
            doc.add_block_definition(
                "HOLE",
                Point2::new(1.0, 1.0),
                vec![Entity::Circle(Circle {
                    center: Point2::new(1.0, 1.0),
                    radius: 0.5,
                    layer: "HOLES".to_string(),
                })],
            );
            let insert = doc.add_block_reference(
                "HOLE",
                Point2::new(4.0, 4.0),
                Vector2::new(1.0, 1.0),
                0.0,
                "0",
            );

            assert_eq!(line.get(), 0);
            assert_eq!(insert.get(), 2);
            assert_eq!(doc.entity_count(), 2);
            let block = doc.block("HOLE").expect("块定义应存在");
            assert_eq!(block.entities[0].0.get(), 1);
            assert!(doc.block("hole").is_none());
            assert_eq!(doc.insunits(), None);
        }

        #[test]
        fn face_distinct_vertices_drops_repeated_fourth_corner() {
            let face = ThreeDFace {
                vertices: [
                    Point2::new(0.0, 0.0),
                    Point2::new(4.0, 0.0),
                    Point2::new(0.0, 3.0),
                    Point2::new(0.0, 3.0),
                ],
                layer: "0".to_string(),
            };
            assert_eq!(face.distinct_vertices().len(), 3);
        }

        #[test]
        fn type_names_distinguish_polyline_variants() {
            let light = Entity::Polyline(Polyline {
                vertices: Vec::new(),
                is_closed: false,
                variant: PolylineVariant::Lightweight,
                layer: "0".to_string(),
            });
            let heavy = Entity::Polyline(Polyline {
                vertices: Vec::new(),
                is_closed: false,
                variant: PolylineVariant::Heavy,
                layer: "0".to_string(),
            });
            assert_eq!(light.type_name(), "LWPOLYLINE");
            assert_eq!(heavy.type_name(), "POLYLINE");
            assert!(light.is_cuttable_kind());
            let text = Entity::Other(OtherEntity {
                kind: "TEXT".to_string(),
                layer: "0".to_string(),
            });
            assert!(!text.is_cuttable_kind());
        }
    }
}
