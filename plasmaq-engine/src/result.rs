use plasmaq_core::geometry::Point2;
use serde::Serialize;

/// 预览记录，序列化时以 `type` 字段区分种类。产出后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeometryRecord {
    Line {
        start: Point2,
        end: Point2,
    },
    /// 角度为度，已叠加块参照的旋转。
    Arc {
        center: Point2,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    },
    Circle {
        center: Point2,
        radius: f64,
    },
    Polyline {
        points: Vec<Point2>,
        closed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<PolylineSource>,
    },
    Ellipse {
        points: Vec<Point2>,
    },
    Hatch {
        points: Vec<Point2>,
    },
    Error {
        message: String,
    },
    Warning {
        message: String,
    },
}

impl GeometryRecord {
    pub fn error(message: impl Into<String>) -> Self {
        GeometryRecord::Error {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        GeometryRecord::Warning {
            message: message.into(),
        }
    }

    /// 诊断记录（错误或警告）不携带几何。
    #[inline]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, GeometryRecord::Error { .. } | GeometryRecord::Warning { .. })
    }

    /// 记录涉及的全部坐标；圆与圆弧展开为外接框的两个角点。
    pub fn coordinates(&self) -> Vec<Point2> {
        match self {
            GeometryRecord::Line { start, end } => vec![*start, *end],
            GeometryRecord::Arc { center, radius, .. } | GeometryRecord::Circle { center, radius } => {
                vec![
                    Point2::new(center.x() - radius, center.y() - radius),
                    Point2::new(center.x() + radius, center.y() + radius),
                ]
            }
            GeometryRecord::Polyline { points, .. }
            | GeometryRecord::Ellipse { points }
            | GeometryRecord::Hatch { points } => points.clone(),
            GeometryRecord::Error { .. } | GeometryRecord::Warning { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolylineSource {
    Spline,
    SplineControlFallback,
    Face,
}

/// 计数所用的实体类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Line,
    Arc,
    Circle,
    LwPolyline,
    Polyline,
    Insert,
    Spline,
    Ellipse,
    Hatch,
    Face3D,
    Polyface,
    Other,
}

impl EntityKind {
    pub const ALL: [EntityKind; 12] = [
        EntityKind::Line,
        EntityKind::Arc,
        EntityKind::Circle,
        EntityKind::LwPolyline,
        EntityKind::Polyline,
        EntityKind::Insert,
        EntityKind::Spline,
        EntityKind::Ellipse,
        EntityKind::Hatch,
        EntityKind::Face3D,
        EntityKind::Polyface,
        EntityKind::Other,
    ];

    pub fn key(self) -> &'static str {
        match self {
            EntityKind::Line => "LINE",
            EntityKind::Arc => "ARC",
            EntityKind::Circle => "CIRCLE",
            EntityKind::LwPolyline => "LWPOLYLINE",
            EntityKind::Polyline => "POLYLINE",
            EntityKind::Insert => "INSERT",
            EntityKind::Spline => "SPLINE",
            EntityKind::Ellipse => "ELLIPSE",
            EntityKind::Hatch => "HATCH",
            EntityKind::Face3D => "3DFACE",
            EntityKind::Polyface => "POLYFACE",
            EntityKind::Other => "OTHER",
        }
    }
}

/// 按类别统计的实体数量，键固定，只增不减。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    #[serde(rename = "LINE")]
    line: u64,
    #[serde(rename = "ARC")]
    arc: u64,
    #[serde(rename = "CIRCLE")]
    circle: u64,
    #[serde(rename = "LWPOLYLINE")]
    lwpolyline: u64,
    #[serde(rename = "POLYLINE")]
    polyline: u64,
    #[serde(rename = "INSERT")]
    insert: u64,
    #[serde(rename = "SPLINE")]
    spline: u64,
    #[serde(rename = "ELLIPSE")]
    ellipse: u64,
    #[serde(rename = "HATCH")]
    hatch: u64,
    #[serde(rename = "3DFACE")]
    face3d: u64,
    #[serde(rename = "POLYFACE")]
    polyface: u64,
    #[serde(rename = "OTHER")]
    other: u64,
}

impl EntityCounts {
    pub fn increment(&mut self, kind: EntityKind) {
        *self.slot_mut(kind) += 1;
    }

    pub fn get(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Line => self.line,
            EntityKind::Arc => self.arc,
            EntityKind::Circle => self.circle,
            EntityKind::LwPolyline => self.lwpolyline,
            EntityKind::Polyline => self.polyline,
            EntityKind::Insert => self.insert,
            EntityKind::Spline => self.spline,
            EntityKind::Ellipse => self.ellipse,
            EntityKind::Hatch => self.hatch,
            EntityKind::Face3D => self.face3d,
            EntityKind::Polyface => self.polyface,
            EntityKind::Other => self.other,
        }
    }

    pub fn total(&self) -> u64 {
        EntityKind::ALL.iter().map(|kind| self.get(*kind)).sum()
    }

    /// 以固定顺序迭代 `(键, 数量)`。
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        EntityKind::ALL
            .iter()
            .map(move |kind| (kind.key(), self.get(*kind)))
    }

    fn slot_mut(&mut self, kind: EntityKind) -> &mut u64 {
        match kind {
            EntityKind::Line => &mut self.line,
            EntityKind::Arc => &mut self.arc,
            EntityKind::Circle => &mut self.circle,
            EntityKind::LwPolyline => &mut self.lwpolyline,
            EntityKind::Polyline => &mut self.polyline,
            EntityKind::Insert => &mut self.insert,
            EntityKind::Spline => &mut self.spline,
            EntityKind::Ellipse => &mut self.ellipse,
            EntityKind::Hatch => &mut self.hatch,
            EntityKind::Face3D => &mut self.face3d,
            EntityKind::Polyface => &mut self.polyface,
            EntityKind::Other => &mut self.other,
        }
    }
}

/// 图纸级失败标记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailure {
    FileUnreadable,
    Timeout,
    InvalidBounds,
}

/// 单个零件的提取结果（英寸 / 平方英寸）。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    pub total_cut_length: f64,
    pub net_area: f64,
    pub gross_min_x: f64,
    pub gross_min_y: f64,
    pub gross_max_x: f64,
    pub gross_max_y: f64,
    pub gross_area: f64,
    pub entity_counts: EntityCounts,
    pub preview: Vec<GeometryRecord>,
    pub pierce_count: u32,
    pub contour_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ParseFailure>,
}

/// 板材重量（lb）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartWeights {
    pub gross: f64,
    pub net: f64,
}

impl ParseResult {
    /// 全零结果，预览为单条诊断记录。
    pub fn zeroed(entity_counts: EntityCounts, diagnostic: GeometryRecord) -> Self {
        Self {
            total_cut_length: 0.0,
            net_area: 0.0,
            gross_min_x: 0.0,
            gross_min_y: 0.0,
            gross_max_x: 0.0,
            gross_max_y: 0.0,
            gross_area: 0.0,
            entity_counts,
            preview: vec![diagnostic],
            pierce_count: 0,
            contour_count: 0,
            failure: None,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.gross_max_x - self.gross_min_x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.gross_max_y - self.gross_min_y
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// 面积 × 板厚 × 密度。
    pub fn weights(&self, thickness: f64, density: f64) -> PartWeights {
        PartWeights {
            gross: self.gross_area * thickness * density,
            net: self.net_area * thickness * density,
        }
    }
}
