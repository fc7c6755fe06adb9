//! 记录到实体的转换。每个函数只看已读入的组码对，不接触读取器。

use std::f64::consts::TAU;

use plasmaq_core::document::{
    Arc, BlockReference, Circle, Ellipse, Entity, Hatch, HatchEdge, HatchLoop, Line, OtherEntity,
    Polyface, Polyline, PolylineVariant, PolylineVertex, Spline, ThreeDFace,
};
use plasmaq_core::geometry::{Point2, Vector2};

use crate::DxfError;
use crate::reader::{Fields, GroupPair, Record};

const POLYLINE_CLOSED: i16 = 0x01;
const POLYLINE_MESH: i16 = 0x10;
const POLYLINE_MESH_CLOSED_N: i16 = 0x20;
const POLYLINE_POLYFACE: i16 = 0x40;
const VERTEX_SPLINE_FRAME: i16 = 0x10;
const VERTEX_MESH: i16 = 0x40;
const VERTEX_FACE_RECORD: i16 = 0x80;

/// 单条记录即可构成的实体。POLYLINE 需要后续 VERTEX，见 [`polyline`]。
pub(crate) fn build(record: &Record) -> Result<Entity, DxfError> {
    let fields = record.fields();
    match record.kind.as_str() {
        "LINE" => line(fields),
        "CIRCLE" => circle(fields),
        "ARC" => arc(fields),
        "ELLIPSE" => ellipse(fields),
        "LWPOLYLINE" => lwpolyline(fields),
        "SPLINE" => spline(fields),
        "INSERT" => insert(fields),
        "HATCH" => hatch(fields),
        "3DFACE" => face(fields),
        _ => Ok(Entity::Other(OtherEntity {
            kind: record.kind.clone(),
            layer: fields.layer(),
        })),
    }
}

fn line(fields: Fields<'_>) -> Result<Entity, DxfError> {
    Ok(Entity::Line(Line {
        start: fields.require_point(10, "起点")?,
        end: fields.require_point(11, "终点")?,
        layer: fields.layer(),
    }))
}

fn circle(fields: Fields<'_>) -> Result<Entity, DxfError> {
    Ok(Entity::Circle(Circle {
        center: fields.require_point(10, "圆心")?,
        radius: fields.require(40, "半径")?,
        layer: fields.layer(),
    }))
}

/// 角度由度转换为弧度。
fn arc(fields: Fields<'_>) -> Result<Entity, DxfError> {
    Ok(Entity::Arc(Arc {
        center: fields.require_point(10, "圆心")?,
        radius: fields.require(40, "半径")?,
        start_angle: fields.require::<f64>(50, "起始角")?.to_radians(),
        end_angle: fields.require::<f64>(51, "终止角")?.to_radians(),
        layer: fields.layer(),
    }))
}

fn ellipse(fields: Fields<'_>) -> Result<Entity, DxfError> {
    let center = fields.require_point(10, "圆心")?;
    let major = fields.require_point(11, "主轴端点向量")?;
    if major.x().abs() < f64::EPSILON && major.y().abs() < f64::EPSILON {
        return Err(fields.invalid(11, "主轴端点向量", "长度为 0"));
    }
    let ratio = fields.value::<f64>(40, "短长轴比")?.unwrap_or(1.0);
    if ratio <= 0.0 {
        return Err(fields.invalid(40, "短长轴比", &format!("必须为正数（值：{ratio}）")));
    }
    Ok(Entity::Ellipse(Ellipse {
        center,
        major_axis: Vector2::new(major.x(), major.y()),
        ratio,
        start_parameter: fields.value(41, "起始参数")?.unwrap_or(0.0),
        end_parameter: fields.value(42, "终止参数")?.unwrap_or(TAU),
        layer: fields.layer(),
    }))
}

/// 顶点顺序依赖组码出现次序：42 作用于刚读到的顶点。
fn lwpolyline(fields: Fields<'_>) -> Result<Entity, DxfError> {
    let flags = fields.value::<i16>(70, "标志")?.unwrap_or(0);
    let mut vertices: Vec<PolylineVertex> = Vec::new();
    let mut pending_x: Option<f64> = None;
    for (code, raw) in fields.pairs {
        match code {
            10 => {
                if pending_x.is_some() {
                    return Err(fields.invalid(20, "顶点", "缺少与 X 对应的 Y"));
                }
                pending_x = Some(fields.parse(10, "顶点 X", raw)?);
            }
            20 => {
                let x = pending_x
                    .take()
                    .ok_or_else(|| fields.invalid(10, "顶点", "Y 之前缺少 X"))?;
                let y = fields.parse(20, "顶点 Y", raw)?;
                vertices.push(PolylineVertex::new(Point2::new(x, y)));
            }
            42 => {
                let bulge = fields.parse(42, "凸度", raw)?;
                let vertex = vertices
                    .last_mut()
                    .ok_or_else(|| fields.invalid(42, "凸度", "出现在首个顶点之前"))?;
                vertex.bulge = bulge;
            }
            _ => {}
        }
    }
    if pending_x.is_some() {
        return Err(fields.invalid(20, "顶点", "缺少与 X 对应的 Y"));
    }
    if vertices.is_empty() {
        return Err(fields.invalid(10, "顶点", "缺失"));
    }
    Ok(Entity::Polyline(Polyline {
        vertices,
        is_closed: flags & POLYLINE_CLOSED != 0,
        variant: PolylineVariant::Lightweight,
        layer: fields.layer(),
    }))
}

fn spline(fields: Fields<'_>) -> Result<Entity, DxfError> {
    let flags = fields.value::<i16>(70, "类型标志")?.unwrap_or(0);
    Ok(Entity::Spline(Spline {
        degree: i32::from(fields.require::<i16>(71, "阶数")?),
        is_closed: flags & 0x01 != 0,
        is_periodic: flags & 0x02 != 0,
        is_rational: flags & 0x04 != 0,
        control_points: fields.points(10, "控制点")?,
        fit_points: fields.points(11, "拟合点")?,
        knot_values: fields.values(40, "节点值")?,
        weights: fields.values(41, "权重")?,
        layer: fields.layer(),
    }))
}

/// 未给出 Y 缩放时沿用 X 缩放，旋转角转换为弧度。
fn insert(fields: Fields<'_>) -> Result<Entity, DxfError> {
    let name: String = fields.require(2, "块名")?;
    let scale_x = fields.value::<f64>(41, "X 缩放")?.unwrap_or(1.0);
    let scale_y = fields.value::<f64>(42, "Y 缩放")?.unwrap_or(scale_x);
    let rotation: f64 = fields.value(50, "旋转角")?.unwrap_or(0.0);
    Ok(Entity::BlockReference(BlockReference {
        name: name.trim().to_string(),
        insert: fields.require_point(10, "插入点")?,
        scale: Vector2::new(scale_x, scale_y),
        rotation: rotation.to_radians(),
        layer: fields.layer(),
    }))
}

/// 第 4 个顶点缺省时与第 3 个相同。
fn face(fields: Fields<'_>) -> Result<Entity, DxfError> {
    let first = fields.require_point(10, "顶点 1")?;
    let second = fields.require_point(11, "顶点 2")?;
    let third = fields.require_point(12, "顶点 3")?;
    let fourth = fields.point(13, "顶点 4")?.unwrap_or(third);
    Ok(Entity::Face3D(ThreeDFace {
        vertices: [first, second, third, fourth],
        layer: fields.layer(),
    }))
}

/// POLYLINE 头记录加上其后的 VERTEX 记录。多面网格与多边形网格展开为 `Polyface`，
/// 其余模式取 XY 投影。
pub(crate) fn polyline(header: &Record, vertices: &[Record]) -> Result<Entity, DxfError> {
    let fields = header.fields();
    let flags = fields.value::<i16>(70, "标志")?.unwrap_or(0);
    let layer = fields.layer();

    if flags & POLYLINE_POLYFACE != 0 {
        let faces = polyface_faces(vertices, &layer)?;
        return Ok(Entity::Polyface(Polyface { faces, layer }));
    }
    if flags & POLYLINE_MESH != 0 {
        let rows: i16 = fields.require(71, "网格 M 数")?;
        let cols: i16 = fields.require(72, "网格 N 数")?;
        let grid = MeshGrid {
            rows: usize::try_from(rows).unwrap_or(0),
            cols: usize::try_from(cols).unwrap_or(0),
            wrap_rows: flags & POLYLINE_CLOSED != 0,
            wrap_cols: flags & POLYLINE_MESH_CLOSED_N != 0,
        };
        let faces = grid.faces(vertices, &layer)?;
        return Ok(Entity::Polyface(Polyface { faces, layer }));
    }

    let mut path = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        let fields = vertex.fields();
        let vertex_flags = fields.value::<i16>(70, "标志")?.unwrap_or(0);
        if vertex_flags & VERTEX_SPLINE_FRAME != 0 {
            continue;
        }
        let position = fields.require_point(10, "位置")?;
        let bulge = fields.value(42, "凸度")?.unwrap_or(0.0);
        path.push(PolylineVertex::with_bulge(position, bulge));
    }
    if path.is_empty() {
        return Err(fields.invalid(10, "顶点", "缺失"));
    }
    Ok(Entity::Polyline(Polyline {
        vertices: path,
        is_closed: flags & POLYLINE_CLOSED != 0,
        variant: PolylineVariant::Heavy,
        layer,
    }))
}

/// 多面网格：带 0x40|0x80 的 VERTEX 是坐标，仅带 0x80 的是面（71–74 为 1 起始索引）。
fn polyface_faces(vertices: &[Record], layer: &str) -> Result<Vec<ThreeDFace>, DxfError> {
    let mut coordinates: Vec<Point2> = Vec::new();
    let mut faces = Vec::new();
    for vertex in vertices {
        let fields = vertex.fields();
        let flags = fields.value::<i16>(70, "标志")?.unwrap_or(0);
        if flags & VERTEX_FACE_RECORD == 0 {
            continue;
        }
        if flags & VERTEX_MESH != 0 {
            coordinates.push(fields.require_point(10, "网格顶点")?);
            continue;
        }
        let mut indices = [0i32; 4];
        for (slot, code) in (71..=74).enumerate() {
            indices[slot] = fields.value(code, "面顶点索引")?.unwrap_or(0);
        }
        if let Some(corners) = resolve_face(&coordinates, indices, fields)? {
            faces.push(ThreeDFace {
                vertices: corners,
                layer: layer.to_string(),
            });
        }
    }
    Ok(faces)
}

/// 索引 0 表示沿用上一个角点；负索引只表示该边不可见。
fn resolve_face(
    coordinates: &[Point2],
    indices: [i32; 4],
    fields: Fields<'_>,
) -> Result<Option<[Point2; 4]>, DxfError> {
    let Some(&first) = coordinates.first() else {
        return Ok(None);
    };
    let mut corners = [first; 4];
    let mut previous = first;
    for (slot, index) in indices.into_iter().enumerate() {
        if index != 0 {
            let position = index.unsigned_abs() as usize;
            previous = coordinates.get(position - 1).copied().ok_or_else(|| {
                fields.invalid(71 + slot as i32, "面顶点索引", &format!("越界（值：{index}）"))
            })?;
        }
        corners[slot] = previous;
    }
    Ok(Some(corners))
}

/// M×N 多边形网格，按行主序排列顶点。
struct MeshGrid {
    rows: usize,
    cols: usize,
    wrap_rows: bool,
    wrap_cols: bool,
}

impl MeshGrid {
    fn faces(&self, vertices: &[Record], layer: &str) -> Result<Vec<ThreeDFace>, DxfError> {
        let mut points = Vec::with_capacity(vertices.len());
        for vertex in vertices {
            let fields = vertex.fields();
            if fields.value::<i16>(70, "标志")?.unwrap_or(0) & VERTEX_FACE_RECORD != 0 {
                continue;
            }
            points.push(fields.require_point(10, "网格顶点")?);
        }

        if self.rows < 2 || self.cols < 2 {
            return Err(DxfError::invalid(format!(
                "POLYLINE 网格尺寸 {}x{} 不足 2x2",
                self.rows, self.cols
            )));
        }
        if points.len() < self.rows * self.cols {
            return Err(DxfError::invalid(format!(
                "POLYLINE 网格需要 {} 个顶点，实际只有 {}",
                self.rows * self.cols,
                points.len()
            )));
        }

        let row_spans = if self.wrap_rows { self.rows } else { self.rows - 1 };
        let col_spans = if self.wrap_cols { self.cols } else { self.cols - 1 };
        let at = |row: usize, col: usize| points[(row % self.rows) * self.cols + col % self.cols];
        let mut faces = Vec::with_capacity(row_spans * col_spans);
        for row in 0..row_spans {
            for col in 0..col_spans {
                faces.push(ThreeDFace {
                    vertices: [
                        at(row, col),
                        at(row + 1, col),
                        at(row + 1, col + 1),
                        at(row, col + 1),
                    ],
                    layer: layer.to_string(),
                });
            }
        }
        Ok(faces)
    }
}

/// 组码 91 之前是图案头信息；之后依次是各边界环路，75/76 之后是图案定义与种子点。
fn hatch(fields: Fields<'_>) -> Result<Entity, DxfError> {
    let boundary_start = fields
        .pairs
        .iter()
        .position(|(code, _)| *code == 91)
        .ok_or_else(|| fields.invalid(91, "边界环路数", "缺失"))?;
    let head = fields.slice(&fields.pairs[..boundary_start]);
    let loop_count: i32 = head.parse(91, "边界环路数", &fields.pairs[boundary_start].1)?;

    let mut cursor = HatchCursor {
        fields,
        pairs: &fields.pairs[boundary_start + 1..],
    };
    let mut loops = Vec::new();
    for _ in 0..loop_count.max(0) {
        match cursor.next_loop()? {
            Some(boundary) => loops.push(boundary),
            None => break,
        }
    }
    if loops.is_empty() {
        return Err(fields.invalid(92, "边界环路", "缺失"));
    }

    let fill_flag = head.value::<i16>(70, "实体填充标志")?.unwrap_or(0);
    Ok(Entity::Hatch(Hatch {
        pattern_name: head.text(2).unwrap_or("SOLID").to_string(),
        is_solid: fill_flag & 1 != 0,
        loops,
        layer: fields.layer(),
    }))
}

/// 按顺序消费 HATCH 边界段的组码对。
struct HatchCursor<'a> {
    fields: Fields<'a>,
    pairs: &'a [GroupPair],
}

impl<'a> HatchCursor<'a> {
    /// 跳到下一个 92 并读取整个环路；边界段结束时返回 `None`。
    fn next_loop(&mut self) -> Result<Option<HatchLoop>, DxfError> {
        loop {
            let pairs: &'a [GroupPair] = self.pairs;
            match pairs.split_first() {
                None => return Ok(None),
                Some(((75 | 76, _), _)) => return Ok(None),
                Some(((92, raw), rest)) => {
                    let flags: i32 = self.fields.parse(92, "环路类型", raw)?;
                    self.pairs = rest;
                    let body = self.take_until(|code| matches!(code, 92 | 75 | 76));
                    let body = self.fields.slice(body);
                    return if flags & 0x02 != 0 {
                        polyline_loop(body).map(Some)
                    } else {
                        edge_loop(body).map(Some)
                    };
                }
                Some((_, rest)) => self.pairs = rest,
            }
        }
    }

    fn take_until(&mut self, stop: impl Fn(i32) -> bool) -> &'a [GroupPair] {
        let pairs: &'a [GroupPair] = self.pairs;
        let end = pairs
            .iter()
            .position(|(code, _)| stop(*code))
            .unwrap_or(pairs.len());
        let (taken, rest) = pairs.split_at(end);
        self.pairs = rest;
        taken
    }
}

/// 多段线环路：72 凸度标记，73 闭合标记，93 顶点数，随后是 10/20[/42]。
fn polyline_loop(body: Fields<'_>) -> Result<HatchLoop, DxfError> {
    let vertices_start = body
        .pairs
        .iter()
        .position(|(code, _)| *code == 10)
        .unwrap_or(body.pairs.len());
    let head = body.slice(&body.pairs[..vertices_start]);
    let has_bulge = head.value::<i32>(72, "多段线凸度标记")?.unwrap_or(0) != 0;
    let is_closed = head.value::<i32>(73, "多段线闭合标记")?.unwrap_or(0) != 0;
    let declared: Option<i32> = head.value(93, "多段线顶点数")?;

    let tail = &body.pairs[vertices_start..];
    let vertex_end = tail
        .iter()
        .position(|(code, _)| !matches!(code, 10 | 20 | 42))
        .unwrap_or(tail.len());
    let vertex_fields = body.slice(&tail[..vertex_end]);
    let points = vertex_fields.points(10, "多段线顶点")?;
    let mut bulges = vec![0.0; points.len()];
    if has_bulge {
        let mut index: Option<usize> = None;
        for (code, raw) in vertex_fields.pairs {
            match code {
                20 => index = Some(index.map_or(0, |i| i + 1)),
                42 => {
                    if let Some(i) = index {
                        bulges[i] = vertex_fields.parse(42, "多段线凸度", raw)?;
                    }
                }
                _ => {}
            }
        }
    }

    if let Some(declared) = declared {
        if usize::try_from(declared).ok() != Some(points.len()) {
            return Err(body.invalid(
                93,
                "多段线顶点数",
                &format!("声明 {declared}，实际 {}", points.len()),
            ));
        }
    }

    let mut edges: Vec<HatchEdge> = points
        .windows(2)
        .zip(&bulges)
        .map(|(pair, bulge)| HatchEdge::PolylineSegment {
            start: pair[0],
            end: pair[1],
            bulge: *bulge,
        })
        .collect();
    if is_closed && points.len() > 1 {
        if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
            edges.push(HatchEdge::PolylineSegment {
                start: last,
                end: first,
                bulge: bulges[points.len() - 1],
            });
        }
    }
    Ok(HatchLoop {
        is_polyline: true,
        is_closed,
        edges,
    })
}

/// 边环路：93 边数，每条边以 72 类型开头。环路总是闭合的。
fn edge_loop(body: Fields<'_>) -> Result<HatchLoop, DxfError> {
    let starts: Vec<usize> = body
        .pairs
        .iter()
        .enumerate()
        .filter(|(_, (code, _))| *code == 72)
        .map(|(index, _)| index)
        .collect();
    let declared: Option<i32> = body
        .slice(&body.pairs[..starts.first().copied().unwrap_or(body.pairs.len())])
        .value(93, "边数")?;
    let edge_count = declared.map_or(starts.len(), |n| starts.len().min(n.max(0) as usize));

    let mut edges = Vec::with_capacity(edge_count);
    for (n, &start) in starts.iter().take(edge_count).enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(body.pairs.len());
        let edge_type: i32 = body.parse(72, "边类型", &body.pairs[start].1)?;
        let data = body.slice(&body.pairs[start + 1..end]);
        edges.push(hatch_edge(edge_type, data)?);
    }
    Ok(HatchLoop {
        is_polyline: false,
        is_closed: true,
        edges,
    })
}

/// 只解析直线边（1）与圆弧边（2）；椭圆与样条边只记录类型。
fn hatch_edge(edge_type: i32, data: Fields<'_>) -> Result<HatchEdge, DxfError> {
    // 边数据之后可能紧跟 97 源对象引用，截断以免与边字段混淆
    let end = data
        .pairs
        .iter()
        .position(|(code, _)| *code == 97)
        .unwrap_or(data.pairs.len());
    let data = data.slice(&data.pairs[..end]);
    match edge_type {
        1 => Ok(HatchEdge::Line {
            start: data.require_point(10, "直线边起点")?,
            end: data.require_point(11, "直线边终点")?,
        }),
        2 => Ok(HatchEdge::Arc {
            center: data.require_point(10, "圆弧边圆心")?,
            radius: data.require(40, "圆弧边半径")?,
            start_angle: data.require::<f64>(50, "圆弧边起始角")?.to_radians(),
            end_angle: data.require::<f64>(51, "圆弧边终止角")?.to_radians(),
            is_counter_clockwise: data.value::<i32>(73, "圆弧边方向")?.unwrap_or(1) != 0,
        }),
        other => Ok(HatchEdge::Unsupported { edge_type: other }),
    }
}
