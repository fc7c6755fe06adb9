use std::collections::HashSet;
use std::time::{Duration, Instant};

use glam::{DAffine2, DVec2};
use plasmaq_config::ExtractionConfig;
use plasmaq_core::document::{BlockReference, EntityId};
use plasmaq_core::geometry::Point2;
use tracing::{debug, warn};

use crate::errors::ExtractionFault;

const MM_TO_IN: f64 = 0.0393701;
const CM_TO_IN: f64 = 0.393701;
const M_TO_IN: f64 = 39.3701;
const FT_TO_IN: f64 = 12.0;

/// 图纸单位（`$INSUNITS`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSystem {
    Inches,
    Feet,
    Millimeters,
    Centimeters,
    Meters,
    /// 缺省或未登记的单位，不做缩放。
    Unscaled,
}

impl UnitSystem {
    pub fn from_insunits(code: Option<i16>) -> Self {
        match code {
            Some(1) => UnitSystem::Inches,
            Some(2) => UnitSystem::Feet,
            Some(4) => UnitSystem::Millimeters,
            Some(5) => UnitSystem::Centimeters,
            Some(6) => UnitSystem::Meters,
            _ => UnitSystem::Unscaled,
        }
    }

    /// 换算到英寸的系数。
    pub fn scale_to_inches(self) -> f64 {
        match self {
            UnitSystem::Inches | UnitSystem::Unscaled => 1.0,
            UnitSystem::Feet => FT_TO_IN,
            UnitSystem::Millimeters => MM_TO_IN,
            UnitSystem::Centimeters => CM_TO_IN,
            UnitSystem::Meters => M_TO_IN,
        }
    }
}

/// 进入块参照的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEntry {
    Entered,
    /// 块已在展开链上。
    Cyclic,
    TooDeep,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    matrix: DAffine2,
    instance: u64,
}

/// 遍历期间的坐标系栈与防护状态。每次提取独占一个实例。
#[derive(Debug)]
pub struct TransformContext {
    frames: Vec<Frame>,
    unit_scale: f64,
    visited: HashSet<(u64, EntityId)>,
    active_blocks: Vec<String>,
    started: Instant,
    budget: Duration,
    max_depth: usize,
    next_instance: u64,
}

impl TransformContext {
    pub fn new(units: UnitSystem, config: &ExtractionConfig) -> Self {
        Self {
            frames: vec![Frame {
                matrix: DAffine2::IDENTITY,
                instance: 0,
            }],
            unit_scale: units.scale_to_inches(),
            visited: HashSet::new(),
            active_blocks: Vec::new(),
            started: Instant::now(),
            budget: config.timeout(),
            max_depth: config.max_recursion_depth,
            next_instance: 1,
        }
    }

    /// 当前嵌套深度，顶层为 0。
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    #[inline]
    fn current(&self) -> Frame {
        self.frames[self.frames.len() - 1]
    }

    /// 局部坐标 → 英寸世界坐标。
    #[inline]
    pub fn apply(&self, point: Point2) -> Point2 {
        self.apply_vec(point.as_vec2()).into()
    }

    #[inline]
    pub fn apply_vec(&self, point: DVec2) -> DVec2 {
        self.current().matrix.transform_point2(point) * self.unit_scale
    }

    /// 长度按两轴缩放的平均值换算。
    pub fn scale_length(&self, length: f64) -> f64 {
        let linear = self.current().matrix.matrix2;
        let mean = (linear.x_axis.length() + linear.y_axis.length()) / 2.0;
        length * mean * self.unit_scale
    }

    #[inline]
    pub fn is_mirrored(&self) -> bool {
        self.current().matrix.matrix2.determinant() < 0.0
    }

    /// 把局部圆弧的起止角（弧度）换算到世界坐标，返回度数。
    /// 镜像坐标系会翻转方向，此时交换起止角以保持逆时针约定。
    pub fn transform_arc_angles(&self, start: f64, end: f64) -> (f64, f64) {
        let linear = self.current().matrix.matrix2;
        let angle_of = |local: f64| {
            let dir = linear * DVec2::new(local.cos(), local.sin());
            normalize_degrees(dir.y.atan2(dir.x).to_degrees())
        };
        let (start_deg, end_deg) = (angle_of(start), angle_of(end));
        if self.is_mirrored() {
            (end_deg, start_deg)
        } else {
            (start_deg, end_deg)
        }
    }

    /// 进入块参照：`父 × 平移(插入点) × 旋转 × 缩放 × 平移(-基点)`。
    pub fn enter_block(&mut self, reference: &BlockReference, base_point: Point2) -> BlockEntry {
        if self.active_blocks.iter().any(|name| name == &reference.name) {
            warn!(block = %reference.name, "块参照形成循环，已跳过");
            return BlockEntry::Cyclic;
        }
        if self.depth() >= self.max_depth {
            warn!(block = %reference.name, depth = self.depth(), "块嵌套超过深度上限");
            return BlockEntry::TooDeep;
        }
        let local = DAffine2::from_translation(reference.insert.as_vec2())
            * DAffine2::from_angle(reference.rotation)
            * DAffine2::from_scale(reference.scale.as_vec2())
            * DAffine2::from_translation(-base_point.as_vec2());
        self.push_frame(local);
        self.active_blocks.push(reference.name.clone());
        BlockEntry::Entered
    }

    pub fn leave_block(&mut self) {
        self.active_blocks.pop();
        self.pop_frame();
    }

    /// 进入同一坐标系下的子实体层级（网格的各个面）。超过深度上限时返回 `false`。
    pub fn enter_nested(&mut self) -> bool {
        if self.depth() >= self.max_depth {
            warn!(depth = self.depth(), "子实体嵌套超过深度上限");
            return false;
        }
        self.push_frame(DAffine2::IDENTITY);
        true
    }

    pub fn leave_nested(&mut self) {
        self.pop_frame();
    }

    /// 在当前展开实例中登记实体，重复登记返回 `false`。
    pub fn mark_visited(&mut self, id: EntityId) -> bool {
        let key = (self.current().instance, id);
        let fresh = self.visited.insert(key);
        if !fresh {
            debug!(entity = id.get(), "实体已处理，跳过");
        }
        fresh
    }

    /// 在实体边界检查耗时。
    pub fn check_deadline(&self) -> Result<(), ExtractionFault> {
        let elapsed = self.started.elapsed();
        if elapsed >= self.budget {
            return Err(ExtractionFault::Timeout {
                elapsed_ms: elapsed.as_millis(),
            });
        }
        Ok(())
    }

    fn push_frame(&mut self, local: DAffine2) {
        let matrix = self.current().matrix * local;
        let instance = self.next_instance;
        self.next_instance += 1;
        self.frames.push(Frame { matrix, instance });
    }

    fn pop_frame(&mut self) {
        debug_assert!(self.frames.len() > 1, "顶层坐标系不可弹出");
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }
}

fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}
