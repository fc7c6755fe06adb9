//! 曲线长度与离散化：凸度圆弧、圆弧、椭圆与 NURBS 样条。

use std::f64::consts::TAU;

use glam::{DVec2, DVec3};

const BULGE_EPSILON: f64 = 1e-9;
const ARC_STEP: f64 = TAU / 64.0;
const MIN_ARC_SEGMENTS: usize = 2;
const MAX_ARC_SEGMENTS: usize = 1024;
const SPLINE_MAX_DEPTH: u32 = 12;
const SPLINE_SPAN_SEEDS: usize = 4;
const MIN_SPLINE_TOLERANCE: f64 = 1e-9;

/// 凸度段的弧长：`θ = 4·atan(|bulge|)`，`r = chord / (2·sin(θ/2))`，长度 `r·θ`。
/// 凸度为 0 或弦长为 0 时退化为弦长。
pub fn bulge_arc_length(start: DVec2, end: DVec2, bulge: f64) -> f64 {
    let chord = start.distance(end);
    let theta = 4.0 * bulge.abs().atan();
    if theta <= BULGE_EPSILON || chord <= f64::EPSILON {
        return chord;
    }
    let radius = chord / (2.0 * (theta / 2.0).sin());
    if radius > 0.0 { radius * theta } else { chord }
}

/// 把 `start → end` 的凸度段采样后追加到 `out`（不含起点，含终点）。
/// 正凸度为逆时针。
pub fn append_bulge_points(start: DVec2, end: DVec2, bulge: f64, out: &mut Vec<DVec2>) {
    let chord = end - start;
    let chord_len = chord.length();
    if bulge.abs() < BULGE_EPSILON || chord_len <= f64::EPSILON {
        out.push(end);
        return;
    }
    let sweep = 4.0 * bulge.atan();
    let half = sweep / 2.0;
    let radius = chord_len / (2.0 * half.sin().abs());
    let left = DVec2::new(-chord.y, chord.x) / chord_len;
    // 圆心到弦中点的有符号距离，凸度大于 1 时圆心落在弦的另一侧
    let offset = chord_len / 2.0 / half.tan();
    let center = (start + end) * 0.5 + left * offset;
    let from_center = start - center;
    let start_angle = from_center.y.atan2(from_center.x);

    let segments = arc_segment_count(sweep);
    for i in 1..segments {
        let angle = start_angle + sweep * (i as f64 / segments as f64);
        out.push(center + DVec2::new(angle.cos(), angle.sin()) * radius);
    }
    out.push(end);
}

/// 逆时针从 `start_angle` 到 `end_angle` 的扫角，落在 `[0, 2π]` 内。
/// 超出一周的角度先按整周取模，终止角小于起始角时加一整周。
pub fn arc_span(start_angle: f64, end_angle: f64) -> f64 {
    let raw = end_angle - start_angle;
    if (0.0..=TAU).contains(&raw) {
        return raw;
    }
    let span = end_angle.rem_euclid(TAU) - start_angle.rem_euclid(TAU);
    if span < 0.0 { span + TAU } else { span }
}

/// 圆弧采样点，包含起点与终点。`sweep` 为有符号弧度。
pub fn sample_arc(center: DVec2, radius: f64, start_angle: f64, sweep: f64) -> Vec<DVec2> {
    let segments = arc_segment_count(sweep);
    (0..=segments)
        .map(|i| {
            let angle = start_angle + sweep * (i as f64 / segments as f64);
            center + DVec2::new(angle.cos(), angle.sin()) * radius
        })
        .collect()
}

fn arc_segment_count(sweep: f64) -> usize {
    if !sweep.is_finite() {
        return MIN_ARC_SEGMENTS;
    }
    ((sweep.abs() / ARC_STEP).ceil() as usize).clamp(MIN_ARC_SEGMENTS, MAX_ARC_SEGMENTS)
}

/// 椭圆采样：`p(t) = c + major·cos t + minor·sin t`，`minor = ratio·perp(major)`。
/// 终止参数不大于起始参数时加一整周。
pub fn sample_ellipse(
    center: DVec2,
    major: DVec2,
    ratio: f64,
    start_parameter: f64,
    end_parameter: f64,
    segments: usize,
) -> Vec<DVec2> {
    let segments = segments.max(4);
    let minor = major.perp() * ratio;
    let mut end = end_parameter;
    if end <= start_parameter {
        end += TAU;
    }
    let span = end - start_parameter;
    (0..=segments)
        .map(|i| {
            let t = start_parameter + span * (i as f64 / segments as f64);
            center + major * t.cos() + minor * t.sin()
        })
        .collect()
}

/// NURBS 曲线（控制点已在目标坐标系中）。
#[derive(Debug, Clone, Copy)]
pub struct SplineCurve<'a> {
    degree: usize,
    control_points: &'a [DVec2],
    knots: &'a [f64],
    weights: Option<&'a [f64]>,
}

impl<'a> SplineCurve<'a> {
    /// 校验阶数、节点向量与权重。节点数必须为 `控制点数 + 阶数 + 1` 且单调不减。
    /// 权重个数不匹配或含非正值时按非有理曲线处理。
    pub fn new(
        degree: i32,
        control_points: &'a [DVec2],
        knots: &'a [f64],
        weights: &'a [f64],
    ) -> Option<Self> {
        let degree = usize::try_from(degree).ok().filter(|degree| *degree >= 1)?;
        let count = control_points.len();
        if count <= degree || knots.len() != count + degree + 1 {
            return None;
        }
        if knots.iter().any(|knot| !knot.is_finite()) || knots.windows(2).any(|w| w[1] < w[0]) {
            return None;
        }
        if control_points.iter().any(|point| !point.is_finite()) {
            return None;
        }
        if knots[count] <= knots[degree] {
            return None;
        }
        let weights = (weights.len() == count
            && weights.iter().all(|w| w.is_finite() && *w > 0.0))
        .then_some(weights);
        Some(Self {
            degree,
            control_points,
            knots,
            weights,
        })
    }

    /// 参数定义域 `[u_p, u_n]`。
    #[inline]
    pub fn domain(&self) -> (f64, f64) {
        (self.knots[self.degree], self.knots[self.control_points.len()])
    }

    /// de Boor 求值，有理曲线在齐次坐标下计算。
    pub fn evaluate(&self, t: f64) -> DVec2 {
        let p = self.degree;
        let span = self.find_span(t);
        let mut d: Vec<DVec3> = (0..=p)
            .map(|j| {
                let point = self.control_points[span - p + j];
                let weight = self.weights.map_or(1.0, |weights| weights[span - p + j]);
                DVec3::new(point.x * weight, point.y * weight, weight)
            })
            .collect();
        for r in 1..=p {
            for j in (r..=p).rev() {
                let left = self.knots[span - p + j];
                let right = self.knots[span + 1 + j - r];
                let denom = right - left;
                let alpha = if denom.abs() > f64::EPSILON {
                    (t - left) / denom
                } else {
                    0.0
                };
                d[j] = d[j - 1] * (1.0 - alpha) + d[j] * alpha;
            }
        }
        let h = d[p];
        DVec2::new(h.x / h.z, h.y / h.z)
    }

    fn find_span(&self, t: f64) -> usize {
        let p = self.degree;
        let n = self.control_points.len();
        let (_, hi) = self.domain();
        if t >= hi {
            let mut span = n - 1;
            while span > p && self.knots[span] >= hi {
                span -= 1;
            }
            return span;
        }
        let mut span = p;
        while span < n - 1 && self.knots[span + 1] <= t {
            span += 1;
        }
        span
    }

    /// 自适应细分展平：区间中点到弦的距离不超过 `tolerance` 时停止。
    pub fn flatten(&self, tolerance: f64) -> Vec<DVec2> {
        let tolerance = tolerance.max(MIN_SPLINE_TOLERANCE);
        let (lo, hi) = self.domain();
        let mut breaks: Vec<f64> = vec![lo];
        for window in self.knots[self.degree..=self.control_points.len()].windows(2) {
            let (a, b) = (window[0], window[1]);
            if b <= a {
                continue;
            }
            for i in 1..=SPLINE_SPAN_SEEDS {
                breaks.push(a + (b - a) * (i as f64 / SPLINE_SPAN_SEEDS as f64));
            }
        }
        if let Some(last) = breaks.last_mut() {
            *last = hi;
        }

        let mut points = vec![self.evaluate(lo)];
        for window in breaks.windows(2) {
            let (t0, t1) = (window[0], window[1]);
            let p0 = self.evaluate(t0);
            let p1 = self.evaluate(t1);
            self.refine(t0, p0, t1, p1, tolerance, 0, &mut points);
        }
        points
    }

    #[allow(clippy::too_many_arguments)]
    fn refine(
        &self,
        t0: f64,
        p0: DVec2,
        t1: f64,
        p1: DVec2,
        tolerance: f64,
        depth: u32,
        out: &mut Vec<DVec2>,
    ) {
        let tm = (t0 + t1) / 2.0;
        let pm = self.evaluate(tm);
        if depth >= SPLINE_MAX_DEPTH || distance_to_segment(pm, p0, p1) <= tolerance {
            out.push(p1);
            return;
        }
        self.refine(t0, p0, tm, pm, tolerance, depth + 1, out);
        self.refine(tm, pm, t1, p1, tolerance, depth + 1, out);
    }
}

/// 展平样条；参数非法或结果不足两个有限点时返回 `None`。
pub fn flatten_spline(
    degree: i32,
    control_points: &[DVec2],
    knots: &[f64],
    weights: &[f64],
    tolerance: f64,
) -> Option<Vec<DVec2>> {
    let curve = SplineCurve::new(degree, control_points, knots, weights)?;
    let points = curve.flatten(tolerance);
    if points.len() < 2 || points.iter().any(|point| !point.is_finite()) {
        return None;
    }
    Some(points)
}

fn distance_to_segment(point: DVec2, a: DVec2, b: DVec2) -> f64 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f64::EPSILON {
        return point.distance(a);
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}
