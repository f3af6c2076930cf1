//! 数值工具：二次方程求解、点到线段距离以及基本图元之间的求交。

use crate::geometry::{Coordinate, angle_in_sweep};

/// 判别式接近零时视为重根的相对容差。
pub const QUADRATIC_TOLERANCE: f64 = 1e-12;

/// 求解首一二次方程 `x² + b·x + c = 0`，系数以 `[b, c]` 提供。
///
/// 返回 0、1 或 2 个实根（升序）。判别式为负时返回空序列，
/// 判别式在相对容差内接近零时返回单个重根。无实根不是错误。
pub fn quadratic_solver(coefficients: [f64; 2]) -> Vec<f64> {
    let [b, c] = coefficients;
    if !b.is_finite() || !c.is_finite() {
        return Vec::new();
    }

    let discriminant = b * b - 4.0 * c;
    let scale = (b * b).max(4.0 * c.abs());
    if discriminant.abs() <= QUADRATIC_TOLERANCE * scale {
        return vec![-b / 2.0];
    }
    if discriminant < 0.0 {
        return Vec::new();
    }

    // 避免 b 与 sqrt(Δ) 相减造成的抵消误差
    let root = discriminant.sqrt();
    let q = -0.5 * (b + b.signum() * root);
    let (first, second) = if q == 0.0 {
        (root / 2.0, -root / 2.0)
    } else {
        (q, c / q)
    };
    if first <= second {
        vec![first, second]
    } else {
        vec![second, first]
    }
}

/// 点到线段 AB 的最短距离。
pub fn distance_to_segment(point: Coordinate, start: Coordinate, end: Coordinate) -> f64 {
    let v = end.as_vec2() - start.as_vec2();
    let w = point.as_vec2() - start.as_vec2();

    let c1 = w.dot(v);
    if c1 <= 0.0 {
        return point.distance(start);
    }
    let c2 = v.dot(v);
    if c2 <= c1 {
        return point.distance(end);
    }
    let projected = start.as_vec2() + v * (c1 / c2);
    point.as_vec2().distance(projected)
}

/// 实体分解出的基本曲线，用于求交与命中测试。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Segment {
        start: Coordinate,
        end: Coordinate,
    },
    Circle {
        center: Coordinate,
        radius: f64,
    },
    /// 从 `start_angle` 逆时针扫到 `end_angle`。
    Arc {
        center: Coordinate,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    },
}

impl Primitive {
    pub fn distance_to(&self, point: Coordinate) -> f64 {
        match *self {
            Primitive::Segment { start, end } => distance_to_segment(point, start, end),
            Primitive::Circle { center, radius } => (point.distance(center) - radius).abs(),
            Primitive::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            } => {
                let angle = center.angle_to(point);
                if angle_in_sweep(angle, start_angle, end_angle, 0.0) {
                    (point.distance(center) - radius).abs()
                } else {
                    let start = crate::geometry::point_at_angle(center, radius, start_angle);
                    let end = crate::geometry::point_at_angle(center, radius, end_angle);
                    point.distance(start).min(point.distance(end))
                }
            }
        }
    }

    fn circle_part(&self) -> Option<(Coordinate, f64)> {
        match *self {
            Primitive::Segment { .. } => None,
            Primitive::Circle { center, radius } | Primitive::Arc { center, radius, .. } => {
                Some((center, radius))
            }
        }
    }

    /// 圆上的点是否位于本图元的角度范围内（整圆恒为真）。
    fn accepts_angle(&self, point: Coordinate, tolerance: f64) -> bool {
        match *self {
            Primitive::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            } => {
                let angular_tolerance = if radius > 0.0 { tolerance / radius } else { 0.0 };
                angle_in_sweep(center.angle_to(point), start_angle, end_angle, angular_tolerance)
            }
            _ => true,
        }
    }
}

/// 计算两个基本图元的交点。重合/平行的退化情况不产生交点。
pub fn intersect(a: &Primitive, b: &Primitive, tolerance: f64) -> Vec<Coordinate> {
    match (a, b) {
        (
            Primitive::Segment { start, end },
            Primitive::Segment {
                start: other_start,
                end: other_end,
            },
        ) => segment_segment(*start, *end, *other_start, *other_end, tolerance)
            .into_iter()
            .collect(),
        (Primitive::Segment { start, end }, curve) | (curve, Primitive::Segment { start, end }) => {
            let Some((center, radius)) = curve.circle_part() else {
                return Vec::new();
            };
            segment_circle(*start, *end, center, radius, tolerance)
                .into_iter()
                .filter(|point| curve.accepts_angle(*point, tolerance))
                .collect()
        }
        _ => {
            let (Some((c1, r1)), Some((c2, r2))) = (a.circle_part(), b.circle_part()) else {
                return Vec::new();
            };
            circle_circle(c1, r1, c2, r2, tolerance)
                .into_iter()
                .filter(|point| a.accepts_angle(*point, tolerance))
                .filter(|point| b.accepts_angle(*point, tolerance))
                .collect()
        }
    }
}

fn segment_segment(
    p1: Coordinate,
    p2: Coordinate,
    q1: Coordinate,
    q2: Coordinate,
    tolerance: f64,
) -> Option<Coordinate> {
    let r = p2.as_vec2() - p1.as_vec2();
    let s = q2.as_vec2() - q1.as_vec2();
    let denominator = r.perp_dot(s);
    if denominator.abs() <= f64::EPSILON * r.length() * s.length() {
        return None;
    }
    let qp = q1.as_vec2() - p1.as_vec2();
    let t = qp.perp_dot(s) / denominator;
    let u = qp.perp_dot(r) / denominator;
    let t_tol = tolerance / r.length();
    let u_tol = tolerance / s.length();
    if t < -t_tol || t > 1.0 + t_tol || u < -u_tol || u > 1.0 + u_tol {
        return None;
    }
    Some(Coordinate::from_vec2(p1.as_vec2() + r * t))
}

fn segment_circle(
    start: Coordinate,
    end: Coordinate,
    center: Coordinate,
    radius: f64,
    tolerance: f64,
) -> Vec<Coordinate> {
    let d = end.as_vec2() - start.as_vec2();
    let f = start.as_vec2() - center.as_vec2();
    let dd = d.dot(d);
    if dd <= f64::EPSILON {
        return Vec::new();
    }
    // |start + t·d - center|² = r²，两边同除 d·d 化为首一形式
    let b = 2.0 * d.dot(f) / dd;
    let c = (f.dot(f) - radius * radius) / dd;
    let t_tol = tolerance / dd.sqrt();
    quadratic_solver([b, c])
        .into_iter()
        .filter(|t| *t >= -t_tol && *t <= 1.0 + t_tol)
        .map(|t| Coordinate::from_vec2(start.as_vec2() + d * t))
        .collect()
}

fn circle_circle(
    c1: Coordinate,
    r1: f64,
    c2: Coordinate,
    r2: f64,
    tolerance: f64,
) -> Vec<Coordinate> {
    let delta = c2.as_vec2() - c1.as_vec2();
    let distance = delta.length();
    if distance <= tolerance {
        return Vec::new();
    }
    if distance > r1 + r2 + tolerance || distance < (r1 - r2).abs() - tolerance {
        return Vec::new();
    }
    let a = (r1 * r1 - r2 * r2 + distance * distance) / (2.0 * distance);
    let h_squared = (r1 * r1 - a * a).max(0.0);
    let h = h_squared.sqrt();
    let direction = delta / distance;
    let base = c1.as_vec2() + direction * a;
    if h <= tolerance {
        return vec![Coordinate::from_vec2(base)];
    }
    let offset = direction.perp() * h;
    vec![
        Coordinate::from_vec2(base + offset),
        Coordinate::from_vec2(base - offset),
    ]
}
