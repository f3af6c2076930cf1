//! ZCAD 几何实体与文档内核的核心层。
//!
//! 本 crate 只包含纯数据与纯计算：坐标/包围盒、二次方程求解与求交、
//! 图层/样式元数据、不可变实体以及构建器（含阿波罗尼奥斯三切圆构造）。
//! 文档、撤销重做与捕捉服务位于 `zcad-engine`。

pub mod builder;
pub mod entity;
pub mod math;
pub mod meta;
pub mod properties;

pub mod errors {
    use thiserror::Error;

    /// 内核层的类型化错误，所有失败都以显式返回值呈现。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum CadError {
        #[error("expected a {expected} entity, found {found}")]
        InvalidEntityKind {
            expected: &'static str,
            found: &'static str,
        },
        #[error("invalid geometry: {0}")]
        InvalidGeometry(String),
        #[error("{operation} is not supported for {kind} entities")]
        UnsupportedOperation {
            operation: &'static str,
            kind: &'static str,
        },
        #[error("reference not found: {0}")]
        ReferenceNotFound(String),
        #[error("required field `{0}` is not set")]
        MissingField(&'static str),
        #[error("invalid value for property `{0}`")]
        InvalidProperty(String),
        #[error("name `{0}` is already registered")]
        DuplicateName(String),
    }

    impl CadError {
        #[inline]
        pub fn geometry(message: impl Into<String>) -> Self {
            CadError::InvalidGeometry(message.into())
        }
    }
}

pub mod geometry {
    use std::f64::consts::{FRAC_PI_2, PI, TAU};
    use std::ops::{Add, Mul, Neg, Sub};

    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 默认几何容差。所有“重合/在圆上”判定都必须显式传入容差。
    pub const DEFAULT_TOLERANCE: f64 = 1e-9;

    /// 坐标 (x, y[, z])，内部以 `glam::DVec3` 表示；平面运算只作用于 x/y，z 原样保留。
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Coordinate(pub DVec3);

    impl Coordinate {
        pub const ORIGIN: Coordinate = Coordinate(DVec3::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec3::new(x, y, 0.0))
        }

        #[inline]
        pub fn new_3d(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn from_vec2(vec: DVec2) -> Self {
            Self(vec.extend(0.0))
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
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0.truncate()
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        /// 平面距离（忽略 z）。
        #[inline]
        pub fn distance(self, other: Coordinate) -> f64 {
            self.as_vec2().distance(other.as_vec2())
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.as_vec2().length()
        }

        /// 从当前点指向 `other` 的方向角（弧度）。
        #[inline]
        pub fn angle_to(self, other: Coordinate) -> f64 {
            let delta = other.as_vec2() - self.as_vec2();
            delta.y.atan2(delta.x)
        }

        #[inline]
        pub fn mid(self, other: Coordinate) -> Coordinate {
            Coordinate((self.0 + other.0) * 0.5)
        }

        /// 以 `center` 为中心逆时针旋转 `angle` 弧度。
        pub fn rotate(self, center: Coordinate, angle: f64) -> Coordinate {
            let local = self.as_vec2() - center.as_vec2();
            let rotated = DVec2::from_angle(angle).rotate(local) + center.as_vec2();
            Coordinate(rotated.extend(self.z()))
        }

        /// 以 `center` 为中心均匀缩放。
        pub fn scale(self, center: Coordinate, factor: f64) -> Coordinate {
            let local = self.as_vec2() - center.as_vec2();
            Coordinate((center.as_vec2() + local * factor).extend(self.z()))
        }

        /// 关于直线 AB 镜像。调用方保证 A、B 不重合。
        pub fn mirror(self, axis_a: Coordinate, axis_b: Coordinate) -> Coordinate {
            let origin = axis_a.as_vec2();
            let direction = (axis_b.as_vec2() - origin).normalize_or_zero();
            let local = self.as_vec2() - origin;
            let projected = direction * local.dot(direction);
            let reflected = projected * 2.0 - local + origin;
            Coordinate(reflected.extend(self.z()))
        }

        #[inline]
        pub fn approx_eq(self, other: Coordinate, tolerance: f64) -> bool {
            (self.0 - other.0).abs().max_element() <= tolerance
        }
    }

    impl Add for Coordinate {
        type Output = Coordinate;

        #[inline]
        fn add(self, rhs: Coordinate) -> Coordinate {
            Coordinate(self.0 + rhs.0)
        }
    }

    impl Sub for Coordinate {
        type Output = Coordinate;

        #[inline]
        fn sub(self, rhs: Coordinate) -> Coordinate {
            Coordinate(self.0 - rhs.0)
        }
    }

    impl Neg for Coordinate {
        type Output = Coordinate;

        #[inline]
        fn neg(self) -> Coordinate {
            Coordinate(-self.0)
        }
    }

    impl Mul<f64> for Coordinate {
        type Output = Coordinate;

        #[inline]
        fn mul(self, rhs: f64) -> Coordinate {
            Coordinate(self.0 * rhs)
        }
    }

    impl From<DVec2> for Coordinate {
        fn from(value: DVec2) -> Self {
            Self::from_vec2(value)
        }
    }

    impl From<DVec3> for Coordinate {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 轴对齐包围盒，由实体几何按需计算。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Area {
        min: Coordinate,
        max: Coordinate,
    }

    impl Area {
        /// 由任意两个角点构造，自动整理 min/max。
        pub fn new(a: Coordinate, b: Coordinate) -> Self {
            let min = a.as_vec2().min(b.as_vec2());
            let max = a.as_vec2().max(b.as_vec2());
            Self {
                min: Coordinate::from_vec2(min),
                max: Coordinate::from_vec2(max),
            }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Coordinate::new(f64::INFINITY, f64::INFINITY),
                max: Coordinate::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        pub fn from_points<I>(points: I) -> Self
        where
            I: IntoIterator<Item = Coordinate>,
        {
            let mut area = Self::empty();
            for point in points {
                area.include_point(point);
            }
            area
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Coordinate {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Coordinate {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            if self.is_empty() { 0.0 } else { self.max.x() - self.min.x() }
        }

        #[inline]
        pub fn height(&self) -> f64 {
            if self.is_empty() { 0.0 } else { self.max.y() - self.min.y() }
        }

        pub fn include_point(&mut self, point: Coordinate) {
            if self.is_empty() {
                self.min = Coordinate::from_vec2(point.as_vec2());
                self.max = Coordinate::from_vec2(point.as_vec2());
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Coordinate::from_vec2(min_vec);
            self.max = Coordinate::from_vec2(max_vec);
        }

        pub fn include_area(&mut self, other: &Area) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Coordinate {
            debug_assert!(!self.is_empty());
            self.min.mid(self.max)
        }

        /// 向四周扩张 `margin`，用于带容差的命中测试。
        pub fn inflate(&self, margin: f64) -> Area {
            if self.is_empty() {
                return *self;
            }
            let delta = DVec2::splat(margin);
            Area {
                min: Coordinate::from_vec2(self.min.as_vec2() - delta),
                max: Coordinate::from_vec2(self.max.as_vec2() + delta),
            }
        }

        pub fn contains_point(&self, point: Coordinate, tolerance: f64) -> bool {
            !self.is_empty()
                && point.x() >= self.min.x() - tolerance
                && point.x() <= self.max.x() + tolerance
                && point.y() >= self.min.y() - tolerance
                && point.y() <= self.max.y() + tolerance
        }

        /// `other` 是否完全落在当前范围内。
        pub fn contains_area(&self, other: &Area, tolerance: f64) -> bool {
            !other.is_empty()
                && self.contains_point(other.min, tolerance)
                && self.contains_point(other.max, tolerance)
        }

        pub fn intersects(&self, other: &Area, tolerance: f64) -> bool {
            if self.is_empty() || other.is_empty() {
                return false;
            }
            self.min.x() <= other.max.x() + tolerance
                && other.min.x() <= self.max.x() + tolerance
                && self.min.y() <= other.max.y() + tolerance
                && other.min.y() <= self.max.y() + tolerance
        }

        /// 点到矩形的距离，点在内部时为 0。
        pub fn distance_to_point(&self, point: Coordinate) -> f64 {
            if self.is_empty() {
                return f64::INFINITY;
            }
            let p = point.as_vec2();
            let clamped = p.clamp(self.min.as_vec2(), self.max.as_vec2());
            p.distance(clamped)
        }
    }

    /// 把角度归一化到 [0, 2π)。
    pub fn normalize_angle(angle: f64) -> f64 {
        let mut result = angle % TAU;
        if result < 0.0 {
            result += TAU;
        }
        result
    }

    /// 返回逆时针扫掠区间 (start, end)，保证 start ∈ [0, 2π) 且 end > start。
    pub fn canonical_interval(start: f64, end: f64) -> (f64, f64) {
        let start = normalize_angle(start);
        let mut end = normalize_angle(end);
        if (end - start).abs() < 1e-9 {
            end = start + TAU;
        } else if end < start {
            end += TAU;
        }
        (start, end)
    }

    /// 判定 `angle` 是否落在从 `start` 逆时针扫到 `end` 的区间内。
    pub fn angle_in_sweep(angle: f64, start: f64, end: f64, tolerance: f64) -> bool {
        let (start, end) = canonical_interval(start, end);
        let mut candidate = normalize_angle(angle);
        if candidate < start - tolerance {
            candidate += TAU;
        }
        if candidate > end + tolerance {
            // 恰好落在起始角之前一点点（跨越 0）
            return candidate - TAU >= start - tolerance;
        }
        candidate >= start - tolerance
    }

    #[inline]
    pub fn point_at_angle(center: Coordinate, radius: f64, angle: f64) -> Coordinate {
        Coordinate::new(
            center.x() + radius * angle.cos(),
            center.y() + radius * angle.sin(),
        )
    }

    /// 圆弧包围盒：端点加上扫掠范围内的象限点。
    pub fn arc_area(center: Coordinate, radius: f64, start_angle: f64, end_angle: f64) -> Area {
        let mut area = Area::empty();
        let radius = radius.abs();
        if radius <= f64::EPSILON {
            area.include_point(center);
            return area;
        }

        let (start, end) = canonical_interval(start_angle, end_angle);
        area.include_point(point_at_angle(center, radius, start));
        area.include_point(point_at_angle(center, radius, end));

        const QUADRANTS: [f64; 4] = [0.0, FRAC_PI_2, PI, FRAC_PI_2 * 3.0];
        for base in QUADRANTS {
            let mut candidate = base;
            while candidate < start {
                candidate += TAU;
            }
            if candidate <= end {
                area.include_point(point_at_angle(center, radius, candidate));
            }
        }
        area
    }

}
