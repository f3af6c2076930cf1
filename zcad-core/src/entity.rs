//! 不可变实体模型。
//!
//! 每次变换都会生成新的实体而不是原地修改：`move_by`/`rotate`/`scale`/`mirror`
//! 保留实体 ID（同一逻辑对象的新版本），`copy` 则分配新 ID（真正的副本）。
//! 具体类型通过 [`Shape`] 这一封闭枚举表达，行为扩展走 [`EntityVisitor`] 双分派。

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::errors::CadError;
use crate::geometry::{
    Area, Coordinate, DEFAULT_TOLERANCE, arc_area, canonical_interval, normalize_angle,
    point_at_angle,
};
use crate::math::Primitive;
use crate::meta::MetaInfoRef;
use crate::properties::{PropertiesMap, Property, PropertyUpdates, PropertyValue, UpdateReader};

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// 文档与撤销记录共享实体的方式。
pub type EntityRef = std::sync::Arc<Entity>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// 以原始数值构造，供外部加载器还原已有 ID。
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 从进程级分配器取得一个新的唯一 ID。
    #[inline]
    pub fn allocate() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// 确保之后分配的 ID 都大于 `raw`，加载文档后调用以保持唯一性。
    #[inline]
    pub fn reserve(raw: u64) {
        NEXT_ENTITY_ID.fetch_max(raw.saturating_add(1), Ordering::Relaxed);
    }

    /// 提供原始数值，便于序列化或日志输出。
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub position: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Coordinate,
    pub end: Coordinate,
}

impl Line {
    #[inline]
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    #[inline]
    pub fn midpoint(&self) -> Coordinate {
        self.start.mid(self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Coordinate,
    pub radius: f64,
}

/// 圆弧，角度以弧度存储，从起始角逆时针扫到终止角。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub center: Coordinate,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

impl Arc {
    #[inline]
    pub fn start_point(&self) -> Coordinate {
        point_at_angle(self.center, self.radius, self.start_angle)
    }

    #[inline]
    pub fn end_point(&self) -> Coordinate {
        point_at_angle(self.center, self.radius, self.end_angle)
    }

    /// 弧上位于扫掠角一半处的点。
    pub fn mid_point(&self) -> Coordinate {
        let (start, end) = canonical_interval(self.start_angle, self.end_angle);
        point_at_angle(self.center, self.radius, (start + end) / 2.0)
    }

    #[inline]
    pub fn primitive(&self) -> Primitive {
        Primitive::Arc {
            center: self.center,
            radius: self.radius,
            start_angle: self.start_angle,
            end_angle: self.end_angle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolylineVertex {
    pub position: Coordinate,
    /// 凸度 tan(θ/4)，0 表示直线段，正值为逆时针圆弧。
    pub bulge: f64,
}

impl PolylineVertex {
    #[inline]
    pub fn new(position: Coordinate) -> Self {
        Self {
            position,
            bulge: 0.0,
        }
    }

    #[inline]
    pub fn with_bulge(position: Coordinate, bulge: f64) -> Self {
        Self { position, bulge }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub vertices: Vec<PolylineVertex>,
    pub is_closed: bool,
}

impl Polyline {
    pub fn segment_count(&self) -> usize {
        match self.vertices.len() {
            0 | 1 => 0,
            n if self.is_closed => n,
            n => n - 1,
        }
    }

    /// 按顺序展开为线段与圆弧。
    pub fn segments(&self) -> Vec<Primitive> {
        let count = self.vertices.len();
        (0..self.segment_count())
            .map(|i| {
                let from = &self.vertices[i];
                let to = &self.vertices[(i + 1) % count];
                bulge_segment(from.position, to.position, from.bulge)
            })
            .collect()
    }
}

/// 由凸度还原一段多段线：凸度为零或弦长退化时得到直线段。
pub fn bulge_segment(start: Coordinate, end: Coordinate, bulge: f64) -> Primitive {
    let chord = end.as_vec2() - start.as_vec2();
    let chord_len = chord.length();
    if bulge.abs() <= 1e-9 || chord_len <= f64::EPSILON {
        return Primitive::Segment { start, end };
    }

    let half = chord_len / 2.0;
    let sagitta = bulge.abs() * half;
    let radius = (half * half + sagitta * sagitta) / (2.0 * sagitta);
    let normal = chord.perp() / chord_len;
    let offset = (radius - sagitta) * bulge.signum();
    let center = Coordinate::from_vec2(start.mid(end).as_vec2() + normal * offset);

    let (from, to) = if bulge > 0.0 { (start, end) } else { (end, start) };
    Primitive::Arc {
        center,
        radius,
        start_angle: center.angle_to(from),
        end_angle: center.angle_to(to),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HAlign {
    #[default]
    Left,
    Center,
    Right,
}

impl HAlign {
    pub fn name(self) -> &'static str {
        match self {
            HAlign::Left => "left",
            HAlign::Center => "center",
            HAlign::Right => "right",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "left" => Some(HAlign::Left),
            "center" | "centre" => Some(HAlign::Center),
            "right" => Some(HAlign::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VAlign {
    #[default]
    Baseline,
    Bottom,
    Middle,
    Top,
}

impl VAlign {
    pub fn name(self) -> &'static str {
        match self {
            VAlign::Baseline => "baseline",
            VAlign::Bottom => "bottom",
            VAlign::Middle => "middle",
            VAlign::Top => "top",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "baseline" => Some(VAlign::Baseline),
            "bottom" => Some(VAlign::Bottom),
            "middle" => Some(VAlign::Middle),
            "top" => Some(VAlign::Top),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawingDirection {
    #[default]
    LeftToRight,
    TopToBottom,
    ByStyle,
}

/// 字形宽度估算：西文约为字高的 0.6 倍，CJK 字符与字高相同。
const GLYPH_WIDTH_FACTOR: f64 = 0.6;
/// 下行部分相对字高的比例。
const DESCENDER_FACTOR: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub insertion_point: Coordinate,
    pub text_value: String,
    pub height: f64,
    /// 旋转角（弧度）。
    pub angle: f64,
    pub style: String,
    pub drawing_direction: DrawingDirection,
    pub halign: HAlign,
    pub valign: VAlign,
    pub underlined: bool,
    pub strikethrough: bool,
    pub bold: bool,
    pub italic: bool,
}

impl Text {
    fn is_cjk(c: char) -> bool {
        matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
    }

    /// 估算排版尺寸 (宽, 高)，未旋转。
    pub fn measured_extent(&self) -> (f64, f64) {
        let count = self.text_value.chars().count();
        match self.drawing_direction {
            DrawingDirection::TopToBottom => (self.height, count as f64 * self.height),
            DrawingDirection::LeftToRight | DrawingDirection::ByStyle => {
                let cjk = self.text_value.chars().filter(|c| Self::is_cjk(*c)).count();
                let other = count - cjk;
                let width = cjk as f64 * self.height
                    + other as f64 * self.height * GLYPH_WIDTH_FACTOR;
                (width, self.height)
            }
        }
    }

    /// 相对插入点、未旋转的局部包围矩形。
    fn local_box(&self) -> (f64, f64, f64, f64) {
        let (width, height) = self.measured_extent();
        let left = match self.halign {
            HAlign::Left => 0.0,
            HAlign::Center => -width / 2.0,
            HAlign::Right => -width,
        };
        let descender = self.height * DESCENDER_FACTOR;
        let (bottom, top) = match self.valign {
            VAlign::Baseline => (-descender, height),
            VAlign::Bottom => (0.0, height + descender),
            VAlign::Middle => (-(height + descender) / 2.0, (height + descender) / 2.0),
            VAlign::Top => (-(height + descender), 0.0),
        };
        (left, bottom, left + width, top)
    }

    pub fn bounding_box(&self) -> Area {
        let (x0, y0, x1, y1) = self.local_box();
        let origin = self.insertion_point;
        let corners = [(x0, y0), (x1, y0), (x1, y1), (x0, y1)];
        Area::from_points(corners.into_iter().map(|(x, y)| {
            Coordinate::new(origin.x() + x, origin.y() + y).rotate(origin, self.angle)
        }))
    }

    /// 点到文字范围的距离（在旋转后的局部坐标中计算）。
    pub fn distance_to(&self, point: Coordinate) -> f64 {
        let local = point.rotate(self.insertion_point, -self.angle) - self.insertion_point;
        let (x0, y0, x1, y1) = self.local_box();
        Area::new(Coordinate::new(x0, y0), Coordinate::new(x1, y1)).distance_to_point(local)
    }
}

/// 封闭的实体类型集合。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Point(Point),
    Line(Line),
    Circle(Circle),
    Arc(Arc),
    Polyline(Polyline),
    Text(Text),
}

impl Shape {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::Point(_) => "point",
            Shape::Line(_) => "line",
            Shape::Circle(_) => "circle",
            Shape::Arc(_) => "arc",
            Shape::Polyline(_) => "polyline",
            Shape::Text(_) => "text",
        }
    }

    /// 几何合法性检查，构建器与属性修改共用。
    pub fn validate(&self) -> Result<(), CadError> {
        let mut finite = true;
        self.for_each_point(|p| finite &= p.is_finite());
        if !finite {
            return Err(CadError::geometry("coordinates must be finite"));
        }
        match self {
            Shape::Point(_) => Ok(()),
            Shape::Line(line) => {
                if line.start.approx_eq(line.end, DEFAULT_TOLERANCE) {
                    Err(CadError::geometry("line endpoints coincide"))
                } else {
                    Ok(())
                }
            }
            Shape::Circle(circle) => check_radius(circle.radius),
            Shape::Arc(arc) => {
                check_radius(arc.radius)?;
                if arc.start_angle.is_finite() && arc.end_angle.is_finite() {
                    Ok(())
                } else {
                    Err(CadError::geometry("arc angles must be finite"))
                }
            }
            Shape::Polyline(polyline) => {
                if polyline.vertices.len() < 2 {
                    return Err(CadError::geometry("polyline needs at least two vertices"));
                }
                if polyline.vertices.iter().any(|v| !v.bulge.is_finite()) {
                    return Err(CadError::geometry("polyline bulge must be finite"));
                }
                Ok(())
            }
            Shape::Text(text) => {
                if !(text.height.is_finite() && text.height > 0.0) {
                    Err(CadError::geometry(format!(
                        "text height must be positive, got {}",
                        text.height
                    )))
                } else if !text.angle.is_finite() {
                    Err(CadError::geometry("text angle must be finite"))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn for_each_point(&self, mut visit: impl FnMut(Coordinate)) {
        match self {
            Shape::Point(point) => visit(point.position),
            Shape::Line(line) => {
                visit(line.start);
                visit(line.end);
            }
            Shape::Circle(circle) => visit(circle.center),
            Shape::Arc(arc) => visit(arc.center),
            Shape::Polyline(polyline) => polyline.vertices.iter().for_each(|v| visit(v.position)),
            Shape::Text(text) => visit(text.insertion_point),
        }
    }

    /// 对所有定义点应用同一映射，角度/半径等标量保持不变。
    fn map_points(&self, map: impl Fn(Coordinate) -> Coordinate) -> Shape {
        match self {
            Shape::Point(point) => Shape::Point(Point {
                position: map(point.position),
            }),
            Shape::Line(line) => Shape::Line(Line {
                start: map(line.start),
                end: map(line.end),
            }),
            Shape::Circle(circle) => Shape::Circle(Circle {
                center: map(circle.center),
                ..circle.clone()
            }),
            Shape::Arc(arc) => Shape::Arc(Arc {
                center: map(arc.center),
                ..arc.clone()
            }),
            Shape::Polyline(polyline) => Shape::Polyline(Polyline {
                vertices: polyline
                    .vertices
                    .iter()
                    .map(|v| PolylineVertex::with_bulge(map(v.position), v.bulge))
                    .collect(),
                is_closed: polyline.is_closed,
            }),
            Shape::Text(text) => Shape::Text(Text {
                insertion_point: map(text.insertion_point),
                ..text.clone()
            }),
        }
    }

    fn translated(&self, offset: Coordinate) -> Shape {
        self.map_points(|p| p + offset)
    }

    fn rotated(&self, center: Coordinate, angle: f64) -> Shape {
        let mut shape = self.map_points(|p| p.rotate(center, angle));
        match &mut shape {
            Shape::Arc(arc) => {
                arc.start_angle = normalize_angle(arc.start_angle + angle);
                arc.end_angle = normalize_angle(arc.end_angle + angle);
            }
            Shape::Text(text) => text.angle = normalize_angle(text.angle + angle),
            _ => {}
        }
        shape
    }

    fn scaled(&self, center: Coordinate, factor: f64) -> Result<Shape, CadError> {
        if !factor.is_finite() || factor.abs() <= DEFAULT_TOLERANCE {
            return Err(CadError::geometry(format!(
                "scale factor must be finite and non-zero, got {factor}"
            )));
        }
        let magnitude = factor.abs();
        // 负比例等价于绕中心旋转 180° 后再缩放
        let flip = if factor < 0.0 { PI } else { 0.0 };
        let mut shape = self.map_points(|p| p.scale(center, factor));
        match &mut shape {
            Shape::Circle(circle) => circle.radius *= magnitude,
            Shape::Arc(arc) => {
                arc.radius *= magnitude;
                arc.start_angle = normalize_angle(arc.start_angle + flip);
                arc.end_angle = normalize_angle(arc.end_angle + flip);
            }
            Shape::Text(text) => {
                text.height *= magnitude;
                text.angle = normalize_angle(text.angle + flip);
            }
            _ => {}
        }
        Ok(shape)
    }

    fn mirrored(&self, axis_a: Coordinate, axis_b: Coordinate) -> Result<Shape, CadError> {
        if axis_a.approx_eq(axis_b, DEFAULT_TOLERANCE) {
            return Err(CadError::geometry("mirror axis points coincide"));
        }
        if let Shape::Text(_) = self {
            return Err(CadError::UnsupportedOperation {
                operation: "mirror",
                kind: self.kind_name(),
            });
        }
        let axis_angle = axis_a.angle_to(axis_b);
        let mut shape = self.map_points(|p| p.mirror(axis_a, axis_b));
        match &mut shape {
            Shape::Arc(arc) => {
                // 镜像反转方向，起止角互换
                let start = 2.0 * axis_angle - arc.end_angle;
                let end = 2.0 * axis_angle - arc.start_angle;
                arc.start_angle = normalize_angle(start);
                arc.end_angle = normalize_angle(end);
            }
            Shape::Polyline(polyline) => {
                for vertex in &mut polyline.vertices {
                    vertex.bulge = -vertex.bulge;
                }
            }
            _ => {}
        }
        Ok(shape)
    }

    pub fn bounding_box(&self) -> Area {
        match self {
            Shape::Point(point) => Area::from_points([point.position]),
            Shape::Line(line) => Area::from_points([line.start, line.end]),
            Shape::Circle(circle) => {
                let r = circle.radius.abs();
                let c = circle.center;
                Area::new(
                    Coordinate::new(c.x() - r, c.y() - r),
                    Coordinate::new(c.x() + r, c.y() + r),
                )
            }
            Shape::Arc(arc) => arc_area(arc.center, arc.radius, arc.start_angle, arc.end_angle),
            Shape::Polyline(polyline) => {
                let mut area = Area::from_points(polyline.vertices.iter().map(|v| v.position));
                for segment in polyline.segments() {
                    if let Primitive::Arc {
                        center,
                        radius,
                        start_angle,
                        end_angle,
                    } = segment
                    {
                        area.include_area(&arc_area(center, radius, start_angle, end_angle));
                    }
                }
                area
            }
            Shape::Text(text) => text.bounding_box(),
        }
    }

    /// 曲线分解，点与文字没有曲线部分。
    pub fn primitives(&self) -> Vec<Primitive> {
        match self {
            Shape::Point(_) | Shape::Text(_) => Vec::new(),
            Shape::Line(line) => vec![Primitive::Segment {
                start: line.start,
                end: line.end,
            }],
            Shape::Circle(circle) => vec![Primitive::Circle {
                center: circle.center,
                radius: circle.radius,
            }],
            Shape::Arc(arc) => vec![arc.primitive()],
            Shape::Polyline(polyline) => polyline.segments(),
        }
    }

    pub fn distance_to(&self, point: Coordinate) -> f64 {
        match self {
            Shape::Point(p) => p.position.distance(point),
            Shape::Text(text) => text.distance_to(point),
            _ => self
                .primitives()
                .iter()
                .map(|primitive| primitive.distance_to(point))
                .fold(f64::INFINITY, f64::min),
        }
    }

    /// 在容差内比较两个形状，角度按圆周距离比较。
    pub fn approx_eq(&self, other: &Shape, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;
        let same_angle = |a: f64, b: f64| {
            let diff = normalize_angle(a - b);
            diff <= tolerance || (std::f64::consts::TAU - diff) <= tolerance
        };
        match (self, other) {
            (Shape::Point(a), Shape::Point(b)) => a.position.approx_eq(b.position, tolerance),
            (Shape::Line(a), Shape::Line(b)) => {
                a.start.approx_eq(b.start, tolerance) && a.end.approx_eq(b.end, tolerance)
            }
            (Shape::Circle(a), Shape::Circle(b)) => {
                a.center.approx_eq(b.center, tolerance) && close(a.radius, b.radius)
            }
            (Shape::Arc(a), Shape::Arc(b)) => {
                a.center.approx_eq(b.center, tolerance)
                    && close(a.radius, b.radius)
                    && same_angle(a.start_angle, b.start_angle)
                    && same_angle(a.end_angle, b.end_angle)
            }
            (Shape::Polyline(a), Shape::Polyline(b)) => {
                a.is_closed == b.is_closed
                    && a.vertices.len() == b.vertices.len()
                    && a.vertices.iter().zip(&b.vertices).all(|(va, vb)| {
                        va.position.approx_eq(vb.position, tolerance) && close(va.bulge, vb.bulge)
                    })
            }
            (Shape::Text(a), Shape::Text(b)) => {
                a.insertion_point.approx_eq(b.insertion_point, tolerance)
                    && close(a.height, b.height)
                    && same_angle(a.angle, b.angle)
                    && Text {
                        insertion_point: b.insertion_point,
                        height: b.height,
                        angle: b.angle,
                        ..a.clone()
                    } == *b
            }
            _ => false,
        }
    }
}

fn check_radius(radius: f64) -> Result<(), CadError> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(CadError::geometry(format!(
            "radius must be positive, got {radius}"
        )))
    }
}

/// 针对每一种具体实体提供一个操作的访问者。
pub trait EntityVisitor {
    type Output;

    fn visit_point(&mut self, entity: &Entity, point: &Point) -> Self::Output;
    fn visit_line(&mut self, entity: &Entity, line: &Line) -> Self::Output;
    fn visit_circle(&mut self, entity: &Entity, circle: &Circle) -> Self::Output;
    fn visit_arc(&mut self, entity: &Entity, arc: &Arc) -> Self::Output;
    fn visit_polyline(&mut self, entity: &Entity, polyline: &Polyline) -> Self::Output;
    fn visit_text(&mut self, entity: &Entity, text: &Text) -> Self::Output;
}

/// 不可变 CAD 实体：身份、图层引用、可选样式与块引用，以及具体几何。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    layer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<MetaInfoRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    block: Option<String>,
    shape: Shape,
}

impl Entity {
    pub(crate) fn from_parts(
        id: EntityId,
        layer: String,
        meta: Option<MetaInfoRef>,
        block: Option<String>,
        shape: Shape,
    ) -> Self {
        Self {
            id,
            layer,
            meta,
            block,
            shape,
        }
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[inline]
    pub fn layer(&self) -> &str {
        &self.layer
    }

    #[inline]
    pub fn meta(&self) -> Option<&MetaInfoRef> {
        self.meta.as_ref()
    }

    #[inline]
    pub fn block(&self) -> Option<&str> {
        self.block.as_deref()
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn kind_name(&self) -> &'static str {
        self.shape.kind_name()
    }

    pub fn as_circle(&self) -> Option<&Circle> {
        match &self.shape {
            Shape::Circle(circle) => Some(circle),
            _ => None,
        }
    }

    /// 相同身份、不同几何的新版本。
    fn revise(&self, shape: Shape) -> Entity {
        Entity {
            id: self.id,
            layer: self.layer.clone(),
            meta: self.meta.clone(),
            block: self.block.clone(),
            shape,
        }
    }

    /// 平移后的新版本，保留 ID、图层、样式与块引用。
    pub fn move_by(&self, offset: Coordinate) -> Entity {
        self.revise(self.shape.translated(offset))
    }

    /// 平移后的副本，分配新的 ID。
    pub fn copy(&self, offset: Coordinate) -> Entity {
        Entity {
            id: EntityId::allocate(),
            ..self.move_by(offset)
        }
    }

    pub fn rotate(&self, center: Coordinate, angle: f64) -> Entity {
        self.revise(self.shape.rotated(center, angle))
    }

    pub fn scale(&self, center: Coordinate, factor: f64) -> Result<Entity, CadError> {
        Ok(self.revise(self.shape.scaled(center, factor)?))
    }

    /// 关于直线 AB 镜像；文字不支持镜像，返回 `UnsupportedOperation`。
    pub fn mirror(&self, axis_a: Coordinate, axis_b: Coordinate) -> Result<Entity, CadError> {
        Ok(self.revise(self.shape.mirrored(axis_a, axis_b)?))
    }

    pub fn with_layer(&self, layer: impl Into<String>) -> Entity {
        Entity {
            layer: layer.into(),
            ..self.clone()
        }
    }

    pub fn with_meta(&self, meta: Option<MetaInfoRef>) -> Entity {
        Entity {
            meta,
            ..self.clone()
        }
    }

    pub fn with_block(&self, block: Option<String>) -> Entity {
        Entity {
            block,
            ..self.clone()
        }
    }

    #[inline]
    pub fn bounding_box(&self) -> Area {
        self.shape.bounding_box()
    }

    #[inline]
    pub fn distance_to(&self, point: Coordinate) -> f64 {
        self.shape.distance_to(point)
    }

    #[inline]
    pub fn primitives(&self) -> Vec<Primitive> {
        self.shape.primitives()
    }

    /// 结构相等：身份与属性一致，几何在容差内相同。
    pub fn approx_eq(&self, other: &Entity, tolerance: f64) -> bool {
        self.id == other.id
            && self.layer == other.layer
            && self.meta == other.meta
            && self.block == other.block
            && self.shape.approx_eq(&other.shape, tolerance)
    }

    /// 双分派入口：按自身类型回调访问者对应的方法。
    pub fn accept<V: EntityVisitor>(&self, visitor: &mut V) -> V::Output {
        match &self.shape {
            Shape::Point(point) => visitor.visit_point(self, point),
            Shape::Line(line) => visitor.visit_line(self, line),
            Shape::Circle(circle) => visitor.visit_circle(self, circle),
            Shape::Arc(arc) => visitor.visit_arc(self, arc),
            Shape::Polyline(polyline) => visitor.visit_polyline(self, polyline),
            Shape::Text(text) => visitor.visit_text(self, text),
        }
    }

    pub fn available_properties(&self) -> PropertiesMap {
        use PropertyValue::{Boolean, Coordinate as Coord, Number, Text as Str};

        let mut map = PropertiesMap::new();
        let mut put = |name: &str, property: Property| {
            map.insert(name.to_string(), property);
        };
        match &self.shape {
            Shape::Point(point) => put("position", Property::editable(Coord(point.position))),
            Shape::Line(line) => {
                put("start", Property::editable(Coord(line.start)));
                put("end", Property::editable(Coord(line.end)));
                put("length", Property::read_only(Number(line.length())));
            }
            Shape::Circle(circle) => {
                put("center", Property::editable(Coord(circle.center)));
                put("radius", Property::editable(Number(circle.radius)));
            }
            Shape::Arc(arc) => {
                put("center", Property::editable(Coord(arc.center)));
                put("radius", Property::editable(Number(arc.radius)));
                put("start_angle", Property::editable(Number(arc.start_angle)));
                put("end_angle", Property::editable(Number(arc.end_angle)));
            }
            Shape::Polyline(polyline) => {
                put("closed", Property::editable(Boolean(polyline.is_closed)));
                put(
                    "vertex_count",
                    Property::read_only(Number(polyline.vertices.len() as f64)),
                );
            }
            Shape::Text(text) => {
                put("insertion_point", Property::editable(Coord(text.insertion_point)));
                put("text_value", Property::editable(Str(text.text_value.clone())));
                put("height", Property::editable(Number(text.height)));
                put("angle", Property::editable(Number(text.angle)));
                put("style", Property::editable(Str(text.style.clone())));
                put("halign", Property::editable(Str(text.halign.name().to_string())));
                put("valign", Property::editable(Str(text.valign.name().to_string())));
                put("bold", Property::editable(Boolean(text.bold)));
                put("italic", Property::editable(Boolean(text.italic)));
                put("underlined", Property::editable(Boolean(text.underlined)));
                put("strikethrough", Property::editable(Boolean(text.strikethrough)));
            }
        }
        map
    }

    /// 按名称更新字段，返回新版本。未知名称忽略；只读属性同样忽略。
    pub fn set_properties(&self, updates: &PropertyUpdates) -> Result<Entity, CadError> {
        let reader = UpdateReader::new(updates);
        let shape = match &self.shape {
            Shape::Point(point) => Shape::Point(Point {
                position: reader.coordinate("position")?.unwrap_or(point.position),
            }),
            Shape::Line(line) => Shape::Line(Line {
                start: reader.coordinate("start")?.unwrap_or(line.start),
                end: reader.coordinate("end")?.unwrap_or(line.end),
            }),
            Shape::Circle(circle) => Shape::Circle(Circle {
                center: reader.coordinate("center")?.unwrap_or(circle.center),
                radius: reader.number("radius")?.unwrap_or(circle.radius),
            }),
            Shape::Arc(arc) => Shape::Arc(Arc {
                center: reader.coordinate("center")?.unwrap_or(arc.center),
                radius: reader.number("radius")?.unwrap_or(arc.radius),
                start_angle: reader.number("start_angle")?.unwrap_or(arc.start_angle),
                end_angle: reader.number("end_angle")?.unwrap_or(arc.end_angle),
            }),
            Shape::Polyline(polyline) => Shape::Polyline(Polyline {
                vertices: polyline.vertices.clone(),
                is_closed: reader.boolean("closed")?.unwrap_or(polyline.is_closed),
            }),
            Shape::Text(text) => {
                let halign = match reader.text("halign")? {
                    Some(name) => HAlign::from_name(name)
                        .ok_or_else(|| CadError::InvalidProperty("halign".to_string()))?,
                    None => text.halign,
                };
                let valign = match reader.text("valign")? {
                    Some(name) => VAlign::from_name(name)
                        .ok_or_else(|| CadError::InvalidProperty("valign".to_string()))?,
                    None => text.valign,
                };
                Shape::Text(Text {
                    insertion_point: reader
                        .coordinate("insertion_point")?
                        .unwrap_or(text.insertion_point),
                    text_value: reader
                        .text("text_value")?
                        .map_or_else(|| text.text_value.clone(), str::to_string),
                    height: reader.number("height")?.unwrap_or(text.height),
                    angle: reader.number("angle")?.unwrap_or(text.angle),
                    style: reader
                        .text("style")?
                        .map_or_else(|| text.style.clone(), str::to_string),
                    drawing_direction: text.drawing_direction,
                    halign,
                    valign,
                    underlined: reader.boolean("underlined")?.unwrap_or(text.underlined),
                    strikethrough: reader
                        .boolean("strikethrough")?
                        .unwrap_or(text.strikethrough),
                    bold: reader.boolean("bold")?.unwrap_or(text.bold),
                    italic: reader.boolean("italic")?.unwrap_or(text.italic),
                })
            }
        };
        shape.validate()?;
        Ok(self.revise(shape))
    }

    /// 交互编辑把手。圆：0 为圆心、1 为半径把手；圆弧：0 圆心、1 起点、2 终点。
    pub fn drag_points(&self) -> BTreeMap<u32, Coordinate> {
        let mut points = BTreeMap::new();
        match &self.shape {
            Shape::Point(point) => {
                points.insert(0, point.position);
            }
            Shape::Line(line) => {
                points.insert(0, line.start);
                points.insert(1, line.end);
            }
            Shape::Circle(circle) => {
                points.insert(0, circle.center);
                points.insert(1, point_at_angle(circle.center, circle.radius, 0.0));
            }
            Shape::Arc(arc) => {
                points.insert(0, arc.center);
                points.insert(1, arc.start_point());
                points.insert(2, arc.end_point());
            }
            Shape::Polyline(polyline) => {
                for (index, vertex) in polyline.vertices.iter().enumerate() {
                    points.insert(index as u32, vertex.position);
                }
            }
            Shape::Text(text) => {
                points.insert(0, text.insertion_point);
            }
        }
        points
    }

    /// 应用拖拽后的把手位置，未知把手忽略。
    pub fn set_drag_points(&self, handles: &BTreeMap<u32, Coordinate>) -> Result<Entity, CadError> {
        let handle = |index: u32| handles.get(&index).copied();
        let shape = match &self.shape {
            Shape::Point(point) => Shape::Point(Point {
                position: handle(0).unwrap_or(point.position),
            }),
            Shape::Line(line) => Shape::Line(Line {
                start: handle(0).unwrap_or(line.start),
                end: handle(1).unwrap_or(line.end),
            }),
            Shape::Circle(circle) => {
                let center = handle(0).unwrap_or(circle.center);
                let radius = handle(1).map_or(circle.radius, |p| center.distance(p));
                Shape::Circle(Circle { center, radius })
            }
            Shape::Arc(arc) => {
                let center = handle(0).unwrap_or(arc.center);
                Shape::Arc(Arc {
                    center,
                    radius: arc.radius,
                    start_angle: handle(1).map_or(arc.start_angle, |p| center.angle_to(p)),
                    end_angle: handle(2).map_or(arc.end_angle, |p| center.angle_to(p)),
                })
            }
            Shape::Polyline(polyline) => Shape::Polyline(Polyline {
                vertices: polyline
                    .vertices
                    .iter()
                    .enumerate()
                    .map(|(index, vertex)| {
                        PolylineVertex::with_bulge(
                            handle(index as u32).unwrap_or(vertex.position),
                            vertex.bulge,
                        )
                    })
                    .collect(),
                is_closed: polyline.is_closed,
            }),
            Shape::Text(text) => Shape::Text(Text {
                insertion_point: handle(0).unwrap_or(text.insertion_point),
                ..text.clone()
            }),
        };
        shape.validate()?;
        Ok(self.revise(shape))
    }
}
