//! 对象捕捉与几何查询。
//!
//! 支持的捕捉类型按优先级排列：端点、中点、圆心、交点、网格点。
//! 候选点按 (距离, 实体绘制顺序, 类型优先级) 排序，结果完全确定。

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use zcad_core::entity::{
    Arc, Circle, Entity, EntityId, EntityVisitor, Line, Point, Polyline, Text,
};
use zcad_core::geometry::{Area, Coordinate};
use zcad_core::math::{Primitive, intersect};

use crate::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapKind {
    Endpoint,
    Midpoint,
    Center,
    Intersection,
    Grid,
}

impl SnapKind {
    pub const ALL: [SnapKind; 5] = [
        SnapKind::Endpoint,
        SnapKind::Midpoint,
        SnapKind::Center,
        SnapKind::Intersection,
        SnapKind::Grid,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SnapKind::Endpoint => "endpoint",
            SnapKind::Midpoint => "midpoint",
            SnapKind::Center => "center",
            SnapKind::Intersection => "intersection",
            SnapKind::Grid => "grid",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    #[inline]
    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// 捕捉掩码（位域）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapMask {
    bits: u8,
}

impl SnapMask {
    pub const NONE: SnapMask = SnapMask { bits: 0 };
    pub const ALL: SnapMask = SnapMask { bits: 0b1_1111 };

    pub fn is_enabled(&self, kind: SnapKind) -> bool {
        self.bits & kind.bit() != 0
    }

    pub fn set(&mut self, kind: SnapKind, enabled: bool) {
        if enabled {
            self.bits |= kind.bit();
        } else {
            self.bits &= !kind.bit();
        }
    }

    pub fn with(mut self, kind: SnapKind) -> Self {
        self.set(kind, true);
        self
    }
}

impl Default for SnapMask {
    fn default() -> Self {
        // 默认启用除网格外的所有对象捕捉
        SnapMask::NONE
            .with(SnapKind::Endpoint)
            .with(SnapKind::Midpoint)
            .with(SnapKind::Center)
            .with(SnapKind::Intersection)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapSettings {
    pub enabled: bool,
    /// 捕捉半径（世界坐标）。
    pub threshold: f64,
    pub grid_spacing: f64,
    pub mask: SnapMask,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 5.0,
            grid_spacing: 10.0,
            mask: SnapMask::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapPoint {
    pub point: Coordinate,
    pub kind: SnapKind,
    /// 产生该点的实体，网格点为空，交点有两个。
    pub entities: Vec<EntityId>,
    pub distance: f64,
}

/// 收集实体的特征点。
struct KeyPoints {
    points: Vec<(Coordinate, SnapKind)>,
}

impl KeyPoints {
    fn collect(entity: &Entity) -> Vec<(Coordinate, SnapKind)> {
        let mut visitor = KeyPoints { points: Vec::new() };
        entity.accept(&mut visitor);
        visitor.points
    }

    fn push(&mut self, point: Coordinate, kind: SnapKind) {
        self.points.push((point, kind));
    }
}

impl EntityVisitor for KeyPoints {
    type Output = ();

    fn visit_point(&mut self, _: &Entity, point: &Point) {
        self.push(point.position, SnapKind::Endpoint);
    }

    fn visit_line(&mut self, _: &Entity, line: &Line) {
        self.push(line.start, SnapKind::Endpoint);
        self.push(line.end, SnapKind::Endpoint);
        self.push(line.midpoint(), SnapKind::Midpoint);
    }

    fn visit_circle(&mut self, _: &Entity, circle: &Circle) {
        self.push(circle.center, SnapKind::Center);
    }

    fn visit_arc(&mut self, _: &Entity, arc: &Arc) {
        self.push(arc.start_point(), SnapKind::Endpoint);
        self.push(arc.end_point(), SnapKind::Endpoint);
        self.push(arc.mid_point(), SnapKind::Midpoint);
        self.push(arc.center, SnapKind::Center);
    }

    fn visit_polyline(&mut self, _: &Entity, polyline: &Polyline) {
        for vertex in &polyline.vertices {
            self.push(vertex.position, SnapKind::Endpoint);
        }
        for segment in polyline.segments() {
            let mid = match segment {
                Primitive::Segment { start, end } => start.mid(end),
                Primitive::Arc {
                    center,
                    radius,
                    start_angle,
                    end_angle,
                } => Arc {
                    center,
                    radius,
                    start_angle,
                    end_angle,
                }
                .mid_point(),
                Primitive::Circle { center, .. } => center,
            };
            self.push(mid, SnapKind::Midpoint);
        }
    }

    fn visit_text(&mut self, _: &Entity, text: &Text) {
        self.push(text.insertion_point, SnapKind::Endpoint);
    }
}

/// 排序键：距离、实体绘制顺序、类型优先级、生成顺序。
#[derive(Debug, Clone, Copy)]
struct CandidateKey {
    distance: f64,
    paint_index: usize,
    kind: SnapKind,
    sequence: usize,
}

impl CandidateKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.paint_index.cmp(&other.paint_index))
            .then(self.kind.cmp(&other.kind))
            .then(self.sequence.cmp(&other.sequence))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapEngine {
    settings: SnapSettings,
}

impl SnapEngine {
    pub fn new(settings: SnapSettings) -> Self {
        Self { settings }
    }

    #[inline]
    pub fn settings(&self) -> &SnapSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SnapSettings) {
        self.settings = settings;
    }

    pub fn set_kind_enabled(&mut self, kind: SnapKind, enabled: bool) {
        self.settings.mask.set(kind, enabled);
    }

    /// 查找阈值内最合适的捕捉点，没有候选时返回 `None`。
    pub fn find_snap(&self, candidate: Coordinate, document: &Document) -> Option<SnapPoint> {
        let settings = &self.settings;
        if !settings.enabled || !(settings.threshold.is_finite() && settings.threshold >= 0.0) {
            return None;
        }
        let mask = settings.mask;
        let threshold = settings.threshold;
        let reach = Area::new(candidate, candidate).inflate(threshold);

        let nearby: Vec<(usize, &Entity)> = document
            .entities()
            .enumerate()
            .filter(|(_, entity)| document.is_interactive(entity))
            .filter(|(_, entity)| entity.bounding_box().intersects(&reach, 0.0))
            .map(|(index, entity)| (index, &**entity))
            .collect();

        let mut best: Option<(CandidateKey, SnapPoint)> = None;
        let mut sequence = 0;
        let mut offer = |point: Coordinate, kind: SnapKind, paint_index: usize, entities: Vec<EntityId>| {
            let distance = candidate.distance(point);
            if distance > threshold {
                return;
            }
            let key = CandidateKey {
                distance,
                paint_index,
                kind,
                sequence,
            };
            sequence += 1;
            if best.as_ref().is_none_or(|(current, _)| key.cmp(current) == Ordering::Less) {
                best = Some((
                    key,
                    SnapPoint {
                        point,
                        kind,
                        entities,
                        distance,
                    },
                ));
            }
        };

        for (index, entity) in &nearby {
            for (point, kind) in KeyPoints::collect(entity) {
                if mask.is_enabled(kind) {
                    offer(point, kind, *index, vec![entity.id()]);
                }
            }
        }

        if mask.is_enabled(SnapKind::Intersection) {
            let tolerance = document.tolerance();
            for (i, (first_index, first)) in nearby.iter().enumerate() {
                let first_primitives = first.primitives();
                for (_, second) in &nearby[i + 1..] {
                    for a in &first_primitives {
                        for b in second.primitives() {
                            for point in intersect(a, &b, tolerance) {
                                offer(
                                    point,
                                    SnapKind::Intersection,
                                    *first_index,
                                    vec![first.id(), second.id()],
                                );
                            }
                        }
                    }
                }
            }
        }

        let spacing = settings.grid_spacing;
        if mask.is_enabled(SnapKind::Grid) && spacing.is_finite() && spacing > 0.0 {
            let grid = Coordinate::new(
                (candidate.x() / spacing).round() * spacing,
                (candidate.y() / spacing).round() * spacing,
            );
            offer(grid, SnapKind::Grid, usize::MAX, Vec::new());
        }

        best.map(|(_, snap)| snap)
    }

    /// 最近的捕捉点；没有候选时原样返回输入点。
    pub fn closest_snap_point(&self, candidate: Coordinate, document: &Document) -> Coordinate {
        self.find_snap(candidate, document)
            .map_or(candidate, |snap| snap.point)
    }
}

#[cfg(test)]
mod tests {
    use zcad_core::builder::{ArcBuilder, CircleBuilder, EntityBuilder, LineBuilder};
    use zcad_core::meta::Layer;

    use super::*;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Entity {
        LineBuilder::new()
            .set_layer("0")
            .set_start(Coordinate::new(x0, y0))
            .set_end(Coordinate::new(x1, y1))
            .build()
            .unwrap()
    }

    fn engine(threshold: f64) -> SnapEngine {
        SnapEngine::new(SnapSettings {
            threshold,
            ..SnapSettings::default()
        })
    }

    #[test]
    fn snaps_to_nearest_endpoint() {
        let mut document = Document::new();
        let id = document.add_entity(line(0.0, 0.0, 10.0, 0.0)).unwrap();

        let snap = engine(1.0)
            .find_snap(Coordinate::new(9.6, 0.3), &document)
            .unwrap();
        assert_eq!(snap.kind, SnapKind::Endpoint);
        assert_eq!(snap.entities, vec![id]);
        assert!(snap.point.approx_eq(Coordinate::new(10.0, 0.0), 1e-12));
    }

    #[test]
    fn falls_back_to_input_point() {
        let mut document = Document::new();
        document.add_entity(line(0.0, 0.0, 10.0, 0.0)).unwrap();
        let input = Coordinate::new(50.0, 50.0);
        assert_eq!(engine(1.0).closest_snap_point(input, &document), input);

        let mut disabled = engine(100.0);
        disabled.settings.enabled = false;
        assert_eq!(disabled.closest_snap_point(Coordinate::new(0.1, 0.0), &document), Coordinate::new(0.1, 0.0));
    }

    #[test]
    fn finds_line_intersections() {
        let mut document = Document::new();
        let a = document.add_entity(line(0.0, 0.0, 10.0, 10.0)).unwrap();
        let b = document.add_entity(line(0.0, 4.0, 8.0, 0.0)).unwrap();

        let probe = Coordinate::new(2.8, 2.6);
        let snap = engine(1.0).find_snap(probe, &document).unwrap();
        assert_eq!(snap.kind, SnapKind::Intersection);
        assert_eq!(snap.entities, vec![a, b]);
        assert!(snap.point.approx_eq(Coordinate::new(8.0 / 3.0, 8.0 / 3.0), 1e-9));

        let mut without = engine(1.0);
        without.set_kind_enabled(SnapKind::Intersection, false);
        assert!(without.find_snap(probe, &document).is_none());
    }

    #[test]
    fn equal_distance_prefers_earlier_entity_then_kind() {
        let mut document = Document::new();
        let first = document.add_entity(line(0.0, 0.0, 4.0, 0.0)).unwrap();
        document.add_entity(line(4.0, 0.0, 4.0, 4.0)).unwrap();

        // (4, 0) 同时是两条线的端点
        let snap = engine(1.0).find_snap(Coordinate::new(4.5, 0.0), &document).unwrap();
        assert_eq!(snap.kind, SnapKind::Endpoint);
        assert_eq!(snap.entities, vec![first]);
    }

    #[test]
    fn arc_offers_center_and_endpoints() {
        let mut document = Document::new();
        let arc = ArcBuilder::new()
            .set_layer("0")
            .set_center(Coordinate::new(0.0, 0.0))
            .set_radius(5.0)
            .set_start_angle(0.0)
            .set_end_angle(std::f64::consts::FRAC_PI_2)
            .build()
            .unwrap();
        document.add_entity(arc).unwrap();

        let snap = engine(1.0).find_snap(Coordinate::new(0.3, 0.2), &document).unwrap();
        assert_eq!(snap.kind, SnapKind::Center);
        let snap = engine(1.0).find_snap(Coordinate::new(0.2, 4.8), &document).unwrap();
        assert_eq!(snap.kind, SnapKind::Endpoint);
    }

    #[test]
    fn grid_snap_when_enabled() {
        let document = Document::new();
        let mut snapper = engine(3.0);
        snapper.set_kind_enabled(SnapKind::Grid, true);
        let snap = snapper.find_snap(Coordinate::new(11.0, -9.0), &document).unwrap();
        assert_eq!(snap.kind, SnapKind::Grid);
        assert!(snap.point.approx_eq(Coordinate::new(10.0, -10.0), 1e-12));
        assert!(snap.entities.is_empty());
    }

    #[test]
    fn frozen_layers_are_skipped() {
        let mut document = Document::new();
        let mut frozen = Layer::new("FROZEN");
        frozen.is_frozen = true;
        document.add_layer(frozen).unwrap();
        let circle = CircleBuilder::new()
            .set_layer("FROZEN")
            .set_center(Coordinate::ORIGIN)
            .set_radius(2.0)
            .build()
            .unwrap();
        document.add_entity(circle).unwrap();
        assert!(engine(1.0).find_snap(Coordinate::new(0.1, 0.1), &document).is_none());
    }

    #[test]
    fn result_is_deterministic() {
        let mut document = Document::new();
        for i in 0..5 {
            document.add_entity(line(0.0, i as f64, 10.0, i as f64)).unwrap();
        }
        let snapper = engine(2.0);
        let probe = Coordinate::new(0.4, 2.0);
        let first = snapper.find_snap(probe, &document);
        for _ in 0..10 {
            assert_eq!(snapper.find_snap(probe, &document), first);
        }
        assert_eq!(first.unwrap().point, Coordinate::new(0.0, 2.0));
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in SnapKind::ALL {
            assert_eq!(SnapKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(SnapKind::from_name("quadrant"), None);
    }
}
