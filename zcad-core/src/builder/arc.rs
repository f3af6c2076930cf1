use super::{BuilderBase, EntityBuilder, required, wrong_kind};
use crate::entity::{Arc, Entity, Shape};
use crate::errors::CadError;
use crate::geometry::{Coordinate, DEFAULT_TOLERANCE};

#[derive(Debug, Clone, Default)]
pub struct ArcBuilder {
    base: BuilderBase,
    center: Option<Coordinate>,
    radius: Option<f64>,
    start_angle: Option<f64>,
    end_angle: Option<f64>,
}

impl ArcBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entity(entity: &Entity) -> Result<Self, CadError> {
        match entity.shape() {
            Shape::Arc(arc) => Ok(Self {
                base: BuilderBase::from_entity(entity),
                center: Some(arc.center),
                radius: Some(arc.radius),
                start_angle: Some(arc.start_angle),
                end_angle: Some(arc.end_angle),
            }),
            _ => Err(wrong_kind("arc", entity)),
        }
    }

    /// 经过三点的圆弧：从 `start` 经 `through` 到 `end`。三点共线时失败。
    pub fn from_three_points(
        start: Coordinate,
        through: Coordinate,
        end: Coordinate,
    ) -> Result<Self, CadError> {
        let (ax, ay) = (start.x(), start.y());
        let (bx, by) = (through.x(), through.y());
        let (cx, cy) = (end.x(), end.y());

        let d = 2.0 * (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by));
        let scale = start.distance(through).max(through.distance(end));
        if !d.is_finite() || d.abs() <= DEFAULT_TOLERANCE * scale * scale {
            return Err(CadError::geometry("arc points are collinear"));
        }

        let a2 = ax * ax + ay * ay;
        let b2 = bx * bx + by * by;
        let c2 = cx * cx + cy * cy;
        let center = Coordinate::new(
            (a2 * (by - cy) + b2 * (cy - ay) + c2 * (ay - by)) / d,
            (a2 * (cx - bx) + b2 * (ax - cx) + c2 * (bx - ax)) / d,
        );
        let radius = center.distance(start);

        // d > 0 表示三点逆时针排列
        let (from, to) = if d > 0.0 { (start, end) } else { (end, start) };
        Ok(Self::new()
            .set_center(center)
            .set_radius(radius)
            .set_start_angle(center.angle_to(from))
            .set_end_angle(center.angle_to(to)))
    }

    pub fn set_center(mut self, center: Coordinate) -> Self {
        self.center = Some(center);
        self
    }

    pub fn set_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    pub fn set_start_angle(mut self, angle: f64) -> Self {
        self.start_angle = Some(angle);
        self
    }

    pub fn set_end_angle(mut self, angle: f64) -> Self {
        self.end_angle = Some(angle);
        self
    }

    #[inline]
    pub fn center(&self) -> Option<Coordinate> {
        self.center
    }

    #[inline]
    pub fn radius(&self) -> Option<f64> {
        self.radius
    }
}

impl EntityBuilder for ArcBuilder {
    fn base(&self) -> &BuilderBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BuilderBase {
        &mut self.base
    }

    fn build(&self) -> Result<Entity, CadError> {
        self.base.finish(Shape::Arc(Arc {
            center: required(self.center, "center")?,
            radius: required(self.radius, "radius")?,
            start_angle: required(self.start_angle, "start_angle")?,
            end_angle: required(self.end_angle, "end_angle")?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arc_through_three_points() {
        let builder = ArcBuilder::from_three_points(
            Coordinate::new(1.0, 0.0),
            Coordinate::new(0.0, 1.0),
            Coordinate::new(-1.0, 0.0),
        )
        .unwrap()
        .set_layer("0");
        let arc = builder.build().unwrap();
        let Shape::Arc(shape) = arc.shape() else {
            panic!("expected arc");
        };
        assert!(shape.center.approx_eq(Coordinate::ORIGIN, 1e-12));
        assert!((shape.radius - 1.0).abs() < 1e-12);
        assert!(shape.mid_point().approx_eq(Coordinate::new(0.0, 1.0), 1e-9));
    }

    #[test]
    fn clockwise_points_keep_the_through_point_on_the_arc() {
        let builder = ArcBuilder::from_three_points(
            Coordinate::new(-1.0, 0.0),
            Coordinate::new(0.0, 1.0),
            Coordinate::new(1.0, 0.0),
        )
        .unwrap()
        .set_layer("0");
        let arc = builder.build().unwrap();
        let Shape::Arc(shape) = arc.shape() else {
            panic!("expected arc");
        };
        assert!(shape.mid_point().approx_eq(Coordinate::new(0.0, 1.0), 1e-9));
    }

    #[test]
    fn tiny_arc_is_not_collinear() {
        let builder = ArcBuilder::from_three_points(
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1e-5, 1e-5),
            Coordinate::new(2e-5, 0.0),
        )
        .unwrap();
        assert!(builder.center().unwrap().approx_eq(Coordinate::new(1e-5, 0.0), 1e-15));
        assert!((builder.radius().unwrap() - 1e-5).abs() < 1e-15);

        let err = ArcBuilder::from_three_points(Coordinate::ORIGIN, Coordinate::ORIGIN, Coordinate::ORIGIN)
            .unwrap_err();
        assert!(matches!(err, CadError::InvalidGeometry(_)));
    }

    #[test]
    fn collinear_points_fail() {
        let err = ArcBuilder::from_three_points(
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(2.0, 2.0),
        )
        .unwrap_err();
        assert!(matches!(err, CadError::InvalidGeometry(_)));
    }

    #[test]
    fn missing_angle_is_reported() {
        let builder = ArcBuilder::new()
            .set_layer("0")
            .set_center(Coordinate::ORIGIN)
            .set_radius(1.0)
            .set_start_angle(0.0);
        assert_eq!(builder.build().unwrap_err(), CadError::MissingField("end_angle"));
    }
}
