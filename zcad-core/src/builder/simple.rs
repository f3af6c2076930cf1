use super::{BuilderBase, EntityBuilder, required, wrong_kind};
use crate::entity::{Entity, Line, Point, Shape};
use crate::errors::CadError;
use crate::geometry::Coordinate;

#[derive(Debug, Clone, Default)]
pub struct PointBuilder {
    base: BuilderBase,
    position: Option<Coordinate>,
}

impl PointBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entity(entity: &Entity) -> Result<Self, CadError> {
        match entity.shape() {
            Shape::Point(point) => Ok(Self {
                base: BuilderBase::from_entity(entity),
                position: Some(point.position),
            }),
            _ => Err(wrong_kind("point", entity)),
        }
    }

    pub fn set_position(mut self, position: Coordinate) -> Self {
        self.position = Some(position);
        self
    }

    #[inline]
    pub fn position(&self) -> Option<Coordinate> {
        self.position
    }
}

impl EntityBuilder for PointBuilder {
    fn base(&self) -> &BuilderBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BuilderBase {
        &mut self.base
    }

    fn build(&self) -> Result<Entity, CadError> {
        let position = required(self.position, "position")?;
        self.base.finish(Shape::Point(Point { position }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LineBuilder {
    base: BuilderBase,
    start: Option<Coordinate>,
    end: Option<Coordinate>,
}

impl LineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entity(entity: &Entity) -> Result<Self, CadError> {
        match entity.shape() {
            Shape::Line(line) => Ok(Self {
                base: BuilderBase::from_entity(entity),
                start: Some(line.start),
                end: Some(line.end),
            }),
            _ => Err(wrong_kind("line", entity)),
        }
    }

    pub fn set_start(mut self, start: Coordinate) -> Self {
        self.start = Some(start);
        self
    }

    pub fn set_end(mut self, end: Coordinate) -> Self {
        self.end = Some(end);
        self
    }

    #[inline]
    pub fn start(&self) -> Option<Coordinate> {
        self.start
    }

    #[inline]
    pub fn end(&self) -> Option<Coordinate> {
        self.end
    }
}

impl EntityBuilder for LineBuilder {
    fn base(&self) -> &BuilderBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BuilderBase {
        &mut self.base
    }

    fn build(&self) -> Result<Entity, CadError> {
        let start = required(self.start, "start")?;
        let end = required(self.end, "end")?;
        self.base.finish(Shape::Line(Line { start, end }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_requires_both_endpoints() {
        let builder = LineBuilder::new()
            .set_layer("0")
            .set_start(Coordinate::new(0.0, 0.0));
        assert_eq!(builder.build().unwrap_err(), CadError::MissingField("end"));
    }

    #[test]
    fn coincident_endpoints_are_rejected() {
        let point = Coordinate::new(3.0, 3.0);
        let builder = LineBuilder::new().set_layer("0").set_start(point).set_end(point);
        assert!(matches!(builder.build(), Err(CadError::InvalidGeometry(_))));
    }

    #[test]
    fn non_finite_position_is_rejected() {
        let builder = PointBuilder::new()
            .set_layer("0")
            .set_position(Coordinate::new(f64::NAN, 0.0));
        assert!(matches!(builder.build(), Err(CadError::InvalidGeometry(_))));
    }

    #[test]
    fn from_entity_checks_kind_and_keeps_id() {
        let line = LineBuilder::new()
            .set_layer("0")
            .set_start(Coordinate::new(0.0, 0.0))
            .set_end(Coordinate::new(2.0, 0.0))
            .build()
            .unwrap();
        let rebuilt = LineBuilder::from_entity(&line)
            .unwrap()
            .set_end(Coordinate::new(5.0, 0.0))
            .build()
            .unwrap();
        assert_eq!(rebuilt.id(), line.id());

        assert_eq!(
            PointBuilder::from_entity(&line).unwrap_err(),
            CadError::InvalidEntityKind {
                expected: "point",
                found: "line"
            }
        );
    }
}
