use super::{BuilderBase, EntityBuilder, wrong_kind};
use crate::entity::{Entity, Polyline, PolylineVertex, Shape};
use crate::errors::CadError;
use crate::geometry::Coordinate;

#[derive(Debug, Clone, Default)]
pub struct PolylineBuilder {
    base: BuilderBase,
    vertices: Vec<PolylineVertex>,
    is_closed: bool,
}

impl PolylineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entity(entity: &Entity) -> Result<Self, CadError> {
        match entity.shape() {
            Shape::Polyline(polyline) => Ok(Self {
                base: BuilderBase::from_entity(entity),
                vertices: polyline.vertices.clone(),
                is_closed: polyline.is_closed,
            }),
            _ => Err(wrong_kind("polyline", entity)),
        }
    }

    pub fn add_vertex(self, position: Coordinate) -> Self {
        self.add_vertex_with_bulge(position, 0.0)
    }

    /// 追加顶点，`bulge` 描述从该顶点到下一个顶点的圆弧段。
    pub fn add_vertex_with_bulge(mut self, position: Coordinate, bulge: f64) -> Self {
        self.vertices.push(PolylineVertex::with_bulge(position, bulge));
        self
    }

    pub fn set_closed(mut self, closed: bool) -> Self {
        self.is_closed = closed;
        self
    }

    #[inline]
    pub fn vertices(&self) -> &[PolylineVertex] {
        &self.vertices
    }
}

impl EntityBuilder for PolylineBuilder {
    fn base(&self) -> &BuilderBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BuilderBase {
        &mut self.base
    }

    fn build(&self) -> Result<Entity, CadError> {
        self.base.finish(Shape::Polyline(Polyline {
            vertices: self.vertices.clone(),
            is_closed: self.is_closed,
        }))
    }
}
