//! 实体构建器。
//!
//! 构建器是可变的暂存对象：通过链式 setter 或约束求解填充字段，
//! `build(&self)` 只读取状态并生成新的不可变实体，失败时不改动构建器，
//! 因此同一个构建器可以修正后重复使用。

mod arc;
mod circle;
mod polyline;
mod simple;
mod text;

pub use arc::ArcBuilder;
pub use circle::{CircleBuilder, Tangency};
pub use polyline::PolylineBuilder;
pub use simple::{LineBuilder, PointBuilder};
pub use text::{DEFAULT_TEXT_STYLE, TextBuilder};

use crate::entity::{Entity, EntityId, Shape};
use crate::errors::CadError;
use crate::meta::MetaInfoRef;

/// 所有构建器共享的实体属性。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuilderBase {
    /// 需要保留的 ID（由 `from_entity` 设置）；为空时构建新 ID。
    pub id: Option<EntityId>,
    pub layer: Option<String>,
    pub meta: Option<MetaInfoRef>,
    pub block: Option<String>,
}

impl BuilderBase {
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            id: Some(entity.id()),
            layer: Some(entity.layer().to_string()),
            meta: entity.meta().cloned(),
            block: entity.block().map(str::to_string),
        }
    }

    /// 校验几何并组装实体。
    pub(crate) fn finish(&self, shape: Shape) -> Result<Entity, CadError> {
        let layer = self.layer.clone().ok_or(CadError::MissingField("layer"))?;
        shape.validate()?;
        Ok(Entity::from_parts(
            self.id.unwrap_or_else(EntityId::allocate),
            layer,
            self.meta.clone(),
            self.block.clone(),
            shape,
        ))
    }
}

/// 构建器公共接口：共享属性的链式设置与纯函数式 `build`。
pub trait EntityBuilder: Sized {
    fn base(&self) -> &BuilderBase;

    fn base_mut(&mut self) -> &mut BuilderBase;

    fn build(&self) -> Result<Entity, CadError>;

    fn set_id(mut self, id: EntityId) -> Self {
        self.base_mut().id = Some(id);
        self
    }

    fn set_layer(mut self, layer: impl Into<String>) -> Self {
        self.base_mut().layer = Some(layer.into());
        self
    }

    fn set_meta_info(mut self, meta: Option<MetaInfoRef>) -> Self {
        self.base_mut().meta = meta;
        self
    }

    fn set_block(mut self, block: Option<String>) -> Self {
        self.base_mut().block = block;
        self
    }
}

pub(crate) fn required<T: Copy>(value: Option<T>, field: &'static str) -> Result<T, CadError> {
    value.ok_or(CadError::MissingField(field))
}

pub(crate) fn wrong_kind(expected: &'static str, entity: &Entity) -> CadError {
    CadError::InvalidEntityKind {
        expected,
        found: entity.kind_name(),
    }
}
