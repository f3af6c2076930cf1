//! 文档模型：按绘制顺序存放实体，维护选中集、图层/块注册表与变更通知。

use std::collections::BTreeSet;

use crossbeam::channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use zcad_core::entity::{Entity, EntityId, EntityRef};
use zcad_core::geometry::{Area, Coordinate, DEFAULT_TOLERANCE};
use zcad_core::meta::{Block, Layer, MetaInfo, MetaRegistry};

use crate::errors::EngineError;
use crate::undo::DocumentOperation;

/// 推送给展示层的变更通知。
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    EntitiesAdded(Vec<EntityId>),
    EntitiesRemoved(Vec<EntityId>),
    EntitiesModified(Vec<EntityId>),
    /// 变更后的完整选中集。
    SelectionChanged(Vec<EntityId>),
    LayersChanged(Vec<String>),
    BlocksChanged(Vec<String>),
}

/// 供外部序列化器使用的文档快照，实体携带稳定 ID。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub tolerance: f64,
    pub layers: Vec<Layer>,
    pub blocks: Vec<Block>,
    pub entities: Vec<Entity>,
}

#[derive(Debug)]
pub struct Document {
    entities: Vec<EntityRef>,
    selection: BTreeSet<EntityId>,
    registry: MetaRegistry,
    tolerance: f64,
    subscribers: Vec<Sender<DocumentEvent>>,
    /// 批量应用期间暂存的事件，提交后统一发送。
    pending: Option<Vec<DocumentEvent>>,
}

impl Document {
    pub fn new() -> Self {
        Self::with_registry(MetaRegistry::new())
    }

    pub fn with_registry(registry: MetaRegistry) -> Self {
        Self {
            entities: Vec::new(),
            selection: BTreeSet::new(),
            registry,
            tolerance: DEFAULT_TOLERANCE,
            subscribers: Vec::new(),
            pending: None,
        }
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// 设置几何容差，非正数或非有限值被忽略。
    pub fn set_tolerance(&mut self, tolerance: f64) {
        if tolerance.is_finite() && tolerance > 0.0 {
            self.tolerance = tolerance;
        } else {
            warn!(tolerance, "忽略非法的几何容差");
        }
    }

    #[inline]
    pub fn registry(&self) -> &MetaRegistry {
        &self.registry
    }

    #[inline]
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.registry.layer(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// 按绘制顺序遍历实体。
    pub fn entities(&self) -> impl Iterator<Item = &EntityRef> {
        self.entities.iter()
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityRef> {
        self.entities.iter().find(|entity| entity.id() == id)
    }

    /// 实体在绘制顺序中的位置。
    pub fn index_of(&self, id: EntityId) -> Option<usize> {
        self.entities.iter().position(|entity| entity.id() == id)
    }

    /// 订阅变更通知。接收端被丢弃后自动退订。
    pub fn subscribe(&mut self) -> Receiver<DocumentEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.push(sender);
        receiver
    }

    fn emit(&mut self, event: DocumentEvent) {
        if let Some(pending) = &mut self.pending {
            pending.push(event);
            return;
        }
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn check_references(&self, entity: &Entity) -> Result<(), EngineError> {
        if !self.registry.contains_layer(entity.layer()) {
            return Err(EngineError::LayerNotFound(entity.layer().to_string()));
        }
        if let Some(block) = entity.block() {
            if !self.registry.contains_block(block) {
                return Err(EngineError::BlockNotFound(block.to_string()));
            }
        }
        Ok(())
    }

    /// 在绘制顺序末尾追加实体。
    pub fn add_entity(&mut self, entity: impl Into<EntityRef>) -> Result<EntityId, EngineError> {
        let index = self.entities.len();
        self.insert_entity(index, entity)
    }

    /// 在指定绘制位置插入实体，超出范围时追加到末尾。
    pub fn insert_entity(
        &mut self,
        index: usize,
        entity: impl Into<EntityRef>,
    ) -> Result<EntityId, EngineError> {
        let entity = entity.into();
        let id = entity.id();
        if self.entity(id).is_some() {
            warn!(id = id.get(), "拒绝重复的实体 ID");
            return Err(EngineError::DuplicateEntity(id.get()));
        }
        self.check_references(&entity)?;

        let index = index.min(self.entities.len());
        self.entities.insert(index, entity);
        debug!(id = id.get(), index, "已添加实体");
        self.emit(DocumentEvent::EntitiesAdded(vec![id]));
        Ok(id)
    }

    /// 移除实体，同时从选中集中剔除。返回被移除的实体及其原位置。
    pub fn remove_entity(&mut self, id: EntityId) -> Result<(usize, EntityRef), EngineError> {
        let index = self
            .index_of(id)
            .ok_or(EngineError::EntityNotFound(id.get()))?;
        let entity = self.entities.remove(index);
        let was_selected = self.selection.remove(&id);
        debug!(id = id.get(), index, "已移除实体");

        self.emit(DocumentEvent::EntitiesRemoved(vec![id]));
        if was_selected {
            self.emit_selection();
        }
        Ok((index, entity))
    }

    /// 以同 ID 的新版本替换实体，位置与选中状态不变。返回旧版本。
    pub fn replace_entity(
        &mut self,
        id: EntityId,
        entity: impl Into<EntityRef>,
    ) -> Result<EntityRef, EngineError> {
        let entity = entity.into();
        if entity.id() != id {
            return Err(EngineError::IdentityMismatch {
                expected: id.get(),
                found: entity.id().get(),
            });
        }
        let index = self
            .index_of(id)
            .ok_or(EngineError::EntityNotFound(id.get()))?;
        self.check_references(&entity)?;

        let previous = std::mem::replace(&mut self.entities[index], entity);
        debug!(id = id.get(), "已替换实体");
        self.emit(DocumentEvent::EntitiesModified(vec![id]));
        Ok(previous)
    }

    pub fn add_layer(&mut self, layer: Layer) -> Result<(), EngineError> {
        let name = layer.name.clone();
        self.registry.insert_layer(layer)?;
        debug!(layer = %name, "已添加图层");
        self.emit(DocumentEvent::LayersChanged(vec![name]));
        Ok(())
    }

    /// 修改图层属性，所有引用该图层的实体随之可见。返回旧值。
    pub fn update_layer(&mut self, layer: Layer) -> Result<Layer, EngineError> {
        let name = layer.name.clone();
        let previous = self
            .registry
            .replace_layer(layer)
            .map_err(|_| EngineError::LayerNotFound(name.clone()))?;
        debug!(layer = %name, "已更新图层");
        self.emit(DocumentEvent::LayersChanged(vec![name]));
        Ok(previous)
    }

    pub fn remove_layer(&mut self, name: &str) -> Result<Layer, EngineError> {
        if !self.registry.contains_layer(name) {
            return Err(EngineError::LayerNotFound(name.to_string()));
        }
        if self.entities.iter().any(|entity| entity.layer() == name) {
            warn!(layer = name, "图层仍被实体引用");
            return Err(EngineError::LayerInUse(name.to_string()));
        }
        let layer = self.registry.remove_layer(name)?;
        debug!(layer = name, "已移除图层");
        self.emit(DocumentEvent::LayersChanged(vec![name.to_string()]));
        Ok(layer)
    }

    pub fn add_block(&mut self, block: Block) -> Result<(), EngineError> {
        let name = block.name.clone();
        self.registry.insert_block(block)?;
        debug!(block = %name, "已添加块");
        self.emit(DocumentEvent::BlocksChanged(vec![name]));
        Ok(())
    }

    pub fn remove_block(&mut self, name: &str) -> Result<Block, EngineError> {
        if !self.registry.contains_block(name) {
            return Err(EngineError::BlockNotFound(name.to_string()));
        }
        if self.entities.iter().any(|entity| entity.block() == Some(name)) {
            warn!(block = name, "块仍被实体引用");
            return Err(EngineError::BlockInUse(name.to_string()));
        }
        let block = self.registry.remove_block(name)?;
        debug!(block = name, "已移除块");
        self.emit(DocumentEvent::BlocksChanged(vec![name.to_string()]));
        Ok(block)
    }

    /// 以全有或全无的方式应用一批操作。
    ///
    /// 成功时返回撤销这批操作所需的操作序列（逆操作按相反顺序排列）；
    /// 任一操作失败时，已应用的部分被回滚，选中集复原，并返回原始错误。
    /// 事件在整批提交后才发送，失败的批次不产生任何事件。
    pub fn apply(
        &mut self,
        operations: &[DocumentOperation],
    ) -> Result<Vec<DocumentOperation>, EngineError> {
        let selection = self.selection.clone();
        let outer = self.pending.replace(Vec::new());
        let result = self.apply_all(operations);
        let events = std::mem::replace(&mut self.pending, outer).unwrap_or_default();
        match result {
            Ok(mut rollback) => {
                for event in events {
                    self.emit(event);
                }
                rollback.reverse();
                Ok(rollback)
            }
            Err(err) => {
                self.selection = selection;
                Err(err)
            }
        }
    }

    fn apply_all(
        &mut self,
        operations: &[DocumentOperation],
    ) -> Result<Vec<DocumentOperation>, EngineError> {
        let mut rollback = Vec::with_capacity(operations.len());
        for operation in operations {
            match operation.apply(self) {
                Ok(inverse) => rollback.push(inverse),
                Err(err) => {
                    warn!(error = %err, "操作失败，回滚已应用的部分");
                    for inverse in rollback.iter().rev() {
                        if let Err(rollback_err) = inverse.apply(self) {
                            error!(error = %rollback_err, "回滚失败，文档状态不一致");
                            return Err(EngineError::Consistency(format!(
                                "rollback after `{err}` failed: {rollback_err}"
                            )));
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(rollback)
    }

    fn emit_selection(&mut self) {
        let ids = self.selection.iter().copied().collect();
        self.emit(DocumentEvent::SelectionChanged(ids));
    }

    /// 当前选中的实体 ID（升序）。
    pub fn selection(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.selection.iter().copied()
    }

    #[inline]
    pub fn selection_len(&self) -> usize {
        self.selection.len()
    }

    #[inline]
    pub fn is_selected(&self, id: EntityId) -> bool {
        self.selection.contains(&id)
    }

    /// 整体替换选中集。任一 ID 不存在时返回错误且选中集不变。
    pub fn set_selection(
        &mut self,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> Result<(), EngineError> {
        let mut next = BTreeSet::new();
        for id in ids {
            if self.entity(id).is_none() {
                return Err(EngineError::EntityNotFound(id.get()));
            }
            next.insert(id);
        }
        if next != self.selection {
            self.selection = next;
            self.emit_selection();
        }
        Ok(())
    }

    pub fn select(&mut self, id: EntityId) -> Result<(), EngineError> {
        if self.entity(id).is_none() {
            return Err(EngineError::EntityNotFound(id.get()));
        }
        if self.selection.insert(id) {
            self.emit_selection();
        }
        Ok(())
    }

    /// 取消选中，返回之前是否处于选中状态。
    pub fn deselect(&mut self, id: EntityId) -> bool {
        let removed = self.selection.remove(&id);
        if removed {
            self.emit_selection();
        }
        removed
    }

    pub fn clear_selection(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.emit_selection();
        }
    }

    /// 选中实体的合并包围盒。
    pub fn selection_bounds(&self) -> Option<Area> {
        let mut bounds = Area::empty();
        for id in &self.selection {
            if let Some(entity) = self.entity(*id) {
                bounds.include_area(&entity.bounding_box());
            }
        }
        (!bounds.is_empty()).then_some(bounds)
    }

    /// 所有实体的合并包围盒。
    pub fn bounds(&self) -> Option<Area> {
        let mut bounds = Area::empty();
        for entity in &self.entities {
            bounds.include_area(&entity.bounding_box());
        }
        (!bounds.is_empty()).then_some(bounds)
    }

    /// 实体所在图层是否可见且未冻结。
    pub fn is_interactive(&self, entity: &Entity) -> bool {
        self.registry
            .layer(entity.layer())
            .is_some_and(Layer::is_interactive)
    }

    /// 完全落在范围内的实体（绘制顺序）。
    pub fn entities_in_area(&self, area: &Area) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|entity| self.is_interactive(entity))
            .filter(|entity| area.contains_area(&entity.bounding_box(), self.tolerance))
            .map(|entity| entity.id())
            .collect()
    }

    /// 包围盒与范围相交的实体（绘制顺序）。
    pub fn entities_crossing_area(&self, area: &Area) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|entity| self.is_interactive(entity))
            .filter(|entity| area.intersects(&entity.bounding_box(), self.tolerance))
            .map(|entity| entity.id())
            .collect()
    }

    /// 命中测试：容差内距离最近的实体，距离相同时取绘制顺序靠前者。
    pub fn entity_at(&self, point: Coordinate, tolerance: f64) -> Option<EntityId> {
        let mut best: Option<(f64, EntityId)> = None;
        for entity in &self.entities {
            if !self.is_interactive(entity) {
                continue;
            }
            if !entity.bounding_box().inflate(tolerance).contains_point(point, 0.0) {
                continue;
            }
            let distance = entity.distance_to(point);
            if distance > tolerance {
                continue;
            }
            if best.is_none_or(|(current, _)| distance < current) {
                best = Some((distance, entity.id()));
            }
        }
        best.map(|(_, id)| id)
    }

    /// 实体的最终样式：实体自身的属性覆盖图层默认值。
    pub fn effective_meta(&self, entity: &Entity) -> MetaInfo {
        let base = self
            .registry
            .layer(entity.layer())
            .map(|layer| layer.meta.clone())
            .unwrap_or_default();
        match entity.meta() {
            Some(own) => own.merged_over(&base),
            None => base,
        }
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            tolerance: self.tolerance,
            layers: self.registry.layers().cloned().collect(),
            blocks: self.registry.blocks().cloned().collect(),
            entities: self
                .entities
                .iter()
                .map(|entity| Entity::clone(entity))
                .collect(),
        }
    }

    /// 由快照重建文档，并保证之后分配的 ID 不与快照中的冲突。
    pub fn from_snapshot(snapshot: DocumentSnapshot) -> Result<Self, EngineError> {
        let mut registry = MetaRegistry::empty();
        for layer in snapshot.layers {
            registry.insert_layer(layer)?;
        }
        for block in snapshot.blocks {
            registry.insert_block(block)?;
        }

        let mut document = Self::with_registry(registry);
        document.set_tolerance(snapshot.tolerance);
        for entity in snapshot.entities {
            entity.shape().validate()?;
            EntityId::reserve(entity.id().get());
            document.add_entity(entity)?;
        }
        Ok(document)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use zcad_core::builder::{CircleBuilder, EntityBuilder, LineBuilder, TextBuilder};
    use zcad_core::errors::CadError;
    use zcad_core::meta::{Color, MetaValue};

    use super::*;

    fn circle(layer: &str, x: f64, y: f64, r: f64) -> Entity {
        CircleBuilder::new()
            .set_layer(layer)
            .set_center(Coordinate::new(x, y))
            .set_radius(r)
            .build()
            .unwrap()
    }

    fn line(layer: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Entity {
        LineBuilder::new()
            .set_layer(layer)
            .set_start(Coordinate::new(x0, y0))
            .set_end(Coordinate::new(x1, y1))
            .build()
            .unwrap()
    }

    fn drain(receiver: &Receiver<DocumentEvent>) -> Vec<DocumentEvent> {
        receiver.try_iter().collect()
    }

    #[test]
    fn entity_at_prefers_nearest_hit() {
        let mut document = Document::new();
        let first = document.add_entity(circle("0", 0.0, 0.0, 5.0)).unwrap();
        document.add_entity(circle("0", 10.0, 0.0, 5.0)).unwrap();

        assert_eq!(document.entity_at(Coordinate::new(0.0, 5.0), 0.1), Some(first));
        assert_eq!(document.entity_at(Coordinate::new(5.0, 5.0), 0.1), None);
    }

    #[test]
    fn entity_at_breaks_ties_by_paint_order() {
        let mut document = Document::new();
        let first = document.add_entity(circle("0", 0.0, 0.0, 5.0)).unwrap();
        document.add_entity(circle("0", 10.0, 0.0, 5.0)).unwrap();
        // 两圆在 (5, 0) 相切
        assert_eq!(document.entity_at(Coordinate::new(5.0, 0.0), 0.1), Some(first));
    }

    #[test]
    fn hidden_layers_are_not_hit() {
        let mut document = Document::new();
        let mut hidden = Layer::new("HIDDEN");
        hidden.is_visible = false;
        document.add_layer(hidden).unwrap();
        document.add_entity(circle("HIDDEN", 0.0, 0.0, 5.0)).unwrap();

        assert_eq!(document.entity_at(Coordinate::new(0.0, 5.0), 0.1), None);
        let everything = Area::new(Coordinate::new(-100.0, -100.0), Coordinate::new(100.0, 100.0));
        assert!(document.entities_crossing_area(&everything).is_empty());
    }

    #[test]
    fn add_requires_known_layer_and_unique_id() {
        let mut document = Document::new();
        let err = document.add_entity(circle("MISSING", 0.0, 0.0, 1.0)).unwrap_err();
        assert_eq!(err, EngineError::LayerNotFound("MISSING".into()));

        let entity = circle("0", 0.0, 0.0, 1.0);
        document.add_entity(entity.clone()).unwrap();
        let err = document.add_entity(entity.clone()).unwrap_err();
        assert_eq!(err, EngineError::DuplicateEntity(entity.id().get()));
        assert_eq!(document.len(), 1);
    }

    #[test]
    fn remove_prunes_selection_and_notifies() {
        let mut document = Document::new();
        let a = document.add_entity(circle("0", 0.0, 0.0, 1.0)).unwrap();
        let b = document.add_entity(circle("0", 5.0, 0.0, 1.0)).unwrap();
        document.set_selection([a, b]).unwrap();

        let events = document.subscribe();
        let (index, removed) = document.remove_entity(a).unwrap();
        assert_eq!(index, 0);
        assert_eq!(removed.id(), a);
        assert!(!document.is_selected(a));
        assert_eq!(document.selection().collect::<Vec<_>>(), vec![b]);
        assert_eq!(
            drain(&events),
            vec![
                DocumentEvent::EntitiesRemoved(vec![a]),
                DocumentEvent::SelectionChanged(vec![b]),
            ]
        );
    }

    #[test]
    fn set_selection_is_all_or_nothing() {
        let mut document = Document::new();
        let a = document.add_entity(circle("0", 0.0, 0.0, 1.0)).unwrap();
        document.select(a).unwrap();

        let missing = EntityId::new(u64::MAX);
        let err = document.set_selection([a, missing]).unwrap_err();
        assert_eq!(err, EngineError::EntityNotFound(u64::MAX));
        assert_eq!(document.selection_len(), 1);
    }

    #[test]
    fn replace_keeps_identity_and_position() {
        let mut document = Document::new();
        let original = circle("0", 0.0, 0.0, 1.0);
        let id = document.add_entity(original.clone()).unwrap();
        document.add_entity(circle("0", 9.0, 9.0, 1.0)).unwrap();

        let moved = original.move_by(Coordinate::new(3.0, 0.0));
        let previous = document.replace_entity(id, moved).unwrap();
        assert_eq!(*previous, original);
        assert_eq!(document.index_of(id), Some(0));

        let stranger = circle("0", 1.0, 1.0, 1.0);
        assert!(matches!(
            document.replace_entity(id, stranger),
            Err(EngineError::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn layer_in_use_cannot_be_removed() {
        let mut document = Document::new();
        document.add_layer(Layer::new("GEOM")).unwrap();
        let id = document.add_entity(line("GEOM", 0.0, 0.0, 1.0, 0.0)).unwrap();

        assert_eq!(
            document.remove_layer("GEOM").unwrap_err(),
            EngineError::LayerInUse("GEOM".into())
        );
        document.remove_entity(id).unwrap();
        assert!(document.remove_layer("GEOM").is_ok());
        assert_eq!(
            document.add_layer(Layer::new("0")).unwrap_err(),
            EngineError::Cad(CadError::DuplicateName("0".into()))
        );
    }

    #[test]
    fn block_references_are_checked() {
        let mut document = Document::new();
        let entity = line("0", 0.0, 0.0, 1.0, 0.0).with_block(Some("DOOR".into()));
        assert_eq!(
            document.add_entity(entity.clone()).unwrap_err(),
            EngineError::BlockNotFound("DOOR".into())
        );
        document
            .add_block(Block::new("DOOR", Coordinate::ORIGIN))
            .unwrap();
        document.add_entity(entity).unwrap();
        assert_eq!(
            document.remove_block("DOOR").unwrap_err(),
            EngineError::BlockInUse("DOOR".into())
        );
    }

    #[test]
    fn area_queries_distinguish_inside_and_crossing() {
        let mut document = Document::new();
        let inside = document.add_entity(line("0", 1.0, 1.0, 2.0, 2.0)).unwrap();
        let crossing = document.add_entity(line("0", 2.0, 2.0, 8.0, 2.0)).unwrap();
        document.add_entity(circle("0", 50.0, 50.0, 1.0)).unwrap();

        let window = Area::new(Coordinate::new(0.0, 0.0), Coordinate::new(5.0, 5.0));
        assert_eq!(document.entities_in_area(&window), vec![inside]);
        assert_eq!(document.entities_crossing_area(&window), vec![inside, crossing]);
    }

    #[test]
    fn layer_style_is_visible_through_entities() {
        let mut document = Document::new();
        let red = Layer::new("RED").with_meta(
            zcad_core::meta::MetaInfo::new().with(MetaValue::Color(Color::rgb(255, 0, 0))),
        );
        document.add_layer(red).unwrap();
        let plain = line("RED", 0.0, 0.0, 1.0, 0.0);
        let styled = plain.with_meta(Some(Arc::new(
            MetaInfo::new().with(MetaValue::Color(Color::rgb(0, 0, 255))),
        )));

        assert_eq!(document.effective_meta(&plain).color(), Some(Color::rgb(255, 0, 0)));
        assert_eq!(document.effective_meta(&styled).color(), Some(Color::rgb(0, 0, 255)));

        let mut blue = document.layer("RED").unwrap().clone();
        blue.meta = MetaInfo::new().with(MetaValue::Color(Color::rgb(0, 255, 0)));
        document.update_layer(blue).unwrap();
        assert_eq!(document.effective_meta(&plain).color(), Some(Color::rgb(0, 255, 0)));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut document = Document::new();
        let kept = document.subscribe();
        drop(document.subscribe());
        document.add_entity(circle("0", 0.0, 0.0, 1.0)).unwrap();
        assert_eq!(document.subscribers.len(), 1);
        assert_eq!(drain(&kept).len(), 1);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut document = Document::new();
        document.add_layer(Layer::new("ANNOT")).unwrap();
        document.add_entity(circle("0", 1.0, 2.0, 3.0)).unwrap();
        let text = TextBuilder::new()
            .set_layer("ANNOT")
            .set_insertion_point(Coordinate::new(0.0, 0.0))
            .set_text_value("标注")
            .set_height(2.5)
            .build()
            .unwrap();
        document.add_entity(text).unwrap();

        let snapshot = document.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: DocumentSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);

        let rebuilt = Document::from_snapshot(restored).unwrap();
        assert_eq!(rebuilt.snapshot(), snapshot);
        let max_id = snapshot.entities.iter().map(|e| e.id().get()).max().unwrap();
        assert!(EntityId::allocate().get() > max_id);
    }

    #[test]
    fn failed_batch_leaves_document_untouched() {
        let mut document = Document::new();
        let keep = document.add_entity(circle("0", 0.0, 0.0, 1.0)).unwrap();
        let before = document.snapshot();

        let operations = vec![
            DocumentOperation::add(circle("0", 3.0, 3.0, 1.0)),
            DocumentOperation::RemoveEntity { id: keep },
            DocumentOperation::RemoveEntity { id: EntityId::new(u64::MAX) },
        ];
        let err = document.apply(&operations).unwrap_err();
        assert_eq!(err, EngineError::EntityNotFound(u64::MAX));
        assert_eq!(document.snapshot(), before);
    }

    #[test]
    fn failed_batch_keeps_selection_and_stays_silent() {
        let mut document = Document::new();
        let keep = document.add_entity(circle("0", 0.0, 0.0, 1.0)).unwrap();
        let other = document.add_entity(circle("0", 5.0, 0.0, 1.0)).unwrap();
        document.set_selection([keep, other]).unwrap();
        let events = document.subscribe();

        let operations = vec![
            DocumentOperation::remove(keep),
            DocumentOperation::remove(EntityId::new(u64::MAX)),
        ];
        let err = document.apply(&operations).unwrap_err();
        assert_eq!(err, EngineError::EntityNotFound(u64::MAX));
        assert_eq!(document.index_of(keep), Some(0));
        assert!(document.is_selected(keep));
        assert!(document.is_selected(other));
        assert_eq!(events.try_iter().count(), 0);
    }

    #[test]
    fn committed_batch_emits_after_apply() {
        let mut document = Document::new();
        let events = document.subscribe();
        let entity = circle("0", 0.0, 0.0, 1.0);
        let id = entity.id();
        document.apply(&[DocumentOperation::add(entity)]).unwrap();
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![DocumentEvent::EntitiesAdded(vec![id])]
        );
    }

    #[test]
    fn undoing_removal_restores_selection() {
        let mut document = Document::new();
        let id = document.add_entity(circle("0", 0.0, 0.0, 1.0)).unwrap();
        document.select(id).unwrap();

        let undo = document.apply(&[DocumentOperation::remove(id)]).unwrap();
        assert!(!document.is_selected(id));
        document.apply(&undo).unwrap();
        assert_eq!(document.index_of(id), Some(0));
        assert!(document.is_selected(id));
    }
}
