//! 撤销/重做引擎。
//!
//! 每个 [`DocumentOperation`] 在应用时按值捕获被改动的数据并返回自身的逆操作，
//! 因此撤销记录不依赖任何外部状态。一条记录内的操作作为整体原子地应用。

use std::collections::VecDeque;

use tracing::{debug, error};
use zcad_core::entity::{EntityId, EntityRef};
use zcad_core::meta::{Block, Layer};

use crate::document::Document;
use crate::errors::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOperation {
    /// 插入实体；`index` 为空时追加到绘制顺序末尾，`selected` 时同时加入选中集。
    AddEntity {
        entity: EntityRef,
        index: Option<usize>,
        selected: bool,
    },
    RemoveEntity {
        id: EntityId,
    },
    /// 以同 ID 的新版本替换。
    ReplaceEntity {
        entity: EntityRef,
    },
    AddLayer(Layer),
    RemoveLayer(String),
    /// 按名称替换图层属性。
    UpdateLayer(Layer),
    AddBlock(Block),
    RemoveBlock(String),
}

impl DocumentOperation {
    pub fn add(entity: impl Into<EntityRef>) -> Self {
        DocumentOperation::AddEntity {
            entity: entity.into(),
            index: None,
            selected: false,
        }
    }

    pub fn remove(id: EntityId) -> Self {
        DocumentOperation::RemoveEntity { id }
    }

    pub fn replace(entity: impl Into<EntityRef>) -> Self {
        DocumentOperation::ReplaceEntity {
            entity: entity.into(),
        }
    }

    /// 应用到文档，返回能精确撤销本次修改的逆操作。
    pub fn apply(&self, document: &mut Document) -> Result<DocumentOperation, EngineError> {
        let inverse = match self {
            DocumentOperation::AddEntity {
                entity,
                index,
                selected,
            } => {
                let position = index.unwrap_or(document.len());
                let id = document.insert_entity(position, EntityRef::clone(entity))?;
                if *selected {
                    document.select(id)?;
                }
                DocumentOperation::RemoveEntity { id }
            }
            DocumentOperation::RemoveEntity { id } => {
                let selected = document.is_selected(*id);
                let (index, entity) = document.remove_entity(*id)?;
                DocumentOperation::AddEntity {
                    entity,
                    index: Some(index),
                    selected,
                }
            }
            DocumentOperation::ReplaceEntity { entity } => {
                let previous = document.replace_entity(entity.id(), EntityRef::clone(entity))?;
                DocumentOperation::ReplaceEntity { entity: previous }
            }
            DocumentOperation::AddLayer(layer) => {
                document.add_layer(layer.clone())?;
                DocumentOperation::RemoveLayer(layer.name.clone())
            }
            DocumentOperation::RemoveLayer(name) => {
                DocumentOperation::AddLayer(document.remove_layer(name)?)
            }
            DocumentOperation::UpdateLayer(layer) => {
                DocumentOperation::UpdateLayer(document.update_layer(layer.clone())?)
            }
            DocumentOperation::AddBlock(block) => {
                document.add_block(block.clone())?;
                DocumentOperation::RemoveBlock(block.name.clone())
            }
            DocumentOperation::RemoveBlock(name) => {
                DocumentOperation::AddBlock(document.remove_block(name)?)
            }
        };
        Ok(inverse)
    }
}

/// 一次用户可见的修改：标签加上按顺序执行的操作。
#[derive(Debug, Clone, PartialEq)]
pub struct UndoRecord {
    pub label: String,
    pub operations: Vec<DocumentOperation>,
}

impl UndoRecord {
    pub fn new(label: impl Into<String>, operations: Vec<DocumentOperation>) -> Self {
        Self {
            label: label.into(),
            operations,
        }
    }
}

/// 撤销与重做栈（后进先出），可选的历史深度上限。
#[derive(Debug, Default)]
pub struct UndoManager {
    history: VecDeque<UndoRecord>,
    redo: Vec<UndoRecord>,
    limit: Option<usize>,
}

impl UndoManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// `limit` 为 0 时视为不限制。
    pub fn with_limit(limit: usize) -> Self {
        let mut manager = Self::new();
        manager.set_limit(Some(limit));
        manager
    }

    #[inline]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit.filter(|value| *value > 0);
        self.enforce_limit();
    }

    fn enforce_limit(&mut self) {
        if let Some(limit) = self.limit {
            while self.history.len() > limit {
                if let Some(dropped) = self.history.pop_front() {
                    debug!(label = %dropped.label, "历史超出上限，丢弃最早的记录");
                }
            }
        }
    }

    /// 执行记录并压入历史，同时清空重做栈。失败时文档保持原状。
    pub fn execute(&mut self, document: &mut Document, record: UndoRecord) -> Result<(), EngineError> {
        let reversal = document.apply(&record.operations)?;
        debug!(label = %record.label, operations = record.operations.len(), "已执行撤销记录");
        self.history.push_back(UndoRecord::new(record.label, reversal));
        self.redo.clear();
        self.enforce_limit();
        Ok(())
    }

    /// 撤销最近一条记录，返回其标签。
    pub fn undo(&mut self, document: &mut Document) -> Result<String, EngineError> {
        let record = self.history.pop_back().ok_or(EngineError::UndoHistoryEmpty)?;
        let replay = Self::replay(document, &record, "undo")?;
        debug!(label = %record.label, "已撤销");
        self.redo.push(UndoRecord::new(record.label.clone(), replay));
        Ok(record.label)
    }

    /// 重做最近撤销的记录，返回其标签。
    pub fn redo(&mut self, document: &mut Document) -> Result<String, EngineError> {
        let record = self.redo.pop().ok_or(EngineError::RedoHistoryEmpty)?;
        let replay = Self::replay(document, &record, "redo")?;
        debug!(label = %record.label, "已重做");
        self.history.push_back(UndoRecord::new(record.label.clone(), replay));
        self.enforce_limit();
        Ok(record.label)
    }

    /// 历史与文档不一致属于致命错误：记录被丢弃，文档保持应用前的状态。
    fn replay(
        document: &mut Document,
        record: &UndoRecord,
        action: &str,
    ) -> Result<Vec<DocumentOperation>, EngineError> {
        document.apply(&record.operations).map_err(|err| {
            error!(label = %record.label, action, error = %err, "撤销历史与文档不一致");
            EngineError::Consistency(format!("{action} of `{}` failed: {err}", record.label))
        })
    }

    /// 清空撤销与重做栈，文档不受影响。
    pub fn clear_undoable_stack(&mut self) {
        self.history.clear();
        self.redo.clear();
    }

    #[inline]
    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    #[inline]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    #[inline]
    pub fn undo_len(&self) -> usize {
        self.history.len()
    }

    #[inline]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.history.back().map(|record| record.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo.last().map(|record| record.label.as_str())
    }
}
