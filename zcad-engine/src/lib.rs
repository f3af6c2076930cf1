//! 文档、撤销重做、捕捉查询与命令总线。

pub mod command;
pub mod document;
pub mod snap;
pub mod undo;

pub mod errors {
    use thiserror::Error;
    use zcad_core::errors::CadError;

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum EngineError {
        #[error(transparent)]
        Cad(#[from] CadError),
        #[error("entity with id {0} not found")]
        EntityNotFound(u64),
        #[error("entity with id {0} already exists")]
        DuplicateEntity(u64),
        #[error("replacement for entity {expected} carries id {found}")]
        IdentityMismatch { expected: u64, found: u64 },
        #[error("layer `{0}` not found")]
        LayerNotFound(String),
        #[error("layer `{0}` is still referenced by entities")]
        LayerInUse(String),
        #[error("block `{0}` not found")]
        BlockNotFound(String),
        #[error("block `{0}` is still referenced by entities")]
        BlockInUse(String),
        #[error("nothing to undo")]
        UndoHistoryEmpty,
        #[error("nothing to redo")]
        RedoHistoryEmpty,
        #[error("undo history is inconsistent with the document: {0}")]
        Consistency(String),
        #[error("unknown command `{0}`")]
        UnknownCommand(String),
        #[error("command `{command}` requires argument `{argument}`")]
        MissingArgument { command: String, argument: String },
        #[error("invalid value `{value}` for argument `{argument}`")]
        InvalidArgument { argument: String, value: String },
        #[error("selection is empty")]
        EmptySelection,
    }
}

pub mod scene {
    use tracing::debug;
    use zcad_core::meta::DEFAULT_LAYER;

    use crate::document::Document;
    use crate::errors::EngineError;
    use crate::snap::{SnapEngine, SnapSettings};
    use crate::undo::{UndoManager, UndoRecord};

    /// 引擎层的会话状态：文档、撤销历史、捕捉引擎与当前图层。
    #[derive(Debug)]
    pub struct Scene {
        document: Document,
        history: UndoManager,
        snap: SnapEngine,
        current_layer: String,
    }

    impl Scene {
        pub fn new() -> Self {
            Self::with_document(Document::new())
        }

        /// 使用现有文档初始化场景，历史为空。
        pub fn with_document(document: Document) -> Self {
            Self {
                document,
                history: UndoManager::new(),
                snap: SnapEngine::default(),
                current_layer: DEFAULT_LAYER.to_string(),
            }
        }

        /// 按配置调整容差、捕捉设置与历史深度。
        pub fn configure(&mut self, tolerance: f64, snap: SnapSettings, history_limit: Option<usize>) {
            self.document.set_tolerance(tolerance);
            self.snap.set_settings(snap);
            self.history.set_limit(history_limit);
            debug!(tolerance, ?history_limit, "场景配置已更新");
        }

        /// 替换当前文档，并丢弃与旧文档相关的历史。
        pub fn load_document(&mut self, document: Document) {
            self.document = document;
            self.history.clear_undoable_stack();
            self.ensure_current_layer();
        }

        /// 当前图层被撤销或重做移除时退回默认图层。
        fn ensure_current_layer(&mut self) {
            if !self.document.registry().contains_layer(&self.current_layer) {
                debug!(layer = %self.current_layer, "当前图层已不存在，退回默认图层");
                self.current_layer = DEFAULT_LAYER.to_string();
            }
        }

        #[inline]
        pub fn document(&self) -> &Document {
            &self.document
        }

        /// 直接访问文档。绕过撤销历史的修改会使已有记录失效，调用方需自行清空历史。
        #[inline]
        pub fn document_mut(&mut self) -> &mut Document {
            &mut self.document
        }

        #[inline]
        pub fn history(&self) -> &UndoManager {
            &self.history
        }

        #[inline]
        pub fn snap(&self) -> &SnapEngine {
            &self.snap
        }

        #[inline]
        pub fn snap_mut(&mut self) -> &mut SnapEngine {
            &mut self.snap
        }

        #[inline]
        pub fn current_layer(&self) -> &str {
            &self.current_layer
        }

        /// 设置新建实体默认使用的图层。
        pub fn set_current_layer(&mut self, name: &str) -> Result<(), EngineError> {
            if !self.document.registry().contains_layer(name) {
                return Err(EngineError::LayerNotFound(name.to_string()));
            }
            self.current_layer = name.to_string();
            Ok(())
        }

        /// 以撤销记录的形式修改文档。
        pub fn execute(&mut self, record: UndoRecord) -> Result<(), EngineError> {
            self.history.execute(&mut self.document, record)
        }

        pub fn undo(&mut self) -> Result<String, EngineError> {
            let label = self.history.undo(&mut self.document);
            self.ensure_current_layer();
            label
        }

        pub fn redo(&mut self) -> Result<String, EngineError> {
            let label = self.history.redo(&mut self.document);
            self.ensure_current_layer();
            label
        }

        pub fn clear_undoable_stack(&mut self) {
            self.history.clear_undoable_stack();
        }
    }

    impl Default for Scene {
        fn default() -> Self {
            Self::new()
        }
    }

}
