//! 元数据：样式（MetaInfo）、图层、块以及负责登记它们的注册表。
//!
//! 图层与块由注册表持有，实体只按名称引用；`MetaInfo` 以 `Arc` 共享，
//! 最后一个引用者释放时一同销毁。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::CadError;
use crate::geometry::Coordinate;

/// 默认图层名称，新建注册表总是包含它。
pub const DEFAULT_LAYER: &str = "0";

/// 共享的样式引用。
pub type MetaInfoRef = Arc<MetaInfo>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    #[inline]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// 解析 `#rrggbb` 或 `rrggbb`。
    pub fn from_hex(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#').unwrap_or(text);
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
        Some(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinePattern {
    Continuous,
    Dashed,
    Dotted,
    DashDot,
    /// 自定义划线段长度序列（正值为实线段，负值为空白）。
    Custom(Vec<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaKey {
    Color,
    LineWidth,
    LinePattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaValue {
    Color(Color),
    LineWidth(f64),
    LinePattern(LinePattern),
}

impl MetaValue {
    #[inline]
    pub fn key(&self) -> MetaKey {
        match self {
            MetaValue::Color(_) => MetaKey::Color,
            MetaValue::LineWidth(_) => MetaKey::LineWidth,
            MetaValue::LinePattern(_) => MetaKey::LinePattern,
        }
    }
}

/// 按键索引的样式属性集合。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    entries: BTreeMap<MetaKey, MetaValue>,
}

impl MetaInfo {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加或覆盖一项属性，便于链式构造。
    pub fn with(mut self, value: MetaValue) -> Self {
        self.entries.insert(value.key(), value);
        self
    }

    #[inline]
    pub fn get(&self, key: MetaKey) -> Option<&MetaValue> {
        self.entries.get(&key)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetaValue> {
        self.entries.values()
    }

    pub fn color(&self) -> Option<Color> {
        match self.get(MetaKey::Color) {
            Some(MetaValue::Color(color)) => Some(*color),
            _ => None,
        }
    }

    pub fn line_width(&self) -> Option<f64> {
        match self.get(MetaKey::LineWidth) {
            Some(MetaValue::LineWidth(width)) => Some(*width),
            _ => None,
        }
    }

    pub fn line_pattern(&self) -> Option<&LinePattern> {
        match self.get(MetaKey::LinePattern) {
            Some(MetaValue::LinePattern(pattern)) => Some(pattern),
            _ => None,
        }
    }

    /// 以当前属性覆盖 `base`（通常是图层默认样式）后的结果。
    pub fn merged_over(&self, base: &MetaInfo) -> MetaInfo {
        let mut entries = base.entries.clone();
        entries.extend(self.entries.iter().map(|(k, v)| (*k, v.clone())));
        MetaInfo { entries }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub is_visible: bool,
    pub is_locked: bool,
    pub is_frozen: bool,
    #[serde(default, skip_serializing_if = "MetaInfo::is_empty")]
    pub meta: MetaInfo,
}

impl Layer {
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_visible: true,
            is_locked: false,
            is_frozen: false,
            meta: MetaInfo::default(),
        }
    }

    pub fn with_meta(mut self, meta: MetaInfo) -> Self {
        self.meta = meta;
        self
    }

    /// 图层上的实体是否参与命中测试与捕捉。
    #[inline]
    pub fn is_interactive(&self) -> bool {
        self.is_visible && !self.is_frozen
    }
}

/// 块：带局部原点的可复用实体组。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub base_point: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    #[inline]
    pub fn new(name: impl Into<String>, base_point: Coordinate) -> Self {
        Self {
            name: name.into(),
            base_point,
            description: None,
        }
    }
}

/// 图层与块的注册表，按名称有序存储以保证枚举结果稳定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRegistry {
    layers: BTreeMap<String, Layer>,
    blocks: BTreeMap<String, Block>,
}

impl MetaRegistry {
    pub fn new() -> Self {
        let mut layers = BTreeMap::new();
        layers.insert(DEFAULT_LAYER.to_string(), Layer::new(DEFAULT_LAYER));
        Self {
            layers,
            blocks: BTreeMap::new(),
        }
    }

    /// 不含任何图层的空注册表，供外部加载器还原文档使用。
    pub fn empty() -> Self {
        Self {
            layers: BTreeMap::new(),
            blocks: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    #[inline]
    pub fn contains_layer(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    #[inline]
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    pub fn insert_layer(&mut self, layer: Layer) -> Result<(), CadError> {
        if self.layers.contains_key(&layer.name) {
            return Err(CadError::DuplicateName(layer.name));
        }
        self.layers.insert(layer.name.clone(), layer);
        Ok(())
    }

    /// 替换同名图层，返回旧值。
    pub fn replace_layer(&mut self, layer: Layer) -> Result<Layer, CadError> {
        match self.layers.get_mut(&layer.name) {
            Some(slot) => Ok(std::mem::replace(slot, layer)),
            None => Err(CadError::ReferenceNotFound(format!("layer `{}`", layer.name))),
        }
    }

    pub fn remove_layer(&mut self, name: &str) -> Result<Layer, CadError> {
        self.layers
            .remove(name)
            .ok_or_else(|| CadError::ReferenceNotFound(format!("layer `{name}`")))
    }

    #[inline]
    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    #[inline]
    pub fn contains_block(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    #[inline]
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn insert_block(&mut self, block: Block) -> Result<(), CadError> {
        if self.blocks.contains_key(&block.name) {
            return Err(CadError::DuplicateName(block.name));
        }
        self.blocks.insert(block.name.clone(), block);
        Ok(())
    }

    pub fn remove_block(&mut self, name: &str) -> Result<Block, CadError> {
        self.blocks
            .remove(name)
            .ok_or_else(|| CadError::ReferenceNotFound(format!("block `{name}`")))
    }
}

impl Default for MetaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_starts_with_default_layer() {
        let registry = MetaRegistry::new();
        assert!(registry.contains_layer(DEFAULT_LAYER));
        assert_eq!(registry.layers().count(), 1);
        assert!(MetaRegistry::empty().layers().next().is_none());
    }

    #[test]
    fn duplicate_layer_is_rejected() {
        let mut registry = MetaRegistry::new();
        registry.insert_layer(Layer::new("GEOM")).unwrap();
        let err = registry.insert_layer(Layer::new("GEOM")).unwrap_err();
        assert_eq!(err, CadError::DuplicateName("GEOM".to_string()));
    }

    #[test]
    fn replace_returns_previous_layer() {
        let mut registry = MetaRegistry::new();
        registry.insert_layer(Layer::new("GEOM")).unwrap();
        let mut hidden = Layer::new("GEOM");
        hidden.is_visible = false;
        let previous = registry.replace_layer(hidden).unwrap();
        assert!(previous.is_visible);
        assert!(!registry.layer("GEOM").unwrap().is_visible);
        assert!(matches!(
            registry.replace_layer(Layer::new("MISSING")),
            Err(CadError::ReferenceNotFound(_))
        ));
    }

    #[test]
    fn entity_meta_overrides_layer_defaults() {
        let layer_meta = MetaInfo::new()
            .with(MetaValue::Color(Color::rgb(255, 0, 0)))
            .with(MetaValue::LineWidth(0.25));
        let own = MetaInfo::new().with(MetaValue::LineWidth(0.5));
        let merged = own.merged_over(&layer_meta);
        assert_eq!(merged.color(), Some(Color::rgb(255, 0, 0)));
        assert_eq!(merged.line_width(), Some(0.5));
        assert!(merged.line_pattern().is_none());
    }

    #[test]
    fn color_hex_round_trip() {
        let color = Color::from_hex("#1a2B3c").expect("valid hex");
        assert_eq!(color, Color::rgb(0x1a, 0x2b, 0x3c));
        assert_eq!(color.to_hex(), "#1a2b3c");
        assert!(Color::from_hex("12345").is_none());
        assert!(Color::from_hex("zzzzzz").is_none());
    }

    #[test]
    fn shared_meta_is_released_with_last_holder() {
        let meta: MetaInfoRef = Arc::new(MetaInfo::new().with(MetaValue::LineWidth(1.0)));
        let weak = Arc::downgrade(&meta);
        let second = Arc::clone(&meta);
        drop(meta);
        assert!(weak.upgrade().is_some());
        drop(second);
        assert!(weak.upgrade().is_none());
    }
}
