//! 属性表：供属性编辑器与脚本按名称读取、修改实体字段。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::CadError;
use crate::geometry::Coordinate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    Number(f64),
    Coordinate(Coordinate),
    Text(String),
    Boolean(bool),
}

impl PropertyValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Number(_) => "number",
            PropertyValue::Coordinate(_) => "coordinate",
            PropertyValue::Text(_) => "text",
            PropertyValue::Boolean(_) => "boolean",
        }
    }
}

/// 属性的当前值以及是否允许编辑。
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub value: PropertyValue,
    pub editable: bool,
}

impl Property {
    #[inline]
    pub fn editable(value: PropertyValue) -> Self {
        Self {
            value,
            editable: true,
        }
    }

    #[inline]
    pub fn read_only(value: PropertyValue) -> Self {
        Self {
            value,
            editable: false,
        }
    }
}

pub type PropertiesMap = BTreeMap<String, Property>;

/// `set_properties` 的输入：属性名到新值。
pub type PropertyUpdates = BTreeMap<String, PropertyValue>;

/// 类型化读取更新表中的条目。缺失返回 `Ok(None)`，类型不符返回 `InvalidProperty`。
pub(crate) struct UpdateReader<'a> {
    updates: &'a PropertyUpdates,
}

impl<'a> UpdateReader<'a> {
    pub(crate) fn new(updates: &'a PropertyUpdates) -> Self {
        Self { updates }
    }

    pub(crate) fn number(&self, name: &str) -> Result<Option<f64>, CadError> {
        match self.updates.get(name) {
            None => Ok(None),
            Some(PropertyValue::Number(value)) if value.is_finite() => Ok(Some(*value)),
            Some(_) => Err(CadError::InvalidProperty(name.to_string())),
        }
    }

    pub(crate) fn coordinate(&self, name: &str) -> Result<Option<Coordinate>, CadError> {
        match self.updates.get(name) {
            None => Ok(None),
            Some(PropertyValue::Coordinate(value)) if value.is_finite() => Ok(Some(*value)),
            Some(_) => Err(CadError::InvalidProperty(name.to_string())),
        }
    }

    pub(crate) fn text(&self, name: &str) -> Result<Option<&'a str>, CadError> {
        match self.updates.get(name) {
            None => Ok(None),
            Some(PropertyValue::Text(value)) => Ok(Some(value.as_str())),
            Some(_) => Err(CadError::InvalidProperty(name.to_string())),
        }
    }

    pub(crate) fn boolean(&self, name: &str) -> Result<Option<bool>, CadError> {
        match self.updates.get(name) {
            None => Ok(None),
            Some(PropertyValue::Boolean(value)) => Ok(Some(*value)),
            Some(_) => Err(CadError::InvalidProperty(name.to_string())),
        }
    }
}
