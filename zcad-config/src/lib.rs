use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub snap: SnapConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `ZCAD_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("ZCAD_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// 检查数值范围。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |value: f64, field: &'static str| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    message: format!("必须为正数，实际为 {value}"),
                })
            }
        };
        positive(self.geometry.tolerance, "geometry.tolerance")?;
        positive(self.snap.threshold, "snap.threshold")?;
        positive(self.snap.grid_spacing, "snap.grid_spacing")?;
        Ok(())
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeometryConfig {
    /// 几何比较的绝对容差。
    #[serde(default = "GeometryConfig::default_tolerance")]
    pub tolerance: f64,
}

impl GeometryConfig {
    fn default_tolerance() -> f64 {
        1e-9
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::default_tolerance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SnapConfig {
    #[serde(default = "SnapConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "SnapConfig::default_threshold")]
    pub threshold: f64,
    #[serde(default = "SnapConfig::default_grid_spacing")]
    pub grid_spacing: f64,
    /// 启用的捕捉类型名称；缺省时使用引擎默认集合。
    #[serde(default)]
    pub kinds: Option<Vec<String>>,
}

impl SnapConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_threshold() -> f64 {
        5.0
    }

    fn default_grid_spacing() -> f64 {
        10.0
    }
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            threshold: Self::default_threshold(),
            grid_spacing: Self::default_grid_spacing(),
            kinds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryConfig {
    /// 撤销历史的最大记录数，0 表示不限制。
    #[serde(default = "HistoryConfig::default_limit")]
    pub limit: usize,
}

impl HistoryConfig {
    fn default_limit() -> usize {
        100
    }

    /// 转换为引擎使用的可选上限。
    pub fn limit(&self) -> Option<usize> {
        (self.limit > 0).then_some(self.limit)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置项 {field} 无效: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}
