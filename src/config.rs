//! 配置模块，负责加载JSON配置文件
//!
//! Compiler settings: target dialect, namespace defaults and the table layout
//! the emitted SQL runs against.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::schema::ValueType;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {0}")]
    NotFound(String),
    #[error("无法读取配置文件 {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("无法解析JSON配置文件 {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// SQL dialect used to render the statement and its placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    MySql,
    Sqlite,
    Postgres,
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(format!("unknown dialect `{}`", other)),
        }
    }
}

/// 表映射配置结构
///
/// Each typed property lives in the table matching its value type; all of
/// them share the `(id, name, value)` column shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageLayout {
    pub documents: String,
    pub objects: String,
    pub strings: String,
    pub large_strings: String,
    pub integers: String,
    pub longs: String,
    pub floats: String,
    pub doubles: String,
    pub dates: String,
    pub list_items: String,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            documents: "xwikidoc".to_string(),
            objects: "xwikiobjects".to_string(),
            strings: "xwikistrings".to_string(),
            large_strings: "xwikilargestrings".to_string(),
            integers: "xwikiintegers".to_string(),
            longs: "xwikilongs".to_string(),
            floats: "xwikifloats".to_string(),
            doubles: "xwikidoubles".to_string(),
            dates: "xwikidates".to_string(),
            list_items: "xwikilistitems".to_string(),
        }
    }
}

impl StorageLayout {
    /// 获取属性值类型对应的表名
    pub fn table_for(&self, value_type: ValueType) -> &str {
        match value_type {
            ValueType::String
            | ValueType::SingleList
            | ValueType::MultiList
            | ValueType::EncryptedDate => &self.strings,
            ValueType::TextArea | ValueType::User | ValueType::Group => &self.large_strings,
            ValueType::Integer | ValueType::Boolean => &self.integers,
            ValueType::Long => &self.longs,
            ValueType::Float => &self.floats,
            ValueType::Double => &self.doubles,
            ValueType::Date => &self.dates,
            ValueType::RelationalList => &self.list_items,
        }
    }
}

/// Settings shared by every compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Namespace used when a `class` has no `Namespace.` part.
    pub default_namespace: String,
    pub dialect: Dialect,
    /// Records whose name ends with this suffix are scaffolding, never results.
    pub template_suffix: String,
    /// Values of user attributes starting with this prefix are full user
    /// references and match exactly.
    pub user_prefix: String,
    pub layout: StorageLayout,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_namespace: "XWiki".to_string(),
            dialect: Dialect::default(),
            template_suffix: "Template".to_string(),
            user_prefix: "XWiki.".to_string(),
            layout: StorageLayout::default(),
        }
    }
}

impl CompilerConfig {
    /// 从JSON文件加载编译器配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.display().to_string()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_ref.display().to_string(),
            source,
        })
    }
}
