use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ContainerError, ContainerResult};
use crate::logging::LoggingConfig;

/// 覆盖容器名称的环境变量
pub const CONTAINER_NAME_ENV: &str = "SPRIG_CONTAINER_NAME";

/// 默认容器名称
pub const DEFAULT_CONTAINER_NAME: &str = "sprig";

/// 容器配置（配置文件中的 `[container]` 段）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 容器名称，作为日志字段输出，便于区分同一进程中的多个容器
    pub name: String,

    /// 同名 Bean 被重新定义时是否输出 warn 日志
    pub warn_on_redefine: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CONTAINER_NAME.to_string(),
            warn_on_redefine: true,
        }
    }
}

impl ContainerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn warn_on_redefine(mut self, warn: bool) -> Self {
        self.warn_on_redefine = warn;
        self
    }
}

/// 完整配置文件
///
/// ```toml
/// [container]
/// name = "orders"
///
/// [logging]
/// level = "debug"
/// format = "json"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SprigConfig {
    pub container: ContainerConfig,
    pub logging: LoggingConfig,
}

impl SprigConfig {
    /// 从 TOML 字符串解析，缺失的段使用默认值
    pub fn from_toml_str(content: &str) -> ContainerResult<Self> {
        let config: SprigConfig =
            toml::from_str(content).map_err(|e| ContainerError::Config(e.to_string()))?;
        Ok(config.with_env_overrides())
    }

    /// 从 TOML 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(name) = std::env::var(CONTAINER_NAME_ENV) {
            if !name.trim().is_empty() {
                self.container.name = name.trim().to_string();
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogFormat, LogLevel};

    #[test]
    fn test_parse_full_config() {
        let config = SprigConfig::from_toml_str(
            r#"
            [container]
            name = "orders"
            warn_on_redefine = false

            [logging]
            level = "debug"
            format = "json"
            show_target = true
            "#,
        )
        .unwrap();

        if std::env::var(CONTAINER_NAME_ENV).is_err() {
            assert_eq!(config.container.name, "orders");
        }
        assert!(!config.container.warn_on_redefine);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.logging.show_target);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = SprigConfig::from_toml_str("").unwrap();

        assert!(config.container.warn_on_redefine);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let err = SprigConfig::from_toml_str("[logging]\nlevel = \"loud\"").unwrap_err();
        assert!(matches!(err, ContainerError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = SprigConfig::from_file("/nonexistent/sprig.toml").unwrap_err();
        assert!(matches!(err, ContainerError::Config(ref msg) if msg.contains("sprig.toml")));
    }
}
