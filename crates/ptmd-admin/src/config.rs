//! 配置管理
//!
//! 分层加载客户端配置：内置默认值 → TOML文件 → `PTMD_` 环境变量

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

/// 未指定配置文件时尝试加载的默认路径
pub const DEFAULT_CONFIG_FILE: &str = "ptmd.toml";

/// 环境变量前缀，如 `PTMD_API__BASE_URL`
pub const ENV_PREFIX: &str = "PTMD";

/// PTMD客户端完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 后端接口配置
    pub api: ApiConfig,
    /// 会话存储配置
    pub session: SessionConfig,
    /// 备份下载配置
    pub backup: BackupConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 后端接口配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// 接口根地址
    pub base_url: String,
    /// 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 连接超时（秒）
    pub connect_timeout_secs: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// 会话存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// token与用户记录的JSON文件
    pub storage_path: PathBuf,
}

/// 备份下载配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub output_dir: PathBuf,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别或 `EnvFilter` 指令
    pub level: String,
}

impl ClientConfig {
    /// 加载配置
    ///
    /// 显式给出的文件必须存在；未给出时 `ptmd.toml` 存在才加载
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(config_path, ENV_PREFIX)
    }

    fn load_with_prefix(config_path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let (path, required) = match config_path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let defaults = Config::try_from(&ClientConfig::default())
            .context("Failed to build default configuration")?;
        let settings = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path.as_path()).required(required))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        let config: ClientConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        ConfigValidator::new().validate(&config)?;
        debug!("Configuration loaded (file: {}, required: {})", path.display(), required);
        Ok(config)
    }

    /// 把当前配置写入TOML文件
    pub async fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        tokio::fs::write(path, config_str)
            .await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    validator: fn(&ClientConfig) -> Result<()>,
    error_message: &'static str,
}

impl ConfigValidator {
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "api.base_url",
                validator: |config| {
                    let url = config.api.base_url.trim();
                    if url.is_empty() {
                        Err(anyhow::anyhow!("Base URL cannot be empty"))
                    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
                        Err(anyhow::anyhow!("Base URL must use http or https: {}", url))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid API base URL",
            },
            ValidationRule {
                field_path: "api.request_timeout_secs",
                validator: |config| {
                    if config.api.request_timeout_secs == 0 || config.api.connect_timeout_secs == 0 {
                        Err(anyhow::anyhow!("Timeouts cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid API timeout",
            },
            ValidationRule {
                field_path: "session.storage_path",
                validator: |config| {
                    if config.session.storage_path.as_os_str().is_empty() {
                        Err(anyhow::anyhow!("Session storage path cannot be empty"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid session storage",
            },
            ValidationRule {
                field_path: "logging.level",
                validator: |config| {
                    if config.logging.level.trim().is_empty() {
                        Err(anyhow::anyhow!("Log level cannot be empty"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid logging configuration",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &ClientConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.error_message, e));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            request_timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(".ptmd/session.json"),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
