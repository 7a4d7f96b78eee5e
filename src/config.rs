//! 配置管理
//!
//! 配置来源（后者覆盖前者）：
//! 1. 内置默认值
//! 2. `CURSOR_BRIDGE_CONFIG` 指向的 YAML 文件
//! 3. 环境变量（`HOST`、`PORT`、`RUST_LOG`、`x-cursor-checksum`、`x-custom-instruction`）

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::server_utils::decode_base64;

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "CURSOR_BRIDGE_CONFIG";

/// 默认系统指令
pub const DEFAULT_CUSTOM_INSTRUCTION: &str =
    "Always respond in the same language as the user or in the language specified by the user.";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析配置文件失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("无效的配置项 {key}: {message}")]
    Invalid { key: String, message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub defaults: DefaultsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// 上游服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// StreamChat 接口地址
    pub base_url: String,
    pub client_version: String,
    pub timezone: String,
    /// 建立连接及读取响应头的超时（秒），0 表示不限制
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api2.cursor.sh/aiserver.v1.AiService/StreamChat".to_string(),
            client_version: "0.42.3".to_string(),
            timezone: "Asia/Shanghai".to_string(),
            request_timeout_secs: 0,
        }
    }
}

/// 请求未携带元数据时使用的默认值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DefaultsConfig {
    pub custom_instruction: String,
    /// 固定 checksum，未配置时每个请求随机生成
    pub checksum: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            custom_instruction: DEFAULT_CUSTOM_INSTRUCTION.to_string(),
            checksum: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing EnvFilter 表达式
    pub level: String,
    /// 是否输出 JSON 格式日志
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// 加载配置：默认值 → YAML 文件 → 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 从 YAML 文件读取
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// 应用环境变量覆盖
    ///
    /// `lookup` 便于测试时替换真实环境变量
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST").filter(|v| !v.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT").filter(|v| !v.is_empty()) {
            self.server.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "PORT".to_string(),
                message: format!("不是有效的端口号: {}", port),
            })?;
        }
        if let Some(level) = lookup("RUST_LOG").filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
        if let Some(checksum) = lookup("x-cursor-checksum").filter(|v| !v.is_empty()) {
            self.defaults.checksum = Some(checksum);
        }
        if let Some(encoded) = lookup("x-custom-instruction") {
            let instruction = decode_base64(&encoded);
            if !instruction.is_empty() {
                self.defaults.custom_instruction = instruction;
            }
        }
        Ok(())
    }

    /// 监听地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
