//! 分发配置：中介者选项与注册表选项，可从 TOML 加载。
//!
//! # 契约说明（What）
//! - 所有字段都有默认值，空文档即默认配置；未知字段被拒绝，避免拼写错误静默生效；
//! - 示例：
//!
//! ```toml
//! [mediator]
//! fast_path = "disabled"
//! trace_steps = true
//!
//! [registry]
//! duplicate_handlers = "last_wins"
//! ```

use serde::{Deserialize, Serialize};

/// 配置解析错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid dispatch configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 顶层配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    pub mediator: MediatorOptions,
    pub registry: RegistryOptions,
}

impl DispatchConfig {
    /// 从 TOML 文本解析配置。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }
}

/// 快速路径开关。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FastPathMode {
    /// 探测并优先使用预编译分发表。
    #[default]
    Auto,
    /// 总是运行时组合。
    Disabled,
}

/// 中介者选项。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediatorOptions {
    pub fast_path: FastPathMode,
    /// 未显式设置观察者时，以 `trace!` 事件记录每个管道步骤。
    pub trace_steps: bool,
}

/// 同一请求/流请求类型出现多个不同处理器时的策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateHandlerPolicy {
    /// 构建注册表时报错。
    #[default]
    Reject,
    /// 保留全部注册，解析时返回最后一个。
    LastWins,
}

/// 注册表选项。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryOptions {
    pub duplicate_handlers: DuplicateHandlerPolicy,
}
