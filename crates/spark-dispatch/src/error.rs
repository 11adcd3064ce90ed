//! 分发错误域。
//!
//! # 设计背景（Why）
//! - 引擎自身只会产生少量错误：找不到处理器、取消、契约/类型不匹配；
//! - 处理器与行为产生的错误必须原样透传给调用方，不得被重命名或包裹成引擎自己的语义，
//!   因此 [`DispatchError::Failed`] 使用 `#[error(transparent)]`，
//!   `Display` 与 `source()` 都直接转发给原始错误，并提供向下转型入口找回原始类型。
//!
//! # 契约说明（What）
//! - 每个变体都有稳定的 `<domain>.<reason>` 错误码，见 [`codes`]；
//! - [`DispatchError::failed`] 遇到已经是 `DispatchError` 的输入时直接解包，避免多层嵌套。

use std::error::Error as StdError;

use crate::message::MessageKind;
use crate::resolve::Contract;

/// 处理器与行为使用的通用错误盒。
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// 分发链路的统一返回类型。
pub type DispatchResult<T> = Result<T, DispatchError>;

/// 稳定错误码常量。
pub mod codes {
    /// 未找到终端处理器。
    pub const HANDLER_NOT_FOUND: &str = "dispatch.handler_not_found";
    /// 调用被取消。
    pub const CANCELLED: &str = "dispatch.cancelled";
    /// 解析上下文返回的实例未实现所请求的契约。
    pub const CONTRACT_MISMATCH: &str = "dispatch.contract_mismatch";
    /// 类型擦除阶段返回了错误类型的值。
    pub const RESPONSE_TYPE_MISMATCH: &str = "dispatch.response_type_mismatch";
    /// 处理器或行为自身失败。
    pub const FAILED: &str = "dispatch.failed";
}

/// 分发错误。
///
/// # 契约说明（What）
/// - `HandlerNotFound` 只会出现在 Send/Stream 路径；Publish 无处理器属于合法空操作；
/// - `Cancelled` 是取消类错误，调用方可用 [`DispatchError::is_cancelled`] 分类；
/// - `Failed` 承载处理器/行为的原始错误，使用 [`DispatchError::downcast_ref`] 或
///   [`DispatchError::into_inner`] 找回原始类型。
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// 未找到终端处理器。
    #[error("no {kind} handler registered for `{type_name}`")]
    HandlerNotFound {
        kind: MessageKind,
        type_name: &'static str,
    },
    /// 取消信号已触发。
    #[error("dispatch was cancelled")]
    Cancelled,
    /// 解析上下文返回的实例无法按契约调用。
    #[error("instance `{implementation}` does not implement {contract}")]
    ContractMismatch {
        contract: Contract,
        implementation: &'static str,
    },
    /// 类型擦除阶段返回的值与期望类型不一致。
    #[error("expected a value of type `{expected}`, got `{actual}`")]
    ResponseTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// 处理器或行为的原始错误。
    #[error(transparent)]
    Failed(BoxError),
}

impl DispatchError {
    /// 把任意错误包装为 `Failed`；若输入本身就是 `DispatchError` 则原样解包。
    pub fn failed<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        match error.into().downcast::<DispatchError>() {
            Ok(inner) => *inner,
            Err(other) => Self::Failed(other),
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::HandlerNotFound { .. } => codes::HANDLER_NOT_FOUND,
            Self::Cancelled => codes::CANCELLED,
            Self::ContractMismatch { .. } => codes::CONTRACT_MISMATCH,
            Self::ResponseTypeMismatch { .. } => codes::RESPONSE_TYPE_MISMATCH,
            Self::Failed(_) => codes::FAILED,
        }
    }

    /// 是否为取消类错误。
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// 尝试把 `Failed` 中的原始错误视作 `E`。
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Self::Failed(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// 取出 `Failed` 中的原始错误；其它变体原样返回。
    pub fn into_inner(self) -> Result<BoxError, Self> {
        match self {
            Self::Failed(inner) => Ok(inner),
            other => Err(other),
        }
    }
}
