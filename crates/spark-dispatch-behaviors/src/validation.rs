//! 请求校验：运行全部校验器，聚合失败项，任何失败都阻止处理器执行。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use spark_dispatch::{Cancellation, DispatchError, DispatchResult, Next, Request, RequestBehavior};

/// 单个属性的校验失败。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationFailure {
    pub property: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.message)
    }
}

/// 聚合的校验错误；文本为每条失败一行的 `属性: 信息`。
///
/// 经 [`DispatchError::failed`] 传出，调用方用 `downcast_ref::<ValidationError>()` 取回。
#[derive(Debug, thiserror::Error)]
#[error("{}", render(.failures))]
pub struct ValidationError {
    failures: Vec<ValidationFailure>,
}

impl ValidationError {
    pub fn new(failures: Vec<ValidationFailure>) -> Self {
        Self { failures }
    }

    /// 按校验器注册顺序排列的全部失败项。
    pub fn failures(&self) -> &[ValidationFailure] {
        &self.failures
    }
}

fn render(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// 针对请求类型 `R` 的校验器；返回空集合表示通过。
#[async_trait]
pub trait Validator<R: Request>: Send + Sync + 'static {
    async fn validate(&self, request: &R, cancellation: &Cancellation) -> Vec<ValidationFailure>;
}

/// 运行 `R` 的全部校验器的请求行为。
///
/// # 逻辑解析（How）
/// 1. 没有校验器时直接调用续延；
/// 2. 否则按顺序逐个执行校验器（不并发），收集全部失败项；
/// 3. 存在失败则返回 [`ValidationError`]，续延不会被调用。
pub struct ValidationBehavior<R: Request> {
    validators: Vec<Arc<dyn Validator<R>>>,
}

impl<R: Request> ValidationBehavior<R> {
    pub fn new(validators: Vec<Arc<dyn Validator<R>>>) -> Self {
        Self { validators }
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }
}

#[async_trait]
impl<R: Request> RequestBehavior<R> for ValidationBehavior<R> {
    async fn handle(
        &self,
        request: &R,
        next: Next<'_, R>,
        cancellation: &Cancellation,
    ) -> DispatchResult<R::Response> {
        let mut failures = Vec::new();
        for validator in &self.validators {
            failures.extend(validator.validate(request, cancellation).await);
        }
        if !failures.is_empty() {
            tracing::debug!(
                request = std::any::type_name::<R>(),
                failures = failures.len(),
                "request rejected by validation"
            );
            return Err(DispatchError::failed(ValidationError::new(failures)));
        }
        next.run().await
    }
}
