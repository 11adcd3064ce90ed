//! 管道步骤诊断。
//!
//! # 设计背景（Why）
//! - 排查“某个行为为什么没有生效”时，需要看到每次 `send` 实际走了哪条路径（预编译 `GEN`
//!   还是运行时组合 `RT`），以及每个行为的进入/退出顺序；
//! - 诊断默认关闭：未配置观察者时组合器完全不做步骤记录。
//!
//! # 契约说明（What）
//! - 每次 `send` 分配一个进程内唯一的 [`CorrelationId`]；
//! - 运行时路径上，每个行为依次报告 `before`，终端处理器报告 `handler`，
//!   行为的内层完成后报告 `after`（无论成功或失败）；
//! - 快速路径上只报告一对 `before`/`after`，`behavior` 为空。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::message::MessageInfo;
use crate::resolve::TypeIdentity;

/// 单次 `send` 的关联标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// 分配下一个进程内唯一的标识。
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// 本次调用走的分发路径。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchPath {
    /// 预编译分发表。
    Generated,
    /// 运行时组合。
    Runtime,
}

impl DispatchPath {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "GEN",
            Self::Runtime => "RT",
        }
    }
}

impl fmt::Display for DispatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 步骤阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepPhase {
    Before,
    Handler,
    After,
}

impl StepPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::Handler => "handler",
            Self::After => "after",
        }
    }
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个管道步骤事件。
#[derive(Clone, Copy, Debug)]
pub struct PipelineStep {
    pub correlation: CorrelationId,
    pub path: DispatchPath,
    pub message: MessageInfo,
    pub response: &'static str,
    pub behavior: Option<TypeIdentity>,
    pub phase: StepPhase,
}

/// 管道步骤观察者。
pub trait StepObserver: Send + Sync + 'static {
    fn on_step(&self, step: &PipelineStep);
}

impl<F> StepObserver for F
where
    F: Fn(&PipelineStep) + Send + Sync + 'static,
{
    fn on_step(&self, step: &PipelineStep) {
        self(step)
    }
}

/// 把每个步骤写成一条 `trace!` 事件。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingStepObserver;

impl StepObserver for TracingStepObserver {
    fn on_step(&self, step: &PipelineStep) {
        tracing::trace!(
            correlation = %step.correlation,
            path = step.path.as_str(),
            request = step.message.type_name(),
            response = step.response,
            behavior = step.behavior.map(|b| b.name()),
            phase = step.phase.as_str(),
            "pipeline step"
        );
    }
}

/// 绑定到一次 `send` 调用的步骤记录器。
pub(crate) struct StepRecorder {
    observer: Arc<dyn StepObserver>,
    correlation: CorrelationId,
    path: DispatchPath,
    message: MessageInfo,
    response: &'static str,
}

impl StepRecorder {
    pub(crate) fn new(
        observer: Arc<dyn StepObserver>,
        path: DispatchPath,
        message: MessageInfo,
        response: &'static str,
    ) -> Self {
        Self {
            observer,
            correlation: CorrelationId::next(),
            path,
            message,
            response,
        }
    }

    pub(crate) fn emit(&self, behavior: Option<TypeIdentity>, phase: StepPhase) {
        self.observer.on_step(&PipelineStep {
            correlation: self.correlation,
            path: self.path,
            message: self.message,
            response: self.response,
            behavior,
            phase,
        });
    }
}
