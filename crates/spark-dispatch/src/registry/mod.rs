//! 进程内注册表：解析上下文契约的参考实现，也是注册/扫描协作方。
//!
//! # 设计背景（Why）
//! - 分发核心只依赖 [`ResolutionContext`]，但完整系统需要一个能把应用代码里的处理器与行为
//!   组织起来、并兑现“确定性顺序”契约的注册步骤；
//! - Rust 没有程序集扫描，“模块”（[`DispatchModule`]）是扫描的最小单元：它把自身包含的注册
//!   写入 [`ModuleCatalog`]，构建器负责排序、去重与编号。
//!
//! # 逻辑解析（How）
//! 1. [`RegistryBuilder::scan`] 对同一批次中重复出现的模块只扫描一次，
//!    每个模块内部的注册按实现类型的完整类型名做序数比较排序（稳定排序）；
//! 2. 直接调用 [`Register`] 方法的注册保持调用顺序；
//! 3. [`RegistryBuilder::build`] 为每条注册分配全局序号，折叠完全相同的处理器注册，
//!    并按 [`DuplicateHandlerPolicy`] 检查 Send/Stream 处理器的唯一性；
//! 4. [`ServiceRegistry::resolve_all`] 把闭合注册与同契约的开放注册按全局序号归并。
//!
//! # 契约说明（What）
//! - 行为注册在这里不去重，去重由分发核心的行为选择完成；
//! - 每次解析都会调用工厂生成新实例。

mod builder;
mod module;
mod register;

use std::collections::HashMap;

use crate::config::DuplicateHandlerPolicy;
use crate::resolve::{Contract, Instance, ResolutionContext, ServiceKey, TypeIdentity};

pub use builder::RegistryBuilder;
pub use module::{DispatchModule, ModuleCatalog};
pub use register::{PendingRegistration, Register};

use register::Factory;

/// 注册阶段的配置错误。
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// 同一请求/流请求类型注册了多个不同的处理器。
    #[error("{contract} for `{message}` is registered more than once: {}", .implementations.join(", "))]
    DuplicateHandler {
        contract: Contract,
        message: &'static str,
        implementations: Vec<&'static str>,
    },
}

#[derive(Clone)]
struct Registration {
    ordinal: usize,
    implementation: TypeIdentity,
    factory: Factory,
}

impl Registration {
    fn instantiate(&self, context: &dyn ResolutionContext) -> Instance {
        (self.factory)(context)
    }
}

/// 构建完成的只读注册表。
pub struct ServiceRegistry {
    closed: HashMap<TypeIdentity, Vec<Registration>>,
    open: HashMap<Contract, Vec<Registration>>,
    policy: DuplicateHandlerPolicy,
}

impl ServiceRegistry {
    /// 以默认选项开始构建。
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// 某个服务键下的注册数量（含开放行为），主要用于诊断。
    pub fn registration_count(&self, key: &ServiceKey) -> usize {
        let closed = self.closed.get(&key.service()).map_or(0, Vec::len);
        let open = self.open_for(key).len();
        closed + open
    }

    /// 某个服务键下各注册的实现类型，按解析顺序排列。
    pub fn implementations(&self, key: &ServiceKey) -> Vec<TypeIdentity> {
        let mut ordered: Vec<&Registration> = self
            .closed
            .get(&key.service())
            .into_iter()
            .flatten()
            .chain(self.open_for(key))
            .collect();
        ordered.sort_by_key(|registration| registration.ordinal);
        ordered
            .into_iter()
            .map(|registration| registration.implementation)
            .collect()
    }

    /// 构建时采用的重复处理器策略。
    pub fn duplicate_policy(&self) -> DuplicateHandlerPolicy {
        self.policy
    }

    fn open_for(&self, key: &ServiceKey) -> &[Registration] {
        key.contract()
            .filter(|contract| contract.is_behavior())
            .and_then(|contract| self.open.get(&contract))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl ResolutionContext for ServiceRegistry {
    fn resolve_one(&self, key: &ServiceKey) -> Option<Instance> {
        self.closed
            .get(&key.service())
            .and_then(|registrations| registrations.last())
            .map(|registration| registration.instantiate(self))
    }

    fn resolve_all(&self, key: &ServiceKey) -> Vec<Instance> {
        let closed = self
            .closed
            .get(&key.service())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let open = self.open_for(key);

        let mut merged = Vec::with_capacity(closed.len() + open.len());
        let (mut left, mut right) = (closed.iter().peekable(), open.iter().peekable());
        loop {
            let take_left = match (left.peek(), right.peek()) {
                (Some(l), Some(r)) => l.ordinal < r.ordinal,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_left { left.next() } else { right.next() };
            if let Some(registration) = next {
                merged.push(registration.instantiate(self));
            }
        }
        merged
    }
}
