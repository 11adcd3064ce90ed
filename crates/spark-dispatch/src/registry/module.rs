use std::any::TypeId;

use super::register::{PendingRegistration, Register};

/// 扫描单元：把一组相关的处理器与行为注册写入目录。
///
/// # 契约说明（What）
/// - 同一批次的 [`super::RegistryBuilder::scan`] 中，同一模块类型只会被扫描一次；
/// - 模块内部的注册顺序无关紧要，构建器会按实现类型的完整类型名重新排序。
pub trait DispatchModule: Send + Sync + 'static {
    fn register(&self, catalog: &mut ModuleCatalog);

    /// 模块身份，默认取模块自身的类型。
    fn module_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    /// 模块名，用于日志。
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// 单个模块的注册目录。
#[derive(Default)]
pub struct ModuleCatalog {
    entries: Vec<PendingRegistration>,
}

impl ModuleCatalog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 取出按实现类型完整类型名排序（序数比较、稳定）后的注册。
    pub(crate) fn into_sorted(mut self) -> Vec<PendingRegistration> {
        self.entries
            .sort_by(|a, b| a.implementation.name().cmp(b.implementation.name()));
        self.entries
    }
}

impl Register for ModuleCatalog {
    fn push(&mut self, registration: PendingRegistration) {
        self.entries.push(registration);
    }
}
