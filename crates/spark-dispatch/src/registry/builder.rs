use std::collections::{HashMap, HashSet};

use crate::config::{DuplicateHandlerPolicy, RegistryOptions};
use crate::resolve::{Contract, TypeIdentity};

use super::module::{DispatchModule, ModuleCatalog};
use super::register::{PendingRegistration, Register, Slot};
use super::{Registration, RegistryError, ServiceRegistry};

/// 注册表构建器。
#[derive(Default)]
pub struct RegistryBuilder {
    options: RegistryOptions,
    entries: Vec<PendingRegistration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        Self {
            options,
            entries: Vec::new(),
        }
    }

    /// 扫描一批模块。
    ///
    /// - 同一批次中重复出现的模块（按 [`DispatchModule::module_id`]）只扫描一次；
    /// - 模块内的注册按实现类型的完整类型名排序，模块之间保持传入顺序。
    pub fn scan(&mut self, modules: &[&dyn DispatchModule]) -> &mut Self {
        let mut seen = HashSet::with_capacity(modules.len());
        for module in modules {
            if !seen.insert(module.module_id()) {
                tracing::debug!(module = module.name(), "skipping duplicate module in scan");
                continue;
            }
            let mut catalog = ModuleCatalog::default();
            module.register(&mut catalog);
            tracing::debug!(
                module = module.name(),
                registrations = catalog.len(),
                "module scanned"
            );
            self.entries.extend(catalog.into_sorted());
        }
        self
    }

    /// 当前已收集的注册数量（未折叠）。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 编号、折叠重复处理器并校验唯一性，生成只读注册表。
    pub fn build(self) -> Result<ServiceRegistry, RegistryError> {
        let policy = self.options.duplicate_handlers;
        let mut closed: HashMap<TypeIdentity, Vec<Registration>> = HashMap::new();
        let mut open: HashMap<Contract, Vec<Registration>> = HashMap::new();
        let mut handler_pairs: HashSet<(TypeIdentity, TypeIdentity)> = HashSet::new();

        for (ordinal, entry) in self.entries.into_iter().enumerate() {
            let registration = Registration {
                ordinal,
                implementation: entry.implementation,
                factory: entry.factory,
            };
            match entry.slot {
                Slot::Open(contract) => open.entry(contract).or_default().push(registration),
                Slot::Closed(service) => {
                    let is_handler = entry.contract.is_some_and(|contract| !contract.is_behavior());
                    if is_handler && !handler_pairs.insert((service, entry.implementation)) {
                        match policy {
                            DuplicateHandlerPolicy::Reject => {
                                tracing::debug!(
                                    service = service.name(),
                                    implementation = entry.implementation.name(),
                                    "collapsing repeated handler registration"
                                );
                                continue;
                            }
                            // 重复的同一实现移到末尾，`resolve_one` 因而取到最后一次注册。
                            DuplicateHandlerPolicy::LastWins => {
                                if let Some(existing) = closed.get_mut(&service) {
                                    existing.retain(|earlier| {
                                        earlier.implementation != entry.implementation
                                    });
                                }
                                tracing::debug!(
                                    service = service.name(),
                                    implementation = entry.implementation.name(),
                                    "replacing repeated handler registration"
                                );
                            }
                        }
                    }
                    if let (Some(contract), DuplicateHandlerPolicy::Reject) = (entry.contract, policy)
                    {
                        let existing = closed.get(&service).map_or(0, Vec::len);
                        if contract.expects_single() && existing > 0 {
                            let mut implementations: Vec<&'static str> = closed[&service]
                                .iter()
                                .map(|r| r.implementation.name())
                                .collect();
                            implementations.push(entry.implementation.name());
                            return Err(RegistryError::DuplicateHandler {
                                contract,
                                message: entry
                                    .message
                                    .map_or(service.name(), |message| message.type_name()),
                                implementations,
                            });
                        }
                    }
                    closed.entry(service).or_default().push(registration);
                }
            }
        }

        Ok(ServiceRegistry {
            closed,
            open,
            policy,
        })
    }
}

impl Register for RegistryBuilder {
    fn push(&mut self, registration: PendingRegistration) {
        self.entries.push(registration);
    }
}
