//! 行为选择：两阶段去重 + 保序。
//!
//! # 设计背景（Why）
//! - 同一个模块被扫描两次、或多处配置重复注册同一行为时，不能出现重复包裹；
//! - 泛型行为（例如“包裹所有请求”）在每个被扫描的模块里各注册一次时，仍然只能包裹一次。
//!
//! # 逻辑解析（How）
//! 1. 具体类型去重：按输入顺序遍历，每个实现类型只保留第一次出现；
//! 2. 泛型定义去重：对幸存者计算键，泛型类型取其开放定义，非泛型类型取自身，每个键只保留第一次出现。
//!
//! # 契约说明（What）
//! - 输出保持输入的相对顺序，本阶段不重新排序，顺序由注册/扫描协作方决定；
//! - 去重是幂等的：对已去重的序列再次去重不改变任何内容；
//! - 输出第一个元素是最外层包装，最后一个元素紧贴终端。

use std::any::TypeId;
use std::collections::HashSet;

use crate::resolve::{Instance, TypeIdentity};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum DedupKey {
    Definition(&'static str),
    Concrete(TypeId),
}

impl DedupKey {
    fn of(identity: TypeIdentity) -> Self {
        if identity.is_generic() {
            Self::Definition(identity.definition())
        } else {
            Self::Concrete(identity.id())
        }
    }
}

/// 对解析到的行为候选执行两阶段去重。
pub fn select_behaviors(candidates: Vec<Instance>) -> Vec<Instance> {
    select_by(candidates, Instance::implementation)
}

pub(crate) fn select_by<T, F>(candidates: Vec<T>, identity: F) -> Vec<T>
where
    F: Fn(&T) -> TypeIdentity,
{
    if candidates.len() < 2 {
        return candidates;
    }

    let mut concrete = HashSet::with_capacity(candidates.len());
    let survivors: Vec<T> = candidates
        .into_iter()
        .filter(|candidate| concrete.insert(identity(candidate).id()))
        .collect();
    if survivors.len() < 2 {
        return survivors;
    }

    let mut definitions = HashSet::with_capacity(survivors.len());
    survivors
        .into_iter()
        .filter(|candidate| definitions.insert(DedupKey::of(identity(candidate))))
        .collect()
}
