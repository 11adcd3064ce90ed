//! 分发引擎端到端契约测试。
//!
//! # 教案级导览
//!
//! - **Why**：逐条覆盖 Send / Publish / Stream 三种形态的可观测语义：组合顺序、去重、
//!   错误透传、取消与快速路径；
//! - **How**：每个子模块以 [`spark_dispatch::ServiceRegistry`] 装配夹具，通过 `Mediator` 发起调用，
//!   用共享日志或原子计数器观察执行轨迹；异步用例统一由 `futures::executor::block_on` 驱动；
//! - **What**：所有用例相互独立，不依赖进程级分发表（该场景位于 `generated_table` 测试目标）。

mod dedup;
mod errors;
mod fast_path;
mod send;
mod stream;
