//! DDD 持久化核心（ddd-persistence）
//!
//! 为任意实体类型提供统一的持久化构件：
//! - 实体（`entity`）：不可变标识、审计字段、软删除标记与待发布领域事件账本；
//! - 审计（`audit`）：时钟、操作主体上下文与审计字段的状态迁移；
//! - 领域事件（`domain_event`）：事件协议、信封、账本与类型擦除的交付模型；
//! - 查询（`query`）：由会话求值的过滤表达式与分页排序；
//! - 持久化（`persist`）：通用仓储 `Repository<T>` 与外部会话协议 `PersistenceSession`；
//! - 工作单元（`unit_of_work`）：原子保存、显式事务与保存后的事件交付；
//! - 事件交付（`eventing`）：`EventDispatcher` 协议及内存实现。
//!
//! 具体存储后端通过实现 `PersistenceSession` 接入；crate 自带的 `InMemoryStore`
//! 满足协议的全部约定，用于测试与本地开发。
//!
//! 典型用法：
//! 1. 使用 `#[entity]` 定义实体，使用 `#[domain_event]` 定义事件；
//! 2. 每个入站请求构建一个 `UnitOfWork`，注入会话、审计上下文与取消信号；
//! 3. 通过 `uow.repository::<T>()` 读取与暂存变更，最后 `save_changes` 或显式事务提交。
//!
pub mod audit;
pub mod domain_event;
pub mod entity;
pub mod error;
pub mod eventing;
pub mod persist;
pub mod query;
pub mod unit_of_work;

pub use entity::{AuditableEntity, Entity, new_entity_id};
pub use error::{DomainError, DomainResult};
pub use persist::{Repository, Tracked};
pub use unit_of_work::{TransactionState, UnitOfWork, UnitOfWorkConfig};

// 宏生成代码使用的标识类型
pub use uuid;

// 允许在本 crate 内部通过 ::ddd_persistence 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::ddd_persistence 路径。
extern crate self as ddd_persistence;
