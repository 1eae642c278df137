//! 持久化（persist）
//!
//! - `PersistenceSession`：外部持久化会话协议（暂存变更的原子刷写、谓词查询、事务）；
//! - `InMemoryStore`/`InMemorySession`：满足协议全部约定的进程内实现，用于测试与本地开发；
//! - `Repository`：单一实体类型的增删改查与软删除可见性规则；
//! - `Tracked`：被暂存实体的共享句柄，保存时读取其当前状态；
//! - 暂存区（staging）：每个工作单元内每种实体类型唯一的一份待刷写变更。
//!
//! 具体存储后端（如 Postgres）由上层提供实现并注入工作单元。
//!
mod repository;
mod session;
mod session_inmemory;
mod staging;
mod tracked;

pub use repository::{Queryable, Repository};
pub use session::{PersistenceSession, RowChange};
pub use session_inmemory::{InMemorySession, InMemoryStore};
pub use tracked::Tracked;

pub(crate) use repository::RepositoryContext;
pub(crate) use staging::{EntitySet, SaveStamp, StagingArea};
