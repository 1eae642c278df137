//! 持久化会话协议
//!
//! 会话以类型擦除的 JSON 行（`serde_json::Value`）工作，使协议保持对象安全，
//! 工作单元可以持有 `Arc<dyn PersistenceSession>` 而不关心具体实体类型。
//!
use crate::error::DomainResult;
use crate::query::Query;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// 一条待刷写的行变更
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Insert {
        entity_type: String,
        id: Uuid,
        row: Value,
    },
    Update {
        entity_type: String,
        id: Uuid,
        row: Value,
    },
    /// 物理删除（仅由 HardDelete 产生）
    Remove { entity_type: String, id: Uuid },
}

impl RowChange {
    pub fn entity_type(&self) -> &str {
        match self {
            Self::Insert { entity_type, .. }
            | Self::Update { entity_type, .. }
            | Self::Remove { entity_type, .. } => entity_type,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Insert { id, .. } | Self::Update { id, .. } | Self::Remove { id, .. } => *id,
        }
    }
}

/// 持久化会话：工作单元依赖的外部能力
///
/// 约定：
/// - `flush` 对一批变更全有或全无；
/// - 事务内的 `flush` 结果对本会话的读可见，提交前对其他会话不可见；
/// - 一次只允许一个事务（重复开启返回非法操作错误）。
#[async_trait]
pub trait PersistenceSession: Send + Sync {
    /// 查询匹配的行
    async fn fetch(&self, query: &Query) -> DomainResult<Vec<Value>>;

    /// 统计匹配的行数（忽略分页）
    async fn count(&self, query: &Query) -> DomainResult<usize>;

    /// 原子刷写一批变更，返回受影响行数
    async fn flush(&self, changes: &[RowChange]) -> DomainResult<usize>;

    async fn begin_transaction(&self) -> DomainResult<()>;

    async fn commit_transaction(&self) -> DomainResult<()>;

    async fn rollback_transaction(&self) -> DomainResult<()>;
}

#[async_trait]
impl<T> PersistenceSession for Arc<T>
where
    T: PersistenceSession + ?Sized,
{
    async fn fetch(&self, query: &Query) -> DomainResult<Vec<Value>> {
        (**self).fetch(query).await
    }

    async fn count(&self, query: &Query) -> DomainResult<usize> {
        (**self).count(query).await
    }

    async fn flush(&self, changes: &[RowChange]) -> DomainResult<usize> {
        (**self).flush(changes).await
    }

    async fn begin_transaction(&self) -> DomainResult<()> {
        (**self).begin_transaction().await
    }

    async fn commit_transaction(&self) -> DomainResult<()> {
        (**self).commit_transaction().await
    }

    async fn rollback_transaction(&self) -> DomainResult<()> {
        (**self).rollback_transaction().await
    }
}
