//! 内存版持久化会话（InMemorySession）
//!
//! `InMemoryStore` 是多个会话共享的后端存储，`InMemorySession` 是一个工作单元独占的会话：
//! - 非事务刷写：在存储副本上应用整批变更，全部校验通过后一次性替换；
//! - 事务刷写：变更先校验后缓存在会话内，对本会话读可见，提交时整批应用到存储；
//! - 约束：插入重复/空标识、更新或删除不存在的行都会使整批失败。
//!
//! 注意：预加载关系（includes）被忽略，行以文档形式整体保存，关系已内嵌其中。

use super::{PersistenceSession, RowChange};
use crate::error::{DomainError, DomainResult};
use crate::query::Query;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

type Table = BTreeMap<Uuid, Value>;
type Tables = HashMap<String, Table>;

/// 共享的内存存储
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开一个新会话（每个工作单元一个）
    pub fn session(&self) -> InMemorySession {
        InMemorySession::new(self.clone())
    }

    /// 模拟连接中断：离线期间所有读写与提交都失败
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// 某实体类型已持久化的行数（包含软删除行）
    pub fn row_count(&self, entity_type: &str) -> usize {
        self.read().get(entity_type).map_or(0, BTreeMap::len)
    }

    /// 按标识读取原始行（绕过一切过滤）
    pub fn raw_row(&self, entity_type: &str, id: Uuid) -> Option<Value> {
        self.read()
            .get(entity_type)
            .and_then(|table| table.get(&id))
            .cloned()
    }

    fn ensure_online(&self) -> DomainResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DomainError::persistence("store unavailable"));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 在存储上原子应用一批变更
    fn apply_atomically(&self, changes: &[RowChange]) -> DomainResult<usize> {
        let mut tables = self.write();
        let mut working = tables.clone();
        let affected = apply_changes(&mut working, changes)?;
        *tables = working;
        Ok(affected)
    }
}

/// 单个工作单元独占的内存会话
#[derive(Debug)]
pub struct InMemorySession {
    store: InMemoryStore,
    // 事务内已刷写但尚未提交的变更
    transaction: Mutex<Option<Vec<RowChange>>>,
}

impl InMemorySession {
    pub fn new(store: InMemoryStore) -> Self {
        Self {
            store,
            transaction: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub fn in_transaction(&self) -> bool {
        self.lock_tx().is_some()
    }

    fn lock_tx(&self) -> std::sync::MutexGuard<'_, Option<Vec<RowChange>>> {
        self.transaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // 本会话可见的数据：存储 + 事务内未提交变更
    fn visible_rows(&self, entity_type: &str) -> DomainResult<Vec<Value>> {
        let tx = self.lock_tx();
        let base = self.store.read().get(entity_type).cloned().unwrap_or_default();

        let table = match tx.as_ref() {
            Some(pending) => {
                let mut tables = Tables::from([(entity_type.to_string(), base)]);
                let relevant: Vec<RowChange> = pending
                    .iter()
                    .filter(|c| c.entity_type() == entity_type)
                    .cloned()
                    .collect();
                apply_changes(&mut tables, &relevant)?;
                tables.remove(entity_type).unwrap_or_default()
            }
            None => base,
        };

        Ok(table.into_values().collect())
    }
}

#[async_trait]
impl PersistenceSession for InMemorySession {
    async fn fetch(&self, query: &Query) -> DomainResult<Vec<Value>> {
        self.store.ensure_online()?;
        let rows = self.visible_rows(query.entity_type())?;
        Ok(query.apply(rows))
    }

    async fn count(&self, query: &Query) -> DomainResult<usize> {
        self.store.ensure_online()?;
        let rows = self.visible_rows(query.entity_type())?;
        Ok(rows
            .iter()
            .filter(|row| query.filter_expr().matches(row))
            .count())
    }

    async fn flush(&self, changes: &[RowChange]) -> DomainResult<usize> {
        self.store.ensure_online()?;
        if changes.is_empty() {
            return Ok(0);
        }

        let mut tx = self.lock_tx();
        match tx.as_mut() {
            Some(pending) => {
                // 先在“存储 + 已缓存变更”的视图上校验整批，再缓存
                let mut view = self.store.read().clone();
                apply_changes(&mut view, pending)?;
                let affected = apply_changes(&mut view, changes)?;
                pending.extend_from_slice(changes);
                Ok(affected)
            }
            None => self.store.apply_atomically(changes),
        }
    }

    async fn begin_transaction(&self) -> DomainResult<()> {
        self.store.ensure_online()?;
        let mut tx = self.lock_tx();
        if tx.is_some() {
            return Err(DomainError::invalid_operation(
                "a transaction is already active on this session",
            ));
        }
        *tx = Some(Vec::new());
        Ok(())
    }

    async fn commit_transaction(&self) -> DomainResult<()> {
        let mut tx = self.lock_tx();
        let Some(pending) = tx.as_ref() else {
            return Err(DomainError::invalid_operation("no active transaction"));
        };

        self.store.ensure_online()?;
        self.store.apply_atomically(pending)?;
        *tx = None;
        Ok(())
    }

    async fn rollback_transaction(&self) -> DomainResult<()> {
        let mut tx = self.lock_tx();
        if tx.take().is_none() {
            return Err(DomainError::invalid_operation("no active transaction"));
        }
        Ok(())
    }
}

// 在给定表集合上依次应用变更；任一变更违反约束则返回错误（调用方丢弃该表集合）
fn apply_changes(tables: &mut Tables, changes: &[RowChange]) -> DomainResult<usize> {
    for change in changes {
        let entity_type = change.entity_type();
        let id = change.id();
        let table = tables.entry(entity_type.to_string()).or_default();

        match change {
            RowChange::Insert { row, .. } => {
                if id.is_nil() {
                    return Err(DomainError::constraint(entity_type, "nil id"));
                }
                if table.contains_key(&id) {
                    return Err(DomainError::constraint(
                        entity_type,
                        format!("duplicate key {id}"),
                    ));
                }
                table.insert(id, row.clone());
            }
            RowChange::Update { row, .. } => match table.get_mut(&id) {
                Some(existing) => *existing = row.clone(),
                None => {
                    return Err(DomainError::persistence(format!(
                        "update of {entity_type} {id} affected 0 rows"
                    )));
                }
            },
            RowChange::Remove { .. } => {
                if table.remove(&id).is_none() {
                    return Err(DomainError::persistence(format!(
                        "delete of {entity_type} {id} affected 0 rows"
                    )));
                }
            }
        }
    }
    Ok(changes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;
    use serde_json::json;

    fn insert(id: Uuid, name: &str) -> RowChange {
        RowChange::Insert {
            entity_type: "item".into(),
            id,
            row: json!({ "id": id, "name": name, "is_deleted": false }),
        }
    }

    #[tokio::test]
    async fn flush_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let session = store.session();
        let a = Uuid::now_v7();

        session.flush(&[insert(a, "a")]).await.unwrap();

        let b = Uuid::now_v7();
        let err = session
            .flush(&[insert(b, "b"), insert(a, "dup")])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ConstraintViolation { .. }));
        assert_eq!(store.row_count("item"), 1);
        assert!(store.raw_row("item", b).is_none());
    }

    #[tokio::test]
    async fn transaction_writes_are_private_until_commit() {
        let store = InMemoryStore::new();
        let writer = store.session();
        let reader = store.session();
        let id = Uuid::now_v7();

        writer.begin_transaction().await.unwrap();
        writer.flush(&[insert(id, "x")]).await.unwrap();

        let q = Query::new("item").filter(Filter::id("id", id));
        assert_eq!(writer.count(&q).await.unwrap(), 1);
        assert_eq!(reader.count(&q).await.unwrap(), 0);

        writer.commit_transaction().await.unwrap();
        assert_eq!(reader.count(&q).await.unwrap(), 1);
        assert!(!writer.in_transaction());
    }

    #[tokio::test]
    async fn rollback_discards_and_requires_active_transaction() {
        let store = InMemoryStore::new();
        let session = store.session();

        assert!(matches!(
            session.rollback_transaction().await,
            Err(DomainError::InvalidOperation { .. })
        ));

        session.begin_transaction().await.unwrap();
        assert!(session.begin_transaction().await.is_err());
        session.flush(&[insert(Uuid::now_v7(), "x")]).await.unwrap();
        session.rollback_transaction().await.unwrap();

        assert_eq!(store.row_count("item"), 0);
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn update_and_remove_of_missing_rows_fail() {
        let session = InMemoryStore::new().session();
        let id = Uuid::now_v7();

        let update = RowChange::Update {
            entity_type: "item".into(),
            id,
            row: json!({ "id": id }),
        };
        assert!(session.flush(&[update]).await.is_err());

        let remove = RowChange::Remove {
            entity_type: "item".into(),
            id,
        };
        assert!(session.flush(&[remove]).await.is_err());
    }

    #[tokio::test]
    async fn offline_store_rejects_io() {
        let store = InMemoryStore::new();
        let session = store.session();
        store.set_offline(true);

        let err = session.flush(&[insert(Uuid::now_v7(), "x")]).await.unwrap_err();
        assert!(err.is_persistence_failure());
        assert!(session.fetch(&Query::new("item")).await.is_err());

        store.set_offline(false);
        assert!(session.fetch(&Query::new("item")).await.unwrap().is_empty());
    }
}
