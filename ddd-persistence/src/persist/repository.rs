//! 通用仓储（Repository）
//!
//! `Repository<T>` 是某一实体类型在一个工作单元内的操作入口：
//! - 读：每条读路径都由仓储注入 `is_deleted == false` 条件，软删除行默认不可见；
//!   读到的是独立的值，修改后需经 `update`/`delete` 暂存；
//! - 写：只暂存，不做 I/O。暂存时立即写入审计字段，实体被移入 `Tracked` 句柄，
//!   之后经句柄的修改与新引发的事件在保存时一并写入；
//! - 刷写与事件交付由所属的 `UnitOfWork::save_changes` 统一完成。
//!
use super::staging::StagedOp;
use super::{EntitySet, PersistenceSession, StagingArea, Tracked};
use crate::audit::{AuditContext, AuditFields, Clock};
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::query::{Filter, Query, SortDirection};
use crate::unit_of_work::UnitOfWorkConfig;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 工作单元与其仓储共享的运行上下文
pub(crate) struct RepositoryContext {
    pub(crate) session: Arc<dyn PersistenceSession>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) audit: AuditContext,
    pub(crate) cancellation: CancellationToken,
    pub(crate) config: UnitOfWorkConfig,
}

impl RepositoryContext {
    /// 挂起点入口检查：已取消则不再发起 I/O
    pub(crate) fn ensure_active(&self, operation: &'static str) -> DomainResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(DomainError::Cancelled { operation });
        }
        Ok(())
    }

    /// 执行一次可中断的读：受取消信号与超时约束
    pub(crate) async fn guarded<F, R>(&self, operation: &'static str, fut: F) -> DomainResult<R>
    where
        F: Future<Output = DomainResult<R>>,
    {
        self.ensure_active(operation)?;

        let limit = self.config.operation_timeout;
        let bounded = async move {
            match limit {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .unwrap_or(Err(DomainError::Timeout { operation })),
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(DomainError::Cancelled { operation }),
            result = bounded => result,
        }
    }

    fn actor(&self) -> Option<&str> {
        self.audit.actor_id()
    }
}

/// 单一实体类型的仓储句柄
///
/// 句柄可以自由克隆；同一工作单元内同一类型的所有句柄共享一个暂存区。
pub struct Repository<T>
where
    T: Entity,
{
    set: Arc<EntitySet<T>>,
    ctx: Arc<RepositoryContext>,
}

impl<T> Clone for Repository<T>
where
    T: Entity,
{
    fn clone(&self) -> Self {
        Self {
            set: Arc::clone(&self.set),
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<T> std::fmt::Debug for Repository<T>
where
    T: Entity,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity_type", &T::TYPE)
            .field("pending_changes", &self.pending_changes())
            .finish()
    }
}

impl<T> Repository<T>
where
    T: Entity,
{
    pub(crate) fn new(set: Arc<EntitySet<T>>, ctx: Arc<RepositoryContext>) -> Self {
        Self { set, ctx }
    }

    // ---------------------------------------------------------------------
    // 读
    // ---------------------------------------------------------------------

    /// 按标识读取未删除的实体
    pub async fn get_by_id(&self, id: Uuid) -> DomainResult<Option<T>> {
        self.get_by_id_with(id, &[]).await
    }

    /// 按标识读取，并预加载给定的关系
    pub async fn get_by_id_with(&self, id: Uuid, includes: &[&str]) -> DomainResult<Option<T>> {
        let query = includes.iter().fold(
            self.as_queryable().filter(Filter::id(T::ID_FIELD, id)),
            |q, relation| q.include(*relation),
        );
        query.first().await
    }

    /// 全部未删除的实体（存储顺序）
    pub async fn get_all(&self) -> DomainResult<Vec<T>> {
        self.as_queryable().to_list().await
    }

    /// 按谓词查询；谓词由会话求值
    pub async fn find(&self, predicate: Filter) -> DomainResult<Vec<T>> {
        self.as_queryable().filter(predicate).to_list().await
    }

    pub async fn first_or_default(&self, predicate: Filter) -> DomainResult<Option<T>> {
        self.as_queryable().filter(predicate).first().await
    }

    pub async fn any(&self, predicate: Filter) -> DomainResult<bool> {
        self.as_queryable().filter(predicate).any().await
    }

    pub async fn count(&self, predicate: Option<Filter>) -> DomainResult<usize> {
        self.as_queryable()
            .filter(predicate.unwrap_or_default())
            .count()
            .await
    }

    /// 可组合查询（仍然带软删除过滤，除非显式 `with_deleted`）
    pub fn as_queryable(&self) -> Queryable<T> {
        Queryable {
            ctx: Arc::clone(&self.ctx),
            query: Query::new(T::TYPE),
            with_deleted: false,
            _entity: PhantomData,
        }
    }

    // ---------------------------------------------------------------------
    // 暂存
    // ---------------------------------------------------------------------

    /// 暂存插入：写入创建戳（不分配标识），返回受跟踪的句柄
    pub fn add(&self, entity: impl Into<Tracked<T>>) -> Tracked<T> {
        let now = self.ctx.clock.now();
        self.stage(entity.into(), Transition::Add, now)
    }

    /// 批量暂存插入，共享同一时间戳
    pub fn add_range<I>(&self, entities: I) -> Vec<Tracked<T>>
    where
        I: IntoIterator,
        I::Item: Into<Tracked<T>>,
    {
        self.stage_all(entities, Transition::Add)
    }

    /// 暂存更新：覆盖更新戳；同一标识以最后一次暂存的句柄为准
    pub fn update(&self, entity: impl Into<Tracked<T>>) -> Tracked<T> {
        let now = self.ctx.clock.now();
        self.stage(entity.into(), Transition::Update, now)
    }

    pub fn update_range<I>(&self, entities: I) -> Vec<Tracked<T>>
    where
        I: IntoIterator,
        I::Item: Into<Tracked<T>>,
    {
        self.stage_all(entities, Transition::Update)
    }

    /// 软删除：标记删除并作为更新暂存
    pub fn delete(&self, entity: impl Into<Tracked<T>>) -> Tracked<T> {
        let now = self.ctx.clock.now();
        self.stage(entity.into(), Transition::Delete, now)
    }

    pub fn delete_range<I>(&self, entities: I) -> Vec<Tracked<T>>
    where
        I: IntoIterator,
        I::Item: Into<Tracked<T>>,
    {
        self.stage_all(entities, Transition::Delete)
    }

    /// 物理删除：保存后行不复存在，绕过软删除过滤也读不到
    pub fn hard_delete(&self, entity: impl Into<Tracked<T>>) -> Tracked<T> {
        let now = self.ctx.clock.now();
        self.stage(entity.into(), Transition::HardDelete, now)
    }

    /// 当前暂存的条目数
    pub fn pending_changes(&self) -> usize {
        self.set.len()
    }

    fn stage_all<I>(&self, entities: I, transition: Transition) -> Vec<Tracked<T>>
    where
        I: IntoIterator,
        I::Item: Into<Tracked<T>>,
    {
        let now = self.ctx.clock.now();
        entities
            .into_iter()
            .map(|entity| self.stage(entity.into(), transition, now))
            .collect()
    }

    fn stage(&self, handle: Tracked<T>, transition: Transition, now: DateTime<Utc>) -> Tracked<T> {
        {
            let actor = self.ctx.actor();
            let mut entity = handle.lock();
            let audit = entity.audit_mut();
            match transition {
                Transition::Add => audit.mark_created(now, actor),
                Transition::Update => audit.mark_updated(now, actor),
                Transition::Delete => {
                    if audit.mark_deleted(now, actor) {
                        audit.mark_updated(now, actor);
                    }
                }
                Transition::HardDelete => {}
            }
            entity.events_mut().stamp_pending(now);
        }

        self.set.stage(handle.clone(), transition.op());
        handle
    }
}

// 仓储调用对应的审计迁移
#[derive(Debug, Clone, Copy)]
enum Transition {
    Add,
    Update,
    Delete,
    HardDelete,
}

impl Transition {
    fn op(self) -> StagedOp {
        match self {
            Self::Add => StagedOp::Insert,
            Self::Update | Self::Delete => StagedOp::Update,
            Self::HardDelete => StagedOp::Remove,
        }
    }
}

/// 可组合查询
///
/// ```ignore
/// let recent = orders
///     .as_queryable()
///     .filter(Filter::gt("total", 100))
///     .order_by("created_at", SortDirection::Desc)
///     .take(10)
///     .to_list()
///     .await?;
/// ```
pub struct Queryable<T>
where
    T: Entity,
{
    ctx: Arc<RepositoryContext>,
    query: Query,
    with_deleted: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Queryable<T>
where
    T: Entity,
{
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            query: self.query.clone(),
            with_deleted: self.with_deleted,
            _entity: PhantomData,
        }
    }
}

impl<T> Queryable<T>
where
    T: Entity,
{
    pub fn filter(mut self, predicate: Filter) -> Self {
        self.query = self.query.filter(predicate);
        self
    }

    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.query = self.query.include(relation);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query = self.query.order_by(field, direction);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.query = self.query.skip(n);
        self
    }

    pub fn take(mut self, n: usize) -> Self {
        self.query = self.query.take(n);
        self
    }

    /// 包含软删除行（审计/原始读取）
    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }

    /// 发往会话的最终查询
    pub fn to_query(&self) -> Query {
        if self.with_deleted {
            self.query.clone()
        } else {
            self.query
                .clone()
                .filter(Filter::eq(AuditFields::IS_DELETED, false))
        }
    }

    pub async fn to_list(&self) -> DomainResult<Vec<T>> {
        let query = self.to_query();
        let rows = self
            .ctx
            .guarded("fetch", self.ctx.session.fetch(&query))
            .await?;

        tracing::debug!(entity_type = T::TYPE, rows = rows.len(), "fetched");
        rows.into_iter().map(decode_row::<T>).collect()
    }

    pub async fn first(&self) -> DomainResult<Option<T>> {
        let query = self.to_query().take(1);
        let rows = self
            .ctx
            .guarded("fetch", self.ctx.session.fetch(&query))
            .await?;

        rows.into_iter().next().map(decode_row::<T>).transpose()
    }

    pub async fn count(&self) -> DomainResult<usize> {
        let query = self.to_query();
        self.ctx
            .guarded("count", self.ctx.session.count(&query))
            .await
    }

    pub async fn any(&self) -> DomainResult<bool> {
        Ok(self.count().await? > 0)
    }
}

fn decode_row<T>(row: Value) -> DomainResult<T>
where
    T: Entity,
{
    Ok(serde_json::from_value(row)?)
}
