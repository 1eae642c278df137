//! 工作单元（UnitOfWork）
//!
//! 一次逻辑业务操作（通常是一次入站请求）的事务边界：
//! - 按实体类型缓存仓储，同一类型的所有句柄共享一个暂存区；
//! - `save_changes`：读取被暂存实体的当前状态，重新写入审计戳并校验 → 一次原子刷写
//!   全部暂存变更 → 从实体账本取走并交付捕获的领域事件；
//! - 显式事务：`Idle` ⇄ `InTransaction`，事务内的保存累积到提交时才对外可见，
//!   事件也只在提交成功后交付；
//! - 任何失败都不会留下部分写入；提交失败先回滚再返回错误，且总会释放事务。
//!
//! ```ignore
//! let uow = UnitOfWork::builder()
//!     .session(Arc::new(store.session()))
//!     .audit(AuditContext::builder().actor_id("u-1".to_string()).build())
//!     .build();
//!
//! let orders = uow.repository::<Order>();
//! let order = orders.add(Order::new(new_entity_id()));
//! order.lock().total = 10;
//! uow.save_changes().await?;
//! ```
//!
use crate::audit::{AuditContext, Clock, SystemClock};
use crate::domain_event::SerializedEvent;
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::eventing::{DispatchFailurePolicy, EventDispatcher};
use crate::persist::{
    EntitySet, PersistenceSession, Repository, RepositoryContext, RowChange, SaveStamp,
    StagingArea,
};
use bon::bon;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 工作单元配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitOfWorkConfig {
    /// 单次读操作的超时；超时视为持久化失败
    pub operation_timeout: Option<Duration>,
    /// 事件分发失败时的处理策略
    pub dispatch_failure: DispatchFailurePolicy,
    /// 保存前是否校验审计不变量
    pub verify_audit_on_save: bool,
}

impl Default for UnitOfWorkConfig {
    fn default() -> Self {
        Self {
            operation_timeout: None,
            dispatch_failure: DispatchFailurePolicy::Log,
            verify_audit_on_save: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    InTransaction,
}

enum TxState {
    Idle,
    // 事务内各次保存捕获的事件，提交成功后才交付
    Active { buffered: Vec<SerializedEvent> },
}

pub struct UnitOfWork {
    ctx: Arc<RepositoryContext>,
    dispatcher: Option<Arc<dyn EventDispatcher>>,
    repositories: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    // 与 `repositories` 同步登记，保持首次请求的顺序用于刷写
    staging: Mutex<Vec<Arc<dyn StagingArea>>>,
    state: Mutex<TxState>,
}

#[bon]
impl UnitOfWork {
    #[builder]
    pub fn new(
        session: Arc<dyn PersistenceSession>,
        dispatcher: Option<Arc<dyn EventDispatcher>>,
        clock: Option<Arc<dyn Clock>>,
        #[builder(default)] audit: AuditContext,
        #[builder(default)] cancellation: CancellationToken,
        #[builder(default)] config: UnitOfWorkConfig,
    ) -> Self {
        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        Self {
            ctx: Arc::new(RepositoryContext {
                session,
                clock,
                audit,
                cancellation,
                config,
            }),
            dispatcher,
            repositories: DashMap::new(),
            staging: Mutex::new(Vec::new()),
            state: Mutex::new(TxState::Idle),
        }
    }
}

impl UnitOfWork {
    /// 获取实体类型 `T` 的仓储（在工作单元生命周期内缓存）
    pub fn repository<T>(&self) -> Repository<T>
    where
        T: Entity,
    {
        let erased = {
            let entry = self
                .repositories
                .entry(TypeId::of::<T>())
                .or_insert_with(|| {
                    let set = Arc::new(EntitySet::<T>::new());
                    self.lock_staging()
                        .push(Arc::clone(&set) as Arc<dyn StagingArea>);
                    tracing::debug!(entity_type = T::TYPE, "repository registered");
                    set.into_any()
                });
            Arc::clone(entry.value())
        };

        let set = match erased.downcast::<EntitySet<T>>() {
            Ok(set) => set,
            // 缓存以 TypeId 为键，值总是对应的 EntitySet<T>
            Err(_) => unreachable!("repository cache entry for {} has a foreign type", T::TYPE),
        };
        Repository::new(set, Arc::clone(&self.ctx))
    }

    pub fn state(&self) -> TransactionState {
        match *self.lock_state() {
            TxState::Idle => TransactionState::Idle,
            TxState::Active { .. } => TransactionState::InTransaction,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.state() == TransactionState::InTransaction
    }

    /// 绑定到本工作单元的取消信号
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.ctx.cancellation
    }

    pub fn audit_context(&self) -> &AuditContext {
        &self.ctx.audit
    }

    /// 所有仓储中暂存的条目总数
    pub fn pending_changes(&self) -> usize {
        self.lock_staging().iter().map(|area| area.len()).sum()
    }

    /// 保存全部暂存变更，返回受影响的行数
    ///
    /// 对每个暂存条目读取实体的当前状态：按迁移重新写入审计戳、校验审计不变量、
    /// 序列化行并捕获待发布事件；一次原子刷写后才从实体账本中移除被捕获的事件。
    ///
    /// 失败时不产生任何持久化写入，暂存内容与实体账本保持原样，调用方可以重试，
    /// 或用 `discard_changes` 丢弃无法保存的暂存。
    #[tracing::instrument(skip(self), fields(in_transaction = self.in_transaction()))]
    pub async fn save_changes(&self) -> DomainResult<usize> {
        self.ctx.ensure_active("save_changes")?;

        let areas = self.staging_areas();
        if areas.iter().all(|area| area.len() == 0) {
            return Ok(0);
        }

        let stamp = SaveStamp {
            now: self.ctx.clock.now(),
            audit: &self.ctx.audit,
            verify_audit: self.ctx.config.verify_audit_on_save,
        };

        let mut changes: Vec<RowChange> = Vec::new();
        let mut events: Vec<SerializedEvent> = Vec::new();
        for area in &areas {
            let batch = area.collect(&stamp)?;
            tracing::debug!(
                entity_type = area.entity_type(),
                rows = batch.changes.len(),
                events = batch.events.len(),
                "collected staged changes"
            );
            changes.extend(batch.changes);
            events.extend(batch.events);
        }

        let affected = if changes.is_empty() {
            0
        } else {
            self.ctx.session.flush(&changes).await?
        };
        tracing::debug!(rows = affected, events = events.len(), "flushed");

        for area in &areas {
            area.complete();
        }

        self.hand_off(events).await?;
        Ok(affected)
    }

    /// 丢弃全部尚未保存的暂存条目，返回丢弃的条目数
    ///
    /// 实体账本中的事件保留在实体上；事务内已保存的变更不受影响，仍由提交或回滚决定。
    pub fn discard_changes(&self) -> usize {
        let discarded = self.clear_staging();
        if discarded > 0 {
            tracing::debug!(entries = discarded, "staged changes discarded");
        }
        discarded
    }

    /// 开启显式事务
    pub async fn begin_transaction(&self) -> DomainResult<()> {
        self.ctx.ensure_active("begin_transaction")?;
        if self.in_transaction() {
            return Err(DomainError::invalid_operation(
                "a transaction is already active",
            ));
        }

        self.ctx.session.begin_transaction().await?;
        *self.lock_state() = TxState::Active {
            buffered: Vec::new(),
        };

        tracing::info!("transaction started");
        Ok(())
    }

    /// 最后一次保存并提交；任一步骤失败都会先回滚再返回错误
    #[tracing::instrument(skip(self))]
    pub async fn commit_transaction(&self) -> DomainResult<()> {
        if !self.in_transaction() {
            return Err(DomainError::invalid_operation("no active transaction"));
        }

        let outcome = async {
            self.save_changes().await?;
            self.ctx.ensure_active("commit_transaction")?;
            self.ctx.session.commit_transaction().await
        }
        .await;

        if let Err(err) = outcome {
            tracing::warn!(error = %err, "commit failed, rolling back");
            if let Err(rollback_err) = self.abort_transaction().await {
                tracing::warn!(error = %rollback_err, "rollback after failed commit also failed");
            }
            return Err(err);
        }

        let buffered = match std::mem::replace(&mut *self.lock_state(), TxState::Idle) {
            TxState::Active { buffered } => buffered,
            TxState::Idle => Vec::new(),
        };
        tracing::info!(events = buffered.len(), "transaction committed");

        self.dispatch(buffered).await
    }

    /// 回滚：丢弃暂存变更与事务内已捕获、尚未交付的事件，释放事务
    pub async fn rollback_transaction(&self) -> DomainResult<()> {
        if !self.in_transaction() {
            return Err(DomainError::invalid_operation("no active transaction"));
        }
        tracing::info!("rolling back transaction");
        self.abort_transaction().await
    }

    /// 释放工作单元：回滚未结束的事务、清空仓储缓存，不会隐式提交
    pub async fn dispose(self) -> DomainResult<()> {
        let result = if self.in_transaction() {
            self.abort_transaction().await
        } else {
            Ok(())
        };
        self.clear_staging();
        self.repositories.clear();
        self.lock_staging().clear();
        result
    }

    // 事务总会被释放；会话回滚失败时把错误返回给调用方
    async fn abort_transaction(&self) -> DomainResult<()> {
        self.clear_staging();
        *self.lock_state() = TxState::Idle;
        self.ctx.session.rollback_transaction().await
    }

    // 事务内缓冲，否则立即交付
    async fn hand_off(&self, events: Vec<SerializedEvent>) -> DomainResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.lock_state();
            if let TxState::Active { buffered } = &mut *state {
                buffered.extend(events);
                return Ok(());
            }
        }

        self.dispatch(events).await
    }

    async fn dispatch(&self, events: Vec<SerializedEvent>) -> DomainResult<()> {
        let Some(dispatcher) = &self.dispatcher else {
            return Ok(());
        };
        if events.is_empty() {
            return Ok(());
        }

        match dispatcher.dispatch(&events).await {
            Ok(()) => {
                tracing::debug!(events = events.len(), "events dispatched");
                Ok(())
            }
            Err(err) => match self.ctx.config.dispatch_failure {
                DispatchFailurePolicy::Log => {
                    tracing::warn!(error = %err, events = events.len(), "event dispatch failed");
                    Ok(())
                }
                DispatchFailurePolicy::Propagate => Err(err),
            },
        }
    }

    fn staging_areas(&self) -> Vec<Arc<dyn StagingArea>> {
        self.lock_staging().clone()
    }

    fn clear_staging(&self) -> usize {
        self.lock_staging().iter().map(|area| area.clear()).sum()
    }

    fn lock_staging(&self) -> MutexGuard<'_, Vec<Arc<dyn StagingArea>>> {
        self.staging.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, TxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.in_transaction() {
            tracing::warn!(
                "unit of work dropped with an open transaction; call dispose() to roll back"
            );
        }
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("state", &self.state())
            .field("repositories", &self.repositories.len())
            .field("pending_changes", &self.pending_changes())
            .finish()
    }
}
