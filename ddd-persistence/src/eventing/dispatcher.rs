//! 事件分发（EventDispatcher）协议
//!
//! 工作单元在保存成功（事务内则在提交成功）之后，把本次捕获的事件整批交给分发器。
//! 持久化核心只负责“交出去”，订阅、重试与投递语义由分发器实现决定。
//!
use crate::domain_event::SerializedEvent;
use crate::error::DomainResult;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// 分发一批事件（按引发顺序）
    async fn dispatch(&self, events: &[SerializedEvent]) -> DomainResult<()>;
}

#[async_trait]
impl<T> EventDispatcher for Arc<T>
where
    T: EventDispatcher + ?Sized,
{
    async fn dispatch(&self, events: &[SerializedEvent]) -> DomainResult<()> {
        (**self).dispatch(events).await
    }
}

/// 分发失败时的处理策略
///
/// 分发发生在数据已经落盘之后，失败不会回滚已保存的变更。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchFailurePolicy {
    /// 记录 warn 日志后继续，保存结果照常返回
    #[default]
    Log,
    /// 把分发错误返回给调用方
    Propagate,
}
