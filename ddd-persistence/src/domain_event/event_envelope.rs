use super::DomainEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 事件信封：引发（raise）时分配唯一标识
///
/// 发生时间由工作单元按其注入的时钟写入：实体被暂存时写给已引发的事件，
/// 保存时写给暂存之后才引发的事件。写入后不再改变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "E: DomainEvent")]
pub struct EventEnvelope<E>
where
    E: DomainEvent,
{
    event_id: Uuid,
    occurred_on: Option<DateTime<Utc>>,
    payload: E,
}

impl<E> EventEnvelope<E>
where
    E: DomainEvent,
{
    pub fn new(payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            occurred_on: None,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// 尚未被工作单元观察到的事件返回 `None`
    pub fn occurred_on(&self) -> Option<DateTime<Utc>> {
        self.occurred_on
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    pub(crate) fn stamp(&mut self, at: DateTime<Utc>) {
        self.occurred_on.get_or_insert(at);
    }
}
