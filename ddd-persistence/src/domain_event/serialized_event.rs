//! 事件交付模型（SerializedEvent）
//!
//! 工作单元在保存成功后把各实体账本中的事件转换为该类型擦除形态，
//! 交给外部的事件分发协作者（见 `eventing::EventDispatcher`）。
//!
use super::{DomainEvent, EventEnvelope};
use crate::audit::AuditContext;
use crate::error::DomainResult;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// 事件唯一标识符
    event_id: Uuid,
    /// 事件类型，用于区分不同的事件
    event_type: String,
    /// 事件载荷版本
    event_version: usize,
    /// 事件所属实体的类型
    entity_type: String,
    /// 事件所属实体的标识
    entity_id: Uuid,
    /// 关联 ID，用于将多个事件关联到同一个业务操作
    correlation_id: Option<String>,
    /// 触发事件的主体类型（如用户、系统等）
    actor_type: Option<String>,
    /// 触发事件的主体 ID
    actor_id: Option<String>,
    /// 事件发生时间（按工作单元的时钟）
    occurred_on: DateTime<Utc>,
    /// 事件负载
    payload: Value,
}

impl SerializedEvent {
    /// 由事件信封与所属实体信息构建
    ///
    /// 信封还没有发生时间时使用 `captured_at`。
    pub fn from_envelope<E>(
        envelope: &EventEnvelope<E>,
        entity_type: &str,
        entity_id: Uuid,
        context: &AuditContext,
        captured_at: DateTime<Utc>,
    ) -> DomainResult<Self>
    where
        E: DomainEvent,
    {
        Ok(Self {
            event_id: envelope.event_id(),
            event_type: envelope.payload().event_type().to_string(),
            event_version: envelope.payload().event_version(),
            entity_type: entity_type.to_string(),
            entity_id,
            correlation_id: context.correlation_id().map(str::to_owned),
            actor_type: context.actor_type().map(str::to_owned),
            actor_id: context.actor_id().map(str::to_owned),
            occurred_on: envelope.occurred_on().unwrap_or(captured_at),
            payload: serde_json::to_value(envelope.payload())?,
        })
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> usize {
        self.event_version
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn entity_id(&self) -> Uuid {
        self.entity_id
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn actor_type(&self) -> Option<&str> {
        self.actor_type.as_deref()
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// 将载荷还原为具体事件类型
    pub fn decode<E>(&self) -> DomainResult<E>
    where
        E: DomainEvent,
    {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Shipment {
        Dispatched { carrier: String },
    }

    impl DomainEvent for Shipment {
        fn event_type(&self) -> &str {
            "Shipment.Dispatched"
        }

        fn event_version(&self) -> usize {
            2
        }
    }

    #[test]
    fn from_envelope_carries_entity_and_actor() {
        let envelope = EventEnvelope::new(Shipment::Dispatched {
            carrier: "acme".into(),
        });
        let entity_id = Uuid::now_v7();
        let ctx = AuditContext::builder()
            .actor_id("u-1".to_string())
            .correlation_id("c-1".to_string())
            .build();

        let captured_at = Utc::now();
        let ser =
            SerializedEvent::from_envelope(&envelope, "shipment", entity_id, &ctx, captured_at)
                .unwrap();

        assert_eq!(ser.event_id(), envelope.event_id());
        assert_eq!(ser.event_type(), "Shipment.Dispatched");
        assert_eq!(ser.event_version(), 2);
        assert_eq!(ser.entity_type(), "shipment");
        assert_eq!(ser.entity_id(), entity_id);
        assert_eq!(ser.actor_id(), Some("u-1"));
        assert_eq!(ser.correlation_id(), Some("c-1"));
        assert_eq!(ser.actor_type(), None);
        assert_eq!(ser.occurred_on(), captured_at);
        assert_eq!(ser.decode::<Shipment>().unwrap(), *envelope.payload());
    }

    #[test]
    fn stamped_envelopes_keep_their_own_time() {
        let mut envelope = EventEnvelope::new(Shipment::Dispatched {
            carrier: "acme".into(),
        });
        let stamped = Utc::now();
        envelope.stamp(stamped);

        let ser = SerializedEvent::from_envelope(
            &envelope,
            "shipment",
            Uuid::now_v7(),
            &AuditContext::system(),
            stamped + chrono::Duration::minutes(1),
        )
        .unwrap();
        assert_eq!(ser.occurred_on(), stamped);
    }
}
