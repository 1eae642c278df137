//! 领域事件（Domain Event）与事件账本
//!
//! 定义事件载荷需要实现的最小接口（`DomainEvent`）、附带事件标识与发生时间的
//! `EventEnvelope`、实体上的待发布事件账本 `EventLedger`，以及保存成功后交付给
//! 外部协作者的类型擦除形态 `SerializedEvent`。

mod domain_event_trait;
mod event_envelope;
mod ledger;
mod serialized_event;

pub use domain_event_trait::{DomainEvent, NoEvent};
pub use event_envelope::EventEnvelope;
pub use ledger::EventLedger;
pub use serialized_event::SerializedEvent;
