use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// 领域事件载荷需要满足的通用能力边界
pub trait DomainEvent:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 事件类型（形如 `OrderEvent.Placed` 或自定义类型名）
    fn event_type(&self) -> &str;

    /// 事件载荷版本
    fn event_version(&self) -> usize;
}

/// 不产生领域事件的实体使用的占位事件类型（不可构造）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub enum NoEvent {}

impl DomainEvent for NoEvent {
    fn event_type(&self) -> &str {
        match *self {}
    }

    fn event_version(&self) -> usize {
        match *self {}
    }
}
