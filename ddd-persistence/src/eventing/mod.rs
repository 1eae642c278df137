//! 事件交付（eventing）
//!
//! - `EventDispatcher`：保存成功后接收本次捕获的 `SerializedEvent`；
//! - `InMemoryEventDispatcher`：基于广播通道的内存实现，用于测试与本地开发。
//!
mod dispatcher;
mod dispatcher_inmemory;

pub use dispatcher::{DispatchFailurePolicy, EventDispatcher};
pub use dispatcher_inmemory::InMemoryEventDispatcher;
