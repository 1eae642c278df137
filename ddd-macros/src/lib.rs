//! ddd-persistence 的过程宏
//!
//! - `#[entity]`：为实体结构体注入标识、审计字段与事件账本，并实现 `Entity`；
//! - `#[domain_event]`：为事件枚举派生序列化并实现 `DomainEvent`。
//!
mod derive_utils;
mod domain_event;
mod entity;
mod field_utils;

use proc_macro::TokenStream;

/// 实体宏
/// - 注入字段（若缺失）：`id: Uuid` 置于最前，`audit: AuditFields`（`#[serde(flatten)]`）
///   与 `events: EventLedger<E>`（`#[serde(skip)]`）置于末尾
/// - 自动实现 `::ddd_persistence::entity::Entity`
/// - 支持参数：`#[entity(name = "order", event = OrderEvent, auditable, debug = false)]`
///
/// ```ignore
/// #[entity(event = OrderEvent)]
/// struct Order {
///     customer: String,
///     total: i64,
/// }
/// ```
#[proc_macro_attribute]
pub fn entity(attr: TokenStream, item: TokenStream) -> TokenStream {
    entity::expand(attr, item)
}

/// 领域事件宏
/// - 默认派生 Debug、Clone、PartialEq、Serialize、Deserialize
/// - 事件类型默认为 `枚举名.变体名`，版本默认 1
/// - `#[domain_event(version = N)]` 指定枚举级默认版本号
/// - 变体可通过 `#[event(event_type = "...", event_version = N)]` 覆写
#[proc_macro_attribute]
pub fn domain_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    domain_event::expand(attr, item)
}
