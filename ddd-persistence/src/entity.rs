//! 实体（Entity）基础抽象
//!
//! 每个持久化对象都具备：
//! - 不可变的 128 位标识（UUID），在暴露给任何仓储调用之前分配；
//! - 审计字段（`AuditFields`），由仓储在 Add/Update/Delete 时写入；
//! - 软删除标记（审计字段的一部分）；
//! - 待发布领域事件账本（`EventLedger`），不参与序列化。
//!
//! 通常通过 `ddd_macros::entity` 宏生成字段与实现，而不是手写。
//!
use crate::audit::AuditFields;
use crate::domain_event::{DomainEvent, EventLedger};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// 生成新的实体标识（按时间有序的 UUID v7）
pub fn new_entity_id() -> Uuid {
    Uuid::now_v7()
}

/// 持久化实体抽象
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 实体类型名（同时作为存储层的表/集合名）
    const TYPE: &'static str;

    /// 标识字段在行中的列名
    const ID_FIELD: &'static str = "id";

    /// 该实体引发的领域事件类型
    type Event: DomainEvent;

    /// 使用给定标识创建实体
    fn new(id: Uuid) -> Self;

    /// 获取实体标识
    fn id(&self) -> Uuid;

    fn audit(&self) -> &AuditFields;

    fn audit_mut(&mut self) -> &mut AuditFields;

    /// 待发布的领域事件
    fn events(&self) -> &EventLedger<Self::Event>;

    #[doc(hidden)]
    fn events_mut(&mut self) -> &mut EventLedger<Self::Event>;

    fn is_deleted(&self) -> bool {
        self.audit().is_deleted()
    }
}

/// 带备注与版本计数的实体
///
/// `version` 用于乐观并发控制，只增不减；递增由调用方负责（`bump_version`），
/// 仓储与工作单元不会自动修改它。
pub trait AuditableEntity: Entity {
    fn notes(&self) -> Option<&str>;

    fn set_notes(&mut self, notes: Option<String>);

    fn version(&self) -> u64;

    fn bump_version(&mut self) -> u64;
}
