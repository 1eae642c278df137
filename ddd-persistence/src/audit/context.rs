use bon::Builder;
use serde::{Deserialize, Serialize};

/// 审计上下文：一次逻辑会话（通常是一次入站请求）的操作主体信息
///
/// `actor_id` 为空表示系统动作，此时 `*_by` 审计字段保持为空。
#[derive(Builder, Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    /// 操作主体 ID
    actor_id: Option<String>,
    /// 操作主体类型（如 user、service、system）
    actor_type: Option<String>,
    /// 关联 ID，随领域事件一起交付
    correlation_id: Option<String>,
}

impl AuditContext {
    /// 系统动作（无主体）
    pub fn system() -> Self {
        Self::default()
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn actor_type(&self) -> Option<&str> {
        self.actor_type.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}
