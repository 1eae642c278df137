use crate::error::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 实体审计字段
///
/// 序列化时以 `#[serde(flatten)]` 平铺到实体行上，因此字段名（`created_at`、
/// `is_deleted` 等）也是查询过滤时使用的列名。
///
/// 状态迁移只能由仓储在 Add/Update/Delete 时触发：
/// - `created_*`：只写一次；
/// - `updated_*`：每次变更覆盖；
/// - `deleted_*`：仅在 `is_deleted` 由 false 变为 true 时写入一次。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFields {
    created_at: Option<DateTime<Utc>>,
    created_by: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    updated_by: Option<String>,
    #[serde(default)]
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<String>,
}

impl AuditFields {
    pub const IS_DELETED: &'static str = "is_deleted";
    pub const CREATED_AT: &'static str = "created_at";
    pub const UPDATED_AT: &'static str = "updated_at";
    pub const DELETED_AT: &'static str = "deleted_at";

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn updated_by(&self) -> Option<&str> {
        self.updated_by.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn deleted_by(&self) -> Option<&str> {
        self.deleted_by.as_deref()
    }

    /// 新增：写入创建戳（已存在则保留原值）
    pub(crate) fn mark_created(&mut self, at: DateTime<Utc>, by: Option<&str>) {
        if self.created_at.is_some() {
            return;
        }
        self.created_at = Some(at);
        self.created_by = by.map(str::to_owned);
    }

    /// 更新：覆盖更新戳，时间不早于创建时间
    pub(crate) fn mark_updated(&mut self, at: DateTime<Utc>, by: Option<&str>) {
        self.updated_at = Some(self.not_before_created(at));
        self.updated_by = by.map(str::to_owned);
    }

    /// 软删除：仅在首次删除时写入删除戳，返回是否发生了迁移
    pub(crate) fn mark_deleted(&mut self, at: DateTime<Utc>, by: Option<&str>) -> bool {
        if self.is_deleted {
            return false;
        }
        self.is_deleted = true;
        self.deleted_at = Some(self.not_before_created(at));
        self.deleted_by = by.map(str::to_owned);
        true
    }

    /// 校验审计不变量
    pub fn verify(&self) -> DomainResult<()> {
        let Some(created_at) = self.created_at else {
            return Err(DomainError::invalid_state("created_at is not set"));
        };

        if self.updated_at.is_some_and(|updated_at| updated_at < created_at) {
            return Err(DomainError::invalid_state(format!(
                "updated_at precedes created_at {created_at}"
            )));
        }

        match (self.is_deleted, self.deleted_at) {
            (true, None) => Err(DomainError::invalid_state(
                "is_deleted is set but deleted_at is missing",
            )),
            (true, Some(deleted_at)) if deleted_at < created_at => {
                Err(DomainError::invalid_state(format!(
                    "deleted_at {deleted_at} precedes created_at {created_at}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn not_before_created(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self.created_at {
            Some(created_at) if at < created_at => created_at,
            _ => at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn created_is_written_once() {
        let t0 = Utc::now();
        let mut audit = AuditFields::default();
        audit.mark_created(t0, Some("alice"));
        audit.mark_created(t0 + Duration::seconds(5), Some("bob"));

        assert_eq!(audit.created_at(), Some(t0));
        assert_eq!(audit.created_by(), Some("alice"));
        assert!(audit.verify().is_ok());
    }

    #[test]
    fn deletion_stamps_only_on_first_transition() {
        let t0 = Utc::now();
        let mut audit = AuditFields::default();
        audit.mark_created(t0, None);

        assert!(audit.mark_deleted(t0 + Duration::seconds(1), Some("alice")));
        assert!(!audit.mark_deleted(t0 + Duration::seconds(9), Some("bob")));

        assert!(audit.is_deleted());
        assert_eq!(audit.deleted_at(), Some(t0 + Duration::seconds(1)));
        assert_eq!(audit.deleted_by(), Some("alice"));
    }

    #[test]
    fn stamps_never_precede_creation() {
        let t0 = Utc::now();
        let mut audit = AuditFields::default();
        audit.mark_created(t0, None);
        audit.mark_updated(t0 - Duration::seconds(30), None);
        audit.mark_deleted(t0 - Duration::seconds(30), None);

        assert_eq!(audit.updated_at(), Some(t0));
        assert_eq!(audit.deleted_at(), Some(t0));
        assert!(audit.verify().is_ok());
    }

    #[test]
    fn verify_rejects_missing_creation_and_broken_deletion() {
        assert!(AuditFields::default().verify().is_err());

        let broken: AuditFields = serde_json::from_value(serde_json::json!({
            "created_at": Utc::now(),
            "is_deleted": true,
        }))
        .unwrap();
        assert!(matches!(
            broken.verify(),
            Err(DomainError::InvalidState { .. })
        ));
    }
}
