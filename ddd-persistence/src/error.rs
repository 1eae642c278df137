//! 持久化核心统一错误定义
//!
//! 读路径上的“未找到”不是错误（返回 `None`/空集合），因此这里只保留三类：
//! - 非法操作（事务状态误用等，不可重试）；
//! - 持久化失败（约束冲突、连接中断、超时），总是在自动回滚之后才上抛；
//! - 取消与内部不变量破坏。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 事务/调用方误用 ---
    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    // --- 持久化失败 ---
    #[error("constraint violation: entity_type={entity_type}, reason={reason}")]
    ConstraintViolation { entity_type: String, reason: String },
    #[error("persistence failure: {reason}")]
    Persistence { reason: String },
    #[error("operation timed out: {operation}")]
    Timeout { operation: &'static str },
    #[cfg(feature = "infra-sqlx")]
    #[error("database error: {reason}")]
    Database { reason: String },

    // --- 取消 ---
    #[error("operation cancelled: {operation}")]
    Cancelled { operation: &'static str },

    // --- 实体状态/序列化 ---
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

/// 错误大类，便于上层（API 层）做状态码映射
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidOperation,
    PersistenceFailure,
    Cancelled,
    Invalid,
}

impl DomainError {
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
        }
    }

    pub fn constraint(entity_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            entity_type: entity_type.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            Self::ConstraintViolation { .. } | Self::Persistence { .. } | Self::Timeout { .. } => {
                ErrorKind::PersistenceFailure
            }
            #[cfg(feature = "infra-sqlx")]
            Self::Database { .. } => ErrorKind::PersistenceFailure,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::InvalidState { .. } | Self::Serde { .. } => ErrorKind::Invalid,
        }
    }

    /// 是否属于持久化失败（调用方可自行决定是否重试）
    pub fn is_persistence_failure(&self) -> bool {
        self.kind() == ErrorKind::PersistenceFailure
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// 允许在基础设施层直接使用 `?` 将 sqlx 错误转换为 DomainError
#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => DomainError::ConstraintViolation {
                entity_type: db.table().unwrap_or("unknown").to_string(),
                reason: db.message().to_string(),
            },
            sqlx::Error::PoolTimedOut => DomainError::Timeout {
                operation: "acquire connection",
            },
            other => DomainError::Database {
                reason: other.to_string(),
            },
        }
    }
}

impl From<uuid::Error> for DomainError {
    fn from(err: uuid::Error) -> Self {
        DomainError::InvalidState {
            reason: err.to_string(),
        }
    }
}
