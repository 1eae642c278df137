//! 审计（Audit）
//!
//! - `AuditFields`：每个实体携带的创建/更新/删除审计字段及其状态迁移规则；
//! - `AuditContext`：当前操作主体（谁），由工作单元注入仓储；
//! - `Clock`：时间来源（何时），便于测试中控制时间。

mod clock;
mod context;
mod fields;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::AuditContext;
pub use fields::AuditFields;
