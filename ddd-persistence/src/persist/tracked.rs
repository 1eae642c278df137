use crate::entity::Entity;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// 被仓储暂存的实体句柄
///
/// 暂存记录的是句柄而不是快照：暂存之后经句柄做的字段修改、引发的事件，
/// 都会在下一次 `save_changes` 时被读取。克隆的句柄指向同一个实体。
///
/// ```ignore
/// let order = orders.add(Order::place(id, "acme", 10));
/// order.lock().ship("ups");
/// uow.save_changes().await?; // 写入已发货状态，交付 Placed 与 Shipped
/// ```
pub struct Tracked<T>
where
    T: Entity,
{
    inner: Arc<Mutex<T>>,
}

impl<T> Tracked<T>
where
    T: Entity,
{
    pub fn new(entity: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(entity)),
        }
    }

    /// 独占访问实体
    ///
    /// 守卫不要跨 `.await` 持有，也不要在持有期间把同一句柄交给仓储或工作单元。
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.lock().id()
    }

    /// 当前状态的副本
    pub fn snapshot(&self) -> T {
        self.lock().clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Tracked<T>
where
    T: Entity,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> From<T> for Tracked<T>
where
    T: Entity,
{
    fn from(entity: T) -> Self {
        Self::new(entity)
    }
}

impl<T> From<&Tracked<T>> for Tracked<T>
where
    T: Entity,
{
    fn from(handle: &Tracked<T>) -> Self {
        handle.clone()
    }
}

impl<T> fmt::Debug for Tracked<T>
where
    T: Entity,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("entity_type", &T::TYPE)
            .field("id", &self.id())
            .finish()
    }
}
