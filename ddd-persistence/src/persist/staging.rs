//! 暂存区
//!
//! 每个工作单元内每种实体类型只有一份 `EntitySet<T>`，所有仓储句柄共享它。
//! 暂存只记录实体句柄与迁移类型，保存时才读取实体的当前状态：按迁移重新写入审计戳、
//! 序列化行、捕获账本中的事件。刷写成功后才从实体账本移除被捕获的事件，
//! 失败时实体与暂存都保持原样，可以重试。
//!
use super::{RowChange, Tracked};
use crate::audit::AuditContext;
use crate::domain_event::SerializedEvent;
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StagedOp {
    Insert,
    Update,
    Remove,
    /// 暂存插入后又被物理删除：不产生行变更，只交付事件
    Detach,
}

impl StagedOp {
    // 同一标识的前后两次暂存如何合并
    fn merge(self, next: StagedOp) -> StagedOp {
        match (self, next) {
            (StagedOp::Insert, StagedOp::Update) => StagedOp::Insert,
            (StagedOp::Insert, StagedOp::Remove) => StagedOp::Detach,
            (StagedOp::Detach, StagedOp::Update | StagedOp::Remove) => StagedOp::Detach,
            (_, next) => next,
        }
    }
}

struct StagedEntry<T>
where
    T: Entity,
{
    id: Uuid,
    op: StagedOp,
    entity: Tracked<T>,
    captured: usize,
    // 同一标识此前暂存过的其他句柄；行以最后一个句柄为准，事件全部捕获
    superseded: Vec<(Tracked<T>, usize)>,
}

/// 一次保存需要刷写的行变更与需要交付的事件
#[derive(Debug, Default)]
pub(crate) struct StagedBatch {
    pub changes: Vec<RowChange>,
    pub events: Vec<SerializedEvent>,
}

/// 一次保存共用的时间与操作主体
pub(crate) struct SaveStamp<'a> {
    pub now: DateTime<Utc>,
    pub audit: &'a AuditContext,
    pub verify_audit: bool,
}

/// 类型擦除后的暂存区，供工作单元在保存时统一遍历
pub(crate) trait StagingArea: Send + Sync {
    fn entity_type(&self) -> &'static str;

    fn len(&self) -> usize;

    /// 读取实体当前状态，生成行变更与事件；不移除任何内容
    fn collect(&self, stamp: &SaveStamp<'_>) -> DomainResult<StagedBatch>;

    /// 刷写成功后调用：从实体账本移除已捕获的事件并清空暂存
    fn complete(&self);

    /// 丢弃暂存，返回丢弃的条目数；实体账本不变
    fn clear(&self) -> usize;
}

struct Entries<T>
where
    T: Entity,
{
    order: Vec<StagedEntry<T>>,
    index: HashMap<Uuid, usize>,
}

pub(crate) struct EntitySet<T>
where
    T: Entity,
{
    entries: Mutex<Entries<T>>,
}

impl<T> EntitySet<T>
where
    T: Entity,
{
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                order: Vec::new(),
                index: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries<T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn stage(&self, entity: Tracked<T>, op: StagedOp) {
        let id = entity.id();

        let mut entries = self.lock();
        match entries.index.get(&id).copied() {
            Some(pos) => {
                let entry = &mut entries.order[pos];
                entry.op = entry.op.merge(op);
                if !entry.entity.ptr_eq(&entity) {
                    entry.superseded.retain(|(handle, _)| !handle.ptr_eq(&entity));
                    let previous = std::mem::replace(&mut entry.entity, entity);
                    entry.superseded.push((previous, entry.captured));
                    entry.captured = 0;
                }
            }
            None => {
                let pos = entries.order.len();
                entries.order.push(StagedEntry {
                    id,
                    op,
                    entity,
                    captured: 0,
                    superseded: Vec::new(),
                });
                entries.index.insert(id, pos);
            }
        }

        tracing::debug!(entity_type = T::TYPE, entity_id = %id, op = ?op, "entity staged");
    }

    pub(crate) fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T> StagedEntry<T>
where
    T: Entity,
{
    fn encode(&self, stamp: &SaveStamp<'_>) -> DomainResult<Option<RowChange>> {
        let mut entity = self.entity.lock();
        if entity.id() != self.id {
            return Err(DomainError::invalid_state(format!(
                "{} {} changed its id after being staged",
                T::TYPE,
                self.id
            )));
        }

        let actor = stamp.audit.actor_id();
        match self.op {
            StagedOp::Insert => entity.audit_mut().mark_created(stamp.now, actor),
            StagedOp::Update => entity.audit_mut().mark_updated(stamp.now, actor),
            StagedOp::Remove | StagedOp::Detach => {}
        }

        let entity_type = T::TYPE.to_string();
        let id = self.id;
        let change = match self.op {
            StagedOp::Insert | StagedOp::Update if stamp.verify_audit => {
                entity.audit().verify()?;
                Some(self.row(&entity, entity_type)?)
            }
            StagedOp::Insert | StagedOp::Update => Some(self.row(&entity, entity_type)?),
            StagedOp::Remove => Some(RowChange::Remove { entity_type, id }),
            StagedOp::Detach => None,
        };
        Ok(change)
    }

    fn row(&self, entity: &T, entity_type: String) -> DomainResult<RowChange> {
        let row = serde_json::to_value(entity)?;
        let id = self.id;
        Ok(match self.op {
            StagedOp::Insert => RowChange::Insert {
                entity_type,
                id,
                row,
            },
            _ => RowChange::Update {
                entity_type,
                id,
                row,
            },
        })
    }
}

// 捕获句柄上的全部待发布事件，返回账本中被捕获的数量
// 实体副本会带着同样的事件，按事件标识去重
fn capture<T>(
    handle: &Tracked<T>,
    id: Uuid,
    stamp: &SaveStamp<'_>,
    seen: &mut HashSet<Uuid>,
    out: &mut Vec<SerializedEvent>,
) -> DomainResult<usize>
where
    T: Entity,
{
    let mut entity = handle.lock();
    let ledger = entity.events_mut();
    ledger.stamp_pending(stamp.now);
    for envelope in ledger.iter() {
        if !seen.insert(envelope.event_id()) {
            continue;
        }
        out.push(SerializedEvent::from_envelope(
            envelope,
            T::TYPE,
            id,
            stamp.audit,
            stamp.now,
        )?);
    }
    Ok(ledger.len())
}

impl<T> StagingArea for EntitySet<T>
where
    T: Entity,
{
    fn entity_type(&self) -> &'static str {
        T::TYPE
    }

    fn len(&self) -> usize {
        self.lock().order.len()
    }

    fn collect(&self, stamp: &SaveStamp<'_>) -> DomainResult<StagedBatch> {
        let mut entries = self.lock();
        let mut batch = StagedBatch::default();

        for entry in entries.order.iter_mut() {
            if let Some(change) = entry.encode(stamp)? {
                batch.changes.push(change);
            }

            let mut seen = HashSet::new();
            for (handle, captured) in entry.superseded.iter_mut() {
                *captured = capture(handle, entry.id, stamp, &mut seen, &mut batch.events)?;
            }
            entry.captured =
                capture(&entry.entity, entry.id, stamp, &mut seen, &mut batch.events)?;
        }

        Ok(batch)
    }

    fn complete(&self) {
        let mut entries = self.lock();
        for entry in entries.order.drain(..) {
            for (handle, captured) in entry.superseded {
                handle.lock().events_mut().acknowledge(captured);
            }
            entry.entity.lock().events_mut().acknowledge(entry.captured);
        }
        entries.index.clear();
    }

    fn clear(&self) -> usize {
        let mut entries = self.lock();
        let discarded = entries.order.len();
        entries.order.clear();
        entries.index.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::DomainEvent;
    use ddd_macros::{domain_event, entity};

    #[domain_event]
    enum ParcelEvent {
        Labelled { code: String },
    }

    #[entity(event = ParcelEvent)]
    struct Parcel {
        weight: u32,
    }

    fn stamp(audit: &AuditContext) -> SaveStamp<'_> {
        SaveStamp {
            now: Utc::now(),
            audit,
            verify_audit: true,
        }
    }

    #[test]
    fn merge_keeps_insert_until_flushed() {
        assert_eq!(StagedOp::Insert.merge(StagedOp::Update), StagedOp::Insert);
        assert_eq!(StagedOp::Insert.merge(StagedOp::Remove), StagedOp::Detach);
        assert_eq!(StagedOp::Update.merge(StagedOp::Remove), StagedOp::Remove);
        assert_eq!(StagedOp::Remove.merge(StagedOp::Update), StagedOp::Update);
        assert_eq!(StagedOp::Detach.merge(StagedOp::Update), StagedOp::Detach);
        assert_eq!(StagedOp::Detach.merge(StagedOp::Insert), StagedOp::Insert);
    }

    #[test]
    fn collect_reads_the_live_entity_and_complete_acknowledges() {
        let audit = AuditContext::system();
        let set = EntitySet::<Parcel>::new();
        let parcel = Tracked::new(Parcel::new(Uuid::now_v7()));
        set.stage(parcel.clone(), StagedOp::Insert);

        parcel.lock().weight = 7;
        parcel.lock().events.raise(ParcelEvent::Labelled { code: "A1".into() });

        let batch = set.collect(&stamp(&audit)).unwrap();
        assert_eq!(batch.changes.len(), 1);
        match &batch.changes[0] {
            RowChange::Insert { row, .. } => assert_eq!(row["weight"], 7),
            other => panic!("unexpected change {other:?}"),
        }
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].event_type(), "ParcelEvent.Labelled");

        // 捕获之后新引发的事件留给下一次保存
        parcel.lock().events.raise(ParcelEvent::Labelled { code: "A2".into() });
        set.complete();

        assert_eq!(set.len(), 0);
        let left: Vec<_> = parcel
            .lock()
            .events()
            .iter()
            .map(|e| e.payload().event_type().to_string())
            .collect();
        assert_eq!(left, ["ParcelEvent.Labelled"]);
    }

    #[test]
    fn restaging_with_another_handle_keeps_both_ledgers() {
        let audit = AuditContext::system();
        let set = EntitySet::<Parcel>::new();
        let id = Uuid::now_v7();

        let first = Tracked::new(Parcel::new(id));
        first.lock().events.raise(ParcelEvent::Labelled { code: "A".into() });
        set.stage(first.clone(), StagedOp::Insert);

        let mut copy = first.snapshot();
        copy.weight = 3;
        let second = Tracked::new(copy);
        second.lock().events.raise(ParcelEvent::Labelled { code: "B".into() });
        set.stage(second.clone(), StagedOp::Update);

        let batch = set.collect(&stamp(&audit)).unwrap();
        assert_eq!(set.len(), 1);
        assert!(matches!(&batch.changes[0], RowChange::Insert { row, .. } if row["weight"] == 3));
        // 副本带着 A，只交付一次；B 只在第二个句柄上
        let codes: Vec<_> = batch
            .events
            .iter()
            .map(|e| e.payload()["Labelled"]["code"].clone())
            .collect();
        assert_eq!(codes, ["A", "B"]);

        set.complete();
        assert!(first.lock().events().is_empty());
        assert!(second.lock().events().is_empty());
    }

    #[test]
    fn clear_leaves_ledgers_untouched() {
        let set = EntitySet::<Parcel>::new();
        let parcel = Tracked::new(Parcel::new(Uuid::now_v7()));
        parcel.lock().events.raise(ParcelEvent::Labelled { code: "A".into() });
        set.stage(parcel.clone(), StagedOp::Insert);

        assert_eq!(set.clear(), 1);
        assert_eq!(set.len(), 0);
        assert_eq!(parcel.lock().events().len(), 1);
    }

    #[test]
    fn changing_the_id_after_staging_is_rejected() {
        let audit = AuditContext::system();
        let set = EntitySet::<Parcel>::new();
        let parcel = Tracked::new(Parcel::new(Uuid::now_v7()));
        set.stage(parcel.clone(), StagedOp::Insert);

        parcel.lock().id = Uuid::now_v7();
        let err = set.collect(&stamp(&audit)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
    }
}
