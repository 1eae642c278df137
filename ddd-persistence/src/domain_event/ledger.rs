use super::{DomainEvent, EventEnvelope};
use chrono::{DateTime, Utc};
use std::slice::Iter;

/// 实体上的待发布事件账本
///
/// 事件按引发顺序排列。实体自身的业务方法通过 `raise` 追加事件，
/// 只有工作单元在保存成功后才会移除账本中已被捕获的事件。
#[derive(Debug, Clone, PartialEq)]
pub struct EventLedger<E>
where
    E: DomainEvent,
{
    events: Vec<EventEnvelope<E>>,
}

impl<E> Default for EventLedger<E>
where
    E: DomainEvent,
{
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E> EventLedger<E>
where
    E: DomainEvent,
{
    /// 引发一个事件，返回分配了标识的信封
    pub fn raise(&mut self, payload: E) -> &EventEnvelope<E> {
        self.events.push(EventEnvelope::new(payload));
        &self.events[self.events.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, EventEnvelope<E>> {
        self.events.iter()
    }

    /// 为尚无发生时间的事件写入时间
    pub(crate) fn stamp_pending(&mut self, at: DateTime<Utc>) {
        for envelope in &mut self.events {
            envelope.stamp(at);
        }
    }

    /// 移除最早的 `count` 个事件（已被一次成功的保存捕获）
    pub(crate) fn acknowledge(&mut self, count: usize) {
        let count = count.min(self.events.len());
        self.events.drain(..count);
    }
}

impl<'a, E> IntoIterator for &'a EventLedger<E>
where
    E: DomainEvent,
{
    type Item = &'a EventEnvelope<E>;
    type IntoIter = Iter<'a, EventEnvelope<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Ping {
        Sent { n: u32 },
    }

    impl DomainEvent for Ping {
        fn event_type(&self) -> &str {
            "Ping.Sent"
        }

        fn event_version(&self) -> usize {
            1
        }
    }

    #[test]
    fn raise_keeps_insertion_order_and_unique_ids() {
        let mut ledger = EventLedger::<Ping>::default();
        let first = ledger.raise(Ping::Sent { n: 1 }).event_id();
        let second = ledger.raise(Ping::Sent { n: 2 }).event_id();

        assert_ne!(first, second);
        let payloads: Vec<_> = ledger.iter().map(|e| e.payload().clone()).collect();
        assert_eq!(payloads, vec![Ping::Sent { n: 1 }, Ping::Sent { n: 2 }]);
    }

    #[test]
    fn stamping_keeps_the_first_time_seen() {
        let mut ledger = EventLedger::<Ping>::default();
        ledger.raise(Ping::Sent { n: 1 });
        assert_eq!(ledger.iter().next().and_then(|e| e.occurred_on()), None);

        let first = Utc::now();
        ledger.stamp_pending(first);
        ledger.raise(Ping::Sent { n: 2 });
        ledger.stamp_pending(first + chrono::Duration::seconds(5));

        let stamps: Vec<_> = ledger.iter().map(|e| e.occurred_on()).collect();
        assert_eq!(
            stamps,
            vec![Some(first), Some(first + chrono::Duration::seconds(5))]
        );
    }

    #[test]
    fn acknowledge_removes_only_captured_events() {
        let mut ledger = EventLedger::<Ping>::default();
        ledger.raise(Ping::Sent { n: 1 });
        ledger.raise(Ping::Sent { n: 2 });
        ledger.raise(Ping::Sent { n: 3 });

        ledger.acknowledge(2);
        let left: Vec<_> = ledger.iter().map(|e| e.payload().clone()).collect();
        assert_eq!(left, vec![Ping::Sent { n: 3 }]);

        ledger.acknowledge(10);
        assert!(ledger.is_empty());
    }
}
