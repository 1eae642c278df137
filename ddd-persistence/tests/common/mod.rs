#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use ddd_macros::{domain_event, entity};
use ddd_persistence::UnitOfWork;
use ddd_persistence::audit::{AuditContext, ManualClock};
use ddd_persistence::eventing::InMemoryEventDispatcher;
use ddd_persistence::persist::InMemoryStore;
use std::sync::Arc;

#[domain_event(version = 1)]
pub enum OrderEvent {
    Placed { customer: String, total: i64 },
    #[event(event_version = 2)]
    Shipped { carrier: String },
}

#[entity(event = OrderEvent)]
pub struct Order {
    pub customer: String,
    pub total: i64,
    pub status: String,
}

impl Order {
    pub fn place(id: ddd_persistence::uuid::Uuid, customer: &str, total: i64) -> Self {
        use ddd_persistence::Entity;

        let mut order = Order::new(id);
        order.customer = customer.to_string();
        order.total = total;
        order.status = "placed".to_string();
        order.events.raise(OrderEvent::Placed {
            customer: customer.to_string(),
            total,
        });
        order
    }

    pub fn ship(&mut self, carrier: &str) {
        self.status = "shipped".to_string();
        self.events.raise(OrderEvent::Shipped {
            carrier: carrier.to_string(),
        });
    }
}

#[entity(name = "customers", auditable)]
pub struct Customer {
    pub name: String,
    pub tier: String,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ddd_persistence=debug")
        .with_test_writer()
        .try_init();
}

/// 测试夹具：共享存储 + 手动时钟 + 内存分发器
pub struct Harness {
    pub store: InMemoryStore,
    pub clock: Arc<ManualClock>,
    pub dispatcher: Arc<InMemoryEventDispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        Self {
            store: InMemoryStore::new(),
            clock: Arc::new(ManualClock::new(t0())),
            dispatcher: Arc::new(InMemoryEventDispatcher::default()),
        }
    }

    pub fn uow(&self) -> UnitOfWork {
        UnitOfWork::builder()
            .session(Arc::new(self.store.session()))
            .clock(self.clock.clone())
            .dispatcher(self.dispatcher.clone())
            .audit(
                AuditContext::builder()
                    .actor_id("alice".to_string())
                    .actor_type("user".to_string())
                    .correlation_id("req-1".to_string())
                    .build(),
            )
            .build()
    }
}
