use ddd_macros::entity;
use ddd_persistence::entity::{Entity, new_entity_id};

#[entity]
struct Warehouse {
    code: String,
    capacity: u32,
}

fn main() {
    let id = new_entity_id();
    let w = Warehouse::new(id);

    assert_eq!(Warehouse::TYPE, "warehouse");
    assert_eq!(w.id(), id);
    assert!(w.code.is_empty());
    assert_eq!(w.capacity, 0);
    assert!(!w.is_deleted());
    assert!(w.events().is_empty());

    // 审计字段平铺，事件账本不序列化
    let row = serde_json::to_value(&w).unwrap();
    assert!(row.get("is_deleted").is_some());
    assert!(row.get("audit").is_none());
    assert!(row.get("events").is_none());
}
