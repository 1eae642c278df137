use ddd_macros::domain_event;
use ddd_persistence::domain_event::DomainEvent;

#[domain_event]
enum StockEvent {
    Received { sku: String, qty: u32 },
}

fn main() {
    let event = StockEvent::Received {
        sku: "A-1".into(),
        qty: 3,
    };
    assert_eq!(event.event_type(), "StockEvent.Received");
    assert_eq!(event.event_version(), 1);
    assert_eq!(event.clone(), event);
}
