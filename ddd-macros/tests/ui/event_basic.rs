use ddd_macros::domain_event;
use ddd_persistence::domain_event::DomainEvent;
use serde::{Deserialize, Serialize};

#[domain_event(version = 1)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum InvoiceEvent {
    #[event(event_type = "invoice.issued")]
    Issued { number: String, amount: i64 },
    #[event(event_type = "invoice.voided", event_version = 2)]
    Voided { reason: String },
    Paid(i64),
    Archived,
}

fn main() {
    let issued = InvoiceEvent::Issued {
        number: "INV-1".into(),
        amount: 100,
    };
    assert_eq!(issued.event_type(), "invoice.issued");
    assert_eq!(issued.event_version(), 1);

    let voided = InvoiceEvent::Voided {
        reason: "duplicate".into(),
    };
    assert_eq!(voided.event_type(), "invoice.voided");
    assert_eq!(voided.event_version(), 2);

    assert_eq!(InvoiceEvent::Paid(5).event_type(), "InvoiceEvent.Paid");
    assert_eq!(InvoiceEvent::Archived.event_version(), 1);
}
