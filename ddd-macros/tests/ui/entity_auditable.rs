use ddd_macros::{domain_event, entity};
use ddd_persistence::entity::{AuditableEntity, Entity};
use ddd_persistence::uuid::Uuid;

#[domain_event]
enum TicketEvent {
    Escalated { level: u8 },
}

#[entity(name = "support_ticket", event = TicketEvent, auditable, debug = false)]
struct Ticket {
    id: Uuid,
    subject: String,
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket").field("id", &self.id).finish()
    }
}

impl Ticket {
    fn escalate(&mut self, level: u8) {
        self.events.raise(TicketEvent::Escalated { level });
    }
}

fn main() {
    let mut t = Ticket::new(Uuid::now_v7());
    assert_eq!(Ticket::TYPE, "support_ticket");

    t.set_notes(Some("vip".into()));
    assert_eq!(t.notes(), Some("vip"));
    assert_eq!(t.version(), 0);
    assert_eq!(t.bump_version(), 1);

    t.escalate(2);
    assert_eq!(t.events().len(), 1);
    let _ = format!("{t:?}");
}
