//! Per-field option slots for an editor session.
//!
//! Fetches for different fields never share a slot. For the same field, a completion is
//! applied only if no newer fetch has been applied yet and the field has not been cleared
//! since the fetch began.

use crate::{frames::SelectableOption, options::Field};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Identifies one in-flight fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    field: Field,
    generation: u64,
}

impl Ticket {
    pub fn field(&self) -> Field {
        self.field
    }
}

#[derive(Debug, Default)]
struct Slot {
    issued: u64,
    applied: u64,
    floor: u64,
    in_flight: usize,
    options: Vec<SelectableOption>,
}

#[derive(Debug, Default)]
pub struct OptionSlots {
    slots: Mutex<HashMap<Field, Slot>>,
}

impl OptionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, field: Field) -> Ticket {
        let mut slots = self.slots.lock();
        let slot = slots.entry(field).or_default();
        slot.issued += 1;
        slot.in_flight += 1;
        Ticket {
            field,
            generation: slot.issued,
        }
    }

    /// Stores `options` if the ticket is still current. Returns whether they were applied.
    pub fn complete(&self, ticket: Ticket, options: Vec<SelectableOption>) -> bool {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&ticket.field) else {
            return false;
        };
        if ticket.generation <= slot.floor {
            return false;
        }
        slot.in_flight = slot.in_flight.saturating_sub(1);

        if ticket.generation <= slot.applied {
            return false;
        }
        slot.applied = ticket.generation;
        slot.options = options;
        true
    }

    /// Releases a ticket whose fetch failed, keeping the current options.
    pub fn abandon(&self, ticket: Ticket) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&ticket.field) {
            if ticket.generation > slot.floor {
                slot.in_flight = slot.in_flight.saturating_sub(1);
            }
        }
    }

    /// Empties the slot and invalidates every ticket issued for it so far.
    pub fn clear(&self, field: Field) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&field) {
            slot.floor = slot.issued;
            slot.applied = slot.issued;
            slot.in_flight = 0;
            slot.options.clear();
        }
    }

    pub fn options(&self, field: Field) -> Vec<SelectableOption> {
        self.slots
            .lock()
            .get(&field)
            .map(|slot| slot.options.clone())
            .unwrap_or_default()
    }

    pub fn is_loading(&self, field: Field) -> bool {
        self.slots
            .lock()
            .get(&field)
            .is_some_and(|slot| slot.in_flight > 0)
    }

    /// Fields with at least one fetch still outstanding.
    pub fn loading(&self) -> Vec<Field> {
        let slots = self.slots.lock();
        Field::ALL
            .into_iter()
            .filter(|field| slots.get(field).is_some_and(|slot| slot.in_flight > 0))
            .collect()
    }
}
