//! Per-key single-flight coordination.
//!
//! Each cache key that is being recomputed owns one slot. The first caller
//! locks the slot and computes; everyone else who joins while it is running
//! waits on the same lock and reads the serialized result it leaves behind.
//! Different keys have different slots and never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

type Slot = Arc<AsyncMutex<Option<String>>>;

#[derive(Debug, Default)]
pub(crate) struct Flights {
    /// Slot and number of live members per key.
    slots: Mutex<HashMap<String, (Slot, usize)>>,
}

impl Flights {
    /// Join the flight for `key`, creating it if none is running.
    pub(crate) fn join(&self, key: &str) -> Flight<'_> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (slot, members) = slots.entry(key.to_string()).or_default();
        *members += 1;
        Flight { flights: self, key: key.to_string(), slot: slot.clone() }
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or_default()
    }
}

/// Membership in one key's flight.
///
/// Dropping the last member of a flight removes its slot from the map, so a
/// later miss on the same key starts a fresh flight.
pub(crate) struct Flight<'a> {
    flights: &'a Flights,
    key: String,
    slot: Slot,
}

impl Flight<'_> {
    pub(crate) fn slot(&self) -> &AsyncMutex<Option<String>> {
        &self.slot
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut slots = self.flights.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((_, members)) = slots.get_mut(&self.key) {
            *members -= 1;
            if *members == 0 {
                slots.remove(&self.key);
            }
        }
    }
}
