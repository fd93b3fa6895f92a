//! Per-device session bookkeeping for the discovery loop.
//!
//! The tracker decides, for each poll of the attached-device list, which
//! devices get a new session. It enforces two rules:
//!
//! - at most one live session per device
//! - a finished device is not reprocessed until its cooldown elapses
//!
//! A device that disappears from the attached list loses its history, so a
//! later re-attach starts fresh. If it disappears mid-session, the live
//! session keeps its slot until it finishes and is then forgotten.
//!
//! All methods take `now` explicitly; the tracker never reads the clock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::device::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    /// A session for this device is running.
    active: bool,
    /// When the last session finished.
    last_processed: Option<Instant>,
    /// The device left the attached list while its session was running.
    detached: bool,
}

/// Bookkeeping for every device the loop knows about.
#[derive(Debug, Clone)]
pub struct DeviceTracker {
    cooldown: Duration,
    entries: HashMap<DeviceId, Entry>,
}

impl DeviceTracker {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            entries: HashMap::new(),
        }
    }

    /// Reconcile with the current attached list.
    ///
    /// Returns the devices that should start a session now, already
    /// registered as active. Devices no longer attached are forgotten.
    pub fn poll(&mut self, attached: &[DeviceId], now: Instant) -> Vec<DeviceId> {
        self.forget_missing(attached);

        let mut starts = Vec::new();
        for device in attached {
            let entry = self.entries.entry(device.clone()).or_insert(Entry {
                active: false,
                last_processed: None,
                detached: false,
            });
            // Back on the list while its old session still runs.
            entry.detached = false;
            if entry.active {
                continue;
            }
            let due = entry
                .last_processed
                .map_or(true, |at| now.saturating_duration_since(at) > self.cooldown);
            if due {
                entry.active = true;
                starts.push(device.clone());
            }
        }
        starts
    }

    /// Record that a device's session ended.
    pub fn finish(&mut self, device: &DeviceId, now: Instant) {
        let Some(entry) = self.entries.get_mut(device) else {
            return;
        };
        if entry.detached {
            self.entries.remove(device);
            return;
        }
        entry.active = false;
        entry.last_processed = Some(now);
    }

    fn forget_missing(&mut self, attached: &[DeviceId]) {
        self.entries.retain(|device, entry| {
            if attached.contains(device) {
                return true;
            }
            if entry.active {
                entry.detached = true;
                entry.last_processed = None;
                return true;
            }
            false
        });
    }

    /// Whether a session for this device is running.
    #[cfg(test)]
    #[must_use]
    pub fn is_active(&self, device: &DeviceId) -> bool {
        self.entries.get(device).is_some_and(|e| e.active)
    }

    /// Number of running sessions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.entries.values().filter(|e| e.active).count()
    }

    /// Whether the tracker holds any history for this device.
    #[cfg(test)]
    #[must_use]
    pub fn knows(&self, device: &DeviceId) -> bool {
        self.entries.contains_key(device)
    }
}
