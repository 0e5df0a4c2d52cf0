use crate::clock::Clock;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reminder {
    pub booking_id: Uuid,
    pub due: DateTime<Utc>,
}

/// Pending reminders keyed by booking id. Scheduling a booking twice replaces
/// its earlier entry.
#[derive(Debug, Clone, Default)]
pub struct ReminderQueue {
    reminders: Arc<Mutex<HashMap<Uuid, DateTime<Utc>>>>,
}

impl ReminderQueue {
    pub fn schedule(&self, booking_id: Uuid, due: DateTime<Utc>) {
        match self.reminders.lock() {
            Ok(mut reminders) => {
                reminders.insert(booking_id, due);
            }
            Err(err) => error!(?err, %booking_id, "Failed to schedule reminder"),
        }
    }

    pub fn cancel(&self, booking_id: Uuid) {
        match self.reminders.lock() {
            Ok(mut reminders) => {
                reminders.remove(&booking_id);
            }
            Err(err) => error!(?err, %booking_id, "Failed to cancel reminder"),
        }
    }

    #[cfg(test)]
    pub fn due_for(&self, booking_id: Uuid) -> Option<DateTime<Utc>> {
        self.reminders.lock().ok()?.get(&booking_id).copied()
    }

    /// Removes and returns every reminder due at or before `now`, earliest
    /// first.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<Reminder> {
        let mut reminders = match self.reminders.lock() {
            Ok(reminders) => reminders,
            Err(err) => {
                error!(?err, "Failed to read reminders");
                return vec![];
            }
        };

        let mut due: Vec<Reminder> = reminders
            .iter()
            .filter(|(_, due)| **due <= now)
            .map(|(booking_id, due)| Reminder {
                booking_id: *booking_id,
                due: *due,
            })
            .collect();
        for reminder in &due {
            reminders.remove(&reminder.booking_id);
        }
        due.sort_unstable_by(|a, b| a.due.cmp(&b.due));
        due
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.reminders.lock().map(|reminders| reminders.len()).unwrap_or(0)
    }
}

/// Polls `queue` every `every` and emits the reminders that came due.
pub fn spawn_dispatcher(
    queue: ReminderQueue,
    clock: Arc<dyn Clock>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            for reminder in queue.take_due(clock.now()) {
                info!(
                    booking_id = %reminder.booking_id,
                    due = %reminder.due,
                    "Sending booking reminder"
                );
            }
        }
    })
}
