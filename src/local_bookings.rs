use crate::{
    backend::BookingBackend,
    error::StoreError,
    types::{
        Barber, Booking, BookingDraft, BookingStatus, Interval, Service, WorkingHoursTemplate,
    },
};
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Store {
    barbers: HashMap<Uuid, Barber>,
    services: HashMap<Uuid, Service>,
    working_hours: HashMap<Uuid, WorkingHoursTemplate>,
    bookings: HashMap<Uuid, Booking>,
}

impl Store {
    fn has_overlap(&self, barber_id: Uuid, interval: &Interval, ignore: Option<Uuid>) -> bool {
        self.bookings.values().any(|booking| {
            booking.barber_id == barber_id
                && Some(booking.id) != ignore
                && booking.overlaps(interval)
        })
    }
}

/// Impersistent backend. Every mutation runs under one lock, which also
/// serializes the overlap re-check with the write.
#[derive(Debug, Clone, Default)]
pub struct LocalBookings {
    store: Arc<Mutex<Store>>,
}

impl LocalBookings {
    fn lock(&self) -> Result<MutexGuard<'_, Store>, StoreError> {
        self.store.lock().map_err(|_| {
            error!("Local booking store lock poisoned");
            StoreError::Poisoned
        })
    }
}

impl BookingBackend for LocalBookings {
    fn barber(&self, id: Uuid) -> Result<Option<Barber>, StoreError> {
        Ok(self.lock()?.barbers.get(&id).cloned())
    }

    fn add_barber(&self, name: String) -> Result<Barber, StoreError> {
        let barber = Barber {
            id: Uuid::new_v4(),
            name,
            active: true,
        };
        self.lock()?.barbers.insert(barber.id, barber.clone());
        Ok(barber)
    }

    fn set_barber_active(&self, id: Uuid, active: bool) -> Result<Barber, StoreError> {
        let mut store = self.lock()?;
        let barber = store.barbers.get_mut(&id).ok_or(StoreError::NotFound)?;
        barber.active = active;
        Ok(barber.clone())
    }

    fn service(&self, id: Uuid) -> Result<Option<Service>, StoreError> {
        Ok(self.lock()?.services.get(&id).cloned())
    }

    fn add_service(&self, name: String, duration_minutes: i32) -> Result<Service, StoreError> {
        let service = Service {
            id: Uuid::new_v4(),
            name,
            duration_minutes,
        };
        self.lock()?.services.insert(service.id, service.clone());
        Ok(service)
    }

    fn working_hours(&self, barber_id: Uuid) -> Result<WorkingHoursTemplate, StoreError> {
        Ok(self
            .lock()?
            .working_hours
            .get(&barber_id)
            .cloned()
            .unwrap_or_default())
    }

    fn set_working_hours(
        &self,
        barber_id: Uuid,
        template: WorkingHoursTemplate,
    ) -> Result<(), StoreError> {
        let mut store = self.lock()?;
        if !store.barbers.contains_key(&barber_id) {
            return Err(StoreError::NotFound);
        }
        store.working_hours.insert(barber_id, template);
        Ok(())
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.lock()?.bookings.get(&id).cloned())
    }

    fn active_bookings(
        &self,
        barber_id: Uuid,
        range: Interval,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut bookings: Vec<Booking> = self
            .lock()?
            .bookings
            .values()
            .filter(|booking| booking.barber_id == barber_id && booking.overlaps(&range))
            .cloned()
            .collect();
        bookings.sort_unstable_by(|a, b| a.start.cmp(&b.start));
        Ok(bookings)
    }

    fn insert_booking(&self, draft: BookingDraft) -> Result<Booking, StoreError> {
        let mut store = self.lock()?;
        if store.has_overlap(draft.barber_id, &draft.interval(), None) {
            debug!(
                barber_id = %draft.barber_id,
                start = %draft.start,
                "Insert lost against an overlapping booking"
            );
            return Err(StoreError::Conflict);
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            barber_id: draft.barber_id,
            client_id: draft.client_id,
            service_id: draft.service_id,
            start: draft.start,
            duration_minutes: draft.duration_minutes,
            status: BookingStatus::Pending,
            notes: draft.notes,
            created_at: draft.created_at,
        };
        store.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    fn update_booking_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        status: BookingStatus,
    ) -> Result<Booking, StoreError> {
        let mut store = self.lock()?;
        let booking = store.bookings.get_mut(&id).ok_or(StoreError::NotFound)?;
        if booking.status != expected {
            debug!(
                booking_id = %id,
                current = %booking.status,
                %expected,
                "Status write is stale"
            );
            return Err(StoreError::StatusChanged);
        }
        booking.status = status;
        Ok(booking.clone())
    }

    fn reschedule_booking(
        &self,
        id: Uuid,
        expected: BookingStatus,
        start: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Booking, StoreError> {
        let mut store = self.lock()?;
        let current = store.bookings.get(&id).cloned().ok_or(StoreError::NotFound)?;
        if current.status != expected {
            return Err(StoreError::StatusChanged);
        }

        let interval = Interval::new(start, current.duration_minutes as i64);
        if store.has_overlap(current.barber_id, &interval, Some(id)) {
            return Err(StoreError::Conflict);
        }

        let booking = store.bookings.get_mut(&id).ok_or(StoreError::NotFound)?;
        booking.start = start;
        if notes.is_some() {
            booking.notes = notes;
        }
        Ok(booking.clone())
    }
}
