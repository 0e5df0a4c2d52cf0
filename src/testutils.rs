use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use uuid::Uuid;

use crate::{
    backend::BookingBackend,
    error::StoreError,
    types::{
        Barber, Booking, BookingDraft, BookingStatus, Interval, Service, WorkingHoursTemplate,
    },
};

/// Backend double. Reads always succeed; writes fail while `success` is
/// false, and `insert_booking`/`reschedule_booking` report a lost race while
/// `conflicts_remaining` is above zero.
pub struct MockBookingBackendInner {
    pub success: AtomicBool,
    pub conflicts_remaining: AtomicU64,
    pub calls_to_active_bookings: AtomicU64,
    pub calls_to_insert_booking: AtomicU64,
    pub calls_to_update_booking_status: AtomicU64,
    pub calls_to_reschedule_booking: AtomicU64,
    pub calls_to_add_barber: AtomicU64,
    pub calls_to_add_service: AtomicU64,
    pub calls_to_set_working_hours: AtomicU64,
    pub barbers: Mutex<HashMap<Uuid, Barber>>,
    pub working_hours: Mutex<HashMap<Uuid, WorkingHoursTemplate>>,
    pub bookings: Mutex<HashMap<Uuid, Booking>>,
}

#[derive(Clone)]
pub struct MockBookingBackend(pub Arc<MockBookingBackendInner>);

impl MockBookingBackendInner {
    fn new() -> Self {
        Self {
            success: AtomicBool::new(true),
            conflicts_remaining: AtomicU64::default(),
            calls_to_active_bookings: AtomicU64::default(),
            calls_to_insert_booking: AtomicU64::default(),
            calls_to_update_booking_status: AtomicU64::default(),
            calls_to_reschedule_booking: AtomicU64::default(),
            calls_to_add_barber: AtomicU64::default(),
            calls_to_add_service: AtomicU64::default(),
            calls_to_set_working_hours: AtomicU64::default(),
            barbers: Mutex::default(),
            working_hours: Mutex::default(),
            bookings: Mutex::default(),
        }
    }
}

impl MockBookingBackend {
    pub fn new() -> Self {
        Self(Arc::new(MockBookingBackendInner::new()))
    }

    /// Registers an active barber working `open..close` on `weekday`.
    pub fn open_barber(&self, weekday: Weekday, open: NaiveTime, close: NaiveTime) -> Uuid {
        let id = Uuid::new_v4();
        self.0.barbers.lock().unwrap().insert(
            id,
            Barber {
                id,
                name: "Mock".into(),
                active: true,
            },
        );
        self.0.working_hours.lock().unwrap().insert(
            id,
            WorkingHoursTemplate::default().with_day(weekday, open, close),
        );
        id
    }

    pub fn insert(&self, booking: Booking) {
        self.0.bookings.lock().unwrap().insert(booking.id, booking);
    }

    fn lose_race(&self) -> bool {
        self.0
            .conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    fn result(&self) -> Result<(), StoreError> {
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(StoreError::Database(
                diesel::result::Error::BrokenTransactionManager,
            )),
        }
    }
}

impl BookingBackend for MockBookingBackend {
    fn barber(&self, id: Uuid) -> Result<Option<Barber>, StoreError> {
        Ok(self.0.barbers.lock().unwrap().get(&id).cloned())
    }

    fn add_barber(&self, name: String) -> Result<Barber, StoreError> {
        self.0.calls_to_add_barber.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        let barber = Barber {
            id: Uuid::new_v4(),
            name,
            active: true,
        };
        self.0.barbers.lock().unwrap().insert(barber.id, barber.clone());
        Ok(barber)
    }

    fn set_barber_active(&self, id: Uuid, active: bool) -> Result<Barber, StoreError> {
        self.result()?;
        let mut barbers = self.0.barbers.lock().unwrap();
        let barber = barbers.get_mut(&id).ok_or(StoreError::NotFound)?;
        barber.active = active;
        Ok(barber.clone())
    }

    fn service(&self, id: Uuid) -> Result<Option<Service>, StoreError> {
        Ok(Some(Service {
            id,
            name: "Mock service".into(),
            duration_minutes: 30,
        }))
    }

    fn add_service(&self, name: String, duration_minutes: i32) -> Result<Service, StoreError> {
        self.0.calls_to_add_service.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(Service {
            id: Uuid::new_v4(),
            name,
            duration_minutes,
        })
    }

    fn working_hours(&self, barber_id: Uuid) -> Result<WorkingHoursTemplate, StoreError> {
        Ok(self
            .0
            .working_hours
            .lock()
            .unwrap()
            .get(&barber_id)
            .cloned()
            .unwrap_or_default())
    }

    fn set_working_hours(
        &self,
        barber_id: Uuid,
        template: WorkingHoursTemplate,
    ) -> Result<(), StoreError> {
        self.0.calls_to_set_working_hours.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        self.0.working_hours.lock().unwrap().insert(barber_id, template);
        Ok(())
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.0.bookings.lock().unwrap().get(&id).cloned())
    }

    fn active_bookings(
        &self,
        barber_id: Uuid,
        range: Interval,
    ) -> Result<Vec<Booking>, StoreError> {
        self.0.calls_to_active_bookings.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .0
            .bookings
            .lock()
            .unwrap()
            .values()
            .filter(|booking| booking.barber_id == barber_id && booking.overlaps(&range))
            .cloned()
            .collect())
    }

    fn insert_booking(&self, draft: BookingDraft) -> Result<Booking, StoreError> {
        self.0.calls_to_insert_booking.fetch_add(1, Ordering::SeqCst);
        self.result()?;

        if self.lose_race() {
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
        self.insert(booking.clone());
        Ok(booking)
    }

    fn update_booking_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        status: BookingStatus,
    ) -> Result<Booking, StoreError> {
        self.0
            .calls_to_update_booking_status
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        let mut bookings = self.0.bookings.lock().unwrap();
        let booking = bookings.get_mut(&id).ok_or(StoreError::NotFound)?;
        if booking.status != expected {
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
        self.0
            .calls_to_reschedule_booking
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        if self.lose_race() {
            return Err(StoreError::Conflict);
        }

        let mut bookings = self.0.bookings.lock().unwrap();
        let booking = bookings.get_mut(&id).ok_or(StoreError::NotFound)?;
        if booking.status != expected {
            return Err(StoreError::StatusChanged);
        }
        booking.start = start;
        if notes.is_some() {
            booking.notes = notes;
        }
        Ok(booking.clone())
    }
}

/// Wraps a backend and hands out `stale` from the first `booking` lookup of
/// its id, as if another writer changed the booking right after it was read.
#[derive(Clone)]
pub struct StaleFirstRead<B: BookingBackend> {
    pub inner: B,
    pub stale: Arc<Mutex<Option<Booking>>>,
}

impl<B: BookingBackend> StaleFirstRead<B> {
    pub fn new(inner: B, stale: Booking) -> Self {
        Self {
            inner,
            stale: Arc::new(Mutex::new(Some(stale))),
        }
    }
}

impl<B: BookingBackend> BookingBackend for StaleFirstRead<B> {
    fn barber(&self, id: Uuid) -> Result<Option<Barber>, StoreError> {
        self.inner.barber(id)
    }

    fn add_barber(&self, name: String) -> Result<Barber, StoreError> {
        self.inner.add_barber(name)
    }

    fn set_barber_active(&self, id: Uuid, active: bool) -> Result<Barber, StoreError> {
        self.inner.set_barber_active(id, active)
    }

    fn service(&self, id: Uuid) -> Result<Option<Service>, StoreError> {
        self.inner.service(id)
    }

    fn add_service(&self, name: String, duration_minutes: i32) -> Result<Service, StoreError> {
        self.inner.add_service(name, duration_minutes)
    }

    fn working_hours(&self, barber_id: Uuid) -> Result<WorkingHoursTemplate, StoreError> {
        self.inner.working_hours(barber_id)
    }

    fn set_working_hours(
        &self,
        barber_id: Uuid,
        template: WorkingHoursTemplate,
    ) -> Result<(), StoreError> {
        self.inner.set_working_hours(barber_id, template)
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let mut stale = self.stale.lock().unwrap();
        if stale.as_ref().is_some_and(|booking| booking.id == id) {
            return Ok(stale.take());
        }
        self.inner.booking(id)
    }

    fn active_bookings(
        &self,
        barber_id: Uuid,
        range: Interval,
    ) -> Result<Vec<Booking>, StoreError> {
        self.inner.active_bookings(barber_id, range)
    }

    fn insert_booking(&self, draft: BookingDraft) -> Result<Booking, StoreError> {
        self.inner.insert_booking(draft)
    }

    fn update_booking_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        status: BookingStatus,
    ) -> Result<Booking, StoreError> {
        self.inner.update_booking_status(id, expected, status)
    }

    fn reschedule_booking(
        &self,
        id: Uuid,
        expected: BookingStatus,
        start: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Booking, StoreError> {
        self.inner.reschedule_booking(id, expected, start, notes)
    }
}
