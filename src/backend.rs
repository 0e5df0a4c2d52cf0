use crate::error::StoreError;
use crate::types::{
    Barber, Booking, BookingDraft, BookingStatus, Interval, Service, WorkingHoursTemplate,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub trait BookingBackend: Clone + Send + Sync + 'static {
    fn barber(&self, id: Uuid) -> Result<Option<Barber>, StoreError>;
    fn add_barber(&self, name: String) -> Result<Barber, StoreError>;
    fn set_barber_active(&self, id: Uuid, active: bool) -> Result<Barber, StoreError>;

    fn service(&self, id: Uuid) -> Result<Option<Service>, StoreError>;
    fn add_service(&self, name: String, duration_minutes: i32) -> Result<Service, StoreError>;

    /// An unknown barber has an empty template.
    fn working_hours(&self, barber_id: Uuid) -> Result<WorkingHoursTemplate, StoreError>;
    fn set_working_hours(
        &self,
        barber_id: Uuid,
        template: WorkingHoursTemplate,
    ) -> Result<(), StoreError>;

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Active bookings of the barber whose interval overlaps `range`, ordered
    /// by start.
    fn active_bookings(&self, barber_id: Uuid, range: Interval)
        -> Result<Vec<Booking>, StoreError>;

    /// Inserts a `pending` booking. Serialized per barber: returns
    /// `StoreError::Conflict` when an active booking overlaps the draft at
    /// insert time.
    fn insert_booking(&self, draft: BookingDraft) -> Result<Booking, StoreError>;

    /// Sets `status` only while the booking is still `expected`; otherwise
    /// returns `StoreError::StatusChanged` and leaves it untouched.
    fn update_booking_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        status: BookingStatus,
    ) -> Result<Booking, StoreError>;

    /// Moves a booking and/or replaces its notes. Serialized per barber like
    /// `insert_booking`; the booking's own interval is ignored by the overlap
    /// re-check. Fails with `StoreError::StatusChanged` unless the booking is
    /// still `expected`.
    fn reschedule_booking(
        &self,
        id: Uuid,
        expected: BookingStatus,
        start: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Booking, StoreError>;
}
