use crate::{
    availability::{compute_available_slots, window_interval},
    backend::BookingBackend,
    clock::Clock,
    error::{BookingError, RejectionReason, StoreError},
    lifecycle::{authorize_modification, authorize_transition, LeadTimes},
    reminders::ReminderQueue,
    types::{
        Actor, Barber, Booking, BookingDraft, BookingStatus, Interval, Service, Slot,
        WorkingHoursTemplate, MAX_DURATION_MINUTES,
    },
};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// A write that loses against a concurrent booking is re-run this many times
/// before the caller sees `SLOT_TAKEN`.
const CONFLICT_RETRIES: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    pub default_slot_minutes: i64,
    pub lead_times: LeadTimes,
    pub reminder_lead: Duration,
    /// Offset the working hours are declared in.
    pub utc_offset: FixedOffset,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            default_slot_minutes: 60,
            lead_times: LeadTimes::default(),
            reminder_lead: Duration::hours(24),
            utc_offset: Utc.fix(),
        }
    }
}

fn valid_minutes(minutes: i64) -> bool {
    (1..=MAX_DURATION_MINUTES).contains(&minutes)
}

fn not_found_as(err: StoreError, reason: RejectionReason) -> BookingError {
    match err {
        StoreError::NotFound => reason.into(),
        other => other.into(),
    }
}

pub struct BookingManager<B: BookingBackend> {
    backend: B,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
    reminders: ReminderQueue,
}

impl<B: BookingBackend> Clone for BookingManager<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            clock: self.clock.clone(),
            policy: self.policy,
            reminders: self.reminders.clone(),
        }
    }
}

impl<B: BookingBackend> BookingManager<B> {
    pub fn new(backend: B, clock: Arc<dyn Clock>, policy: BookingPolicy) -> Self {
        Self {
            backend,
            clock,
            policy,
            reminders: ReminderQueue::default(),
        }
    }

    pub fn reminders(&self) -> &ReminderQueue {
        &self.reminders
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.policy.utc_offset).date_naive()
    }

    fn active_barber(&self, barber_id: Uuid) -> Result<Barber, BookingError> {
        match self.backend.barber(barber_id)? {
            Some(barber) if barber.active => Ok(barber),
            _ => Err(RejectionReason::BarberNotFound.into()),
        }
    }

    fn day_window(
        &self,
        barber_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Interval>, BookingError> {
        let template = self.backend.working_hours(barber_id)?;
        match template.window(date.weekday()) {
            Some(window) => window_interval(window, date, self.policy.utc_offset)
                .map(Some)
                .ok_or(RejectionReason::OutOfRange.into()),
            None => Ok(None),
        }
    }

    /// Free slots of `barber_id` on the shop-local `date`.
    pub fn availability(
        &self,
        barber_id: Uuid,
        date: NaiveDate,
        slot_minutes: Option<i64>,
        service_id: Option<Uuid>,
    ) -> Result<Vec<Slot>, BookingError> {
        let slot_minutes = slot_minutes.unwrap_or(self.policy.default_slot_minutes);
        if !valid_minutes(slot_minutes) {
            return Err(RejectionReason::InvalidSlotSize.into());
        }

        let now = self.clock.now();
        if date < self.local_date(now) {
            return Err(RejectionReason::PastDate.into());
        }
        self.active_barber(barber_id)?;

        let span_minutes = match service_id {
            Some(service_id) => self.service(service_id)?.duration_minutes as i64,
            None => slot_minutes,
        };

        let Some(window) = self.day_window(barber_id, date)? else {
            debug!(%barber_id, %date, "Barber does not work on this day");
            return Ok(vec![]);
        };
        let bookings = self.backend.active_bookings(barber_id, window)?;

        Ok(compute_available_slots(
            window,
            slot_minutes,
            span_minutes,
            &bookings,
            Some(now),
        ))
    }

    /// Rules every new or moved booking has to pass, checked against the
    /// current booking snapshot. `ignore` excludes a booking that is being
    /// moved.
    fn check_booking(
        &self,
        barber_id: Uuid,
        interval: Interval,
        ignore: Option<Uuid>,
    ) -> Result<(), BookingError> {
        if interval.start <= self.clock.now() {
            return Err(RejectionReason::PastDate.into());
        }

        self.active_barber(barber_id)?;

        let date = self.local_date(interval.start);
        match self.day_window(barber_id, date)? {
            Some(window) if window.contains(&interval) => {}
            _ => return Err(RejectionReason::OutsideWorkingHours.into()),
        }

        let taken = self
            .backend
            .active_bookings(barber_id, interval)?
            .iter()
            .any(|booking| Some(booking.id) != ignore);
        if taken {
            return Err(RejectionReason::SlotTaken.into());
        }
        Ok(())
    }

    fn schedule_reminder(&self, booking: &Booking) {
        let now = self.clock.now();
        let due = booking
            .start
            .checked_sub_signed(self.policy.reminder_lead)
            .map_or(now, |due| due.max(now));
        self.reminders.schedule(booking.id, due);
    }

    /// Validates and atomically inserts a `pending` booking.
    pub fn try_create_booking(
        &self,
        barber_id: Uuid,
        client_id: Uuid,
        service_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
        notes: Option<String>,
    ) -> Result<Booking, BookingError> {
        if !valid_minutes(duration_minutes as i64) {
            return Err(RejectionReason::InvalidDuration.into());
        }
        let interval = Interval::checked(start, duration_minutes as i64)
            .ok_or(RejectionReason::OutOfRange)?;

        let draft = BookingDraft {
            barber_id,
            client_id,
            service_id,
            start,
            duration_minutes,
            notes,
            created_at: self.clock.now(),
        };

        for attempt in 0..=CONFLICT_RETRIES {
            self.check_booking(barber_id, interval, None)
                .inspect_err(|err| debug!(%barber_id, %start, ?err, "Booking rejected"))?;

            match self.backend.insert_booking(draft.clone()) {
                Ok(booking) => {
                    info!(booking_id = %booking.id, %barber_id, %start, "Booking created");
                    self.schedule_reminder(&booking);
                    return Ok(booking);
                }
                Err(StoreError::Conflict) => {
                    debug!(%barber_id, %start, attempt, "Lost booking race");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(RejectionReason::SlotTaken.into())
    }

    /// Books `service_id`, taking the duration from the service.
    pub fn create_booking(
        &self,
        barber_id: Uuid,
        client_id: Uuid,
        service_id: Uuid,
        start: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Booking, BookingError> {
        let service = self.service(service_id)?;
        self.try_create_booking(
            barber_id,
            client_id,
            service_id,
            start,
            service.duration_minutes,
            notes,
        )
    }

    pub fn booking(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.backend
            .booking(id)?
            .ok_or(RejectionReason::BookingNotFound.into())
    }

    pub fn cancel_booking(&self, id: Uuid, actor: Actor) -> Result<Booking, BookingError> {
        self.update_booking_status(id, BookingStatus::Cancelled, actor)
    }

    /// Applies a lifecycle transition. The write only lands while the booking
    /// still has the status it was authorized against; a concurrent change
    /// makes it re-read and re-authorize.
    pub fn update_booking_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        actor: Actor,
    ) -> Result<Booking, BookingError> {
        for attempt in 0..=CONFLICT_RETRIES {
            let booking = self.booking(id)?;
            authorize_transition(
                actor,
                &booking,
                status,
                self.clock.now(),
                self.policy.lead_times,
            )
            .inspect_err(|reason| {
                debug!(booking_id = %id, ?actor, %status, %reason, "Status change rejected")
            })?;

            match self
                .backend
                .update_booking_status(id, booking.status, status)
            {
                Ok(updated) => {
                    if !updated.status.is_active() {
                        self.reminders.cancel(id);
                    }
                    info!(booking_id = %id, %status, "Booking status updated");
                    return Ok(updated);
                }
                Err(StoreError::StatusChanged) => {
                    debug!(booking_id = %id, %status, attempt, "Booking status changed underneath");
                }
                Err(err) => return Err(not_found_as(err, RejectionReason::BookingNotFound)),
            }
        }
        Err(RejectionReason::InvalidTransition.into())
    }

    /// Moves a booking and/or replaces its notes.
    pub fn modify_booking(
        &self,
        id: Uuid,
        start: Option<DateTime<Utc>>,
        notes: Option<String>,
        actor: Actor,
    ) -> Result<Booking, BookingError> {
        let mut last_error = RejectionReason::SlotTaken;
        for attempt in 0..=CONFLICT_RETRIES {
            let booking = self.booking(id)?;
            authorize_modification(actor, &booking, self.clock.now(), self.policy.lead_times)
                .inspect_err(|reason| {
                    debug!(booking_id = %id, ?actor, %reason, "Modification rejected")
                })?;

            let target = start.unwrap_or(booking.start);
            if start.is_some() {
                let interval = Interval::checked(target, booking.duration_minutes as i64)
                    .ok_or(RejectionReason::OutOfRange)?;
                self.check_booking(booking.barber_id, interval, Some(id))?;
            }

            match self
                .backend
                .reschedule_booking(id, booking.status, target, notes.clone())
            {
                Ok(moved) => {
                    if start.is_some() {
                        info!(booking_id = %id, start = %target, "Booking rescheduled");
                        self.schedule_reminder(&moved);
                    }
                    return Ok(moved);
                }
                Err(StoreError::Conflict) => {
                    debug!(booking_id = %id, start = %target, attempt, "Lost reschedule race");
                    last_error = RejectionReason::SlotTaken;
                }
                Err(StoreError::StatusChanged) => {
                    debug!(booking_id = %id, attempt, "Booking status changed underneath");
                    last_error = RejectionReason::BookingClosed;
                }
                Err(err) => return Err(not_found_as(err, RejectionReason::BookingNotFound)),
            }
        }
        Err(last_error.into())
    }

    pub fn add_barber(&self, name: String) -> Result<Barber, BookingError> {
        let barber = self.backend.add_barber(name)?;
        info!(barber_id = %barber.id, "Barber added");
        Ok(barber)
    }

    pub fn set_barber_active(&self, id: Uuid, active: bool) -> Result<Barber, BookingError> {
        self.backend
            .set_barber_active(id, active)
            .map_err(|err| not_found_as(err, RejectionReason::BarberNotFound))
    }

    pub fn service(&self, id: Uuid) -> Result<Service, BookingError> {
        self.backend
            .service(id)?
            .ok_or(RejectionReason::ServiceNotFound.into())
    }

    pub fn add_service(
        &self,
        name: String,
        duration_minutes: i32,
    ) -> Result<Service, BookingError> {
        if !valid_minutes(duration_minutes as i64) {
            return Err(RejectionReason::InvalidDuration.into());
        }
        Ok(self.backend.add_service(name, duration_minutes)?)
    }

    pub fn working_hours(&self, barber_id: Uuid) -> Result<WorkingHoursTemplate, BookingError> {
        if self.backend.barber(barber_id)?.is_none() {
            return Err(RejectionReason::BarberNotFound.into());
        }
        Ok(self.backend.working_hours(barber_id)?)
    }

    pub fn set_working_hours(
        &self,
        barber_id: Uuid,
        template: WorkingHoursTemplate,
    ) -> Result<(), BookingError> {
        let invalid = template
            .0
            .values()
            .flatten()
            .any(|window| window.open >= window.close);
        if invalid {
            return Err(RejectionReason::InvalidWorkingHours.into());
        }

        self.backend
            .set_working_hours(barber_id, template)
            .map_err(|err| not_found_as(err, RejectionReason::BarberNotFound))?;
        info!(%barber_id, "Working hours updated");
        Ok(())
    }
}
