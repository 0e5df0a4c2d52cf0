use crate::backend::BookingBackend;
use crate::error::StoreError;
use crate::schema::{barbers, bookings, services, working_hours};
use crate::types::{
    Barber, Booking, BookingDraft, BookingStatus, Interval, Service, WorkingHoursTemplate,
    WorkingWindow, MAX_DURATION_MINUTES,
};
use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc, Weekday};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::Text;
use diesel::{Connection, ConnectionError, PgConnection};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};
use uuid::Uuid;

const ACTIVE_STATUSES: [&str; 2] = ["pending", "confirmed"];

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = barbers)]
struct BarberRow {
    id: Uuid,
    name: String,
    active: bool,
}

impl From<BarberRow> for Barber {
    fn from(row: BarberRow) -> Self {
        Barber {
            id: row.id,
            name: row.name,
            active: row.active,
        }
    }
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = services)]
struct ServiceRow {
    id: Uuid,
    name: String,
    duration_minutes: i32,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            id: row.id,
            name: row.name,
            duration_minutes: row.duration_minutes,
        }
    }
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = working_hours)]
struct WorkingHoursRow {
    barber_id: Uuid,
    weekday: i16,
    open_minute: i32,
    close_minute: i32,
}

fn minute_of_day(time: NaiveTime) -> i32 {
    (time.num_seconds_from_midnight() / 60) as i32
}

fn time_of_day(minute: i32) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(u32::try_from(minute).ok()? * 60, 0)
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = bookings)]
struct BookingRow {
    id: Uuid,
    barber_id: Uuid,
    client_id: Uuid,
    service_id: Uuid,
    start_at: DateTime<Utc>,
    duration_minutes: i32,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<BookingStatus>()
            .map_err(|err| StoreError::Database(DieselError::DeserializationError(err.into())))?;

        Ok(Booking {
            id: row.id,
            barber_id: row.barber_id,
            client_id: row.client_id,
            service_id: row.service_id,
            start: row.start_at,
            duration_minutes: row.duration_minutes,
            status,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

/// The partial unique index on active `(barber_id, start_at)` is the last line
/// behind the advisory lock.
fn conflict_on_unique_violation(err: StoreError) -> StoreError {
    match err {
        StoreError::Database(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            info,
        )) => {
            debug!(detail = info.message(), "Unique index rejected booking");
            StoreError::Conflict
        }
        other => other,
    }
}

/// Serializes booking writes of one barber across connections and processes
/// until the surrounding transaction ends.
fn lock_barber(connection: &mut PgConnection, barber_id: Uuid) -> Result<(), StoreError> {
    diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind::<Text, _>(barber_id.to_string())
        .execute(connection)?;
    Ok(())
}

fn overlapping_bookings(
    connection: &mut PgConnection,
    barber_id: Uuid,
    range: Interval,
    ignore: Option<Uuid>,
) -> Result<Vec<Booking>, StoreError> {
    let earliest_start = range.start - Duration::minutes(MAX_DURATION_MINUTES);

    let rows = bookings::table
        .filter(bookings::barber_id.eq(barber_id))
        .filter(bookings::status.eq_any(ACTIVE_STATUSES))
        .filter(bookings::start_at.lt(range.end))
        .filter(bookings::start_at.gt(earliest_start))
        .order(bookings::start_at.asc())
        .select(BookingRow::as_select())
        .load(connection)?;

    let mut overlapping = Vec::with_capacity(rows.len());
    for row in rows {
        let booking = Booking::try_from(row)?;
        if Some(booking.id) != ignore && booking.overlaps(&range) {
            overlapping.push(booking);
        }
    }
    Ok(overlapping)
}

/// Tells apart a missing booking from one whose status moved on, after a
/// conditional update matched no row.
fn missing_or_changed(connection: &mut PgConnection, id: Uuid) -> Result<StoreError, StoreError> {
    let exists = bookings::table
        .find(id)
        .select(bookings::id)
        .first::<Uuid>(connection)
        .optional()?
        .is_some();
    Ok(match exists {
        true => StoreError::StatusChanged,
        false => StoreError::NotFound,
    })
}

#[derive(Clone)]
pub struct DatabaseInterface {
    connection: Arc<Mutex<PgConnection>>,
}

impl DatabaseInterface {
    pub fn new(database_url: &str) -> Result<Self, ConnectionError> {
        let connection = Self::establish_connection(database_url)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn establish_connection(database_url: &str) -> Result<PgConnection, diesel::ConnectionError> {
        PgConnection::establish(database_url)
    }

    fn connection(&self) -> Result<MutexGuard<'_, PgConnection>, StoreError> {
        self.connection.lock().map_err(|_| {
            error!("Database connection lock poisoned");
            StoreError::Poisoned
        })
    }
}

impl BookingBackend for DatabaseInterface {
    fn barber(&self, id: Uuid) -> Result<Option<Barber>, StoreError> {
        let mut connection = self.connection()?;
        let row = barbers::table
            .find(id)
            .select(BarberRow::as_select())
            .first(&mut *connection)
            .optional()?;
        Ok(row.map(Barber::from))
    }

    fn add_barber(&self, name: String) -> Result<Barber, StoreError> {
        let mut connection = self.connection()?;
        let row = BarberRow {
            id: Uuid::new_v4(),
            name,
            active: true,
        };
        let row = diesel::insert_into(barbers::table)
            .values(&row)
            .returning(BarberRow::as_returning())
            .get_result(&mut *connection)?;
        Ok(row.into())
    }

    fn set_barber_active(&self, id: Uuid, active: bool) -> Result<Barber, StoreError> {
        let mut connection = self.connection()?;
        let row = diesel::update(barbers::table.find(id))
            .set(barbers::active.eq(active))
            .returning(BarberRow::as_returning())
            .get_result(&mut *connection)
            .optional()?
            .ok_or(StoreError::NotFound)?;
        Ok(row.into())
    }

    fn service(&self, id: Uuid) -> Result<Option<Service>, StoreError> {
        let mut connection = self.connection()?;
        let row = services::table
            .find(id)
            .select(ServiceRow::as_select())
            .first(&mut *connection)
            .optional()?;
        Ok(row.map(Service::from))
    }

    fn add_service(&self, name: String, duration_minutes: i32) -> Result<Service, StoreError> {
        let mut connection = self.connection()?;
        let row = ServiceRow {
            id: Uuid::new_v4(),
            name,
            duration_minutes,
        };
        let row = diesel::insert_into(services::table)
            .values(&row)
            .returning(ServiceRow::as_returning())
            .get_result(&mut *connection)?;
        Ok(row.into())
    }

    fn working_hours(&self, barber_id: Uuid) -> Result<WorkingHoursTemplate, StoreError> {
        let mut connection = self.connection()?;
        let rows = working_hours::table
            .filter(working_hours::barber_id.eq(barber_id))
            .select(WorkingHoursRow::as_select())
            .load(&mut *connection)?;

        let mut template = WorkingHoursTemplate::default();
        for row in rows {
            let Some(weekday) = WEEKDAYS.get(row.weekday as usize) else {
                error!(
                    %barber_id,
                    weekday = row.weekday,
                    "Ignoring working hours with invalid weekday"
                );
                continue;
            };
            let window = time_of_day(row.open_minute)
                .zip(time_of_day(row.close_minute))
                .and_then(|(open, close)| WorkingWindow::new(open, close));
            template.0.insert(*weekday, window);
        }
        Ok(template)
    }

    fn set_working_hours(
        &self,
        barber_id: Uuid,
        template: WorkingHoursTemplate,
    ) -> Result<(), StoreError> {
        let rows: Vec<WorkingHoursRow> = template
            .0
            .iter()
            .filter_map(|(weekday, window)| {
                window.map(|window| WorkingHoursRow {
                    barber_id,
                    weekday: weekday.num_days_from_monday() as i16,
                    open_minute: minute_of_day(window.open),
                    close_minute: minute_of_day(window.close),
                })
            })
            .collect();

        let mut connection = self.connection()?;
        connection.transaction::<_, StoreError, _>(|connection| {
            barbers::table
                .find(barber_id)
                .select(barbers::id)
                .first::<Uuid>(connection)
                .optional()?
                .ok_or(StoreError::NotFound)?;

            diesel::delete(working_hours::table.filter(working_hours::barber_id.eq(barber_id)))
                .execute(connection)?;
            if !rows.is_empty() {
                diesel::insert_into(working_hours::table)
                    .values(&rows)
                    .execute(connection)?;
            }
            Ok(())
        })
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let mut connection = self.connection()?;
        bookings::table
            .find(id)
            .select(BookingRow::as_select())
            .first(&mut *connection)
            .optional()?
            .map(Booking::try_from)
            .transpose()
    }

    fn active_bookings(
        &self,
        barber_id: Uuid,
        range: Interval,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut connection = self.connection()?;
        overlapping_bookings(&mut connection, barber_id, range, None)
    }

    fn insert_booking(&self, draft: BookingDraft) -> Result<Booking, StoreError> {
        let mut connection = self.connection()?;
        connection
            .transaction::<_, StoreError, _>(|connection| {
                lock_barber(connection, draft.barber_id)?;
                if !overlapping_bookings(connection, draft.barber_id, draft.interval(), None)?
                    .is_empty()
                {
                    return Err(StoreError::Conflict);
                }

                let row = BookingRow {
                    id: Uuid::new_v4(),
                    barber_id: draft.barber_id,
                    client_id: draft.client_id,
                    service_id: draft.service_id,
                    start_at: draft.start,
                    duration_minutes: draft.duration_minutes,
                    status: BookingStatus::Pending.as_str().into(),
                    notes: draft.notes.clone(),
                    created_at: draft.created_at,
                };
                let row = diesel::insert_into(bookings::table)
                    .values(&row)
                    .returning(BookingRow::as_returning())
                    .get_result(connection)?;
                Booking::try_from(row)
            })
            .map_err(conflict_on_unique_violation)
    }

    fn update_booking_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        status: BookingStatus,
    ) -> Result<Booking, StoreError> {
        let mut connection = self.connection()?;
        let row = diesel::update(
            bookings::table
                .find(id)
                .filter(bookings::status.eq(expected.as_str())),
        )
        .set(bookings::status.eq(status.as_str()))
        .returning(BookingRow::as_returning())
        .get_result(&mut *connection)
        .optional()?;

        match row {
            Some(row) => Booking::try_from(row),
            None => Err(missing_or_changed(&mut *connection, id)?),
        }
    }

    fn reschedule_booking(
        &self,
        id: Uuid,
        expected: BookingStatus,
        start: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Booking, StoreError> {
        let mut connection = self.connection()?;
        connection
            .transaction::<_, StoreError, _>(|connection| {
                let current: Booking = bookings::table
                    .find(id)
                    .select(BookingRow::as_select())
                    .first(connection)
                    .optional()?
                    .ok_or(StoreError::NotFound)?
                    .try_into()?;
                if current.status != expected {
                    return Err(StoreError::StatusChanged);
                }

                lock_barber(connection, current.barber_id)?;
                let interval = Interval::new(start, current.duration_minutes as i64);
                if !overlapping_bookings(connection, current.barber_id, interval, Some(id))?
                    .is_empty()
                {
                    return Err(StoreError::Conflict);
                }

                let target = bookings::table
                    .find(id)
                    .filter(bookings::status.eq(expected.as_str()));
                let row = match notes {
                    Some(notes) => diesel::update(target)
                        .set((bookings::start_at.eq(start), bookings::notes.eq(notes)))
                        .returning(BookingRow::as_returning())
                        .get_result(connection)
                        .optional()?,
                    None => diesel::update(target)
                        .set(bookings::start_at.eq(start))
                        .returning(BookingRow::as_returning())
                        .get_result(connection)
                        .optional()?,
                };
                // A status write may have landed since the read above.
                row.ok_or(StoreError::StatusChanged).and_then(Booking::try_from)
            })
            .map_err(conflict_on_unique_violation)
    }
}
