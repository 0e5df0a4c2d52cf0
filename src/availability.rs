//! Free slot computation.
//!
//! Everything here is pure: the caller hands in the working window of the day
//! and a snapshot of the barber's active bookings.

use crate::types::{Booking, Interval, Slot, WorkingWindow};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// Converts a shop-local wall clock time to UTC. `None` at the edges of the
/// calendar where the shifted time is not representable.
pub fn local_to_utc(local: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let utc = local.checked_sub_signed(Duration::seconds(offset.local_minus_utc() as i64))?;
    Some(DateTime::from_naive_utc_and_offset(utc, Utc))
}

/// The working window of `date` as a UTC interval.
pub fn window_interval(
    window: WorkingWindow,
    date: NaiveDate,
    offset: FixedOffset,
) -> Option<Interval> {
    Some(Interval {
        start: local_to_utc(date.and_time(window.open), offset)?,
        end: local_to_utc(date.and_time(window.close), offset)?,
    })
}

/// Candidates start every `slot_minutes` from opening time. Each one spans
/// `span_minutes` and is kept only if it ends by closing time, starts after
/// `not_before` and overlaps none of `bookings`.
pub fn compute_available_slots(
    window: Interval,
    slot_minutes: i64,
    span_minutes: i64,
    bookings: &[Booking],
    not_before: Option<DateTime<Utc>>,
) -> Vec<Slot> {
    let mut slots = Vec::new();
    if slot_minutes <= 0 || span_minutes <= 0 {
        return slots;
    }

    let mut start = window.start;
    loop {
        let Some(candidate) = Interval::checked(start, span_minutes) else {
            break;
        };
        if candidate.end > window.end {
            break;
        }

        let in_future = not_before.map_or(true, |now| candidate.start > now);
        if in_future && !bookings.iter().any(|booking| booking.overlaps(&candidate)) {
            slots.push(Slot {
                start: candidate.start,
                end: candidate.end,
            });
        }
        match start.checked_add_signed(Duration::minutes(slot_minutes)) {
            Some(next) => start = next,
            None => break,
        }
    }
    slots
}
