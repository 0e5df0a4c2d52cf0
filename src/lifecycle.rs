use crate::{
    error::RejectionReason,
    types::{Actor, Booking, BookingStatus},
};
use chrono::{DateTime, Duration, Utc};

/// Lead times a client has to respect. Barbers and admins ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadTimes {
    pub cancellation: Duration,
    pub modification: Duration,
}

impl Default for LeadTimes {
    fn default() -> Self {
        Self {
            cancellation: Duration::hours(1),
            modification: Duration::hours(2),
        }
    }
}

fn owns(actor: Actor, booking: &Booking) -> bool {
    match actor {
        Actor::Client(id) => booking.client_id == id,
        Actor::Barber(id) => booking.barber_id == id,
        Actor::Admin => true,
    }
}

pub fn authorize_transition(
    actor: Actor,
    booking: &Booking,
    next: BookingStatus,
    now: DateTime<Utc>,
    lead_times: LeadTimes,
) -> Result<(), RejectionReason> {
    if !owns(actor, booking) {
        return Err(RejectionReason::NotPermitted);
    }
    if !booking.status.can_transition_to(next) {
        return Err(RejectionReason::InvalidTransition);
    }

    match actor {
        Actor::Client(_) if next != BookingStatus::Cancelled => Err(RejectionReason::NotPermitted),
        Actor::Client(_) if booking.start - now <= lead_times.cancellation => {
            Err(RejectionReason::CancellationTooLate)
        }
        _ => Ok(()),
    }
}

pub fn authorize_modification(
    actor: Actor,
    booking: &Booking,
    now: DateTime<Utc>,
    lead_times: LeadTimes,
) -> Result<(), RejectionReason> {
    if !owns(actor, booking) {
        return Err(RejectionReason::NotPermitted);
    }
    if booking.status.is_terminal() {
        return Err(RejectionReason::BookingClosed);
    }
    if matches!(actor, Actor::Client(_)) && booking.start - now <= lead_times.modification {
        return Err(RejectionReason::ModificationTooLate);
    }
    Ok(())
}
