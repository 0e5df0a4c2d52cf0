use crate::{booking_manager::BookingPolicy, lifecycle::LeadTimes};
use chrono::{Duration, FixedOffset};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),
    #[error("Invalid {name}: {minutes} minutes")]
    InvalidLead { name: &'static str, minutes: i64 },
}

fn lead(name: &'static str, minutes: i64) -> Result<Duration, ConfigError> {
    Duration::try_minutes(minutes)
        .filter(|_| minutes >= 0)
        .ok_or(ConfigError::InvalidLead { name, minutes })
}

pub trait Configuration: Clone + Send + Sync + 'static {
    fn password(&self) -> String;
    fn database_url(&self) -> Option<String>;
    fn port(&self) -> String;
    fn slot_size_minutes(&self) -> i64;
    fn cancellation_lead_minutes(&self) -> i64;
    fn modification_lead_minutes(&self) -> i64;
    fn reminder_lead_minutes(&self) -> i64;
    fn reminder_poll_seconds(&self) -> u64;
    fn utc_offset_minutes(&self) -> i32;

    fn booking_policy(&self) -> Result<BookingPolicy, ConfigError> {
        let offset_minutes = self.utc_offset_minutes();
        let utc_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidOffset(offset_minutes))?;

        Ok(BookingPolicy {
            default_slot_minutes: self.slot_size_minutes(),
            lead_times: LeadTimes {
                cancellation: lead("cancellation lead", self.cancellation_lead_minutes())?,
                modification: lead("modification lead", self.modification_lead_minutes())?,
            },
            reminder_lead: lead("reminder lead", self.reminder_lead_minutes())?,
            utc_offset,
        })
    }
}
