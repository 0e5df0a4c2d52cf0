use crate::configuration::Configuration;
use clap::Parser;

/// One year.
const MAX_LEAD_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Clone, Parser)]
#[command(name = "barbershop_booking", about = "Barbershop booking service")]
pub struct ConfigurationHandler {
    /// Password expected in the `x-admin-password` header
    #[arg(long, env = "ADMIN_PASSWORD")]
    password: String,

    /// PostgreSQL connection url. Without it bookings are kept in memory only.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "PORT", default_value = "3000")]
    port: String,

    #[arg(
        long,
        env = "SLOT_SIZE_MINUTES",
        default_value_t = 60,
        value_parser = clap::value_parser!(i64).range(1..=1440)
    )]
    slot_size_minutes: i64,

    #[arg(
        long,
        env = "CANCELLATION_LEAD_MINUTES",
        default_value_t = 60,
        value_parser = clap::value_parser!(i64).range(0..=MAX_LEAD_MINUTES)
    )]
    cancellation_lead_minutes: i64,

    #[arg(
        long,
        env = "MODIFICATION_LEAD_MINUTES",
        default_value_t = 120,
        value_parser = clap::value_parser!(i64).range(0..=MAX_LEAD_MINUTES)
    )]
    modification_lead_minutes: i64,

    #[arg(
        long,
        env = "REMINDER_LEAD_MINUTES",
        default_value_t = 24 * 60,
        value_parser = clap::value_parser!(i64).range(0..=MAX_LEAD_MINUTES)
    )]
    reminder_lead_minutes: i64,

    #[arg(
        long,
        env = "REMINDER_POLL_SECONDS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    reminder_poll_seconds: u64,

    /// Offset of the shop's wall clock, in which working hours are declared
    #[arg(
        long,
        env = "UTC_OFFSET_MINUTES",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    utc_offset_minutes: i32,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        Self::parse()
    }
}

impl Configuration for ConfigurationHandler {
    fn password(&self) -> String {
        self.password.clone()
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn port(&self) -> String {
        self.port.clone()
    }

    fn slot_size_minutes(&self) -> i64 {
        self.slot_size_minutes
    }

    fn cancellation_lead_minutes(&self) -> i64 {
        self.cancellation_lead_minutes
    }

    fn modification_lead_minutes(&self) -> i64 {
        self.modification_lead_minutes
    }

    fn reminder_lead_minutes(&self) -> i64 {
        self.reminder_lead_minutes
    }

    fn reminder_poll_seconds(&self) -> u64 {
        self.reminder_poll_seconds
    }

    fn utc_offset_minutes(&self) -> i32 {
        self.utc_offset_minutes
    }
}
