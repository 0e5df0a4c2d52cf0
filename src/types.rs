use chrono::{DateTime, Duration, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};
use uuid::Uuid;

/// Longest bookable span. Storage lookups rely on it to bound how far back an
/// overlapping booking can start.
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Active bookings occupy the barber's time.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Completed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("Unknown booking status '{other}'")),
        }
    }
}

/// Half-open `[start, end)` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, minutes: i64) -> Self {
        Self {
            start,
            end: start + Duration::minutes(minutes),
        }
    }

    /// Like `new`, but `None` when the end is past the representable range.
    pub fn checked(start: DateTime<Utc>, minutes: i64) -> Option<Self> {
        let end = start.checked_add_signed(Duration::try_minutes(minutes)?)?;
        Some(Self { start, end })
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barber {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub barber_id: Uuid,
    pub client_id: Uuid,
    pub service_id: Uuid,
    pub start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.duration_minutes as i64)
    }

    pub fn overlaps(&self, interval: &Interval) -> bool {
        self.status.is_active() && self.interval().overlaps(interval)
    }
}

/// A booking as submitted, before storage assigns its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDraft {
    pub barber_id: Uuid,
    pub client_id: Uuid,
    pub service_id: Uuid,
    pub start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BookingDraft {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.duration_minutes as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingWindow {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl WorkingWindow {
    /// `None` unless `close` is strictly after `open`.
    pub fn new(open: NaiveTime, close: NaiveTime) -> Option<Self> {
        (open < close).then_some(Self { open, close })
    }
}

/// Weekly opening hours of one barber. A missing or `null` day is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHoursTemplate(pub HashMap<Weekday, Option<WorkingWindow>>);

impl WorkingHoursTemplate {
    pub fn window(&self, weekday: Weekday) -> Option<WorkingWindow> {
        self.0.get(&weekday).copied().flatten()
    }

    #[cfg(test)]
    pub fn with_day(mut self, weekday: Weekday, open: NaiveTime, close: NaiveTime) -> Self {
        self.0.insert(weekday, WorkingWindow::new(open, close));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Who is asking for a lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Client(Uuid),
    Barber(Uuid),
    Admin,
}
