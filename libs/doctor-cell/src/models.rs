use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use std::fmt;

// ==============================================================================
// DOCTOR PROFILE
// ==============================================================================

pub const DEFAULT_DOCTOR_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub timezone: Option<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// IANA zone the doctor's wall-clock rules are written in.
    pub fn timezone_name(&self) -> &str {
        self.timezone
            .as_deref()
            .filter(|tz| !tz.trim().is_empty())
            .unwrap_or(DEFAULT_DOCTOR_TIMEZONE)
    }
}

fn default_true() -> bool {
    true
}

// ==============================================================================
// AVAILABILITY RULES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for RecurrenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurrenceType::None => write!(f, "none"),
            RecurrenceType::Daily => write!(f, "daily"),
            RecurrenceType::Weekly => write!(f, "weekly"),
            RecurrenceType::Monthly => write!(f, "monthly"),
        }
    }
}

/// Weekly recurring availability, unbounded in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityTemplate {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl AvailabilityTemplate {
    pub fn window_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

/// Date-anchored availability with optional recurrence. Takes precedence over
/// templates for every calendar day it produces an instance on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorAvailability {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub specific_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence_type: RecurrenceType,
    pub recurrence_end: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl DoctorAvailability {
    pub fn window_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvailabilityRule {
    Template(AvailabilityTemplate),
    DateScoped(DoctorAvailability),
}

impl AvailabilityRule {
    pub fn is_active(&self) -> bool {
        match self {
            AvailabilityRule::Template(t) => t.is_active,
            AvailabilityRule::DateScoped(r) => r.is_active,
        }
    }

    pub fn window_minutes(&self) -> i64 {
        match self {
            AvailabilityRule::Template(t) => t.window_minutes(),
            AvailabilityRule::DateScoped(r) => r.window_minutes(),
        }
    }

    pub fn times(&self) -> (NaiveTime, NaiveTime) {
        match self {
            AvailabilityRule::Template(t) => (t.start_time, t.end_time),
            AvailabilityRule::DateScoped(r) => (r.start_time, r.end_time),
        }
    }

    pub fn source(&self) -> SlotSource {
        match self {
            AvailabilityRule::Template(_) => SlotSource::Template,
            AvailabilityRule::DateScoped(_) => SlotSource::DateRule,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorAvailabilityOverride {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub override_date: NaiveDate,
    pub is_available: bool,
    pub reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

// ==============================================================================
// APPOINTMENTS (read-only view)
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn blocks_slots(&self) -> bool {
        matches!(self, AppointmentStatus::Confirmed | AppointmentStatus::Completed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: AppointmentStatus,
}

impl Appointment {
    /// Occupied interval, or `None` when the appointment no longer holds its time.
    pub fn booked_interval(&self) -> Option<BookedInterval> {
        if !self.status.blocks_slots() || self.duration_minutes <= 0 {
            return None;
        }
        Some(BookedInterval {
            start: self.scheduled_at,
            end: self.scheduled_at + Duration::minutes(self.duration_minutes),
        })
    }
}

/// Half-open `[start, end)` interval in absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BookedInterval {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && self.start < end
    }
}

// ==============================================================================
// SLOTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    Template,
    DateRule,
}

/// One expanded rule occurrence, still in the doctor's wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalWindow {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub source: SlotSource,
}

/// A `LocalWindow` pinned to absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub source: SlotSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub duration_minutes: i64,
    pub available: bool,
    pub timezone: String,
    pub source: SlotSource,
}

impl AvailableSlot {
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start_time.with_timezone(&Utc)
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end_time.with_timezone(&Utc)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotGrid {
    pub doctor_id: Uuid,
    pub timezone: String,
    pub slots: Vec<AvailableSlot>,
}

// ==============================================================================
// REQUEST DTOs
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Presentation zone; defaults to the doctor's zone.
    pub timezone: Option<String>,
    pub slot_duration_minutes: i64,
}

impl SlotQuery {
    pub fn day_count(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplateRequest {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub specific_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub recurrence_type: Option<RecurrenceType>,
    /// Absent leaves the end unchanged; `null` clears it.
    #[serde(default, deserialize_with = "present_or_null", skip_serializing_if = "Option::is_none")]
    pub recurrence_end: Option<Option<NaiveDate>>,
    pub is_active: Option<bool>,
}

/// Distinguishes an explicit `null` from a missing field when paired with `#[serde(default)]`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityOverrideRequest {
    pub override_date: NaiveDate,
    pub is_available: bool,
    pub reason: Option<String>,
}

/// Day-of-week index as stored in `day_of_week` columns (0 = Sunday).
pub fn day_of_week_index(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}
