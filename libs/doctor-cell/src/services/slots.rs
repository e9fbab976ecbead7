//! Slot grid computation.
//!
//! Rules are written in the doctor's wall-clock time. They are pinned to
//! absolute instants exactly once, in [`materialize`], and every comparison
//! after that happens on `DateTime<Utc>`. The caller's zone is only applied
//! when the finished grid is presented.

use std::collections::HashSet;

use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use tracing::debug;

use crate::error::{DoctorError, DoctorResult};
use crate::models::{
    AvailabilityRule, AvailableSlot, BookedInterval, InstanceWindow, LocalWindow, SlotQuery,
    SlotSource,
};
use crate::services::recurrence::{self, DateRange};

/// Longest DST transition we probe across when a wall-clock time falls in a gap.
const MAX_GAP_MINUTES: i64 = 180;

/// Rule windows never span midnight, so no slot can be longer than a day.
pub const MAX_SLOT_DURATION_MINUTES: i64 = 24 * 60;

pub struct ResolveInput<'a> {
    pub query: &'a SlotQuery,
    pub doctor_timezone: &'a str,
    pub rules: &'a [AvailabilityRule],
    /// Doctor-local days on which nothing may be offered.
    pub blocked_days: &'a [NaiveDate],
    pub booked: &'a [BookedInterval],
    pub max_range_days: i64,
}

/// Checks the parts of a query that need no stored data.
pub fn validate_query(query: &SlotQuery, max_range_days: i64) -> DoctorResult<()> {
    if query.from > query.to {
        return Err(DoctorError::InvalidRange(format!(
            "from ({}) is after to ({})",
            query.from, query.to
        )));
    }
    if query.day_count() > max_range_days {
        return Err(DoctorError::InvalidRange(format!(
            "range spans {} days, maximum is {}",
            query.day_count(),
            max_range_days
        )));
    }
    if query.slot_duration_minutes <= 0 {
        return Err(DoctorError::InvalidSlotDuration(
            "slot duration must be positive".to_string(),
        ));
    }
    if query.slot_duration_minutes > MAX_SLOT_DURATION_MINUTES {
        return Err(DoctorError::InvalidSlotDuration(format!(
            "slot duration must be at most {} minutes",
            MAX_SLOT_DURATION_MINUTES
        )));
    }
    Ok(())
}

pub fn parse_timezone(name: &str) -> DoctorResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| DoctorError::InvalidTimezone(name.to_string()))
}

/// Resolves a wall-clock time in `tz` to an instant.
///
/// Ambiguous times (clocks going back) take the earlier instant. Times inside
/// a gap (clocks going forward) move to the first wall-clock minute after it.
pub fn local_to_utc(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(a, b) => Some(a.min(b).with_timezone(&Utc)),
        LocalResult::None => (1..=MAX_GAP_MINUTES).find_map(|minutes| {
            tz.from_local_datetime(&(local + Duration::minutes(minutes)))
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        }),
    }
}

/// `[from 00:00, (to + 1) 00:00)` in `tz`, as absolute instants.
pub fn query_window(query: &SlotQuery, tz: &Tz) -> DoctorResult<(DateTime<Utc>, DateTime<Utc>)> {
    let day_after = query
        .to
        .succ_opt()
        .ok_or_else(|| DoctorError::InvalidRange(format!("{} is out of range", query.to)))?;

    let start = query.from.and_hms_opt(0, 0, 0).and_then(|t| local_to_utc(tz, t));
    let end = day_after.and_hms_opt(0, 0, 0).and_then(|t| local_to_utc(tz, t));

    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok((start, end)),
        _ => Err(DoctorError::InvalidRange(format!(
            "cannot resolve {}..{} in {}",
            query.from, query.to, tz
        ))),
    }
}

/// Doctor-local days that overlap `[window_start, window_end)`.
pub fn local_range(window_start: DateTime<Utc>, window_end: DateTime<Utc>, tz: &Tz) -> DateRange {
    DateRange::new(
        window_start.with_timezone(tz).date_naive(),
        (window_end - Duration::nanoseconds(1))
            .with_timezone(tz)
            .date_naive(),
    )
}

pub fn materialize(window: &LocalWindow, tz: &Tz) -> Option<InstanceWindow> {
    let start = local_to_utc(tz, window.date.and_time(window.start_time))?;
    let end = local_to_utc(tz, window.date.and_time(window.end_time))?;
    (start < end).then_some(InstanceWindow {
        start,
        end,
        source: window.source,
    })
}

/// Full-length chunks of `instance`; a shorter tail is dropped.
pub fn chunk(instance: InstanceWindow, slot: Duration) -> impl Iterator<Item = InstanceWindow> {
    std::iter::successors(Some(instance.start), move |start| Some(*start + slot))
        .map(move |start| InstanceWindow {
            start,
            end: start + slot,
            source: instance.source,
        })
        .take_while(move |c| c.end <= instance.end)
}

/// Expands rules over `range`, then applies per-day precedence: a date-scoped
/// instance on day D suppresses every template instance on D, and a blocked
/// day suppresses everything.
pub fn expand_local_windows(
    rules: &[AvailabilityRule],
    range: DateRange,
    blocked_days: &[NaiveDate],
) -> Vec<LocalWindow> {
    let windows: Vec<LocalWindow> = rules
        .iter()
        .flat_map(|rule| {
            let (start_time, end_time) = rule.times();
            let source = rule.source();
            recurrence::expand(rule, range).map(move |date| LocalWindow {
                date,
                start_time,
                end_time,
                source,
            })
        })
        .collect();

    let overridden: HashSet<NaiveDate> = windows
        .iter()
        .filter(|w| w.source == SlotSource::DateRule)
        .map(|w| w.date)
        .collect();
    let blocked: HashSet<NaiveDate> = blocked_days.iter().copied().collect();

    windows
        .into_iter()
        .filter(|w| !blocked.contains(&w.date))
        .filter(|w| w.source == SlotSource::DateRule || !overridden.contains(&w.date))
        .collect()
}

fn present(instant: DateTime<Utc>, tz: &Tz) -> DateTime<FixedOffset> {
    let local = instant.with_timezone(tz);
    local.with_timezone(&local.offset().fix())
}

/// Keeps the earliest-starting chunk wherever chunks overlap.
fn remove_overlapping(mut chunks: Vec<InstanceWindow>) -> Vec<InstanceWindow> {
    chunks.sort_by(|a, b| (a.start, a.end, a.source).cmp(&(b.start, b.end, b.source)));

    let mut result: Vec<InstanceWindow> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if result.last().map_or(true, |last| chunk.start >= last.end) {
            result.push(chunk);
        }
    }
    result
}

pub fn resolve_slots(input: ResolveInput<'_>) -> DoctorResult<Vec<AvailableSlot>> {
    let query = input.query;
    validate_query(query, input.max_range_days)?;

    let doctor_tz = parse_timezone(input.doctor_timezone)?;
    let presentation_name = query
        .timezone
        .as_deref()
        .unwrap_or(input.doctor_timezone)
        .trim()
        .to_string();
    let presentation_tz = parse_timezone(&presentation_name)?;

    let longest_window = input
        .rules
        .iter()
        .filter(|r| r.is_active())
        .map(AvailabilityRule::window_minutes)
        .max();
    if let Some(longest) = longest_window {
        if query.slot_duration_minutes > longest {
            return Err(DoctorError::InvalidSlotDuration(format!(
                "{} minutes exceeds the longest availability window ({} minutes)",
                query.slot_duration_minutes, longest
            )));
        }
    }

    let (window_start, window_end) = query_window(query, &presentation_tz)?;

    let doctor_days = local_range(window_start, window_end, &doctor_tz);

    let windows = expand_local_windows(input.rules, doctor_days, input.blocked_days);
    debug!(
        "Expanded {} rule instances over {}..{} ({})",
        windows.len(),
        doctor_days.start,
        doctor_days.end,
        doctor_tz
    );

    let slot = Duration::minutes(query.slot_duration_minutes);
    let chunks: Vec<InstanceWindow> = windows
        .iter()
        .filter_map(|w| materialize(w, &doctor_tz))
        .flat_map(|instance| chunk(instance, slot))
        .filter(|c| c.start >= window_start && c.end <= window_end)
        .collect();

    let slots: Vec<AvailableSlot> = remove_overlapping(chunks)
        .into_iter()
        .map(|c| AvailableSlot {
            start_time: present(c.start, &presentation_tz),
            end_time: present(c.end, &presentation_tz),
            duration_minutes: query.slot_duration_minutes,
            available: !input.booked.iter().any(|b| b.overlaps(c.start, c.end)),
            timezone: presentation_name.clone(),
            source: c.source,
        })
        .collect();

    debug!(
        "Resolved {} slots ({} available)",
        slots.len(),
        slots.iter().filter(|s| s.available).count()
    );
    Ok(slots)
}
