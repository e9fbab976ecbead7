//! Expansion of stored availability rules into concrete calendar dates.
//!
//! Every iterator here is bounded by the requested [`DateRange`], never by a
//! rule's own `recurrence_end`, so a rule recurring forever costs no more than
//! the days actually asked for.

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{
    day_of_week_index, AvailabilityRule, AvailabilityTemplate, DoctorAvailability, RecurrenceType,
};

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

pub type Dates = Box<dyn Iterator<Item = NaiveDate>>;

/// Whether a rule can produce any instance inside `range`.
pub fn qualifies(rule: &AvailabilityRule, range: DateRange) -> bool {
    match rule {
        AvailabilityRule::Template(t) => t.is_active,
        AvailabilityRule::DateScoped(r) => {
            r.is_active
                && r.specific_date <= range.end
                && r.recurrence_end.map_or(true, |end| end >= range.start)
        }
    }
}

pub fn expand(rule: &AvailabilityRule, range: DateRange) -> Dates {
    if !qualifies(rule, range) {
        return Box::new(std::iter::empty());
    }
    match rule {
        AvailabilityRule::Template(t) => expand_template(t, range),
        AvailabilityRule::DateScoped(r) => expand_rule(r, range),
    }
}

/// One date per matching weekday in `range`.
pub fn expand_template(template: &AvailabilityTemplate, range: DateRange) -> Dates {
    if !(0..=6).contains(&template.day_of_week) || range.is_empty() {
        return Box::new(std::iter::empty());
    }

    let lead = (template.day_of_week - day_of_week_index(range.start)).rem_euclid(7);
    let first = range.start + Duration::days(i64::from(lead));
    let end = range.end;

    Box::new(first.iter_weeks().take_while(move |d| *d <= end))
}

pub fn expand_rule(rule: &DoctorAvailability, range: DateRange) -> Dates {
    let anchor = rule.specific_date;
    let bounded = DateRange::new(
        range.start.max(anchor),
        rule.recurrence_end.map_or(range.end, |end| end.min(range.end)),
    );

    if bounded.is_empty() {
        return Box::new(std::iter::empty());
    }

    match rule.recurrence_type {
        RecurrenceType::None => {
            Box::new(bounded.contains(anchor).then_some(anchor).into_iter())
        }
        RecurrenceType::Daily => Box::new(bounded.days()),
        RecurrenceType::Weekly => {
            let offset = (bounded.start - anchor).num_days();
            let weeks = (offset + 6).div_euclid(7);
            let first = anchor + Duration::weeks(weeks);
            let end = bounded.end;
            Box::new(first.iter_weeks().take_while(move |d| *d <= end))
        }
        RecurrenceType::Monthly => expand_monthly(anchor.day(), bounded),
    }
}

/// Same day-of-month every month. Months without that day are skipped
/// rather than clamped to their last day.
fn expand_monthly(day: u32, range: DateRange) -> Dates {
    let first_month = (range.start.year(), range.start.month());
    let end = range.end;

    let months = std::iter::successors(Some(first_month), |&(year, month)| {
        Some(if month == 12 { (year + 1, 1) } else { (year, month + 1) })
    });

    Box::new(
        months
            .take_while(move |&(year, month)| {
                NaiveDate::from_ymd_opt(year, month, 1).map_or(false, |first| first <= end)
            })
            .filter_map(move |(year, month)| NaiveDate::from_ymd_opt(year, month, day))
            .filter(move |date| range.contains(*date)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule(anchor: NaiveDate, recurrence_type: RecurrenceType, end: Option<NaiveDate>) -> DoctorAvailability {
        DoctorAvailability {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            specific_date: anchor,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            recurrence_type,
            recurrence_end: end,
            is_active: true,
        }
    }

    fn template(day_of_week: i32) -> AvailabilityTemplate {
        AvailabilityTemplate {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            day_of_week,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            is_active: true,
        }
    }

    #[test]
    fn test_template_yields_matching_weekdays() {
        // June 2025: Mondays are 2, 9, 16, 23, 30
        let range = DateRange::new(date(2025, 6, 1), date(2025, 6, 30));
        let dates: Vec<_> = expand_template(&template(1), range).collect();
        assert_eq!(
            dates,
            vec![date(2025, 6, 2), date(2025, 6, 9), date(2025, 6, 16), date(2025, 6, 23), date(2025, 6, 30)]
        );
    }

    #[test]
    fn test_template_with_invalid_weekday_is_empty() {
        let range = DateRange::new(date(2025, 6, 1), date(2025, 6, 30));
        assert_eq!(expand_template(&template(7), range).count(), 0);
        assert_eq!(expand_template(&template(-1), range).count(), 0);
    }

    #[test]
    fn test_none_recurrence_is_single_instance() {
        let r = rule(date(2025, 6, 18), RecurrenceType::None, None);
        let inside = DateRange::new(date(2025, 6, 16), date(2025, 6, 20));
        let outside = DateRange::new(date(2025, 6, 19), date(2025, 6, 25));

        assert_eq!(expand_rule(&r, inside).collect::<Vec<_>>(), vec![date(2025, 6, 18)]);
        assert_eq!(expand_rule(&r, outside).count(), 0);
    }

    #[test]
    fn test_daily_stops_at_recurrence_end() {
        let r = rule(date(2025, 6, 10), RecurrenceType::Daily, Some(date(2025, 6, 13)));
        let range = DateRange::new(date(2025, 6, 1), date(2025, 6, 30));
        let dates: Vec<_> = expand_rule(&r, range).collect();
        assert_eq!(dates, vec![date(2025, 6, 10), date(2025, 6, 11), date(2025, 6, 12), date(2025, 6, 13)]);
    }

    #[test]
    fn test_daily_without_end_is_bounded_by_range() {
        let r = rule(date(2020, 1, 1), RecurrenceType::Daily, None);
        let range = DateRange::new(date(2025, 6, 1), date(2025, 6, 7));
        assert_eq!(expand_rule(&r, range).count(), 7);
    }

    #[test]
    fn test_weekly_keeps_anchor_phase() {
        // Anchored on Wednesday 2025-06-04, range starts on a Monday.
        let r = rule(date(2025, 6, 4), RecurrenceType::Weekly, None);
        let range = DateRange::new(date(2025, 6, 9), date(2025, 6, 30));
        let dates: Vec<_> = expand_rule(&r, range).collect();
        assert_eq!(dates, vec![date(2025, 6, 11), date(2025, 6, 18), date(2025, 6, 25)]);
    }

    #[test]
    fn test_weekly_range_starting_on_occurrence() {
        let r = rule(date(2025, 6, 4), RecurrenceType::Weekly, Some(date(2025, 6, 18)));
        let range = DateRange::new(date(2025, 6, 11), date(2025, 6, 30));
        let dates: Vec<_> = expand_rule(&r, range).collect();
        assert_eq!(dates, vec![date(2025, 6, 11), date(2025, 6, 18)]);
    }

    #[test]
    fn test_monthly_skips_short_months() {
        let r = rule(date(2025, 1, 31), RecurrenceType::Monthly, None);

        // April has 30 days: no instance at all.
        let april = DateRange::new(date(2025, 4, 1), date(2025, 4, 30));
        assert_eq!(expand_rule(&r, april).count(), 0);

        let first_half = DateRange::new(date(2025, 1, 1), date(2025, 7, 31));
        let dates: Vec<_> = expand_rule(&r, first_half).collect();
        assert_eq!(dates, vec![date(2025, 1, 31), date(2025, 3, 31), date(2025, 5, 31), date(2025, 7, 31)]);
    }

    #[test]
    fn test_monthly_crosses_year_boundary() {
        let r = rule(date(2025, 11, 15), RecurrenceType::Monthly, Some(date(2026, 1, 15)));
        let range = DateRange::new(date(2025, 11, 1), date(2026, 3, 1));
        let dates: Vec<_> = expand_rule(&r, range).collect();
        assert_eq!(dates, vec![date(2025, 11, 15), date(2025, 12, 15), date(2026, 1, 15)]);
    }

    #[test]
    fn test_qualification() {
        let range = DateRange::new(date(2025, 6, 1), date(2025, 6, 30));

        let future = AvailabilityRule::DateScoped(rule(date(2025, 7, 1), RecurrenceType::Daily, None));
        assert!(!qualifies(&future, range));

        let expired = AvailabilityRule::DateScoped(rule(date(2025, 1, 1), RecurrenceType::Daily, Some(date(2025, 5, 31))));
        assert!(!qualifies(&expired, range));

        let mut inactive = rule(date(2025, 6, 1), RecurrenceType::Daily, None);
        inactive.is_active = false;
        assert!(!qualifies(&AvailabilityRule::DateScoped(inactive), range));

        let mut idle_template = template(1);
        assert!(qualifies(&AvailabilityRule::Template(idle_template.clone()), range));
        idle_template.is_active = false;
        assert_eq!(expand(&AvailabilityRule::Template(idle_template), range).count(), 0);
    }
}
