use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::{DoctorError, DoctorResult};
use crate::models::{
    Appointment, AvailabilityRule, AvailabilityTemplate, AvailableSlot, BookedInterval, Doctor,
    DoctorAvailability, DoctorAvailabilityOverride, SlotGrid, SlotQuery,
};
use crate::services::slots::{self, ResolveInput};

/// Appointments starting this long before the query window are still fetched,
/// since they may run into it.
pub const BOOKING_LOOKBACK_HOURS: i64 = 24;

/// Read side of the persistence layer the slot resolver depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    async fn find_doctor(&self, doctor_id: Uuid) -> DoctorResult<Option<Doctor>>;

    /// Active templates and date-scoped rules, unfiltered by date.
    async fn list_active_rules(&self, doctor_id: Uuid) -> DoctorResult<Vec<AvailabilityRule>>;

    /// Overrides marking a day as unavailable within `[from, to]`.
    async fn list_blocking_overrides(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DoctorResult<Vec<DoctorAvailabilityOverride>>;

    /// Intervals held by confirmed or completed appointments overlapping `[from, to)`.
    async fn list_booked_intervals(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DoctorResult<Vec<BookedInterval>>;
}

pub struct SupabaseAvailabilityRepository {
    supabase: SupabaseClient,
    auth_token: Option<String>,
}

impl SupabaseAvailabilityRepository {
    pub fn new(config: &AppConfig, auth_token: Option<&str>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            auth_token: auth_token.map(str::to_string),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> DoctorResult<Vec<T>> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, self.auth_token.as_deref(), None)
            .await
            .map_err(DoctorError::Upstream)?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(DoctorError::from)
    }
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl AvailabilityRepository for SupabaseAvailabilityRepository {
    async fn find_doctor(&self, doctor_id: Uuid) -> DoctorResult<Option<Doctor>> {
        let path = format!(
            "/rest/v1/doctors?id=eq.{}&select=id,first_name,last_name,timezone,is_available",
            doctor_id
        );
        let doctors: Vec<Doctor> = self.fetch(&path).await?;
        Ok(doctors.into_iter().next())
    }

    async fn list_active_rules(&self, doctor_id: Uuid) -> DoctorResult<Vec<AvailabilityRule>> {
        let templates_path = format!(
            "/rest/v1/doctor_availability_templates?doctor_id=eq.{}&is_active=eq.true&order=day_of_week.asc,start_time.asc",
            doctor_id
        );
        let rules_path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&is_active=eq.true&order=specific_date.asc,start_time.asc",
            doctor_id
        );

        let (templates, dated) = tokio::try_join!(
            self.fetch::<AvailabilityTemplate>(&templates_path),
            self.fetch::<DoctorAvailability>(&rules_path),
        )?;

        Ok(templates
            .into_iter()
            .map(AvailabilityRule::Template)
            .chain(dated.into_iter().map(AvailabilityRule::DateScoped))
            .filter(AvailabilityRule::is_active)
            .collect())
    }

    async fn list_blocking_overrides(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DoctorResult<Vec<DoctorAvailabilityOverride>> {
        let path = format!(
            "/rest/v1/doctor_availability_overrides?doctor_id=eq.{}&is_available=eq.false&override_date=gte.{}&override_date=lte.{}",
            doctor_id, from, to
        );
        let overrides: Vec<DoctorAvailabilityOverride> = self.fetch(&path).await?;
        Ok(overrides.into_iter().filter(|o| !o.is_available).collect())
    }

    async fn list_booked_intervals(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DoctorResult<Vec<BookedInterval>> {
        let lookback = from - Duration::hours(BOOKING_LOOKBACK_HOURS);
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=in.(confirmed,completed)&scheduled_at=gte.{}&scheduled_at=lt.{}&order=scheduled_at.asc",
            doctor_id,
            rfc3339(lookback),
            rfc3339(to)
        );
        let appointments: Vec<Appointment> = self.fetch(&path).await?;

        Ok(appointments
            .iter()
            .filter_map(Appointment::booked_interval)
            .filter(|interval| interval.overlaps(from, to))
            .collect())
    }
}

pub struct AvailabilityService<R = SupabaseAvailabilityRepository> {
    repository: R,
    max_range_days: i64,
}

impl AvailabilityService<SupabaseAvailabilityRepository> {
    /// Without a token, reads run under the anon key.
    pub fn new(config: &AppConfig, auth_token: Option<&str>) -> Self {
        Self {
            repository: SupabaseAvailabilityRepository::new(config, auth_token),
            max_range_days: config.max_range_days,
        }
    }
}

impl<R: AvailabilityRepository> AvailabilityService<R> {
    pub fn with_repository(repository: R, max_range_days: i64) -> Self {
        Self {
            repository,
            max_range_days,
        }
    }

    /// Bookable grid for `doctor_id` over `[query.from, query.to]`.
    ///
    /// Stored data is read fresh on every call. Either the whole grid is
    /// returned or an error is; there is no partial result.
    pub async fn get_available_slots(
        &self,
        doctor_id: Uuid,
        query: &SlotQuery,
    ) -> DoctorResult<Vec<AvailableSlot>> {
        Ok(self.get_slot_grid(doctor_id, query).await?.slots)
    }

    /// Like [`Self::get_available_slots`], also reporting the zone the grid is presented in.
    pub async fn get_slot_grid(&self, doctor_id: Uuid, query: &SlotQuery) -> DoctorResult<SlotGrid> {
        debug!(
            "Calculating slots for doctor {} from {} to {} ({} min)",
            doctor_id, query.from, query.to, query.slot_duration_minutes
        );

        slots::validate_query(query, self.max_range_days)?;

        let doctor = self
            .repository
            .find_doctor(doctor_id)
            .await?
            .ok_or(DoctorError::NotFound)?;

        let doctor_timezone = doctor.timezone_name().to_string();
        let doctor_tz = slots::parse_timezone(&doctor_timezone)?;
        let presentation_name = query
            .timezone
            .as_deref()
            .unwrap_or(&doctor_timezone)
            .trim()
            .to_string();
        let presentation_tz = slots::parse_timezone(&presentation_name)?;
        let (window_start, window_end) = slots::query_window(query, &presentation_tz)?;

        // Overrides are keyed by doctor-local day, which can sit up to two
        // calendar days away from the requested dates.
        let doctor_days = slots::local_range(window_start, window_end, &doctor_tz);

        let (rules, overrides, booked) = tokio::try_join!(
            self.repository.list_active_rules(doctor_id),
            self.repository
                .list_blocking_overrides(doctor_id, doctor_days.start, doctor_days.end),
            self.repository
                .list_booked_intervals(doctor_id, window_start, window_end),
        )?;

        let blocked_days: Vec<NaiveDate> = overrides
            .iter()
            .filter(|o| !o.is_available)
            .map(|o| o.override_date)
            .collect();

        debug!(
            "Doctor {} has {} active rules, {} blocked days, {} booked intervals",
            doctor_id,
            rules.len(),
            blocked_days.len(),
            booked.len()
        );

        let slots = slots::resolve_slots(ResolveInput {
            query,
            doctor_timezone: &doctor_timezone,
            rules: &rules,
            blocked_days: &blocked_days,
            booked: &booked,
            max_range_days: self.max_range_days,
        })?;

        info!(
            "Resolved {} slots for doctor {} ({})",
            slots.len(),
            doctor_id,
            doctor.full_name().trim()
        );
        Ok(SlotGrid {
            doctor_id,
            timezone: presentation_name,
            slots,
        })
    }

    /// Active rules for display, with the doctor checked to exist.
    pub async fn get_doctor_rules(&self, doctor_id: Uuid) -> DoctorResult<Vec<AvailabilityRule>> {
        self.repository
            .find_doctor(doctor_id)
            .await?
            .ok_or(DoctorError::NotFound)?;
        self.repository.list_active_rules(doctor_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveTime;
    use mockall::predicate::eq;

    use crate::models::{AvailabilityTemplate, SlotSource};

    fn doctor(id: Uuid, timezone: Option<&str>) -> Doctor {
        Doctor {
            id,
            first_name: "Jane".to_string(),
            last_name: "Smith".to_string(),
            timezone: timezone.map(str::to_string),
            is_available: true,
        }
    }

    fn monday_template(doctor_id: Uuid) -> AvailabilityRule {
        AvailabilityRule::Template(AvailabilityTemplate {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week: 1,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            is_active: true,
        })
    }

    fn monday_query() -> SlotQuery {
        let monday = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        SlotQuery {
            from: monday,
            to: monday,
            timezone: None,
            slot_duration_minutes: 30,
        }
    }

    #[tokio::test]
    async fn test_slots_combine_rules_and_bookings() {
        let doctor_id = Uuid::new_v4();
        let mut repo = MockAvailabilityRepository::new();

        repo.expect_find_doctor()
            .with(eq(doctor_id))
            .returning(move |id| Ok(Some(doctor(id, Some("UTC")))));
        repo.expect_list_active_rules()
            .returning(move |id| Ok(vec![monday_template(id)]));
        repo.expect_list_blocking_overrides()
            .returning(|_, _, _| Ok(vec![]));
        repo.expect_list_booked_intervals()
            .returning(|_, from, _| {
                Ok(vec![BookedInterval {
                    start: from + Duration::hours(10),
                    end: from + Duration::hours(10) + Duration::minutes(30),
                }])
            });

        let service = AvailabilityService::with_repository(repo, 90);
        let slots = service.get_available_slots(doctor_id, &monday_query()).await.unwrap();

        assert_eq!(slots.len(), 6);
        assert_eq!(slots.iter().filter(|s| !s.available).count(), 1);
        assert!(!slots[2].available);
        assert!(slots.iter().all(|s| s.source == SlotSource::Template));
    }

    #[tokio::test]
    async fn test_unknown_doctor_is_not_found() {
        let mut repo = MockAvailabilityRepository::new();
        repo.expect_find_doctor().returning(|_| Ok(None));
        repo.expect_list_active_rules().never();
        repo.expect_list_booked_intervals().never();

        let service = AvailabilityService::with_repository(repo, 90);
        let result = service.get_available_slots(Uuid::new_v4(), &monday_query()).await;

        assert_matches!(result, Err(DoctorError::NotFound));
    }

    #[tokio::test]
    async fn test_invalid_range_fails_before_any_read() {
        let mut repo = MockAvailabilityRepository::new();
        repo.expect_find_doctor().never();

        let service = AvailabilityService::with_repository(repo, 90);
        let mut query = monday_query();
        query.from = query.to + Duration::days(1);

        let result = service.get_available_slots(Uuid::new_v4(), &query).await;
        assert_matches!(result, Err(DoctorError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn test_malformed_doctor_timezone() {
        let mut repo = MockAvailabilityRepository::new();
        repo.expect_find_doctor()
            .returning(|id| Ok(Some(doctor(id, Some("Nowhere/Special")))));

        let service = AvailabilityService::with_repository(repo, 90);
        let result = service.get_available_slots(Uuid::new_v4(), &monday_query()).await;

        assert_matches!(result, Err(DoctorError::InvalidTimezone(_)));
    }

    #[tokio::test]
    async fn test_persistence_failure_is_upstream() {
        let mut repo = MockAvailabilityRepository::new();
        repo.expect_find_doctor()
            .returning(|id| Ok(Some(doctor(id, None))));
        repo.expect_list_active_rules()
            .returning(|_| Err(DoctorError::upstream(anyhow::anyhow!("connection reset"))));
        repo.expect_list_blocking_overrides()
            .returning(|_, _, _| Ok(vec![]));
        repo.expect_list_booked_intervals()
            .returning(|_, _, _| Ok(vec![]));

        let service = AvailabilityService::with_repository(repo, 90);
        let result = service.get_available_slots(Uuid::new_v4(), &monday_query()).await;

        assert_matches!(result, Err(DoctorError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_blocking_override_empties_the_day() {
        let mut repo = MockAvailabilityRepository::new();
        repo.expect_find_doctor()
            .returning(|id| Ok(Some(doctor(id, None))));
        repo.expect_list_active_rules()
            .returning(|id| Ok(vec![monday_template(id)]));
        repo.expect_list_blocking_overrides()
            .returning(|id, _, _| {
                Ok(vec![DoctorAvailabilityOverride {
                    id: Uuid::new_v4(),
                    doctor_id: id,
                    override_date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
                    is_available: false,
                    reason: Some("Conference".to_string()),
                    created_at: None,
                }])
            });
        repo.expect_list_booked_intervals()
            .returning(|_, _, _| Ok(vec![]));

        let service = AvailabilityService::with_repository(repo, 90);
        let slots = service.get_available_slots(Uuid::new_v4(), &monday_query()).await.unwrap();

        assert!(slots.is_empty());
    }

    #[tokio::test]
    async fn test_overrides_fetched_for_doctor_local_days() {
        let saturday = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();

        let mut repo = MockAvailabilityRepository::new();
        repo.expect_find_doctor()
            .returning(|id| Ok(Some(doctor(id, Some("Etc/GMT+12")))));
        repo.expect_list_active_rules()
            .returning(|id| {
                Ok(vec![AvailabilityRule::Template(AvailabilityTemplate {
                    id: Uuid::new_v4(),
                    doctor_id: id,
                    day_of_week: 6,
                    start_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
                    is_active: true,
                })])
            });
        repo.expect_list_blocking_overrides()
            .with(mockall::predicate::always(), eq(saturday), eq(sunday))
            .times(1)
            .returning(move |id, _, _| {
                Ok(vec![DoctorAvailabilityOverride {
                    id: Uuid::new_v4(),
                    doctor_id: id,
                    override_date: saturday,
                    is_available: false,
                    reason: None,
                    created_at: None,
                }])
            });
        repo.expect_list_booked_intervals()
            .returning(|_, _, _| Ok(vec![]));

        // Monday in Kiritimati (+14) begins at 22:00 on Saturday at UTC-12.
        let mut query = monday_query();
        query.timezone = Some("Pacific/Kiritimati".to_string());

        let service = AvailabilityService::with_repository(repo, 90);
        let slots = service.get_available_slots(Uuid::new_v4(), &query).await.unwrap();

        assert!(slots.is_empty());
    }
}
