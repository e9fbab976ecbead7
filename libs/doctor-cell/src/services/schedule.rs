use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::{DoctorError, DoctorResult};
use crate::models::{
    AvailabilityTemplate, CreateAvailabilityOverrideRequest, CreateAvailabilityRequest,
    CreateTemplateRequest, DoctorAvailability, DoctorAvailabilityOverride, RecurrenceType,
    UpdateAvailabilityRequest,
};

const TEMPLATES_TABLE: &str = "/rest/v1/doctor_availability_templates";
const RULES_TABLE: &str = "/rest/v1/doctor_availability";
const OVERRIDES_TABLE: &str = "/rest/v1/doctor_availability_overrides";

const TIME_FORMAT: &str = "%H:%M:%S";

pub fn validate_window(start: NaiveTime, end: NaiveTime) -> DoctorResult<()> {
    if start >= end {
        return Err(DoctorError::Validation(
            "Start time must be before end time".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_day_of_week(day_of_week: i32) -> DoctorResult<()> {
    if !(0..=6).contains(&day_of_week) {
        return Err(DoctorError::Validation(
            "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_recurrence_end(anchor: NaiveDate, recurrence_end: Option<NaiveDate>) -> DoctorResult<()> {
    match recurrence_end {
        Some(end) if end < anchor => Err(DoctorError::Validation(format!(
            "Recurrence end {} is before the anchor date {}",
            end, anchor
        ))),
        _ => Ok(()),
    }
}

/// Writes to the rule tables. Reads for slot computation go through
/// [`crate::services::availability::AvailabilityRepository`].
pub struct ScheduleService {
    supabase: SupabaseClient,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn get_rows<T: DeserializeOwned>(&self, path: &str, auth_token: &str) -> DoctorResult<Vec<T>> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await?;
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(DoctorError::from)
    }

    async fn write_one<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Value,
        auth_token: &str,
        what: &'static str,
    ) -> DoctorResult<T> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                method,
                path,
                Some(auth_token),
                Some(body),
                Some(SupabaseClient::representation_headers()),
            )
            .await?;

        let row = rows
            .into_iter()
            .next()
            .ok_or(DoctorError::ResourceNotFound(what))?;
        Ok(serde_json::from_value(row)?)
    }

    async fn delete_row(&self, table: &str, doctor_id: Uuid, id: Uuid, auth_token: &str) -> DoctorResult<()> {
        let path = format!("{}?id=eq.{}&doctor_id=eq.{}", table, id, doctor_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await?;
        Ok(())
    }

    // ==========================================================================
    // WEEKLY TEMPLATES
    // ==========================================================================

    pub async fn create_template(
        &self,
        doctor_id: Uuid,
        request: CreateTemplateRequest,
        auth_token: &str,
    ) -> DoctorResult<AvailabilityTemplate> {
        debug!("Creating weekly template for doctor {} on day {}", doctor_id, request.day_of_week);

        validate_day_of_week(request.day_of_week)?;
        validate_window(request.start_time, request.end_time)?;

        let now = Utc::now().to_rfc3339();
        let body = json!({
            "doctor_id": doctor_id,
            "day_of_week": request.day_of_week,
            "start_time": request.start_time.format(TIME_FORMAT).to_string(),
            "end_time": request.end_time.format(TIME_FORMAT).to_string(),
            "is_active": true,
            "created_at": now,
            "updated_at": now
        });

        let template: AvailabilityTemplate = self
            .write_one(Method::POST, TEMPLATES_TABLE, body, auth_token, "Availability template")
            .await?;
        info!("Template {} created for doctor {}", template.id, doctor_id);
        Ok(template)
    }

    pub async fn list_templates(&self, doctor_id: Uuid, auth_token: &str) -> DoctorResult<Vec<AvailabilityTemplate>> {
        let path = format!(
            "{}?doctor_id=eq.{}&order=day_of_week.asc,start_time.asc",
            TEMPLATES_TABLE, doctor_id
        );
        self.get_rows(&path, auth_token).await
    }

    pub async fn delete_template(&self, doctor_id: Uuid, template_id: Uuid, auth_token: &str) -> DoctorResult<()> {
        debug!("Deleting template {} for doctor {}", template_id, doctor_id);
        self.delete_row(TEMPLATES_TABLE, doctor_id, template_id, auth_token).await
    }

    // ==========================================================================
    // DATE-SCOPED RULES
    // ==========================================================================

    pub async fn create_availability(
        &self,
        doctor_id: Uuid,
        request: CreateAvailabilityRequest,
        auth_token: &str,
    ) -> DoctorResult<DoctorAvailability> {
        debug!("Creating availability for doctor {} anchored on {}", doctor_id, request.specific_date);

        validate_window(request.start_time, request.end_time)?;
        validate_recurrence_end(request.specific_date, request.recurrence_end)?;

        let now = Utc::now().to_rfc3339();
        let body = json!({
            "doctor_id": doctor_id,
            "specific_date": request.specific_date,
            "start_time": request.start_time.format(TIME_FORMAT).to_string(),
            "end_time": request.end_time.format(TIME_FORMAT).to_string(),
            "recurrence_type": request.recurrence_type.unwrap_or(RecurrenceType::None),
            "recurrence_end": request.recurrence_end,
            "is_active": true,
            "created_at": now,
            "updated_at": now
        });

        let availability: DoctorAvailability = self
            .write_one(Method::POST, RULES_TABLE, body, auth_token, "Availability")
            .await?;
        info!("Availability {} created for doctor {}", availability.id, doctor_id);
        Ok(availability)
    }

    pub async fn list_availability(&self, doctor_id: Uuid, auth_token: &str) -> DoctorResult<Vec<DoctorAvailability>> {
        let path = format!(
            "{}?doctor_id=eq.{}&order=specific_date.asc,start_time.asc",
            RULES_TABLE, doctor_id
        );
        self.get_rows(&path, auth_token).await
    }

    async fn get_availability_by_id(
        &self,
        doctor_id: Uuid,
        availability_id: Uuid,
        auth_token: &str,
    ) -> DoctorResult<DoctorAvailability> {
        let path = format!("{}?id=eq.{}&doctor_id=eq.{}", RULES_TABLE, availability_id, doctor_id);
        self.get_rows(&path, auth_token)
            .await?
            .into_iter()
            .next()
            .ok_or(DoctorError::ResourceNotFound("Availability"))
    }

    /// Partial update. The merged rule must still satisfy the same invariants
    /// as a freshly created one.
    pub async fn update_availability(
        &self,
        doctor_id: Uuid,
        availability_id: Uuid,
        request: UpdateAvailabilityRequest,
        auth_token: &str,
    ) -> DoctorResult<DoctorAvailability> {
        debug!("Updating availability {} for doctor {}", availability_id, doctor_id);

        let existing = self.get_availability_by_id(doctor_id, availability_id, auth_token).await?;

        validate_window(
            request.start_time.unwrap_or(existing.start_time),
            request.end_time.unwrap_or(existing.end_time),
        )?;
        validate_recurrence_end(
            existing.specific_date,
            request.recurrence_end.unwrap_or(existing.recurrence_end),
        )?;

        let mut update = serde_json::Map::new();
        if let Some(start) = request.start_time {
            update.insert("start_time".to_string(), json!(start.format(TIME_FORMAT).to_string()));
        }
        if let Some(end) = request.end_time {
            update.insert("end_time".to_string(), json!(end.format(TIME_FORMAT).to_string()));
        }
        if let Some(recurrence_type) = request.recurrence_type {
            update.insert("recurrence_type".to_string(), json!(recurrence_type));
        }
        // Some(None) writes null, clearing the end date.
        if let Some(recurrence_end) = request.recurrence_end {
            update.insert("recurrence_end".to_string(), json!(recurrence_end));
        }
        if let Some(is_active) = request.is_active {
            update.insert("is_active".to_string(), json!(is_active));
        }
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("{}?id=eq.{}&doctor_id=eq.{}", RULES_TABLE, availability_id, doctor_id);
        self.write_one(Method::PATCH, &path, Value::Object(update), auth_token, "Availability")
            .await
    }

    pub async fn delete_availability(&self, doctor_id: Uuid, availability_id: Uuid, auth_token: &str) -> DoctorResult<()> {
        debug!("Deleting availability {} for doctor {}", availability_id, doctor_id);
        self.delete_row(RULES_TABLE, doctor_id, availability_id, auth_token).await
    }

    // ==========================================================================
    // OVERRIDES
    // ==========================================================================

    pub async fn create_availability_override(
        &self,
        doctor_id: Uuid,
        request: CreateAvailabilityOverrideRequest,
        auth_token: &str,
    ) -> DoctorResult<DoctorAvailabilityOverride> {
        debug!("Creating availability override for doctor {} on {}", doctor_id, request.override_date);

        let existing_path = format!(
            "{}?doctor_id=eq.{}&override_date=eq.{}",
            OVERRIDES_TABLE, doctor_id, request.override_date
        );
        let existing: Vec<Value> = self.get_rows(&existing_path, auth_token).await?;
        if !existing.is_empty() {
            return Err(DoctorError::Conflict(format!(
                "Availability override already exists for {}",
                request.override_date
            )));
        }

        let body = json!({
            "doctor_id": doctor_id,
            "override_date": request.override_date,
            "is_available": request.is_available,
            "reason": request.reason,
            "created_at": Utc::now().to_rfc3339()
        });

        self.write_one(Method::POST, OVERRIDES_TABLE, body, auth_token, "Availability override")
            .await
    }
}
