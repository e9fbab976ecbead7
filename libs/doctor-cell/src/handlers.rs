use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CreateAvailabilityOverrideRequest, CreateAvailabilityRequest, CreateTemplateRequest, SlotQuery,
    UpdateAvailabilityRequest,
};
use crate::services::{availability::AvailabilityService, schedule::ScheduleService};

#[derive(Debug, Deserialize)]
pub struct AvailableSlotsQuery {
    pub from: NaiveDate,
    /// Defaults to `from`, i.e. a single day.
    pub to: Option<NaiveDate>,
    pub timezone: Option<String>,
    pub slot_duration_minutes: Option<i64>,
}

impl AvailableSlotsQuery {
    fn into_slot_query(self, config: &AppConfig) -> SlotQuery {
        SlotQuery {
            from: self.from,
            to: self.to.unwrap_or(self.from),
            timezone: self.timezone.filter(|tz| !tz.trim().is_empty()),
            slot_duration_minutes: self
                .slot_duration_minutes
                .unwrap_or(config.default_slot_duration_minutes),
        }
    }
}

fn authorize(user: &User, doctor_id: Uuid) -> Result<(), AppError> {
    if user.can_manage_doctor(&doctor_id.to_string()) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Not authorized to manage availability for this doctor".to_string(),
        ))
    }
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots_public(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let query = query.into_slot_query(&state);
    let availability_service = AvailabilityService::new(&state, None);

    let grid = availability_service
        .get_slot_grid(doctor_id, &query)
        .await?;

    Ok(Json(json!({
        "doctor_id": grid.doctor_id,
        "timezone": grid.timezone,
        "from": query.from,
        "to": query.to,
        "slot_duration_minutes": query.slot_duration_minutes,
        "total_slots": grid.slots.len(),
        "available_slots": grid.slots.iter().filter(|s| s.available).count(),
        "slots": grid.slots
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_availability_public(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state, None);

    let rules = availability_service.get_doctor_rules(doctor_id).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "rules": rules,
        "total": rules.len()
    })))
}

// ==============================================================================
// PROTECTED AVAILABILITY MANAGEMENT
// ==============================================================================

#[axum::debug_handler]
pub async fn create_template(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    authorize(&user, doctor_id)?;

    let template = ScheduleService::new(&state)
        .create_template(doctor_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(template))))
}

#[axum::debug_handler]
pub async fn delete_template(
    State(state): State<Arc<AppConfig>>,
    Path((doctor_id, template_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, AppError> {
    authorize(&user, doctor_id)?;

    ScheduleService::new(&state)
        .delete_template(doctor_id, template_id, auth.token())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn list_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    authorize(&user, doctor_id)?;

    let schedule_service = ScheduleService::new(&state);
    let templates = schedule_service.list_templates(doctor_id, auth.token()).await?;
    let rules = schedule_service.list_availability(doctor_id, auth.token()).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "templates": templates,
        "rules": rules
    })))
}

#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    authorize(&user, doctor_id)?;

    let availability = ScheduleService::new(&state)
        .create_availability(doctor_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(availability))))
}

#[axum::debug_handler]
pub async fn update_availability(
    State(state): State<Arc<AppConfig>>,
    Path((doctor_id, availability_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    authorize(&user, doctor_id)?;

    let availability = ScheduleService::new(&state)
        .update_availability(doctor_id, availability_id, request, auth.token())
        .await?;

    Ok(Json(json!(availability)))
}

#[axum::debug_handler]
pub async fn delete_availability(
    State(state): State<Arc<AppConfig>>,
    Path((doctor_id, availability_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, AppError> {
    authorize(&user, doctor_id)?;

    ScheduleService::new(&state)
        .delete_availability(doctor_id, availability_id, auth.token())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn create_availability_override(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAvailabilityOverrideRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    authorize(&user, doctor_id)?;

    let override_entry = ScheduleService::new(&state)
        .create_availability_override(doctor_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(override_entry))))
}
