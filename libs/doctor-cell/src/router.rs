use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put, delete},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/{doctor_id}/availability", get(handlers::get_doctor_availability_public))
        .route("/{doctor_id}/available-slots", get(handlers::get_available_slots_public));

    // Schedule management: the doctor themselves or an admin
    let protected_routes = Router::new()
        .route("/{doctor_id}/availability", post(handlers::create_availability))
        .route("/{doctor_id}/availability/manage", get(handlers::list_availability))
        .route(
            "/{doctor_id}/availability/{availability_id}",
            put(handlers::update_availability).delete(handlers::delete_availability),
        )
        .route("/{doctor_id}/availability-templates", post(handlers::create_template))
        .route(
            "/{doctor_id}/availability-templates/{template_id}",
            delete(handlers::delete_template),
        )
        .route("/{doctor_id}/availability-overrides", post(handlers::create_availability_override))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
