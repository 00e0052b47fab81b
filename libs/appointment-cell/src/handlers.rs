use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::{extract::WithRejection, TypedHeader};
use chrono::{DateTime, Utc};
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{Appointment, AppointmentDetails, AppointmentRequest, DashboardStats};
use crate::services::admission::Admission;
use crate::services::booking::AppointmentBookingService;

#[derive(Debug, Deserialize)]
pub struct SlotCheckQuery {
    pub appointment_date: DateTime<Utc>,
    pub exclude_appointment_id: Option<Uuid>,
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Vec<AppointmentDetails>>, AppError> {
    let service = AppointmentBookingService::new(&config, auth.token());
    let appointments = service.list_appointments().await?;
    Ok(Json(appointments))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentDetails>, AppError> {
    let service = AppointmentBookingService::new(&config, auth.token());
    let appointment = service.get_appointment(appointment_id).await?;
    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<AppointmentRequest>, AppError>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    debug!("Booking requested by {} for {}", user.display_name(), request.appointment_date);

    let service = AppointmentBookingService::new(&config, auth.token());
    let appointment = service.create_appointment(request).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    WithRejection(Json(request), _): WithRejection<Json<AppointmentRequest>, AppError>,
) -> Result<Json<Appointment>, AppError> {
    debug!("Appointment {} update requested by {}", appointment_id, user.display_name());

    let service = AppointmentBookingService::new(&config, auth.token());
    let appointment = service.update_appointment(appointment_id, request).await?;
    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    debug!("Appointment {} deletion requested by {}", appointment_id, user.display_name());

    let service = AppointmentBookingService::new(&config, auth.token());
    service.delete_appointment(appointment_id).await?;
    Ok(Json(json!({ "message": "Appointment deleted successfully" })))
}

/// Read-only capacity check for the booking form.
#[axum::debug_handler]
pub async fn check_slot(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    WithRejection(Query(query), _): WithRejection<Query<SlotCheckQuery>, AppError>,
) -> Result<Json<Admission>, AppError> {
    let service = AppointmentBookingService::new(&config, auth.token());
    let admission = service
        .check_slot(query.appointment_date, query.exclude_appointment_id)
        .await?;
    Ok(Json(admission))
}

#[axum::debug_handler]
pub async fn get_dashboard_stats(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<DashboardStats>, AppError> {
    let service = AppointmentBookingService::new(&config, auth.token());
    let stats = service.dashboard_stats(Utc::now()).await?;
    Ok(Json(stats))
}
