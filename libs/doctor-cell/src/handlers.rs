use std::sync::Arc;
use axum::{
    extract::{Path, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::{extract::WithRejection, TypedHeader};
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{Doctor, DoctorRequest};
use crate::services::DoctorService;

#[axum::debug_handler]
pub async fn list_doctors(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Vec<Doctor>>, AppError> {
    let service = DoctorService::new(&config);
    let doctors = service.list_doctors(auth.token()).await?;
    Ok(Json(doctors))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Doctor>, AppError> {
    let service = DoctorService::new(&config);
    let doctor = service.get_doctor(doctor_id, auth.token()).await?;
    Ok(Json(doctor))
}

#[axum::debug_handler]
pub async fn create_doctor(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<DoctorRequest>, AppError>,
) -> Result<(StatusCode, Json<Doctor>), AppError> {
    debug!("Doctor creation requested by {}", user.display_name());

    let service = DoctorService::new(&config);
    let doctor = service.create_doctor(request, auth.token()).await?;
    Ok((StatusCode::CREATED, Json(doctor)))
}

#[axum::debug_handler]
pub async fn update_doctor(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    WithRejection(Json(request), _): WithRejection<Json<DoctorRequest>, AppError>,
) -> Result<Json<Doctor>, AppError> {
    debug!("Doctor {} update requested by {}", doctor_id, user.display_name());

    let service = DoctorService::new(&config);
    let doctor = service.update_doctor(doctor_id, request, auth.token()).await?;
    Ok(Json(doctor))
}

#[axum::debug_handler]
pub async fn delete_doctor(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    debug!("Doctor {} deletion requested by {}", doctor_id, user.display_name());

    let service = DoctorService::new(&config);
    service.delete_doctor(doctor_id, auth.token()).await?;
    Ok(Json(json!({ "message": "Doctor deleted successfully" })))
}
