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

use crate::models::{Patient, PatientRequest};
use crate::services::PatientService;

#[axum::debug_handler]
pub async fn list_patients(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Vec<Patient>>, AppError> {
    let service = PatientService::new(&config);
    let patients = service.list_patients(auth.token()).await?;
    Ok(Json(patients))
}

#[axum::debug_handler]
pub async fn create_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<PatientRequest>, AppError>,
) -> Result<(StatusCode, Json<Patient>), AppError> {
    debug!("Patient registration by {}", user.display_name());

    let service = PatientService::new(&config);
    let patient = service.create_patient(request, auth.token()).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Patient>, AppError> {
    let service = PatientService::new(&config);
    let patient = service.get_patient(patient_id, auth.token()).await?;
    Ok(Json(patient))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
    WithRejection(Json(request), _): WithRejection<Json<PatientRequest>, AppError>,
) -> Result<Json<Patient>, AppError> {
    debug!("Patient {} update by {}", patient_id, user.display_name());

    let service = PatientService::new(&config);
    let patient = service.update_patient(patient_id, request, auth.token()).await?;
    Ok(Json(patient))
}

#[axum::debug_handler]
pub async fn delete_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    debug!("Patient {} deletion by {}", patient_id, user.display_name());

    let service = PatientService::new(&config);
    service.delete_patient(patient_id, auth.token()).await?;
    Ok(Json(json!({ "message": "Patient deleted successfully" })))
}
