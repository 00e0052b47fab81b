use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Time slot is full: at most {max} patients per slot")]
    SlotFull { max: i64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) | AppError::SlotFull { .. } => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn body(&self) -> Value {
        match self {
            AppError::Validation { field, message } => json!({
                "error": "Invalid input",
                "field": field,
                "details": message,
            }),
            AppError::SlotFull { max } => json!({
                "error": "Time slot is full",
                "message": format!("Maximum {} patients can be scheduled at the same time", max),
                "max_patients_per_slot": max,
            }),
            AppError::Auth(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Conflict(msg)
            | AppError::Database(msg)
            | AppError::Internal(msg)
            | AppError::ExternalService(msg) => json!({ "error": msg }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Error: {}: {}", status, self);
        } else {
            tracing::warn!("Rejected request: {}: {}", status, self);
        }

        (status, Json(self.body())).into_response()
    }
}

/// Pulls the offending field out of a deserializer message such as
/// `appointment_date: input contains invalid characters` or
/// ``missing field `doctor_id` ``. Falls back to `fallback`.
fn field_and_detail(detail: &str, fallback: &str) -> (String, String) {
    if let Some((path, rest)) = detail.split_once(": ") {
        let is_path = !path.is_empty()
            && path.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'));
        if is_path {
            return (path.to_string(), rest.to_string());
        }
    }

    let named = detail
        .split_once("field `")
        .and_then(|(_, rest)| rest.split_once('`'))
        .map(|(field, _)| field.to_string());
    (named.unwrap_or_else(|| fallback.to_string()), detail.to_string())
}

/// Drops the extractor's leading "Failed to ...: " sentence.
fn rejection_detail(body_text: &str) -> &str {
    body_text.split_once(": ").map(|(_, rest)| rest).unwrap_or(body_text)
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => {
                let text = err.body_text();
                let (field, message) = field_and_detail(rejection_detail(&text), "body");
                AppError::Validation { field, message }
            }
            JsonRejection::JsonSyntaxError(err) => AppError::Validation {
                field: "body".to_string(),
                message: rejection_detail(&err.body_text()).to_string(),
            },
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        let text = rejection.body_text();
        let (field, message) = field_and_detail(rejection_detail(&text), "query");
        AppError::Validation { field, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_full_body_carries_limit() {
        let err = AppError::SlotFull { max: 5 };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let body = err.body();
        assert_eq!(body["error"], "Time slot is full");
        assert_eq!(body["max_patients_per_slot"], 5);
        assert_eq!(
            body["message"],
            "Maximum 5 patients can be scheduled at the same time"
        );
    }

    #[test]
    fn test_validation_names_field() {
        let err = AppError::Validation {
            field: "age".to_string(),
            message: "Age must be at least 1".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body()["field"], "age");
    }

    #[test]
    fn test_deserializer_path_becomes_field() {
        let (field, message) = field_and_detail("appointment_date: input contains invalid characters", "body");
        assert_eq!(field, "appointment_date");
        assert_eq!(message, "input contains invalid characters");

        let (field, _) = field_and_detail("missing field `doctor_id` at line 1 column 2", "body");
        assert_eq!(field, "doctor_id");

        let (field, _) = field_and_detail("expected value at line 1 column 1", "query");
        assert_eq!(field, "query");
    }

    #[test]
    fn test_persistence_maps_to_500() {
        assert_eq!(
            AppError::Database("connection refused".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
