use std::sync::Arc;

use axum::{
    extract::{State, Extension},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info};

use shared_config::AppConfig;
use shared_models::auth::User;

use crate::services::sweep::ReminderService;

/// Runs a sweep now. Delivery failures still answer 200 with the details in
/// `result`; only a failed appointment fetch is a 500.
#[axum::debug_handler]
pub async fn run_reminders(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
) -> (StatusCode, Json<Value>) {
    info!("Manual reminder sweep triggered by {}", user.display_name());

    let service = ReminderService::new(&config);
    match service.run_reminder_sweep(Utc::now()).await {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "message": "Reminders sent",
                "result": result
            })),
        ),
        Err(e) => {
            error!("Manual reminder sweep failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": e.to_string()
                })),
            )
        }
    }
}
