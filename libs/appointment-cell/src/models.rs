use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use doctor_cell::models::Doctor;
use patient_cell::models::Patient;
use shared_models::error::AppError;
use shared_utils::validation::FieldError;

// ==============================================================================
// APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Wire value, as stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::NoShow => "NO_SHOW",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "Scheduled",
            AppointmentStatus::Completed => "Completed",
            AppointmentStatus::Cancelled => "Cancelled",
            AppointmentStatus::NoShow => "No Show",
        }
    }

    /// Every status except `Cancelled` holds a place in its slot.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    /// Whether a reminder should still go out for an appointment in this state.
    pub fn is_remindable(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Completed)
    }
}

impl Default for AppointmentStatus {
    fn default() -> Self {
        AppointmentStatus::Scheduled
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub case_description: Option<String>,
    pub charge: Option<f64>,
    #[serde(default)]
    pub notification_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An appointment row with its doctor and patient embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub doctor: Option<Doctor>,
    pub patient: Option<Patient>,
}

impl AppointmentDetails {
    pub fn id(&self) -> Uuid {
        self.appointment.id
    }

    pub fn patient_name(&self) -> Option<&str> {
        self.patient.as_ref().map(|p| p.name.as_str())
    }

    pub fn doctor_name(&self) -> Option<&str> {
        self.doctor.as_ref().map(|d| d.name.as_str())
    }

    pub fn contact_no(&self) -> Option<&str> {
        self.patient.as_ref().map(|p| p.contact_no.as_str())
    }
}

/// Body of both create and update. An update replaces every writable field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    #[serde(default)]
    pub status: AppointmentStatus,
    pub case_description: Option<String>,
    pub charge: Option<f64>,
}

impl AppointmentRequest {
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.doctor_id.is_nil() {
            return Err(FieldError::new("doctor_id", "Doctor is required"));
        }
        if self.patient_id.is_nil() {
            return Err(FieldError::new("patient_id", "Patient is required"));
        }
        if let Some(charge) = self.charge {
            if !charge.is_finite() || charge < 0.0 {
                return Err(FieldError::new("charge", "Charge must be a non-negative amount"));
            }
        }
        Ok(())
    }
}

/// Column values written for a create or update, after slot normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentRecord {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub case_description: Option<String>,
    pub charge: Option<f64>,
    pub notification_sent: bool,
}

/// Capacity bound the store enforces while writing into a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGuard {
    pub max_per_slot: i64,
}

// ==============================================================================
// DASHBOARD MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub today_scheduled: usize,
    pub upcoming: Vec<AppointmentDetails>,
    pub total_revenue: f64,
    pub pending_notifications: usize,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Time slot is full (maximum {max} patients)")]
    SlotFull { max: i64 },

    #[error("Referenced record not found: {0}")]
    ReferenceNotFound(String),

    #[error("Validation error: {0}")]
    Validation(#[from] FieldError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::SlotFull { max } => AppError::SlotFull { max },
            AppointmentError::ReferenceNotFound(what) => AppError::NotFound(what),
            AppointmentError::Validation(field_error) => field_error.into(),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
