use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use shared_models::error::AppError;
use shared_utils::validation::{self, FieldError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub specialization: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of both create and update; an update replaces every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    pub specialization: Option<Vec<String>>,
}

impl DoctorRequest {
    pub fn validate(&self) -> Result<(), FieldError> {
        validation::min_chars("name", &self.name, 2, "Name must be at least 2 characters")?;
        if let Some(email) = validation::non_blank(self.email.clone()) {
            validation::email("email", &email)?;
        }
        validation::phone_digits("phone", &self.phone, 10, "Phone number must be at least 10 digits")?;
        Ok(())
    }

    /// Blank email becomes null, specializations are trimmed and de-blanked.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: validation::non_blank(self.email),
            phone: self.phone.trim().to_string(),
            specialization: Some(
                self.specialization
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|s| validation::non_blank(Some(s)))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Doctor with this email already exists")]
    EmailAlreadyExists { email: String },

    #[error("Doctor with this phone number already exists")]
    PhoneAlreadyExists { phone: String },

    #[error("Doctor has {count} appointment(s) and cannot be deleted")]
    HasAppointments { count: i64 },

    #[error("Validation error: {0}")]
    Validation(#[from] FieldError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => AppError::NotFound(err.to_string()),
            DoctorError::EmailAlreadyExists { .. }
            | DoctorError::PhoneAlreadyExists { .. }
            | DoctorError::HasAppointments { .. } => AppError::Conflict(err.to_string()),
            DoctorError::Validation(field) => field.into(),
            DoctorError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
