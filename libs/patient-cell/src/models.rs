use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use shared_models::error::AppError;
use shared_utils::validation::{self, FieldError};

/// Treatment line a patient is registered under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseCategory {
    Hair,
    Skin,
    Moles,
    HairRemoval,
    Hydrafacial,
    WeightLoss,
    Other,
}

impl CaseCategory {
    pub fn label(&self) -> &'static str {
        match self {
            CaseCategory::Hair => "Hair Treatment",
            CaseCategory::Skin => "Skin Care",
            CaseCategory::Moles => "Mole Removal",
            CaseCategory::HairRemoval => "Hair Removal",
            CaseCategory::Hydrafacial => "Hydrafacial",
            CaseCategory::WeightLoss => "Weight Loss",
            CaseCategory::Other => "Other",
        }
    }
}

impl fmt::Display for CaseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub age: i32,
    pub address: Option<String>,
    pub case_category: CaseCategory,
    pub contact_no: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of both create and update; an update replaces every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRequest {
    pub name: String,
    pub age: i32,
    pub address: Option<String>,
    pub case_category: CaseCategory,
    pub contact_no: String,
    pub email: Option<String>,
}

impl PatientRequest {
    pub fn validate(&self) -> Result<(), FieldError> {
        validation::min_chars("name", &self.name, 2, "Name must be at least 2 characters")?;
        if self.age < 1 {
            return Err(FieldError::new("age", "Age must be at least 1"));
        }
        if self.age > 120 {
            return Err(FieldError::new("age", "Age must be at most 120"));
        }
        validation::phone_digits("contact_no", &self.contact_no, 10, "Contact number must be at least 10 digits")?;
        if let Some(email) = validation::non_blank(self.email.clone()) {
            validation::email("email", &email)?;
        }
        Ok(())
    }

    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            address: validation::non_blank(self.address),
            contact_no: self.contact_no.trim().to_string(),
            email: validation::non_blank(self.email),
            ..self
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Patient has {count} appointment(s) and cannot be deleted")]
    HasAppointments { count: i64 },

    #[error("Validation error: {0}")]
    Validation(#[from] FieldError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound => AppError::NotFound(err.to_string()),
            PatientError::HasAppointments { .. } => AppError::Conflict(err.to_string()),
            PatientError::Validation(field) => field.into(),
            PatientError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PatientRequest {
        PatientRequest {
            name: "Asha Patel".to_string(),
            age: 34,
            address: Some("  ".to_string()),
            case_category: CaseCategory::HairRemoval,
            contact_no: "9876543210".to_string(),
            email: Some("".to_string()),
        }
    }

    #[test]
    fn test_age_bounds() {
        assert!(PatientRequest { age: 1, ..request() }.validate().is_ok());
        assert!(PatientRequest { age: 120, ..request() }.validate().is_ok());
        assert_eq!(PatientRequest { age: 0, ..request() }.validate().unwrap_err().field, "age");
        assert_eq!(PatientRequest { age: 121, ..request() }.validate().unwrap_err().field, "age");
    }

    #[test]
    fn test_contact_number_required() {
        let err = PatientRequest { contact_no: "98765".to_string(), ..request() }
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "contact_no");
    }

    #[test]
    fn test_normalized_drops_blank_optionals() {
        let normalized = request().normalized();
        assert_eq!(normalized.address, None);
        assert_eq!(normalized.email, None);
    }

    #[test]
    fn test_case_category_wire_format() {
        let json = serde_json::to_string(&CaseCategory::HairRemoval).unwrap();
        assert_eq!(json, "\"HAIR_REMOVAL\"");
        let parsed: CaseCategory = serde_json::from_str("\"WEIGHT_LOSS\"").unwrap();
        assert_eq!(parsed, CaseCategory::WeightLoss);
        assert_eq!(CaseCategory::Moles.label(), "Mole Removal");
    }
}
