use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;
use chrono::Utc;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{Patient, PatientError, PatientRequest};

fn db_error(err: anyhow::Error) -> PatientError {
    PatientError::DatabaseError(err.to_string())
}

fn parse_patient(row: Value) -> Result<Patient, PatientError> {
    serde_json::from_value(row)
        .map_err(|e| PatientError::DatabaseError(format!("Failed to parse patient: {}", e)))
}

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Newest registrations first.
    pub async fn list_patients(&self, auth_token: &str) -> Result<Vec<Patient>, PatientError> {
        debug!("Listing patients");

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            "/rest/v1/patients?order=created_at.desc",
            Some(auth_token),
            None,
        ).await.map_err(db_error)?;

        result.into_iter().map(parse_patient).collect()
    }

    pub async fn get_patient(&self, patient_id: Uuid, auth_token: &str) -> Result<Patient, PatientError> {
        debug!("Fetching patient: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(db_error)?;

        let row = result.into_iter().next().ok_or(PatientError::NotFound)?;
        parse_patient(row)
    }

    pub async fn create_patient(&self, request: PatientRequest, auth_token: &str) -> Result<Patient, PatientError> {
        request.validate()?;
        let request = request.normalized();
        debug!("Registering patient: {}", request.name);

        let now = Utc::now().to_rfc3339();
        let patient_data = json!({
            "name": request.name,
            "age": request.age,
            "address": request.address,
            "case_category": request.case_category,
            "contact_no": request.contact_no,
            "email": request.email,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/patients",
            Some(auth_token),
            Some(patient_data),
            Some(return_representation()),
        ).await.map_err(db_error)?;

        let patient = parse_patient(
            result.into_iter().next()
                .ok_or_else(|| PatientError::DatabaseError("Failed to create patient".to_string()))?,
        )?;

        info!("Patient {} registered", patient.id);
        Ok(patient)
    }

    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: PatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        request.validate()?;
        let request = request.normalized();
        debug!("Updating patient: {}", patient_id);

        let update_data = json!({
            "name": request.name,
            "age": request.age,
            "address": request.address,
            "case_category": request.case_category,
            "contact_no": request.contact_no,
            "email": request.email,
            "updated_at": Utc::now().to_rfc3339()
        });

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(return_representation()),
        ).await.map_err(db_error)?;

        let row = result.into_iter().next().ok_or(PatientError::NotFound)?;
        parse_patient(row)
    }

    /// Refuses to delete a patient still referenced by any appointment.
    pub async fn delete_patient(&self, patient_id: Uuid, auth_token: &str) -> Result<(), PatientError> {
        debug!("Deleting patient: {}", patient_id);

        let references = self.supabase.count(
            &format!("/rest/v1/appointments?patient_id=eq.{}", patient_id),
            Some(auth_token),
        ).await.map_err(db_error)?;

        if references > 0 {
            warn!("Refusing to delete patient {} with {} appointments", patient_id, references);
            return Err(PatientError::HasAppointments { count: references });
        }

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(return_representation()),
        ).await.map_err(db_error)?;

        if deleted.is_empty() {
            return Err(PatientError::NotFound);
        }

        info!("Patient {} deleted", patient_id);
        Ok(())
    }
}
