use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;
use chrono::Utc;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient, SupabaseError};

use crate::models::{Doctor, DoctorError, DoctorRequest};

fn db_error(err: anyhow::Error) -> DoctorError {
    DoctorError::DatabaseError(err.to_string())
}

fn parse_doctor(row: Value) -> Result<Doctor, DoctorError> {
    serde_json::from_value(row)
        .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse doctor: {}", e)))
}

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list_doctors(&self, auth_token: &str) -> Result<Vec<Doctor>, DoctorError> {
        debug!("Listing doctors");

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            "/rest/v1/doctors?order=name.asc",
            Some(auth_token),
            None,
        ).await.map_err(db_error)?;

        result.into_iter().map(parse_doctor).collect()
    }

    pub async fn get_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(db_error)?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;
        parse_doctor(row)
    }

    pub async fn create_doctor(&self, request: DoctorRequest, auth_token: &str) -> Result<Doctor, DoctorError> {
        request.validate()?;
        let request = request.normalized();
        debug!("Creating doctor: {}", request.name);

        self.ensure_unique_contact(&request, None, auth_token).await?;

        let now = Utc::now().to_rfc3339();
        let doctor_data = json!({
            "name": request.name,
            "email": request.email,
            "phone": request.phone,
            "specialization": request.specialization,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/doctors",
            Some(auth_token),
            Some(doctor_data),
            Some(return_representation()),
        ).await.map_err(|e| self.write_error(e, &request))?;

        let doctor = parse_doctor(
            result.into_iter().next()
                .ok_or_else(|| DoctorError::DatabaseError("Failed to create doctor".to_string()))?,
        )?;

        info!("Doctor {} created", doctor.id);
        Ok(doctor)
    }

    pub async fn update_doctor(
        &self,
        doctor_id: Uuid,
        request: DoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        request.validate()?;
        let request = request.normalized();
        debug!("Updating doctor: {}", doctor_id);

        self.ensure_unique_contact(&request, Some(doctor_id), auth_token).await?;

        let update_data = json!({
            "name": request.name,
            "email": request.email,
            "phone": request.phone,
            "specialization": request.specialization,
            "updated_at": Utc::now().to_rfc3339()
        });

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(return_representation()),
        ).await.map_err(|e| self.write_error(e, &request))?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;
        parse_doctor(row)
    }

    /// Refuses to delete a doctor still referenced by any appointment.
    pub async fn delete_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<(), DoctorError> {
        debug!("Deleting doctor: {}", doctor_id);

        let references = self.supabase.count(
            &format!("/rest/v1/appointments?doctor_id=eq.{}", doctor_id),
            Some(auth_token),
        ).await.map_err(db_error)?;

        if references > 0 {
            warn!("Refusing to delete doctor {} with {} appointments", doctor_id, references);
            return Err(DoctorError::HasAppointments { count: references });
        }

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(return_representation()),
        ).await.map_err(db_error)?;

        if deleted.is_empty() {
            return Err(DoctorError::NotFound);
        }

        info!("Doctor {} deleted", doctor_id);
        Ok(())
    }

    async fn ensure_unique_contact(
        &self,
        request: &DoctorRequest,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), DoctorError> {
        let exclude = exclude_id
            .map(|id| format!("&id=neq.{}", id))
            .unwrap_or_default();

        if let Some(email) = &request.email {
            let path = format!(
                "/rest/v1/doctors?email=eq.{}{}&select=id",
                urlencoding::encode(email),
                exclude
            );
            let existing: Vec<Value> = self.supabase
                .request(Method::GET, &path, Some(auth_token), None)
                .await
                .map_err(db_error)?;
            if !existing.is_empty() {
                return Err(DoctorError::EmailAlreadyExists { email: email.clone() });
            }
        }

        let path = format!(
            "/rest/v1/doctors?phone=eq.{}{}&select=id",
            urlencoding::encode(&request.phone),
            exclude
        );
        let existing: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(db_error)?;
        if !existing.is_empty() {
            return Err(DoctorError::PhoneAlreadyExists { phone: request.phone.clone() });
        }

        Ok(())
    }

    /// The unique indexes still win a race between two concurrent writers.
    fn write_error(&self, err: anyhow::Error, request: &DoctorRequest) -> DoctorError {
        match SupabaseError::from_anyhow(&err) {
            Some(SupabaseError::Conflict(body)) if body.contains("email") => {
                DoctorError::EmailAlreadyExists { email: request.email.clone().unwrap_or_default() }
            }
            Some(SupabaseError::Conflict(_)) => {
                DoctorError::PhoneAlreadyExists { phone: request.phone.clone() }
            }
            _ => db_error(err),
        }
    }
}
