use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient, SupabaseError};

use crate::models::{Appointment, AppointmentDetails, AppointmentError, AppointmentRecord, AppointmentStatus, SlotGuard};

/// Persistence seam for appointments.
///
/// Writes that carry a [`SlotGuard`] must count and write as one atomic step:
/// if the slot already holds `max_per_slot` other non-cancelled appointments
/// the write fails with [`AppointmentError::SlotFull`] and nothing changes.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Appointments at exactly `slot` whose status is not `status_not`,
    /// leaving out `exclude` when given.
    async fn count_appointments(
        &self,
        slot: DateTime<Utc>,
        status_not: AppointmentStatus,
        exclude: Option<Uuid>,
    ) -> Result<i64, AppointmentError>;

    /// Appointments with `start <= appointment_date < end`, oldest first.
    async fn find_appointments_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AppointmentDetails>, AppointmentError>;

    /// Every appointment, newest first.
    async fn list_appointments(&self) -> Result<Vec<AppointmentDetails>, AppointmentError>;

    async fn get_appointment(&self, id: Uuid) -> Result<AppointmentDetails, AppointmentError>;

    async fn insert_appointment(
        &self,
        record: AppointmentRecord,
        guard: Option<SlotGuard>,
    ) -> Result<Appointment, AppointmentError>;

    /// With a guard, the store decides against the live row: one that
    /// already holds `record.appointment_date` keeps its place, anything else
    /// is counted against the bound. A changed timestamp always clears
    /// `notification_sent`.
    async fn update_appointment(
        &self,
        id: Uuid,
        record: AppointmentRecord,
        guard: Option<SlotGuard>,
    ) -> Result<Appointment, AppointmentError>;

    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppointmentError>;

    /// Reserves the reminder for `id` so overlapping sweeps do not both send.
    /// `Ok(false)` when it was already sent or another claim younger than
    /// `lease` holds it.
    async fn claim_reminder(&self, id: Uuid, now: DateTime<Utc>, lease: Duration) -> Result<bool, AppointmentError>;

    /// Drops a claim without marking the reminder sent.
    async fn release_reminder(&self, id: Uuid) -> Result<(), AppointmentError>;

    async fn mark_notification_sent(&self, id: Uuid) -> Result<(), AppointmentError>;
}

const DETAILS_SELECT: &str = "*,doctor:doctors(*),patient:patients(*)";

/// Slots are whole minutes, so equality filters stay at second precision.
fn slot_param(ts: DateTime<Utc>) -> String {
    urlencoding::encode(&ts.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

fn instant_param(ts: DateTime<Utc>) -> String {
    urlencoding::encode(&ts.to_rfc3339_opts(SecondsFormat::Micros, true)).into_owned()
}

fn parse_row<T: serde::de::DeserializeOwned>(row: Value) -> Result<T, AppointmentError> {
    serde_json::from_value(row)
        .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
}

/// Maps client failures onto the appointment domain. A 409 from the slot
/// functions means the slot filled up; a foreign key violation means the
/// doctor or patient does not exist.
fn store_error(err: anyhow::Error, max_per_slot: Option<i64>) -> AppointmentError {
    match SupabaseError::from_anyhow(&err) {
        Some(SupabaseError::Conflict(body)) if body.contains("23503") => {
            AppointmentError::ReferenceNotFound("Doctor or patient does not exist".to_string())
        }
        Some(SupabaseError::Conflict(body)) if body.contains("slot_full") => match max_per_slot {
            Some(max) => AppointmentError::SlotFull { max },
            None => AppointmentError::DatabaseError(body.clone()),
        },
        Some(SupabaseError::NotFound(_)) => AppointmentError::NotFound,
        _ => AppointmentError::DatabaseError(err.to_string()),
    }
}

/// [`AppointmentStore`] over PostgREST. Guarded writes go through the
/// `book_appointment_in_slot` and `move_appointment_to_slot` functions, which
/// take a transaction-scoped advisory lock on the slot before counting.
pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
    auth_token: Option<String>,
}

impl SupabaseAppointmentStore {
    /// `auth_token` is the caller's JWT; `None` runs with the service key only.
    pub fn new(config: &AppConfig, auth_token: Option<&str>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            auth_token: auth_token.map(str::to_string),
        }
    }

    fn token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    fn slot_params(record: &AppointmentRecord, guard: SlotGuard) -> Value {
        json!({
            "p_doctor_id": record.doctor_id,
            "p_patient_id": record.patient_id,
            "p_appointment_date": record.appointment_date.to_rfc3339(),
            "p_status": record.status,
            "p_case_description": record.case_description,
            "p_charge": record.charge,
            "p_notification_sent": record.notification_sent,
            "p_max_per_slot": guard.max_per_slot,
        })
    }

    fn row_values(record: &AppointmentRecord) -> Value {
        json!({
            "doctor_id": record.doctor_id,
            "patient_id": record.patient_id,
            "appointment_date": record.appointment_date.to_rfc3339(),
            "status": record.status,
            "case_description": record.case_description,
            "charge": record.charge,
            "notification_sent": record.notification_sent,
            "updated_at": Utc::now().to_rfc3339()
        })
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn count_appointments(
        &self,
        slot: DateTime<Utc>,
        status_not: AppointmentStatus,
        exclude: Option<Uuid>,
    ) -> Result<i64, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?appointment_date=eq.{}&status=neq.{}",
            slot_param(slot),
            status_not.as_str()
        );
        if let Some(id) = exclude {
            path.push_str(&format!("&id=neq.{}", id));
        }

        self.supabase.count(&path, self.token()).await
            .map_err(|e| store_error(e, None))
    }

    async fn find_appointments_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AppointmentDetails>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?select={}&appointment_date=gte.{}&appointment_date=lt.{}&order=appointment_date.asc",
            DETAILS_SELECT,
            instant_param(start),
            instant_param(end)
        );
        debug!("Fetching appointments between {} and {}", start, end);

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, self.token(), None)
            .await
            .map_err(|e| store_error(e, None))?;

        rows.into_iter().map(parse_row).collect()
    }

    async fn list_appointments(&self) -> Result<Vec<AppointmentDetails>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?select={}&order=appointment_date.desc",
            DETAILS_SELECT
        );

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, self.token(), None)
            .await
            .map_err(|e| store_error(e, None))?;

        rows.into_iter().map(parse_row).collect()
    }

    async fn get_appointment(&self, id: Uuid) -> Result<AppointmentDetails, AppointmentError> {
        let path = format!("/rest/v1/appointments?select={}&id=eq.{}", DETAILS_SELECT, id);

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, self.token(), None)
            .await
            .map_err(|e| store_error(e, None))?;

        let row = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;
        parse_row(row)
    }

    async fn insert_appointment(
        &self,
        record: AppointmentRecord,
        guard: Option<SlotGuard>,
    ) -> Result<Appointment, AppointmentError> {
        match guard {
            Some(guard) => {
                let row: Value = self.supabase.request(
                    Method::POST,
                    "/rest/v1/rpc/book_appointment_in_slot",
                    self.token(),
                    Some(Self::slot_params(&record, guard)),
                ).await.map_err(|e| store_error(e, Some(guard.max_per_slot)))?;

                parse_row(row)
            }
            None => {
                let mut values = Self::row_values(&record);
                values["created_at"] = json!(Utc::now().to_rfc3339());

                let rows: Vec<Value> = self.supabase.request_with_headers(
                    Method::POST,
                    "/rest/v1/appointments",
                    self.token(),
                    Some(values),
                    Some(return_representation()),
                ).await.map_err(|e| store_error(e, None))?;

                let row = rows.into_iter().next().ok_or_else(|| {
                    AppointmentError::DatabaseError("Failed to create appointment".to_string())
                })?;
                parse_row(row)
            }
        }
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        record: AppointmentRecord,
        guard: Option<SlotGuard>,
    ) -> Result<Appointment, AppointmentError> {
        match guard {
            Some(guard) => {
                let mut params = Self::slot_params(&record, guard);
                params["p_id"] = json!(id);

                let row: Value = self.supabase.request(
                    Method::POST,
                    "/rest/v1/rpc/move_appointment_to_slot",
                    self.token(),
                    Some(params),
                ).await.map_err(|e| store_error(e, Some(guard.max_per_slot)))?;

                parse_row(row)
            }
            None => {
                let path = format!("/rest/v1/appointments?id=eq.{}", id);
                let rows: Vec<Value> = self.supabase.request_with_headers(
                    Method::PATCH,
                    &path,
                    self.token(),
                    Some(Self::row_values(&record)),
                    Some(return_representation()),
                ).await.map_err(|e| store_error(e, None))?;

                let row = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;
                parse_row(row)
            }
        }
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            self.token(),
            None,
            Some(return_representation()),
        ).await.map_err(|e| store_error(e, None))?;

        if deleted.is_empty() {
            return Err(AppointmentError::NotFound);
        }
        Ok(())
    }

    async fn claim_reminder(&self, id: Uuid, now: DateTime<Utc>, lease: Duration) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&notification_sent=is.false&or=(reminder_claimed_at.is.null,reminder_claimed_at.lt.{})",
            id,
            instant_param(now - lease)
        );
        let claimed: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            self.token(),
            Some(json!({ "reminder_claimed_at": now.to_rfc3339() })),
            Some(return_representation()),
        ).await.map_err(|e| store_error(e, None))?;

        Ok(!claimed.is_empty())
    }

    async fn release_reminder(&self, id: Uuid) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            self.token(),
            Some(json!({ "reminder_claimed_at": null })),
            Some(return_representation()),
        ).await.map_err(|e| store_error(e, None))?;

        Ok(())
    }

    async fn mark_notification_sent(&self, id: Uuid) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let updated: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            self.token(),
            Some(json!({
                "notification_sent": true,
                "reminder_claimed_at": null,
                "updated_at": Utc::now().to_rfc3339()
            })),
            Some(return_representation()),
        ).await.map_err(|e| store_error(e, None))?;

        if updated.is_empty() {
            warn!("Appointment {} vanished before it could be marked notified", id);
            return Err(AppointmentError::NotFound);
        }
        Ok(())
    }
}
