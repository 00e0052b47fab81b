use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use doctor_cell::models::Doctor;
use patient_cell::models::Patient;

use crate::models::{Appointment, AppointmentDetails, AppointmentError, AppointmentRecord, AppointmentStatus, SlotGuard};
use crate::services::store::AppointmentStore;

#[derive(Default)]
struct Tables {
    doctors: HashMap<Uuid, Doctor>,
    patients: HashMap<Uuid, Patient>,
    appointments: HashMap<Uuid, Appointment>,
    claims: HashMap<Uuid, DateTime<Utc>>,
    notified: Vec<Uuid>,
}

impl Tables {
    fn occupied(&self, slot: DateTime<Utc>, exclude: Option<Uuid>) -> i64 {
        self.appointments
            .values()
            .filter(|a| a.appointment_date == slot)
            .filter(|a| a.status.occupies_slot())
            .filter(|a| Some(a.id) != exclude)
            .count() as i64
    }

    fn check_guard(&self, record: &AppointmentRecord, guard: Option<SlotGuard>, exclude: Option<Uuid>) -> Result<(), AppointmentError> {
        if let Some(guard) = guard {
            if record.status.occupies_slot()
                && self.occupied(record.appointment_date, exclude) >= guard.max_per_slot
            {
                return Err(AppointmentError::SlotFull { max: guard.max_per_slot });
            }
        }
        Ok(())
    }

    fn check_references(&self, record: &AppointmentRecord) -> Result<(), AppointmentError> {
        if !self.doctors.contains_key(&record.doctor_id) || !self.patients.contains_key(&record.patient_id) {
            return Err(AppointmentError::ReferenceNotFound("Doctor or patient does not exist".to_string()));
        }
        Ok(())
    }

    fn details(&self, appointment: &Appointment) -> AppointmentDetails {
        AppointmentDetails {
            appointment: appointment.clone(),
            doctor: self.doctors.get(&appointment.doctor_id).cloned(),
            patient: self.patients.get(&appointment.patient_id).cloned(),
        }
    }
}

/// Process-local [`AppointmentStore`]. One mutex covers the count and the
/// write, which gives guarded writes the same atomicity the database
/// functions provide. Used by tests and local runs without a database.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    tables: Mutex<Tables>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_doctor(&self, doctor: Doctor) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.doctors.insert(doctor.id, doctor);
        }
    }

    pub fn add_patient(&self, patient: Patient) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.patients.insert(patient.id, patient);
        }
    }

    /// Ids passed to `mark_notification_sent`, in call order.
    pub fn notified(&self) -> Vec<Uuid> {
        self.tables.lock().map(|t| t.notified.clone()).unwrap_or_default()
    }

    /// Appointments currently held by an unfinished reminder claim.
    pub fn claimed(&self) -> Vec<Uuid> {
        self.tables.lock().map(|t| t.claims.keys().copied().collect()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, AppointmentError> {
        self.tables
            .lock()
            .map_err(|_| AppointmentError::DatabaseError("appointment store poisoned".to_string()))
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn count_appointments(
        &self,
        slot: DateTime<Utc>,
        status_not: AppointmentStatus,
        exclude: Option<Uuid>,
    ) -> Result<i64, AppointmentError> {
        let tables = self.lock()?;
        Ok(tables.appointments
            .values()
            .filter(|a| a.appointment_date == slot)
            .filter(|a| a.status != status_not)
            .filter(|a| Some(a.id) != exclude)
            .count() as i64)
    }

    async fn find_appointments_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AppointmentDetails>, AppointmentError> {
        let tables = self.lock()?;
        let mut found: Vec<AppointmentDetails> = tables.appointments
            .values()
            .filter(|a| a.appointment_date >= start && a.appointment_date < end)
            .map(|a| tables.details(a))
            .collect();
        found.sort_by_key(|d| d.appointment.appointment_date);
        Ok(found)
    }

    async fn list_appointments(&self) -> Result<Vec<AppointmentDetails>, AppointmentError> {
        let tables = self.lock()?;
        let mut all: Vec<AppointmentDetails> = tables.appointments
            .values()
            .map(|a| tables.details(a))
            .collect();
        all.sort_by(|a, b| b.appointment.appointment_date.cmp(&a.appointment.appointment_date));
        Ok(all)
    }

    async fn get_appointment(&self, id: Uuid) -> Result<AppointmentDetails, AppointmentError> {
        let tables = self.lock()?;
        tables.appointments
            .get(&id)
            .map(|a| tables.details(a))
            .ok_or(AppointmentError::NotFound)
    }

    async fn insert_appointment(
        &self,
        record: AppointmentRecord,
        guard: Option<SlotGuard>,
    ) -> Result<Appointment, AppointmentError> {
        let mut tables = self.lock()?;
        tables.check_references(&record)?;
        tables.check_guard(&record, guard, None)?;

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: record.doctor_id,
            patient_id: record.patient_id,
            appointment_date: record.appointment_date,
            status: record.status,
            case_description: record.case_description,
            charge: record.charge,
            notification_sent: record.notification_sent,
            created_at: now,
            updated_at: now,
        };
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        record: AppointmentRecord,
        guard: Option<SlotGuard>,
    ) -> Result<Appointment, AppointmentError> {
        let mut tables = self.lock()?;
        let (held_since, was_occupying) = tables.appointments
            .get(&id)
            .map(|a| (a.appointment_date, a.status.occupies_slot()))
            .ok_or(AppointmentError::NotFound)?;
        tables.check_references(&record)?;

        let same_slot = held_since == record.appointment_date;
        if !(same_slot && was_occupying) {
            tables.check_guard(&record, guard, Some(id))?;
        }

        let appointment = tables.appointments.get_mut(&id).ok_or(AppointmentError::NotFound)?;
        appointment.doctor_id = record.doctor_id;
        appointment.patient_id = record.patient_id;
        appointment.appointment_date = record.appointment_date;
        appointment.status = record.status;
        appointment.case_description = record.case_description;
        appointment.charge = record.charge;
        appointment.notification_sent = record.notification_sent && same_slot;
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppointmentError> {
        let mut tables = self.lock()?;
        tables.appointments.remove(&id).map(|_| ()).ok_or(AppointmentError::NotFound)
    }

    async fn claim_reminder(&self, id: Uuid, now: DateTime<Utc>, lease: Duration) -> Result<bool, AppointmentError> {
        let mut tables = self.lock()?;
        let already_sent = tables.appointments
            .get(&id)
            .map(|a| a.notification_sent)
            .ok_or(AppointmentError::NotFound)?;
        if already_sent {
            return Ok(false);
        }
        if let Some(claimed_at) = tables.claims.get(&id) {
            if *claimed_at >= now - lease {
                return Ok(false);
            }
        }
        tables.claims.insert(id, now);
        Ok(true)
    }

    async fn release_reminder(&self, id: Uuid) -> Result<(), AppointmentError> {
        let mut tables = self.lock()?;
        tables.claims.remove(&id);
        Ok(())
    }

    async fn mark_notification_sent(&self, id: Uuid) -> Result<(), AppointmentError> {
        let mut tables = self.lock()?;
        let appointment = tables.appointments.get_mut(&id).ok_or(AppointmentError::NotFound)?;
        appointment.notification_sent = true;
        tables.claims.remove(&id);
        tables.notified.push(id);
        Ok(())
    }
}
