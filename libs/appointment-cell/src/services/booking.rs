use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_utils::validation;

use crate::models::{
    Appointment, AppointmentDetails, AppointmentError, AppointmentRecord,
    AppointmentRequest, AppointmentStatus, DashboardStats,
};
use crate::services::admission::{normalize_slot, Admission, SlotAdmissionController};
use crate::services::store::{AppointmentStore, SupabaseAppointmentStore};

const UPCOMING_LIMIT: usize = 5;

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    admission: SlotAdmissionController,
    clinic_offset: FixedOffset,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        let store: Arc<dyn AppointmentStore> =
            Arc::new(SupabaseAppointmentStore::new(config, Some(auth_token)));
        Self::with_store(store, config)
    }

    pub fn with_store(store: Arc<dyn AppointmentStore>, config: &AppConfig) -> Self {
        let admission = SlotAdmissionController::new(Arc::clone(&store), config.max_patients_per_slot);
        let clinic_offset = FixedOffset::east_opt(config.clinic_utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());

        Self { store, admission, clinic_offset }
    }

    fn record_from(request: AppointmentRequest, notification_sent: bool) -> AppointmentRecord {
        AppointmentRecord {
            doctor_id: request.doctor_id,
            patient_id: request.patient_id,
            appointment_date: normalize_slot(request.appointment_date),
            status: request.status,
            case_description: validation::non_blank(request.case_description),
            charge: request.charge,
            notification_sent,
        }
    }

    async fn admit(&self, slot: DateTime<Utc>, exclude: Option<Uuid>) -> Result<(), AppointmentError> {
        let admission = self.admission.can_admit(slot, exclude).await?;
        if let Admission::Rejected { occupied, max } = admission {
            warn!("Slot {} is full ({} of {}), rejecting", slot, occupied, max);
        }
        admission.into_result()
    }

    pub async fn create_appointment(&self, request: AppointmentRequest) -> Result<Appointment, AppointmentError> {
        request.validate()?;
        let record = Self::record_from(request, false);
        debug!("Booking appointment at {} with doctor {}", record.appointment_date, record.doctor_id);

        let guard = if record.status.occupies_slot() {
            self.admit(record.appointment_date, None).await?;
            Some(self.admission.guard())
        } else {
            None
        };

        let appointment = self.store.insert_appointment(record, guard).await?;
        info!("Appointment {} booked for {}", appointment.id, appointment.appointment_date);
        Ok(appointment)
    }

    /// Replaces the appointment's fields. The early capacity check runs only
    /// when the appointment starts occupying a slot it did not already hold;
    /// the write itself is guarded whenever the result occupies a slot, and
    /// the store decides against the live row. Moving to a new time also
    /// clears the reminder flag.
    pub async fn update_appointment(
        &self,
        id: Uuid,
        request: AppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        request.validate()?;
        let current = self.store.get_appointment(id).await?.appointment;

        let moved = normalize_slot(current.appointment_date) != normalize_slot(request.appointment_date);
        let notification_sent = current.notification_sent && !moved;
        let record = Self::record_from(request, notification_sent);

        let guard = if record.status.occupies_slot() {
            if SlotAdmissionController::needs_recheck(&current, &record) {
                debug!("Appointment {} moving into slot {}, re-checking capacity", id, record.appointment_date);
                self.admit(record.appointment_date, Some(id)).await?;
            }
            Some(self.admission.guard())
        } else {
            None
        };

        let appointment = self.store.update_appointment(id, record, guard).await?;
        info!("Appointment {} updated", id);
        Ok(appointment)
    }

    /// Capacity at `slot` without writing anything.
    pub async fn check_slot(&self, slot: DateTime<Utc>, exclude: Option<Uuid>) -> Result<Admission, AppointmentError> {
        self.admission.can_admit(slot, exclude).await
    }

    pub async fn delete_appointment(&self, id: Uuid) -> Result<(), AppointmentError> {
        self.store.delete_appointment(id).await?;
        info!("Appointment {} deleted", id);
        Ok(())
    }

    pub async fn get_appointment(&self, id: Uuid) -> Result<AppointmentDetails, AppointmentError> {
        self.store.get_appointment(id).await
    }

    pub async fn list_appointments(&self) -> Result<Vec<AppointmentDetails>, AppointmentError> {
        self.store.list_appointments().await
    }

    pub async fn dashboard_stats(&self, now: DateTime<Utc>) -> Result<DashboardStats, AppointmentError> {
        let appointments = self.store.list_appointments().await?;
        Ok(compute_dashboard(&appointments, now, self.clinic_offset))
    }
}

/// Local-day counts use the clinic's UTC offset.
pub fn compute_dashboard(
    appointments: &[AppointmentDetails],
    now: DateTime<Utc>,
    clinic_offset: FixedOffset,
) -> DashboardStats {
    let today = now.with_timezone(&clinic_offset).date_naive();
    let day_start = today
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(clinic_offset).single())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or(now);
    let day_end = day_start + Duration::days(1);

    let scheduled = |d: &&AppointmentDetails| d.appointment.status == AppointmentStatus::Scheduled;

    let today_scheduled = appointments
        .iter()
        .filter(scheduled)
        .filter(|d| d.appointment.appointment_date >= day_start && d.appointment.appointment_date < day_end)
        .count();

    let mut upcoming: Vec<AppointmentDetails> = appointments
        .iter()
        .filter(scheduled)
        .filter(|d| d.appointment.appointment_date >= now)
        .cloned()
        .collect();
    upcoming.sort_by_key(|d| d.appointment.appointment_date);
    upcoming.truncate(UPCOMING_LIMIT);

    let total_revenue = appointments
        .iter()
        .filter(|d| d.appointment.status == AppointmentStatus::Completed)
        .filter_map(|d| d.appointment.charge)
        .sum();

    let pending_notifications = appointments
        .iter()
        .filter(scheduled)
        .filter(|d| !d.appointment.notification_sent)
        .count();

    DashboardStats {
        today_scheduled,
        upcoming,
        total_revenue,
        pending_notifications,
    }
}
