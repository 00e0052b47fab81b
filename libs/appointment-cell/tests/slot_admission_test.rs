use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use futures::future::join_all;
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentDetails, AppointmentError, AppointmentRecord, AppointmentRequest,
    AppointmentStatus, SlotGuard,
};
use appointment_cell::services::admission::Admission;
use appointment_cell::services::booking::{compute_dashboard, AppointmentBookingService};
use appointment_cell::services::memory::InMemoryAppointmentStore;
use appointment_cell::services::store::AppointmentStore;
use doctor_cell::models::Doctor;
use patient_cell::models::{CaseCategory, Patient};
use shared_config::AppConfig;

struct Clinic {
    store: Arc<InMemoryAppointmentStore>,
    service: AppointmentBookingService,
    doctor_id: Uuid,
    patient_id: Uuid,
}

fn clinic() -> Clinic {
    let now = Utc::now();
    let doctor = Doctor {
        id: Uuid::new_v4(),
        name: "Dr. Mehta".to_string(),
        email: None,
        phone: "9000000001".to_string(),
        specialization: vec!["Dermatology".to_string()],
        created_at: now,
        updated_at: now,
    };
    let patient = Patient {
        id: Uuid::new_v4(),
        name: "Asha Patel".to_string(),
        age: 34,
        address: None,
        case_category: CaseCategory::Skin,
        contact_no: "9876543210".to_string(),
        email: None,
        created_at: now,
        updated_at: now,
    };

    let store = Arc::new(InMemoryAppointmentStore::new());
    let (doctor_id, patient_id) = (doctor.id, patient.id);
    store.add_doctor(doctor);
    store.add_patient(patient);

    let service = AppointmentBookingService::with_store(store.clone(), &AppConfig::default());
    Clinic { store, service, doctor_id, patient_id }
}

impl Clinic {
    fn request(&self, at: DateTime<Utc>) -> AppointmentRequest {
        AppointmentRequest {
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
            appointment_date: at,
            status: AppointmentStatus::Scheduled,
            case_description: Some("Laser session".to_string()),
            charge: Some(1500.0),
        }
    }

    async fn fill(&self, at: DateTime<Utc>, n: usize) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for _ in 0..n {
            ids.push(self.service.create_appointment(self.request(at)).await.unwrap().id);
        }
        ids
    }
}

fn slot() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 5, 20, 4, 30, 0).unwrap()
}

#[tokio::test]
async fn test_sixth_booking_in_slot_is_rejected() {
    let clinic = clinic();
    clinic.fill(slot(), 5).await;

    let result = clinic.service.create_appointment(clinic.request(slot())).await;

    assert_matches!(result, Err(AppointmentError::SlotFull { max: 5 }));
    let occupied = clinic.store
        .count_appointments(slot(), AppointmentStatus::Cancelled, None)
        .await
        .unwrap();
    assert_eq!(occupied, 5);
}

#[tokio::test]
async fn test_seconds_share_the_minute_slot() {
    let clinic = clinic();
    clinic.fill(slot(), 5).await;

    let result = clinic.service
        .create_appointment(clinic.request(slot() + Duration::seconds(20)))
        .await;

    assert_matches!(result, Err(AppointmentError::SlotFull { .. }));
}

#[tokio::test]
async fn test_other_slots_are_independent() {
    let clinic = clinic();
    clinic.fill(slot(), 5).await;

    let next_minute = clinic.service
        .create_appointment(clinic.request(slot() + Duration::minutes(1)))
        .await;

    assert!(next_minute.is_ok());
}

#[tokio::test]
async fn test_cancelling_frees_a_place() {
    let clinic = clinic();
    let ids = clinic.fill(slot(), 5).await;

    let mut cancel = clinic.request(slot());
    cancel.status = AppointmentStatus::Cancelled;
    clinic.service.update_appointment(ids[0], cancel).await.unwrap();

    let booked = clinic.service.create_appointment(clinic.request(slot())).await;
    assert!(booked.is_ok());
}

#[tokio::test]
async fn test_no_show_still_occupies_the_slot() {
    let clinic = clinic();
    let ids = clinic.fill(slot(), 5).await;

    let mut no_show = clinic.request(slot());
    no_show.status = AppointmentStatus::NoShow;
    clinic.service.update_appointment(ids[0], no_show).await.unwrap();

    let result = clinic.service.create_appointment(clinic.request(slot())).await;
    assert_matches!(result, Err(AppointmentError::SlotFull { .. }));
}

#[tokio::test]
async fn test_cancelled_booking_skips_capacity() {
    let clinic = clinic();
    clinic.fill(slot(), 5).await;

    let mut cancelled = clinic.request(slot());
    cancelled.status = AppointmentStatus::Cancelled;

    assert!(clinic.service.create_appointment(cancelled).await.is_ok());
}

#[tokio::test]
async fn test_edit_without_moving_never_rejects_in_full_slot() {
    let clinic = clinic();
    let ids = clinic.fill(slot(), 5).await;

    let mut edit = clinic.request(slot());
    edit.status = AppointmentStatus::Completed;
    edit.charge = Some(2500.0);

    let updated = clinic.service.update_appointment(ids[2], edit).await.unwrap();
    assert_eq!(updated.status, AppointmentStatus::Completed);
    assert_eq!(updated.charge, Some(2500.0));
}

#[tokio::test]
async fn test_move_into_full_slot_is_rejected() {
    let clinic = clinic();
    clinic.fill(slot(), 5).await;
    let later = slot() + Duration::hours(2);
    let mover = clinic.fill(later, 1).await[0];

    let result = clinic.service.update_appointment(mover, clinic.request(slot())).await;

    assert_matches!(result, Err(AppointmentError::SlotFull { max: 5 }));
    let unchanged = clinic.service.get_appointment(mover).await.unwrap();
    assert_eq!(unchanged.appointment.appointment_date, later);
}

#[tokio::test]
async fn test_move_excludes_itself_from_target_count() {
    let clinic = clinic();
    let target = slot() + Duration::hours(1);
    clinic.fill(target, 4).await;
    let mover = clinic.fill(slot(), 1).await[0];

    let moved = clinic.service.update_appointment(mover, clinic.request(target)).await.unwrap();
    assert_eq!(moved.appointment_date, target);

    let result = clinic.service.create_appointment(clinic.request(target)).await;
    assert_matches!(result, Err(AppointmentError::SlotFull { .. }));
}

#[tokio::test]
async fn test_reactivating_into_full_slot_is_rejected() {
    let clinic = clinic();
    let ids = clinic.fill(slot(), 5).await;

    let mut cancel = clinic.request(slot());
    cancel.status = AppointmentStatus::Cancelled;
    clinic.service.update_appointment(ids[0], cancel).await.unwrap();
    clinic.fill(slot(), 1).await;

    let result = clinic.service.update_appointment(ids[0], clinic.request(slot())).await;
    assert_matches!(result, Err(AppointmentError::SlotFull { .. }));
}

/// Lets a cancellation and a new booking land between an edit's read of
/// `target` and its write.
struct InterleavingStore {
    inner: Arc<InMemoryAppointmentStore>,
    target: Uuid,
    cancel: AppointmentRecord,
    newcomer: AppointmentRecord,
    fired: AtomicBool,
}

#[async_trait]
impl AppointmentStore for InterleavingStore {
    async fn count_appointments(&self, slot: DateTime<Utc>, status_not: AppointmentStatus, exclude: Option<Uuid>) -> Result<i64, AppointmentError> {
        self.inner.count_appointments(slot, status_not, exclude).await
    }

    async fn find_appointments_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AppointmentDetails>, AppointmentError> {
        self.inner.find_appointments_in_range(start, end).await
    }

    async fn list_appointments(&self) -> Result<Vec<AppointmentDetails>, AppointmentError> {
        self.inner.list_appointments().await
    }

    async fn get_appointment(&self, id: Uuid) -> Result<AppointmentDetails, AppointmentError> {
        let snapshot = self.inner.get_appointment(id).await?;
        if id == self.target && !self.fired.swap(true, Ordering::SeqCst) {
            self.inner.update_appointment(id, self.cancel.clone(), None).await?;
            self.inner
                .insert_appointment(self.newcomer.clone(), Some(SlotGuard { max_per_slot: 5 }))
                .await?;
        }
        Ok(snapshot)
    }

    async fn insert_appointment(&self, record: AppointmentRecord, guard: Option<SlotGuard>) -> Result<Appointment, AppointmentError> {
        self.inner.insert_appointment(record, guard).await
    }

    async fn update_appointment(&self, id: Uuid, record: AppointmentRecord, guard: Option<SlotGuard>) -> Result<Appointment, AppointmentError> {
        self.inner.update_appointment(id, record, guard).await
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppointmentError> {
        self.inner.delete_appointment(id).await
    }

    async fn claim_reminder(&self, id: Uuid, now: DateTime<Utc>, lease: Duration) -> Result<bool, AppointmentError> {
        self.inner.claim_reminder(id, now, lease).await
    }

    async fn release_reminder(&self, id: Uuid) -> Result<(), AppointmentError> {
        self.inner.release_reminder(id).await
    }

    async fn mark_notification_sent(&self, id: Uuid) -> Result<(), AppointmentError> {
        self.inner.mark_notification_sent(id).await
    }
}

fn record_at(clinic: &Clinic, at: DateTime<Utc>, status: AppointmentStatus) -> AppointmentRecord {
    AppointmentRecord {
        doctor_id: clinic.doctor_id,
        patient_id: clinic.patient_id,
        appointment_date: at,
        status,
        case_description: None,
        charge: None,
        notification_sent: false,
    }
}

#[tokio::test]
async fn test_same_slot_edit_cannot_reclaim_a_place_lost_meanwhile() {
    let clinic = clinic();
    let ids = clinic.fill(slot(), 5).await;

    let racing = Arc::new(InterleavingStore {
        inner: clinic.store.clone(),
        target: ids[0],
        cancel: record_at(&clinic, slot(), AppointmentStatus::Cancelled),
        newcomer: record_at(&clinic, slot(), AppointmentStatus::Scheduled),
        fired: AtomicBool::new(false),
    });
    let service = AppointmentBookingService::with_store(racing, &AppConfig::default());

    let mut edit = clinic.request(slot());
    edit.case_description = Some("Updated notes".to_string());
    let result = service.update_appointment(ids[0], edit).await;

    assert_matches!(result, Err(AppointmentError::SlotFull { max: 5 }));
    let occupied = clinic.store
        .count_appointments(slot(), AppointmentStatus::Cancelled, None)
        .await
        .unwrap();
    assert_eq!(occupied, 5);
    let stays_cancelled = clinic.store.get_appointment(ids[0]).await.unwrap();
    assert_eq!(stays_cancelled.appointment.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn test_moving_clears_reminder_flag() {
    let clinic = clinic();
    let id = clinic.fill(slot(), 1).await[0];
    clinic.store.mark_notification_sent(id).await.unwrap();

    let mut same_slot = clinic.request(slot());
    same_slot.case_description = Some("Updated notes".to_string());
    let kept = clinic.service.update_appointment(id, same_slot).await.unwrap();
    assert!(kept.notification_sent);

    let moved = clinic.service
        .update_appointment(id, clinic.request(slot() + Duration::days(1)))
        .await
        .unwrap();
    assert!(!moved.notification_sent);
}

#[tokio::test]
async fn test_concurrent_bookings_never_overfill() {
    let clinic = clinic();

    let attempts = (0..12).map(|_| clinic.service.create_appointment(clinic.request(slot())));
    let results = join_all(attempts).await;

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(AppointmentError::SlotFull { .. })))
        .count();
    assert_eq!(admitted, 5);
    assert_eq!(rejected, 7);
}

#[tokio::test]
async fn test_unknown_patient_is_not_found() {
    let clinic = clinic();
    let mut request = clinic.request(slot());
    request.patient_id = Uuid::new_v4();

    let result = clinic.service.create_appointment(request).await;
    assert_matches!(result, Err(AppointmentError::ReferenceNotFound(_)));
}

#[tokio::test]
async fn test_check_slot_reports_occupancy() {
    let clinic = clinic();
    clinic.fill(slot(), 3).await;

    let admission = clinic.service.check_slot(slot(), None).await.unwrap();
    assert_eq!(admission, Admission::Allowed { occupied: 3 });

    clinic.fill(slot(), 2).await;
    let admission = clinic.service.check_slot(slot(), None).await.unwrap();
    assert_eq!(admission, Admission::Rejected { occupied: 5, max: 5 });
}

#[tokio::test]
async fn test_dashboard_stats() {
    let clinic = clinic();
    let ist = FixedOffset::east_opt(330 * 60).unwrap();
    // 09:00 IST on 20 May 2030
    let now = Utc.with_ymd_and_hms(2030, 5, 20, 3, 30, 0).unwrap();

    let today_later = clinic.fill(now + Duration::hours(2), 2).await;
    clinic.fill(now + Duration::days(2), 1).await;
    let done = clinic.fill(now - Duration::hours(1), 2).await;

    for id in &done {
        let mut completed = clinic.request(now - Duration::hours(1));
        completed.status = AppointmentStatus::Completed;
        completed.charge = Some(1200.0);
        clinic.service.update_appointment(*id, completed).await.unwrap();
    }
    clinic.store.mark_notification_sent(today_later[0]).await.unwrap();

    let all = clinic.service.list_appointments().await.unwrap();
    let stats = compute_dashboard(&all, now, ist);

    assert_eq!(stats.today_scheduled, 2);
    assert_eq!(stats.upcoming.len(), 3);
    assert!(stats.upcoming[0].appointment.appointment_date <= stats.upcoming[2].appointment.appointment_date);
    assert_eq!(stats.total_revenue, 2400.0);
    assert_eq!(stats.pending_notifications, 2);
}
