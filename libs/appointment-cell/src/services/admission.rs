use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentRecord, AppointmentStatus, SlotGuard};
use crate::services::store::AppointmentStore;

pub const DEFAULT_MAX_PATIENTS_PER_SLOT: i64 = 5;

/// Slots are whole minutes; seconds and sub-seconds are dropped.
pub fn normalize_slot(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Outcome of asking whether one more appointment fits in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Admission {
    Allowed { occupied: i64 },
    Rejected { occupied: i64, max: i64 },
}

impl Admission {
    pub fn decide(occupied: i64, max: i64) -> Self {
        if occupied >= max {
            Admission::Rejected { occupied, max }
        } else {
            Admission::Allowed { occupied }
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }

    pub fn into_result(self) -> Result<(), AppointmentError> {
        match self {
            Admission::Allowed { .. } => Ok(()),
            Admission::Rejected { max, .. } => Err(AppointmentError::SlotFull { max }),
        }
    }
}

/// Caps how many non-cancelled appointments may share one exact timestamp.
///
/// The count here is advisory: the store re-applies the same bound inside the
/// write (see [`SlotGuard`]) so two concurrent bookings cannot both take the
/// last place.
#[derive(Clone)]
pub struct SlotAdmissionController {
    store: Arc<dyn AppointmentStore>,
    max_per_slot: i64,
}

impl SlotAdmissionController {
    pub fn new(store: Arc<dyn AppointmentStore>, max_per_slot: i64) -> Self {
        Self { store, max_per_slot }
    }

    pub fn max_per_slot(&self) -> i64 {
        self.max_per_slot
    }

    pub fn guard(&self) -> SlotGuard {
        SlotGuard { max_per_slot: self.max_per_slot }
    }

    /// Counts the non-cancelled appointments at `proposed` (minus `exclude`,
    /// when an existing appointment is being moved) and decides.
    pub async fn can_admit(
        &self,
        proposed: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Admission, AppointmentError> {
        let slot = normalize_slot(proposed);
        let occupied = self.store
            .count_appointments(slot, AppointmentStatus::Cancelled, exclude)
            .await?;

        let admission = Admission::decide(occupied, self.max_per_slot);
        debug!("Slot {} holds {} of {}: {:?}", slot, occupied, self.max_per_slot, admission);
        Ok(admission)
    }

    /// An update only needs a capacity check when it starts occupying a slot
    /// it did not hold before: a new timestamp, or a cancelled appointment
    /// coming back.
    pub fn needs_recheck(current: &Appointment, next: &AppointmentRecord) -> bool {
        if !next.status.occupies_slot() {
            return false;
        }
        normalize_slot(current.appointment_date) != next.appointment_date
            || !current.status.occupies_slot()
    }
}
