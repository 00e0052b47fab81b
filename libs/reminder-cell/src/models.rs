use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::models::AppointmentError;

/// One recipient that could not be reached after every attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedDelivery {
    pub appointment_id: Uuid,
    pub recipient: String,
    pub reason: String,
}

/// Aggregate outcome of one reminder sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepResult {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Appointments fetched for the window.
    pub scanned: usize,
    /// Messages accepted by the provider.
    pub sent: usize,
    /// Appointments passed over: already notified, claimed by an overlapping
    /// sweep, cancelled or no-show.
    pub skipped: usize,
    pub failed: Vec<FailedDelivery>,
    /// Set when shutdown interrupted the sweep before every appointment ran.
    pub cancelled: bool,
}

impl SweepResult {
    pub fn empty(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            window_start,
            window_end,
            scanned: 0,
            sent: 0,
            skipped: 0,
            failed: Vec::new(),
            cancelled: false,
        }
    }
}

/// Provider acknowledgement for a single message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub sid: String,
    pub status: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Messaging provider not configured")]
    NotConfigured,

    #[error("Provider rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),
}

impl DeliveryError {
    /// Provider 5xx and 429, timeouts and transport failures may succeed on a
    /// later attempt; other rejections will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::NotConfigured => false,
            DeliveryError::Rejected { status, .. } => *status >= 500 || *status == 429,
            DeliveryError::Transport(_) | DeliveryError::Timeout(_) => true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    #[error("Failed to load appointments: {0}")]
    Fetch(#[from] AppointmentError),
}
