use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use appointment_cell::models::AppointmentDetails;
use appointment_cell::services::store::{AppointmentStore, SupabaseAppointmentStore};
use shared_config::{AppConfig, RecipientPolicy, ReminderWindow};

use crate::models::{DeliveryError, DeliveryReceipt, FailedDelivery, ReminderError, SweepResult};
use crate::services::sender::{NotificationSender, TwilioSender};
use crate::services::template::{normalize_number, render_reminder, sweep_window};

const CLAIM_LEASE_MINUTES: i64 = 15;

/// Knobs for one sweep, resolved from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub window: ReminderWindow,
    pub recipients: RecipientPolicy,
    pub operator_numbers: Vec<String>,
    pub country_code: String,
    pub clinic_name: String,
    pub clinic_offset: FixedOffset,
    pub send_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub concurrency: usize,
    /// How long a claim keeps other sweeps off an appointment.
    pub claim_lease: chrono::Duration,
}

impl SweepSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            window: config.reminder_window,
            recipients: config.reminder_recipients,
            operator_numbers: config.reminder_operator_numbers.clone(),
            country_code: config.default_country_code.clone(),
            clinic_name: config.clinic_name.clone(),
            clinic_offset: FixedOffset::east_opt(config.clinic_utc_offset_minutes * 60)
                .unwrap_or_else(|| Utc.fix()),
            send_timeout: Duration::from_secs(config.reminder_send_timeout_secs),
            max_retries: config.reminder_max_retries,
            retry_delay: Duration::from_millis(config.reminder_retry_delay_ms),
            concurrency: config.reminder_concurrency.max(1),
            claim_lease: chrono::Duration::minutes(CLAIM_LEASE_MINUTES),
        }
    }
}

enum Outcome {
    Processed { sent: usize, failed: Vec<FailedDelivery> },
    ClaimedElsewhere,
    NotStarted,
}

/// Finds the appointments due a reminder and dispatches them. Delivery
/// failures are collected per recipient; only a failed fetch fails the sweep.
pub struct ReminderService {
    store: Arc<dyn AppointmentStore>,
    sender: Arc<dyn NotificationSender>,
    settings: SweepSettings,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ReminderService {
    /// Database access runs with the service key, no user session.
    pub fn new(config: &AppConfig) -> Self {
        Self::with_parts(
            Arc::new(SupabaseAppointmentStore::new(config, None)),
            Arc::new(TwilioSender::new(config)),
            SweepSettings::from_config(config),
        )
    }

    pub fn with_parts(
        store: Arc<dyn AppointmentStore>,
        sender: Arc<dyn NotificationSender>,
        settings: SweepSettings,
    ) -> Self {
        Self { store, sender, settings, shutdown: None }
    }

    /// Appointments not yet started when the flag flips to `true` are left alone.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    #[instrument(skip(self))]
    pub async fn run_reminder_sweep(&self, now: DateTime<Utc>) -> Result<SweepResult, ReminderError> {
        let (window_start, window_end) = sweep_window(now, self.settings.window, self.settings.clinic_offset);
        let mut result = SweepResult::empty(window_start, window_end);

        let appointments = self.store
            .find_appointments_in_range(window_start, window_end)
            .await
            .map_err(|e| {
                error!("Reminder sweep could not load appointments: {}", e);
                ReminderError::Fetch(e)
            })?;

        result.scanned = appointments.len();
        if appointments.is_empty() {
            info!("No appointments between {} and {}", window_start, window_end);
            return Ok(result);
        }

        let (due, passed): (Vec<_>, Vec<_>) = appointments
            .into_iter()
            .partition(|d| d.appointment.status.is_remindable() && !d.appointment.notification_sent);
        result.skipped = passed.len();
        debug!("{} appointments due a reminder, {} skipped", due.len(), result.skipped);

        let outcomes: Vec<Outcome> = stream::iter(due)
            .map(|details| self.remind(details, now))
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Processed { sent, failed } => {
                    result.sent += sent;
                    result.failed.extend(failed);
                }
                Outcome::ClaimedElsewhere => result.skipped += 1,
                Outcome::NotStarted => result.cancelled = true,
            }
        }

        info!(
            "Reminder sweep done: scanned={} sent={} skipped={} failed={} cancelled={}",
            result.scanned, result.sent, result.skipped, result.failed.len(), result.cancelled
        );
        Ok(result)
    }

    async fn remind(&self, details: AppointmentDetails, now: DateTime<Utc>) -> Outcome {
        if self.is_shutting_down() {
            return Outcome::NotStarted;
        }

        let appointment_id = details.id();
        let recipients = self.recipients_for(&details);
        if recipients.is_empty() {
            warn!("Appointment {} has no deliverable number", appointment_id);
            return Outcome::Processed {
                sent: 0,
                failed: vec![FailedDelivery {
                    appointment_id,
                    recipient: details.contact_no().unwrap_or_default().to_string(),
                    reason: "no valid recipient number".to_string(),
                }],
            };
        }

        match self.store.claim_reminder(appointment_id, now, self.settings.claim_lease).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Reminder for {} is held by another sweep", appointment_id);
                return Outcome::ClaimedElsewhere;
            }
            Err(e) => {
                warn!("Could not claim reminder for {}: {}", appointment_id, e);
                return Outcome::Processed {
                    sent: 0,
                    failed: vec![FailedDelivery {
                        appointment_id,
                        recipient: details.contact_no().unwrap_or_default().to_string(),
                        reason: format!("could not claim reminder: {}", e),
                    }],
                };
            }
        }

        let message = render_reminder(&details, &self.settings.clinic_name, self.settings.clinic_offset);
        let mut sent = 0;
        let mut failed = Vec::new();

        for recipient in recipients {
            match self.deliver(&recipient, &message).await {
                Ok(receipt) => {
                    info!("Reminder for {} sent to {} ({})", appointment_id, recipient, receipt.sid);
                    sent += 1;
                }
                Err(e) => {
                    warn!("Reminder for {} to {} failed: {}", appointment_id, recipient, e);
                    failed.push(FailedDelivery {
                        appointment_id,
                        recipient,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if sent > 0 {
            if let Err(e) = self.store.mark_notification_sent(appointment_id).await {
                error!("Could not mark appointment {} as notified: {}", appointment_id, e);
            }
        } else if let Err(e) = self.store.release_reminder(appointment_id).await {
            error!("Could not release reminder claim on {}: {}", appointment_id, e);
        }

        Outcome::Processed { sent, failed }
    }

    async fn deliver(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let attempts = self.settings.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match timeout(self.settings.send_timeout, self.sender.send(to, body)).await {
                Ok(Ok(receipt)) => return Ok(receipt),
                Ok(Err(e)) => e,
                Err(_) => DeliveryError::Timeout(self.settings.send_timeout.as_secs()),
            };

            if attempt >= attempts || !err.is_retryable() {
                return Err(err);
            }

            warn!("Delivery to {} failed (attempt {}/{}): {}, retrying", to, attempt, attempts, err);
            sleep(self.settings.retry_delay * attempt).await;
        }
    }

    /// Normalised, de-duplicated numbers for `details` under the configured policy.
    pub fn recipients_for(&self, details: &AppointmentDetails) -> Vec<String> {
        let patient = details.contact_no().into_iter().map(str::to_string);
        let operators = self.settings.operator_numbers.iter().cloned();

        let raw: Vec<String> = match self.settings.recipients {
            RecipientPolicy::Patient => patient.collect(),
            RecipientPolicy::Operators => operators.collect(),
            RecipientPolicy::PatientAndOperators => patient.chain(operators).collect(),
        };

        let mut numbers: Vec<String> = Vec::new();
        for number in raw.iter().filter_map(|n| normalize_number(n, &self.settings.country_code)) {
            if !numbers.contains(&number) {
                numbers.push(number);
            }
        }
        numbers
    }
}
