use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use tokio::sync::watch;
use tracing::{error, info};

use crate::services::sweep::ReminderService;

/// Next instant strictly after `now` at `hour:00` in `offset` local time.
pub fn next_run_after(now: DateTime<Utc>, hour: u32, offset: FixedOffset) -> DateTime<Utc> {
    let local = now.with_timezone(&offset);
    let today_at = local
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .and_then(|naive| naive.and_local_timezone(offset).single());

    match today_at {
        Some(at) if at > local => at.with_timezone(&Utc),
        Some(at) => (at + Duration::days(1)).with_timezone(&Utc),
        None => now + Duration::days(1),
    }
}

/// Runs one sweep per day at `hour:00` clinic time until `shutdown` flips to
/// `true` or its sender is dropped. Sweep failures are logged and the loop
/// carries on.
pub async fn run_daily(
    service: Arc<ReminderService>,
    hour: u32,
    offset: FixedOffset,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Reminder scheduler started, daily at {:02}:00 (UTC{})", hour, offset);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = Utc::now();
        let next = next_run_after(now, hour, offset);
        let wait = (next - now).to_std().unwrap_or_default();
        info!("Next reminder sweep at {}", next);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        match service.run_reminder_sweep(Utc::now()).await {
            Ok(result) => info!(
                "Scheduled sweep: sent {} of {} scanned, {} failed",
                result.sent,
                result.scanned,
                result.failed.len()
            ),
            Err(e) => error!("Scheduled reminder sweep failed: {}", e),
        }
    }

    info!("Reminder scheduler stopped");
}
