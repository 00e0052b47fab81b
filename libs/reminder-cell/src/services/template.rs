use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

use shared_config::ReminderWindow;

use appointment_cell::models::AppointmentDetails;

const MISSING: &str = "N/A";

/// Renders the reminder text for one appointment. Times are shown in the
/// clinic's local offset.
pub fn render_reminder(details: &AppointmentDetails, clinic_name: &str, offset: FixedOffset) -> String {
    let local = details.appointment.appointment_date.with_timezone(&offset);
    let category = details.patient.as_ref().map(|p| p.case_category.label());

    format!(
        "*{clinic}*\n\
         \n\
         *Appointment Reminder:*\n\
         Doctor: {doctor}\n\
         Patient: {patient}\n\
         Contact No: {contact}\n\
         Case Category: {category}\n\
         Date: *{date}*\n\
         Case Description: {description}\n\
         \n\
         Please arrive 10 minutes early.",
        clinic = clinic_name,
        doctor = details.doctor_name().unwrap_or(MISSING),
        patient = details.patient_name().unwrap_or(MISSING),
        contact = details.contact_no().unwrap_or(MISSING),
        category = category.unwrap_or(MISSING),
        date = local.format("%d %b %Y, %I:%M %p"),
        description = details.appointment.case_description.as_deref().unwrap_or(MISSING),
    )
}

/// Normalises a stored phone number to E.164. A leading `+` is kept as is;
/// anything else is stripped to digits and given `country_code`.
pub fn normalize_number(raw: &str, country_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if trimmed.starts_with('+') {
        return Some(format!("+{}", digits));
    }

    let digits = digits.trim_start_matches('0');
    let code = country_code.trim().trim_start_matches('+');
    Some(format!("+{}{}", code, digits))
}

/// `[start, end)` of the appointments a sweep at `now` covers.
pub fn sweep_window(
    now: DateTime<Utc>,
    policy: ReminderWindow,
    offset: FixedOffset,
) -> (DateTime<Utc>, DateTime<Utc>) {
    match policy {
        ReminderWindow::Rolling24h => (now, now + Duration::hours(24)),
        ReminderWindow::CalendarDay => {
            let start = now
                .with_timezone(&offset)
                .date_naive()
                .and_time(NaiveTime::MIN)
                .and_local_timezone(offset)
                .single()
                .map(|local| local.with_timezone(&Utc))
                .unwrap_or(now);
            (start, start + Duration::days(1))
        }
    }
}
