use std::env;
use std::str::FromStr;
use tracing::warn;

/// Which appointments a reminder sweep looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderWindow {
    /// `[now, now + 24h)`
    Rolling24h,
    /// Local midnight today up to local midnight tomorrow.
    CalendarDay,
}

impl FromStr for ReminderWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rolling_24h" | "rolling" => Ok(ReminderWindow::Rolling24h),
            "calendar_day" | "today" => Ok(ReminderWindow::CalendarDay),
            other => Err(format!("unknown reminder window '{}'", other)),
        }
    }
}

/// Who receives a reminder for an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientPolicy {
    Patient,
    Operators,
    PatientAndOperators,
}

impl FromStr for RecipientPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(RecipientPolicy::Patient),
            "operators" => Ok(RecipientPolicy::Operators),
            "patient_and_operators" | "both" => Ok(RecipientPolicy::PatientAndOperators),
            other => Err(format!("unknown recipient policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagingChannel {
    WhatsApp,
    Sms,
}

impl FromStr for MessagingChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whatsapp" => Ok(MessagingChannel::WhatsApp),
            "sms" => Ok(MessagingChannel::Sms),
            other => Err(format!("unknown messaging channel '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub max_patients_per_slot: i64,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_from_number: String,
    pub twilio_base_url: String,
    pub messaging_channel: MessagingChannel,
    pub default_country_code: String,
    pub clinic_name: String,
    pub clinic_utc_offset_minutes: i32,
    pub reminder_window: ReminderWindow,
    pub reminder_recipients: RecipientPolicy,
    pub reminder_operator_numbers: Vec<String>,
    pub reminder_daily_hour: u32,
    pub reminder_scheduler_enabled: bool,
    pub reminder_send_timeout_secs: u64,
    pub reminder_max_retries: u32,
    pub reminder_retry_delay_ms: u64,
    pub reminder_concurrency: usize,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            max_patients_per_slot: 5,
            twilio_account_sid: String::new(),
            twilio_auth_token: String::new(),
            twilio_from_number: String::new(),
            twilio_base_url: "https://api.twilio.com".to_string(),
            messaging_channel: MessagingChannel::WhatsApp,
            default_country_code: "+91".to_string(),
            clinic_name: "Aum Skin Hair Laser Clinic".to_string(),
            clinic_utc_offset_minutes: 330,
            reminder_window: ReminderWindow::Rolling24h,
            reminder_recipients: RecipientPolicy::Patient,
            reminder_operator_numbers: Vec::new(),
            reminder_daily_hour: 8,
            reminder_scheduler_enabled: true,
            reminder_send_timeout_secs: 10,
            reminder_max_retries: 2,
            reminder_retry_delay_ms: 500,
            reminder_concurrency: 4,
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            max_patients_per_slot: parsed_or("MAX_PATIENTS_PER_SLOT", defaults.max_patients_per_slot),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID")
                .unwrap_or_else(|_| {
                    warn!("TWILIO_ACCOUNT_SID not set, using empty value");
                    String::new()
                }),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("TWILIO_AUTH_TOKEN not set, using empty value");
                    String::new()
                }),
            twilio_from_number: env::var("TWILIO_FROM_NUMBER")
                .unwrap_or_else(|_| {
                    warn!("TWILIO_FROM_NUMBER not set, using empty value");
                    String::new()
                }),
            twilio_base_url: env::var("TWILIO_BASE_URL")
                .unwrap_or_else(|_| defaults.twilio_base_url.clone()),
            messaging_channel: parsed_or("MESSAGING_CHANNEL", defaults.messaging_channel),
            default_country_code: env::var("DEFAULT_COUNTRY_CODE")
                .unwrap_or_else(|_| {
                    warn!("DEFAULT_COUNTRY_CODE not set, using default");
                    defaults.default_country_code.clone()
                }),
            clinic_name: env::var("CLINIC_NAME")
                .unwrap_or_else(|_| defaults.clinic_name.clone()),
            clinic_utc_offset_minutes: parsed_or("CLINIC_UTC_OFFSET_MINUTES", defaults.clinic_utc_offset_minutes),
            reminder_window: parsed_or("REMINDER_WINDOW", defaults.reminder_window),
            reminder_recipients: parsed_or("REMINDER_RECIPIENTS", defaults.reminder_recipients),
            reminder_operator_numbers: env::var("REMINDER_OPERATOR_NUMBERS")
                .map(|raw| parse_number_list(&raw))
                .unwrap_or_default(),
            reminder_daily_hour: parsed_or("REMINDER_DAILY_HOUR", defaults.reminder_daily_hour),
            reminder_scheduler_enabled: parsed_or("REMINDER_SCHEDULER_ENABLED", defaults.reminder_scheduler_enabled),
            reminder_send_timeout_secs: parsed_or("REMINDER_SEND_TIMEOUT_SECS", defaults.reminder_send_timeout_secs),
            reminder_max_retries: parsed_or("REMINDER_MAX_RETRIES", defaults.reminder_max_retries),
            reminder_retry_delay_ms: parsed_or("REMINDER_RETRY_DELAY_MS", defaults.reminder_retry_delay_ms),
            reminder_concurrency: parsed_or("REMINDER_CONCURRENCY", defaults.reminder_concurrency),
            port: parsed_or("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        if !config.is_messaging_configured() {
            warn!("Messaging provider not configured - reminders will fail to deliver");
        }

        if config.reminder_daily_hour > 23 {
            warn!("REMINDER_DAILY_HOUR {} out of range, using default", config.reminder_daily_hour);
            return Self { reminder_daily_hour: defaults.reminder_daily_hour, ..config };
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_messaging_configured(&self) -> bool {
        !self.twilio_account_sid.is_empty()
            && !self.twilio_auth_token.is_empty()
            && !self.twilio_from_number.is_empty()
    }
}

fn parsed_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {:?}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Splits a comma separated list of phone numbers, dropping blanks.
pub fn parse_number_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.max_patients_per_slot, 5);
        assert_eq!(config.default_country_code, "+91");
        assert_eq!(config.reminder_window, ReminderWindow::Rolling24h);
        assert_eq!(config.reminder_recipients, RecipientPolicy::Patient);
        assert!(!config.is_configured());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("calendar_day".parse::<ReminderWindow>(), Ok(ReminderWindow::CalendarDay));
        assert_eq!("Rolling_24h".parse::<ReminderWindow>(), Ok(ReminderWindow::Rolling24h));
        assert!("weekly".parse::<ReminderWindow>().is_err());

        assert_eq!("both".parse::<RecipientPolicy>(), Ok(RecipientPolicy::PatientAndOperators));
        assert_eq!("operators".parse::<RecipientPolicy>(), Ok(RecipientPolicy::Operators));
        assert_eq!("SMS".parse::<MessagingChannel>(), Ok(MessagingChannel::Sms));
    }

    #[test]
    fn test_number_list() {
        assert_eq!(
            parse_number_list(" 9979872572, ,9624517000 "),
            vec!["9979872572".to_string(), "9624517000".to_string()]
        );
        assert!(parse_number_list("").is_empty());
    }
}
