use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-jwt-validation-must-be-long-enough";

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub twilio_base_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            twilio_base_url: "http://localhost:54322".to_string(),
        }
    }
}

impl TestConfig {
    /// Points both the database and the messaging provider at the same mock server.
    pub fn with_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            twilio_base_url: uri.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            twilio_account_sid: "ACtest".to_string(),
            twilio_auth_token: "twilio-test-token".to_string(),
            twilio_from_number: "+14155238886".to_string(),
            twilio_base_url: self.twilio_base_url.clone(),
            reminder_retry_delay_ms: 0,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Identity baked into signed test tokens.
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::with_role("reception@clinic.test", "staff")
    }
}

impl TestUser {
    pub fn with_role(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn admin(email: &str) -> Self {
        Self::with_role(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

/// HS256 tokens shaped like the ones Supabase Auth issues.
pub struct JwtTestUtils;

impl JwtTestUtils {
    /// `ttl_hours` may be negative to mint an already expired token.
    pub fn create_test_token(user: &TestUser, secret: &str, ttl_hours: Option<i64>) -> String {
        let issued = Utc::now();
        let claims = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": issued.timestamp(),
            "exp": (issued + Duration::hours(ttl_hours.unwrap_or(24))).timestamp()
        });

        let encode = |value: &Value| general_purpose::URL_SAFE_NO_PAD.encode(value.to_string());
        let unsigned = format!("{}.{}", encode(&json!({ "alg": "HS256", "typ": "JWT" })), encode(&claims));

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(unsigned.as_bytes());
        let signature = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", unsigned, signature)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    /// Signed with a key the server does not know.
    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "not-the-clinic-secret", None)
    }

    pub fn create_malformed_token() -> String {
        "not-a.jwt".to_string()
    }

    /// `Authorization` header value accepted by routers built from [`TestConfig`].
    pub fn bearer_for(user: &TestUser) -> String {
        format!("Bearer {}", Self::create_test_token(user, TEST_JWT_SECRET, None))
    }
}

/// PostgREST-shaped rows for the clinic tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_response(doctor_id: &str, name: &str, phone: &str) -> Value {
        json!({
            "id": doctor_id,
            "name": name,
            "email": null,
            "phone": phone,
            "specialization": ["Dermatology"],
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn patient_response(patient_id: &str, name: &str, contact_no: &str) -> Value {
        json!({
            "id": patient_id,
            "name": name,
            "age": 34,
            "address": null,
            "case_category": "HAIR",
            "contact_no": contact_no,
            "email": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(
        appointment_id: &str,
        doctor_id: &str,
        patient_id: &str,
        appointment_date: DateTime<Utc>,
        status: &str,
    ) -> Value {
        json!({
            "id": appointment_id,
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "appointment_date": appointment_date.to_rfc3339(),
            "status": status,
            "case_description": null,
            "charge": null,
            "notification_sent": false,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    /// Appointment row with `doctor` and `patient` embedded, as returned by
    /// `select=*,doctor:doctors(*),patient:patients(*)`.
    pub fn appointment_details_response(
        appointment_id: &str,
        appointment_date: DateTime<Utc>,
        patient_name: &str,
        contact_no: &str,
    ) -> Value {
        let doctor_id = Uuid::new_v4().to_string();
        let patient_id = Uuid::new_v4().to_string();

        let mut row = Self::appointment_response(
            appointment_id,
            &doctor_id,
            &patient_id,
            appointment_date,
            "SCHEDULED",
        );
        row["doctor"] = Self::doctor_response(&doctor_id, "Dr. Mehta", "9000000001");
        row["patient"] = Self::patient_response(&patient_id, patient_name, contact_no);
        row
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "code": code,
            "message": message,
            "details": null,
            "hint": null
        })
    }
}
