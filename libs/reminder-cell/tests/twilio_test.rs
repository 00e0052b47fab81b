use assert_matches::assert_matches;
use serde_json::json;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{body_string_contains, header_exists, method, path};

use reminder_cell::models::DeliveryError;
use reminder_cell::services::sender::{NotificationSender, TwilioSender};
use shared_config::{AppConfig, MessagingChannel};
use shared_utils::test_utils::TestConfig;

const MESSAGES_PATH: &str = "/2010-04-01/Accounts/ACtest/Messages.json";

fn config_for(server: &MockServer) -> AppConfig {
    TestConfig::with_mock_server(&server.uri()).to_app_config()
}

#[tokio::test]
async fn test_whatsapp_message_is_form_posted_with_basic_auth() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .and(header_exists("authorization"))
        .and(body_string_contains("To=whatsapp%3A%2B919876543210"))
        .and(body_string_contains("From=whatsapp%3A%2B14155238886"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sid": "SM123",
            "status": "queued"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sender = TwilioSender::new(&config_for(&mock_server));
    let receipt = sender.send("+919876543210", "Appointment Reminder").await.unwrap();

    assert_eq!(receipt.sid, "SM123");
    assert_eq!(receipt.status.as_deref(), Some("queued"));
}

#[tokio::test]
async fn test_sms_channel_sends_bare_number() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .and(body_string_contains("To=%2B919876543210"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sid": "SM456" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = AppConfig {
        messaging_channel: MessagingChannel::Sms,
        ..config_for(&mock_server)
    };
    let receipt = TwilioSender::new(&config).send("+919876543210", "hi").await.unwrap();

    assert_eq!(receipt.sid, "SM456");
}

#[tokio::test]
async fn test_provider_rejection_carries_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 21211,
            "message": "The 'To' number is not a valid phone number.",
            "status": 400
        })))
        .mount(&mock_server)
        .await;

    let err = TwilioSender::new(&config_for(&mock_server))
        .send("+91123", "hi")
        .await
        .unwrap_err();

    assert_matches!(err, DeliveryError::Rejected { status: 400, ref message } if message.contains("not a valid phone number"));
}

#[tokio::test]
async fn test_missing_credentials_fail_without_calling_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = AppConfig {
        twilio_auth_token: String::new(),
        ..config_for(&mock_server)
    };
    let err = TwilioSender::new(&config).send("+919876543210", "hi").await.unwrap_err();

    assert_matches!(err, DeliveryError::NotConfigured);
}
