use agrimarket_core::config::MailConfig;
use agrimarket_core::mail::{HttpMailer, MailError, MailTransport};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> MailConfig {
    MailConfig {
        endpoint: format!("{}/messages", server.uri()),
        api_key: "mail_test_key".to_string(),
        from: "no-reply@agrimarket.example".to_string(),
    }
}

#[tokio::test]
async fn sends_the_code_with_expiry_and_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("authorization", "Bearer mail_test_key"))
        .and(body_partial_json(json!({
            "from": "no-reply@agrimarket.example",
            "to": "ravi@example.com",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(config_for(&server));
    mailer
        .send_otp_email("ravi@example.com", "482913", 10)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(body.contains("482913"));
    assert!(body.contains("10 minutes"));
}

#[tokio::test]
async fn rejection_carries_the_upstream_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(config_for(&server));
    let err = mailer
        .send_otp_email("ravi@example.com", "482913", 10)
        .await
        .unwrap_err();

    assert!(matches!(err, MailError::Rejected { status: 429 }));
}
