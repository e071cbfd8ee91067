use chrono::{TimeZone, Utc};
use cloud_gateway::{GatewayError, LogAdapter, LogEvent};
use cloud_gateway_providers::{SplunkHec, SplunkHecConfig};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn hec_for(server: &MockServer, index: Option<&str>) -> SplunkHec {
    SplunkHec::new(SplunkHecConfig {
        label: "splunk".into(),
        url: server.uri(),
        token: "hec-token".into(),
        index: index.map(str::to_owned),
        host: Some("gateway-01".into()),
    })
}

fn event() -> LogEvent {
    LogEvent {
        source: "dashboard".into(),
        sourcetype: "upload".into(),
        payload: json!({ "key": "report.xlsx", "sizeBytes": 2048 }),
        time: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn sends_enriched_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/collector/event"))
        .and(header("authorization", "Splunk hec-token"))
        .and(body_partial_json(json!({
            "event": { "key": "report.xlsx", "sizeBytes": 2048 },
            "source": "dashboard",
            "sourcetype": "upload",
            "index": "main",
            "host": "gateway-01",
            "time": 1740830400.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "Success", "code": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    hec_for(&server, Some("main")).log_event(&event()).await.unwrap();
}

#[tokio::test]
async fn index_is_omitted_when_unset() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "Success", "code": 0 })))
        .mount(&server)
        .await;

    hec_for(&server, None).log_event(&event()).await.unwrap();

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("index").is_none());
}

#[tokio::test]
async fn nonzero_ack_code_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "text": "Incorrect index", "code": 7 })),
        )
        .mount(&server)
        .await;

    let result = hec_for(&server, Some("nope")).log_event(&event()).await;
    assert!(matches!(result, Err(GatewayError::Internal(msg)) if msg.contains("Incorrect index")));
}

#[tokio::test]
async fn bad_token_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "text": "Invalid token", "code": 4 })),
        )
        .mount(&server)
        .await;

    let result = hec_for(&server, None).log_event(&event()).await;
    assert!(matches!(result, Err(GatewayError::ProviderUnavailable(_))));
}

#[tokio::test]
async fn probe_hits_health_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/collector/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "HEC is healthy", "code": 17 })))
        .mount(&server)
        .await;

    hec_for(&server, None).probe().await.unwrap();
}

#[tokio::test]
async fn probe_reports_unhealthy_collector() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/collector/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = hec_for(&server, None).probe().await;
    assert!(matches!(result, Err(GatewayError::ProviderUnavailable(_))));
}
