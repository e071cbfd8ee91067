use cloud_gateway::{GatewayError, QueueAdapter};
use cloud_gateway_providers::{AzureQueue, AzureQueueConfig, PubSubConfig, PubSubPublisher};
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pubsub_for(server: &MockServer) -> PubSubPublisher {
    PubSubPublisher::new(PubSubConfig {
        label: "pubsub".into(),
        project: "acme".into(),
        topic: "uploads".into(),
        token: Some("t0ken".into()),
        api_base_url: Some(server.uri()),
    })
}

fn azure_for(server: &MockServer) -> AzureQueue {
    AzureQueue::new(AzureQueueConfig {
        label: "azq".into(),
        account: "acct".into(),
        queue: "uploads".into(),
        sas_token: Some("?sv=2021&sig=s1g".into()),
        endpoint: Some(server.uri()),
    })
}

#[tokio::test]
async fn pubsub_publishes_base64_data() {
    let server = MockServer::start().await;

    // "file uploaded" in base64
    Mock::given(method("POST"))
        .and(path("/v1/projects/acme/topics/uploads:publish"))
        .and(header("authorization", "Bearer t0ken"))
        .and(body_json(json!({ "messages": [{ "data": "ZmlsZSB1cGxvYWRlZA==" }] })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "messageIds": ["1234567890"] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let id = pubsub_for(&server).publish("file uploaded").await.unwrap();
    assert_eq!(id, "1234567890");
}

#[tokio::test]
async fn pubsub_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend down"))
        .mount(&server)
        .await;

    let result = pubsub_for(&server).publish("x").await;
    match result {
        Err(GatewayError::ProviderUnavailable(msg)) => assert!(msg.contains("503")),
        other => panic!("expected ProviderUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn pubsub_missing_topic_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = pubsub_for(&server).publish("x").await;
    assert!(matches!(result, Err(GatewayError::NotFound(_))));
}

#[tokio::test]
async fn pubsub_empty_id_list_is_internal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messageIds": [] })))
        .mount(&server)
        .await;

    let result = pubsub_for(&server).publish("x").await;
    assert!(matches!(result, Err(GatewayError::Internal(_))));
}

#[tokio::test]
async fn pubsub_probe_reads_topic() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/projects/acme/topics/uploads"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "name": "projects/acme/topics/uploads" })),
        )
        .mount(&server)
        .await;

    pubsub_for(&server).probe().await.unwrap();
}

#[tokio::test]
async fn pubsub_unreachable_host_is_unavailable() {
    let publisher = PubSubPublisher::new(PubSubConfig {
        label: "pubsub".into(),
        project: "acme".into(),
        topic: "uploads".into(),
        token: None,
        api_base_url: Some("http://127.0.0.1:1".into()),
    });

    let result = publisher.publish("x").await;
    assert!(matches!(result, Err(GatewayError::ProviderUnavailable(_))));
}

#[tokio::test]
async fn azure_queue_posts_xml_envelope() {
    let server = MockServer::start().await;
    let response = "<?xml version=\"1.0\" encoding=\"utf-8\"?><QueueMessagesList><QueueMessage><MessageId>5974b586-0df3-4e2d-ad0c-18e3892bfca2</MessageId></QueueMessage></QueueMessagesList>";

    Mock::given(method("POST"))
        .and(path("/uploads/messages"))
        .and(query_param("sig", "s1g"))
        .and(header("x-ms-version", "2021-08-06"))
        .and(body_string_contains(
            "<QueueMessage><MessageText>aGVsbG8=</MessageText></QueueMessage>",
        ))
        .respond_with(ResponseTemplate::new(201).set_body_raw(response, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;

    let id = azure_for(&server).publish("hello").await.unwrap();
    assert_eq!(id, "5974b586-0df3-4e2d-ad0c-18e3892bfca2");
}

#[tokio::test]
async fn azure_queue_falls_back_to_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).insert_header("x-ms-request-id", "req-42"))
        .mount(&server)
        .await;

    let id = azure_for(&server).publish("hello").await.unwrap();
    assert_eq!(id, "req-42");
}

#[tokio::test]
async fn azure_queue_rejects_oversize_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let message = "x".repeat(60 * 1024);
    let result = azure_for(&server).publish(&message).await;
    assert!(matches!(
        result,
        Err(GatewayError::PayloadTooLarge { limit: 65536, .. })
    ));
}

#[tokio::test]
async fn azure_queue_auth_failure_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = azure_for(&server).publish("hello").await;
    assert!(matches!(result, Err(GatewayError::ProviderUnavailable(_))));
}

#[tokio::test]
async fn azure_queue_probe_reads_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uploads"))
        .and(query_param("comp", "metadata"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    azure_for(&server).probe().await.unwrap();
}
