use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use cloud_gateway::{
    Envelope, ErrorKind, MessageReceipt, ProviderId, ProviderStatus, Resource, ResourceGateway,
};
use cloud_gateway_sheets::{CacheStats, ParseCache, ParsedSheet, WorkbookSummary};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::commands::{messaging, objects};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ResourceGateway>,
    pub cache: ParseCache,
}

/// Envelope rendered with an HTTP status matching its error kind.
struct ApiResponse<T>(Envelope<T>);

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ErrorKind::CorruptFile => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self
            .0
            .error
            .as_ref()
            .map(|e| status_for(e.kind))
            .unwrap_or(StatusCode::OK);
        (status, Json(self.0)).into_response()
    }
}

impl<T> From<Envelope<T>> for ApiResponse<T> {
    fn from(envelope: Envelope<T>) -> Self {
        Self(envelope)
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublishRequest {
    message: String,
}

#[derive(Debug, Deserialize)]
struct LogRequest {
    source: String,
    sourcetype: String,
    #[serde(default)]
    event: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Cleared {
    removed: usize,
}

pub fn router(state: AppState) -> Router {
    // Let bodies one byte over the limit through so the gateway reports
    // the overflow in an envelope.
    let body_limit = usize::try_from(state.gateway.max_payload_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(1);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/providers/{id}/objects", get(list_objects))
        .route(
            "/api/providers/{id}/objects/{*key}",
            get(download).put(upload).delete(delete_object),
        )
        .route("/api/providers/{id}/messages", post(publish))
        .route("/api/log", post(log_event))
        .route("/api/providers/{id}/workbooks/{*key}", post(parse_workbook))
        .route("/api/sheets/{reference_id}", get(get_sheet))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/cache", delete(clear_cache))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> ApiResponse<Vec<ProviderStatus>> {
    crate::commands::health::run(&state.gateway).await.into()
}

async fn list_objects(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResponse<Vec<Resource>> {
    objects::list(&state.gateway, &ProviderId::new(id), query.prefix.as_deref())
        .await
        .into()
}

async fn upload(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
    body: Bytes,
) -> ApiResponse<Resource> {
    // The audit event finishes on its own; the response does not wait for it.
    Envelope::from(
        objects::store(&state.gateway, &ProviderId::new(id), &key, body.to_vec())
            .await
            .map(|(resource, _audit)| resource),
    )
    .into()
}

/// Raw bytes on success, an envelope otherwise.
async fn download(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Response {
    match state.gateway.get(&ProviderId::new(id), &key).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response(),
        Err(e) => ApiResponse(Envelope::<()>::failure(&e)).into_response(),
    }
}

async fn delete_object(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> ApiResponse<objects::Deleted> {
    objects::delete(&state.gateway, &ProviderId::new(id), &key)
        .await
        .into()
}

async fn publish(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PublishRequest>,
) -> ApiResponse<MessageReceipt> {
    messaging::publish(&state.gateway, &ProviderId::new(id), &request.message)
        .await
        .into()
}

async fn log_event(
    State(state): State<AppState>,
    Json(request): Json<LogRequest>,
) -> ApiResponse<messaging::Logged> {
    messaging::log(
        &state.gateway,
        &request.source,
        &request.sourcetype,
        request.event,
    )
    .await
    .into()
}

async fn parse_workbook(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> ApiResponse<WorkbookSummary> {
    crate::commands::sheets::parse(&state.cache, &ProviderId::new(id), &key)
        .await
        .into()
}

async fn get_sheet(
    State(state): State<AppState>,
    Path(reference_id): Path<String>,
) -> ApiResponse<ParsedSheet> {
    Envelope::from(
        state
            .cache
            .get_sheet(&reference_id)
            .map(|sheet| ParsedSheet::clone(&sheet)),
    )
    .into()
}

async fn cache_stats(State(state): State<AppState>) -> ApiResponse<CacheStats> {
    Envelope::ok(state.cache.stats()).into()
}

async fn clear_cache(State(state): State<AppState>) -> ApiResponse<Cleared> {
    Envelope::ok(Cleared {
        removed: state.cache.clear(),
    })
    .into()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

/// Serve the HTTP API on `bind` until ctrl-c.
pub async fn serve(state: AppState, bind: &str, sweep_every: Option<Duration>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let sweeper = sweep_every.map(|every| state.cache.spawn_expiry_sweeper(every));

    info!(addr = %listener.local_addr()?, "serving gateway API");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use cloud_gateway::test_support::{InMemoryStorage, RecordingLogSink, ScriptedQueue};
    use cloud_gateway::{GatewayError, ProviderAdapter, ProviderConfig};
    use cloud_gateway_sheets::CacheConfig;
    use cloud_gateway_sheets::test_support::{numbered_sheet, xlsx};
    use serde_json::{Value, json};

    use super::*;

    struct TestServer {
        base: String,
        client: reqwest::Client,
        sink: Arc<RecordingLogSink>,
    }

    async fn start() -> TestServer {
        let sink = Arc::new(RecordingLogSink::new("splunk"));
        let queue = ScriptedQueue::new("events")
            .then(Err(GatewayError::unavailable("connection reset")));
        let gateway = Arc::new(
            ResourceGateway::builder()
                .register(
                    ProviderConfig::new("gcp"),
                    ProviderAdapter::Storage(Arc::new(InMemoryStorage::new("gcp-mem"))),
                )
                .register(ProviderConfig::new("events"), ProviderAdapter::queue(queue))
                .register(ProviderConfig::new("splunk"), ProviderAdapter::Log(sink.clone()))
                .max_payload_bytes(64 * 1024)
                .build(),
        );
        let cache = ParseCache::new(gateway.clone(), CacheConfig::default());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(AppState { gateway, cache });
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        TestServer {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            sink,
        }
    }

    impl TestServer {
        fn url(&self, path: &str) -> String {
            format!("{}{path}", self.base)
        }

        /// Audit events arrive on a background task.
        async fn wait_for_events(&self, count: usize) -> Vec<cloud_gateway::LogEvent> {
            for _ in 0..100 {
                let events = self.sink.events();
                if events.len() >= count {
                    return events;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            self.sink.events()
        }
    }

    #[tokio::test]
    async fn upload_list_download_delete() {
        let server = start().await;

        let put: Value = server
            .client
            .put(server.url("/api/providers/gcp/objects/reports/q1.xlsx"))
            .body(vec![1u8, 2, 3])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(put["success"], true);
        assert_eq!(put["data"]["key"], "reports/q1.xlsx");
        assert_eq!(put["data"]["sizeBytes"], 3);
        assert_eq!(server.wait_for_events(1).await.len(), 1);

        let listed: Value = server
            .client
            .get(server.url("/api/providers/gcp/objects?prefix=reports/"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);

        let bytes = server
            .client
            .get(server.url("/api/providers/gcp/objects/reports/q1.xlsx"))
            .send()
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(bytes.to_vec(), vec![1u8, 2, 3]);

        let deleted = server
            .client
            .delete(server.url("/api/providers/gcp/objects/reports/q1.xlsx"))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), 200);

        let missing = server
            .client
            .get(server.url("/api/providers/gcp/objects/reports/q1.xlsx"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
        let body: Value = missing.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn oversize_upload_is_rejected_with_envelope() {
        let server = start().await;
        let response = server
            .client
            .put(server.url("/api/providers/gcp/objects/big.bin"))
            .body(vec![0u8; 64 * 1024 + 1])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 413);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["kind"], "payload_too_large");
    }

    #[tokio::test]
    async fn unknown_provider_is_unavailable() {
        let server = start().await;
        let response = server
            .client
            .get(server.url("/api/providers/aws/objects"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn publish_retries_once() {
        let server = start().await;
        let body: Value = server
            .client
            .post(server.url("/api/providers/events/messages"))
            .json(&json!({ "message": "file uploaded" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["attempts"], 2);
    }

    #[tokio::test]
    async fn log_always_succeeds() {
        let server = start().await;
        let body: Value = server
            .client
            .post(server.url("/api/log"))
            .json(&json!({ "source": "ui", "sourcetype": "click", "event": { "button": "upload" } }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(server.sink.events()[0].payload["button"], "upload");
    }

    #[tokio::test]
    async fn parse_then_fetch_sheet_then_clear() {
        let server = start().await;
        let workbook = xlsx(&[("Data", numbered_sheet(10)), ("Empty", vec![])]);
        server
            .client
            .put(server.url("/api/providers/gcp/objects/report.xlsx"))
            .body(workbook)
            .send()
            .await
            .unwrap();

        let summary: Value = server
            .client
            .post(server.url("/api/providers/gcp/workbooks/report.xlsx"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(summary["data"]["totalSheets"], 2);
        assert_eq!(summary["data"]["sheets"][0]["rowCount"], 10);
        assert_eq!(summary["data"]["sheets"][1]["rowCount"], 0);
        let reference = summary["data"]["sheets"][0]["referenceId"]
            .as_str()
            .unwrap()
            .to_owned();

        let sheet: Value = server
            .client
            .get(server.url(&format!("/api/sheets/{reference}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(sheet["data"]["sheetName"], "Data");
        assert_eq!(sheet["data"]["headers"], json!(["Id", "Label"]));

        let stats: Value = server
            .client
            .get(server.url("/api/cache/stats"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["data"]["entries"], 1);

        server
            .client
            .delete(server.url("/api/cache"))
            .send()
            .await
            .unwrap();
        let gone = server
            .client
            .get(server.url(&format!("/api/sheets/{reference}")))
            .send()
            .await
            .unwrap();
        assert_eq!(gone.status(), 404);
    }

    #[tokio::test]
    async fn non_spreadsheet_parse_is_unsupported() {
        let server = start().await;
        server
            .client
            .put(server.url("/api/providers/gcp/objects/notes.txt"))
            .body("plain text")
            .send()
            .await
            .unwrap();

        let response = server
            .client
            .post(server.url("/api/providers/gcp/workbooks/notes.txt"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 415);
    }

    #[tokio::test]
    async fn health_lists_every_provider() {
        let server = start().await;
        let body: Value = server
            .client
            .get(server.url("/api/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
    }
}
