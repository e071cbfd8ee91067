use cloud_gateway::{Envelope, MessageReceipt, ProviderId, ResourceGateway};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Logged {
    pub forwarded: bool,
}

pub async fn publish(
    gateway: &ResourceGateway,
    provider: &ProviderId,
    message: &str,
) -> Envelope<MessageReceipt> {
    gateway.publish(provider, message).await.into()
}

/// Forward an event to the log sink. Always succeeds; `forwarded` only says
/// the call was handed off, since sink failures are swallowed.
pub async fn log(
    gateway: &ResourceGateway,
    source: &str,
    sourcetype: &str,
    payload: serde_json::Value,
) -> Envelope<Logged> {
    gateway.log_event(source, sourcetype, payload).await;
    Envelope::ok(Logged { forwarded: true })
}
