use cloud_gateway::{Envelope, ProviderStatus, ResourceGateway};

pub async fn run(gateway: &ResourceGateway) -> Envelope<Vec<ProviderStatus>> {
    Envelope::ok(gateway.health().await.into_values().collect())
}
