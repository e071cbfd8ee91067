use std::sync::Arc;

use cloud_gateway::{Envelope, GatewayError, GatewayResult, ProviderId};
use cloud_gateway_sheets::{ParseCache, ParsedSheet, WorkbookSummary};

pub async fn parse(
    cache: &ParseCache,
    provider: &ProviderId,
    key: &str,
) -> Envelope<WorkbookSummary> {
    cache
        .parse(provider, key)
        .await
        .map(|workbook| workbook.summary())
        .into()
}

/// Parse `key` and return one sheet's rows, chosen by name or else the first.
pub async fn sheet(
    cache: &ParseCache,
    provider: &ProviderId,
    key: &str,
    name: Option<&str>,
) -> Envelope<ParsedSheet> {
    select(cache, provider, key, name)
        .await
        .map(|sheet| ParsedSheet::clone(&sheet))
        .into()
}

async fn select(
    cache: &ParseCache,
    provider: &ProviderId,
    key: &str,
    name: Option<&str>,
) -> GatewayResult<Arc<ParsedSheet>> {
    let workbook = cache.parse(provider, key).await?;
    let found = match name {
        Some(name) => workbook.sheets.iter().find(|s| s.sheet_name == name),
        None => workbook.sheets.first(),
    };
    found.cloned().ok_or_else(|| {
        GatewayError::not_found(format!("sheet {} in {key}", name.unwrap_or("#0")))
    })
}
