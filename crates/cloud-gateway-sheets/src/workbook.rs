use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Cached result of parsing one spreadsheet. Never mutated once built.
#[derive(Debug, Clone)]
pub struct ParsedWorkbook {
    /// Key of the resource whose bytes were first parsed under this fingerprint.
    pub source_key: String,
    pub fingerprint: Fingerprint,
    /// Sheets in file-declared order.
    pub sheets: Vec<Arc<ParsedSheet>>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// One worksheet's extracted rows. The first sheet row supplies `headers`;
/// every entry in `rows` has exactly `headers.len()` cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSheet {
    pub reference_id: String,
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub rows: Vec<Vec<String>>,
}

/// What the dashboard shows after a parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookSummary {
    pub source_key: String,
    pub fingerprint: Fingerprint,
    pub total_sheets: usize,
    pub sheets: Vec<SheetSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    pub reference_id: String,
    pub name: String,
    pub row_count: usize,
}

impl ParsedWorkbook {
    pub fn summary(&self) -> WorkbookSummary {
        WorkbookSummary {
            source_key: self.source_key.clone(),
            fingerprint: self.fingerprint.clone(),
            total_sheets: self.sheets.len(),
            sheets: self
                .sheets
                .iter()
                .map(|s| SheetSummary {
                    reference_id: s.reference_id.clone(),
                    name: s.sheet_name.clone(),
                    row_count: s.row_count,
                })
                .collect(),
        }
    }

    pub fn reference_ids(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.reference_id.clone()).collect()
    }
}
