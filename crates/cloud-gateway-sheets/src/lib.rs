//! Spreadsheet parse cache.
//!
//! Turns workbook bytes fetched through the [`cloud_gateway::ResourceGateway`]
//! into structured sheets exactly once per distinct content, and serves the
//! sheets back by reference id.

pub mod cache;
pub mod fingerprint;
pub mod parser;
pub mod reference;
pub mod workbook;

pub use cache::{CacheConfig, CacheStats, ParseCache};
pub use fingerprint::Fingerprint;
pub use parser::{CalamineParser, SheetData, WorkbookParser};
pub use reference::ReferenceIdGenerator;
pub use workbook::{ParsedSheet, ParsedWorkbook, SheetSummary, WorkbookSummary};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
