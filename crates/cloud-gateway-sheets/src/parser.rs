use std::io::{Cursor, Read};

use calamine::{Data, Reader};
use cloud_gateway::{GatewayError, GatewayResult};

/// Rows extracted from one worksheet, before reference ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetData {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Turns workbook bytes into sheets, in file-declared order.
///
/// Runs on a blocking thread; implementations may be CPU-heavy.
pub trait WorkbookParser: Send + Sync + 'static {
    fn parse(&self, bytes: &[u8]) -> GatewayResult<Vec<SheetData>>;
}

/// Spreadsheet container recognized by its magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// ZIP-based: xlsx, xlsm, xlsb, ods.
    Zip,
    /// OLE compound document: legacy xls.
    Ole,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub fn detect_container(bytes: &[u8]) -> GatewayResult<Container> {
    if bytes.starts_with(ZIP_MAGIC) {
        Ok(Container::Zip)
    } else if bytes.starts_with(OLE_MAGIC) {
        Ok(Container::Ole)
    } else {
        Err(GatewayError::UnsupportedFormat(
            "not a recognized spreadsheet container".into(),
        ))
    }
}

const ODS_MIMETYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";

/// A ZIP container is only a workbook if it carries an Excel workbook part or
/// declares the OpenDocument spreadsheet mimetype.
fn check_zip_workbook(bytes: &[u8]) -> GatewayResult<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| GatewayError::CorruptFile(format!("unreadable zip container: {e}")))?;

    if archive
        .file_names()
        .any(|name| name == "xl/workbook.xml" || name == "xl/workbook.bin")
    {
        return Ok(());
    }

    let is_ods = archive.index_for_name("content.xml").is_some()
        && match archive.by_name("mimetype") {
            Ok(mut entry) => {
                let mut mimetype = String::new();
                entry.read_to_string(&mut mimetype).is_ok() && mimetype.trim() == ODS_MIMETYPE
            }
            Err(_) => false,
        };
    if is_ods {
        Ok(())
    } else {
        Err(GatewayError::UnsupportedFormat(
            "zip archive is not a spreadsheet".into(),
        ))
    }
}

/// Default parser backed by `calamine`.
///
/// The first row of each sheet is its header row. Fully blank rows are skipped,
/// and data rows are padded or truncated to the header width.
#[derive(Debug, Default, Clone, Copy)]
pub struct CalamineParser;

impl WorkbookParser for CalamineParser {
    fn parse(&self, bytes: &[u8]) -> GatewayResult<Vec<SheetData>> {
        if detect_container(bytes)? == Container::Zip {
            check_zip_workbook(bytes)?;
        }

        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| GatewayError::CorruptFile(e.to_string()))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| GatewayError::CorruptFile(format!("sheet {name}: {e}")))?;

            let mut rows = range.rows();
            let headers: Vec<String> = rows
                .next()
                .map(|row| row.iter().map(render_cell).collect())
                .unwrap_or_default();

            let data = rows
                .filter(|row| !row.iter().all(|c| matches!(c, Data::Empty)))
                .map(|row| {
                    (0..headers.len())
                        .map(|i| row.get(i).map(render_cell).unwrap_or_default())
                        .collect()
                })
                .collect();

            sheets.push(SheetData {
                name,
                headers,
                rows: data,
            });
        }

        Ok(sheets)
    }
}

/// Render a cell the way the dashboard displays it.
pub fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => render_float(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_else(|| render_float(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#{e:?}"),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

fn render_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}
