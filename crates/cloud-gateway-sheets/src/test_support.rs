//! Minimal XLSX writer for tests: builds a workbook from in-memory rows so
//! tests need no binary fixtures.

use std::io::{Cursor, Write};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// A single cell value in a generated workbook.
#[derive(Debug, Clone)]
pub enum Cell {
    Text(String),
    Number(f64),
    Bool(bool),
    Blank,
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn number(n: f64) -> Self {
        Self::Number(n)
    }

    pub fn boolean(b: bool) -> Self {
        Self::Bool(b)
    }
}

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Build an XLSX file containing `sheets` in order.
pub fn xlsx(sheets: &[(&str, Vec<Vec<Cell>>)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    for i in 1..=sheets.len() {
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }
    content_types.push_str("</Types>");
    write_part(&mut zip, options, "[Content_Types].xml", &content_types);

    write_part(
        &mut zip,
        options,
        "_rels/.rels",
        &format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_REL_NS}"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
        ),
    );

    let mut workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets>"#
    );
    let mut rels = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_REL_NS}">"#
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        let n = i + 1;
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape(name)
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
    }
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");
    write_part(&mut zip, options, "xl/workbook.xml", &workbook);
    write_part(&mut zip, options, "xl/_rels/workbook.xml.rels", &rels);

    for (i, (_, rows)) in sheets.iter().enumerate() {
        write_part(
            &mut zip,
            options,
            &format!("xl/worksheets/sheet{}.xml", i + 1),
            &worksheet(rows),
        );
    }

    zip.finish().expect("finish xlsx").into_inner()
}

/// Build a workbook whose `sheet` has a header row plus `data_rows` numbered rows.
pub fn numbered_sheet(data_rows: usize) -> Vec<Vec<Cell>> {
    let mut rows = vec![vec![Cell::text("Id"), Cell::text("Label")]];
    for i in 0..data_rows {
        rows.push(vec![
            Cell::number((i + 1) as f64),
            Cell::text(format!("row {}", i + 1)),
        ]);
    }
    rows
}

fn worksheet(rows: &[Vec<Cell>]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{MAIN_NS}"><sheetData>"#
    );
    for (r, row) in rows.iter().enumerate() {
        let row_number = r + 1;
        xml.push_str(&format!(r#"<row r="{row_number}">"#));
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{row_number}", column_name(c));
            match cell {
                Cell::Text(s) => xml.push_str(&format!(
                    r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    escape(s)
                )),
                Cell::Number(n) => xml.push_str(&format!(r#"<c r="{reference}"><v>{n}</v></c>"#)),
                Cell::Bool(b) => xml.push_str(&format!(
                    r#"<c r="{reference}" t="b"><v>{}</v></c>"#,
                    u8::from(*b)
                )),
                Cell::Blank => {}
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).expect("ascii column name")
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Build a plain ZIP archive holding `parts` as `(name, body)` entries.
pub fn archive(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        write_part(&mut zip, SimpleFileOptions::default(), name, body);
    }
    zip.finish().expect("finish zip").into_inner()
}

fn write_part(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    name: &str,
    body: &str,
) {
    zip.start_file(name, options).expect("start zip entry");
    zip.write_all(body.as_bytes()).expect("write zip entry");
}
