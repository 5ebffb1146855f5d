//! Excel 2007+ (`.xlsx`) writer.
//!
//! Produces a minimal OOXML package: content types, relationships, a
//! workbook with a single `Sheet1` worksheet, a shared string table and a
//! default stylesheet.
//!
//! The package is a zip archive whose central directory is only written when
//! the archive is finished. Reading the buffer before that yields a truncated,
//! unreadable file, so the buffer is never handed out directly: callers go
//! through [`with_workbook`], which always finishes the archive (on the error
//! path too) before returning the bytes.

use quick_xml::escape::escape;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{SerializeError, SerializeResult};
use crate::models::{CellValue, Table};

/// Sheet name used for the single worksheet.
pub const SHEET_NAME: &str = "Sheet1";

const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

const CONTENT_TYPES: &str = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

/// An open workbook archive.
///
/// Parts are added with [`WorkbookWriter::add_part`]; the bytes only become
/// available once [`with_workbook`] has finished the archive.
pub struct WorkbookWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
}

impl WorkbookWriter {
    fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }

    /// Add an XML part at `path` inside the package.
    pub fn add_part(&mut self, path: &str, xml: &str) -> SerializeResult<()> {
        self.zip.start_file(path, self.options)?;
        self.zip.write_all(XML_HEADER.as_bytes())?;
        self.zip.write_all(xml.as_bytes())?;
        Ok(())
    }

    /// Write every part of a single-sheet workbook holding `table`.
    pub fn write_table(&mut self, table: &Table) -> SerializeResult<()> {
        let (sheet, strings) = sheet_xml(table)?;

        self.add_part("[Content_Types].xml", CONTENT_TYPES)?;
        self.add_part("_rels/.rels", ROOT_RELS)?;
        self.add_part("xl/workbook.xml", &workbook_xml())?;
        self.add_part("xl/_rels/workbook.xml.rels", WORKBOOK_RELS)?;
        self.add_part("xl/styles.xml", STYLES)?;
        self.add_part("xl/sharedStrings.xml", &strings.to_xml())?;
        self.add_part("xl/worksheets/sheet1.xml", &sheet)?;
        Ok(())
    }

    fn finish(self) -> SerializeResult<Vec<u8>> {
        Ok(self.zip.finish()?.into_inner())
    }
}

/// Run `write` against a fresh workbook and return the finished archive.
///
/// The archive is finished whether or not `write` succeeds; an error from
/// `write` takes precedence over one from finishing.
pub fn with_workbook<F>(write: F) -> SerializeResult<Vec<u8>>
where
    F: FnOnce(&mut WorkbookWriter) -> SerializeResult<()>,
{
    let mut writer = WorkbookWriter::new();
    let written = write(&mut writer);
    let finished = writer.finish();
    written?;
    finished
}

/// Serialize `table` as a single-sheet xlsx workbook.
pub fn write_xlsx(table: &Table) -> SerializeResult<Vec<u8>> {
    with_workbook(|book| book.write_table(table))
}

fn workbook_xml() -> String {
    format!(
        r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        SHEET_NAME
    )
}

// =============================================================================
// Worksheet
// =============================================================================

/// Shared string table, deduplicated in insertion order.
#[derive(Default)]
struct SharedStrings {
    strings: Vec<String>,
    index: HashMap<String, usize>,
    references: usize,
}

impl SharedStrings {
    fn intern(&mut self, value: &str) -> usize {
        self.references += 1;
        if let Some(&i) = self.index.get(value) {
            return i;
        }
        let i = self.strings.len();
        self.strings.push(value.to_string());
        self.index.insert(value.to_string(), i);
        i
    }

    fn to_xml(&self) -> String {
        let mut xml = format!(
            r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
            self.references,
            self.strings.len()
        );
        for s in &self.strings {
            xml.push_str(r#"<si><t xml:space="preserve">"#);
            xml.push_str(&escape(xml_safe(s).as_str()));
            xml.push_str("</t></si>");
        }
        xml.push_str("</sst>");
        xml
    }
}

/// Build the worksheet XML: a header row of column names, then one row per
/// record. Missing cells are left out.
fn sheet_xml(table: &Table) -> SerializeResult<(String, SharedStrings)> {
    let rows = table.row_count() + 1;
    let cols = table.column_count();
    if rows > MAX_ROWS || cols > MAX_COLUMNS {
        return Err(SerializeError::Layout(format!(
            "{} rows x {} columns exceeds the sheet limit of {} x {}",
            rows, cols, MAX_ROWS, MAX_COLUMNS
        )));
    }

    let letters: Vec<String> = (0..cols).map(column_letter).collect();
    let mut strings = SharedStrings::default();
    let mut xml = String::from(
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );
    if cols > 0 {
        xml.push_str(&format!(r#"<dimension ref="A1:{}{}"/>"#, letters[cols - 1], rows));
    }
    xml.push_str("<sheetData>");

    xml.push_str(r#"<row r="1">"#);
    for (letter, column) in letters.iter().zip(table.columns()) {
        let i = strings.intern(&column.name);
        xml.push_str(&format!(r#"<c r="{}1" t="s"><v>{}</v></c>"#, letter, i));
    }
    xml.push_str("</row>");

    for (r, row) in table.rows().enumerate() {
        let line = r + 2;
        xml.push_str(&format!(r#"<row r="{}">"#, line));
        for (letter, cell) in letters.iter().zip(row) {
            match cell {
                CellValue::Number(n) => {
                    xml.push_str(&format!(r#"<c r="{}{}"><v>{}</v></c>"#, letter, line, n));
                }
                CellValue::Text(s) => {
                    let i = strings.intern(s);
                    xml.push_str(&format!(r#"<c r="{}{}" t="s"><v>{}</v></c>"#, letter, line, i));
                }
                CellValue::Missing => {}
            }
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    Ok((xml, strings))
}

/// Zero-based column index to its spreadsheet letter (`0 -> A`, `26 -> AA`).
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Drop characters XML 1.0 cannot carry.
fn xml_safe(value: &str) -> String {
    value
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Column;
    use std::io::Read;
    use zip::ZipArchive;

    fn sample() -> Table {
        Table::new(vec![
            Column::detect(
                "name",
                vec![CellValue::Text("A & B".into()), CellValue::Text("<c>".into())],
            ),
            Column::detect("score", vec![CellValue::Number(1.5), CellValue::Missing]),
        ])
        .unwrap()
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_archive_is_finalized() {
        let bytes = write_xlsx(&sample()).unwrap();

        // end of central directory record closes a finished archive
        let eocd = &bytes[bytes.len() - 22..bytes.len() - 18];
        assert_eq!(eocd, b"PK\x05\x06");

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut sheet = String::new();
        archive
            .by_name("xl/worksheets/sheet1.xml")
            .unwrap()
            .read_to_string(&mut sheet)
            .unwrap();
        assert!(sheet.contains(r#"<c r="B2"><v>1.5</v></c>"#));
        assert!(!sheet.contains(r#"r="B3""#));
    }

    #[test]
    fn test_truncated_archive_is_unreadable() {
        let bytes = write_xlsx(&sample()).unwrap();
        let truncated = &bytes[..bytes.len() - 22];

        assert!(crate::parser::parse_xlsx_bytes(truncated).is_err());
    }

    #[test]
    fn test_text_is_escaped() {
        let bytes = write_xlsx(&sample()).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut strings = String::new();
        archive
            .by_name("xl/sharedStrings.xml")
            .unwrap()
            .read_to_string(&mut strings)
            .unwrap();

        assert!(strings.contains("A &amp; B"));
        assert!(strings.contains("&lt;c&gt;"));
    }

    #[test]
    fn test_error_path_still_returns_error() {
        let result = with_workbook(|book| {
            book.add_part("xl/partial.xml", "<partial/>")?;
            Err(SerializeError::Layout("stopped".into()))
        });
        assert!(matches!(result, Err(SerializeError::Layout(ref m)) if m == "stopped"));
    }

    #[test]
    fn test_xml_safe_strips_control_chars() {
        assert_eq!(xml_safe("a\u{1}b\tc"), "ab\tc");
    }
}
