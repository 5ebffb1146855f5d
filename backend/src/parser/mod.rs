//! Tabular file parser with encoding and delimiter auto-detection.
//!
//! Turns an uploaded byte buffer into a typed [`Table`]. The format is picked
//! from the file extension (`.csv` or `.xlsx`, case-insensitive); anything
//! else is rejected with [`ParseError::UnsupportedFormat`].
//!
//! Column types are detected after reading: a column whose non-missing cells
//! all parse as finite numbers is numeric, any other column is text.

use std::collections::HashSet;

use crate::error::{ParseError, ParseResult};
use crate::models::{CellValue, Column, ColumnKind, SourceFormat, Table, UploadedFile};

pub mod xlsx;

pub use xlsx::parse_xlsx_bytes;

/// Cell contents read as missing values.
pub const NA_VALUES: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "#NA",
    "<NA>",
];

/// Options for the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// CSV delimiter. `None` detects it from the header line.
    pub delimiter: Option<u8>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: Some(b','),
        }
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// Parsed table
    pub table: Table,
    /// Format the file was read as
    pub format: SourceFormat,
    /// Detected or used encoding (CSV only)
    pub encoding: Option<String>,
    /// Detected or used delimiter (CSV only)
    pub delimiter: Option<char>,
}

/// Parse an uploaded file with default options.
pub fn parse(file: &UploadedFile) -> ParseResult<Table> {
    parse_file(file, &ParseOptions::default()).map(|parsed| parsed.table)
}

/// Parse an uploaded file, dispatching on its extension.
pub fn parse_file(file: &UploadedFile, options: &ParseOptions) -> ParseResult<ParsedFile> {
    let format = SourceFormat::from_file_name(&file.name).ok_or_else(|| {
        ParseError::UnsupportedFormat {
            extension: file.extension(),
        }
    })?;

    match format {
        SourceFormat::Csv => parse_csv_bytes(&file.bytes, options),
        SourceFormat::Xlsx => Ok(ParsedFile {
            table: parse_xlsx_bytes(&file.bytes)?,
            format,
            encoding: None,
            delimiter: None,
        }),
    }
}

// =============================================================================
// Encoding & delimiter detection
// =============================================================================

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            // chardet can be wrong on short inputs; Windows-1252 decodes any byte
            Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        },
        // WHATWG maps the Latin-1 labels to Windows-1252, a superset of it
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(encoding) => encoding.decode(bytes).0.into_owned(),
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    }
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Comma wins ties, and is returned when no candidate appears.
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    let separators = [b',', b';', b'\t', b'|'];
    let mut best_sep = b',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep as char).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

// =============================================================================
// CSV
// =============================================================================

/// Parse CSV bytes: detect encoding, pick the delimiter, read and type columns.
///
/// Valid UTF-8 is always read as UTF-8; chardet is only asked about bytes
/// that are not.
pub fn parse_csv_bytes(bytes: &[u8], options: &ParseOptions) -> ParseResult<ParsedFile> {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let (encoding, content) = match std::str::from_utf8(body) {
        Ok(text) => ("utf-8".to_string(), text.to_string()),
        Err(_) => {
            let encoding = detect_encoding(body);
            let content = decode_content(body, &encoding);
            (encoding, content)
        }
    };
    let delimiter = options
        .delimiter
        .unwrap_or_else(|| detect_delimiter(&content));

    let table = parse_csv_str(&content, delimiter)?;

    Ok(ParsedFile {
        table,
        format: SourceFormat::Csv,
        encoding: Some(encoding),
        delimiter: Some(delimiter as char),
    })
}

/// Parse decoded CSV text with an explicit delimiter.
///
/// The first record is the header. Blank lines are skipped, short rows are
/// padded with missing cells, and a row longer than the header is an error.
pub fn parse_csv_str(content: &str, delimiter: u8) -> ParseResult<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    // the csv reader already skips empty lines
    let header = records.next().ok_or(ParseError::NoHeaders)??;

    let headers = unique_headers(header.iter().map(str::to_string).collect());
    let width = headers.len();
    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); width];

    for record in records {
        let record = record?;
        if record.len() > width {
            return Err(ParseError::RaggedRow {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                expected: width,
                found: record.len(),
            });
        }

        for (i, cells) in raw.iter_mut().enumerate() {
            let value = record.get(i).filter(|v| !is_missing_marker(v));
            cells.push(value.map(str::to_string));
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, cells)| typed_column(name, cells))
        .collect();

    Ok(Table::new(columns)?)
}

/// `true` when the raw field is one of the [`NA_VALUES`].
///
/// Whitespace is significant: `"  "` and `" NA "` are text.
pub fn is_missing_marker(value: &str) -> bool {
    NA_VALUES.contains(&value)
}

/// Parse a finite number, tolerating surrounding whitespace.
pub fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Build a column from raw text cells, detecting its kind.
fn typed_column(name: String, cells: Vec<Option<String>>) -> Column {
    let numeric = cells
        .iter()
        .flatten()
        .all(|v| parse_number(v).is_some());

    if numeric {
        let values = cells
            .iter()
            .map(|c| match c.as_deref().and_then(parse_number) {
                Some(n) => CellValue::Number(n),
                None => CellValue::Missing,
            })
            .collect();
        Column::new(name, ColumnKind::Numeric, values)
    } else {
        let values = cells
            .into_iter()
            .map(|c| c.map(CellValue::Text).unwrap_or(CellValue::Missing))
            .collect();
        Column::new(name, ColumnKind::Text, values)
    }
}

/// Make header names unique: blank names become `Unnamed: {i}`, repeats get
/// a `.1`, `.2`, ... suffix.
pub fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut headers = Vec::with_capacity(raw.len());

    for (i, name) in raw.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            name
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while used.contains(&candidate) {
            candidate = format!("{}.{}", base, suffix);
            suffix += 1;
        }

        used.insert(candidate.clone());
        headers.push(candidate);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv(content: &str) -> Table {
        parse_csv_str(content, b',').unwrap()
    }

    #[test]
    fn test_simple_csv() {
        let table = csv("name,age\nAlice,30\nBob,25");

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_names(), vec!["name", "age"]);
        assert_eq!(table.column("name").unwrap().kind, ColumnKind::Text);
        assert_eq!(table.column("age").unwrap().kind, ColumnKind::Numeric);
        assert_eq!(table.column("age").unwrap().values[1], CellValue::Number(25.0));
    }

    #[test]
    fn test_quoted_values() {
        let table = csv("name,value\n\"Alice\",\"Hello, World\"");

        assert_eq!(table.column("value").unwrap().values[0], CellValue::Text("Hello, World".into()));
    }

    #[test]
    fn test_empty_lines_skipped() {
        let table = csv("a,b\n1,2\n\n3,4\n");
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_missing_values() {
        let table = csv("a,b,c\n1,,3\nNA,x,");

        let a = table.column("a").unwrap();
        assert_eq!(a.kind, ColumnKind::Numeric);
        assert_eq!(a.values[1], CellValue::Missing);
        assert_eq!(table.column("b").unwrap().values[0], CellValue::Missing);
        assert_eq!(table.column("c").unwrap().values[1], CellValue::Missing);
    }

    #[test]
    fn test_short_rows_padded() {
        let table = csv("a,b,c\n1,2");
        assert_eq!(table.column("c").unwrap().values[0], CellValue::Missing);
    }

    #[test]
    fn test_extra_fields_rejected() {
        let err = parse_csv_str("a,b\n1,2,3,4", b',').unwrap_err();
        assert!(matches!(err, ParseError::RaggedRow { expected: 2, found: 4, .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_mixed_column_keeps_original_text() {
        let table = csv("code\n007\nX1");
        let code = table.column("code").unwrap();
        assert_eq!(code.kind, ColumnKind::Text);
        assert_eq!(code.values[0], CellValue::Text("007".into()));
    }

    #[test]
    fn test_header_only_is_empty_table() {
        let table = csv("a,b\n");
        assert!(table.is_empty());
        assert_eq!(table.column_count(), 2);
    }

    #[test]
    fn test_empty_csv_error() {
        let err = parse_csv_str("", b',').unwrap_err();
        assert!(matches!(err, ParseError::NoHeaders));
    }

    #[test]
    fn test_unique_headers() {
        let headers = unique_headers(vec!["a".into(), "".into(), "a".into(), "a".into()]);
        assert_eq!(headers, vec!["a", "Unnamed: 1", "a.1", "a.2"]);
    }

    #[test]
    fn test_detect_delimiter_semicolon() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), b';');
    }

    #[test]
    fn test_detect_delimiter_comma() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), b',');
    }

    #[test]
    fn test_detect_delimiter_tab() {
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), b'\t');
    }

    #[test]
    fn test_detect_delimiter_single_column() {
        assert_eq!(detect_delimiter("name\nAlice"), b',');
    }

    #[test]
    fn test_auto_delimiter() {
        let options = ParseOptions { delimiter: None };
        let parsed = parse_csv_bytes(b"name;age\nAlice;30\nBob;25", &options).unwrap();

        assert_eq!(parsed.delimiter, Some(';'));
        assert_eq!(parsed.table.row_count(), 2);
        assert_eq!(parsed.table.column_names(), vec!["name", "age"]);
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let parsed = parse_csv_bytes(b"\xEF\xBB\xBFid,v\n1,2", &ParseOptions::default()).unwrap();
        assert_eq!(parsed.table.column_names(), vec!["id", "v"]);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_latin1_label_uses_windows_1252_table() {
        let decoded = decode_content(&[b'p', b'\n', 0xA4, b'5', 0xBD], "iso-8859-1");
        assert_eq!(decoded, "p\n¤5½");
    }

    #[test]
    fn test_short_utf8_is_not_redetected() {
        for (input, header, cell) in [("x\nü", "x", "ü"), ("a\nÉcole", "a", "École")] {
            let parsed = parse_csv_bytes(input.as_bytes(), &ParseOptions::default()).unwrap();

            assert_eq!(parsed.encoding.as_deref(), Some("utf-8"));
            assert_eq!(
                parsed.table.column(header).unwrap().values,
                vec![CellValue::Text(cell.into())]
            );
        }
    }

    #[test]
    fn test_utf8_round_trip_keeps_accents() {
        let text = "ville,prix\nOrléans,3\nZürich,4\n";
        let parsed = parse_csv_bytes(text.as_bytes(), &ParseOptions::default()).unwrap();
        let bytes = crate::export::write_csv(&parsed.table).unwrap();

        assert_eq!(String::from_utf8(bytes).unwrap(), text);
    }

    #[test]
    fn test_windows_1252_file_is_decoded() {
        // "nom,ville\nCafé crème,Orléans\nPâtisserie Hélène,Besançon\nBrûlée,Évreux" in Windows-1252
        let bytes: &[u8] = b"nom,ville\nCaf\xe9 cr\xe8me,Orl\xe9ans\nP\xe2tisserie H\xe9l\xe8ne,Besan\xe7on\nBr\xfbl\xe9e,\xc9vreux\n";
        let parsed = parse_csv_bytes(bytes, &ParseOptions::default()).unwrap();

        assert_eq!(
            parsed.table.column("ville").unwrap().values,
            vec![
                CellValue::Text("Orléans".into()),
                CellValue::Text("Besançon".into()),
                CellValue::Text("Évreux".into()),
            ]
        );
    }

    #[test]
    fn test_whitespace_is_not_missing() {
        let table = csv("a,b\n  ,1\n NA ,2\nNA,3");
        let a = table.column("a").unwrap();

        assert_eq!(a.kind, ColumnKind::Text);
        assert_eq!(
            a.values,
            vec![
                CellValue::Text("  ".into()),
                CellValue::Text(" NA ".into()),
                CellValue::Missing,
            ]
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let file = UploadedFile::new("notes.txt", b"hello".to_vec());
        let err = parse(&file).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat { ref extension } if extension == ".txt"));
    }

    #[test]
    fn test_extension_case_insensitive() {
        let file = UploadedFile::new("DATA.CSV", b"a\n1".to_vec());
        assert_eq!(parse(&file).unwrap().row_count(), 1);
    }
}
