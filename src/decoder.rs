//! Tabular decoding: raw upload bytes into [`RawRow`]s.
//!
//! No semantic interpretation happens here. CSV input is read record by record
//! through `csv::Reader`; spreadsheets are read through `calamine`, first sheet only.

use crate::config::PipelineConfig;
use crate::error::{PnlError, Result};
use crate::schema::{CellValue, ColumnKey, DecodeMode, RawRow};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDateTime;
use log::{debug, warn};
use std::io::Cursor;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `.xlsx` / `.xls` workbooks.
    Spreadsheet,
    /// Comma-delimited text.
    Csv,
}

impl DocumentFormat {
    /// Picks a format from the MIME type first and the filename extension second.
    pub fn detect(mime: &str, filename: &str) -> Option<Self> {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("sheet") {
            return Some(Self::Spreadsheet);
        }
        if mime.contains("csv") {
            return Some(Self::Csv);
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("xlsx") | Some("xls") => Some(Self::Spreadsheet),
            Some("csv") => Some(Self::Csv),
            _ => None,
        }
    }
}

pub fn check_size(size: usize, limit: usize) -> Result<()> {
    if size > limit {
        return Err(PnlError::SizeExceeded { size, limit });
    }
    Ok(())
}

/// Decodes an upload into rows.
///
/// In [`DecodeMode::RowAsRecord`] the first row is consumed as the header and
/// every later row is keyed by header label (a blank header cell keys its column
/// by index). In [`DecodeMode::RowAsArray`] every row is keyed by 0-based column
/// index. Blank rows are kept in both modes.
pub fn decode(
    bytes: &[u8],
    mime: &str,
    filename: &str,
    mode: DecodeMode,
    config: &PipelineConfig,
) -> Result<Vec<RawRow>> {
    check_size(bytes.len(), config.max_file_size)?;

    let format =
        DocumentFormat::detect(mime, filename).ok_or_else(|| PnlError::UnsupportedFormat {
            mime: mime.to_string(),
            filename: filename.to_string(),
        })?;

    debug!(
        "Decoding '{}' ({} bytes) as {:?} in {:?} mode",
        filename,
        bytes.len(),
        format,
        mode
    );

    let rows = match format {
        DocumentFormat::Csv => assemble_rows(csv_grid(bytes), mode),
        DocumentFormat::Spreadsheet => assemble_rows(first_sheet_grid(bytes)?.into_iter(), mode),
    };

    if rows.is_empty() {
        return Err(PnlError::EmptyDocument);
    }

    Ok(rows)
}

fn csv_grid(bytes: &[u8]) -> impl Iterator<Item = Vec<CellValue>> + '_ {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    reader
        .into_byte_records()
        .enumerate()
        .filter_map(|(line, record)| match record {
            Ok(record) => Some(
                record
                    .iter()
                    .map(|field| CellValue::text(String::from_utf8_lossy(field)))
                    .collect(),
            ),
            Err(e) => {
                warn!("Skipping malformed CSV record {}: {}", line + 1, e);
                None
            }
        })
}

fn first_sheet_grid(bytes: &[u8]) -> Result<Vec<Vec<CellValue>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| PnlError::Spreadsheet(e.to_string()))?;

    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(PnlError::EmptyDocument)?;

    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| PnlError::Spreadsheet(e.to_string()))?;

    // The used range may start past column A; keep indices absolute.
    let start_col = range.start().map(|(_, col)| col as usize).unwrap_or(0);

    Ok(range
        .rows()
        .map(|row| {
            let mut values = vec![CellValue::Empty; start_col];
            values.extend(row.iter().map(cell_from_data));
            values
        })
        .collect())
}

fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Int(v) => CellValue::Number(*v as f64),
        Data::Float(v) => CellValue::Number(*v),
        Data::String(v) => CellValue::text(v.as_str()),
        Data::Bool(v) => CellValue::Text(v.to_string()),
        Data::DateTime(v) => match v.as_datetime() {
            Some(dt) => CellValue::Text(format_date(dt)),
            None => CellValue::Number(v.as_f64()),
        },
        Data::DateTimeIso(v) | Data::DurationIso(v) => CellValue::text(v.as_str()),
        Data::Error(_) | Data::Empty => CellValue::Empty,
    }
}

fn format_date(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d").to_string()
}

fn assemble_rows<I>(mut grid: I, mode: DecodeMode) -> Vec<RawRow>
where
    I: Iterator<Item = Vec<CellValue>>,
{
    match mode {
        DecodeMode::RowAsArray => grid.map(RawRow::from_values).collect(),
        DecodeMode::RowAsRecord => {
            let Some(header) = grid.next() else {
                return Vec::new();
            };

            let keys: Vec<ColumnKey> = header
                .iter()
                .enumerate()
                .map(|(idx, cell)| {
                    let label = cell.as_text();
                    if label.is_empty() {
                        ColumnKey::Index(idx)
                    } else {
                        ColumnKey::Label(label)
                    }
                })
                .collect();

            grid.map(|values| {
                RawRow::new(
                    values
                        .into_iter()
                        .enumerate()
                        .map(|(idx, value)| {
                            let key = keys.get(idx).cloned().unwrap_or(ColumnKey::Index(idx));
                            (key, value)
                        })
                        .collect(),
                )
            })
            .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

    fn decode_csv(text: &str, mode: DecodeMode) -> Result<Vec<RawRow>> {
        decode(
            text.as_bytes(),
            "text/csv",
            "upload.csv",
            mode,
            &PipelineConfig::default(),
        )
    }

    #[test]
    fn test_format_detection_prefers_mime() {
        assert_eq!(
            DocumentFormat::detect(XLSX_MIME, "data.csv"),
            Some(DocumentFormat::Spreadsheet)
        );
        assert_eq!(
            DocumentFormat::detect("text/csv", "book.xlsx"),
            Some(DocumentFormat::Csv)
        );
    }

    #[test]
    fn test_format_detection_falls_back_to_extension() {
        assert_eq!(
            DocumentFormat::detect("application/vnd.ms-excel", "legacy.XLS"),
            Some(DocumentFormat::Spreadsheet)
        );
        assert_eq!(
            DocumentFormat::detect("application/octet-stream", "export.csv"),
            Some(DocumentFormat::Csv)
        );
        assert_eq!(
            DocumentFormat::detect("application/pdf", "report.pdf"),
            None
        );
    }

    #[test]
    fn test_unsupported_format() {
        let result = decode(
            b"%PDF-1.4",
            "application/pdf",
            "report.pdf",
            DecodeMode::RowAsRecord,
            &PipelineConfig::default(),
        );
        assert!(matches!(result, Err(PnlError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_size_ceiling_checked_before_decoding() {
        let config = PipelineConfig {
            max_file_size: 8,
            ..PipelineConfig::default()
        };
        // Unsupported format too, but the size check must win.
        let result = decode(
            b"0123456789",
            "application/pdf",
            "report.pdf",
            DecodeMode::RowAsRecord,
            &config,
        );
        assert!(matches!(
            result,
            Err(PnlError::SizeExceeded { size: 10, limit: 8 })
        ));
    }

    #[test]
    fn test_csv_row_as_record() {
        let rows = decode_csv(
            "Period,Revenue,COGS\nJan,\"$1,000\",400\nFeb,1200,\n",
            DecodeMode::RowAsRecord,
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].get_label("Revenue"),
            Some(&CellValue::Text("$1,000".to_string()))
        );
        assert_eq!(rows[1].get_label("COGS"), Some(&CellValue::Empty));
        assert_eq!(
            rows[1].get_label("Period"),
            Some(&CellValue::Text("Feb".to_string()))
        );
    }

    #[test]
    fn test_csv_blank_header_and_ragged_rows_keyed_by_index() {
        let rows = decode_csv("Revenue,,COGS\n10,x,4,extra\n", DecodeMode::RowAsRecord).unwrap();
        let row = &rows[0];
        assert_eq!(
            row.get(&ColumnKey::Index(1)),
            Some(&CellValue::Text("x".to_string()))
        );
        assert_eq!(
            row.get(&ColumnKey::Index(3)),
            Some(&CellValue::Text("extra".to_string()))
        );
    }

    #[test]
    fn test_csv_row_as_array_keeps_header_row() {
        let rows = decode_csv("Type,Category,Amount\nIncome,Sales,500\n", DecodeMode::RowAsArray)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].get_index(2),
            Some(&CellValue::Text("Amount".to_string()))
        );
        assert_eq!(
            rows[1].get_index(0),
            Some(&CellValue::Text("Income".to_string()))
        );
    }

    #[test]
    fn test_header_only_csv_is_empty_document() {
        let result = decode_csv("Revenue,COGS,Operating Expenses\n", DecodeMode::RowAsRecord);
        assert!(matches!(result, Err(PnlError::EmptyDocument)));

        let result = decode_csv("", DecodeMode::RowAsArray);
        assert!(matches!(result, Err(PnlError::EmptyDocument)));
    }

    #[test]
    fn test_corrupt_spreadsheet_reports_decoding_error() {
        let result = decode(
            b"definitely not a workbook",
            XLSX_MIME,
            "pnl.xlsx",
            DecodeMode::RowAsRecord,
            &PipelineConfig::default(),
        );
        assert!(matches!(result, Err(PnlError::Spreadsheet(_))));
    }

    // Data on the first sheet starts at column B; the second sheet is a decoy.
    fn two_sheet_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");

        let sheet = workbook.add_worksheet();
        sheet.set_name("PnL").unwrap();
        for (col, label) in ["Month", "Revenue", "COGS", "Operating Expenses"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, col as u16 + 1, *label).unwrap();
        }
        let month_end = ExcelDateTime::from_ymd(2024, 1, 31).unwrap();
        sheet
            .write_datetime_with_format(1, 1, &month_end, &date_format)
            .unwrap();
        sheet.write_number(1, 2, 100_000.0).unwrap();
        sheet.write_number(1, 3, 40_000.0).unwrap();
        sheet.write_number(1, 4, 20_000.0).unwrap();

        let decoy = workbook.add_worksheet();
        decoy.set_name("Notes").unwrap();
        decoy.write_string(0, 0, "Revenue").unwrap();
        decoy.write_number(1, 0, 999.0).unwrap();

        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_workbook_first_sheet_with_absolute_columns() {
        let bytes = two_sheet_workbook();
        let rows = decode(
            &bytes,
            XLSX_MIME,
            "pnl.xlsx",
            DecodeMode::RowAsArray,
            &PipelineConfig::default(),
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_index(0), Some(&CellValue::Empty));
        assert_eq!(
            rows[0].get_index(1),
            Some(&CellValue::Text("Month".to_string()))
        );
        assert_eq!(
            rows[1].get_index(1),
            Some(&CellValue::Text("2024-01-31".to_string()))
        );
        assert_eq!(rows[1].get_index(2), Some(&CellValue::Number(100_000.0)));
        assert!(rows
            .iter()
            .flat_map(|row| row.iter())
            .all(|(_, cell)| cell != &CellValue::Number(999.0)));
    }

    #[test]
    fn test_workbook_row_as_record() {
        let bytes = two_sheet_workbook();
        let rows = decode(
            &bytes,
            XLSX_MIME,
            "pnl.xlsx",
            DecodeMode::RowAsRecord,
            &PipelineConfig::default(),
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get_label("Month"),
            Some(&CellValue::Text("2024-01-31".to_string()))
        );
        assert_eq!(
            rows[0].get_label("Operating Expenses"),
            Some(&CellValue::Number(20_000.0))
        );
        assert_eq!(rows[0].get(&ColumnKey::Index(0)), Some(&CellValue::Empty));
    }

    #[test]
    fn test_spreadsheet_cell_conversion() {
        assert_eq!(cell_from_data(&Data::Int(42)), CellValue::Number(42.0));
        assert_eq!(cell_from_data(&Data::Float(1.25)), CellValue::Number(1.25));
        assert_eq!(
            cell_from_data(&Data::String("Rent".to_string())),
            CellValue::Text("Rent".to_string())
        );
        assert_eq!(
            cell_from_data(&Data::String("  ".to_string())),
            CellValue::Empty
        );
        assert_eq!(
            cell_from_data(&Data::Error(CellErrorType::Div0)),
            CellValue::Empty
        );
        assert_eq!(cell_from_data(&Data::Empty), CellValue::Empty);
    }
}
