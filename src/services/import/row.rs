//! Per-row extraction of trainee identity and certificates.

use calamine::Data;
use chrono::NaiveDate;

use super::cells::{
    self, ExtractedCertificate, TypeClassification, cell_text, is_empty_cell,
};
use super::layout::SheetLayout;
use crate::trainees::certificates::models::ServiceMethod;

/// Columns checked by the empty-row test. Sheets occasionally carry stray
/// formatting far to the right; anything past this window is ignored.
const EMPTY_CHECK_COLS: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowData {
    pub serial_number: String,
    pub person_name: String,
    pub certificates: Vec<ExtractedCertificate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Nothing usable: blank, nameless, or no extractable certificates.
    /// Counted as an empty row, never as an error.
    Empty,
    Data(RowData),
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Serial for rows that carry none. Unique within one import run, not across
/// days.
fn synthetic_serial(today: NaiveDate, row_index: usize) -> String {
    format!("AZ-{}-{:04}", today.format("%Y%m%d"), row_index + 1)
}

/// Extract one data row. `row_index` is the zero-based sheet index; `today`
/// feeds synthetic serial generation and is injected so runs are
/// deterministic under test.
pub fn extract_row(
    row: &[Data],
    row_index: usize,
    layout: &SheetLayout,
    mode: TypeClassification,
    today: NaiveDate,
) -> RowOutcome {
    if row
        .iter()
        .take(EMPTY_CHECK_COLS)
        .all(is_empty_cell)
    {
        return RowOutcome::Empty;
    }

    let person_name = row
        .get(layout.name_col)
        .and_then(cell_text)
        .map(|name| collapse_whitespace(&name))
        .unwrap_or_default();
    if person_name.is_empty() {
        // Data without a name contributes nothing usable.
        return RowOutcome::Empty;
    }

    let serial_number = layout
        .serial_col
        .and_then(|col| row.get(col))
        .and_then(cell_text)
        .unwrap_or_else(|| synthetic_serial(today, row_index));

    let mut certificates = Vec::new();
    for (k, method) in ServiceMethod::ALL.into_iter().enumerate() {
        let type_col = layout.method_type_col + 2 * k;
        let expiry_col = layout.method_expiry_col + 2 * k;
        match cells::extract_certificate(method, row, type_col, expiry_col, mode) {
            Ok(Some(certificate)) => certificates.push(certificate),
            Ok(None) => {}
            Err(issue) => {
                tracing::debug!(row = row_index + 1, ?issue, "dropped method cell pair");
            }
        }
    }

    if certificates.is_empty() {
        return RowOutcome::Empty;
    }

    RowOutcome::Data(RowData {
        serial_number,
        person_name,
        certificates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainees::certificates::models::CertificateType;

    fn s(text: &str) -> Data {
        Data::String(text.to_string())
    }

    fn layout() -> SheetLayout {
        SheetLayout {
            name_col: 1,
            serial_col: Some(0),
            method_type_col: 2,
            method_expiry_col: 3,
            data_start_row: 1,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()
    }

    #[test]
    fn blank_row_is_empty() {
        let row = vec![Data::Empty, s("   "), Data::Empty];
        assert_eq!(
            extract_row(&row, 5, &layout(), TypeClassification::Fuzzy, today()),
            RowOutcome::Empty
        );
    }

    #[test]
    fn nameless_row_is_empty() {
        let row = vec![s("1001"), s(""), s("Initial"), s("15/06/2026")];
        assert_eq!(
            extract_row(&row, 5, &layout(), TypeClassification::Fuzzy, today()),
            RowOutcome::Empty
        );
    }

    #[test]
    fn row_without_certificates_is_empty() {
        let row = vec![s("1001"), s("John Smith")];
        assert_eq!(
            extract_row(&row, 5, &layout(), TypeClassification::Fuzzy, today()),
            RowOutcome::Empty
        );
    }

    #[test]
    fn name_whitespace_is_collapsed() {
        let row = vec![s("1001"), s("  John   Smith "), s("Initial"), s("15/06/2026")];
        let RowOutcome::Data(data) =
            extract_row(&row, 0, &layout(), TypeClassification::Fuzzy, today())
        else {
            panic!("expected data row");
        };
        assert_eq!(data.person_name, "John Smith");
        assert_eq!(data.serial_number, "1001");
    }

    #[test]
    fn missing_serial_gets_synthetic_one() {
        let row = vec![Data::Empty, s("John Smith"), s("Initial"), s("15/06/2026")];
        let RowOutcome::Data(data) =
            extract_row(&row, 7, &layout(), TypeClassification::Fuzzy, today())
        else {
            panic!("expected data row");
        };
        assert_eq!(data.serial_number, "AZ-20260110-0008");
    }

    #[test]
    fn methods_read_from_offset_column_pairs() {
        // VT pair at (2,3), PT at (4,5), MT at (6,7)
        let row = vec![
            s("1001"),
            s("John Smith"),
            s("Initial"),
            s("15/06/2026"),
            s("Recert"),
            s("20/07/2027"),
            Data::Empty,
            Data::Empty,
            s("Initial"),
            s("bad date"),
        ];
        let RowOutcome::Data(data) =
            extract_row(&row, 0, &layout(), TypeClassification::Fuzzy, today())
        else {
            panic!("expected data row");
        };
        assert_eq!(data.certificates.len(), 2);
        assert_eq!(data.certificates[0].method, ServiceMethod::VisualTesting);
        assert_eq!(data.certificates[0].certificate_type, CertificateType::Initial);
        assert_eq!(
            data.certificates[1].method,
            ServiceMethod::LiquidPenetrantTesting
        );
        assert_eq!(
            data.certificates[1].certificate_type,
            CertificateType::Recertificate
        );
    }
}
