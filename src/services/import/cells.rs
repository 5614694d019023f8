//! Cell-level normalization: date parsing across the encodings seen in the
//! source workbooks, and certificate type classification.

use crate::trainees::certificates::models::{CertificateType, ServiceMethod};
use calamine::Data;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Explicit formats tried after native and serial-number interpretation.
/// Day-first variants come first; the workbooks are mostly dd/MM/yyyy.
const DATE_FORMATS: [&str; 8] = [
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%m-%d-%Y",
    "%Y.%m.%d",
];

/// Plausible spreadsheet serial-day range. Anything outside is treated as a
/// stray number, not a date.
const SERIAL_MIN: f64 = 1.0;
const SERIAL_MAX: f64 = 100_000.0;

/// Days between the spreadsheet epoch (1899-12-30) and the Unix epoch.
const UNIX_EPOCH_SERIAL_OFFSET: f64 = 25569.0;

/// How free-text type indicators are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClassification {
    /// Substring matching, defaulting to Initial. Used for free-text sheets.
    Fuzzy,
    /// Numeric discriminants (1 = Initial, 2 = Recertificate) first, then
    /// substring fallback. Used by the legacy import entry point.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCertificate {
    pub method: ServiceMethod,
    pub certificate_type: CertificateType,
    pub expiry: NaiveDate,
}

/// Why one method slot of a row produced no certificate despite holding data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellIssue {
    TypeWithoutExpiry { method: ServiceMethod },
    InvalidDate { method: ServiceMethod, raw: String },
}

pub fn is_empty_cell(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Text content of a cell, trimmed. Numbers render without a trailing `.0`.
pub fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(serial > SERIAL_MIN && serial < SERIAL_MAX) {
        return None;
    }
    let timestamp_secs = (serial - UNIX_EPOCH_SERIAL_OFFSET) * 86400.0;
    if !timestamp_secs.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let timestamp_int = timestamp_secs as i64;
    DateTime::from_timestamp(timestamp_int, 0).map(|dt| dt.date_naive())
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    // A bare number in the serial range is a spreadsheet date that arrived
    // as text.
    if let Ok(n) = trimmed.parse::<f64>() {
        return serial_to_date(n);
    }

    // Flexible ISO forms first, then the explicit format list.
    if let Ok(date) = trimmed.parse::<NaiveDate>() {
        return Some(date);
    }
    if let Ok(dt) = trimmed.parse::<NaiveDateTime>() {
        return Some(dt.date());
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Convert a raw cell into a calendar date, or `None` when the cell holds
/// nothing date-like. Precedence: native date, serial number, text.
pub fn normalize_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(dt) => serial_to_date(dt.as_f64()),
        Data::DateTimeIso(s) => parse_date_text(s),
        Data::Int(i) => {
            #[allow(clippy::cast_precision_loss)]
            serial_to_date(*i as f64)
        }
        Data::Float(f) => serial_to_date(*f),
        Data::String(s) => parse_date_text(s),
        _ => None,
    }
}

/// Expiry dates are stored as midnight UTC of the parsed calendar date,
/// whatever timezone the source text implied.
pub fn to_midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub fn classify_certificate_type(cell: &Data, mode: TypeClassification) -> CertificateType {
    if mode == TypeClassification::Strict {
        let numeric = match cell {
            Data::Int(i) => Some(*i),
            Data::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Data::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match numeric {
            Some(1) => return CertificateType::Initial,
            Some(2) => return CertificateType::Recertificate,
            _ => {}
        }
    }

    let text = cell_text(cell).unwrap_or_default().to_uppercase();
    if text.contains("RECERT")
        || text.contains("RE-CERT")
        || text == "R"
        || (mode == TypeClassification::Fuzzy && text == "2")
    {
        CertificateType::Recertificate
    } else {
        CertificateType::Initial
    }
}

/// Pull one method's certificate out of its (type, expiry) column pair.
///
/// Both cells empty means the trainee simply holds no certificate for this
/// method. Partially populated pairs yield an issue for diagnostics; the rest
/// of the row keeps processing.
pub fn extract_certificate(
    method: ServiceMethod,
    row: &[Data],
    type_col: usize,
    expiry_col: usize,
    mode: TypeClassification,
) -> Result<Option<ExtractedCertificate>, CellIssue> {
    let type_cell = row.get(type_col).unwrap_or(&Data::Empty);
    let expiry_cell = row.get(expiry_col).unwrap_or(&Data::Empty);

    let type_empty = is_empty_cell(type_cell);
    let expiry_empty = is_empty_cell(expiry_cell);

    if type_empty && expiry_empty {
        return Ok(None);
    }
    if expiry_empty {
        return Err(CellIssue::TypeWithoutExpiry { method });
    }

    let Some(expiry) = normalize_date(expiry_cell) else {
        return Err(CellIssue::InvalidDate {
            method,
            raw: cell_text(expiry_cell).unwrap_or_default(),
        });
    };

    Ok(Some(ExtractedCertificate {
        method,
        certificate_type: classify_certificate_type(type_cell, mode),
        expiry,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::ExcelDateTime;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn native_serial_and_string_forms_agree() {
        // 2023-03-15 is spreadsheet serial day 45000
        let expected = date(2023, 3, 15);
        let native = Data::DateTime(ExcelDateTime::new(
            45000.0,
            calamine::ExcelDateTimeType::DateTime,
            false,
        ));
        assert_eq!(normalize_date(&native), Some(expected));
        assert_eq!(normalize_date(&Data::Float(45000.0)), Some(expected));
        assert_eq!(normalize_date(&Data::Int(45000)), Some(expected));
        assert_eq!(
            normalize_date(&Data::String("45000".to_string())),
            Some(expected)
        );
        assert_eq!(
            normalize_date(&Data::String("15/03/2023".to_string())),
            Some(expected)
        );
        assert_eq!(
            normalize_date(&Data::String("2023-03-15".to_string())),
            Some(expected)
        );
    }

    #[rstest]
    #[case("15/06/2026")]
    #[case("2026-06-15")]
    #[case("15-06-2026")]
    #[case("2026/06/15")]
    #[case("15.06.2026")]
    fn explicit_format_variants_parse(#[case] raw: &str) {
        assert_eq!(
            normalize_date(&Data::String(raw.to_string())),
            Some(date(2026, 6, 15)),
            "failed for {raw}"
        );
    }

    #[test]
    fn single_digit_day_and_month_parse() {
        assert_eq!(
            normalize_date(&Data::String("5/6/2026".to_string())),
            Some(date(2026, 6, 5))
        );
    }

    #[test]
    fn out_of_range_numbers_are_not_dates() {
        assert_eq!(normalize_date(&Data::Int(0)), None);
        assert_eq!(normalize_date(&Data::Int(1)), None);
        assert_eq!(normalize_date(&Data::Float(250_000.0)), None);
        assert_eq!(normalize_date(&Data::String("not a date".to_string())), None);
    }

    #[test]
    fn midnight_utc_anchoring() {
        let anchored = to_midnight_utc(date(2026, 6, 15));
        assert_eq!(anchored.to_rfc3339(), "2026-06-15T00:00:00+00:00");
    }

    #[test]
    fn fuzzy_classification() {
        let cases = [
            ("Recert", CertificateType::Recertificate),
            ("RE-CERTIFICATION", CertificateType::Recertificate),
            ("r", CertificateType::Recertificate),
            ("2", CertificateType::Recertificate),
            ("Initial", CertificateType::Initial),
            ("Issue date", CertificateType::Initial),
            ("", CertificateType::Initial),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                classify_certificate_type(&Data::String(raw.to_string()), TypeClassification::Fuzzy),
                expected,
                "failed for {raw:?}"
            );
        }
    }

    #[test]
    fn strict_classification_uses_numeric_discriminants() {
        assert_eq!(
            classify_certificate_type(&Data::Int(1), TypeClassification::Strict),
            CertificateType::Initial
        );
        assert_eq!(
            classify_certificate_type(&Data::Int(2), TypeClassification::Strict),
            CertificateType::Recertificate
        );
        assert_eq!(
            classify_certificate_type(&Data::String("2".to_string()), TypeClassification::Strict),
            CertificateType::Recertificate
        );
        // substring fallback still applies for text
        assert_eq!(
            classify_certificate_type(
                &Data::String("Recert".to_string()),
                TypeClassification::Strict
            ),
            CertificateType::Recertificate
        );
    }

    #[test]
    fn empty_pair_is_no_certificate() {
        let row = vec![Data::Empty, Data::Empty];
        assert_eq!(
            extract_certificate(
                ServiceMethod::VisualTesting,
                &row,
                0,
                1,
                TypeClassification::Fuzzy
            ),
            Ok(None)
        );
    }

    #[test]
    fn type_without_expiry_is_an_issue() {
        let row = vec![Data::String("Initial".to_string()), Data::Empty];
        assert_eq!(
            extract_certificate(
                ServiceMethod::VisualTesting,
                &row,
                0,
                1,
                TypeClassification::Fuzzy
            ),
            Err(CellIssue::TypeWithoutExpiry {
                method: ServiceMethod::VisualTesting
            })
        );
    }

    #[test]
    fn unparseable_expiry_is_an_issue() {
        let row = vec![
            Data::String("Initial".to_string()),
            Data::String("soon".to_string()),
        ];
        assert_eq!(
            extract_certificate(
                ServiceMethod::VisualTesting,
                &row,
                0,
                1,
                TypeClassification::Fuzzy
            ),
            Err(CellIssue::InvalidDate {
                method: ServiceMethod::VisualTesting,
                raw: "soon".to_string()
            })
        );
    }

    #[test]
    fn expiry_without_type_defaults_to_initial() {
        let row = vec![Data::Empty, Data::String("15/06/2026".to_string())];
        let extracted = extract_certificate(
            ServiceMethod::UltrasonicTesting,
            &row,
            0,
            1,
            TypeClassification::Fuzzy,
        )
        .unwrap()
        .unwrap();
        assert_eq!(extracted.certificate_type, CertificateType::Initial);
        assert_eq!(extracted.expiry, date(2026, 6, 15));
    }
}
