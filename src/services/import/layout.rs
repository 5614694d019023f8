//! Column layout sniffing for uploaded certificate sheets.
//!
//! The registry receives workbooks from several branch offices with no agreed
//! template: header rows drift, columns shift, and some sheets carry Arabic
//! headers. Detection is best-effort sniffing over the first few rows, with a
//! fixed-offset fallback when nothing recognizable is found.

use calamine::Data;

/// Rows inspected for a recognizable header before giving up.
const HEADER_SCAN_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub name_col: usize,
    pub serial_col: Option<usize>,
    /// First method's type column; method k lives at `type + 2k`.
    pub method_type_col: usize,
    /// First method's expiry column; method k lives at `expiry + 2k`.
    pub method_expiry_col: usize,
    pub data_start_row: usize,
}

fn cell_str(cell: Option<&Data>) -> String {
    match cell {
        Some(Data::String(s)) => s.trim().to_uppercase(),
        Some(Data::Int(i)) => i.to_string(),
        Some(Data::Float(f)) => f.to_string(),
        _ => String::new(),
    }
}

fn is_name_header(text: &str) -> bool {
    text.contains("NAME") || text.contains("الاسم")
}

fn is_serial_header(text: &str) -> bool {
    text == "S/N" || text.contains("SERIAL") || text.contains("رقم") || text == "م"
}

fn is_method_type_header(text: &str) -> bool {
    text == "VT" || text.contains("TYPE")
}

/// Locate the name, serial, and first method columns by scanning the first
/// rows for known header tokens. Candidates accumulate across the scanned
/// rows (split headers happen in practice); the scan stops at the row that
/// carries the name header. Falls back to fixed offsets when no header row
/// is recognized.
pub fn detect_layout(rows: &[Vec<Data>]) -> SheetLayout {
    let mut name_col = None;
    let mut serial_col = None;
    let mut type_col = None;

    for (row_index, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        for (col, cell) in row.iter().enumerate() {
            let text = cell_str(Some(cell));
            if text.is_empty() {
                continue;
            }
            if name_col.is_none() && is_name_header(&text) {
                name_col = Some(col);
            } else if serial_col.is_none() && is_serial_header(&text) {
                serial_col = Some(col);
            } else if type_col.is_none() && is_method_type_header(&text) {
                type_col = Some(col);
            }
        }

        if let Some(name_col) = name_col {
            let mut data_start_row = row_index + 1;
            // Some sheets repeat a sub-header row ("Type" / "Expiry") under
            // the main header. Its first cell is blank or contains TYPE.
            if let Some(next_row) = rows.get(data_start_row) {
                let first = cell_str(next_row.first());
                if first.is_empty() || first.contains("TYPE") {
                    data_start_row += 1;
                }
            }

            let (method_type_col, method_expiry_col) = match type_col {
                Some(tc) => (tc, tc + 1),
                None => (name_col + 1, name_col + 2),
            };

            return SheetLayout {
                name_col,
                serial_col,
                method_type_col,
                method_expiry_col,
                data_start_row,
            };
        }
    }

    fallback_layout(rows)
}

/// No header row found. Sample the third row (index 2) and guess from its
/// shape: a numeric first cell means serial-first, otherwise name-first.
fn fallback_layout(rows: &[Vec<Data>]) -> SheetLayout {
    let first_cell = rows.get(2).and_then(|row| row.first());
    let looks_numeric = match first_cell {
        Some(Data::Int(_)) => true,
        Some(Data::Float(f)) => f.fract() == 0.0,
        Some(Data::String(s)) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    };

    if looks_numeric {
        SheetLayout {
            name_col: 1,
            serial_col: Some(0),
            method_type_col: 2,
            method_expiry_col: 3,
            data_start_row: 2,
        }
    } else {
        SheetLayout {
            name_col: 0,
            serial_col: None,
            method_type_col: 1,
            method_expiry_col: 2,
            data_start_row: 2,
        }
    }
}
