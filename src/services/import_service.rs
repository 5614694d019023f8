//! Import orchestration: load the workbook, sniff the layout, walk the rows,
//! and assemble the report returned to the caller.

use anyhow::{Result, anyhow};
use calamine::Data;
use chrono::{NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::import::cells::TypeClassification;
use super::import::layout::detect_layout;
use super::import::reconcile::Reconciler;
use super::import::row::{RowOutcome, extract_row};

/// Errors beyond this count are dropped from the report; `total_errors`
/// still carries the full count.
const ERROR_CAP: usize = 50;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub message: String,
    pub imported_trainees: u64,
    pub updated_trainees: u64,
    pub imported_certificates: u64,
    pub analysis: ImportAnalysis,
    pub detailed_summary: Vec<SerialSummary>,
    pub errors: Vec<String>,
    pub total_errors: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportAnalysis {
    pub total_rows_in_file: u64,
    pub rows_with_data: u64,
    pub empty_rows: u64,
    pub unique_trainees_in_file: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SerialSummary {
    pub serial_number: String,
    pub name: String,
    pub status: String,
    pub rows: Vec<usize>,
}

/// Load the first worksheet of an uploaded workbook as a rectangular grid.
/// Handles both .xlsx and .xls containers.
pub fn load_excel(file_data: Vec<u8>) -> Result<Vec<Vec<Data>>> {
    use calamine::{Reader, open_workbook_auto_from_rs};
    use std::io::Cursor;

    let cursor = Cursor::new(file_data);
    let mut workbook = open_workbook_auto_from_rs(cursor)?;
    let sheet_name = workbook
        .sheet_names()
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No worksheets"))?;
    let worksheet = workbook.worksheet_range(&sheet_name)?;
    Ok(worksheet.rows().map(<[Data]>::to_vec).collect())
}

pub struct ImportService {
    db: DatabaseConnection,
}

impl ImportService {
    #[must_use]
    pub fn new(db: &DatabaseConnection) -> Self {
        Self { db: db.clone() }
    }

    /// Parse and reconcile an uploaded workbook. Only an unreadable file or
    /// a workbook without sheets fails hard; row-level problems end up in
    /// the report.
    pub async fn import_excel(
        &self,
        file_data: Vec<u8>,
        mode: TypeClassification,
    ) -> Result<ImportReport> {
        let rows = load_excel(file_data)?;
        self.run(&rows, mode, Utc::now().date_naive()).await
    }

    /// Core import over an in-memory grid. `today` feeds synthetic serial
    /// generation and is injected for deterministic tests.
    pub async fn run(
        &self,
        rows: &[Vec<Data>],
        mode: TypeClassification,
        today: NaiveDate,
    ) -> Result<ImportReport> {
        let layout = detect_layout(rows);
        tracing::info!(?layout, total_rows = rows.len(), "starting import");

        let mut reconciler = Reconciler::new();
        let mut rows_with_data: u64 = 0;
        let mut empty_rows: u64 = 0;

        for (index, row) in rows.iter().enumerate().skip(layout.data_start_row) {
            let row_number = index + 1;
            match extract_row(row, index, &layout, mode, today) {
                RowOutcome::Empty => empty_rows += 1,
                RowOutcome::Data(data) => {
                    rows_with_data += 1;
                    reconciler.process_row(&self.db, row_number, data).await;
                }
            }
        }

        let unique_trainees = reconciler.unique_serials() as u64;
        let (entries, counters, errors) = reconciler.into_parts();

        let total_errors = errors.len() as u64;
        let message = if total_errors > 0 {
            format!("اكتملت المعالجة مع وجود {total_errors} خطأ")
        } else if counters.imported_trainees == 0 && counters.updated_trainees == 0 {
            "لم يتم استيراد أي بيانات من الملف".to_string()
        } else {
            "اكتملت عملية المعالجة بنجاح".to_string()
        };

        let report = ImportReport {
            message,
            imported_trainees: counters.imported_trainees,
            updated_trainees: counters.updated_trainees,
            imported_certificates: counters.imported_certificates,
            analysis: ImportAnalysis {
                total_rows_in_file: rows.len() as u64,
                rows_with_data,
                empty_rows,
                unique_trainees_in_file: unique_trainees,
            },
            detailed_summary: entries
                .into_iter()
                .map(|entry| SerialSummary {
                    serial_number: entry.serial_number,
                    name: entry.name,
                    status: entry.status.as_str().to_string(),
                    rows: entry.rows,
                })
                .collect(),
            errors: errors
                .iter()
                .take(ERROR_CAP)
                .map(super::import::reconcile::RowError::render)
                .collect(),
            total_errors,
        };

        tracing::info!(
            imported = report.imported_trainees,
            updated = report.updated_trainees,
            certificates = report.imported_certificates,
            errors = report.total_errors,
            "import finished"
        );

        Ok(report)
    }
}
