//! Reconciliation of extracted rows against the trainee registry.
//!
//! Merge policy is newer-wins: an existing certificate's type and expiry are
//! replaced only when the incoming expiry is strictly later, so re-importing
//! a stale file never regresses current data. Person names are
//! last-write-wins across the file.

use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, ModelTrait, QueryFilter, Set, TransactionTrait,
};
use std::collections::HashMap;
use uuid::Uuid;

use super::cells::to_midnight_utc;
use super::row::RowData;
use crate::trainees::certificates::models as certificates;
use crate::trainees::models as trainees;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    New,
    Update,
    DuplicateInFile,
    FailedToSave,
}

impl RowStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RowStatus::New => "New",
            RowStatus::Update => "Update",
            RowStatus::DuplicateInFile => "Update (Duplicate in file)",
            RowStatus::FailedToSave => "Failed to save",
        }
    }
}

/// Per-serial bookkeeping for the import report.
#[derive(Debug, Clone)]
pub struct SummaryEntry {
    pub serial_number: String,
    pub name: String,
    pub status: RowStatus,
    /// 1-based sheet rows that touched this serial.
    pub rows: Vec<usize>,
}

/// A failed row with its cause chain, rendered to text only at the
/// reporting boundary.
#[derive(Debug, Clone)]
pub struct RowError {
    pub row: usize,
    pub causes: Vec<String>,
}

impl RowError {
    #[must_use]
    pub fn render(&self) -> String {
        format!("صف {}: {}", self.row, self.causes.join(" -> "))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    pub imported_trainees: u64,
    pub updated_trainees: u64,
    pub imported_certificates: u64,
}

struct Applied {
    created: bool,
    certificates_added: u64,
}

/// Run-local reconciliation state. One instance per import; never shared
/// across requests.
pub struct Reconciler {
    entries: HashMap<String, SummaryEntry>,
    counters: Counters,
    errors: Vec<RowError>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            counters: Counters::default(),
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn unique_serials(&self) -> usize {
        self.entries.len()
    }

    /// Reconcile one extracted row. Persistence failures are recorded and
    /// the run continues; one row's failure never aborts the import.
    pub async fn process_row(&mut self, db: &DatabaseConnection, row_number: usize, data: RowData) {
        let seen_before = self.entries.contains_key(&data.serial_number);

        let status = match apply(db, &data).await {
            Ok(applied) => {
                self.counters.imported_certificates += applied.certificates_added;
                if applied.created {
                    self.counters.imported_trainees += 1;
                    RowStatus::New
                } else {
                    if !seen_before {
                        self.counters.updated_trainees += 1;
                    }
                    if seen_before {
                        RowStatus::DuplicateInFile
                    } else {
                        RowStatus::Update
                    }
                }
            }
            Err(err) => {
                let causes: Vec<String> = err.chain().map(ToString::to_string).collect();
                tracing::warn!(row = row_number, serial = %data.serial_number, error = %err, "row failed to save");
                self.errors.push(RowError {
                    row: row_number,
                    causes,
                });
                RowStatus::FailedToSave
            }
        };

        let entry = self
            .entries
            .entry(data.serial_number.clone())
            .or_insert_with(|| SummaryEntry {
                serial_number: data.serial_number.clone(),
                name: data.person_name.clone(),
                status,
                rows: Vec::new(),
            });
        entry.name = data.person_name.clone();
        entry.status = status;
        entry.rows.push(row_number);
    }

    /// Summary entries sorted by first occurring row, plus counters and the
    /// accumulated errors.
    #[must_use]
    pub fn into_parts(self) -> (Vec<SummaryEntry>, Counters, Vec<RowError>) {
        let mut entries: Vec<SummaryEntry> = self.entries.into_values().collect();
        entries.sort_by_key(|entry| entry.rows.first().copied().unwrap_or(usize::MAX));
        (entries, self.counters, self.errors)
    }
}

/// Persist one row inside a transaction: merge into the existing trainee by
/// serial number, or create trainee + certificates atomically.
async fn apply(db: &DatabaseConnection, data: &RowData) -> Result<Applied> {
    let txn = db
        .begin()
        .await
        .context("فشل بدء المعاملة")?;

    let existing = trainees::Entity::find()
        .filter(trainees::Column::SerialNumber.eq(&data.serial_number))
        .one(&txn)
        .await
        .with_context(|| format!("فشل البحث عن الرقم التسلسلي {}", data.serial_number))?;

    let applied = match existing {
        Some(trainee) => merge_into_existing(&txn, trainee, data).await?,
        None => create_with_certificates(&txn, data).await?,
    };

    txn.commit().await.context("فشل إتمام المعاملة")?;
    Ok(applied)
}

async fn merge_into_existing(
    txn: &DatabaseTransaction,
    trainee: trainees::Model,
    data: &RowData,
) -> Result<Applied> {
    let trainee_id = trainee.id;
    let existing_certificates = trainee
        .find_related(certificates::Entity)
        .all(txn)
        .await
        .context("فشل تحميل الشهادات الحالية")?;

    let mut active = trainee.into_active_model();
    active.person_name = Set(data.person_name.clone());
    active.last_updated = Set(Utc::now());
    active
        .update(txn)
        .await
        .with_context(|| format!("فشل تحديث بيانات المتدرب {}", data.serial_number))?;

    let mut certificates_added = 0;
    for incoming in &data.certificates {
        let incoming_expiry = to_midnight_utc(incoming.expiry);
        match existing_certificates
            .iter()
            .find(|certificate| certificate.service_method == incoming.method)
        {
            Some(current) => {
                // Newer-wins: stale files never overwrite a later expiry.
                if incoming_expiry > current.expiry_date {
                    let mut active = current.clone().into_active_model();
                    active.certificate_type = Set(incoming.certificate_type);
                    active.expiry_date = Set(incoming_expiry);
                    active.last_updated = Set(Utc::now());
                    active.update(txn).await.with_context(|| {
                        format!("فشل تحديث شهادة {}", incoming.method.code())
                    })?;
                }
            }
            None => {
                insert_certificate(txn, trainee_id, incoming).await?;
                certificates_added += 1;
            }
        }
    }

    Ok(Applied {
        created: false,
        certificates_added,
    })
}

async fn create_with_certificates(txn: &DatabaseTransaction, data: &RowData) -> Result<Applied> {
    let now = Utc::now();
    let trainee = trainees::ActiveModel {
        id: Set(Uuid::new_v4()),
        serial_number: Set(data.serial_number.clone()),
        person_name: Set(data.person_name.clone()),
        country: Set(None),
        state: Set(None),
        street_address: Set(None),
        created_at: Set(now),
        last_updated: Set(now),
    };
    let trainee = trainee
        .insert(txn)
        .await
        .with_context(|| format!("فشل إنشاء المتدرب {}", data.serial_number))?;

    let mut certificates_added = 0;
    for incoming in &data.certificates {
        insert_certificate(txn, trainee.id, incoming).await?;
        certificates_added += 1;
    }

    Ok(Applied {
        created: true,
        certificates_added,
    })
}

async fn insert_certificate(
    txn: &DatabaseTransaction,
    trainee_id: Uuid,
    incoming: &super::cells::ExtractedCertificate,
) -> Result<()> {
    let now = Utc::now();
    let certificate = certificates::ActiveModel {
        id: Set(Uuid::new_v4()),
        trainee_id: Set(trainee_id),
        service_method: Set(incoming.method),
        certificate_type: Set(incoming.certificate_type),
        expiry_date: Set(to_midnight_utc(incoming.expiry)),
        created_at: Set(now),
        last_updated: Set(now),
    };
    certificate
        .insert(txn)
        .await
        .with_context(|| format!("فشل حفظ شهادة {}", incoming.method.code()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_helpers::setup_test_db;
    use crate::services::import::cells::ExtractedCertificate;
    use crate::trainees::certificates::models::{CertificateType, ServiceMethod};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> chrono::NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(serial: &str, name: &str, certs: Vec<ExtractedCertificate>) -> RowData {
        RowData {
            serial_number: serial.to_string(),
            person_name: name.to_string(),
            certificates: certs,
        }
    }

    fn vt(expiry: chrono::NaiveDate) -> ExtractedCertificate {
        ExtractedCertificate {
            method: ServiceMethod::VisualTesting,
            certificate_type: CertificateType::Initial,
            expiry,
        }
    }

    async fn certificates_of(
        db: &sea_orm::DatabaseConnection,
        serial: &str,
    ) -> Vec<certificates::Model> {
        let trainee = trainees::Entity::find()
            .filter(trainees::Column::SerialNumber.eq(serial))
            .one(db)
            .await
            .unwrap()
            .expect("trainee should exist");
        trainee
            .find_related(certificates::Entity)
            .all(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn creates_trainee_with_certificates() {
        let db = setup_test_db().await;
        let mut reconciler = Reconciler::new();

        reconciler
            .process_row(&db, 2, row("1001", "John Smith", vec![vt(date(2026, 6, 15))]))
            .await;

        let (entries, counters, errors) = reconciler.into_parts();
        assert!(errors.is_empty());
        assert_eq!(counters.imported_trainees, 1);
        assert_eq!(counters.updated_trainees, 0);
        assert_eq!(counters.imported_certificates, 1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, RowStatus::New);
        assert_eq!(entries[0].rows, vec![2]);

        let certs = certificates_of(&db, "1001").await;
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].service_method, ServiceMethod::VisualTesting);
    }

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let db = setup_test_db().await;

        let mut first = Reconciler::new();
        first
            .process_row(&db, 2, row("1001", "John Smith", vec![vt(date(2026, 6, 15))]))
            .await;

        let mut second = Reconciler::new();
        second
            .process_row(&db, 2, row("1001", "John Smith", vec![vt(date(2026, 6, 15))]))
            .await;

        let (entries, counters, _) = second.into_parts();
        assert_eq!(counters.imported_trainees, 0);
        assert_eq!(counters.updated_trainees, 1);
        assert_eq!(counters.imported_certificates, 0);
        assert_eq!(entries[0].status, RowStatus::Update);

        let certs = certificates_of(&db, "1001").await;
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].expiry_date, to_midnight_utc(date(2026, 6, 15)));
    }

    #[tokio::test]
    async fn same_serial_twice_in_one_run_is_duplicate_in_file() {
        let db = setup_test_db().await;
        let mut reconciler = Reconciler::new();

        reconciler
            .process_row(&db, 2, row("1001", "John Smith", vec![vt(date(2026, 6, 15))]))
            .await;
        reconciler
            .process_row(&db, 3, row("1001", "John A. Smith", vec![vt(date(2026, 6, 15))]))
            .await;

        let (entries, counters, _) = reconciler.into_parts();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, RowStatus::DuplicateInFile);
        assert_eq!(entries[0].rows, vec![2, 3]);
        // name is last-write-wins
        assert_eq!(entries[0].name, "John A. Smith");
        assert_eq!(counters.imported_trainees, 1);
        assert_eq!(counters.updated_trainees, 0);
    }

    #[tokio::test]
    async fn merge_keeps_newer_expiry() {
        let db = setup_test_db().await;

        let mut first = Reconciler::new();
        first
            .process_row(&db, 2, row("1001", "John", vec![vt(date(2027, 1, 1))]))
            .await;

        // stale re-import with an older expiry
        let mut second = Reconciler::new();
        let mut stale = vt(date(2025, 1, 1));
        stale.certificate_type = CertificateType::Recertificate;
        second.process_row(&db, 2, row("1001", "John", vec![stale])).await;

        let certs = certificates_of(&db, "1001").await;
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].expiry_date, to_midnight_utc(date(2027, 1, 1)));
        assert_eq!(certs[0].certificate_type, CertificateType::Initial);

        // newer expiry does replace type and date
        let mut third = Reconciler::new();
        let mut renewal = vt(date(2028, 1, 1));
        renewal.certificate_type = CertificateType::Recertificate;
        third.process_row(&db, 2, row("1001", "John", vec![renewal])).await;

        let certs = certificates_of(&db, "1001").await;
        assert_eq!(certs[0].expiry_date, to_midnight_utc(date(2028, 1, 1)));
        assert_eq!(certs[0].certificate_type, CertificateType::Recertificate);
    }

    #[tokio::test]
    async fn second_file_adds_missing_method_without_touching_first() {
        let db = setup_test_db().await;

        let mut first = Reconciler::new();
        first
            .process_row(&db, 2, row("1001", "John Smith", vec![vt(date(2026, 6, 15))]))
            .await;

        let mut second = Reconciler::new();
        second
            .process_row(
                &db,
                2,
                row(
                    "1001",
                    "John Smith",
                    vec![ExtractedCertificate {
                        method: ServiceMethod::LiquidPenetrantTesting,
                        certificate_type: CertificateType::Recertificate,
                        expiry: date(2027, 7, 20),
                    }],
                ),
            )
            .await;

        let (entries, counters, _) = second.into_parts();
        assert_eq!(entries[0].status, RowStatus::Update);
        assert_eq!(counters.imported_certificates, 1);

        let mut certs = certificates_of(&db, "1001").await;
        certs.sort_by_key(|c| c.service_method.code());
        assert_eq!(certs.len(), 2);
        let pt = certs
            .iter()
            .find(|c| c.service_method == ServiceMethod::LiquidPenetrantTesting)
            .unwrap();
        assert_eq!(pt.certificate_type, CertificateType::Recertificate);
        assert_eq!(pt.expiry_date, to_midnight_utc(date(2027, 7, 20)));
        let vt_cert = certs
            .iter()
            .find(|c| c.service_method == ServiceMethod::VisualTesting)
            .unwrap();
        assert_eq!(vt_cert.expiry_date, to_midnight_utc(date(2026, 6, 15)));
        assert_eq!(vt_cert.certificate_type, CertificateType::Initial);
    }

    #[test]
    fn row_error_renders_cause_chain() {
        let error = RowError {
            row: 7,
            causes: vec!["فشل حفظ شهادة VT".to_string(), "duplicate key".to_string()],
        };
        assert_eq!(error.render(), "صف 7: فشل حفظ شهادة VT -> duplicate key");
    }
}
