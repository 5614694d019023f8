//! Duplicate-serial cleanup.
//!
//! Synthetic serials from the import fallback can collide across days and
//! leave near-duplicate trainees whose serial is the canonical one plus a
//! `-NNNNNN` suffix. This pass merges them back into the canonical record.
//! The 6-digit-suffix heuristic is best-effort and can misfire on
//! legitimately suffixed serials.

use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::trainees::certificates::models as certificates;
use crate::trainees::models as trainees;

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub total_processed: u64,
    pub merged_with_original: u64,
    pub renamed_to_original: u64,
    pub deleted_duplicates: u64,
    pub remaining_trainees: u64,
}

/// Base serial for a suspected duplicate: the part before a trailing
/// `-<6 digits>` suffix. Returns `None` when the serial does not match.
#[must_use]
pub fn base_serial(serial: &str) -> Option<&str> {
    let (base, suffix) = serial.rsplit_once('-')?;
    if base.is_empty() || suffix.len() != 6 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(base)
}

/// Merge or rename every trainee whose serial carries a 6-digit suffix.
pub async fn cleanup_duplicates(db: &DatabaseConnection) -> Result<CleanupReport> {
    let all = trainees::Entity::find()
        .all(db)
        .await
        .context("failed to load trainees")?;

    let suspects: Vec<(trainees::Model, String)> = all
        .into_iter()
        .filter_map(|trainee| {
            base_serial(&trainee.serial_number)
                .map(str::to_string)
                .map(|base| (trainee, base))
        })
        .collect();

    let mut report = CleanupReport::default();

    for (duplicate, base) in suspects {
        report.total_processed += 1;

        // Re-query each time: an earlier rename may have established the
        // canonical record.
        let canonical = trainees::Entity::find()
            .filter(trainees::Column::SerialNumber.eq(base.as_str()))
            .one(db)
            .await
            .context("failed to look up canonical trainee")?;

        match canonical {
            Some(canonical) => {
                merge_duplicate(db, &duplicate, &canonical).await.with_context(|| {
                    format!(
                        "failed to merge {} into {}",
                        duplicate.serial_number, canonical.serial_number
                    )
                })?;
                report.merged_with_original += 1;
                report.deleted_duplicates += 1;
            }
            None => {
                let serial = duplicate.serial_number.clone();
                let mut active = duplicate.into_active_model();
                active.serial_number = Set(base.clone());
                active.last_updated = Set(Utc::now());
                active
                    .update(db)
                    .await
                    .with_context(|| format!("failed to rename {serial} to {base}"))?;
                report.renamed_to_original += 1;
            }
        }
    }

    report.remaining_trainees = trainees::Entity::find()
        .count(db)
        .await
        .context("failed to count trainees")?;

    Ok(report)
}

/// Move the duplicate's certificates onto the canonical trainee (adding
/// missing methods, upgrading only newer expiries) and delete the duplicate.
async fn merge_duplicate(
    db: &DatabaseConnection,
    duplicate: &trainees::Model,
    canonical: &trainees::Model,
) -> Result<()> {
    let txn = db.begin().await?;

    let duplicate_certs = duplicate
        .find_related(certificates::Entity)
        .all(&txn)
        .await?;
    let canonical_certs = canonical
        .find_related(certificates::Entity)
        .all(&txn)
        .await?;

    for cert in duplicate_certs {
        match canonical_certs
            .iter()
            .find(|existing| existing.service_method == cert.service_method)
        {
            Some(existing) => {
                if cert.expiry_date > existing.expiry_date {
                    let mut active = existing.clone().into_active_model();
                    active.certificate_type = Set(cert.certificate_type);
                    active.expiry_date = Set(cert.expiry_date);
                    active.last_updated = Set(Utc::now());
                    active.update(&txn).await?;
                }
            }
            None => {
                let mut active = cert.into_active_model();
                active.trainee_id = Set(canonical.id);
                active.last_updated = Set(Utc::now());
                active.update(&txn).await?;
            }
        }
    }

    // Remaining certificates go with the trainee (FK cascade).
    trainees::Entity::delete_by_id(duplicate.id)
        .exec(&txn)
        .await?;

    txn.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_helpers::setup_test_db;
    use crate::services::import::cells::to_midnight_utc;
    use crate::trainees::certificates::models::{CertificateType, ServiceMethod};
    use chrono::NaiveDate;
    use uuid::Uuid;

    #[test]
    fn base_serial_matches_only_six_digit_suffixes() {
        assert_eq!(base_serial("1001-202601"), Some("1001"));
        assert_eq!(base_serial("AZ-20260110-202601"), Some("AZ-20260110"));
        assert_eq!(base_serial("1001-2026"), None);
        assert_eq!(base_serial("1001-20260A"), None);
        assert_eq!(base_serial("1001"), None);
        assert_eq!(base_serial("-123456"), None);
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn insert_trainee(db: &sea_orm::DatabaseConnection, serial: &str) -> trainees::Model {
        let now = Utc::now();
        trainees::ActiveModel {
            id: Set(Uuid::new_v4()),
            serial_number: Set(serial.to_string()),
            person_name: Set("John Smith".to_string()),
            country: Set(None),
            state: Set(None),
            street_address: Set(None),
            created_at: Set(now),
            last_updated: Set(now),
        }
        .insert(db)
        .await
        .unwrap()
    }

    async fn insert_certificate(
        db: &sea_orm::DatabaseConnection,
        trainee_id: Uuid,
        method: ServiceMethod,
        expiry: NaiveDate,
    ) {
        let now = Utc::now();
        certificates::ActiveModel {
            id: Set(Uuid::new_v4()),
            trainee_id: Set(trainee_id),
            service_method: Set(method),
            certificate_type: Set(CertificateType::Initial),
            expiry_date: Set(to_midnight_utc(expiry)),
            created_at: Set(now),
            last_updated: Set(now),
        }
        .insert(db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn merges_suffixed_duplicate_into_canonical() {
        let db = setup_test_db().await;
        let canonical = insert_trainee(&db, "1001").await;
        let duplicate = insert_trainee(&db, "1001-202601").await;
        insert_certificate(&db, canonical.id, ServiceMethod::VisualTesting, date(2027, 1, 1)).await;
        // duplicate holds a newer VT and a method the canonical lacks
        insert_certificate(&db, duplicate.id, ServiceMethod::VisualTesting, date(2028, 1, 1)).await;
        insert_certificate(
            &db,
            duplicate.id,
            ServiceMethod::UltrasonicTesting,
            date(2026, 5, 1),
        )
        .await;

        let report = cleanup_duplicates(&db).await.unwrap();
        assert_eq!(report.total_processed, 1);
        assert_eq!(report.merged_with_original, 1);
        assert_eq!(report.deleted_duplicates, 1);
        assert_eq!(report.renamed_to_original, 0);
        assert_eq!(report.remaining_trainees, 1);

        let certs = canonical
            .find_related(certificates::Entity)
            .all(&db)
            .await
            .unwrap();
        assert_eq!(certs.len(), 2);
        let vt = certs
            .iter()
            .find(|c| c.service_method == ServiceMethod::VisualTesting)
            .unwrap();
        assert_eq!(vt.expiry_date, to_midnight_utc(date(2028, 1, 1)));
    }

    #[tokio::test]
    async fn renames_duplicate_when_no_canonical_exists() {
        let db = setup_test_db().await;
        let duplicate = insert_trainee(&db, "2002-202601").await;
        insert_certificate(&db, duplicate.id, ServiceMethod::VisualTesting, date(2027, 1, 1)).await;

        let report = cleanup_duplicates(&db).await.unwrap();
        assert_eq!(report.renamed_to_original, 1);
        assert_eq!(report.merged_with_original, 0);
        assert_eq!(report.remaining_trainees, 1);

        let renamed = trainees::Entity::find()
            .filter(trainees::Column::SerialNumber.eq("2002"))
            .one(&db)
            .await
            .unwrap();
        assert!(renamed.is_some());
    }

    #[tokio::test]
    async fn untouched_serials_are_ignored() {
        let db = setup_test_db().await;
        insert_trainee(&db, "1001").await;
        insert_trainee(&db, "AZ-20260110-0008").await;

        let report = cleanup_duplicates(&db).await.unwrap();
        assert_eq!(report.total_processed, 0);
        assert_eq!(report.remaining_trainees, 2);
    }
}
