//! Flat certificate records as the pre-migration API exposed them: one row
//! per (trainee, certificate), with the method code folded into the serial.

use crate::trainees::certificates::models as certificates;
use crate::trainees::certificates::models::{CertificateType, ServiceMethod};
use crate::trainees::models as trainees;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCertificate {
    pub id: Uuid,
    /// Composite serial: `<trainee serial>-<method code>`.
    pub serial_number: String,
    pub name: String,
    pub service_method: String,
    pub certificate_type: CertificateType,
    pub expiry_date: DateTime<Utc>,
    pub is_expired: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl LegacyCertificate {
    pub fn from_pair(trainee: &trainees::Model, certificate: &certificates::Model) -> Self {
        Self {
            id: certificate.id,
            serial_number: format!(
                "{}-{}",
                trainee.serial_number,
                certificate.service_method.code()
            ),
            name: trainee.person_name.clone(),
            service_method: certificate.service_method.code().to_string(),
            certificate_type: certificate.certificate_type,
            expiry_date: certificate.expiry_date,
            is_expired: certificate.is_expired(Utc::now()),
            created_at: certificate.created_at,
            last_updated: certificate.last_updated,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

impl<T> PagedResult<T> {
    pub fn paginate(all: Vec<T>, page: u64, page_size: u64) -> Self {
        let total_count = all.len() as u64;
        let page = page.max(1);
        let page_size = page_size.clamp(1, 500);
        let total_pages = total_count.div_ceil(page_size);
        let items = all
            .into_iter()
            .skip(((page - 1) * page_size) as usize)
            .take(page_size as usize)
            .collect();
        Self {
            items,
            total_count,
            page,
            page_size,
            total_pages,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchQuery {
    pub serial_number: Option<String>,
    pub name: Option<String>,
    pub method: Option<String>,
}

/// Create-or-attach payload. The serial may carry a method suffix, which is
/// stripped before trainee resolution.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCertificateCreate {
    pub serial_number: String,
    pub name: String,
    pub service_method: ServiceMethod,
    pub certificate_type: CertificateType,
    pub expiry_date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCertificateUpdate {
    pub name: Option<String>,
    pub certificate_type: Option<CertificateType>,
    pub expiry_date: Option<DateTime<Utc>>,
}

/// Split a queried serial into (base serial, method) when it ends in a known
/// method code suffix, e.g. `1001-VT`.
#[must_use]
pub fn split_method_suffix(serial: &str) -> Option<(&str, ServiceMethod)> {
    let (base, suffix) = serial.rsplit_once('-')?;
    if base.is_empty() {
        return None;
    }
    ServiceMethod::from_code(suffix).map(|method| (base, method))
}
