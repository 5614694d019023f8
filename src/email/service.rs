use crate::config::Config;
use crate::trainees::certificates::models as certificates;
use crate::trainees::models as trainees;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::collections::BTreeMap;

use super::models::ContactFormRequest;

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery boundary. The production transport is supplied at deployment;
/// everything above it only composes messages.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<()>;
}

/// Default mailer that records the composed message instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body_bytes = email.body.len(),
            "outbound email (log only)"
        );
        Ok(())
    }
}

pub async fn relay_contact_form(
    mailer: &dyn Mailer,
    config: &Config,
    form: ContactFormRequest,
) -> Result<()> {
    let body = format!(
        "From: {} <{}>\n\n{}",
        form.name, form.email, form.message
    );
    mailer
        .send(OutboundEmail {
            to: config.email_contact_inbox.clone(),
            subject: format!("[{}] {}", config.app_name, form.subject),
            body,
        })
        .await
}

/// Collects certificates expiring within `days` of `now` and dispatches one
/// notification per trainee. Returns the number of notifications sent.
pub async fn notify_expiring(
    db: &DatabaseConnection,
    mailer: &dyn Mailer,
    config: &Config,
    days: i64,
    now: DateTime<Utc>,
) -> Result<u64> {
    let cutoff = now + Duration::days(days);

    let expiring = certificates::Entity::find()
        .filter(certificates::Column::ExpiryDate.gte(now))
        .filter(certificates::Column::ExpiryDate.lte(cutoff))
        .find_also_related(trainees::Entity)
        .order_by_asc(certificates::Column::ExpiryDate)
        .all(db)
        .await?;

    let mut per_trainee: BTreeMap<String, (String, Vec<String>)> = BTreeMap::new();
    for (certificate, trainee) in expiring {
        let Some(trainee) = trainee else { continue };
        let entry = per_trainee
            .entry(trainee.serial_number.clone())
            .or_insert_with(|| (trainee.person_name.clone(), Vec::new()));
        entry.1.push(format!(
            "{} ({}) expires {}",
            certificate.service_method.code(),
            certificate.certificate_type.label(),
            certificate.expiry_date.format("%Y-%m-%d")
        ));
    }

    let mut sent = 0;
    for (serial_number, (person_name, lines)) in per_trainee {
        let body = format!(
            "Certificates for {person_name} ({serial_number}) expire within {days} days:\n{}",
            lines.join("\n")
        );
        mailer
            .send(OutboundEmail {
                to: config.email_contact_inbox.clone(),
                subject: format!("Expiring certificates: {serial_number}"),
                body,
            })
            .await?;
        sent += 1;
    }

    Ok(sent)
}
