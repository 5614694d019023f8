use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Contact form payload relayed to the configured inbox.
#[derive(ToSchema, Deserialize, Serialize, Clone)]
pub struct ContactFormRequest {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(ToSchema, Deserialize, Serialize)]
pub struct NotifyExpiringRequest {
    /// Window in days ahead of today. Defaults to 30.
    pub days: Option<i64>,
}

#[derive(ToSchema, Deserialize, Serialize)]
pub struct EmailResponse {
    pub message: String,
    pub notifications_sent: u64,
}
