use super::models::{ContactFormRequest, EmailResponse, NotifyExpiringRequest};
use super::service;
use crate::common::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde_json::json;
use utoipa_axum::{router::OpenApiRouter, routes};

pub fn router(state: &AppState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(send_contact_form))
        .routes(routes!(notify_expiring))
        .with_state(state.clone())
}

#[utoipa::path(
    post,
    path = "/send",
    request_body = ContactFormRequest,
    responses(
        (status = OK, description = "Message relayed to the contact inbox", body = EmailResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Delivery failed")
    )
)]
pub async fn send_contact_form(
    State(state): State<AppState>,
    Json(form): Json<ContactFormRequest>,
) -> Result<Json<EmailResponse>, (StatusCode, Json<serde_json::Value>)> {
    service::relay_contact_form(state.mailer.as_ref(), &state.config, form)
        .await
        .map_err(|err| {
            tracing::error!("Failed to relay contact form: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to send message"})),
            )
        })?;

    Ok(Json(EmailResponse {
        message: "Message sent".to_string(),
        notifications_sent: 1,
    }))
}

#[utoipa::path(
    post,
    path = "/notify-expiring",
    request_body = NotifyExpiringRequest,
    responses(
        (status = OK, description = "Notifications dispatched", body = EmailResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Lookup or delivery failed")
    )
)]
pub async fn notify_expiring(
    State(state): State<AppState>,
    Json(request): Json<NotifyExpiringRequest>,
) -> Result<Json<EmailResponse>, (StatusCode, Json<serde_json::Value>)> {
    let days = request.days.unwrap_or(30).max(0);

    let sent = service::notify_expiring(
        &state.db,
        state.mailer.as_ref(),
        &state.config,
        days,
        Utc::now(),
    )
    .await
    .map_err(|err| {
        tracing::error!("Failed to notify expiring certificates: {err:#}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to dispatch notifications"})),
        )
    })?;

    Ok(Json(EmailResponse {
        message: format!("{sent} notification(s) dispatched"),
        notifications_sent: sent,
    }))
}
