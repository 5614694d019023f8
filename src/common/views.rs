use super::models::{HealthCheck, UIConfiguration};
use crate::common::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use sea_orm::DatabaseConnection;
use utoipa_axum::{router::OpenApiRouter, routes};

pub fn router(state: &AppState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(healthz))
        .routes(routes!(get_ui_config))
        .with_state(state.db.clone())
}

/// Liveness endpoint. Healthy only while the certificate database answers pings.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (
            status = OK,
            description = "Service and database are reachable",
            body = HealthCheck
        ),
        (
            status = INTERNAL_SERVER_ERROR,
            description = "Database did not respond",
            body = HealthCheck
        )
    )
)]
pub async fn healthz(State(db): State<DatabaseConnection>) -> (StatusCode, Json<HealthCheck>) {
    if db.ping().await.is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HealthCheck {
                status: "error".to_string(),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(HealthCheck {
            status: "ok".to_string(),
        }),
    )
}

/// Keycloak settings the registry frontend needs to authenticate.
#[utoipa::path(
    get,
    path = "/api/config",
    responses(
        (
            status = OK,
            description = "Authentication settings for the web UI",
            body = UIConfiguration
        )
    )
)]
pub async fn get_ui_config() -> Json<UIConfiguration> {
    Json(UIConfiguration::new())
}
