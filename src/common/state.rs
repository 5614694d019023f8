use crate::config::Config;
use crate::email::service::{LogMailer, Mailer};
use axum_keycloak_auth::instance::KeycloakAuthInstance;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub keycloak_auth_instance: Option<Arc<KeycloakAuthInstance>>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        config: Config,
        keycloak_auth_instance: Option<Arc<KeycloakAuthInstance>>,
    ) -> Self {
        Self {
            db,
            config,
            keycloak_auth_instance,
            mailer: Arc::new(LogMailer),
        }
    }
}
