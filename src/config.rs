use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub db_url: Option<String>,
    pub app_name: String,
    pub keycloak_ui_id: String,
    pub keycloak_url: String,
    pub keycloak_realm: String,
    pub deployment: String,
    pub admin_role: String,
    pub email_sender_name: String,
    pub email_sender_address: String,
    pub email_contact_inbox: String,
    pub tests_running: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok(); // Load from .env file if available
        let db_url = env::var("DB_URL").ok().or_else(|| {
            Some(format!(
                "{}://{}:{}@{}:{}/{}",
                env::var("DB_PREFIX").unwrap_or_else(|_| "postgresql".to_string()),
                env::var("DB_USER").expect("DB_USER must be set"),
                env::var("DB_PASSWORD").expect("DB_PASSWORD must be set"),
                env::var("DB_HOST").expect("DB_HOST must be set"),
                env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string()),
                env::var("DB_NAME").expect("DB_NAME must be set"),
            ))
        });

        Config {
            app_name: env::var("APP_NAME").expect("APP_NAME must be set"),
            keycloak_ui_id: env::var("KEYCLOAK_UI_ID").expect("KEYCLOAK_UI_ID must be set"),
            keycloak_url: env::var("KEYCLOAK_URL").expect("KEYCLOAK_URL must be set"),
            keycloak_realm: env::var("KEYCLOAK_REALM").expect("KEYCLOAK_REALM must be set"),
            deployment: env::var("DEPLOYMENT")
                .expect("DEPLOYMENT must be set, this can be local, dev, stage, or prod"),
            admin_role: "az-cert-admin".to_string(), // Admin role name in Keycloak
            email_sender_name: env::var("EMAIL_SENDER_NAME")
                .unwrap_or_else(|_| "AZ International".to_string()),
            email_sender_address: env::var("EMAIL_SENDER_ADDRESS")
                .unwrap_or_else(|_| "noreply@azinternational-eg.com".to_string()),
            email_contact_inbox: env::var("EMAIL_CONTACT_INBOX")
                .unwrap_or_else(|_| "info@azinternational-eg.com".to_string()),
            tests_running: false,
            db_url,
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            app_name: "az-cert-api-test".to_string(),
            keycloak_ui_id: "test-ui".to_string(),
            keycloak_url: "http://localhost:8080".to_string(),
            keycloak_realm: "test-realm".to_string(),
            deployment: "test".to_string(),
            admin_role: "az-cert-admin".to_string(),
            email_sender_name: "AZ International".to_string(),
            email_sender_address: "noreply@azinternational-eg.com".to_string(),
            email_contact_inbox: "info@azinternational-eg.com".to_string(),
            tests_running: true,
            db_url: None,
        }
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::routes::build_router;
    use axum::Router;
    use sea_orm::{Database, DatabaseConnection};

    /// Connect to the test database and bring the schema up.
    ///
    /// Uses `TEST_DB_URL` when set (e.g. a Postgres instance mirroring
    /// production), otherwise an in-memory SQLite database. Each in-memory
    /// connection is independent, so migrations run per connection.
    pub async fn setup_test_db() -> DatabaseConnection {
        let database_url =
            env::var("TEST_DB_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());

        let db = Database::connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        use migration::{Migrator, MigratorTrait};
        Migrator::up(&db, None)
            .await
            .expect("Failed to run database migrations");

        db
    }

    pub async fn setup_test_app() -> Router {
        let db = setup_test_db().await;
        let mut config = Config::for_tests();
        // Disable Keycloak for tests by setting the URL to empty
        config.keycloak_url = String::new();
        build_router(&db, &config)
    }
}
