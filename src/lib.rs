pub mod api;
pub mod config;
pub mod db;

use chrono::Duration;
use config::Config;
use tracing::warn;

use crate::api::auth::TokenIssuer;
use crate::db::Database;

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Self {
        let secret = match &config.auth.jwt_secret {
            Some(secret) => secret.clone(),
            None => {
                warn!("No JWT secret configured; sessions will not survive a restart");
                uuid::Uuid::new_v4().simple().to_string()
            }
        };
        let tokens = TokenIssuer::new(&secret, Duration::days(config.auth.session_days));

        Self { config, db, tokens }
    }
}
