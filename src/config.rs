use std::env;

/// Process-wide configuration, read once at startup and threaded through
/// construction. None of these values affect protocol correctness; the JWT
/// and CORS entries are carried for the external authentication layer.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub access_token_ttl_min: i64,
    pub refresh_token_ttl_days: i64,
    pub cors_origins: Vec<String>,
}

impl Settings {
    /// Load settings from the environment, falling back to `default_db_url`
    /// for the store location.
    pub fn from_env(default_db_url: &str) -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| default_db_url.to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "change-me".to_string()),
            jwt_algorithm: env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            access_token_ttl_min: env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            refresh_token_ttl_days: env::var("REFRESH_TOKEN_EXPIRE_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| vec!["http://localhost:3000".to_string()]),
        }
    }
}
