use anyhow::{bail, Result};
use std::env;

/// Signing secret used outside production when none is configured
const DEVELOPMENT_JWT_SECRET: &str = "local-development-secret-change-me";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub log_level: String,
    pub supabase_url: Option<String>,
    pub supabase_jwt_secret: String,
    pub seed_demo_data: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .unwrap_or(8000);
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let supabase_url = env::var("SUPABASE_URL").ok().filter(|url| !url.is_empty());
        let seed_demo_data = env::var("SEED_DEMO_DATA")
            .map(|value| parse_flag(&value))
            .unwrap_or(false);

        let supabase_jwt_secret = match env::var("SUPABASE_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if environment == "production" => {
                bail!("SUPABASE_JWT_SECRET must be set in production")
            }
            _ => DEVELOPMENT_JWT_SECRET.to_string(),
        };

        Ok(AppConfig {
            host,
            port,
            environment,
            log_level,
            supabase_url,
            supabase_jwt_secret,
            seed_demo_data,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
