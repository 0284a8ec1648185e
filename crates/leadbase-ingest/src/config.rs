//! Process configuration, resolved once from the environment at startup.

use std::time::Duration;

use leadbase_adapters::{ApiKeyResolver, BackoffPolicy, FileSourceConfig, TextGenConfig};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub web_port: u16,
    pub drive_folder_id: String,
    pub textgen_base_url: String,
    pub textgen_model: String,
    pub outreach_brand: String,
    pub hook_concurrency: usize,
    pub feed_capacity: usize,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/leadbase".to_string()),
            web_port: std::env::var("LEADBASE_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            drive_folder_id: std::env::var("LEADBASE_DRIVE_FOLDER").unwrap_or_default(),
            textgen_base_url: std::env::var("LEADBASE_TEXTGEN_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            textgen_model: std::env::var("LEADBASE_TEXTGEN_MODEL")
                .unwrap_or_else(|_| "gpt-4o".to_string()),
            outreach_brand: std::env::var("LEADBASE_BRAND")
                .unwrap_or_else(|_| "Our team".to_string()),
            hook_concurrency: std::env::var("LEADBASE_HOOK_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            feed_capacity: std::env::var("LEADBASE_FEED_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
            http_timeout_secs: std::env::var("LEADBASE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Resolver for the text-generation token. Checked in order: explicit
    /// flag value, `OPENAI_API_KEY`, `OPENAI_API_KEY_FILE`.
    pub fn textgen_key_resolver(&self, explicit: Option<String>) -> ApiKeyResolver {
        ApiKeyResolver::new("OPENAI_API_KEY", "OPENAI_API_KEY_FILE").with_explicit(explicit)
    }

    /// Resolver for the file-source token. Checked in order: explicit flag
    /// value, `DRIVE_TOKEN`, `DRIVE_TOKEN_FILE`.
    pub fn drive_key_resolver(&self, explicit: Option<String>) -> ApiKeyResolver {
        ApiKeyResolver::new("DRIVE_TOKEN", "DRIVE_TOKEN_FILE").with_explicit(explicit)
    }

    pub fn textgen_config(&self) -> TextGenConfig {
        TextGenConfig {
            base_url: self.textgen_base_url.clone(),
            model: self.textgen_model.clone(),
            brand: self.outreach_brand.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn file_source_config(&self) -> FileSourceConfig {
        FileSourceConfig {
            folder_id: self.drive_folder_id.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            ..Default::default()
        }
    }
}
