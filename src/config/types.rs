use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: f64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Pages are fetched with a logged-in session (unlocks connects counts).
    #[serde(default)]
    pub authenticated: bool,
    /// Raw `Cookie` header carried over from a browser session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            base_url: default_base_url(),
            request_timeout_secs: default_timeout(),
            max_retries: default_retries(),
            rate_limit_per_second: default_rate_limit(),
            max_concurrency: default_max_concurrency(),
            authenticated: false,
            cookie: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_record_ttl")]
    pub record_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            record_ttl_secs: default_record_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_diagnostics_dir")]
    pub directory: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_diagnostics_dir(),
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".into()
}

fn default_base_url() -> String {
    "https://www.upwork.com".into()
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    2
}

fn default_rate_limit() -> f64 {
    2.0
}

fn default_max_concurrency() -> usize {
    20
}

fn default_max_entries() -> usize {
    500
}

fn default_record_ttl() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

fn default_diagnostics_dir() -> String {
    "testing".into()
}
