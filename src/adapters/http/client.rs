use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use tracing::{debug, warn};
use url::Url;

use super::throttle::Throttle;
use crate::adapters::extract::{self, ExtractContext};
use crate::config::types::{CacheConfig, ScraperConfig};
use crate::domain::{Field, JobRecord};
use crate::error::{Result, UpworkError};
use crate::ports::cache::RecordCache;
use crate::ports::diagnostics::DiagnosticsSink;
use crate::ports::job_source::JobSource;

static JOB_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~([0-9a-zA-Z]+)").unwrap());

/// Job id from the `~<id>` segment of a job URL, `"0"` when there is none.
pub fn job_id_from_url(url: &str) -> String {
    JOB_ID_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map_or_else(|| "0".to_string(), |m| m.as_str().to_string())
}

/// Absolute job URL on `base_url` for either a full URL or a bare `~id`.
pub fn job_url(base_url: &str, url_or_id: &str) -> Result<String> {
    let input = url_or_id.trim();
    if let Ok(url) = Url::parse(input) {
        return match url.scheme() {
            "http" | "https" => Ok(url.into()),
            other => Err(UpworkError::Config(format!(
                "unsupported URL scheme '{other}'"
            ))),
        };
    }
    let id = input.trim_start_matches('~');
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(UpworkError::Url(url::ParseError::RelativeUrlWithoutBase));
    }
    Ok(Url::parse(base_url)?.join(&format!("/jobs/~{id}"))?.into())
}

/// Plain-HTTP job page fetcher feeding the extraction pipeline.
pub struct UpworkFetcher {
    http: Client,
    throttle: Throttle,
    cache: Arc<dyn RecordCache>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    config: ScraperConfig,
    record_ttl: Duration,
}

impl UpworkFetcher {
    pub fn new(
        config: ScraperConfig,
        cache_config: &CacheConfig,
        cache: Arc<dyn RecordCache>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = config.cookie.as_deref() {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| UpworkError::Config(format!("invalid cookie header: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .cookie_store(true)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            throttle: Throttle::new(config.rate_limit_per_second),
            cache,
            diagnostics,
            record_ttl: Duration::from_secs(cache_config.record_ttl_secs),
            config,
        })
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Absolute job URL for either a full URL or a bare `~id`.
    pub fn job_url(&self, url_or_id: &str) -> Result<String> {
        job_url(&self.config.base_url, url_or_id)
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.throttle.wait().await;

        debug!(url, "Fetching job page");

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(u64::from(attempt) * 2);
                debug!(attempt, delay_secs = delay.as_secs(), "Retrying request");
                tokio::time::sleep(delay).await;
                self.throttle.wait().await;
            }

            match self.http.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(UpworkError::Http);
                    }
                    if status.as_u16() == 429 {
                        warn!(attempt, "Rate limited by Upwork (429)");
                        last_error = Some(UpworkError::RateLimited);
                        continue;
                    }
                    if status.as_u16() == 404 {
                        return Err(UpworkError::JobNotFound {
                            id: job_id_from_url(url),
                        });
                    }
                    warn!(%status, attempt, "Unexpected HTTP status");
                    last_error = Some(UpworkError::Document {
                        reason: format!("HTTP {status} for {url}"),
                    });
                }
                Err(e) => {
                    warn!(error = %e, attempt, "HTTP request failed");
                    last_error = Some(UpworkError::Http(e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| UpworkError::Document {
            reason: format!("all retries exhausted for {url}"),
        }))
    }
}

#[async_trait]
impl JobSource for UpworkFetcher {
    async fn fetch_job(&self, url: &str) -> Result<JobRecord> {
        let cache_key = format!("job:{url}");
        if let Some(cached) = self.cache.get(&cache_key)
            && let Ok(record) = serde_json::from_str::<JobRecord>(&cached)
        {
            debug!(url, "Cache hit for job record");
            return Ok(record);
        }

        let html = self.fetch_html(url).await?;
        let job_id = job_id_from_url(url);
        let ctx = ExtractContext {
            job_id: &job_id,
            authenticated: self.config.authenticated,
            origin: &self.config.base_url,
            diagnostics: self.diagnostics.as_ref(),
        };
        let mut record = extract::extract(&html, &ctx)?;
        record.set(Field::Url, url);

        if let Ok(json) = serde_json::to_string(&record) {
            self.cache.set(&cache_key, &json, self.record_ttl);
        }
        Ok(record)
    }
}
