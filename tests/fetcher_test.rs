use std::sync::Arc;

use mcp_upwork::adapters::cache::LruRecordCache;
use mcp_upwork::adapters::diagnostics::{FileDiagnostics, NoopDiagnostics};
use mcp_upwork::adapters::http::{UpworkFetcher, fetch_jobs};
use mcp_upwork::config::types::{CacheConfig, ScraperConfig};
use mcp_upwork::domain::Field;
use mcp_upwork::error::UpworkError;
use mcp_upwork::ports::diagnostics::DiagnosticsSink;
use mcp_upwork::ports::job_source::JobSource;

use serde_json::json;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_scraper_config(base_url: &str) -> ScraperConfig {
    ScraperConfig {
        base_url: base_url.to_string(),
        rate_limit_per_second: 100.0, // fast for tests
        request_timeout_secs: 5,
        max_retries: 1,
        ..Default::default()
    }
}

fn fetcher_with(config: ScraperConfig, diagnostics: Arc<dyn DiagnosticsSink>) -> UpworkFetcher {
    UpworkFetcher::new(
        config,
        &CacheConfig::default(),
        Arc::new(LruRecordCache::new(100)),
        diagnostics,
    )
    .unwrap()
}

fn fetcher(base_url: &str) -> UpworkFetcher {
    fetcher_with(fast_scraper_config(base_url), Arc::new(NoopDiagnostics))
}

fn job_html(title: &str) -> String {
    format!(
        r#"<html><head><title>{title} - Data Entry</title>
<script>window.__NUXT__={{state:{{jobDetails:{{job:{{title:"{title}",type:1,budget:{{amount:150,currencyCode:"USD"}}}}}}}}}};</script>
</head><body></body></html>"#
    )
}

#[tokio::test]
async fn fetches_and_extracts_job_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/Data-entry_~01aa"))
        .respond_with(ResponseTemplate::new(200).set_body_string(job_html("Data entry")))
        .mount(&mock_server)
        .await;

    let url = format!("{}/jobs/Data-entry_~01aa", mock_server.uri());
    let record = fetcher(&mock_server.uri()).fetch_job(&url).await.unwrap();

    assert_eq!(record.get_str(Field::Title), Some("Data entry"));
    assert_eq!(record.get_str(Field::JobId), Some("01aa"));
    assert_eq!(record.get_str(Field::Url), Some(url.as_str()));
    assert_eq!(record.get_str(Field::Type), Some("Fixed-price"));
    assert_eq!(record.get(Field::FixedBudget), Some(&json!(150)));
    assert_eq!(record.get(Field::HourlyMin), Some(&json!(0)));
    assert_eq!(record.get_str(Field::Category), Some("Data Entry"));
}

#[tokio::test]
async fn caches_records_by_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex("/jobs/.*"))
        .respond_with(ResponseTemplate::new(200).set_body_string(job_html("Cached")))
        .expect(1) // Should only receive 1 request; second is cached
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(&mock_server.uri());
    let url = format!("{}/jobs/~01bb", mock_server.uri());
    let first = fetcher.fetch_job(&url).await.unwrap();
    let second = fetcher.fetch_job(&url).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn retries_on_server_error() {
    let mock_server = MockServer::start().await;

    // First request returns 500, second returns 200
    Mock::given(method("GET"))
        .and(path_regex("/jobs/.*"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex("/jobs/.*"))
        .respond_with(ResponseTemplate::new(200).set_body_string(job_html("Second try")))
        .mount(&mock_server)
        .await;

    let url = format!("{}/jobs/~01cc", mock_server.uri());
    let record = fetcher(&mock_server.uri()).fetch_job(&url).await.unwrap();
    assert_eq!(record.get_str(Field::Title), Some("Second try"));
}

#[tokio::test]
async fn not_found_maps_to_job_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex("/jobs/.*"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<html>Not Found</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/jobs/~01dd", mock_server.uri());
    let err = fetcher(&mock_server.uri()).fetch_job(&url).await.unwrap_err();
    assert!(matches!(err, UpworkError::JobNotFound { ref id } if id == "01dd"));
}

#[tokio::test]
async fn rate_limit_exhausts_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex("/jobs/.*"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let mut config = fast_scraper_config(&mock_server.uri());
    config.max_retries = 0;
    let fetcher = fetcher_with(config, Arc::new(NoopDiagnostics));
    let url = format!("{}/jobs/~01ee", mock_server.uri());
    assert!(matches!(
        fetcher.fetch_job(&url).await,
        Err(UpworkError::RateLimited)
    ));
}

#[tokio::test]
async fn sends_configured_cookie() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex("/jobs/.*"))
        .and(header("cookie", "session=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(job_html("Private job")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = ScraperConfig {
        cookie: Some("session=abc123".into()),
        authenticated: true,
        ..fast_scraper_config(&mock_server.uri())
    };
    let fetcher = fetcher_with(config, Arc::new(NoopDiagnostics));
    let url = format!("{}/jobs/~01ff", mock_server.uri());
    let record = fetcher.fetch_job(&url).await.unwrap();
    assert_eq!(record.get_str(Field::Title), Some("Private job"));
}

#[tokio::test]
async fn batch_fetch_skips_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/~0404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex("/jobs/~01.*"))
        .respond_with(ResponseTemplate::new(200).set_body_string(job_html("Batch")))
        .mount(&mock_server)
        .await;

    let source: Arc<dyn JobSource> = Arc::new(fetcher(&mock_server.uri()));
    let urls = ["~0101", "~0102", "~0404", "~0103"]
        .iter()
        .map(|id| format!("{}/jobs/{id}", mock_server.uri()))
        .collect();

    let outcome = fetch_jobs(source, urls, 2).await;
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].url.ends_with("~0404"));

    let mut ids: Vec<&str> = outcome
        .records
        .iter()
        .filter_map(|r| r.get_str(Field::JobId))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["0101", "0102", "0103"]);
}

#[tokio::test]
async fn missing_payloads_are_dumped_to_disk() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex("/jobs/.*"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><p>Sign in</p></body></html>"),
        )
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher_with(
        fast_scraper_config(&mock_server.uri()),
        Arc::new(FileDiagnostics::new(dir.path())),
    );
    let url = format!("{}/jobs/~0177", mock_server.uri());
    let record = fetcher.fetch_job(&url).await.unwrap();
    assert_eq!(record.get_str(Field::JobId), Some("0177"));

    let dumped: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok()?.file_name().into_string().ok())
        .collect();
    assert!(dumped.iter().any(|name| name.starts_with("nuxt_data_missing_")));
}
