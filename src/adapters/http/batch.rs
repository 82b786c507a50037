use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::domain::JobRecord;
use crate::ports::job_source::JobSource;

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub url: String,
    pub error: String,
}

/// Records gathered by [`fetch_jobs`], in completion order.
#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    pub records: Vec<JobRecord>,
    pub failures: Vec<BatchFailure>,
}

/// Fetch and extract every URL with at most `max_concurrency` in flight.
///
/// A failing job is logged and listed in `failures`; it never stops the rest.
pub async fn fetch_jobs(
    source: Arc<dyn JobSource>,
    urls: Vec<String>,
    max_concurrency: usize,
) -> BatchOutcome {
    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let total = urls.len();

    for url in urls {
        let source = Arc::clone(&source);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (url, None);
            };
            let result = source.fetch_job(&url).await;
            (url, Some(result))
        });
    }

    let mut outcome = BatchOutcome::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((url, Some(Ok(record)))) => {
                debug!(url, filled = record.filled_count(), "Job extracted");
                outcome.records.push(record);
            }
            Ok((url, Some(Err(e)))) => {
                warn!(url, error = %e, "Job skipped");
                outcome.failures.push(BatchFailure {
                    url,
                    error: e.to_string(),
                });
            }
            Ok((url, None)) => {
                outcome.failures.push(BatchFailure {
                    url,
                    error: "worker pool closed".into(),
                });
            }
            Err(e) => error!(error = %e, "Job task panicked"),
        }
    }
    debug!(
        total,
        ok = outcome.records.len(),
        failed = outcome.failures.len(),
        "Batch finished"
    );
    outcome
}
