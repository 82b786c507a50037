use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Field, JobRecord};
use crate::error::Result;
use crate::ports::job_source::JobSource;

type FetchFn = Box<dyn Fn(&str) -> Result<JobRecord> + Send + Sync>;

/// Scriptable [`JobSource`] that also tracks how many fetches overlap.
pub struct MockJobSource {
    fetch_fn: Mutex<FetchFn>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Default for MockJobSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJobSource {
    pub fn new() -> Self {
        Self {
            fetch_fn: Mutex::new(Box::new(|url| Ok(make_job_record(url, "Test job")))),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_fetch(self, f: impl Fn(&str) -> Result<JobRecord> + Send + Sync + 'static) -> Self {
        *self.fetch_fn.lock().unwrap() = Box::new(f);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobSource for MockJobSource {
    async fn fetch_job(&self, url: &str) -> Result<JobRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = {
            let f = self.fetch_fn.lock().unwrap();
            f(url)
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn make_job_record(url: &str, title: &str) -> JobRecord {
    let mut record = JobRecord::new();
    record.set(Field::JobId, crate::adapters::http::job_id_from_url(url));
    record.set(Field::Url, url);
    record.set(Field::Title, title);
    record.set(Field::Type, "Hourly");
    record.set(Field::HourlyMin, 25);
    record.set(Field::HourlyMax, 60);
    record.set(Field::FixedBudget, 0);
    record
}

/// A job page carrying only the `window.__NUXT__` state script.
pub fn nuxt_state_page(title: &str) -> String {
    format!(
        r#"<html><head><title>{title} - Web Development - Upwork</title>
<script>window.__NUXT__=(function(a,b,c){{return {{state:{{jobDetails:{{job:{{title:"{title}",description:a,type:2,contractorTier:2,extendedBudgetInfo:{{hourlyBudgetMin:b,hourlyBudgetMax:c}},clientActivity:{{totalApplicants:7}}}},buyer:{{isPaymentMethodVerified:!0,location:{{country:"Germany"}}}}}}}}}}}}("Build an API",30,70));</script>
</head><body></body></html>"#
    )
}
