use async_trait::async_trait;

use crate::domain::JobRecord;
use crate::error::Result;

/// Something that turns a job page URL into an extracted record.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn fetch_job(&self, url: &str) -> Result<JobRecord>;
}
