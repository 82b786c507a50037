pub mod batch;
pub mod client;
pub mod throttle;

pub use batch::{BatchFailure, BatchOutcome, fetch_jobs};
pub use client::{UpworkFetcher, job_id_from_url, job_url};
pub use throttle::Throttle;
