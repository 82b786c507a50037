pub mod cache;
pub mod diagnostics;
pub mod job_source;
