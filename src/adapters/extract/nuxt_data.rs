use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use super::collector::{FieldCollector, collect};
use super::pipeline::ExtractContext;
use super::reference::Resolver;
use super::scorer::best_candidate;
use crate::domain::JobRecord;
use crate::error::{Result, UpworkError};

const SELECTOR: &str = "script#__NUXT_DATA__";

/// Text of the `__NUXT_DATA__` script, or the whole input when it is
/// already a bare reference array.
pub fn locate<'h>(html: &'h str, document: &Html) -> Option<std::borrow::Cow<'h, str>> {
    let selector = Selector::parse(SELECTOR).ok()?;
    if let Some(script) = document.select(&selector).next() {
        return Some(script.text().collect::<String>().into());
    }
    let trimmed = html.trim_start();
    trimmed.starts_with('[').then_some(trimmed.into())
}

pub fn decode(html: &str, document: &Html, ctx: &ExtractContext<'_>) -> Result<Value> {
    let Some(text) = locate(html, document) else {
        warn!(job_id = ctx.job_id, "No __NUXT_DATA__ payload in page");
        ctx.diagnostics.dump("nuxt_data_missing", html);
        return Err(UpworkError::not_found(SELECTOR));
    };
    serde_json::from_str(&text).map_err(|e| UpworkError::malformed(e.to_string()))
}

/// Recover a record from the flat reference-array payload.
///
/// Every object in the payload feeds the collector; the best-scoring job
/// object is then resolved in full and collected again as a supplement.
pub fn extract(html: &str, document: &Html, ctx: &ExtractContext<'_>) -> Result<JobRecord> {
    let payload = decode(html, document, ctx)?;
    let resolver = Resolver::for_root(&payload);
    let options = ctx.collector_options();

    let mut record = FieldCollector::walk(resolver, &payload).into_record(&options);

    if let Some((job, path)) = best_candidate(&payload) {
        debug!(%path, "Best job candidate in payload");
        let resolved = resolver.resolve_deep(&Value::Object(job.clone()));
        let supplement = collect(&resolved, Resolver::Identity, &options);
        record.merge_from(&supplement);
        record.enforce_pricing_exclusivity();
    }
    Ok(record)
}
