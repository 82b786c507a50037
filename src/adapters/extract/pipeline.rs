use std::fmt;

use scraper::Html;
use serde_json::Value;
use tracing::{debug, debug_span};

use super::collector::CollectorOptions;
use super::{html_parser, nuxt_data, nuxt_state};
use crate::domain::text::as_number;
use crate::domain::{Field, JobRecord, MissingFieldSet};
use crate::error::{Result, UpworkError};
use crate::ports::diagnostics::DiagnosticsSink;

/// Per-call inputs shared by every extraction stage.
#[derive(Clone, Copy)]
pub struct ExtractContext<'a> {
    /// Identifier used for logging and diagnostic dumps.
    pub job_id: &'a str,
    /// Whether the page was fetched by a logged-in session.
    pub authenticated: bool,
    /// Site origin for absolutizing relative URLs.
    pub origin: &'a str,
    pub diagnostics: &'a dyn DiagnosticsSink,
}

impl ExtractContext<'_> {
    pub(crate) fn collector_options(&self) -> CollectorOptions<'_> {
        CollectorOptions {
            authenticated: self.authenticated,
            origin: self.origin,
        }
    }
}

impl fmt::Debug for ExtractContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractContext")
            .field("job_id", &self.job_id)
            .field("authenticated", &self.authenticated)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Pipeline position; each stage runs exactly once, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    NuxtJsonAttempted,
    HtmlAttempted,
    FallbackAttempted,
    Done,
}

impl Stage {
    fn next(self) -> Self {
        match self {
            Self::Pending => Self::NuxtJsonAttempted,
            Self::NuxtJsonAttempted => Self::HtmlAttempted,
            Self::HtmlAttempted => Self::FallbackAttempted,
            Self::FallbackAttempted | Self::Done => Self::Done,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::NuxtJsonAttempted => "nuxt_state",
            Self::HtmlAttempted => "html",
            Self::FallbackAttempted => "nuxt_data",
            Self::Done => "done",
        }
    }
}

/// One page's walk through the stages.
struct ExtractionRun<'a> {
    html: &'a str,
    document: Html,
    ctx: &'a ExtractContext<'a>,
    stage: Stage,
    record: JobRecord,
    missing: MissingFieldSet,
}

impl<'a> ExtractionRun<'a> {
    fn new(html: &'a str, ctx: &'a ExtractContext<'a>) -> Self {
        Self {
            html,
            document: Html::parse_document(html),
            ctx,
            stage: Stage::Pending,
            record: JobRecord::new(),
            missing: MissingFieldSet::all(),
        }
    }

    /// Run the next stage and move past it.
    fn advance(&mut self) {
        let stage = self.stage.next();
        if stage != Stage::Done {
            if self.missing.is_empty() {
                debug!(stage = stage.label(), "Nothing missing, stage skipped");
            } else {
                match self.attempt(stage) {
                    Ok(found) => {
                        let merged = self.record.merge_from(&found);
                        self.record.enforce_pricing_exclusivity();
                        self.missing = self.record.missing_fields();
                        debug!(
                            stage = stage.label(),
                            merged,
                            missing = self.missing.len(),
                            "Stage merged"
                        );
                    }
                    Err(e @ UpworkError::PayloadNotFound { .. }) => {
                        debug!(stage = stage.label(), error = %e, "Stage found no payload");
                    }
                    Err(e) => {
                        debug!(stage = stage.label(), error = %e, "Stage failed");
                    }
                }
            }
        }
        self.stage = stage;
    }

    fn attempt(&self, stage: Stage) -> Result<JobRecord> {
        match stage {
            Stage::NuxtJsonAttempted => nuxt_state::extract(&self.document, self.ctx),
            Stage::HtmlAttempted => Ok(html_parser::extract(
                &self.document,
                self.missing,
                self.ctx,
            )),
            Stage::FallbackAttempted => nuxt_data::extract(self.html, &self.document, self.ctx),
            Stage::Pending | Stage::Done => Ok(JobRecord::new()),
        }
    }

    fn finish(mut self) -> JobRecord {
        self.record.set(Field::JobId, self.ctx.job_id);
        fill_hire_rate(&mut self.record);
        self.record.enforce_pricing_exclusivity();
        self.record
    }
}

/// Extract a job record from a job page.
///
/// Stages run in priority order: evaluated `window.__NUXT__` state, then
/// the rendered markup, then the `__NUXT_DATA__` reference payload. Earlier
/// stages win every field they fill. Stage failures are logged and absorbed;
/// only an empty document is an error.
pub fn extract(html: &str, ctx: &ExtractContext<'_>) -> Result<JobRecord> {
    if html.trim().is_empty() {
        return Err(UpworkError::Document {
            reason: format!("empty document for job {}", ctx.job_id),
        });
    }
    let span = debug_span!("job", job_id = ctx.job_id);
    let _guard = span.enter();

    let mut run = ExtractionRun::new(html, ctx);
    while run.stage != Stage::Done {
        run.advance();
    }
    let record = run.finish();
    debug!(filled = record.filled_count(), "Extraction finished");
    Ok(record)
}

/// Hire rate from jobs-with-hires over posted jobs, capped at 100.
fn fill_hire_rate(record: &mut JobRecord) {
    if !record.is_filled(Field::BuyerHireRatePct) {
        let with_hires = record.get(Field::BuyerJobsWithHires).and_then(as_number);
        let posted = record.get(Field::BuyerPostedJobs).and_then(as_number);
        if let (Some(with_hires), Some(posted)) = (with_hires, posted)
            && posted > 0.0
        {
            let pct = (with_hires / posted * 100.0).round().clamp(0.0, 100.0);
            #[allow(clippy::cast_possible_truncation)]
            record.set(Field::BuyerHireRatePct, pct as i64);
        }
    }
    if let Some(pct) = record.get(Field::BuyerHireRatePct).and_then(as_number)
        && pct > 100.0
    {
        record.set(Field::BuyerHireRatePct, Value::from(100));
    }
}
