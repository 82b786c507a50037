use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::pipeline::ExtractContext;
use crate::domain::text::{normalize_level, parse_money};
use crate::domain::{Field, JobRecord, MissingFieldSet};
use crate::error::{Result, UpworkError};

static JOBS_POSTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+jobs posted").unwrap());
static OPEN_JOBS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s+open jobs?").unwrap());
static HIRE_RATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)%\s+hire rate").unwrap());
static SPEND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$([\dKk,.]+)").unwrap());
static HIRES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s+hires").unwrap());
static ACTIVE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s+active").unwrap());
static RATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$([\d.]+)").unwrap());
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").unwrap());
static BUDGET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$([\d,.]+)").unwrap());
static CONNECTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Required Connects to submit a proposal:\s*(\d+)").unwrap());

const CLIENT_FIELDS: &[Field] = &[
    Field::ClientCountry,
    Field::BuyerCity,
    Field::BuyerLocalTime,
    Field::ClientCompanySize,
    Field::ClientIndustry,
    Field::ClientTotalSpent,
    Field::ClientHires,
    Field::BuyerAvgHourlyRate,
    Field::BuyerHours,
    Field::ClientRating,
    Field::ClientReviews,
    Field::BuyerPostedJobs,
    Field::BuyerOpenJobs,
];

const CLIENT_SECTIONS: &[&str] = &[
    "div[data-test=about-client-container]",
    "div[data-test=AboutClientUser]",
    "div[data-test=AboutClientVisitor]",
];

/// Recover fields in `missing` from the rendered job page markup.
///
/// Every rule is independent: one that cannot match is logged and skipped.
/// The returned record only carries fields drawn from `missing`.
pub fn extract(document: &Html, missing: MissingFieldSet, ctx: &ExtractContext<'_>) -> JobRecord {
    let mut rules = HtmlRules {
        document,
        missing,
        ctx,
        out: JobRecord::new(),
    };
    rules.run();
    rules.out
}

struct HtmlRules<'d, 'c> {
    document: &'d Html,
    missing: MissingFieldSet,
    ctx: &'c ExtractContext<'c>,
    out: JobRecord,
}

impl<'d> HtmlRules<'d, '_> {
    fn run(&mut self) {
        self.run_rule("category", Self::category);
        self.run_rule("phone-verified", Self::phone_verified);

        let details = match first(self.document.root_element(), "div.job-details-content") {
            Ok(Some(details)) => details,
            Ok(None) => {
                debug!("No job-details-content block in page");
                return;
            }
            Err(e) => {
                debug!(error = %e, "Job details lookup failed");
                return;
            }
        };

        self.run_rule("client-features", |r| {
            match first(r.document.root_element(), "ul.features")? {
                Some(list) => r.client_features(list),
                None => Ok(()),
            }
        });
        self.run_rule("title", |r| r.title(details));
        self.run_rule("description", |r| r.description(details));
        self.run_rule("job-features", |r| r.job_features(details));
        self.run_rule("skills", |r| r.skills(details));
        self.run_rule("client-section", |r| r.client_section(details));
        self.run_rule("client-activity", |r| r.client_activity(details));
        self.run_rule("invites-sent", |r| {
            r.labelled_count(details, Field::InvitationsSent, "Invites sent:")
        });
        self.run_rule("unanswered-invites", |r| {
            r.labelled_count(details, Field::UnansweredInvites, "Unanswered invites:")
        });
        self.run_rule("connects", |r| r.connects(details));
        self.run_rule("payment-verified", |r| r.payment_verified(details));
    }

    fn run_rule(&mut self, rule: &'static str, apply: impl FnOnce(&mut Self) -> Result<()>) {
        if let Err(e) = apply(self) {
            debug!(rule, error = %e, "HTML rule skipped");
        }
    }

    /// Field is still open: missing upstream and not yet found here.
    fn wants(&self, field: Field) -> bool {
        self.missing.contains(field) && !self.out.is_filled(field)
    }

    fn put(&mut self, field: Field, value: impl Into<Value>) {
        if self.missing.contains(field) {
            self.out.set(field, value);
        }
    }

    fn put_text(&mut self, field: Field, raw: &str) {
        if let Some(value) = field.kind().coerce_text(raw) {
            self.put(field, value);
        }
    }

    fn put_capture(&mut self, field: Field, re: &Regex, haystack: &str) {
        if let Some(n) = capture_int(re, haystack) {
            self.put(field, n);
        }
    }

    /// Category is the part of `<title>` after the last `" - "`.
    fn category(&mut self) -> Result<()> {
        if !self.wants(Field::Category) {
            return Ok(());
        }
        let Some(title) = first(self.document.root_element(), "title")? else {
            return Ok(());
        };
        let text = stripped_text(title);
        if let Some((_, category)) = text.rsplit_once(" - ") {
            self.put(Field::Category, category.trim());
        }
        Ok(())
    }

    fn phone_verified(&mut self) -> Result<()> {
        if !self.wants(Field::PhoneVerified) {
            return Ok(());
        }
        let icon = css("div.payment-verified")?;
        let strong = css("strong")?;
        let verified = self
            .document
            .select(&css("div.d-flex")?)
            .any(|row| {
                row.select(&icon).next().is_some()
                    && row
                        .select(&strong)
                        .next()
                        .is_some_and(|s| stripped_text(s).contains("Phone number verified"))
            });
        self.put(Field::PhoneVerified, verified);
        Ok(())
    }

    /// About-the-client items keyed by `data-qa`.
    fn client_features(&mut self, list: ElementRef<'d>) -> Result<()> {
        let strong = css("strong")?;
        let div = css("div")?;
        let nowrap = css("span.nowrap")?;
        let spend = css("strong[data-qa=client-spend]")?;
        let hires = css("div[data-qa=client-hires]")?;
        let rate = css("strong[data-qa=client-hourly-rate]")?;
        let hours = css("div[data-qa=client-hours]")?;
        let industry = css("strong[data-qa=client-company-profile-industry]")?;
        let size = css("div[data-qa=client-company-profile-size]")?;

        for item in child_elements(list, "li") {
            match item.value().attr("data-qa").unwrap_or_default() {
                "client-location" => {
                    if let Some(country) = item.select(&strong).next() {
                        self.put(Field::ClientCountry, stripped_text(country));
                    }
                    if let Some(block) = item.select(&div).next() {
                        let mut spans = block.select(&nowrap);
                        if let Some(city) = spans.next() {
                            self.put(Field::BuyerCity, stripped_text(city));
                        }
                        if let Some(time) = spans.next() {
                            self.put(Field::BuyerLocalTime, stripped_text(time));
                        }
                    }
                }
                "client-job-posting-stats" => {
                    if let Some(posted) = item.select(&strong).next() {
                        self.put_capture(Field::BuyerPostedJobs, &JOBS_POSTED_RE, &raw_text(posted));
                    }
                    if let Some(block) = item.select(&div).next() {
                        let text = raw_text(block);
                        self.put_capture(Field::BuyerOpenJobs, &OPEN_JOBS_RE, &text);
                        self.put_capture(Field::BuyerHireRatePct, &HIRE_RATE_RE, &text);
                    }
                }
                "client-company-profile" => {
                    if let Some(el) = item.select(&industry).next() {
                        self.put(Field::ClientIndustry, stripped_text(el));
                    }
                    if let Some(el) = item.select(&size).next() {
                        self.put(Field::ClientCompanySize, stripped_text(el));
                    }
                }
                _ => {
                    if let Some(el) = item.select(&spend).next() {
                        let text = raw_text(el);
                        if let Some(amount) = SPEND_RE
                            .captures(&text)
                            .and_then(|c| parse_money(c.get(1)?.as_str()))
                        {
                            self.put(Field::ClientTotalSpent, amount);
                        }
                        if let Some(el) = item.select(&hires).next() {
                            let text = raw_text(el);
                            if let Some(n) = capture_int(&HIRES_RE, &text) {
                                self.put(Field::ClientHires, n);
                                self.put(Field::TotalHired, n);
                            }
                            self.put_capture(Field::BuyerActiveAssignments, &ACTIVE_RE, &text);
                        }
                    } else if let Some(el) = item.select(&rate).next() {
                        if let Some(amount) = RATE_RE
                            .captures(&raw_text(el))
                            .and_then(|c| c.get(1)?.as_str().parse::<f64>().ok())
                        {
                            self.put(Field::BuyerAvgHourlyRate, amount);
                        }
                        if let Some(el) = item.select(&hours).next() {
                            let text = raw_text(el).replace(',', "");
                            self.put_capture(Field::BuyerHours, &DIGITS_RE, &text);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn title(&mut self, details: ElementRef<'d>) -> Result<()> {
        if self.wants(Field::Title)
            && let Some(h4) = first(details, "h4")?
        {
            self.put(Field::Title, stripped_text(h4));
        }
        Ok(())
    }

    fn description(&mut self, details: ElementRef<'d>) -> Result<()> {
        if self.wants(Field::Description)
            && let Some(p) = first(details, "div[data-test=Description] p")?
        {
            self.put(Field::Description, line_text(p));
        }
        Ok(())
    }

    /// Type, duration, level and budget from the job's feature list.
    fn job_features(&mut self, details: ElementRef<'d>) -> Result<()> {
        let Some(features) = first(details, "ul.features")? else {
            return Ok(());
        };
        let strong_sel = css("strong")?;
        let descriptor = css("div.description")?;
        let budget = css("div[data-test=BudgetAmount] strong")?;

        let pricing_open = self.wants(Field::HourlyMin) && self.wants(Field::HourlyMax);
        let mut dollar_values = Vec::new();

        for item in features.select(&css("li")?) {
            let strong = item.select(&strong_sel).next();
            let desc = item.select(&descriptor).next().map(stripped_text);
            let desc = desc.as_deref().unwrap_or_default();

            if self.wants(Field::FixedBudget)
                && pricing_open
                && desc == "Fixed-price"
                && let Some(amount) = item
                    .select(&budget)
                    .next()
                    .and_then(|s| BUDGET_RE.captures(&stripped_text(s)).map(|c| c[1].replace(',', "")))
                    .and_then(|s| s.parse::<f64>().ok())
            {
                self.put(Field::FixedBudget, amount);
            }
            if self.wants(Field::Type) && matches!(desc, "Hourly" | "Fixed-price") {
                self.put(Field::Type, desc);
            }
            if let Some(strong) = strong {
                let value = stripped_text(strong);
                if self.wants(Field::Duration) && desc.contains("Duration") {
                    self.put(Field::Duration, value.as_str());
                }
                if self.wants(Field::Level) && desc.contains("Experience Level") {
                    self.put(Field::Level, normalize_level(&value));
                }
                if pricing_open
                    && let Some(amount) = value.strip_prefix('$')
                    && let Ok(amount) = amount.replace(',', "").parse::<f64>()
                {
                    dollar_values.push(amount);
                }
            }
        }

        match dollar_values[..] {
            [min, max, ..] => {
                self.put(Field::HourlyMin, min);
                self.put(Field::HourlyMax, max);
            }
            [min] => self.put(Field::HourlyMin, min),
            [] => {}
        }
        Ok(())
    }

    fn skills(&mut self, details: ElementRef<'d>) -> Result<()> {
        if !self.wants(Field::Skills) {
            return Ok(());
        }
        let skills: Vec<Value> = details
            .select(&css("div.air3-line-clamp")?)
            .map(stripped_text)
            .filter(|s| !s.is_empty())
            .map(Value::from)
            .collect();
        if !skills.is_empty() {
            self.put(Field::Skills, skills);
        }
        Ok(())
    }

    fn client_section(&mut self, details: ElementRef<'d>) -> Result<()> {
        if !CLIENT_FIELDS.iter().any(|f| self.wants(*f)) {
            return Ok(());
        }
        let mut section = None;
        for selector in CLIENT_SECTIONS {
            section = first(details, selector)?;
            if section.is_some() {
                break;
            }
        }
        let Some(section) = section else {
            if self.ctx.authenticated {
                debug!(job_id = self.ctx.job_id, "About-client section missing");
                self.ctx
                    .diagnostics
                    .dump("client_section_missing", &details.html());
            }
            return Ok(());
        };

        if let Some(list) = first(section, "ul.features")? {
            self.client_features(list)?;
        }
        if self.wants(Field::ClientRating)
            && let Some(rating) = first(section, "div.air3-rating-value-text")?
        {
            self.put_text(Field::ClientRating, &stripped_text(rating));
        }
        if self.wants(Field::ClientReviews)
            && let Some(reviews) = first(section, "span.nowrap.mt-1")?
        {
            self.put_text(Field::ClientReviews, &stripped_text(reviews));
        }
        Ok(())
    }

    /// `li.ca-item` title/value pairs under "Activity on this job".
    fn client_activity(&mut self, details: ElementRef<'d>) -> Result<()> {
        let wanted = [
            Field::Applicants,
            Field::TotalHired,
            Field::InvitedToInterview,
            Field::InvitationsSent,
            Field::UnansweredInvites,
        ];
        if !wanted.iter().any(|f| self.wants(*f)) {
            return Ok(());
        }
        let Some(section) = first(details, "section[data-test=ClientActivity]")? else {
            return Ok(());
        };
        let title_sel = css("span.title")?;
        let value_sel = css("div.value")?;
        for item in section.select(&css("li.ca-item")?) {
            let (Some(title), Some(value)) =
                (item.select(&title_sel).next(), item.select(&value_sel).next())
            else {
                continue;
            };
            let title = stripped_text(title);
            let value = stripped_text(value);
            let count = value.parse::<i64>().ok();
            let field = if title.starts_with("Proposals") {
                Field::Applicants
            } else if title.starts_with("Hires") {
                Field::TotalHired
            } else if title.starts_with("Interviewing") {
                Field::InvitedToInterview
            } else if title.starts_with("Invites sent") {
                Field::InvitationsSent
            } else if title.starts_with("Unanswered invites") {
                Field::UnansweredInvites
            } else {
                continue;
            };
            if !self.wants(field) {
                continue;
            }
            match (field, count) {
                (_, Some(n)) => self.put(field, n),
                // ranges such as "20 to 50" are kept verbatim
                (Field::Applicants, None) if !value.is_empty() => self.put(field, value),
                _ => {}
            }
        }
        Ok(())
    }

    /// First `li` mentioning `label`; its `div.value`, else `label N` in its text.
    fn labelled_count(&mut self, details: ElementRef<'d>, field: Field, label: &str) -> Result<()> {
        if !self.wants(field) {
            return Ok(());
        }
        let value_sel = css("div.value")?;
        let Some(item) = details
            .select(&css("li")?)
            .find(|li| raw_text(*li).contains(label))
        else {
            return Ok(());
        };
        if let Some(value) = item.select(&value_sel).next() {
            self.put_text(field, &stripped_text(value));
        } else {
            let pattern = Regex::new(&format!(r"{}\s*(\d+)", regex::escape(label)))
                .map_err(|e| UpworkError::rule(label, e.to_string()))?;
            self.put_capture(field, &pattern, &stripped_text(item));
        }
        Ok(())
    }

    fn connects(&mut self, details: ElementRef<'d>) -> Result<()> {
        if self.ctx.authenticated
            && self.wants(Field::ConnectsRequired)
            && let Some(block) = first(details, "div[data-test=ConnectsDesktop]")?
        {
            self.put_capture(Field::ConnectsRequired, &CONNECTS_RE, &stripped_text(block));
        }
        Ok(())
    }

    fn payment_verified(&mut self, details: ElementRef<'d>) -> Result<()> {
        if self.wants(Field::PaymentVerified) {
            let verified = details
                .text()
                .any(|t| t.contains("Payment method verified"));
            self.put(Field::PaymentVerified, verified);
        }
        Ok(())
    }
}

fn css(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| UpworkError::rule(selector, e.to_string()))
}

fn first<'d>(scope: ElementRef<'d>, selector: &str) -> Result<Option<ElementRef<'d>>> {
    Ok(scope.select(&css(selector)?).next())
}

fn child_elements<'d>(parent: ElementRef<'d>, tag: &'static str) -> impl Iterator<Item = ElementRef<'d>> {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == tag)
}

/// Trimmed text pieces glued together without separators.
fn stripped_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// Trimmed text pieces, one per line.
fn line_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn raw_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

fn capture_int(re: &Regex, haystack: &str) -> Option<i64> {
    re.captures(haystack)?.get(1)?.as_str().parse().ok()
}
