use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::collector::{self, contract_type_code};
use super::js_literal;
use super::pipeline::ExtractContext;
use super::reference::Resolver;
use crate::domain::text::is_emptyish;
use crate::domain::{Field, JobRecord};
use crate::error::{Result, UpworkError};

const MARKER: &str = "window.__NUXT__";

/// Locate the `window.__NUXT__=` assignment and return its right-hand side.
pub fn locate(document: &Html) -> Option<String> {
    let selector = Selector::parse("script").ok()?;
    document.select(&selector).find_map(|script| {
        let text = script.text().collect::<String>();
        let rhs = text.trim().strip_prefix(MARKER)?.trim_start().strip_prefix('=')?;
        Some(rhs.trim().trim_end_matches(';').trim_end().to_string())
    })
}

/// Evaluate the embedded state literal.
pub fn decode(document: &Html) -> Result<Value> {
    let source = locate(document).ok_or_else(|| UpworkError::not_found(MARKER))?;
    js_literal::parse(&source)
}

/// Read the job record out of the evaluated `window.__NUXT__` state.
///
/// The well-known `state.jobDetails` layout is mapped first; the generic
/// collector then fills whatever that mapping left open.
pub fn extract(document: &Html, ctx: &ExtractContext<'_>) -> Result<JobRecord> {
    let state = decode(document)?;
    let mut record = map_job_details(&state, ctx.authenticated);
    debug!(direct = record.filled_count(), "Mapped job details state");

    let collected = collector::collect(&state, Resolver::Identity, &ctx.collector_options());
    record.merge_from(&collected);
    record.enforce_pricing_exclusivity();
    Ok(record)
}

/// Direct mapping of `state.jobDetails.{job, buyer, sands, connects}`.
pub fn map_job_details(state: &Value, authenticated: bool) -> JobRecord {
    let mut record = JobRecord::new();
    let Some(details) = state.pointer("/state/jobDetails") else {
        return record;
    };
    let Some(job) = details.get("job").filter(|j| j.is_object()) else {
        return record;
    };
    let buyer = details.get("buyer").filter(|b| b.is_object());

    let mut put = |field: Field, value: Option<&Value>| {
        if let Some(value) = value {
            record.offer(field, value.clone());
        }
    };

    put(Field::Title, job.get("title"));
    put(Field::Description, job.get("description"));
    put(Field::FixedBudget, job.pointer("/budget/amount"));
    put(Field::Currency, job.pointer("/budget/currencyCode"));
    if let Some(info) = job.get("extendedBudgetInfo") {
        put(Field::HourlyMin, Some(info.get("hourlyBudgetMin").unwrap_or(&Value::Null)));
        put(Field::HourlyMax, Some(info.get("hourlyBudgetMax").unwrap_or(&Value::Null)));
    }
    put(Field::Duration, job.pointer("/engagementDuration/label"));

    if let Some(tier) = job.get("contractorTier") {
        put(Field::ContractorTier, Some(tier));
        let level = match tier.as_i64() {
            Some(1) => Value::from("ENTRY_LEVEL"),
            Some(2) => Value::from("INTERMEDIATE"),
            Some(3) => Value::from("EXPERT"),
            _ => tier.clone(),
        };
        put(Field::Level, Some(&level));
    }
    if let Some(kind) = job.get("type") {
        let token = contract_type_code(kind.as_i64()).map_or(Value::Null, Value::from);
        put(Field::Type, Some(&token));
    }

    if let Some(activity) = job.get("clientActivity") {
        put(Field::TotalHired, activity.get("totalHired"));
        put(Field::InvitedToInterview, activity.get("totalInvitedToInterview"));
        put(Field::Applicants, activity.get("totalApplicants"));
        put(Field::InvitationsSent, activity.get("invitationsSent"));
        put(Field::UnansweredInvites, activity.get("unansweredInvites"));
        put(Field::LastBuyerActivity, activity.get("lastBuyerActivity"));
    }

    if authenticated {
        put(
            Field::ConnectsRequired,
            details
                .get("connects")
                .filter(|c| !is_emptyish(c))
                .and_then(|c| c.get("requiredConnects")),
        );
    }

    if let Some(buyer) = buyer {
        put(Field::PaymentVerified, buyer.get("isPaymentMethodVerified"));
        put(Field::EnterpriseJob, buyer.get("isEnterprise"));
        put(Field::BuyerContractDate, buyer.pointer("/company/contractDate"));
        put(Field::BuyerTimezone, buyer.pointer("/location/countryTimezone"));
        put(Field::BuyerUtcOffset, buyer.pointer("/location/offsetFromUtcMillis"));
        put(Field::BuyerJobsWithHires, buyer.pointer("/stats/totalJobsWithHires"));
    }

    put(Field::CategoryName, job.pointer("/category/name"));
    put(Field::CategorySlug, job.pointer("/category/urlSlug"));
    put(Field::CategoryGroupName, job.pointer("/categoryGroup/name"));
    put(Field::CategoryGroupSlug, job.pointer("/categoryGroup/urlSlug"));
    put(Field::IsContractToHire, job.get("isContractToHire"));
    put(Field::PositionsToHire, job.get("numberOfPositionsToHire"));
    put(Field::Premium, job.get("isPremium"));
    put(Field::Qualifications, job.get("qualifications"));
    put(Field::Questions, job.get("questions"));
    put(Field::CreatedAt, job.get("createdOn"));
    put(Field::PublishedAt, job.get("publishTime"));

    let skills = sands_skills(details.get("sands"));
    if !skills.is_empty() {
        record.set(Field::Skills, skills);
    }
    record
}

fn sands_skills(sands: Option<&Value>) -> Vec<Value> {
    let Some(sands) = sands else {
        return Vec::new();
    };
    let name = |skill: &Value| skill.get("name").cloned();
    let mut skills: Vec<Value> = sands
        .get("ontologySkills")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|group| group.get("children").and_then(Value::as_array))
        .flatten()
        .filter_map(name)
        .collect();
    skills.extend(
        sands
            .get("additionalSkills")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(name),
    );
    skills
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::diagnostics::NoopDiagnostics;
    use crate::domain::UPWORK_ORIGIN;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn page(script: &str) -> Html {
        Html::parse_document(&format!(
            "<html><head><script>var x = 1;</script><script>{script}</script></head><body></body></html>"
        ))
    }

    fn ctx(sink: &NoopDiagnostics, authenticated: bool) -> ExtractContext<'_> {
        ExtractContext {
            job_id: "01abc",
            authenticated,
            origin: UPWORK_ORIGIN,
            diagnostics: sink,
        }
    }

    #[test]
    fn locates_assignment_and_strips_semicolon() {
        let doc = page("window.__NUXT__ = {state:{}};");
        assert_eq!(locate(&doc).as_deref(), Some("{state:{}}"));
    }

    #[test]
    fn missing_script_is_not_found() {
        let doc = page("window.other = {}");
        assert!(matches!(
            decode(&doc),
            Err(UpworkError::PayloadNotFound { .. })
        ));
    }

    #[test]
    fn broken_literal_is_malformed() {
        let doc = page("window.__NUXT__={state:{jobDetails:");
        assert!(matches!(
            decode(&doc),
            Err(UpworkError::PayloadMalformed { .. })
        ));
    }

    #[test]
    fn maps_job_details_directly() {
        let state = json!({"state": {"jobDetails": {
            "job": {
                "title": "ETL pipeline",
                "type": 2,
                "contractorTier": 3,
                "extendedBudgetInfo": {"hourlyBudgetMin": 30, "hourlyBudgetMax": 55},
                "clientActivity": {"totalApplicants": 14, "lastBuyerActivity": "2024-05-03"},
                "category": {"name": "Data Engineering", "urlSlug": "data-engineering"},
                "createdOn": "2024-05-01T00:00:00Z"
            },
            "buyer": {
                "isPaymentMethodVerified": true,
                "location": {"countryTimezone": "America/Chicago (UTC-05:00)"}
            },
            "sands": {
                "ontologySkills": [{"children": [{"name": "Python"}]}],
                "additionalSkills": [{"name": "Airflow"}]
            },
            "connects": {"requiredConnects": 12}
        }}});
        let record = map_job_details(&state, false);
        assert_eq!(record.get_str(Field::Title), Some("ETL pipeline"));
        assert_eq!(record.get_str(Field::Type), Some("Hourly"));
        assert_eq!(record.get_str(Field::Level), Some("EXPERT"));
        assert_eq!(record.get(Field::ContractorTier), Some(&json!(3)));
        assert_eq!(record.get(Field::HourlyMin), Some(&json!(30)));
        assert_eq!(record.get(Field::Applicants), Some(&json!(14)));
        assert_eq!(record.get(Field::PaymentVerified), Some(&json!(true)));
        assert_eq!(record.get(Field::Skills), Some(&json!(["Python", "Airflow"])));
        assert_eq!(record.get_str(Field::CategorySlug), Some("data-engineering"));
        assert!(!record.is_set(Field::ConnectsRequired));

        let authed = map_job_details(&state, true);
        assert_eq!(authed.get(Field::ConnectsRequired), Some(&json!(12)));
    }

    #[test]
    fn unknown_tier_is_kept_raw() {
        let state = json!({"state": {"jobDetails": {"job": {"contractorTier": 9}}}});
        let record = map_job_details(&state, false);
        assert_eq!(record.get(Field::Level), Some(&json!(9)));
    }

    #[test]
    fn extract_merges_collector_results() {
        let doc = page(
            r#"window.__NUXT__=(function(a,b){return {state:{jobDetails:{job:{title:a,type:1,budget:{amount:b,currencyCode:"USD"}},buyer:{stats:{totalCharges:{amount:9000}}}}}}}("Logo design",250));"#,
        );
        let sink = NoopDiagnostics;
        let record = extract(&doc, &ctx(&sink, false)).unwrap();
        assert_eq!(record.get_str(Field::Title), Some("Logo design"));
        assert_eq!(record.get_str(Field::Type), Some("Fixed-price"));
        assert_eq!(record.get(Field::FixedBudget), Some(&json!(250)));
        assert_eq!(record.get(Field::HourlyMin), Some(&json!(0)));
        assert_eq!(record.get(Field::HourlyMax), Some(&json!(0)));
        assert_eq!(record.get(Field::ClientTotalSpent), Some(&json!(9000)));
    }
}
