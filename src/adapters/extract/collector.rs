use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::trace;

use super::reference::Resolver;
use super::tree_walker::{JsonPath, TreeWalker};
use crate::domain::text::{canonical_contract_type, is_emptyish};
use crate::domain::{FIXED_PRICE, Field, FieldKind, HOURLY, JobRecord};

/// A value seen under some key, with the path of its enclosing object.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub value: Value,
    pub path: JsonPath,
}

/// Payload keys that feed a field under a different name.
const ALIASES: &[(Field, &[&str])] = &[
    (Field::Applicants, &["totalApplicants"]),
    (Field::Currency, &["currencyCode"]),
    (Field::Duration, &["durationLabel"]),
    (Field::HourlyMin, &["hourlyBudgetMin"]),
    (Field::HourlyMax, &["hourlyBudgetMax"]),
    (Field::PublishedAt, &["publishTime", "postedOn"]),
    (Field::CreatedAt, &["createdOn", "postedOn"]),
    (Field::Premium, &["isPremium"]),
    (Field::EnterpriseJob, &["isEnterprise"]),
    (Field::PaymentVerified, &["isPaymentMethodVerified"]),
    (Field::PhoneVerified, &["isPhoneVerified"]),
    (Field::TotalHired, &["totalHired"]),
    (Field::InvitedToInterview, &["totalInvitedToInterview"]),
    (Field::InvitationsSent, &["invitationsSent"]),
    (Field::UnansweredInvites, &["unansweredInvites"]),
    (Field::ConnectsRequired, &["requiredConnects"]),
];

/// Fields read from a sub-key of a nested object, as `(field, key, sub-pointer)`.
const NESTED: &[(Field, &str, &str)] = &[
    (Field::FixedBudget, "budget", "/amount"),
    (Field::Duration, "engagementDuration", "/label"),
    (Field::CategoryName, "category", "/name"),
    (Field::CategorySlug, "category", "/urlSlug"),
    (Field::CategoryGroupName, "categoryGroup", "/name"),
    (Field::CategoryGroupSlug, "categoryGroup", "/urlSlug"),
];

/// Sub-fields flattened out of a buyer's nested sections.
const BUYER_SECTIONS: &[(&str, &[(&str, Field)])] = &[
    (
        "location",
        &[
            ("/city", Field::BuyerCity),
            ("/countryTimezone", Field::BuyerTimezone),
            ("/offsetFromUtcMillis", Field::BuyerUtcOffset),
            ("/localTime", Field::BuyerLocalTime),
            ("/country", Field::ClientCountry),
        ],
    ),
    (
        "stats",
        &[
            ("/activeAssignmentsCount", Field::BuyerActiveAssignments),
            ("/hoursCount", Field::BuyerHours),
            ("/totalJobsWithHires", Field::BuyerJobsWithHires),
            ("/score", Field::ClientRating),
            ("/feedbackCount", Field::ClientReviews),
            ("/totalAssignments", Field::ClientHires),
            ("/totalCharges/amount", Field::ClientTotalSpent),
        ],
    ),
    (
        "jobs",
        &[
            ("/openCount", Field::BuyerOpenJobs),
            ("/postedCount", Field::BuyerPostedJobs),
        ],
    ),
    (
        "company",
        &[
            ("/contractDate", Field::BuyerContractDate),
            ("/profile/industry", Field::ClientIndustry),
            ("/profile/size", Field::ClientCompanySize),
        ],
    ),
    ("avgHourlyJobsRate", &[("/amount", Field::BuyerAvgHourlyRate)]),
];

const BUYER_FLAGS: &[(&str, Field)] = &[
    ("isPaymentMethodVerified", Field::PaymentVerified),
    ("isEnterprise", Field::EnterpriseJob),
];

const SKILL_GROUPS: &str = "ontologySkills";
const EXTRA_SKILLS: &str = "additionalSkills";

#[derive(Debug, Clone)]
pub struct CollectorOptions<'a> {
    pub authenticated: bool,
    pub origin: &'a str,
}

/// Gathers every value seen for each recognized key while walking a payload.
pub struct FieldCollector<'r> {
    resolver: Resolver<'r>,
    by_key: HashMap<&'static str, Vec<Candidate>>,
    buyer: JobRecord,
}

impl<'r> FieldCollector<'r> {
    pub fn new(resolver: Resolver<'r>) -> Self {
        Self {
            resolver,
            by_key: HashMap::new(),
            buyer: JobRecord::new(),
        }
    }

    /// Walk `root` and observe every object in it.
    pub fn walk(resolver: Resolver<'r>, root: &Value) -> Self {
        let mut collector = Self::new(resolver);
        for (map, path) in TreeWalker::new(root) {
            collector.observe(map, &path);
        }
        collector
    }

    pub fn observe(&mut self, map: &Map<String, Value>, path: &JsonPath) {
        for (key, raw) in map {
            if let Some(tracked) = tracked_key(key) {
                let value = self.resolver.resolve(raw).clone();
                self.by_key.entry(tracked).or_default().push(Candidate {
                    value,
                    path: path.clone(),
                });
            }
        }

        if let Some(raw) = map.get("buyer") {
            let buyer = self.resolver.resolve_deep(raw);
            if let Value::Object(buyer) = &buyer {
                trace!(%path, "Flattening buyer object");
                flatten_buyer(buyer, &mut self.buyer);
            }
        }

        if path.contains_key("buyer")
            && let Some(section) = path.last_key()
            && let Some((_, rules)) = BUYER_SECTIONS.iter().find(|(name, _)| *name == section)
        {
            let resolved = self.resolver.resolve_deep(&Value::Object(map.clone()));
            flatten_section(&resolved, rules, &mut self.buyer);
        }
    }

    pub fn candidates(&self, key: &str) -> &[Candidate] {
        self.by_key.get(key).map_or(&[], Vec::as_slice)
    }

    /// Reduce the candidates for `key` that fit the field's kind.
    fn select(&self, key: &str, kind: FieldKind) -> Option<Value> {
        let admissible: Vec<&Value> = self
            .candidates(key)
            .iter()
            .map(|c| &c.value)
            .filter(|v| kind.admits(v))
            .collect();
        reduce(&admissible)
    }

    /// Build the flat record from everything observed.
    pub fn into_record(self, options: &CollectorOptions<'_>) -> JobRecord {
        let mut record = JobRecord::new();

        for field in Field::ALL.iter().copied() {
            if field == Field::JobId || (field == Field::ConnectsRequired && !options.authenticated)
            {
                continue;
            }
            if let Some(value) = self.select(field.name(), field.kind()) {
                record.set(field, self.finish_value(field, value));
            }
        }

        for (field, key, pointer) in NESTED {
            if record.is_filled(*field) {
                continue;
            }
            let found = self
                .candidates(key)
                .iter()
                .map(|c| self.resolver.resolve_deep(&c.value))
                .find_map(|v| v.pointer(pointer).filter(|x| !is_emptyish(x)).cloned());
            if let Some(value) = found {
                record.offer(*field, value);
            }
        }

        for (field, keys) in ALIASES {
            if *field == Field::ConnectsRequired && !options.authenticated {
                continue;
            }
            for key in *keys {
                if record.is_filled(*field) {
                    break;
                }
                if let Some(value) = self.select(key, field.kind()) {
                    record.offer(*field, value);
                }
            }
        }

        if !record.is_filled(Field::Skills) {
            let skills = self.skills_from_groups();
            if !skills.is_empty() {
                record.set(Field::Skills, skills);
            }
        }

        record.merge_from(&self.buyer);

        absolutize_url(&mut record, options.origin);
        normalize_contract_type(&mut record);
        record.enforce_pricing_exclusivity();
        record
    }

    fn finish_value(&self, field: Field, value: Value) -> Value {
        match field.kind() {
            FieldKind::TextList => skill_names(&self.resolver.resolve_deep(&value)),
            FieldKind::Records => self.resolver.resolve_deep(&value),
            _ => value,
        }
    }

    /// Skill names from ontology groups' children, then additional skills.
    fn skills_from_groups(&self) -> Vec<Value> {
        let mut names = Vec::new();
        if let Some(groups) = self.candidates(SKILL_GROUPS).first()
            && let Value::Array(groups) = self.resolver.resolve_deep(&groups.value)
        {
            for group in &groups {
                if let Some(Value::Array(children)) = group.get("children") {
                    names.extend(children.iter().filter_map(skill_name));
                }
            }
        }
        if let Some(extra) = self.candidates(EXTRA_SKILLS).first()
            && let Value::Array(extra) = self.resolver.resolve_deep(&extra.value)
        {
            names.extend(extra.iter().filter_map(skill_name));
        }
        names
    }
}

/// Collect a payload into a record in one go.
pub fn collect(root: &Value, resolver: Resolver<'_>, options: &CollectorOptions<'_>) -> JobRecord {
    FieldCollector::walk(resolver, root).into_record(options)
}

/// Pick one value among candidates found in traversal order.
///
/// Empty-ish candidates are dropped; among all-string survivors the longest
/// wins (first on ties), otherwise the first survivor. When every candidate
/// was empty-ish the first raw value is kept as a "found but empty" signal.
pub fn reduce(candidates: &[&Value]) -> Option<Value> {
    let first = candidates.first()?;
    let live: Vec<&Value> = candidates
        .iter()
        .copied()
        .filter(|v| !is_emptyish(v))
        .collect();
    let Some(head) = live.first() else {
        return Some((*first).clone());
    };
    if live.iter().all(|v| v.is_string()) {
        let longest = live.iter().copied().fold(*head, |best, v| {
            if char_len(v) > char_len(best) { v } else { best }
        });
        return Some(longest.clone());
    }
    Some((*head).clone())
}

fn char_len(value: &Value) -> usize {
    value.as_str().map_or(0, |s| s.chars().count())
}

fn tracked_key(key: &str) -> Option<&'static str> {
    if let Some(field) = Field::from_name(key) {
        return Some(field.name());
    }
    ALIASES
        .iter()
        .flat_map(|(_, keys)| keys.iter())
        .chain(NESTED.iter().map(|(_, k, _)| k))
        .chain([&SKILL_GROUPS, &EXTRA_SKILLS])
        .find(|k| **k == key)
        .copied()
}

fn flatten_buyer(buyer: &Map<String, Value>, out: &mut JobRecord) {
    for (section, rules) in BUYER_SECTIONS {
        if let Some(value @ Value::Object(_)) = buyer.get(*section) {
            flatten_section(value, rules, out);
        }
    }
    for (key, field) in BUYER_FLAGS {
        if let Some(value) = buyer.get(*key) {
            offer_typed(out, *field, value);
        }
    }
}

fn flatten_section(section: &Value, rules: &[(&str, Field)], out: &mut JobRecord) {
    for (pointer, field) in rules {
        if let Some(value) = section.pointer(pointer) {
            offer_typed(out, *field, value);
        }
    }
}

fn offer_typed(out: &mut JobRecord, field: Field, value: &Value) {
    if !is_emptyish(value) && field.kind().admits(value) {
        out.set_if_absent(field, value.clone());
    }
}

fn skill_name(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) if !s.is_empty() => Some(Value::String(s.clone())),
        Value::Object(map) => ["name", "prefLabel", "prettyName"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string())),
        _ => None,
    }
}

fn skill_names(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().filter_map(skill_name).collect()),
        other => other.clone(),
    }
}

fn absolutize_url(record: &mut JobRecord, origin: &str) {
    if let Some(path) = record.get_str(Field::Url)
        && path.starts_with('/')
    {
        let absolute = format!("{}{path}", origin.trim_end_matches('/'));
        record.set(Field::Url, absolute);
    }
}

/// Canonicalize `type`, inferring it from pricing fields when unrecognized.
pub(crate) fn normalize_contract_type(record: &mut JobRecord) {
    let explicit = match record.get(Field::Type) {
        Some(Value::String(raw)) => canonical_contract_type(raw),
        Some(Value::Number(code)) => contract_type_code(code.as_i64()),
        _ => None,
    };
    if let Some(token) = explicit {
        record.set(Field::Type, token);
        return;
    }
    let numeric = |f: Field| record.get(f).is_some_and(Value::is_number);
    let inferred = if numeric(Field::HourlyMin) || numeric(Field::HourlyMax) {
        canonical_contract_type("hourly")
    } else if numeric(Field::FixedBudget) {
        canonical_contract_type("fixed")
    } else {
        None
    };
    if let Some(token) = inferred {
        record.set(Field::Type, token);
    }
}

/// Numeric contract-type codes used by the embedded state.
pub(crate) fn contract_type_code(code: Option<i64>) -> Option<&'static str> {
    match code? {
        1 => Some(FIXED_PRICE),
        2 => Some(HOURLY),
        _ => None,
    }
}
