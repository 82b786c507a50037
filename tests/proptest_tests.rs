#![allow(clippy::cast_precision_loss)]

use std::time::Duration;

use proptest::prelude::*;
use serde_json::{Value, json};

use mcp_upwork::adapters::cache::LruRecordCache;
use mcp_upwork::adapters::diagnostics::NoopDiagnostics;
use mcp_upwork::adapters::extract::js_literal;
use mcp_upwork::adapters::extract::reference::Resolver;
use mcp_upwork::adapters::extract::{ExtractContext, extract};
use mcp_upwork::domain::text::{parse_count, parse_money};
use mcp_upwork::domain::{Field, JobRecord, UPWORK_ORIGIN};
use mcp_upwork::ports::cache::RecordCache;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Digits grouped with thousands separators, e.g. `12,345`.
fn with_separators(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn arb_title() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,40}"
}

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::from),
    ]
}

fn arb_payload() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(
                (
                    prop_oneof![
                        Just("title".to_string()),
                        Just("type".to_string()),
                        Just("budget".to_string()),
                        Just("amount".to_string()),
                        Just("buyer".to_string()),
                        Just("skills".to_string()),
                        "[a-z]{1,8}",
                    ],
                    inner
                ),
                0..6
            )
            .prop_map(|pairs| Value::Object(pairs.into_iter().collect())),
        ]
    })
}

fn run(html: &str) -> Option<JobRecord> {
    let sink = NoopDiagnostics;
    let ctx = ExtractContext {
        job_id: "~01prop",
        authenticated: false,
        origin: UPWORK_ORIGIN,
        diagnostics: &sink,
    };
    extract(html, &ctx).ok()
}

// ---------------------------------------------------------------------------
// Text parsing properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_money_reads_dollar_amounts(n in 0..10_000_000_u64) {
        let text = format!("${}", with_separators(n));
        prop_assert_eq!(parse_money(&text), Some(n as f64));
    }

    #[test]
    fn prop_money_k_suffix_multiplies(n in 1..1000_u64) {
        let text = format!("${n}K total spent");
        prop_assert_eq!(parse_money(&text), Some(n as f64 * 1000.0));
    }

    #[test]
    fn prop_count_ignores_separators(n in 0..10_000_000_i64) {
        let text = format!("{} hours", with_separators(n.unsigned_abs()));
        prop_assert_eq!(parse_count(&text), Some(n));
    }
}

// ---------------------------------------------------------------------------
// Reference resolver properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_identity_resolver_is_noop(value in arb_payload()) {
        prop_assert_eq!(Resolver::Identity.resolve(&value), &value);
        prop_assert_eq!(Resolver::Identity.resolve_deep(&value), value);
    }

    #[test]
    fn prop_index_resolves_to_interned_string(
        strings in prop::collection::vec("[a-z]{1,10}", 1..20),
        pick in any::<prop::sample::Index>(),
    ) {
        let root = Value::Array(strings.iter().cloned().map(Value::from).collect());
        let index = pick.index(strings.len());
        let resolver = Resolver::for_root(&root);
        let placeholder = json!(index);
        let expected = Value::from(strings[index].clone());
        prop_assert_eq!(resolver.resolve(&placeholder), &expected);
    }

    #[test]
    fn prop_out_of_range_index_is_literal(len in 1..20_usize, extra in 0..100_usize) {
        let root = Value::Array(vec![json!("x"); len]);
        let literal = json!(len + extra);
        prop_assert_eq!(Resolver::for_root(&root).resolve(&literal), &literal);
    }

    #[test]
    fn prop_deep_resolution_terminates(payload in arb_payload()) {
        let root = json!([payload.clone(), payload]);
        let resolver = Resolver::for_root(&root);
        let _ = resolver.resolve_deep(&root);
    }
}

// ---------------------------------------------------------------------------
// Extraction properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_extraction_is_idempotent(title in arb_title(), amount in 3..100_000_u32) {
        let payload = json!([{"job": 1}, {"title": 2, "type": "fixed", "budget": {"amount": amount}}, title]);
        let html = format!(
            r#"<html><body><script id="__NUXT_DATA__" type="application/json">{payload}</script></body></html>"#
        );
        let first = run(&html).unwrap();
        let second = run(&html).unwrap();
        prop_assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        prop_assert_eq!(first.get_str(Field::Title), Some(title.as_str()));
        prop_assert_eq!(first.get(Field::FixedBudget), Some(&json!(amount)));
        prop_assert_eq!(first.get(Field::HourlyMin), Some(&json!(0)));
    }

    #[test]
    fn prop_pricing_is_exclusive(payload in arb_payload(), hourly in any::<bool>()) {
        let kind = if hourly { "hourly" } else { "fixed" };
        let root = json!([{"job": payload, "type": kind, "hourly_min": 5, "fixed_budget_amount": 9}]);
        let record = run(&root.to_string()).unwrap();
        match record.get_str(Field::Type) {
            Some("Hourly") => {
                prop_assert_eq!(record.get(Field::FixedBudget), Some(&json!(0)));
            }
            Some("Fixed-price") => {
                prop_assert_eq!(record.get(Field::HourlyMin), Some(&json!(0)));
                prop_assert_eq!(record.get(Field::HourlyMax), Some(&json!(0)));
            }
            _ => {}
        }
    }

    #[test]
    fn prop_arbitrary_markup_never_panics(html in "\\PC{0,400}") {
        if let Some(record) = run(&html) {
            prop_assert_eq!(record.get_str(Field::JobId), Some("~01prop"));
            prop_assert_eq!(serde_json::to_value(&record).unwrap().as_object().unwrap().len(), Field::COUNT);
        }
    }

    #[test]
    fn prop_js_literal_never_panics(src in "[{}\\[\\](),:;=\"'`a-z0-9 !.-]{0,200}") {
        let _ = js_literal::parse(&src);
    }

    #[test]
    fn prop_js_literal_accepts_json(payload in arb_payload()) {
        prop_assert_eq!(js_literal::parse(&payload.to_string()).unwrap(), payload);
    }
}

// ---------------------------------------------------------------------------
// Cache properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_cache_returns_what_was_stored(
        entries in prop::collection::vec(("[a-z]{1,8}", "[a-z0-9]{0,16}"), 1..30),
    ) {
        let cache = LruRecordCache::new(100);
        for (key, value) in &entries {
            cache.set(key, value, Duration::from_secs(60));
        }
        let (last_key, _) = entries.last().unwrap();
        let expected = entries.iter().rev().find(|(k, _)| k == last_key).map(|(_, v)| v.clone());
        prop_assert_eq!(cache.get(last_key), expected);
    }

    #[test]
    fn prop_cache_never_exceeds_capacity(
        capacity in 1..20_usize,
        keys in prop::collection::vec("[a-z]{1,6}", 0..60),
    ) {
        let cache = LruRecordCache::new(capacity);
        for key in &keys {
            cache.set(key, "v", Duration::from_secs(60));
        }
        prop_assert!(cache.len() <= capacity);
    }
}
