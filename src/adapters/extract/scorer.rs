use serde_json::{Map, Value};

use super::tree_walker::{JsonPath, TreeWalker};

/// Keys that mark an object as describing a job posting or its client.
const JOB_VOCABULARY: &[&str] = &[
    "title",
    "description",
    "ciphertext",
    "uid",
    "type",
    "budget",
    "amount",
    "currencyCode",
    "extendedBudgetInfo",
    "hourlyBudgetMin",
    "hourlyBudgetMax",
    "engagementDuration",
    "durationLabel",
    "contractorTier",
    "category",
    "categoryGroup",
    "skills",
    "clientActivity",
    "totalApplicants",
    "applicants",
    "createdOn",
    "publishTime",
    "postedOn",
    "isContractToHire",
    "numberOfPositionsToHire",
    "qualifications",
    "questions",
    "isPremium",
    "buyer",
    "client",
];

/// Number of keys in `value` that belong to the job vocabulary.
///
/// Keys match exactly or after lower-casing both sides.
pub fn score(value: &Value) -> usize {
    value.as_object().map_or(0, score_object)
}

pub fn score_object(map: &Map<String, Value>) -> usize {
    map.keys().filter(|k| is_vocabulary_key(k)).count()
}

fn is_vocabulary_key(key: &str) -> bool {
    JOB_VOCABULARY
        .iter()
        .any(|v| *v == key || v.eq_ignore_ascii_case(key))
}

/// The highest-scoring object under `root`; earliest wins ties.
pub fn best_candidate(root: &Value) -> Option<(&Map<String, Value>, JsonPath)> {
    let mut best: Option<(&Map<String, Value>, JsonPath, usize)> = None;
    for (map, path) in TreeWalker::new(root) {
        let s = score_object(map);
        if s > 0 && best.as_ref().is_none_or(|(_, _, top)| s > *top) {
            best = Some((map, path, s));
        }
    }
    best.map(|(map, path, _)| (map, path))
}
