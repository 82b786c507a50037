use std::time::Duration;

/// String-keyed store for serialized job records.
pub trait RecordCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str, ttl: Duration);
}
