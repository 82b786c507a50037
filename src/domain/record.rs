use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::field::Field;
use super::text::is_emptyish;

/// Display token for hourly contracts.
pub const HOURLY: &str = "Hourly";
/// Display token for fixed-price contracts.
pub const FIXED_PRICE: &str = "Fixed-price";

/// Flat, fixed-schema record for one job page.
///
/// Every slot corresponds to one [`Field`]. A slot can be unset, set to an
/// empty-ish sentinel (`null`, `""`, `[]`, `{}`), or filled.
#[derive(Clone, PartialEq)]
pub struct JobRecord {
    values: [Option<Value>; Field::COUNT],
}

impl Default for JobRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRecord {
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|_| None),
        }
    }

    pub fn get(&self, field: Field) -> Option<&Value> {
        self.values[field.index()].as_ref()
    }

    pub fn get_str(&self, field: Field) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Overwrite the slot unconditionally.
    pub fn set(&mut self, field: Field, value: impl Into<Value>) {
        self.values[field.index()] = Some(value.into());
    }

    /// Write only when the slot is not yet filled. Returns whether it wrote.
    pub fn set_if_absent(&mut self, field: Field, value: impl Into<Value>) -> bool {
        if self.is_filled(field) {
            return false;
        }
        self.set(field, value);
        true
    }

    /// Merge a single value with first-writer-wins semantics.
    ///
    /// A filled value lands on a slot that is not filled; an empty-ish
    /// sentinel lands only on an unset slot. Returns whether a filled value
    /// was written.
    pub fn offer(&mut self, field: Field, value: Value) -> bool {
        if is_emptyish(&value) {
            if !self.is_set(field) {
                self.set(field, value);
            }
            false
        } else {
            self.set_if_absent(field, value)
        }
    }

    /// A listing is strictly one pricing model: zero the other model's fields.
    pub fn enforce_pricing_exclusivity(&mut self) {
        let contract = self.get_str(Field::Type);
        let (hourly, fixed) = (contract == Some(HOURLY), contract == Some(FIXED_PRICE));
        if hourly {
            self.set(Field::FixedBudget, 0);
        } else if fixed {
            self.set(Field::HourlyMin, 0);
            self.set(Field::HourlyMax, 0);
        }
    }

    /// The slot holds something, possibly an empty-ish sentinel.
    pub fn is_set(&self, field: Field) -> bool {
        self.values[field.index()].is_some()
    }

    /// The slot holds a value that is not empty-ish.
    pub fn is_filled(&self, field: Field) -> bool {
        self.get(field).is_some_and(|v| !is_emptyish(v))
    }

    pub fn missing_fields(&self) -> MissingFieldSet {
        Field::ALL
            .iter()
            .copied()
            .filter(|f| !self.is_filled(*f))
            .collect()
    }

    pub fn filled_count(&self) -> usize {
        Field::ALL.iter().filter(|f| self.is_filled(**f)).count()
    }

    /// First-writer-wins merge of a later-priority record into this one.
    ///
    /// A filled value from `other` lands only on slots that are not filled
    /// here; an empty-ish sentinel from `other` lands only on unset slots.
    /// Returns the number of slots that were filled by the merge.
    pub fn merge_from(&mut self, other: &JobRecord) -> usize {
        let mut filled = 0;
        for field in Field::ALL.iter().copied() {
            if let Some(value) = other.get(field)
                && self.offer(field, value.clone())
            {
                filled += 1;
            }
        }
        filled
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, Option<&Value>)> {
        Field::ALL.iter().map(|f| (*f, self.get(*f)))
    }

    /// Render as an ordered JSON object with `null` for unset slots.
    pub fn to_json(&self) -> Value {
        let map = self
            .iter()
            .map(|(f, v)| (f.name().to_string(), v.cloned().unwrap_or(Value::Null)))
            .collect();
        Value::Object(map)
    }
}

impl fmt::Debug for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, value) in self.iter() {
            if let Some(v) = value {
                map.entry(&field.name(), v);
            }
        }
        map.finish()
    }
}

impl fmt::Display for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self.get_str(Field::Title).unwrap_or("Untitled job");
        let id = self.get_str(Field::JobId).unwrap_or("?");
        writeln!(f, "## {title} (job {id})")?;
        for (field, value) in self.iter() {
            if let Some(v) = value.filter(|v| !is_emptyish(v)) {
                match v {
                    Value::String(s) => writeln!(f, "- {field}: {s}")?,
                    other => writeln!(f, "- {field}: {other}")?,
                }
            }
        }
        Ok(())
    }
}

impl Serialize for JobRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Field::COUNT))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.name(), value.unwrap_or(&Value::Null))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for JobRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = JobRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a job record object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<JobRecord, A::Error> {
                let mut record = JobRecord::new();
                while let Some(key) = access.next_key::<String>()? {
                    let value: Value = access.next_value()?;
                    if let Some(field) = Field::from_name(&key)
                        && !value.is_null()
                    {
                        record.set(field, value);
                    }
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// Fields not yet populated with a non-empty value.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct MissingFieldSet {
    bits: u64,
}

const _: () = assert!(Field::COUNT <= 64);

impl MissingFieldSet {
    pub fn all() -> Self {
        Field::ALL.iter().copied().collect()
    }

    pub fn contains(self, field: Field) -> bool {
        self.bits & (1 << field.index()) != 0
    }

    pub fn insert(&mut self, field: Field) {
        self.bits |= 1 << field.index();
    }

    pub fn len(self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Field> {
        Field::ALL.iter().copied().filter(move |f| self.contains(*f))
    }
}

impl FromIterator<Field> for MissingFieldSet {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        let mut set = Self::default();
        for field in iter {
            set.insert(field);
        }
        set
    }
}

impl fmt::Debug for MissingFieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Field::name)).finish()
    }
}
