use serde_json::Value;

use crate::domain::text::is_primitive;

const MAX_LIST_TARGET: usize = 20;
const MAX_DEEP_RESOLVE: u32 = 12;
/// Nodes one deep resolution may produce before falling back to one level.
const MAX_DEEP_NODES: usize = 4096;

/// Dereferences integer placeholders in a flat reference-array payload.
///
/// Small integers in such payloads are either literals or indices into the
/// root array. A target is only accepted when it looks like an interned
/// value rather than another reference-laden container.
#[derive(Debug, Clone, Copy)]
pub enum Resolver<'a> {
    /// Values are taken literally.
    Identity,
    /// Integers may point into this root array.
    Table(&'a [Value]),
}

impl<'a> Resolver<'a> {
    /// A table resolver when the root is an array, otherwise identity.
    pub fn for_root(root: &'a Value) -> Self {
        match root {
            Value::Array(items) => Self::Table(items),
            _ => Self::Identity,
        }
    }

    /// Resolve one level: the target itself is never re-resolved.
    pub fn resolve<'v>(&self, value: &'v Value) -> &'v Value
    where
        'a: 'v,
    {
        match *self {
            Self::Identity => value,
            Self::Table(root) => lookup(root, value).unwrap_or(value),
        }
    }

    /// Resolve a value and everything nested in it, to a bounded depth.
    ///
    /// An index already being expanded higher up stays a literal, and the
    /// output is capped at a fixed node budget.
    pub fn resolve_deep(&self, value: &Value) -> Value {
        match *self {
            Self::Identity => value.clone(),
            Self::Table(root) => DeepResolve {
                root,
                expanding: Vec::new(),
                budget: MAX_DEEP_NODES,
            }
            .resolve(value, MAX_DEEP_RESOLVE),
        }
    }
}

fn lookup<'r>(root: &'r [Value], value: &Value) -> Option<&'r Value> {
    lookup_index(root, value).map(|(_, target)| target)
}

fn lookup_index<'r>(root: &'r [Value], value: &Value) -> Option<(usize, &'r Value)> {
    let index = usize::try_from(value.as_u64()?).ok()?;
    let target = root.get(index)?;
    is_safe_target(target).then_some((index, target))
}

fn is_safe_target(target: &Value) -> bool {
    match target {
        Value::Object(map) => {
            let primitives = map.values().filter(|v| is_primitive(v)).count();
            primitives * 2 >= map.len()
        }
        Value::Array(items) => {
            items.len() <= MAX_LIST_TARGET && items.iter().all(is_primitive)
        }
        _ => true,
    }
}

struct DeepResolve<'r> {
    root: &'r [Value],
    expanding: Vec<usize>,
    budget: usize,
}

impl DeepResolve<'_> {
    fn resolve(&mut self, value: &Value, depth: u32) -> Value {
        let (index, resolved) = match lookup_index(self.root, value) {
            Some((index, _)) if self.expanding.contains(&index) => return value.clone(),
            Some((index, target)) => (Some(index), target),
            None => (None, value),
        };
        if depth == 0 || self.budget == 0 {
            return resolved.clone();
        }
        self.budget -= 1;
        if let Some(index) = index {
            self.expanding.push(index);
        }
        let out = match resolved {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve(v, depth - 1)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(
                items.iter().map(|v| self.resolve(v, depth - 1)).collect(),
            ),
            other => other.clone(),
        };
        if index.is_some() {
            self.expanding.pop();
        }
        out
    }
}
