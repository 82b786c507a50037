use std::collections::VecDeque;
use std::fmt;

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    pub fn is_key(&self, key: &str) -> bool {
        matches!(self, Self::Key(k) if k == key)
    }
}

/// Keys and indices leading from the payload root to an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonPath(Vec<PathSegment>);

impl JsonPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|s| s.is_key(key))
    }

    pub fn last_key(&self) -> Option<&str> {
        match self.0.last() {
            Some(PathSegment::Key(k)) => Some(k),
            _ => None,
        }
    }

    fn child(&self, segment: PathSegment) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(segment);
        Self(segments)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.0 {
            match segment {
                PathSegment::Key(k) => write!(f, ".{k}")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

/// Breadth-first walk yielding every object nested anywhere under a root.
///
/// Arrays are traversed but never yielded themselves.
pub struct TreeWalker<'a> {
    queue: VecDeque<(&'a Value, JsonPath)>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(root: &'a Value) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back((root, JsonPath::default()));
        Self { queue }
    }
}

impl<'a> Iterator for TreeWalker<'a> {
    type Item = (&'a Map<String, Value>, JsonPath);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((value, path)) = self.queue.pop_front() {
            match value {
                Value::Object(map) => {
                    for (key, child) in map {
                        if matches!(child, Value::Object(_) | Value::Array(_)) {
                            self.queue
                                .push_back((child, path.child(PathSegment::Key(key.clone()))));
                        }
                    }
                    return Some((map, path));
                }
                Value::Array(items) => {
                    for (i, child) in items.iter().enumerate() {
                        if matches!(child, Value::Object(_) | Value::Array(_)) {
                            self.queue.push_back((child, path.child(PathSegment::Index(i))));
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }
}
