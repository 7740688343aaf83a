//! Query criteria evaluated against record bodies.
//!
//! A [`Criteria`] is a conjunction of field predicates. Field names are
//! dotted paths into the JSON body (`load_balancer.backend_names`). A
//! predicate on a missing field never matches.

use serde_json::Value;

use crate::types::Record;

/// How a single field is compared.
#[derive(Debug, Clone, PartialEq)]
pub enum Match {
    /// Field equals the value.
    Eq(Value),
    /// Field equals one of the values.
    In(Vec<Value>),
    /// Field is an array containing the value.
    Contains(Value),
    /// Field is an array with a string item containing the substring.
    AnyItemContains(String),
}

/// A predicate on one field of a record body.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub matcher: Match,
}

impl Predicate {
    pub fn matches(&self, body: &Value) -> bool {
        let Some(field) = lookup(body, &self.field) else {
            return false;
        };
        match &self.matcher {
            Match::Eq(value) => field == value,
            Match::In(values) => values.contains(field),
            Match::Contains(value) => field
                .as_array()
                .is_some_and(|items| items.contains(value)),
            Match::AnyItemContains(needle) => field.as_array().is_some_and(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|item| item.contains(needle.as_str()))
            }),
        }
    }
}

/// Conjunction of field predicates. Empty criteria match every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub predicates: Vec<Predicate>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, Match::Eq(value.into()));
        self
    }

    pub fn one_of<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push(field, Match::In(values));
        self
    }

    pub fn contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, Match::Contains(value.into()));
        self
    }

    pub fn any_item_contains(mut self, field: &str, needle: &str) -> Self {
        self.push(field, Match::AnyItemContains(needle.to_string()));
        self
    }

    pub fn matches(&self, body: &Value) -> bool {
        self.predicates.iter().all(|p| p.matches(body))
    }

    fn push(&mut self, field: &str, matcher: Match) {
        self.predicates.push(Predicate {
            field: field.to_string(),
            matcher,
        });
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,
    /// Opaque cursor for the following page; `None` on the last page.
    pub next: Option<String>,
}

fn lookup<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(body, |value, segment| value.get(segment))
}
