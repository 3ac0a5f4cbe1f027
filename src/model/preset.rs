use serde_json::Value;
use std::collections::HashMap;

use crate::model::{FilterField, Scope};

/// Rule that runs `scope` against another collection and writes the keys it
/// yields into `filter`. Used both for presets and prechecks.
///
/// When `key` is set the request context must carry a filter under that key,
/// which is added to `scope` before it runs. Without it the rule is skipped.
///
/// A `chained` filter receives the keys extracted by the rule declared just
/// before this one and is added to `scope`, so rules can build on each other.
#[derive(Debug, Clone)]
pub struct PresetPair {
    pub scope: Scope,
    pub filter: FilterField,
    pub key: Option<String>,
    pub chained: Option<FilterField>,
}

impl PresetPair {
    pub fn new(scope: Scope, filter: FilterField) -> Self {
        Self {
            scope,
            filter,
            key: None,
            chained: None,
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn chained_to_previous(mut self, filter: FilterField) -> Self {
        self.chained = Some(filter);
        self
    }
}

/// Filter whose values come from the request context under `key`.
#[derive(Debug, Clone)]
pub struct PresetFilter {
    pub key: String,
    pub filter: FilterField,
}

impl PresetFilter {
    pub fn new(key: &str, filter: FilterField) -> Self {
        Self {
            key: key.to_string(),
            filter,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Values(Vec<Value>),
    Filter(FilterField),
}

/// Per-request values handed to the engine by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub accept_language: Option<String>,
    pub values: HashMap<String, ContextValue>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, accept_language: &str) -> Self {
        self.accept_language = Some(accept_language.to_string());
        self
    }

    pub fn with_values(mut self, key: &str, values: Vec<Value>) -> Self {
        self.values
            .insert(key.to_string(), ContextValue::Values(values));
        self
    }

    pub fn with_filter(mut self, key: &str, filter: FilterField) -> Self {
        self.values
            .insert(key.to_string(), ContextValue::Filter(filter));
        self
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }
}
