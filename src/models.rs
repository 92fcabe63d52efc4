// Core data models for Sigil
// Request mirrors the templated fields of a YAML signature; Bindings is the
// variable context shared across resolution passes

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Variable name → value context used during template substitution.
///
/// Every constructor seeds the `original` key with an empty value, so
/// templates referencing `{{.original}}` render even before a concrete
/// target has been assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, String>", into = "HashMap<String, String>")]
pub struct Bindings {
    vars: HashMap<String, String>,
}

/// Key guaranteed to be present in every `Bindings` value.
pub const ORIGINAL: &str = "original";

impl Bindings {
    pub fn new() -> Self {
        HashMap::new().into()
    }

    /// Insert or overwrite a variable, returning the previous value if any.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.vars.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}

impl From<HashMap<String, String>> for Bindings {
    fn from(mut vars: HashMap<String, String>) -> Self {
        vars.entry(ORIGINAL.to_string()).or_default();
        Bindings { vars }
    }
}

impl From<Bindings> for HashMap<String, String> {
    fn from(bindings: Bindings) -> Self {
        bindings.vars
    }
}

impl FromIterator<(String, String)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        iter.into_iter().collect::<HashMap<_, _>>().into()
    }
}

/// A templated request definition loaded from a signature file.
///
/// Headers are an ordered sequence of key→value maps; duplicate keys across
/// entries are preserved. Detections, generators and middlewares are
/// expression strings resolved here and evaluated elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    pub target: Bindings,
    pub values: Vec<HashMap<String, String>>,
    pub url: String,
    pub body: String,
    pub headers: Vec<HashMap<String, String>>,
    pub detections: Vec<String>,
    pub generators: Vec<String>,
    pub middlewares: Vec<String>,
}
