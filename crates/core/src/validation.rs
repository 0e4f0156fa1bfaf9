//! Validation-error collections.
//!
//! Produced by parameter validation and by model steps that find a record
//! which does not pass its own checks. The `Display` form is stable and is
//! used verbatim in error summaries.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One `{attribute, kind, options}` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub attribute: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, Value>,
}

impl ValidationError {
    pub fn new(attribute: impl Into<String>, kind: impl Into<String>) -> Self {
        ValidationError {
            attribute: attribute.into(),
            kind: kind.into(),
            options: IndexMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Message without the attribute name, e.g. `can't be blank`.
    pub fn message(&self) -> String {
        match self.kind.as_str() {
            "blank" => "can't be blank".to_string(),
            "invalid_type" => {
                let expected = self
                    .options
                    .get("expected")
                    .and_then(Value::as_str)
                    .unwrap_or("value");
                format!("is not a valid {}", expected)
            }
            "inclusion" => "is not included in the list".to_string(),
            _ => "is invalid".to_string(),
        }
    }

    /// Message prefixed with the humanized attribute, e.g. `Email can't be blank`.
    pub fn full_message(&self) -> String {
        format!("{} {}", humanize(&self.attribute), self.message())
    }
}

/// `first_name` -> `First name`.
fn humanize(attribute: &str) -> String {
    let spaced = attribute.replace('_', " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Ordered set of validation errors. Adding an entry that is already present
/// is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        ValidationErrors::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        if !self.0.contains(&error) {
            self.0.push(error);
        }
    }

    pub fn add(&mut self, attribute: impl Into<String>, kind: impl Into<String>) {
        self.push(ValidationError::new(attribute, kind));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    /// Errors attached to one attribute, in insertion order.
    pub fn on(&self, attribute: &str) -> impl Iterator<Item = &ValidationError> {
        let attribute = attribute.to_string();
        self.0.iter().filter(move |e| e.attribute == attribute)
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.0.iter().map(ValidationError::full_message).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join(", "))
    }
}

impl FromIterator<ValidationError> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = ValidationError>>(iter: I) -> Self {
        let mut errors = ValidationErrors::new();
        for error in iter {
            errors.push(error);
        }
        errors
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
