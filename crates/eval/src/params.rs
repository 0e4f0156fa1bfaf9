//! Parameter contracts: declared input fields, checked against the raw input.
//!
//! For each declared field:
//! - present and non-blank: type-checked, then checked against `in` if given
//! - blank with a default: the default is used
//! - blank and required: `blank` error
//! - blank and optional: left out of the validated set
//!
//! Input keys that are not declared pass through untouched (they are kept in
//! the raw capture but never validated).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use stepline_core::{Parameters, ValidationError, ValidationErrors};

/// Declared type of a parameter. No coercion is attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    #[default]
    Any,
}

impl ParamType {
    pub fn name(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Any => "any",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamField {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "type")]
    pub kind: ParamType,
    #[serde(default, rename = "in", skip_serializing_if = "Option::is_none")]
    pub inclusion: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamField {
    pub fn required(name: impl Into<String>) -> Self {
        ParamField {
            name: name.into(),
            required: true,
            kind: ParamType::Any,
            inclusion: None,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        ParamField {
            required: false,
            ..ParamField::required(name)
        }
    }

    pub fn of_type(mut self, kind: ParamType) -> Self {
        self.kind = kind;
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.inclusion = Some(values);
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn check(&self, value: &Value, errors: &mut ValidationErrors) -> bool {
        if !self.kind.accepts(value) {
            errors.push(
                ValidationError::new(&self.name, "invalid_type")
                    .with_option("expected", self.kind.name()),
            );
            return false;
        }
        if let Some(allowed) = &self.inclusion {
            if !allowed.contains(value) {
                errors.push(
                    ValidationError::new(&self.name, "inclusion")
                        .with_option("in", Value::Array(allowed.clone())),
                );
                return false;
            }
        }
        true
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Ordered list of declared fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamsContract {
    fields: Vec<ParamField>,
}

impl ParamsContract {
    pub fn new() -> Self {
        ParamsContract::default()
    }

    pub fn field(mut self, field: ParamField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[ParamField] {
        &self.fields
    }

    /// Raw view of the input: declared fields first, in declaration order,
    /// with missing ones as `null`; then undeclared input keys in input order.
    pub fn capture(&self, input: &Map<String, Value>) -> Parameters {
        let mut raw = Parameters::new();
        for field in &self.fields {
            let value = input.get(&field.name).cloned().unwrap_or(Value::Null);
            raw.insert(field.name.clone(), value);
        }
        for (key, value) in input {
            if !raw.contains_key(key) {
                raw.insert(key.clone(), value.clone());
            }
        }
        raw
    }

    pub fn validate(
        &self,
        input: &Map<String, Value>,
    ) -> Result<IndexMap<String, Value>, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut valid = IndexMap::new();

        for field in &self.fields {
            let provided = input.get(&field.name);
            if is_blank(provided) {
                if let Some(default) = &field.default {
                    valid.insert(field.name.clone(), default.clone());
                } else if field.required {
                    errors.add(&field.name, "blank");
                }
                continue;
            }
            if let Some(value) = provided {
                if field.check(value, &mut errors) {
                    valid.insert(field.name.clone(), value.clone());
                }
            }
        }

        if errors.is_empty() {
            Ok(valid)
        } else {
            Err(errors)
        }
    }
}
