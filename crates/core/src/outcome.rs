//! Per-step outcome records.
//!
//! A [`StepOutcome`] is written exactly once, when a step completes, and is
//! read-only afterwards. A step that never ran has no outcome at all; there
//! is no "pending" or "skipped" status.

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OutcomeError;
use crate::validation::ValidationErrors;

/// Terminal status of a step that ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step completed and the pipeline may continue.
    Success,
    /// The step logically declined, with or without an attached message.
    Failure,
    /// A fault escaped the step (or a fault-tolerant group's boundary).
    Exception,
}

impl StepStatus {
    pub fn is_success(self) -> bool {
        matches!(self, StepStatus::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Failure => "failure",
            StepStatus::Exception => "exception",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fault raised while a step was running: its message and the name of
/// the error type that carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub message: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl Fault {
    pub fn new(message: impl Into<String>, type_name: impl Into<String>) -> Self {
        Fault {
            message: message.into(),
            type_name: type_name.into(),
        }
    }

    /// Build a fault from any error value, naming it after the error's type
    /// (path and generic arguments stripped).
    ///
    /// The name is the static type of `err`, so a wrapped error (`Box<E>`,
    /// `Arc<E>`) is named after the wrapper, e.g. `Box`. Use [`Fault::new`]
    /// with an explicit type name for those.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        Fault::new(err.to_string(), short_type_name::<E>())
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.type_name)
    }
}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Structured failure detail attached to an outcome.
///
/// A bare failure (a step that simply returned "no") carries no payload at
/// all, so together with `None` this covers every failure shape a step can
/// produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum ErrorPayload {
    /// An explicit error string attached by the step.
    Message(String),
    /// A fault that was raised and caught.
    Raised(Fault),
    /// A validation-error collection (invalid parameters or an invalid record).
    Invalid(ValidationErrors),
}

impl ErrorPayload {
    /// The serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ErrorPayload::Message(_) => "message",
            ErrorPayload::Raised(_) => "raised",
            ErrorPayload::Invalid(_) => "invalid",
        }
    }
}

/// Auxiliary key/value pairs attached to an outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(IndexMap<String, Value>);

/// Values recorded when a step returned something other than what a test
/// declared it would.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unexpected<'a> {
    pub expected: &'a Value,
    pub actual: &'a Value,
}

static NULL: Value = Value::Null;

impl Metadata {
    pub const REASON: &'static str = "reason";
    pub const UNEXPECTED_RESULT: &'static str = "unexpected_result";
    pub const EXPECTED: &'static str = "expected";
    pub const ACTUAL: &'static str = "actual";

    pub fn new() -> Self {
        Metadata::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The denial reason attached by a policy step, if it is a string.
    pub fn reason(&self) -> Option<&str> {
        self.get(Self::REASON).and_then(Value::as_str)
    }

    /// Flag the outcome as not matching a test expectation.
    pub fn mark_unexpected(&mut self, expected: impl Into<Value>, actual: impl Into<Value>) {
        self.insert(Self::UNEXPECTED_RESULT, true);
        self.insert(Self::EXPECTED, expected);
        self.insert(Self::ACTUAL, actual);
    }

    /// Expected/actual pair when the `unexpected_result` flag is set.
    pub fn unexpected(&self) -> Option<Unexpected<'_>> {
        let flagged = self
            .get(Self::UNEXPECTED_RESULT)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !flagged {
            return None;
        }
        Some(Unexpected {
            expected: self.get(Self::EXPECTED).unwrap_or(&NULL),
            actual: self.get(Self::ACTUAL).unwrap_or(&NULL),
        })
    }
}

/// Recorded result of executing one node.
///
/// Constructors keep the status/payload pairing consistent: exceptions always
/// carry a raised fault, failures carry a message, a validation collection
/// or nothing.
///
/// Decoding goes through the same check, so a recorded run cannot hold an
/// exception without its fault or a success with an error attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOutcome")]
pub struct StepOutcome {
    status: StepStatus,
    #[serde(rename = "elapsed_ms", with = "elapsed_ms")]
    elapsed: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorPayload>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    metadata: Metadata,
}

/// Wire form of [`StepOutcome`] before the status/payload check.
#[derive(Deserialize)]
struct RawOutcome {
    status: StepStatus,
    #[serde(rename = "elapsed_ms", with = "elapsed_ms")]
    elapsed: Duration,
    #[serde(default)]
    error: Option<ErrorPayload>,
    #[serde(default)]
    metadata: Metadata,
}

impl TryFrom<RawOutcome> for StepOutcome {
    type Error = OutcomeError;

    fn try_from(raw: RawOutcome) -> Result<Self, Self::Error> {
        match (raw.status, &raw.error) {
            (StepStatus::Success, None)
            | (StepStatus::Failure, None)
            | (StepStatus::Failure, Some(ErrorPayload::Message(_)))
            | (StepStatus::Failure, Some(ErrorPayload::Invalid(_)))
            | (StepStatus::Exception, Some(ErrorPayload::Raised(_))) => {}
            (StepStatus::Exception, None) => return Err(OutcomeError::MissingFault),
            (status, Some(payload)) => {
                return Err(OutcomeError::PayloadMismatch {
                    status: status.to_string(),
                    payload: payload.kind().to_string(),
                })
            }
        }
        Ok(StepOutcome {
            status: raw.status,
            elapsed: raw.elapsed,
            error: raw.error,
            metadata: raw.metadata,
        })
    }
}

impl StepOutcome {
    fn new(status: StepStatus, elapsed: Duration, error: Option<ErrorPayload>) -> Self {
        StepOutcome {
            status,
            elapsed,
            error,
            metadata: Metadata::new(),
        }
    }

    pub fn success(elapsed: Duration) -> Self {
        StepOutcome::new(StepStatus::Success, elapsed, None)
    }

    /// A bare failure with no attached detail.
    pub fn failure(elapsed: Duration) -> Self {
        StepOutcome::new(StepStatus::Failure, elapsed, None)
    }

    pub fn failure_with_message(elapsed: Duration, message: impl Into<String>) -> Self {
        StepOutcome::new(
            StepStatus::Failure,
            elapsed,
            Some(ErrorPayload::Message(message.into())),
        )
    }

    pub fn invalid(elapsed: Duration, errors: ValidationErrors) -> Self {
        StepOutcome::new(
            StepStatus::Failure,
            elapsed,
            Some(ErrorPayload::Invalid(errors)),
        )
    }

    pub fn exception(elapsed: Duration, fault: Fault) -> Self {
        StepOutcome::new(
            StepStatus::Exception,
            elapsed,
            Some(ErrorPayload::Raised(fault)),
        )
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn error(&self) -> Option<&ErrorPayload> {
        self.error.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Fractional milliseconds, the unit every rendered timing uses.
pub fn millis(elapsed: Duration) -> f64 {
    elapsed.as_nanos() as f64 / 1_000_000.0
}

/// Durations travel as fractional milliseconds so recorded runs stay readable.
mod elapsed_ms {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(super::millis(*elapsed))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(D::Error::custom(format!(
                "elapsed_ms must be non-negative, got {millis}"
            )));
        }
        Ok(Duration::from_nanos((millis * 1_000_000.0).round() as u64))
    }
}
