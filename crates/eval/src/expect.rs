//! Test-mode expectations.
//!
//! A test can declare what a node is expected to return (`true` for
//! success). When the run disagrees, the node's outcome is annotated with
//! `unexpected_result`, `expected` and `actual` metadata. The annotation
//! never changes the outcome's status.

use std::collections::HashMap;

use stepline_core::StepOutcome;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectations {
    expected: HashMap<String, bool>,
}

impl Expectations {
    pub fn new() -> Self {
        Expectations::default()
    }

    pub fn expect(mut self, key: impl Into<String>, returns: bool) -> Self {
        self.insert(key, returns);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, returns: bool) {
        self.expected.insert(key.into(), returns);
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.expected.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }

    /// Annotate `outcome` when it disagrees with the expectation for `key`.
    /// Returns whether an annotation was added.
    pub fn annotate(&self, key: &str, outcome: &mut StepOutcome) -> bool {
        let Some(expected) = self.get(key) else {
            return false;
        };
        let actual = outcome.is_success();
        if expected == actual {
            return false;
        }
        outcome.metadata_mut().mark_unexpected(expected, actual);
        true
    }
}
