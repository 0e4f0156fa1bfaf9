/// Problems detected while declaring a step tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// Two nodes resolve to the same key; outcomes could not be told apart.
    #[error("duplicate step key: {key}")]
    DuplicateKey { key: String },

    /// A group node (lock, transaction, try, group) declares no children.
    #[error("group '{key}' declares no steps")]
    EmptyGroup { key: String },

    /// A lock declared without any attribute names to lock on.
    #[error("lock declared without attribute names")]
    EmptyLock,

    /// A node name that is empty or contains only whitespace.
    #[error("{kind} step declared with an empty name")]
    EmptyName { kind: String },
}

/// A decoded outcome whose status and error payload do not belong together.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutcomeError {
    /// Exceptions always carry the raised fault.
    #[error("exception outcome must carry a raised fault")]
    MissingFault,

    /// The payload kind is not allowed for this status.
    #[error("{status} outcome cannot carry a '{payload}' error")]
    PayloadMismatch { status: String, payload: String },
}
