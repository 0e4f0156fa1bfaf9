/// Errors an inspector can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectError {
    /// The result handed to the inspector is still being written.
    #[error("run of '{pipeline}' has not finished; inspect it after the run completes")]
    RunInProgress { pipeline: String },
}
