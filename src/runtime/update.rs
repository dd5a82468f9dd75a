use super::controls::Phase;
use crate::types::{ExecutionResult, Fragment};

/// Notification pushed to observers after the orchestrator changes state.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorUpdate {
    Phase(Phase),
    PartialFragment(Fragment),
    PreviewLoading(bool),
    ExecutionResult(ExecutionResult),
    Error { message: String, rate_limited: bool },
}
