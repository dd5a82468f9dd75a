use crate::state::ReceiverEvent;
use crate::types::{CycleId, ExecutionResult, Fragment};

/// Internal input of the orchestrator, delivered through its inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    Receiver(ReceiverEvent),
    ExecutionFinished {
        cycle: CycleId,
        fragment: Fragment,
        outcome: Result<ExecutionResult, String>,
    },
}
