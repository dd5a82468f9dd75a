use crate::state::HandleId;
use crate::types::CycleId;

/// Lifecycle of one submission cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Submitting,
    Streaming,
    Reconciling,
    RateLimited,
    Errored,
    Cancelled,
}

impl Phase {
    /// While busy the submit control acts as stop.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Phase::Submitting | Phase::Streaming | Phase::Reconciling
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Submitting => "submitting",
            Phase::Streaming => "streaming",
            Phase::Reconciling => "reconciling",
            Phase::RateLimited => "rate_limited",
            Phase::Errored => "errored",
            Phase::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Started { cycle: CycleId, handle: HandleId },
    /// A cycle was in flight, so the submit only stopped it.
    Stopped,
}
