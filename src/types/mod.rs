mod execution;
mod fragment;
mod message;
mod model;
mod template;

pub use execution::ExecutionResult;
pub use fragment::{Fingerprint, Fragment};
pub use message::{
    to_api_messages, ApiContentPart, ApiMessage, ContentPart, Message, MessagePatch, Role,
};
pub use model::{builtin_models, filter_models, find_model, LlmModel, LlmModelConfig, UserTier};
pub use template::{
    builtin_templates, resolve_templates, TemplateDefinition, TemplateSelection, Templates,
};

/// Monotonic id of one submission cycle.
///
/// Every asynchronous continuation (stream events, sandbox outcomes) carries the
/// id of the cycle that spawned it; the orchestrator drops anything whose id is
/// no longer current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleId(pub u64);

impl CycleId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
