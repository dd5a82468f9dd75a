pub mod receiver;
pub mod reconciler;
pub mod transcript;

pub use receiver::{HandleId, ReceiverEvent, StreamError, StreamingObjectReceiver};
pub use reconciler::{CompletionDecision, FragmentReconciler, IgnoreReason};
pub use transcript::{TranscriptChange, TranscriptStore};
