pub mod attachment;
pub mod controls;
pub mod event;
pub mod r#loop;
pub mod orchestrator;
pub mod update;


pub use attachment::Attachment;
pub use controls::{Phase, SubmitOutcome};
pub use event::RuntimeEvent;
pub use orchestrator::{Orchestrator, OrchestratorSnapshot};
pub use r#loop::{spawn_runtime, Command, Runtime, RuntimeHandle};
pub use update::OrchestratorUpdate;
