use super::attachment::Attachment;
use super::controls::{Phase, SubmitOutcome};
use super::event::RuntimeEvent;
use super::update::OrchestratorUpdate;
use crate::api::logging::{emit_record, Level};
use crate::api::{
    execution_user_id, ApiClient, AuthClient, ChatRequest, FragmentStreamSource, SandboxClient,
    SandboxExecutor, SessionGate, StaticSession,
};
use crate::config::Config;
use crate::state::{
    CompletionDecision, FragmentReconciler, HandleId, IgnoreReason, ReceiverEvent,
    StreamingObjectReceiver, TranscriptChange, TranscriptStore,
};
use crate::types::{
    builtin_models, builtin_templates, filter_models, find_model, resolve_templates,
    to_api_messages, ContentPart, CycleId, ExecutionResult, Fragment, LlmModel, LlmModelConfig,
    Message, TemplateSelection, Templates, UserTier,
};
use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveCycle {
    cycle: CycleId,
    handle: HandleId,
}

/// Read-only view of the orchestrator for render and log observers.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSnapshot {
    pub phase: Phase,
    pub messages: Vec<Message>,
    pub partial: Option<Fragment>,
    pub fragment: Option<Fragment>,
    pub result: Option<ExecutionResult>,
    pub is_loading: bool,
    pub is_preview_loading: bool,
    pub error_message: Option<String>,
    pub is_rate_limited: bool,
    pub last_execution_error: Option<String>,
    pub input: String,
    pub attachments: usize,
    pub auth_dialog_open: bool,
    pub can_undo: bool,
    pub can_clear: bool,
}

/// Single owner of transcript, stream and execution state.
///
/// Every mutation goes through a method on this type. Stream chunks and sandbox
/// calls run in spawned tasks and come back as [`RuntimeEvent`]s; each carries
/// the cycle or handle it was started for and is dropped once that is no
/// longer current.
pub struct Orchestrator {
    transcript: TranscriptStore,
    receiver: StreamingObjectReceiver,
    reconciler: FragmentReconciler,
    executor: Arc<dyn SandboxExecutor>,
    session: Arc<dyn SessionGate>,
    auth: Option<AuthClient>,
    templates: Templates,
    models: Vec<LlmModel>,
    tier: UserTier,
    template: TemplateSelection,
    model_config: LlmModelConfig,
    phase: Phase,
    cycle: CycleId,
    active: Option<ActiveCycle>,
    error_message: Option<String>,
    is_rate_limited: bool,
    input: String,
    attachments: Vec<Attachment>,
    auth_dialog_open: bool,
    receiver_rx: mpsc::UnboundedReceiver<ReceiverEvent>,
    execution_tx: mpsc::UnboundedSender<RuntimeEvent>,
    execution_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    subscribers: Vec<mpsc::UnboundedSender<OrchestratorUpdate>>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn FragmentStreamSource>,
        executor: Arc<dyn SandboxExecutor>,
        session: Arc<dyn SessionGate>,
        model_config: LlmModelConfig,
    ) -> Self {
        let (receiver_tx, receiver_rx) = mpsc::unbounded_channel();
        let (execution_tx, execution_rx) = mpsc::unbounded_channel();
        Self {
            transcript: TranscriptStore::new(),
            receiver: StreamingObjectReceiver::new(source, receiver_tx),
            reconciler: FragmentReconciler::new(),
            executor,
            session,
            auth: None,
            templates: builtin_templates(),
            models: builtin_models(),
            tier: UserTier::default(),
            template: TemplateSelection::Auto,
            model_config,
            phase: Phase::Idle,
            cycle: CycleId(0),
            active: None,
            error_message: None,
            is_rate_limited: false,
            input: String::new(),
            attachments: Vec::new(),
            auth_dialog_open: false,
            receiver_rx,
            execution_tx,
            execution_rx,
            subscribers: Vec::new(),
        }
    }

    /// Wires the HTTP clients described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = Arc::new(ApiClient::new(config)?);
        let executor = Arc::new(SandboxClient::new(config)?);
        let session = Arc::new(StaticSession::new(config.user_id.clone()));
        Ok(Self::new(source, executor, session, config.model_config())
            .with_tier(config.tier)
            .with_template(config.template.clone())
            .with_auth(AuthClient::new(config)?))
    }

    pub fn with_templates(mut self, templates: Templates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_models(mut self, models: Vec<LlmModel>) -> Self {
        self.models = models;
        self
    }

    pub fn with_tier(mut self, tier: UserTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_template(mut self, template: TemplateSelection) -> Self {
        self.template = template;
        self
    }

    pub fn with_auth(mut self, auth: AuthClient) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn subscribe_updates(&mut self) -> mpsc::UnboundedReceiver<OrchestratorUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn subscribe_transcript(&mut self) -> mpsc::UnboundedReceiver<TranscriptChange> {
        self.transcript.subscribe()
    }

    // Controls

    /// Starts a cycle, or stops the running one when busy.
    pub fn submit(
        &mut self,
        text: &str,
        files: &[Attachment],
        template: &TemplateSelection,
        config: &LlmModelConfig,
    ) -> SubmitOutcome {
        if self.phase.is_busy() {
            self.stop();
            return SubmitOutcome::Stopped;
        }

        self.error_message = None;
        self.is_rate_limited = false;
        self.receiver.clear_error();

        let mut content = vec![ContentPart::text(text)];
        content.extend(
            files
                .iter()
                .map(|file| ContentPart::image(file.to_data_url())),
        );
        self.transcript.append(Message::user(content));

        self.cycle = self.cycle.next();
        let cycle = self.cycle;
        self.set_phase(Phase::Submitting);

        let available = filter_models(&self.models, self.tier);
        let request = ChatRequest {
            messages: to_api_messages(self.transcript.messages()),
            template: resolve_templates(&self.templates, template),
            model: find_model(&available, &config.model).cloned(),
            config: config.clone(),
        };

        emit_record(
            Level::Info,
            "chat_submit",
            &[
                ("cycle", cycle.to_string()),
                ("template", template.to_string()),
                ("model", config.model.clone()),
                ("has_files", (!files.is_empty()).to_string()),
            ],
        );

        let handle = self.receiver.start(request);
        self.active = Some(ActiveCycle { cycle, handle });
        self.set_phase(Phase::Streaming);
        SubmitOutcome::Started { cycle, handle }
    }

    /// Submits the input buffer and attachments with the current selection.
    /// The buffer is consumed even when the submit acts as stop.
    pub fn submit_input(&mut self) -> SubmitOutcome {
        let text = std::mem::take(&mut self.input);
        let files = std::mem::take(&mut self.attachments);
        let template = self.template.clone();
        let config = self.model_config.clone();
        self.submit(&text, &files, &template, &config)
    }

    /// Cancels the running cycle. Returns false when nothing was running.
    pub fn stop(&mut self) -> bool {
        if let Some(handle) = self.receiver.cancel() {
            emit_record(Level::Debug, "stream_cancelled", &[("handle", handle.to_string())]);
        }
        let abandoned = self.reconciler.abandon_pending();
        if abandoned {
            self.emit(OrchestratorUpdate::PreviewLoading(false));
        }
        self.active = None;

        if !self.phase.is_busy() {
            return abandoned;
        }
        self.set_phase(Phase::Cancelled);
        self.set_phase(Phase::Idle);
        true
    }

    pub fn undo(&mut self) -> bool {
        self.transcript.truncate_last().is_some()
    }

    pub fn clear(&mut self) {
        self.stop();
        self.transcript.clear();
        self.reconciler.reset();
        self.receiver.reset_object();
        self.input.clear();
        self.attachments.clear();
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn attach(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    pub async fn attach_file(&mut self, path: &Path) -> Result<()> {
        let attachment = Attachment::from_path(path).await?;
        self.attach(attachment);
        Ok(())
    }

    pub fn set_template(&mut self, template: TemplateSelection) {
        self.template = template;
    }

    pub fn set_model_config(&mut self, config: LlmModelConfig) {
        self.model_config = config;
    }

    // Preview and auth

    pub fn set_current_preview(
        &mut self,
        fragment: Option<Fragment>,
        result: Option<ExecutionResult>,
    ) {
        self.reconciler.set_preview(fragment, result);
    }

    pub fn close_preview(&mut self) {
        self.reconciler.close_preview();
    }

    pub fn show_login(&mut self) {
        self.auth_dialog_open = true;
    }

    /// Exchanges the access token; a successful exchange closes the auth dialog.
    pub async fn submit_auth(&mut self, access_token: &str) -> Result<bool> {
        let auth = self
            .auth
            .as_ref()
            .ok_or_else(|| anyhow!("no auth endpoint configured"))?;
        let accepted = auth.exchange(access_token).await?;
        if accepted {
            self.auth_dialog_open = false;
        }
        Ok(accepted)
    }

    // Events

    /// Waits for the next stream or execution event. `None` only once every
    /// producer is gone.
    pub async fn next_event(&mut self) -> Option<RuntimeEvent> {
        tokio::select! {
            Some(event) = self.receiver_rx.recv() => Some(RuntimeEvent::Receiver(event)),
            Some(event) = self.execution_rx.recv() => Some(event),
            else => None,
        }
    }

    pub fn handle_event(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Receiver(event) => self.handle_receiver_event(event),
            RuntimeEvent::ExecutionFinished {
                cycle,
                fragment,
                outcome,
            } => self.handle_execution_finished(cycle, fragment, outcome),
        }
    }

    fn handle_receiver_event(&mut self, event: ReceiverEvent) {
        let handle = event.handle();
        let Some(event) = self.receiver.accept(event) else {
            emit_record(Level::Debug, "stale_stream_event", &[("handle", handle.to_string())]);
            return;
        };
        let Some(active) = self.active.filter(|active| active.handle == handle) else {
            return;
        };

        match event {
            ReceiverEvent::Partial { fragment, .. } => {
                self.emit(OrchestratorUpdate::PartialFragment(fragment));
            }
            ReceiverEvent::Completed { fragment, .. } => {
                self.handle_completion(active.cycle, fragment);
            }
            ReceiverEvent::Failed { error, .. } => {
                self.error_message = Some(error.message.clone());
                self.is_rate_limited = error.rate_limited;
                self.emit(OrchestratorUpdate::Error {
                    message: error.message,
                    rate_limited: error.rate_limited,
                });
                self.set_phase(if error.rate_limited {
                    Phase::RateLimited
                } else {
                    Phase::Errored
                });
            }
        }
    }

    fn handle_completion(&mut self, cycle: CycleId, fragment: Fragment) {
        match self.reconciler.on_complete(cycle, fragment) {
            CompletionDecision::Ignored(reason) => {
                let reason = match reason {
                    IgnoreReason::Empty => "empty",
                    IgnoreReason::Duplicate => "duplicate",
                };
                emit_record(
                    Level::Debug,
                    "completion_ignored",
                    &[("cycle", cycle.to_string()), ("reason", reason.to_string())],
                );
                if self.phase == Phase::Streaming {
                    self.set_phase(Phase::Idle);
                }
            }
            CompletionDecision::Execute(fragment) => {
                self.set_phase(Phase::Reconciling);
                self.emit(OrchestratorUpdate::PreviewLoading(true));
                self.spawn_execution(cycle, fragment);
            }
        }
    }

    fn spawn_execution(&self, cycle: CycleId, fragment: Fragment) {
        let executor = Arc::clone(&self.executor);
        let user_id = execution_user_id(self.session.as_ref());
        let execution_tx = self.execution_tx.clone();
        tokio::spawn(async move {
            let outcome = executor
                .execute(&fragment, &user_id)
                .await
                .map_err(|error| error.to_string());
            let _ = execution_tx.send(RuntimeEvent::ExecutionFinished {
                cycle,
                fragment,
                outcome,
            });
        });
    }

    fn handle_execution_finished(
        &mut self,
        cycle: CycleId,
        fragment: Fragment,
        outcome: Result<ExecutionResult, String>,
    ) {
        let current = self.active.is_some_and(|active| active.cycle == cycle)
            && self.reconciler.pending_cycle() == Some(cycle);
        if !current {
            emit_record(Level::Debug, "stale_execution", &[("cycle", cycle.to_string())]);
            return;
        }

        if let Err(message) = &outcome {
            emit_record(
                Level::Warn,
                "executor_failed",
                &[("cycle", cycle.to_string()), ("error", message.clone())],
            );
        }
        let result = outcome.as_ref().ok().cloned();
        self.reconciler.on_execution_finished(outcome);
        self.emit(OrchestratorUpdate::PreviewLoading(false));
        if let Some(result) = result {
            self.emit(OrchestratorUpdate::ExecutionResult(result));
        }

        FragmentReconciler::merge_assistant_message(&mut self.transcript, cycle, fragment);
        self.set_phase(Phase::Idle);
    }

    // Observation

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        OrchestratorSnapshot {
            phase: self.phase,
            messages: self.transcript.messages().to_vec(),
            partial: self.receiver.object().cloned(),
            fragment: self.reconciler.fragment().cloned(),
            result: self.reconciler.result().cloned(),
            is_loading: self.is_loading(),
            is_preview_loading: self.reconciler.preview_loading(),
            error_message: self.error_message.clone(),
            is_rate_limited: self.is_rate_limited,
            last_execution_error: self.reconciler.last_execution_error().map(str::to_string),
            input: self.input.clone(),
            attachments: self.attachments.len(),
            auth_dialog_open: self.auth_dialog_open,
            can_undo: self.can_undo(),
            can_clear: self.can_clear(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn fragment(&self) -> Option<&Fragment> {
        self.reconciler.fragment()
    }

    pub fn result(&self) -> Option<&ExecutionResult> {
        self.reconciler.result()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.is_rate_limited
    }

    pub fn is_loading(&self) -> bool {
        self.receiver.is_loading()
    }

    pub fn is_preview_loading(&self) -> bool {
        self.reconciler.preview_loading()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn auth_dialog_open(&self) -> bool {
        self.auth_dialog_open
    }

    pub fn can_undo(&self) -> bool {
        !self.transcript.is_empty()
    }

    pub fn can_clear(&self) -> bool {
        !self.transcript.is_empty()
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        self.phase = phase;
        self.emit(OrchestratorUpdate::Phase(phase));
    }

    fn emit(&mut self, update: OrchestratorUpdate) {
        self.subscribers
            .retain(|subscriber| subscriber.send(update.clone()).is_ok());
    }
}
