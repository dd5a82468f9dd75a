use super::attachment::Attachment;
use super::controls::SubmitOutcome;
use super::orchestrator::{Orchestrator, OrchestratorSnapshot};
use crate::types::{LlmModelConfig, TemplateSelection};
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// User-side request to the runtime actor.
pub enum Command {
    Submit {
        text: String,
        files: Vec<Attachment>,
        template: TemplateSelection,
        config: LlmModelConfig,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    SubmitInput(oneshot::Sender<SubmitOutcome>),
    SetInput(String),
    Attach {
        path: PathBuf,
        reply: oneshot::Sender<Result<()>>,
    },
    SetTemplate(TemplateSelection),
    Stop,
    Undo,
    Clear,
    ClosePreview,
    ShowLogin,
    SubmitAuth {
        access_token: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    Snapshot(oneshot::Sender<OrchestratorSnapshot>),
    Shutdown,
}

/// Actor that owns the orchestrator and serializes commands with stream and
/// execution events.
pub struct Runtime {
    orchestrator: Orchestrator,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl Runtime {
    pub fn new(orchestrator: Orchestrator) -> (Self, RuntimeHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        (
            Self {
                orchestrator,
                commands,
            },
            RuntimeHandle { tx },
        )
    }

    /// Runs until shutdown or until every handle is dropped.
    pub async fn run(mut self) -> Orchestrator {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.apply(command).await,
                },
                Some(event) = self.orchestrator.next_event() => {
                    self.orchestrator.handle_event(event);
                }
            }
        }
        self.orchestrator.stop();
        self.orchestrator
    }

    async fn apply(&mut self, command: Command) {
        let orchestrator = &mut self.orchestrator;
        match command {
            Command::Submit {
                text,
                files,
                template,
                config,
                reply,
            } => {
                let _ = reply.send(orchestrator.submit(&text, &files, &template, &config));
            }
            Command::SubmitInput(reply) => {
                let _ = reply.send(orchestrator.submit_input());
            }
            Command::SetInput(text) => orchestrator.set_input(text),
            Command::Attach { path, reply } => {
                let _ = reply.send(orchestrator.attach_file(&path).await);
            }
            Command::SetTemplate(template) => orchestrator.set_template(template),
            Command::Stop => {
                orchestrator.stop();
            }
            Command::Undo => {
                orchestrator.undo();
            }
            Command::Clear => orchestrator.clear(),
            Command::ClosePreview => orchestrator.close_preview(),
            Command::ShowLogin => orchestrator.show_login(),
            Command::SubmitAuth {
                access_token,
                reply,
            } => {
                let _ = reply.send(orchestrator.submit_auth(&access_token).await);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(orchestrator.snapshot());
            }
            Command::Shutdown => {}
        }
    }
}

/// Spawns the actor on the current tokio runtime.
pub fn spawn_runtime(orchestrator: Orchestrator) -> (RuntimeHandle, JoinHandle<Orchestrator>) {
    let (runtime, handle) = Runtime::new(orchestrator);
    (handle, tokio::spawn(runtime.run()))
}

#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl RuntimeHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow!("runtime has shut down"))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply))?;
        rx.await.map_err(|_| anyhow!("runtime dropped the request"))
    }

    pub async fn submit(
        &self,
        text: impl Into<String>,
        files: Vec<Attachment>,
        template: TemplateSelection,
        config: LlmModelConfig,
    ) -> Result<SubmitOutcome> {
        let text = text.into();
        self.request(|reply| Command::Submit {
            text,
            files,
            template,
            config,
            reply,
        })
        .await
    }

    pub async fn submit_input(&self) -> Result<SubmitOutcome> {
        self.request(Command::SubmitInput).await
    }

    pub fn set_input(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::SetInput(text.into()))
    }

    pub async fn attach_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        self.request(|reply| Command::Attach { path, reply })
            .await?
    }

    pub fn set_template(&self, template: TemplateSelection) -> Result<()> {
        self.send(Command::SetTemplate(template))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn undo(&self) -> Result<()> {
        self.send(Command::Undo)
    }

    pub fn clear(&self) -> Result<()> {
        self.send(Command::Clear)
    }

    pub fn close_preview(&self) -> Result<()> {
        self.send(Command::ClosePreview)
    }

    pub fn show_login(&self) -> Result<()> {
        self.send(Command::ShowLogin)
    }

    pub async fn submit_auth(&self, access_token: impl Into<String>) -> Result<bool> {
        let access_token = access_token.into();
        self.request(|reply| Command::SubmitAuth {
            access_token,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<OrchestratorSnapshot> {
        self.request(Command::Snapshot).await
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}
