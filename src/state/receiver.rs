use crate::api::client::RATE_LIMIT_MARKER;
use crate::api::logging::{emit_record, Level};
use crate::api::stream::FragmentStreamParser;
use crate::api::{ChatRequest, FragmentStreamSource};
use crate::types::Fragment;
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamError {
    pub message: String,
    pub rate_limited: bool,
}

impl StreamError {
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let rate_limited = message.contains(RATE_LIMIT_MARKER);
        Self {
            message,
            rate_limited,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    Partial { handle: HandleId, fragment: Fragment },
    Completed { handle: HandleId, fragment: Fragment },
    Failed { handle: HandleId, error: StreamError },
}

impl ReceiverEvent {
    pub fn handle(&self) -> HandleId {
        match self {
            ReceiverEvent::Partial { handle, .. }
            | ReceiverEvent::Completed { handle, .. }
            | ReceiverEvent::Failed { handle, .. } => *handle,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReceiverEvent::Partial { .. })
    }
}

struct ActiveHandle {
    id: HandleId,
    token: CancellationToken,
}

/// Owns the single in-flight completion stream.
///
/// Stream tasks report through the event channel; `accept` is the gate every
/// event passes before it may touch state, and it drops anything that does not
/// belong to the live handle.
pub struct StreamingObjectReceiver {
    source: Arc<dyn FragmentStreamSource>,
    events_tx: mpsc::UnboundedSender<ReceiverEvent>,
    next_handle: u64,
    current: Option<ActiveHandle>,
    object: Option<Fragment>,
    is_loading: bool,
    error: Option<StreamError>,
}

impl StreamingObjectReceiver {
    pub fn new(
        source: Arc<dyn FragmentStreamSource>,
        events_tx: mpsc::UnboundedSender<ReceiverEvent>,
    ) -> Self {
        Self {
            source,
            events_tx,
            next_handle: 1,
            current: None,
            object: None,
            is_loading: false,
            error: None,
        }
    }

    /// Starts a request, cancelling whatever handle was current.
    pub fn start(&mut self, request: ChatRequest) -> HandleId {
        self.cancel();

        let id = HandleId(self.next_handle);
        self.next_handle += 1;
        let token = CancellationToken::new();

        self.object = None;
        self.error = None;
        self.is_loading = true;

        tokio::spawn(run_stream(
            Arc::clone(&self.source),
            request,
            id,
            token.clone(),
            self.events_tx.clone(),
        ));
        self.current = Some(ActiveHandle { id, token });
        id
    }

    /// Idempotent. Returns the handle that was live, if any; nothing from it
    /// is accepted afterwards.
    pub fn cancel(&mut self) -> Option<HandleId> {
        let active = self.current.take()?;
        active.token.cancel();
        self.is_loading = false;
        Some(active.id)
    }

    /// Filters stale events and folds accepted ones into the receiver state.
    pub fn accept(&mut self, event: ReceiverEvent) -> Option<ReceiverEvent> {
        let current = self.current.as_ref()?;
        if current.id != event.handle() || current.token.is_cancelled() {
            return None;
        }

        match &event {
            ReceiverEvent::Partial { fragment, .. } => self.object = Some(fragment.clone()),
            ReceiverEvent::Completed { fragment, .. } => {
                self.object = Some(fragment.clone());
                self.is_loading = false;
            }
            ReceiverEvent::Failed { error, .. } => {
                self.error = Some(error.clone());
                self.is_loading = false;
            }
        }
        Some(event)
    }

    pub fn current_handle(&self) -> Option<HandleId> {
        self.current.as_ref().map(|active| active.id)
    }

    pub fn object(&self) -> Option<&Fragment> {
        self.object.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn reset_object(&mut self) {
        self.object = None;
    }
}

async fn run_stream(
    source: Arc<dyn FragmentStreamSource>,
    request: ChatRequest,
    handle: HandleId,
    token: CancellationToken,
    events_tx: mpsc::UnboundedSender<ReceiverEvent>,
) {
    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        outcome = pump_stream(source.as_ref(), &request, handle, &token, &events_tx) => outcome,
    };
    if token.is_cancelled() {
        return;
    }

    let event = match outcome {
        Ok(fragment) => ReceiverEvent::Completed { handle, fragment },
        Err(error) => {
            let error = StreamError::from_message(error.to_string());
            emit_record(
                Level::Warn,
                "stream_failed",
                &[
                    ("handle", handle.to_string()),
                    ("rate_limited", error.rate_limited.to_string()),
                    ("error", error.message.clone()),
                ],
            );
            ReceiverEvent::Failed { handle, error }
        }
    };
    let _ = events_tx.send(event);
}

async fn pump_stream(
    source: &dyn FragmentStreamSource,
    request: &ChatRequest,
    handle: HandleId,
    token: &CancellationToken,
    events_tx: &mpsc::UnboundedSender<ReceiverEvent>,
) -> Result<Fragment> {
    let mut stream = source.open_stream(request).await?;
    let mut parser = FragmentStreamParser::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(fragment) = parser.process(&chunk) {
            if token.is_cancelled() {
                break;
            }
            let _ = events_tx.send(ReceiverEvent::Partial { handle, fragment });
        }
    }

    parser.finish()
}
