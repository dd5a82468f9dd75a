use crate::api::client::{ByteStream, ChatRequest, FragmentStreamSource};
use crate::api::sandbox::SandboxExecutor;
use crate::types::{ExecutionResult, Fragment};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Scripted reply for one completion request.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Emit the chunks, then end the stream.
    Chunks(Vec<String>),
    /// Emit the chunks, then stay open until cancelled.
    Hanging(Vec<String>),
    /// Emit the chunks, then fail mid-stream.
    ChunksThenError(Vec<String>, String),
    /// Refuse to open the stream.
    Error(String),
}

#[derive(Clone, Default)]
pub struct MockApiClient {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockApiClient {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn next_response(&self, request: &ChatRequest) -> Result<MockResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| anyhow!("MockApiClient: response queue poisoned"))?;
        if responses.is_empty() {
            return Err(anyhow!("MockApiClient: No more responses configured"));
        }
        Ok(responses.remove(0))
    }
}

fn chunk_stream(chunks: Vec<String>) -> impl futures::Stream<Item = Result<Bytes>> + Send {
    stream::iter(chunks.into_iter().map(|chunk| Ok(Bytes::from(chunk))))
}

impl FragmentStreamSource for MockApiClient {
    fn open_stream<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, Result<ByteStream>> {
        Box::pin(async move {
            let stream: ByteStream = match self.next_response(request)? {
                MockResponse::Chunks(chunks) => Box::pin(chunk_stream(chunks)),
                MockResponse::Hanging(chunks) => {
                    Box::pin(chunk_stream(chunks).chain(stream::pending()))
                }
                MockResponse::ChunksThenError(chunks, message) => Box::pin(
                    chunk_stream(chunks).chain(stream::once(async move { Err(anyhow!(message)) })),
                ),
                MockResponse::Error(message) => return Err(anyhow!(message)),
            };
            Ok(stream)
        })
    }
}

/// Splits a JSON body into fixed-size chunks to mimic a streamed object.
pub fn chunked(body: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Sandbox executor that records calls and replays scripted outcomes.
///
/// A gated executor holds every call until `release` adds a permit.
#[derive(Clone)]
pub struct MockSandboxExecutor {
    outcomes: Arc<Mutex<Vec<Result<ExecutionResult, String>>>>,
    calls: Arc<Mutex<Vec<(Fragment, String)>>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockSandboxExecutor {
    pub fn new(outcomes: Vec<Result<ExecutionResult, String>>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes)),
            calls: Arc::new(Mutex::new(Vec::new())),
            gate: None,
        }
    }

    pub fn gated(outcomes: Vec<Result<ExecutionResult, String>>) -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new(outcomes)
        }
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> Vec<(Fragment, String)> {
        self.calls
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

impl SandboxExecutor for MockSandboxExecutor {
    fn execute<'a>(
        &'a self,
        fragment: &'a Fragment,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<ExecutionResult>> {
        Box::pin(async move {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((fragment.clone(), user_id.to_string()));
            }
            if let Some(gate) = &self.gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|_| anyhow!("MockSandboxExecutor: gate closed"))?;
                permit.forget();
            }
            let outcome = {
                let mut outcomes = self
                    .outcomes
                    .lock()
                    .map_err(|_| anyhow!("MockSandboxExecutor: outcome queue poisoned"))?;
                if outcomes.is_empty() {
                    Err("MockSandboxExecutor: No more outcomes configured".to_string())
                } else {
                    outcomes.remove(0)
                }
            };
            outcome.map_err(|message| anyhow!(message))
        })
    }
}
