//! Query session controller.
//!
//! Owns the transcript, the input buffer and the lifecycle of the single
//! outstanding request. The request runs on its own task so the UI loop keeps
//! handling keys; the loop drives [`QuerySession::settle`] to fold the result
//! back into the transcript.

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{AskResponse, QueryBackend};
use crate::error::BackendError;
use crate::input::InputBuffer;
use crate::transcript::{Message, Transcript};

pub const CANCELLED_TEXT: &str = "_Request cancelled by user._";
pub const ERROR_PREFIX: &str = "⚠️ Error: ";
pub const RESET_PROMPT: &str = "Clear all messages and input?";

type RequestTask = JoinHandle<Result<AskResponse, BackendError>>;

/// The one in-flight request and everything scoped to its lifetime
pub struct PendingRequest {
    id: u64,
    token: CancellationToken,
    task: RequestTask,
}

impl PendingRequest {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub enum SessionState {
    Idle,
    Pending(PendingRequest),
}

/// How a request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Answered(AskResponse),
    Cancelled,
    Failed(String),
}

impl Outcome {
    fn from_join(joined: Result<Result<AskResponse, BackendError>, JoinError>) -> Self {
        match joined {
            Ok(Ok(response)) => Outcome::Answered(response),
            Ok(Err(err)) if err.is_cancelled() => Outcome::Cancelled,
            Ok(Err(err)) => Outcome::Failed(err.to_string()),
            Err(join_err) => Outcome::Failed(format!("request task failed: {}", join_err)),
        }
    }

    fn into_message(self) -> Message {
        match self {
            Outcome::Answered(response) => Message::assistant(
                response.answer_text(),
                response.context_label().map(str::to_string),
            ),
            Outcome::Cancelled => Message::assistant(CANCELLED_TEXT, None),
            Outcome::Failed(description) => {
                Message::assistant(format!("{}{}", ERROR_PREFIX, description), None)
            }
        }
    }
}

pub struct QuerySession {
    backend: Arc<dyn QueryBackend>,
    transcript: Transcript,
    input: InputBuffer,
    state: SessionState,
    next_request_id: u64,
}

impl QuerySession {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self {
            backend,
            transcript: Transcript::new(),
            input: InputBuffer::new(),
            state: SessionState::Idle,
            next_request_id: 1,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputBuffer {
        &mut self.input
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, SessionState::Pending(_))
    }

    /// Submit whatever is in the input buffer
    pub fn submit_input(&mut self) -> bool {
        let query = self.input.text().to_string();
        self.submit(&query)
    }

    /// Start a request for `query`. Returns false, touching nothing, when the
    /// query is blank or another request is still pending.
    pub fn submit(&mut self, query: &str) -> bool {
        if query.trim().is_empty() {
            return false;
        }
        if self.is_busy() {
            debug!(target: "raglab::session", "Submit rejected: a request is already pending");
            return false;
        }

        self.transcript.push(Message::user(query));
        self.input.clear();

        let id = self.next_request_id;
        self.next_request_id += 1;

        let token = CancellationToken::new();
        let task_token = token.clone();
        let backend = Arc::clone(&self.backend);
        let query = query.to_string();
        let task = tokio::spawn(async move { backend.ask(&query, task_token).await });

        info!(target: "raglab::session", request_id = id, "Query submitted");
        self.state = SessionState::Pending(PendingRequest { id, token, task });
        true
    }

    /// Ask the pending request to stop. The session stays pending until the
    /// request actually unwinds and [`settle`](Self::settle) records it.
    pub fn cancel(&mut self) -> bool {
        match &self.state {
            SessionState::Idle => false,
            SessionState::Pending(pending) => {
                debug!(target: "raglab::session", request_id = pending.id, "Cancellation requested");
                pending.token.cancel();
                true
            }
        }
    }

    /// Clear transcript and input once `confirm` agrees. A pending request is
    /// cancelled; its cancellation notice lands in the fresh transcript.
    pub fn reset(&mut self, confirm: impl FnOnce(&str) -> bool) -> bool {
        if !confirm(RESET_PROMPT) {
            return false;
        }

        self.cancel();
        self.transcript.clear();
        self.input.clear();
        info!(target: "raglab::session", "Transcript reset");
        true
    }

    /// Wait for the pending request to finish and append its outcome.
    ///
    /// Never completes while idle. Cancel-safe: nothing is recorded unless the
    /// request task has finished.
    pub async fn settle(&mut self) {
        let outcome = match &mut self.state {
            SessionState::Pending(pending) => Outcome::from_join((&mut pending.task).await),
            SessionState::Idle => std::future::pending::<Outcome>().await,
        };
        self.resolve(outcome);
    }

    fn resolve(&mut self, mut outcome: Outcome) {
        // Leave the pending state before building the follow-up message
        if let SessionState::Pending(pending) = std::mem::replace(&mut self.state, SessionState::Idle) {
            // A stop request wins over an answer that arrived before it was seen
            if pending.cancel_requested() && matches!(outcome, Outcome::Answered(_)) {
                debug!(target: "raglab::session", request_id = pending.id, "Dropping answer that finished after cancellation");
                outcome = Outcome::Cancelled;
            }
            match &outcome {
                Outcome::Answered(_) => {
                    info!(target: "raglab::session", request_id = pending.id, "Answer received")
                }
                Outcome::Cancelled => {
                    info!(target: "raglab::session", request_id = pending.id, "Request cancelled")
                }
                Outcome::Failed(reason) => {
                    warn!(target: "raglab::session", request_id = pending.id, %reason, "Request failed")
                }
            }
        }

        self.transcript.push(outcome.into_message());
    }
}
