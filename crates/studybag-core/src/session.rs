//! Chat Session Controller
//!
//! One [`ChatSession`] per open document. It owns the transcript, gates every
//! question on a credential, and allows a single outstanding request.
//!
//! A question goes through three steps so a front end can run the provider
//! call wherever it likes (a spawned task, inline in a CLI):
//!
//! 1. [`ChatSession::submit`] appends the user message and hands back a
//!    [`PendingAnswer`].
//! 2. [`PendingAnswer::run`] performs the provider call.
//! 3. [`ChatSession::complete`] appends the single assistant message.
//!
//! Opening another document or dropping the session cancels the pending
//! answer; its outcome is then discarded by `complete`.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::answer::{Answer, AnswerError, AnswerService};
use crate::credential::{Credential, CredentialError, CredentialStore};
use crate::document::DocumentPayload;
use crate::prompt::{AnswerRequest, PromptComposer, PromptError};
use crate::state::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    NoCredential,
    Idle,
    AwaitingAnswer,
}

/// Why a submit was ignored. A rejected submit never touches the session.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejected {
    #[error("no API key configured")]
    NoCredential,
    #[error("no document open")]
    NoDocument,
    #[error("an answer is still pending")]
    Busy,
    #[error("question is empty")]
    EmptyQuestion,
}

impl From<PromptError> for SubmitRejected {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::EmptyQuestion => SubmitRejected::EmptyQuestion,
        }
    }
}

#[derive(Debug)]
pub enum Resolution {
    Answered(Answer),
    Failed(AnswerError),
    Cancelled,
}

/// Result of a provider call, tagged with the submit it belongs to.
#[derive(Debug)]
pub struct AnswerOutcome {
    ticket: u64,
    resolution: Resolution,
}

impl AnswerOutcome {
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Answered,
    Failed,
    /// The outcome belonged to a document or session that is gone.
    Discarded,
}

/// A submitted question waiting for its provider call.
#[derive(Debug)]
pub struct PendingAnswer {
    ticket: u64,
    request: AnswerRequest,
    credential: Credential,
    cancel: CancellationToken,
}

impl PendingAnswer {
    pub fn request(&self) -> &AnswerRequest {
        &self.request
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Issues exactly one provider call unless the session cancels first.
    /// An already-cancelled ticket never reaches the provider.
    pub async fn run<S>(self, service: &S) -> AnswerOutcome
    where
        S: AnswerService + ?Sized,
    {
        let resolution = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Resolution::Cancelled,
            result = service.answer(&self.request, &self.credential) => match result {
                Ok(answer) => Resolution::Answered(answer),
                Err(e) => Resolution::Failed(e),
            },
        };

        AnswerOutcome {
            ticket: self.ticket,
            resolution,
        }
    }
}

struct InFlight {
    ticket: u64,
    cancel: CancellationToken,
}

pub struct ChatSession {
    credential: Option<Credential>,
    document: Option<DocumentPayload>,
    transcript: Vec<ChatMessage>,
    in_flight: Option<InFlight>,
    next_ticket: u64,
    composer: PromptComposer,
}

impl ChatSession {
    pub fn new(credential: Option<Credential>) -> Self {
        Self {
            credential,
            document: None,
            transcript: Vec::new(),
            in_flight: None,
            next_ticket: 0,
            composer: PromptComposer,
        }
    }

    pub fn with_document(credential: Option<Credential>, document: DocumentPayload) -> Self {
        let mut session = Self::new(credential);
        session.open_document(document);
        session
    }

    pub fn status(&self) -> SessionStatus {
        if self.credential.is_none() {
            SessionStatus::NoCredential
        } else if self.in_flight.is_some() {
            SessionStatus::AwaitingAnswer
        } else {
            SessionStatus::Idle
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status() == SessionStatus::AwaitingAnswer
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn document(&self) -> Option<&DocumentPayload> {
        self.document.as_ref()
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// Persists the key, then uses it for every later submit. A pending
    /// answer keeps the key it was submitted with.
    pub fn set_credential(
        &mut self,
        store: &CredentialStore,
        credential: Credential,
    ) -> Result<(), CredentialError> {
        store.set(&credential)?;
        self.credential = Some(credential);
        Ok(())
    }

    /// Starts a fresh conversation about `document`.
    pub fn open_document(&mut self, document: DocumentPayload) {
        self.cancel_in_flight();
        self.transcript.clear();
        tracing::debug!(kind = document.kind_label(), "opened document");
        self.document = Some(document);
    }

    /// Leaves the session with no document and an empty transcript.
    pub fn close_document(&mut self) {
        self.cancel_in_flight();
        self.transcript.clear();
        self.document = None;
    }

    pub fn submit(&mut self, question: &str) -> Result<PendingAnswer, SubmitRejected> {
        let credential = self
            .credential
            .clone()
            .ok_or(SubmitRejected::NoCredential)?;
        if self.in_flight.is_some() {
            return Err(SubmitRejected::Busy);
        }
        let document = self.document.as_ref().ok_or(SubmitRejected::NoDocument)?;
        let request = self.composer.compose(document, question)?;
        let kind = document.kind_label();

        self.transcript.push(ChatMessage::user(question));

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let cancel = CancellationToken::new();
        self.in_flight = Some(InFlight {
            ticket,
            cancel: cancel.clone(),
        });

        tracing::info!(ticket, kind, "question submitted");

        Ok(PendingAnswer {
            ticket,
            request,
            credential,
            cancel,
        })
    }

    /// Appends the assistant message for the pending question and returns to
    /// idle. Outcomes for cancelled or superseded submits change nothing.
    pub fn complete(&mut self, outcome: AnswerOutcome) -> Completion {
        let current = matches!(
            &self.in_flight,
            Some(f) if f.ticket == outcome.ticket && !f.cancel.is_cancelled()
        );

        let (content, completion) = match (current, outcome.resolution) {
            (true, Resolution::Answered(answer)) => (answer.answer, Completion::Answered),
            (true, Resolution::Failed(e)) => {
                tracing::warn!(ticket = outcome.ticket, error = %e, "answer failed");
                (format!("Error: {}", e), Completion::Failed)
            }
            _ => {
                tracing::debug!(ticket = outcome.ticket, "discarding stale answer");
                return Completion::Discarded;
            }
        };

        self.in_flight = None;
        self.transcript.push(ChatMessage::assistant(content));
        tracing::info!(ticket = outcome.ticket, ?completion, "question completed");
        completion
    }

    /// Submit, run, and complete in one go.
    pub async fn ask<S>(&mut self, service: &S, question: &str) -> Result<Completion, SubmitRejected>
    where
        S: AnswerService + ?Sized,
    {
        let pending = self.submit(question)?;
        let outcome = pending.run(service).await;
        Ok(self.complete(outcome))
    }

    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            tracing::debug!(ticket = in_flight.ticket, "cancelling pending answer");
            in_flight.cancel.cancel();
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.cancel_in_flight();
    }
}
