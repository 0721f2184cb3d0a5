use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use studybag_core::{
    Answer, AnswerError, AnswerRequest, AnswerService, Catalog, ChatMessage, ChatSession,
    Completion, Credential, CredentialStore, DocumentError, DocumentPayload, DocumentSource,
    LocalStorage, PromptPart, Resolution, SessionStatus, SubmitRejected,
};

/// Replies from a script and records every call it receives.
#[derive(Default)]
struct ScriptedService {
    replies: Mutex<VecDeque<Result<Answer, AnswerError>>>,
    calls: Mutex<Vec<(AnswerRequest, String)>>,
}

impl ScriptedService {
    fn new(replies: Vec<Result<Answer, AnswerError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn last_call(&self) -> (AnswerRequest, String) {
        self.calls.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl AnswerService for ScriptedService {
    async fn answer(
        &self,
        request: &AnswerRequest,
        credential: &Credential,
    ) -> Result<Answer, AnswerError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.clone(), credential.expose().to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AnswerError::Provider("script exhausted".to_string())))
    }
}

/// Never answers.
struct StalledService;

#[async_trait]
impl AnswerService for StalledService {
    async fn answer(&self, _: &AnswerRequest, _: &Credential) -> Result<Answer, AnswerError> {
        std::future::pending().await
    }
}

fn answer(text: &str) -> Result<Answer, AnswerError> {
    Ok(Answer {
        answer: text.to_string(),
    })
}

fn key() -> Credential {
    Credential::new("AIza-session-key").unwrap()
}

#[tokio::test]
async fn text_document_question_and_answer() {
    let service = ScriptedService::new(vec![answer("Core Concepts")]);
    let document = DocumentPayload::text("Syllabus for Operating Systems, Semester 5...");
    let mut session = ChatSession::with_document(Some(key()), document);

    let completion = session
        .ask(&service, "What is covered in Module 2?")
        .await
        .unwrap();

    assert_eq!(completion, Completion::Answered);
    assert_eq!(
        session.transcript(),
        &[
            ChatMessage::user("What is covered in Module 2?"),
            ChatMessage::assistant("Core Concepts"),
        ]
    );
    assert_eq!(session.status(), SessionStatus::Idle);

    let (request, credential) = service.last_call();
    assert_eq!(credential, "AIza-session-key");
    let rendered = request.render();
    assert!(rendered.contains("Syllabus for Operating Systems, Semester 5..."));
    assert!(rendered.contains("What is covered in Module 2?"));
}

#[tokio::test]
async fn missing_credential_blocks_everything() {
    let service = ScriptedService::new(vec![answer("unused")]);
    let mut session = ChatSession::with_document(None, DocumentPayload::text("doc"));

    let rejected = session.ask(&service, "anything").await.unwrap_err();

    assert_eq!(rejected, SubmitRejected::NoCredential);
    assert!(session.transcript().is_empty());
    assert_eq!(session.status(), SessionStatus::NoCredential);
    assert_eq!(service.call_count(), 0);
}

#[tokio::test]
async fn service_failure_becomes_error_message() {
    let service = ScriptedService::new(vec![Err(AnswerError::Provider(
        "quota exceeded".to_string(),
    ))]);
    let mut session = ChatSession::with_document(Some(key()), DocumentPayload::text("doc"));

    let completion = session.ask(&service, "Why?").await.unwrap();

    assert_eq!(completion, Completion::Failed);
    assert_eq!(session.transcript().len(), 2);
    let reply = &session.transcript()[1];
    assert_eq!(reply, &ChatMessage::assistant("Error: quota exceeded"));
    assert_eq!(session.status(), SessionStatus::Idle);

    // The user can simply try again.
    let service = ScriptedService::new(vec![answer("Because.")]);
    session.ask(&service, "Why?").await.unwrap();
    assert_eq!(session.transcript().len(), 4);
}

#[tokio::test]
async fn one_call_and_one_reply_per_submit() {
    let service = ScriptedService::new(vec![
        answer("a1"),
        Err(AnswerError::MalformedResponse("missing `answer` field".to_string())),
        answer("a3"),
    ]);
    let mut session = ChatSession::with_document(Some(key()), DocumentPayload::text("doc"));

    for (i, question) in ["q1", "q2", "q3"].iter().enumerate() {
        session.ask(&service, question).await.unwrap();
        assert_eq!(service.call_count(), i + 1);
        assert_eq!(session.transcript().len(), 2 * (i + 1));
    }

    let contents: Vec<&str> = session
        .transcript()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec![
            "q1",
            "a1",
            "q2",
            "Error: Malformed response: missing `answer` field",
            "q3",
            "a3"
        ]
    );
}

#[tokio::test]
async fn identical_questions_are_asked_again() {
    let service = ScriptedService::new(vec![answer("first"), answer("second")]);
    let mut session = ChatSession::with_document(Some(key()), DocumentPayload::text("doc"));

    session.ask(&service, "same").await.unwrap();
    session.ask(&service, "same").await.unwrap();

    assert_eq!(service.call_count(), 2);
    assert_eq!(session.transcript()[3].content, "second");
}

#[tokio::test]
async fn submit_while_awaiting_is_ignored() {
    let service = ScriptedService::new(vec![answer("only")]);
    let mut session = ChatSession::with_document(Some(key()), DocumentPayload::text("doc"));

    let pending = session.submit("first").unwrap();
    assert_eq!(session.submit("second").unwrap_err(), SubmitRejected::Busy);
    assert_eq!(session.transcript().len(), 1);

    let outcome = pending.run(&service).await;
    assert_eq!(session.complete(outcome), Completion::Answered);
    assert_eq!(service.call_count(), 1);
    assert_eq!(
        session.transcript(),
        &[ChatMessage::user("first"), ChatMessage::assistant("only")]
    );
}

#[tokio::test]
async fn blank_question_never_reaches_the_service() {
    let service = ScriptedService::new(vec![answer("unused")]);
    let mut session = ChatSession::with_document(Some(key()), DocumentPayload::text("doc"));

    assert_eq!(
        session.ask(&service, " \n ").await.unwrap_err(),
        SubmitRejected::EmptyQuestion
    );
    assert_eq!(session.status(), SessionStatus::Idle);
    assert!(session.transcript().is_empty());
    assert_eq!(service.call_count(), 0);
}

#[tokio::test]
async fn changing_document_drops_late_answer() {
    let service = ScriptedService::new(vec![answer("about the old document")]);
    let mut session = ChatSession::with_document(Some(key()), DocumentPayload::text("old"));
    session
        .ask(&ScriptedService::new(vec![answer("kept?")]), "earlier")
        .await
        .unwrap();

    let pending = session.submit("late question").unwrap();
    session.open_document(DocumentPayload::text("new"));
    assert!(session.transcript().is_empty());

    let outcome = pending.run(&service).await;
    assert!(matches!(outcome.resolution(), Resolution::Cancelled));
    assert_eq!(service.call_count(), 0);
    assert_eq!(session.complete(outcome), Completion::Discarded);
    assert!(session.transcript().is_empty());
    assert_eq!(session.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn dropping_session_stops_spawned_call() {
    let mut session = ChatSession::with_document(Some(key()), DocumentPayload::text("doc"));
    let pending = session.submit("q").unwrap();

    let service: Arc<dyn AnswerService> = Arc::new(StalledService);
    let task = tokio::spawn(async move { pending.run(service.as_ref()).await });

    drop(session);
    let outcome = task.await.unwrap();
    assert!(matches!(outcome.resolution(), Resolution::Cancelled));
}

#[tokio::test]
async fn uploaded_pdf_is_sent_as_media_and_resets_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("notes.pdf");
    std::fs::write(&pdf, b"%PDF-1.4 fake").unwrap();

    let source = DocumentSource::default();
    let catalog = Catalog::builtin();
    let mut session = ChatSession::with_document(
        Some(key()),
        source.from_material(catalog.get("os-syllabus").unwrap()),
    );
    session
        .ask(&ScriptedService::new(vec![answer("yes")]), "syllabus?")
        .await
        .unwrap();
    assert_eq!(session.transcript().len(), 2);

    session.open_document(source.from_path(&pdf).unwrap());
    assert!(session.transcript().is_empty());

    let service = ScriptedService::new(vec![answer("It is a PDF.")]);
    session.ask(&service, "What is this?").await.unwrap();

    let (request, _) = service.last_call();
    assert!(request
        .parts
        .iter()
        .any(|p| matches!(p, PromptPart::Media { media_type, .. } if media_type == "application/pdf")));
}

#[tokio::test]
async fn invalid_upload_leaves_session_alone() {
    let source = DocumentSource::default();
    let mut session = ChatSession::with_document(Some(key()), DocumentPayload::text("doc"));
    session
        .ask(&ScriptedService::new(vec![answer("a")]), "q")
        .await
        .unwrap();

    let before_doc = session.document().cloned();
    let before = session.transcript().to_vec();

    // A front end only opens what the adapter accepted
    let uploads: [(&str, &str, &[u8]); 2] = [
        ("scan.png", "image/png", b"\x89PNG"),
        ("notes.txt", "text/plain", b"plain"),
    ];
    for (name, media_type, bytes) in uploads {
        match source.from_upload(name, media_type, bytes) {
            Ok(payload) => session.open_document(payload),
            Err(e) => assert!(matches!(e, DocumentError::InvalidInputKind { .. })),
        }
    }

    assert_eq!(session.document().cloned(), before_doc);
    assert_eq!(session.transcript(), before.as_slice());

    // The conversation carries on with the same document
    let service = ScriptedService::new(vec![answer("still here")]);
    session.ask(&service, "follow-up").await.unwrap();
    assert_eq!(session.transcript().len(), before.len() + 2);
    let (request, _) = service.last_call();
    assert!(request.render().contains("Document: doc\n"));
}

#[tokio::test]
async fn credential_entered_mid_session_is_used_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");
    let store = CredentialStore::new(LocalStorage::open(&path));

    let mut session = ChatSession::with_document(store.get(), DocumentPayload::text("doc"));
    assert_eq!(session.status(), SessionStatus::NoCredential);

    session
        .set_credential(&store, Credential::new("fresh-key").unwrap())
        .unwrap();
    let service = ScriptedService::new(vec![answer("ok")]);
    session.ask(&service, "q").await.unwrap();
    assert_eq!(service.last_call().1, "fresh-key");

    // A new run of the app finds the key without asking.
    let reloaded = CredentialStore::new(LocalStorage::open(&path));
    let next = ChatSession::new(reloaded.get());
    assert_eq!(next.status(), SessionStatus::Idle);
}
