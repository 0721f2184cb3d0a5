pub mod answer;
pub mod backpack;
pub mod catalog;
pub mod config;
pub mod credential;
pub mod document;
pub mod prompt;
pub mod session;
pub mod state;
pub mod storage;

// Re-export main types for convenience
pub use answer::{Answer, AnswerError, AnswerService, GeminiClient};
pub use backpack::Backpack;
pub use catalog::{Catalog, Material, MaterialFilter, MaterialKind};
pub use config::Config;
pub use credential::{Credential, CredentialError, CredentialStore};
pub use document::{DocumentError, DocumentPayload, DocumentSource, SampleTextExtractor, TextExtractor};
pub use prompt::{AnswerRequest, PromptComposer, PromptError, PromptPart};
pub use session::{
    AnswerOutcome, ChatSession, Completion, PendingAnswer, Resolution, SessionStatus,
    SubmitRejected,
};
pub use state::{ChatMessage, ChatRole};
pub use storage::{LocalStorage, StorageError};
