use std::path::Path;
use std::sync::Arc;

use ratatui::widgets::ListState;
use studybag_core::{
    AnswerOutcome, AnswerService, Backpack, Catalog, ChatSession, Completion, Credential,
    CredentialError, CredentialStore, DocumentError, DocumentSource, Material, MaterialFilter,
    MaterialKind, SubmitRejected,
};
use tokio::sync::mpsc;

use crate::tui::AppEvent;

/// Ticks (300ms each) a notification stays on screen.
const NOTIFICATION_TICKS: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Dashboard,
    Material,
    Backpack,
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// What the text input currently edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Question,
    PdfPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub is_error: bool,
    ticks_left: u8,
}

/// A PDF loaded into the viewer.
pub struct LoadedPdf {
    pub name: String,
    pub payload: studybag_core::DocumentPayload,
}

/// Single-line text input with a character cursor.
#[derive(Debug, Default, Clone)]
pub struct TextInput {
    pub value: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.value.chars().count() {
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.value.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.value)
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub edit_target: EditTarget,

    // Dashboard
    pub catalog: Catalog,
    pub filter: MaterialFilter,
    pub material_state: ListState,

    // Backpack
    pub backpack: Backpack,
    pub backpack_state: ListState,

    // Material preview
    pub current_material: Option<Material>,
    pub preview_text: String,
    pub preview_scroll: u16,

    // Viewer
    pub loaded_pdf: Option<LoadedPdf>,
    pub path_input: TextInput,

    // Chat
    pub session: ChatSession,
    pub question_input: TextInput,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub animation_frame: u8,

    // API key dialog
    pub show_api_key_input: bool,
    pub api_key_input: TextInput,
    pub api_key_error: Option<String>,

    pub notification: Option<Notification>,
    pub model_label: String,

    document_source: DocumentSource,
    credential_store: CredentialStore,
    answer_service: Arc<dyn AnswerService>,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        catalog: Catalog,
        backpack: Backpack,
        credential_store: CredentialStore,
        answer_service: Arc<dyn AnswerService>,
        model_label: String,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let session = ChatSession::new(credential_store.get());

        let mut material_state = ListState::default();
        if !catalog.materials().is_empty() {
            material_state.select(Some(0));
        }
        let mut backpack_state = ListState::default();
        if !backpack.is_empty() {
            backpack_state.select(Some(0));
        }

        Self {
            should_quit: false,
            screen: Screen::Dashboard,
            input_mode: InputMode::Normal,
            edit_target: EditTarget::Question,
            catalog,
            filter: MaterialFilter::default(),
            material_state,
            backpack,
            backpack_state,
            current_material: None,
            preview_text: String::new(),
            preview_scroll: 0,
            loaded_pdf: None,
            path_input: TextInput::default(),
            session,
            question_input: TextInput::default(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            show_api_key_input: false,
            api_key_input: TextInput::default(),
            api_key_error: None,
            notification: None,
            model_label,
            document_source: DocumentSource::default(),
            credential_store,
            answer_service,
            events,
        }
    }

    // Dashboard

    pub fn filtered_materials(&self) -> Vec<&Material> {
        self.catalog.filter(&self.filter)
    }

    pub fn selected_material(&self) -> Option<&Material> {
        let i = self.material_state.selected()?;
        self.filtered_materials().get(i).copied()
    }

    pub fn material_nav_down(&mut self) {
        let len = self.filtered_materials().len();
        select_next(&mut self.material_state, len);
    }

    pub fn material_nav_up(&mut self) {
        let len = self.filtered_materials().len();
        select_prev(&mut self.material_state, len);
    }

    /// All semesters, then each semester in turn.
    pub fn cycle_semester(&mut self) {
        let semesters = self.catalog.semesters().to_vec();
        self.filter.semester = cycle(&semesters, self.filter.semester.as_ref()).copied();
        self.reset_material_selection();
    }

    pub fn cycle_subject(&mut self) {
        let subjects = self.catalog.subjects().to_vec();
        self.filter.subject = cycle(&subjects, self.filter.subject.as_ref()).cloned();
        self.reset_material_selection();
    }

    pub fn cycle_kind(&mut self) {
        let kinds = MaterialKind::all();
        self.filter.kind = cycle(&kinds, self.filter.kind.as_ref()).copied();
        self.reset_material_selection();
    }

    pub fn clear_filters(&mut self) {
        self.filter = MaterialFilter::default();
        self.reset_material_selection();
    }

    fn reset_material_selection(&mut self) {
        let empty = self.filtered_materials().is_empty();
        self.material_state.select(if empty { None } else { Some(0) });
    }

    // Backpack

    pub fn add_to_backpack(&mut self, material: &Material) {
        match self.backpack.add(material) {
            Ok(true) => {
                if self.backpack_state.selected().is_none() {
                    self.backpack_state.select(Some(0));
                }
                self.notify("Added to Backpack", &material.title);
            }
            Ok(false) => {}
            Err(e) => self.notify_error("Backpack Error", &e.to_string()),
        }
    }

    pub fn add_selected_to_backpack(&mut self) {
        let material = match self.screen {
            Screen::Material => self.current_material.clone(),
            _ => self.selected_material().cloned(),
        };
        if let Some(material) = material {
            self.add_to_backpack(&material);
        }
    }

    pub fn selected_backpack_item(&self) -> Option<&Material> {
        let i = self.backpack_state.selected()?;
        self.backpack.items().get(i)
    }

    pub fn remove_selected_from_backpack(&mut self) {
        let Some(id) = self.selected_backpack_item().map(|m| m.id.clone()) else {
            return;
        };

        if let Err(e) = self.backpack.remove(&id) {
            self.notify_error("Backpack Error", &e.to_string());
            return;
        }

        let len = self.backpack.len();
        let selected = self.backpack_state.selected().unwrap_or(0);
        self.backpack_state.select(if len == 0 {
            None
        } else {
            Some(selected.min(len - 1))
        });
    }

    pub fn backpack_nav_down(&mut self) {
        let len = self.backpack.len();
        select_next(&mut self.backpack_state, len);
    }

    pub fn backpack_nav_up(&mut self) {
        let len = self.backpack.len();
        select_prev(&mut self.backpack_state, len);
    }

    // Documents

    /// Show a material and start a new conversation about it.
    pub fn open_material(&mut self, material: Material) {
        let payload = self.document_source.from_material(&material);
        if let studybag_core::DocumentPayload::Text { content } = &payload {
            self.preview_text = content.clone();
        }
        self.session.open_document(payload);
        self.current_material = Some(material);
        self.preview_scroll = 0;
        self.enter_chat_screen(Screen::Material);
    }

    pub fn open_viewer(&mut self) {
        match &self.loaded_pdf {
            Some(pdf) => self.session.open_document(pdf.payload.clone()),
            None => self.session.close_document(),
        }
        self.enter_chat_screen(Screen::Viewer);
    }

    /// A rejected file leaves the current PDF and its conversation in place.
    pub fn load_pdf(&mut self, path: &Path) {
        match self.document_source.from_path(path) {
            Ok(payload) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.session.open_document(payload.clone());
                self.loaded_pdf = Some(LoadedPdf { name, payload });
                self.chat_scroll = 0;
            }
            Err(DocumentError::InvalidInputKind { .. }) => {
                self.notify_error("Invalid File Type", "Please upload a valid PDF file.");
            }
            Err(e) => self.notify_error("Could Not Open File", &e.to_string()),
        }
    }

    fn enter_chat_screen(&mut self, screen: Screen) {
        self.screen = screen;
        self.input_mode = InputMode::Normal;
        self.question_input.clear();
        self.chat_scroll = 0;
        if !self.session.has_credential() {
            self.open_api_key_dialog();
        }
    }

    // Chat

    pub fn submit_question(&mut self) {
        let question = self.question_input.value.clone();

        match self.session.submit(&question) {
            Ok(pending) => {
                self.question_input.clear();
                self.input_mode = InputMode::Normal;

                let service = self.answer_service.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    let outcome = pending.run(service.as_ref()).await;
                    // The receiver is gone only when the app is shutting down
                    let _ = events.send(AppEvent::Answer(outcome));
                });

                self.scroll_chat_to_bottom();
            }
            Err(SubmitRejected::NoCredential) => self.open_api_key_dialog(),
            Err(reason) => tracing::debug!(%reason, "submit ignored"),
        }
    }

    pub fn finish_answer(&mut self, outcome: AnswerOutcome) {
        if self.session.complete(outcome) == Completion::Failed {
            self.notify_error(
                "Chatbot Error",
                "Could not get a response. Please check your API key and try again.",
            );
        }
        self.scroll_chat_to_bottom();
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_loading()
    }

    /// Scroll so the last line of the chat is visible.
    pub fn scroll_chat_to_bottom(&mut self) {
        let width = self.chat_width.max(1) as usize;
        let mut total_lines: usize = 0;

        for msg in self.session.transcript() {
            // Role label + content lines + blank separator
            total_lines += 1;
            for line in msg.content.lines() {
                total_lines += (line.chars().count() / width) + 1;
            }
            total_lines += 1;
        }
        if self.is_loading() {
            total_lines += 2;
        }

        let visible = self.chat_height as usize;
        self.chat_scroll = total_lines.saturating_sub(visible) as u16;
    }

    pub fn tick(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        if let Some(notification) = &mut self.notification {
            notification.ticks_left = notification.ticks_left.saturating_sub(1);
            if notification.ticks_left == 0 {
                self.notification = None;
            }
        }
    }

    // API key dialog

    pub fn open_api_key_dialog(&mut self) {
        self.show_api_key_input = true;
        self.api_key_input.clear();
        self.api_key_error = None;
    }

    pub fn close_api_key_dialog(&mut self) {
        self.show_api_key_input = false;
        self.api_key_input.clear();
        self.api_key_error = None;
    }

    pub fn save_api_key(&mut self) {
        let credential = match Credential::new(self.api_key_input.value.clone()) {
            Ok(credential) => credential,
            Err(_) => {
                self.api_key_error = Some("API Key is required.".to_string());
                return;
            }
        };

        match self.session.set_credential(&self.credential_store, credential) {
            Ok(()) => {
                self.close_api_key_dialog();
                self.notify(
                    "API Key Saved",
                    "Your Gemini API key has been saved on this machine.",
                );
            }
            Err(CredentialError::Empty) => {
                self.api_key_error = Some("API Key is required.".to_string());
            }
            Err(e) => self.api_key_error = Some(e.to_string()),
        }
    }

    // Notifications

    pub fn notify(&mut self, title: &str, message: &str) {
        self.notification = Some(Notification {
            title: title.to_string(),
            message: message.to_string(),
            is_error: false,
            ticks_left: NOTIFICATION_TICKS,
        });
    }

    pub fn notify_error(&mut self, title: &str, message: &str) {
        tracing::warn!(title, message, "shown error notification");
        self.notification = Some(Notification {
            title: title.to_string(),
            message: message.to_string(),
            is_error: true,
            ticks_left: NOTIFICATION_TICKS,
        });
    }
}

fn select_next(state: &mut ListState, len: usize) {
    if len == 0 {
        return;
    }
    let i = match state.selected() {
        Some(i) => (i + 1).min(len - 1),
        None => 0,
    };
    state.select(Some(i));
}

fn select_prev(state: &mut ListState, len: usize) {
    if len == 0 {
        return;
    }
    let i = state.selected().map(|i| i.saturating_sub(1)).unwrap_or(0);
    state.select(Some(i));
}

/// None -> first -> ... -> last -> None
fn cycle<'a, T: PartialEq>(options: &'a [T], current: Option<&T>) -> Option<&'a T> {
    match current {
        None => options.first(),
        Some(current) => {
            let pos = options.iter().position(|o| o == current)?;
            options.get(pos + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use studybag_core::{
        Answer, AnswerError, AnswerRequest, ChatRole, LocalStorage, SessionStatus,
    };

    struct FixedService(&'static str);

    #[async_trait]
    impl AnswerService for FixedService {
        async fn answer(
            &self,
            _: &AnswerRequest,
            _: &Credential,
        ) -> Result<Answer, AnswerError> {
            match self.0 {
                "fail" => Err(AnswerError::Provider("quota exceeded".to_string())),
                answer => Ok(Answer {
                    answer: answer.to_string(),
                }),
            }
        }
    }

    fn app_with(
        dir: &tempfile::TempDir,
        reply: &'static str,
    ) -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let storage = LocalStorage::open(dir.path().join("storage.json"));
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(
            Catalog::builtin(),
            Backpack::load(storage.clone()),
            CredentialStore::new(storage),
            Arc::new(FixedService(reply)),
            "test-model".to_string(),
            tx,
        );
        (app, rx)
    }

    #[test]
    fn filters_cycle_through_all_values() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app_with(&dir, "ok");

        app.cycle_kind();
        assert_eq!(app.filter.kind, Some(MaterialKind::QuestionPaper));
        assert_eq!(app.filtered_materials().len(), 4);
        app.cycle_kind();
        app.cycle_kind();
        assert_eq!(app.filter.kind, Some(MaterialKind::Syllabus));
        app.cycle_kind();
        assert_eq!(app.filter.kind, None);

        for _ in 0..5 {
            app.cycle_semester();
        }
        assert_eq!(app.filter.semester, Some(5));
        assert_eq!(app.selected_material().unwrap().id, "os-syllabus");

        app.cycle_semester();
        app.cycle_subject();
        // Semester 6 has no Data Structures material
        assert!(app.filtered_materials().is_empty());
        assert_eq!(app.material_state.selected(), None);

        app.clear_filters();
        assert_eq!(app.filtered_materials().len(), 8);
    }

    #[test]
    fn missing_key_opens_dialog_and_blank_key_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app_with(&dir, "ok");

        let material = app.catalog.get("os-syllabus").unwrap().clone();
        app.open_material(material);
        assert!(app.show_api_key_input);

        app.save_api_key();
        assert_eq!(app.api_key_error.as_deref(), Some("API Key is required."));
        assert!(app.show_api_key_input);

        app.api_key_input.value = "AIza-key".to_string();
        app.save_api_key();
        assert!(!app.show_api_key_input);
        assert_eq!(app.session.status(), SessionStatus::Idle);
    }

    #[test]
    fn backpack_add_and_remove_from_ui() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app_with(&dir, "ok");

        app.add_selected_to_backpack();
        app.add_selected_to_backpack();
        assert_eq!(app.backpack.len(), 1);
        assert_eq!(app.selected_backpack_item().unwrap().id, "ds-qp-2023");

        app.remove_selected_from_backpack();
        assert!(app.backpack.is_empty());
        assert_eq!(app.backpack_state.selected(), None);
    }

    #[tokio::test]
    async fn rejected_pdf_keeps_current_document() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, mut rx) = app_with(&dir, "A PDF about paging.");
        app.api_key_input.value = "AIza-key".to_string();
        app.save_api_key();
        let pdf = dir.path().join("notes.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();

        app.open_viewer();
        app.load_pdf(&pdf);
        assert_eq!(app.loaded_pdf.as_ref().unwrap().name, "notes.pdf");

        app.question_input.value = "What is this?".to_string();
        app.submit_question();
        let Some(AppEvent::Answer(outcome)) = rx.recv().await else {
            panic!("expected an answer event");
        };
        app.finish_answer(outcome);
        let before = app.session.transcript().to_vec();
        assert_eq!(before.len(), 2);
        let document_before = app.session.document().cloned();

        std::fs::write(dir.path().join("photo.png"), b"\x89PNG").unwrap();
        app.load_pdf(&dir.path().join("photo.png"));
        let notification = app.notification.clone().unwrap();
        assert!(notification.is_error);
        assert_eq!(notification.title, "Invalid File Type");
        assert_eq!(app.loaded_pdf.as_ref().unwrap().name, "notes.pdf");
        assert_eq!(app.session.document().cloned(), document_before);
        assert_eq!(app.session.transcript(), before.as_slice());
        assert!(!app.is_loading());
    }

    #[tokio::test]
    async fn question_round_trip_through_event_channel() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, mut rx) = app_with(&dir, "Core Concepts");
        app.api_key_input.value = "AIza-key".to_string();
        app.save_api_key();

        let material = app.catalog.get("os-syllabus").unwrap().clone();
        app.open_material(material);
        app.question_input.value = "What is covered in Module 2?".to_string();
        app.submit_question();
        assert!(app.is_loading());
        assert!(app.question_input.value.is_empty());

        let Some(AppEvent::Answer(outcome)) = rx.recv().await else {
            panic!("expected an answer event");
        };
        app.finish_answer(outcome);

        let transcript = app.session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, ChatRole::User);
        assert_eq!(transcript[1].content, "Core Concepts");
        assert!(!app.is_loading());
    }

    #[tokio::test]
    async fn failed_answer_shows_notification() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, mut rx) = app_with(&dir, "fail");
        app.api_key_input.value = "AIza-key".to_string();
        app.save_api_key();

        let material = app.catalog.get("ds-qp-2023").unwrap().clone();
        app.open_material(material);
        app.question_input.value = "q".to_string();
        app.submit_question();

        let Some(AppEvent::Answer(outcome)) = rx.recv().await else {
            panic!("expected an answer event");
        };
        app.finish_answer(outcome);

        assert_eq!(app.session.transcript()[1].content, "Error: quota exceeded");
        assert_eq!(app.notification.as_ref().unwrap().title, "Chatbot Error");
    }

    #[test]
    fn text_input_is_utf8_safe() {
        let mut input = TextInput::default();
        for c in "héllo".chars() {
            input.insert(c);
        }
        input.left();
        input.backspace();
        assert_eq!(input.value, "hélo");
        input.home();
        input.delete();
        assert_eq!(input.value, "élo");
        assert_eq!(input.take(), "élo");
        assert_eq!(input.cursor, 0);
    }
}
