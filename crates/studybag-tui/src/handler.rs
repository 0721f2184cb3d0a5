use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, EditTarget, InputMode, Screen, TextInput};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick(),
        AppEvent::Answer(outcome) => app.finish_answer(outcome),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // The key dialog is modal
    if app.show_api_key_input {
        handle_api_key_input(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_api_key_dialog(),
        KeyCode::Enter => app.save_api_key(),
        code => edit_text(&mut app.api_key_input, code),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('K') {
        app.open_api_key_dialog();
        return;
    }

    match app.screen {
        Screen::Dashboard => handle_dashboard(app, key),
        Screen::Backpack => handle_backpack(app, key),
        Screen::Material | Screen::Viewer => handle_chat_screen(app, key),
    }
}

fn handle_dashboard(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('j') | KeyCode::Down => app.material_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.material_nav_up(),

        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
            if let Some(material) = app.selected_material().cloned() {
                app.open_material(material);
            }
        }

        // Filters
        KeyCode::Char('s') => app.cycle_semester(),
        KeyCode::Char('t') => app.cycle_subject(),
        KeyCode::Char('f') => app.cycle_kind(),
        KeyCode::Char('c') => app.clear_filters(),

        KeyCode::Char('a') => app.add_selected_to_backpack(),
        KeyCode::Char('b') => app.screen = Screen::Backpack,
        KeyCode::Char('v') => app.open_viewer(),
        _ => {}
    }
}

fn handle_backpack(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Esc | KeyCode::Char('h') | KeyCode::Left => app.screen = Screen::Dashboard,

        KeyCode::Char('j') | KeyCode::Down => app.backpack_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.backpack_nav_up(),

        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
            if let Some(material) = app.selected_backpack_item().cloned() {
                app.open_material(material);
            }
        }
        KeyCode::Char('d') | KeyCode::Delete => app.remove_selected_from_backpack(),
        _ => {}
    }
}

fn handle_chat_screen(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.screen = Screen::Dashboard,

        // Start typing a question
        KeyCode::Char('i') | KeyCode::Enter => {
            app.edit_target = EditTarget::Question;
            app.input_mode = InputMode::Editing;
        }

        // Open a PDF (viewer only)
        KeyCode::Char('o') if app.screen == Screen::Viewer => {
            app.edit_target = EditTarget::PdfPath;
            app.input_mode = InputMode::Editing;
        }

        KeyCode::Char('a') if app.screen == Screen::Material => app.add_selected_to_backpack(),

        // Chat scrolling
        KeyCode::Char('j') | KeyCode::Down => app.chat_scroll = app.chat_scroll.saturating_add(1),
        KeyCode::Char('k') | KeyCode::Up => app.chat_scroll = app.chat_scroll.saturating_sub(1),
        KeyCode::PageDown => app.chat_scroll = app.chat_scroll.saturating_add(10),
        KeyCode::PageUp => app.chat_scroll = app.chat_scroll.saturating_sub(10),
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        // Preview scrolling
        KeyCode::Char(']') => app.preview_scroll = app.preview_scroll.saturating_add(1),
        KeyCode::Char('[') => app.preview_scroll = app.preview_scroll.saturating_sub(1),
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match app.edit_target {
        EditTarget::Question => match key.code {
            KeyCode::Esc => app.input_mode = InputMode::Normal,
            KeyCode::Enter => app.submit_question(),
            code => edit_text(&mut app.question_input, code),
        },
        EditTarget::PdfPath => match key.code {
            KeyCode::Esc => {
                app.input_mode = InputMode::Normal;
                app.path_input.clear();
            }
            KeyCode::Enter => {
                let raw = app.path_input.take();
                app.input_mode = InputMode::Normal;
                if !raw.trim().is_empty() {
                    app.load_pdf(&expand_home(raw.trim()));
                }
            }
            code => edit_text(&mut app.path_input, code),
        },
    }
}

/// Cursor movement and character editing shared by every text input.
fn edit_text(input: &mut TextInput, code: KeyCode) {
    match code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) => input.insert(c),
        _ => {}
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
