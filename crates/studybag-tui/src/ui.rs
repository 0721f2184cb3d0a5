use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};
use studybag_core::credential::mask;
use studybag_core::{ChatRole, Material, SessionStatus};

use crate::app::{App, EditTarget, InputMode, Screen, TextInput};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        match after.find("**") {
            Some(end) if end > 0 => {
                if start > 0 {
                    spans.push(Span::raw(rest[..start].to_string()));
                }
                spans.push(Span::styled(
                    after[..end].to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                ));
                rest = &after[end + 2..];
            }
            // No closing **, treat as literal
            _ => break,
        }
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Dashboard => render_dashboard(app, frame, body_area),
        Screen::Material => render_material_screen(app, frame, body_area),
        Screen::Backpack => render_backpack_screen(app, frame, body_area),
        Screen::Viewer => render_viewer_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.notification.is_some() {
        render_notification(app, frame, area);
    }
    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let key_indicator = match app.session.status() {
        SessionStatus::NoCredential => Span::styled(" [no API key] ", Style::default().fg(Color::Red)),
        _ => Span::styled(" [API key set] ", Style::default().fg(Color::Green)),
    };

    let title = Line::from(vec![
        Span::styled(" StudyBag ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("[{} in backpack]", app.backpack.len()),
            Style::default().fg(Color::Gray),
        ),
        key_indicator,
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Dashboard => " DASHBOARD ",
        Screen::Material => " MATERIAL ",
        Screen::Backpack => " BACKPACK ",
        Screen::Viewer => " PDF ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let keys: &[(&str, &str)] = if app.show_api_key_input {
        &[("Enter", "save"), ("Esc", "cancel")]
    } else {
        match (app.screen, app.input_mode) {
            (Screen::Dashboard, InputMode::Normal) => &[
                ("j/k", "nav"),
                ("Enter", "open"),
                ("s/t/f", "semester/subject/type"),
                ("c", "clear"),
                ("a", "add"),
                ("b", "backpack"),
                ("v", "pdf"),
                ("K", "key"),
                ("q", "quit"),
            ],
            (Screen::Backpack, InputMode::Normal) => &[
                ("j/k", "nav"),
                ("Enter", "open"),
                ("d", "remove"),
                ("Esc", "back"),
            ],
            (Screen::Material, InputMode::Normal) => &[
                ("i", "ask"),
                ("j/k", "scroll"),
                ("[/]", "preview"),
                ("a", "add"),
                ("K", "key"),
                ("Esc", "back"),
            ],
            (Screen::Viewer, InputMode::Normal) => &[
                ("o", "open pdf"),
                ("i", "ask"),
                ("j/k", "scroll"),
                ("K", "key"),
                ("Esc", "back"),
            ],
            (_, InputMode::Editing) => &[("Enter", "submit"), ("Esc", "cancel")],
        }
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in keys {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_dashboard(app: &mut App, frame: &mut Frame, area: Rect) {
    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(55), Constraint::Percentage(45)]).areas(area);
    let [filter_area, materials_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(list_area);

    let semester = app
        .filter
        .semester
        .map(|s| format!("Semester {}", s))
        .unwrap_or_else(|| "All Semesters".to_string());
    let subject = app
        .filter
        .subject
        .clone()
        .unwrap_or_else(|| "All Subjects".to_string());
    let kind = app
        .filter
        .kind
        .map(|k| k.as_str().to_string())
        .unwrap_or_else(|| "All Types".to_string());

    let filters = Paragraph::new(Line::from(vec![
        Span::styled(semester, Style::default().fg(Color::Cyan)),
        Span::raw("  |  "),
        Span::styled(subject, Style::default().fg(Color::Cyan)),
        Span::raw("  |  "),
        Span::styled(kind, Style::default().fg(Color::Cyan)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(" Filters "),
    );
    frame.render_widget(filters, filter_area);

    let materials = app.filtered_materials();
    let count = materials.len();
    let items: Vec<ListItem> = materials
        .iter()
        .map(|m| {
            let saved = if app.backpack.contains(&m.id) { "* " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::styled(saved, Style::default().fg(Color::Green)),
                Span::raw(m.title.clone()),
                Span::styled(
                    format!("  {} · Sem {}", m.kind.as_str(), m.semester),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" Study Materials ({}) ", count));

    if items.is_empty() {
        let empty = Paragraph::new("No materials found. Try adjusting your filters.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, materials_area);
    } else {
        let list = List::new(items)
            .block(block)
            .highlight_style(
                Style::default()
                    .bg(Color::Cyan)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, materials_area, &mut app.material_state);
    }

    let selected = app.selected_material().cloned();
    render_material_detail(selected.as_ref(), frame, detail_area);
}

fn render_material_detail(material: Option<&Material>, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Details ");

    let Some(m) = material else {
        frame.render_widget(block, area);
        return;
    };

    let label = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let text = Text::from(vec![
        Line::from(Span::styled(m.title.clone(), Style::default().bold())),
        Line::default(),
        Line::from(vec![Span::styled("Type: ", label), Span::raw(m.kind.as_str())]),
        Line::from(vec![Span::styled("Subject: ", label), Span::raw(m.subject.clone())]),
        Line::from(vec![
            Span::styled("Semester: ", label),
            Span::raw(m.semester.to_string()),
        ]),
        Line::from(vec![Span::styled("Year: ", label), Span::raw(m.year.to_string())]),
        Line::default(),
        Line::from(m.description.clone()),
    ]);

    let detail = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    frame.render_widget(detail, area);
}

fn render_backpack_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(55), Constraint::Percentage(45)]).areas(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .title(format!(" My Backpack ({}) ", app.backpack.len()));

    if app.backpack.is_empty() {
        let empty = Paragraph::new(
            "Your backpack is empty. Add materials from the dashboard with 'a'.",
        )
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true })
        .block(block);
        frame.render_widget(empty, list_area);
    } else {
        let items: Vec<ListItem> = app
            .backpack
            .items()
            .iter()
            .map(|m| {
                ListItem::new(Line::from(vec![
                    Span::raw(m.title.clone()),
                    Span::styled(
                        format!("  {}", m.subject),
                        Style::default().fg(Color::DarkGray),
                    ),
                ]))
            })
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(
                Style::default()
                    .bg(Color::Green)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, list_area, &mut app.backpack_state);
    }

    let selected = app.selected_backpack_item().cloned();
    render_material_detail(selected.as_ref(), frame, detail_area);
}

fn render_material_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [preview_area, chat_area] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(area);

    let title = app
        .current_material
        .as_ref()
        .map(|m| format!(" {} ", m.title))
        .unwrap_or_else(|| " Material ".to_string());

    let preview = Paragraph::new(app.preview_text.as_str())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(title),
        )
        .wrap(Wrap { trim: false })
        .scroll((app.preview_scroll, 0));
    frame.render_widget(preview, preview_area);

    render_chat(app, frame, chat_area, "Ask a question about this document...");
}

fn render_viewer_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [left_area, chat_area] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(area);
    let [info_area, path_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(left_area);

    let info = match &app.loaded_pdf {
        Some(pdf) => Text::from(vec![
            Line::from(Span::styled(pdf.name.clone(), Style::default().bold())),
            Line::default(),
            Line::from(Span::styled(
                "The whole file is sent with each question.",
                Style::default().fg(Color::DarkGray),
            )),
        ]),
        None => Text::from(vec![
            Line::from("No PDF loaded."),
            Line::default(),
            Line::from(Span::styled(
                "Press 'o' and enter the path of a PDF file.",
                Style::default().fg(Color::DarkGray),
            )),
        ]),
    };

    let info = Paragraph::new(info)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" PDF Viewer "),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(info, info_area);

    let editing = app.input_mode == InputMode::Editing && app.edit_target == EditTarget::PdfPath;
    render_text_input(frame, path_area, &app.path_input, " Open PDF (o) ", editing);

    let placeholder = if app.loaded_pdf.is_some() {
        "Ask a question about this PDF..."
    } else {
        "Open a PDF to start chatting."
    };
    render_chat(app, frame, chat_area, placeholder);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect, placeholder: &str) {
    let [chat_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" Chat: {} ", app.model_label));

    let loading = app.is_loading();
    let transcript = app.session.transcript();

    let chat_text = if transcript.is_empty() && !loading {
        Text::from(Span::styled(
            placeholder.to_string(),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in transcript {
            match msg.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    lines.push(Line::from(msg.content.as_str()));
                }
                ChatRole::Assistant => {
                    let color = if msg.content.starts_with("Error: ") {
                        Color::Red
                    } else {
                        Color::Yellow
                    };
                    lines.push(Line::from(Span::styled(
                        "AI:",
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
            lines.push(Line::default());
        }

        if loading {
            lines.push(Line::from(Span::styled(
                "AI:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    let editing = app.input_mode == InputMode::Editing && app.edit_target == EditTarget::Question;
    let title = if loading { " Waiting for answer... " } else { " Ask (i) " };
    render_text_input(frame, input_area, &app.question_input, title, editing);
}

fn render_text_input(frame: &mut Frame, area: Rect, input: &TextInput, title: &str, editing: bool) {
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    // Keep the cursor inside the visible window
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width > 0 && input.cursor >= inner_width {
        input.cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = input
        .value
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let paragraph = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(paragraph, area);

    if editing {
        let cursor_x = (input.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_notification(app: &App, frame: &mut Frame, area: Rect) {
    let Some(notification) = &app.notification else {
        return;
    };

    let width = 50.min(area.width.saturating_sub(2));
    let height = 4;
    let popup_area = Rect::new(
        area.width.saturating_sub(width + 1),
        1,
        width,
        height.min(area.height),
    );

    let color = if notification.is_error { Color::Red } else { Color::Green };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(format!(" {} ", notification.title));

    frame.render_widget(Clear, popup_area);
    let body = Paragraph::new(notification.message.as_str())
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(body, popup_area);
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 64.min(area.width.saturating_sub(4));
    let popup_height = 9;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height.min(area.height));

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Enter Gemini API Key ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new(
        "The key is stored on this machine and only sent to Gemini. \
         Press Enter to save, Esc to cancel.",
    )
    .style(Style::default().fg(Color::Gray))
    .wrap(Wrap { trim: true });
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 2));

    // Mask the key with asterisks, showing only the last 4 chars
    let value = &app.api_key_input.value;
    let display_text = if value.is_empty() {
        String::new()
    } else {
        mask(value)
    };

    let input_area = Rect::new(inner.x, inner.y + 3, inner.width, 1);
    frame.render_widget(
        Paragraph::new(display_text.clone()).style(Style::default().fg(Color::Cyan)),
        input_area,
    );

    let cursor_x = display_text.chars().count().min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let status = match &app.api_key_error {
        Some(error) => Span::styled(error.clone(), Style::default().fg(Color::Red)),
        None => Span::styled(
            format!("{} characters", value.chars().count()),
            Style::default().fg(Color::Gray),
        ),
    };
    frame.render_widget(
        Paragraph::new(Line::from(status)),
        Rect::new(inner.x, inner.y + 5, inner.width, 1),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_markdown_is_styled() {
        let line = parse_markdown_line("Module **2** covers paging");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "2");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn unclosed_bold_is_literal() {
        let line = parse_markdown_line("a ** b");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].content, "a ** b");
    }
}
