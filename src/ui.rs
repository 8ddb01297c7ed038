use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use crate::app::{App, InputMode};
use crate::session::RESET_PROMPT;
use crate::transcript::{ChatRole, Message};

const EMPTY_STATE_TEXT: &str = "Knowledge base ready. Ask your first question above.";
const BUSY_TEXT: &str = "AI is searching the vector database";

/// Render `**bold**` runs. A trailing unmatched `**` stays literal.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let parts: Vec<&str> = text.split("**").collect();
    // Odd part count means every delimiter has a partner
    let paired = if parts.len() % 2 == 0 { parts.len() - 1 } else { parts.len() };

    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut plain = String::new();
    for (i, part) in parts.iter().enumerate() {
        let is_bold = i % 2 == 1;
        if i >= paired || (is_bold && part.is_empty()) {
            plain.push_str("**");
            plain.push_str(part);
            if i < paired {
                plain.push_str("**");
            }
        } else if is_bold {
            if !plain.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut plain)));
            }
            spans.push(Span::styled(
                part.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        } else {
            plain.push_str(part);
        }
    }
    if !plain.is_empty() {
        spans.push(Span::raw(plain));
    }

    Line::from(spans)
}

fn message_lines(msg: &Message, lines: &mut Vec<Line<'static>>) {
    match msg.role() {
        ChatRole::User => {
            lines.push(Line::from(Span::styled(
                format!("{}:", msg.role().display_name()),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            for line in msg.content().lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        ChatRole::Assistant => {
            lines.push(Line::from(Span::styled(
                format!("{}:", msg.role().display_name()),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            for line in msg.content().lines() {
                lines.push(parse_markdown_line(line));
            }
            if let Some(context) = msg.context() {
                lines.push(Line::from(Span::styled(
                    format!("SOURCES: {}", context),
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }
    }
    lines.push(Line::default());
}

/// Transcript as styled lines, plus the busy indicator while a request runs
fn chat_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for msg in app.session.transcript().messages() {
        message_lines(msg, &mut lines);
    }

    if app.is_busy() {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("{}{}", BUSY_TEXT, dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

/// Rows the transcript occupies once word-wrapped to `width`
pub(crate) fn chat_line_count(app: &App, width: u16) -> usize {
    Paragraph::new(chat_lines(app))
        .wrap(Wrap { trim: true })
        .line_count(width)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, input_area, progress_area, chat_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_input(app, frame, input_area);
    render_progress(app, frame, progress_area);
    render_chat(app, frame, chat_area);
    render_footer(app, frame, footer_area);

    if app.show_reset_confirm {
        render_reset_confirm(frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" RAG", Style::default().fg(Color::White).bold()),
        Span::styled("LAB ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(app.backend_url.clone(), Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let title = if app.is_busy() {
        " Ask (Esc to stop) "
    } else {
        " Ask (Enter to send) "
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let input = app.session.input();

    // Horizontal scrolling to keep the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = input.cursor();
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let paragraph = if input.text().is_empty() {
        Paragraph::new(Span::styled(
            "Type your query...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let visible_text: String = input
            .text()
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Paragraph::new(visible_text).style(Style::default().fg(Color::Cyan))
    };

    frame.render_widget(paragraph.block(input_block), area);

    if editing && !app.show_reset_confirm {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_progress(app: &App, frame: &mut Frame, area: Rect) {
    if !app.is_busy() {
        return;
    }

    // Moving stripe standing in for the progress bar
    let width = area.width as usize;
    let offset = app.animation_frame as usize;
    let stripes: String = (0..width)
        .map(|i| if (i + offset) % 3 == 0 { '━' } else { '─' })
        .collect();
    frame.render_widget(
        Paragraph::new(stripes).style(Style::default().fg(Color::Blue)),
        area,
    );
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);
    app.follow_transcript();

    let chat_focused = app.input_mode == InputMode::Normal;
    let border_color = if chat_focused { Color::Cyan } else { Color::DarkGray };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Conversation ");

    let chat_text = if app.session.transcript().is_empty() && !app.is_busy() {
        Text::from(Span::styled(EMPTY_STATE_TEXT, Style::default().fg(Color::DarkGray)))
    } else {
        Text::from(chat_lines(app))
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " CHAT ",
        InputMode::Editing => " ASK ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = match app.input_mode {
        InputMode::Editing => {
            let mut hints = vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
            ];
            if app.is_busy() {
                hints.extend(vec![
                    Span::styled(" Esc ", key_style),
                    Span::styled(" stop ", label_style),
                ]);
            } else {
                hints.extend(vec![
                    Span::styled(" Esc ", key_style),
                    Span::styled(" scroll ", label_style),
                ]);
            }
            hints.extend(vec![
                Span::styled(" ^R ", key_style),
                Span::styled(" reset ", label_style),
                Span::styled(" ^E ", key_style),
                Span::styled(" export ", label_style),
                Span::styled(" ^C ", key_style),
                Span::styled(" quit ", label_style),
            ]);
            hints
        }
        InputMode::Normal => {
            let mut hints = vec![
                Span::styled(" j/k ", key_style),
                Span::styled(" scroll ", label_style),
                Span::styled(" i ", key_style),
                Span::styled(" ask ", label_style),
            ];
            if app.is_busy() {
                hints.extend(vec![
                    Span::styled(" x ", key_style),
                    Span::styled(" stop ", label_style),
                ]);
            }
            hints.extend(vec![
                Span::styled(" r ", key_style),
                Span::styled(" reset ", label_style),
                Span::styled(" e ", key_style),
                Span::styled(" export ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ]);
            hints
        }
    };

    if let Some(status) = &app.status {
        let status_style = if status.is_error {
            Style::default().bg(Color::Black).fg(Color::Red)
        } else {
            Style::default().bg(Color::Black).fg(Color::Green)
        };
        hints.push(Span::styled(format!("  {}", status.text), status_style));
    }

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_reset_confirm(frame: &mut Frame, area: Rect) {
    let popup_width = 44.min(area.width.saturating_sub(4));
    let popup_height = 5.min(area.height);

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Reset ");

    let body = Text::from(vec![
        Line::from(RESET_PROMPT),
        Line::default(),
        Line::from(vec![
            Span::styled(" y ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" clear   "),
            Span::styled(" n ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" keep "),
        ]),
    ]);

    frame.render_widget(Paragraph::new(body).block(block), popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_app;
    use ratatui::{backend::TestBackend, Terminal};
    use std::path::PathBuf;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn screen_text(app: &mut App) -> String {
        screen_text_sized(app, 80, 20)
    }

    fn screen_text_sized(app: &mut App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|frame| render(app, frame)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_parse_markdown_bold() {
        let line = parse_markdown_line("Use **FastAPI** here");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "FastAPI");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_parse_markdown_unclosed_bold_is_literal() {
        let line = parse_markdown_line("a **b");
        assert_eq!(plain(&line), "a **b");

        let line = parse_markdown_line("**x** and **y");
        assert_eq!(plain(&line), "x and **y");
        assert!(line.spans[0].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_parse_markdown_empty_bold_and_blank_line() {
        assert_eq!(plain(&parse_markdown_line("a ****b")), "a ****b");
        assert!(parse_markdown_line("").spans.is_empty());
    }

    #[tokio::test]
    async fn test_chat_lines_include_sources_and_busy_indicator() {
        let mut app = test_app(PathBuf::from("."));
        app.session.submit("Hi");
        app.session.settle().await;
        app.session.submit("again");

        let lines: Vec<String> = chat_lines(&app).iter().map(plain).collect();
        assert_eq!(
            lines,
            vec![
                "You:",
                "Hi",
                "",
                "AI:",
                "answer to Hi",
                "SOURCES: notes.md",
                "",
                "You:",
                "again",
                "",
                "AI is searching the vector database.",
            ]
        );

        app.stop();
        app.session.settle().await;
    }

    #[tokio::test]
    async fn test_render_follows_to_end_of_wrapped_answer() {
        let mut app = test_app(PathBuf::from("."));
        let query = format!("{} ENDMARK", "abcdefghijklmnop".repeat(40));
        app.session.submit(&query);
        app.session.settle().await;
        app.follow_transcript();

        let text = screen_text_sized(&mut app, 32, 20);
        // Only the answer carries a sources line, and it is the last thing shown
        assert!(text.contains("SOURCES: notes.md"));
        let max_scroll = chat_line_count(&app, app.chat_width) as u16 - app.chat_height;
        assert_eq!(app.chat_scroll, max_scroll);
    }

    #[tokio::test]
    async fn test_render_empty_state() {
        let mut app = test_app(PathBuf::from("."));
        let text = screen_text(&mut app);
        assert!(text.contains("RAGLAB"));
        assert!(text.contains(EMPTY_STATE_TEXT));
        assert!(text.contains("Type your query..."));
    }

    #[tokio::test]
    async fn test_render_reset_modal() {
        let mut app = test_app(PathBuf::from("."));
        app.request_reset();
        let text = screen_text(&mut app);
        assert!(text.contains(RESET_PROMPT));
    }
}
