//! Full-screen chat interface and the event loop that drives it.
//!
//! The loop exclusively owns the session state. Worker tasks report
//! terminal events over an unbounded channel which is drained once per
//! iteration; everything else is keyboard, mouse, and redraw handling.

use ratatui::crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::{error::Error, io, sync::Arc, time::Duration};

use crate::api::LlmClient;
use crate::core::config::Config;
use crate::core::router::{route, RouteAction};
use crate::core::session::{
    Entry, EntryKind, RequestContext, RequestService, SessionState,
};
use crate::providers::ProviderRegistry;

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Chat-area layout: one line of title above the transcript, three for
/// the bordered input area below it.
const INPUT_HEIGHT: u16 = 3;
const TITLE_HEIGHT: u16 = 1;

struct ChatUi {
    session: SessionState,
    input: String,
    scroll_offset: u16,
    auto_scroll: bool,
    spinner_frame: usize,
}

impl ChatUi {
    fn new() -> Self {
        ChatUi {
            session: SessionState::new(),
            input: String::new(),
            scroll_offset: 0,
            auto_scroll: true,
            spinner_frame: 0,
        }
    }

    fn max_scroll_offset(&self, available_height: u16) -> u16 {
        let total_lines = build_display_lines(self.session.entries()).len() as u16;
        total_lines.saturating_sub(available_height)
    }
}

/// Run the interactive session until the user exits.
pub async fn run_chat(config: Config, registry: Arc<ProviderRegistry>) -> Result<(), Box<dyn Error>> {
    let ctx = RequestContext {
        registry,
        llm: Arc::new(LlmClient::new(&config)),
        http: reqwest::Client::new(),
    };
    let (service, mut rx) = RequestService::new();
    let mut ui = ChatUi::new();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = loop {
        terminal.draw(|f| draw(f, &ui))?;

        if event::poll(POLL_INTERVAL)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    let terminal_height = terminal.size().map(|size| size.height).unwrap_or(0);
                    let available_height = terminal_height
                        .saturating_sub(INPUT_HEIGHT)
                        .saturating_sub(TITLE_HEIGHT);

                    match key.code {
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            break Ok(());
                        }
                        KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            ui.session.clear();
                            ui.scroll_offset = 0;
                            ui.auto_scroll = true;
                        }
                        KeyCode::Enter => {
                            let input = ui.input.trim().to_string();
                            if input.is_empty() {
                                continue;
                            }
                            if matches!(route(&input), RouteAction::Exit) {
                                break Ok(());
                            }
                            // ignored while a request is outstanding; the
                            // typed text stays in the input field
                            if ui.session.begin_request(&input) {
                                ui.input.clear();
                                ui.auto_scroll = true;
                                service.spawn_request(ctx.clone(), input);
                            }
                        }
                        KeyCode::Char(c) => {
                            ui.input.push(c);
                        }
                        KeyCode::Backspace => {
                            ui.input.pop();
                        }
                        KeyCode::Up => {
                            ui.auto_scroll = false;
                            ui.scroll_offset = ui.scroll_offset.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            let max_scroll = ui.max_scroll_offset(available_height);
                            ui.scroll_offset = ui.scroll_offset.saturating_add(1).min(max_scroll);
                            if ui.scroll_offset >= max_scroll {
                                ui.auto_scroll = true;
                            }
                        }
                        _ => {}
                    }
                }
                Event::Mouse(mouse) => {
                    let terminal_height = terminal.size().map(|size| size.height).unwrap_or(0);
                    let available_height = terminal_height
                        .saturating_sub(INPUT_HEIGHT)
                        .saturating_sub(TITLE_HEIGHT);

                    match mouse.kind {
                        MouseEventKind::ScrollUp => {
                            ui.auto_scroll = false;
                            ui.scroll_offset = ui.scroll_offset.saturating_sub(3);
                        }
                        MouseEventKind::ScrollDown => {
                            let max_scroll = ui.max_scroll_offset(available_height);
                            ui.scroll_offset = ui.scroll_offset.saturating_add(3).min(max_scroll);
                            if ui.scroll_offset >= max_scroll {
                                ui.auto_scroll = true;
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        // fold completed requests back into the transcript
        while let Ok(event) = rx.try_recv() {
            ui.session.apply_event(event);
            ui.auto_scroll = true;
        }

        if ui.session.is_loading() {
            ui.spinner_frame = (ui.spinner_frame + 1) % SPINNER_FRAMES.len();
        }
    };

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn draw(f: &mut Frame, ui: &ChatUi) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(INPUT_HEIGHT)])
        .split(f.area());

    let lines = build_display_lines(ui.session.entries());

    let available_height = chunks[0].height.saturating_sub(TITLE_HEIGHT);
    let total_lines = lines.len() as u16;
    let max_offset = total_lines.saturating_sub(available_height);
    let scroll_offset = if ui.auto_scroll {
        max_offset
    } else {
        ui.scroll_offset.min(max_offset)
    };

    let transcript = Paragraph::new(lines)
        .block(Block::default().title("Valet"))
        .wrap(Wrap { trim: true })
        .scroll((scroll_offset, 0));
    f.render_widget(transcript, chunks[0]);

    let (input_text, input_style, input_title) = if ui.session.is_loading() {
        (
            format!("{} Processing...", SPINNER_FRAMES[ui.spinner_frame]),
            Style::default().fg(Color::Magenta),
            "Waiting for the current request".to_string(),
        )
    } else {
        (
            ui.input.clone(),
            Style::default().fg(Color::Yellow),
            "Type your request (Enter to send, Ctrl+C to quit, Ctrl+L to clear)".to_string(),
        )
    };

    let input = Paragraph::new(input_text)
        .style(input_style)
        .block(Block::default().borders(Borders::ALL).title(input_title))
        .wrap(Wrap { trim: true });
    f.render_widget(input, chunks[1]);

    if !ui.session.is_loading() {
        f.set_cursor_position((chunks[1].x + ui.input.len() as u16 + 1, chunks[1].y + 1));
    }
}

fn build_display_lines<'a>(entries: impl Iterator<Item = &'a Entry>) -> Vec<Line<'a>> {
    let mut lines = Vec::new();
    for entry in entries {
        let style = match entry.kind {
            EntryKind::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            EntryKind::System => Style::default().fg(Color::DarkGray),
            EntryKind::Assistant => Style::default().fg(Color::White),
            EntryKind::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        };
        for content_line in entry.content.lines() {
            if content_line.trim().is_empty() {
                lines.push(Line::from(""));
            } else {
                lines.push(Line::from(Span::styled(content_line, style)));
            }
        }
        lines.push(Line::from(""));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lines_space_entries_and_split_multiline_content() {
        let mut session = SessionState::new();
        session.begin_request("hello");
        session.apply_event(crate::core::session::SessionEvent::Response(
            "line one\nline two".to_string(),
        ));

        let entries: Vec<Entry> = session.entries().cloned().collect();
        let lines = build_display_lines(entries.iter());

        let rendered: Vec<String> =
            lines.iter().map(|line| line.to_string()).collect();
        assert!(rendered.contains(&"> hello".to_string()));
        assert!(rendered.contains(&"line one".to_string()));
        assert!(rendered.contains(&"line two".to_string()));
        // each entry is followed by a blank spacing line
        assert_eq!(rendered.last().map(String::as_str), Some(""));
    }

    #[test]
    fn max_scroll_is_zero_when_content_fits() {
        let ui = ChatUi::new();
        assert_eq!(ui.max_scroll_offset(u16::MAX), 0);
    }
}
