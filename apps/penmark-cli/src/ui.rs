use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use penmark_controller::{ControllerSnapshot, UploadPhase};
use penmark_types::events::{EventPayload, SystemEvent, UploadEvent};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};
use tokio::sync::mpsc::UnboundedSender;

const MAX_LOG_ENTRIES: usize = 120;

pub enum UiMessage {
    State(ControllerSnapshot),
    Event(SystemEvent),
    Notice(String),
    Shutdown,
}

pub enum UiCommand {
    Select(PathBuf),
    Submit,
    Download,
    Quit,
}

#[derive(Default)]
struct View {
    snapshot: Option<ControllerSnapshot>,
    logs: VecDeque<String>,
    notice: Option<String>,
    /// Path being typed while in file-selection mode.
    input: Option<String>,
}

impl View {
    fn is_loading(&self) -> bool {
        self.snapshot.as_ref().map(|s| s.is_loading).unwrap_or(false)
    }

    fn push_log(&mut self, entry: String) {
        if self.logs.len() == MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }
}

pub fn run(
    receiver: Receiver<UiMessage>,
    commands: UnboundedSender<UiCommand>,
    summary: String,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, &commands, summary.as_str());
    let _ = commands.send(UiCommand::Quit);

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    commands: &UnboundedSender<UiCommand>,
    summary: &str,
) -> Result<()> {
    let mut view = View::default();

    loop {
        let mut should_close = false;
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::State(snapshot)) => view.snapshot = Some(snapshot),
                Ok(UiMessage::Event(event)) => view.push_log(format_event(&event)),
                Ok(UiMessage::Notice(notice)) => view.notice = Some(notice),
                Ok(UiMessage::Shutdown) => should_close = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    should_close = true;
                    break;
                }
            }
        }
        if should_close {
            break;
        }

        terminal.draw(|f| draw(f, &view, summary))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let CEvent::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if let Some(input) = view.input.as_mut() {
            match key.code {
                KeyCode::Char(c) => input.push(c),
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Enter => {
                    let path = input.trim().to_string();
                    view.input = None;
                    if !path.is_empty() {
                        let _ = commands.send(UiCommand::Select(PathBuf::from(path)));
                    }
                }
                KeyCode::Esc => view.input = None,
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Char('o') => {
                view.notice = None;
                view.input = Some(String::new());
            }
            KeyCode::Char('u') => {
                // Mirrors the disabled upload button; the controller still
                // refuses overlapping submits on its own.
                if !view.is_loading() {
                    view.notice = None;
                    let _ = commands.send(UiCommand::Submit);
                }
            }
            KeyCode::Char('d') => {
                let _ = commands.send(UiCommand::Download);
            }
            _ => {}
        }
    }

    Ok(())
}

fn draw(f: &mut Frame, view: &View, summary: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(8),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(f.size());
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(rows[1]);

    let phase = view
        .snapshot
        .as_ref()
        .map(|s| s.phase)
        .unwrap_or(UploadPhase::Idle);
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "Penmark",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(phase_label(phase), phase_style(phase)),
        Span::raw("  "),
        Span::styled("target:", Style::default().fg(Color::Magenta)),
        Span::raw(" "),
        Span::raw(summary),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Upload a Document"));
    f.render_widget(header, rows[0]);

    let details = Paragraph::new(detail_lines(view))
        .block(Block::default().borders(Borders::ALL).title("Document"));
    f.render_widget(details, body[0]);

    let preview = Paragraph::new(preview_lines(view.snapshot.as_ref()))
        .block(Block::default().borders(Borders::ALL).title("Preview"));
    f.render_widget(preview, body[1]);

    let items: Vec<ListItem> = view
        .logs
        .iter()
        .rev()
        .map(|entry| ListItem::new(entry.clone()))
        .collect();
    let list =
        List::new(items).block(Block::default().borders(Borders::ALL).title("Recent events"));
    f.render_widget(list, rows[2]);

    let help = if view.input.is_some() {
        "Enter confirm  Esc cancel"
    } else if view.is_loading() {
        "Uploading...  d download  q quit"
    } else {
        "o open file  u upload  d download  q quit"
    };
    let footer = Paragraph::new(Line::from(Span::styled(
        help,
        Style::default().fg(Color::Yellow),
    )))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, rows[3]);
}

fn detail_lines(view: &View) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    if let Some(snapshot) = &view.snapshot {
        let file = match (&snapshot.selected, snapshot.selected_size) {
            (Some(name), Some(size)) => format!("{name} ({size} bytes)"),
            (Some(name), None) => name.clone(),
            _ => "none".to_string(),
        };
        lines.push(Line::from(format!("File:   {file}")));
        if let Some(output) = &snapshot.output_name {
            lines.push(Line::from(format!("Output: {output}")));
        }
        if !snapshot.error_message.is_empty() {
            lines.push(Line::from(Span::styled(
                snapshot.error_message.clone(),
                Style::default().fg(Color::Red),
            )));
        }
    }
    if let Some(notice) = &view.notice {
        lines.push(Line::from(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Yellow),
        )));
    }
    if let Some(input) = &view.input {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("Path: ", Style::default().fg(Color::Magenta)),
            Span::raw(format!("{input}_")),
        ]));
    }
    lines
}

fn preview_lines(snapshot: Option<&ControllerSnapshot>) -> Vec<Line<'static>> {
    let Some(snapshot) = snapshot else {
        return vec![Line::from("No image yet")];
    };
    if snapshot.is_loading {
        return vec![Line::from("Uploading...")];
    }
    let Some(result) = &snapshot.result else {
        return vec![Line::from("No image yet")];
    };
    match &result.preview {
        Some(preview) => {
            let mut lines: Vec<Line<'static>> = preview
                .thumbnail
                .to_ascii_rows()
                .into_iter()
                .map(Line::from)
                .collect();
            lines.push(Line::from(format!(
                "{}x{} {:?}, {} bytes",
                preview.width, preview.height, preview.format, result.bytes
            )));
            lines
        }
        None => vec![Line::from(format!(
            "{} bytes received (no preview available)",
            result.bytes
        ))],
    }
}

fn phase_label(phase: UploadPhase) -> &'static str {
    match phase {
        UploadPhase::Idle => "Ready",
        UploadPhase::Submitting => "Uploading...",
        UploadPhase::Succeeded => "Image ready",
        UploadPhase::Failed => "Failed",
    }
}

fn phase_style(phase: UploadPhase) -> Style {
    match phase {
        UploadPhase::Idle => Style::default(),
        UploadPhase::Submitting => Style::default().fg(Color::Yellow),
        UploadPhase::Succeeded => Style::default().fg(Color::Green),
        UploadPhase::Failed => Style::default().fg(Color::Red),
    }
}

fn format_event(event: &SystemEvent) -> String {
    let timestamp = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => format!(
            "[{}] Lifecycle::{:?} {}",
            timestamp,
            lifecycle.phase,
            lifecycle.details.clone().unwrap_or_default()
        ),
        EventPayload::Upload(upload) => match upload {
            UploadEvent::FileSelected { name, size } => {
                format!("[{}] Selected {} ({} bytes)", timestamp, name, size)
            }
            UploadEvent::Started {
                attempt,
                file,
                output,
            } => format!(
                "[{}] Attempt {} uploading {} -> {}",
                timestamp, attempt, file, output
            ),
            UploadEvent::Succeeded { attempt, bytes } => {
                format!("[{}] Attempt {} received {} bytes", timestamp, attempt, bytes)
            }
            UploadEvent::Failed {
                attempt,
                kind,
                detail,
            } => match attempt {
                Some(attempt) => format!(
                    "[{}] Attempt {} failed: {} ({})",
                    timestamp, attempt, kind, detail
                ),
                None => format!("[{}] Submit failed: {} ({})", timestamp, kind, detail),
            },
            UploadEvent::Rejected { kind } => format!("[{}] Submit refused: {}", timestamp, kind),
        },
        EventPayload::Download(download) => format!(
            "[{}] Saved {} ({} bytes) to {}",
            timestamp, download.filename, download.bytes, download.path
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penmark_types::upload::UploadErrorKind;

    fn snapshot(phase: UploadPhase) -> ControllerSnapshot {
        ControllerSnapshot {
            phase,
            selected: Some("report.pdf".into()),
            selected_size: Some(42),
            is_loading: phase == UploadPhase::Submitting,
            error_message: String::new(),
            output_name: Some("report_handwritten.png".into()),
            result: None,
            attempts: 1,
        }
    }

    #[test]
    fn formats_upload_events() {
        let started = SystemEvent::upload(UploadEvent::Started {
            attempt: 2,
            file: "report.pdf".into(),
            output: "report_handwritten.png".into(),
        });
        assert!(format_event(&started)
            .ends_with("Attempt 2 uploading report.pdf -> report_handwritten.png"));

        let refused = SystemEvent::upload(UploadEvent::Rejected {
            kind: UploadErrorKind::AlreadyInFlight,
        });
        assert!(format_event(&refused).ends_with("Submit refused: upload already in flight"));
    }

    #[test]
    fn preview_reports_loading_and_empty_states() {
        let loading = snapshot(UploadPhase::Submitting);
        assert_eq!(preview_lines(Some(&loading)), vec![Line::from("Uploading...")]);

        let idle = snapshot(UploadPhase::Idle);
        assert_eq!(preview_lines(Some(&idle)), vec![Line::from("No image yet")]);
    }

    #[test]
    fn details_show_error_and_input() {
        let mut failed = snapshot(UploadPhase::Failed);
        failed.error_message = "Failed to upload file. Please try again.".into();
        let view = View {
            snapshot: Some(failed),
            input: Some("docs/a.txt".into()),
            ..View::default()
        };
        let text: Vec<String> = detail_lines(&view)
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();
        assert!(text.iter().any(|l| l.contains("Failed to upload file")));
        assert!(text.iter().any(|l| l == "Path: docs/a.txt_"));
    }
}
