//! Full-screen dashboard for the installer view
//!
//! `run_dashboard` takes over the screen with a centered ratatui dashboard.
//! The line-oriented mode lives in `plain`.

use crate::channel::{ProgressChannel, Subscription, PROGRESS_EVENT};
use crate::view::{InstallerView, Phase, COMPLETION_MARKER, SEED_MESSAGE};
use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use futures_util::StreamExt;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Padding, Paragraph},
    Frame, Terminal,
};
use std::io::stdout;
use std::time::Duration;
use tracing::warn;

/// Fixed width for the dashboard (characters)
const DASHBOARD_WIDTH: u16 = 72;

/// Redraw cadence, also drives the spinner
pub(crate) const TICK: Duration = Duration::from_millis(100);

pub(crate) const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Everything the dashboard draws
#[derive(Debug)]
pub struct UiState {
    pub view: InstallerView,
    pub endpoint: String,
    pub spinner_idx: usize,
    /// Last local error, shown in the status line
    pub notice: Option<String>,
    pub connection_lost: bool,
}

impl UiState {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            view: InstallerView::new(),
            endpoint: endpoint.into(),
            spinner_idx: 0,
            notice: None,
            connection_lost: false,
        }
    }

    /// The install button is disabled while installing or with no name
    pub fn can_install(&self) -> bool {
        !self.view.is_installing() && !self.view.model_name().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Continue,
    Quit,
}

/// Apply one key press to the dashboard state
pub fn handle_key(state: &mut UiState, key: KeyEvent, channel: &dyn ProgressChannel) -> KeyOutcome {
    match (key.modifiers, key.code) {
        (_, KeyCode::Esc) | (KeyModifiers::CONTROL, KeyCode::Char('c') | KeyCode::Char('C')) => {
            return KeyOutcome::Quit;
        }
        (KeyModifiers::CONTROL, KeyCode::Char('u')) => state.view.clear_input(),
        (_, KeyCode::Enter) => {
            if !state.view.is_installing() {
                state.notice = None;
                if let Err(e) = state.view.start_install(channel) {
                    warn!(error = %e, "install request was not sent");
                    state.notice = Some(format!("Request not sent: {}", e));
                }
            }
        }
        (_, KeyCode::Backspace) => state.view.pop_char(),
        (m, KeyCode::Char(c)) if !m.contains(KeyModifiers::CONTROL) => state.view.push_char(c),
        _ => {}
    }
    KeyOutcome::Continue
}

/// Full-screen dashboard (alternate screen)
pub async fn run_dashboard(channel: &dyn ProgressChannel, endpoint: &str) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut state = UiState::new(endpoint);

    // One handler for the lifetime of the dashboard
    let mut progress = channel.subscribe(PROGRESS_EVENT);
    let result = run_event_loop(&mut terminal, &mut state, &mut progress, channel).await;
    drop(progress);

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    state: &mut UiState,
    progress: &mut Subscription,
    channel: &dyn ProgressChannel,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(TICK);

    loop {
        terminal.draw(|frame| draw(frame, state))?;

        tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if handle_key(state, key, channel) == KeyOutcome::Quit {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            line = progress.recv(), if !state.connection_lost => match line {
                Some(line) => state.view.on_progress_message(line),
                None => {
                    warn!("progress subscription ended");
                    state.connection_lost = true;
                }
            },
            _ = tick.tick() => {
                state.spinner_idx = state.spinner_idx.wrapping_add(1);
            }
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

pub fn draw(frame: &mut Frame, state: &UiState) {
    let area = frame.area();
    let dashboard_area = centered_rect(DASHBOARD_WIDTH, area.height, area);

    let chunks = Layout::vertical([
        Constraint::Length(3), // Header
        Constraint::Length(3), // Input
        Constraint::Length(1), // Button
        Constraint::Min(3),    // Progress
        Constraint::Length(2), // Status
    ])
    .split(dashboard_area);

    render_header(frame, chunks[0]);
    render_input(frame, chunks[1], state);
    render_button(frame, chunks[2], state);
    render_progress(frame, chunks[3], state);
    render_status(frame, chunks[4], state);
}

fn render_header(frame: &mut Frame, area: Rect) {
    let title = "AI MODEL INSTALLER";
    let version = format!("v{}", env!("CARGO_PKG_VERSION"));
    let gap = (area.width as usize).saturating_sub(title.len() + version.len() + 6);

    let header = Paragraph::new(Line::from(vec![
        Span::raw("  "),
        Span::styled(title, Style::default().bold()),
        Span::raw(" ".repeat(gap)),
        Span::styled(version, Style::default().fg(Color::DarkGray)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    frame.render_widget(header, area);
}

fn render_input(frame: &mut Frame, area: Rect, state: &UiState) {
    let disabled = state.view.is_installing();
    let name = state.view.model_name();

    let text = if name.is_empty() {
        Span::styled("Enter model name", Style::default().fg(Color::DarkGray).italic())
    } else if disabled {
        Span::styled(name, Style::default().fg(Color::DarkGray))
    } else {
        Span::styled(name, Style::default().fg(Color::White))
    };

    let border = if disabled { Color::DarkGray } else { Color::Cyan };
    let input = Paragraph::new(Line::from(text)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(" Model ")
            .padding(Padding::horizontal(1)),
    );
    frame.render_widget(input, area);

    if !disabled {
        // Display width of the name, plus border and padding
        let offset = Span::raw(name).width().saturating_add(2);
        let offset = u16::try_from(offset).unwrap_or(u16::MAX);
        let x = area
            .x
            .saturating_add(offset)
            .min(area.right().saturating_sub(2));
        frame.set_cursor_position((x, area.y + 1));
    }
}

fn render_button(frame: &mut Frame, area: Rect, state: &UiState) {
    let style = if state.can_install() {
        Style::default().fg(Color::Black).bg(Color::Cyan).bold()
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let button = Line::from(vec![
        Span::raw("  "),
        Span::styled(" Install ", style),
        Span::styled("  enter", Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(button), area);
}

fn render_progress(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Installation Progress ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = state.view.progress();
    // Keep the newest lines in view
    let skip = lines.len().saturating_sub(inner.height as usize);

    let items: Vec<ListItem> = lines
        .iter()
        .skip(skip)
        .enumerate()
        .map(|(idx, line)| {
            let style = if line.contains(COMPLETION_MARKER) {
                Style::default().fg(Color::Green)
            } else if idx + skip == 0 && line == SEED_MESSAGE {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(Line::from(vec![Span::raw(" "), Span::styled(line.as_str(), style)]))
        })
        .collect();

    frame.render_widget(List::new(items), inner);
}

fn render_status(frame: &mut Frame, area: Rect, state: &UiState) {
    let phase = match state.view.phase() {
        Phase::Installing => {
            let spinner = SPINNER[state.spinner_idx % SPINNER.len()];
            Span::styled(format!("{} Installing", spinner), Style::default().fg(Color::Yellow))
        }
        Phase::Idle if state.view.progress().is_empty() => {
            Span::styled("Idle", Style::default().fg(Color::DarkGray))
        }
        Phase::Idle => Span::styled("✓ Done", Style::default().fg(Color::Green)),
    };

    let connection = if state.connection_lost {
        Span::styled("disconnected", Style::default().fg(Color::Red))
    } else {
        Span::styled(state.endpoint.as_str(), Style::default().fg(Color::DarkGray))
    };

    let mut lines = vec![Line::from(vec![
        Span::raw("  "),
        phase,
        Span::styled("  │  ", Style::default().fg(Color::DarkGray)),
        connection,
        Span::styled("  │  esc quit", Style::default().fg(Color::DarkGray)),
    ])];
    if let Some(ref notice) = state.notice {
        lines.push(Line::from(Span::styled(
            format!("  {}", notice),
            Style::default().fg(Color::Red),
        )));
    }

    frame.render_widget(Paragraph::new(lines), area);
}

/// Center a rect horizontally within another rect
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}
