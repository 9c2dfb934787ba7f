use crate::console::command::{parse_command, ConsoleCommand};
use crate::console::input::LineEdit;
use crate::console::ui::{report_area, Screen};
use crate::dashboard::{Completion, DashboardCore, PendingTask};
use crate::db::{Database, RecordStore};
use crate::errors::AppResult;
use crate::gateway::TextGenerator;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::{Position, Rect};
use std::sync::Arc;
use tokio::task::JoinError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Console session: the dashboard core plus what only the terminal needs.
///
/// At most one background operation is tracked; the core's admission rule
/// rejects a second one with `BUSY` before anything is spawned.
pub struct ConsoleApp<S, G> {
    core: DashboardCore<S, G>,
    settings: Arc<Database>,
    input: LineEdit,
    notice: Option<String>,
    show_help: bool,
    report_scroll: u16,
    viewport: Rect,
    pending: Option<PendingTask>,
}

impl<S, G> ConsoleApp<S, G>
where
    S: RecordStore + 'static,
    G: TextGenerator + 'static,
{
    pub fn new(core: DashboardCore<S, G>, settings: Arc<Database>) -> Self {
        Self {
            core,
            settings,
            input: LineEdit::default(),
            notice: None,
            show_help: false,
            report_scroll: 0,
            viewport: Rect::default(),
            pending: None,
        }
    }

    pub fn core(&self) -> &DashboardCore<S, G> {
        &self.core
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn screen(&self) -> Screen<'_> {
        Screen {
            state: self.core.state(),
            input: &self.input,
            notice: self.notice.as_deref(),
            show_help: self.show_help,
            report_scroll: self.report_scroll,
        }
    }

    pub fn set_viewport(&mut self, area: Rect) {
        self.viewport = area;
    }

    /// Kicks off the initial load.
    pub fn start(&mut self) {
        let started = self.core.start_load();
        self.track(started);
    }

    fn track(&mut self, started: AppResult<PendingTask>) {
        match started {
            Ok(task) => self.pending = Some(task),
            Err(error) => tracing::debug!(code = error.code(), "operation not admitted"),
        }
    }

    fn dismiss_report(&mut self) {
        self.core.dismiss_report();
        self.report_scroll = 0;
    }

    pub fn handle(&mut self, command: ConsoleCommand) -> Flow {
        self.notice = None;
        match command {
            ConsoleCommand::Quit => return Flow::Quit,
            ConsoleCommand::Blank => {
                if self.core.state().report.is_some() {
                    self.dismiss_report();
                }
            }
            ConsoleCommand::Close => self.dismiss_report(),
            ConsoleCommand::Help => self.show_help = !self.show_help,
            ConsoleCommand::Refresh => {
                let started = self.core.start_load();
                self.track(started);
            }
            ConsoleCommand::Add(fields) => {
                for (field, value) in fields {
                    self.core.set_form_field(field, value);
                }
                let started = self.core.start_submit();
                self.track(started);
            }
            ConsoleCommand::Forecast => {
                let started = self.core.start_forecast();
                self.track(started);
            }
            ConsoleCommand::Report => {
                let started = self.core.start_report();
                self.track(started);
            }
            ConsoleCommand::Settings => {
                self.notice = Some(match self.settings.get_settings() {
                    Ok(settings) => format!(
                        "geminiPath={} geminiLaunchArgs={:?} model={} redactAggressive={}",
                        settings.gemini_path, settings.gemini_launch_args, settings.model, settings.redact_aggressive
                    ),
                    Err(error) => error.user_message().to_string(),
                });
            }
            ConsoleCommand::Set(update) => {
                self.notice = Some(match self.settings.update_settings(update) {
                    Ok(settings) => {
                        self.core.apply_settings(&settings);
                        tracing::info!(model = %settings.model, program = %settings.gemini_path, "settings updated");
                        "Settings saved.".to_string()
                    }
                    Err(error) => error.user_message().to_string(),
                });
            }
        }
        Flow::Continue
    }

    pub fn handle_event(&mut self, event: Event) -> Flow {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Mouse(mouse) => {
                self.handle_mouse(mouse);
                Flow::Continue
            }
            _ => Flow::Continue,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.kind != KeyEventKind::Press {
            return Flow::Continue;
        }
        let report_open = self.core.state().report.is_some();
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Flow::Quit,
            KeyCode::Esc if report_open => self.dismiss_report(),
            KeyCode::Esc if self.show_help => self.show_help = false,
            KeyCode::Esc => self.input.clear(),
            KeyCode::Enter => {
                let line = self.input.take();
                match parse_command(&line) {
                    Ok(command) => return self.handle(command),
                    Err(message) => self.notice = Some(message),
                }
            }
            KeyCode::Up if report_open => self.report_scroll = self.report_scroll.saturating_sub(1),
            KeyCode::Down if report_open => self.report_scroll = self.report_scroll.saturating_add(1),
            KeyCode::PageUp if report_open => self.report_scroll = self.report_scroll.saturating_sub(10),
            KeyCode::PageDown if report_open => self.report_scroll = self.report_scroll.saturating_add(10),
            KeyCode::Backspace => self.input.backspace(),
            KeyCode::Delete => self.input.delete(),
            KeyCode::Left => self.input.left(),
            KeyCode::Right => self.input.right(),
            KeyCode::Home => self.input.home(),
            KeyCode::End => self.input.end(),
            KeyCode::Char(ch) => self.input.push(ch),
            _ => {}
        }
        Flow::Continue
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        if !matches!(mouse.kind, MouseEventKind::Down(_)) || self.core.state().report.is_none() {
            return;
        }
        if !report_area(self.viewport).contains(Position::new(mouse.column, mouse.row)) {
            self.dismiss_report();
        }
    }

    /// Resolves when the tracked operation finishes; never resolves when idle.
    pub async fn next_completion(&mut self) -> Result<Completion, JoinError> {
        match self.pending.as_mut() {
            Some(task) => task.await,
            None => std::future::pending().await,
        }
    }

    pub fn on_completion(&mut self, finished: Result<Completion, JoinError>) {
        self.pending = None;
        let outcome = match finished {
            Ok(completion) => self.core.complete(completion),
            Err(error) => self.core.abandon(error),
        };
        if let Err(error) = outcome {
            tracing::debug!(code = error.code(), "operation finished with an error");
        }
    }

    /// Waits for the tracked operation, if any, and applies it.
    pub async fn settle(&mut self) {
        if self.pending.is_some() {
            let finished = self.next_completion().await;
            self.on_completion(finished);
        }
    }
}
