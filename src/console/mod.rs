//! Terminal front end (ratatui + crossterm).
//! - Draws the dashboard from the single state struct
//! - Multiplexes terminal events with the in-flight operation

use crate::db::RecordStore;
use crate::errors::AppResult;
use crate::gateway::TextGenerator;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture, EventStream};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::Stdout;

pub mod app;
pub mod command;
pub mod input;
pub mod ui;

pub use app::{ConsoleApp, Flow};

type Term = Terminal<CrosstermBackend<Stdout>>;

pub async fn run<S, G>(mut app: ConsoleApp<S, G>) -> AppResult<()>
where
    S: RecordStore + 'static,
    G: TextGenerator + 'static,
{
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let outcome = event_loop(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    outcome
}

async fn event_loop<S, G>(terminal: &mut Term, app: &mut ConsoleApp<S, G>) -> AppResult<()>
where
    S: RecordStore + 'static,
    G: TextGenerator + 'static,
{
    let mut events = EventStream::new();
    app.start();

    loop {
        let screen = app.screen();
        let mut viewport = None;
        terminal.draw(|f| {
            viewport = Some(f.area());
            ui::draw(f, &screen);
        })?;
        if let Some(area) = viewport {
            app.set_viewport(area);
        }

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => {
                    if app.handle_event(event) == Flow::Quit {
                        tracing::info!("console closed");
                        return Ok(());
                    }
                }
                Some(Err(error)) => return Err(error.into()),
                None => return Ok(()),
            },
            finished = app.next_completion() => app.on_completion(finished),
        }
    }
}
