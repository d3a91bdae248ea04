//! Interactive terminal detail view.
//!
//! Redraws whenever the session publishes a new model or a key is pressed.
//! There is no polling; updates arrive through the progress subscription.

mod app;
mod input;
mod ui;

use std::io::{self, stdout};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::{
    event::EventStream,
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio_stream::StreamExt;

use crate::backend::JobBackend;
use crate::detail::{DetailSession, SessionOptions};

pub use app::{Action, Tab, TuiApp};

/// Run the detail view for `job_id` until the user quits.
pub async fn run(
    jobs: Arc<dyn JobBackend>,
    job_id: String,
    options: SessionOptions,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let session = DetailSession::open(jobs, job_id, options);
    let mut app = TuiApp::new(session);
    let result = run_app(&mut terminal, &mut app).await;
    app.close().await;

    // Restore terminal
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut TuiApp,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut models = app.session().watch();

    while app.running {
        terminal.draw(|frame| ui::render(frame, &app.model, app.tab, app.scroll))?;

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => {
                    if let Some(action) = input::handle_event(event, app.modal_open()) {
                        app.handle_action(action).await?;
                    }
                }
                Some(Err(e)) => return Err(e).context("Failed to read terminal input"),
                None => break,
            },
            changed = models.changed() => {
                if changed.is_err() {
                    break;
                }
                app.model = models.borrow_and_update().clone();
            }
        }
    }

    Ok(())
}
