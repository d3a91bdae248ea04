//! TUI application state and logic.

use crate::detail::{DetailModel, DetailSession, SessionClosed, ViewCommand};

/// Tab shown below the general configuration box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Details,
    Images,
    Options,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::Details, Tab::Images, Tab::Options];

    pub fn index(&self) -> usize {
        match self {
            Tab::Details => 0,
            Tab::Images => 1,
            Tab::Options => 2,
        }
    }

    fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Actions that can be triggered by user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Up,
    Down,
    NextTab,
    PrevTab,
    Refresh,
    Stop,
    Confirm,
    Dismiss,
}

/// Main TUI application state.
///
/// Job state lives in the [`DetailSession`]; this only keeps the latest
/// published model plus purely local presentation state.
pub struct TuiApp {
    session: DetailSession,
    pub model: DetailModel,
    pub tab: Tab,
    pub scroll: u16,
    pub running: bool,
}

impl TuiApp {
    pub fn new(session: DetailSession) -> Self {
        let model = session.current();
        Self {
            session,
            model,
            tab: Tab::default(),
            scroll: 0,
            running: true,
        }
    }

    pub fn session(&self) -> &DetailSession {
        &self.session
    }

    pub fn modal_open(&self) -> bool {
        self.model.cancel_phase.modal_open()
    }

    /// Handle an action and update state accordingly.
    pub async fn handle_action(&mut self, action: Action) -> Result<(), SessionClosed> {
        match action {
            Action::Quit => self.running = false,
            Action::Up => self.scroll = self.scroll.saturating_sub(1),
            Action::Down => self.scroll = self.scroll.saturating_add(1),
            Action::NextTab => {
                self.tab = self.tab.next();
                self.scroll = 0;
            }
            Action::PrevTab => {
                self.tab = self.tab.prev();
                self.scroll = 0;
            }
            Action::Refresh => self.session.send(ViewCommand::Refresh).await?,
            Action::Stop => self.session.send(ViewCommand::RequestCancel).await?,
            Action::Confirm => self.session.send(ViewCommand::ConfirmCancel).await?,
            Action::Dismiss => self.session.send(ViewCommand::DismissCancel).await?,
        }
        Ok(())
    }

    /// Tear down the view and its subscription.
    pub async fn close(self) {
        self.session.close().await;
    }
}
