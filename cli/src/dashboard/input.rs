//! Keyboard decoding: crossterm key events into logical actions.
//!
//! Mapping depends on the current state: an open modal accepts only Escape
//! and its own toggle key, search mode captures free text, and everything
//! else is the browsing key surface. Ctrl+C never reaches this table; the
//! event loop intercepts it before dispatch.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use portdeck_core::SortKey;

use super::state::{Action, DashboardState, Modal};

/// Map one key event to an action, or None when the key is not bound in
/// the current state.
pub fn map_key(state: &DashboardState, key: KeyEvent) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    match &state.modal {
        Modal::Command => {
            return match key.code {
                KeyCode::Esc => Some(Action::CloseModal),
                KeyCode::Enter => Some(Action::CommandSubmit),
                KeyCode::Backspace => Some(Action::CommandBackspace),
                KeyCode::Char(c) => Some(Action::CommandInput(c)),
                _ => None,
            };
        }
        Modal::Confirm { .. } => {
            // Only an explicit yes proceeds; any other key cancels.
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(Action::ConfirmKill),
                _ => Some(Action::CancelConfirm),
            };
        }
        Modal::Help => {
            return match key.code {
                KeyCode::Esc | KeyCode::Char('?') => Some(Action::ToggleHelp),
                _ => None,
            };
        }
        Modal::Logs => {
            return match key.code {
                KeyCode::Esc | KeyCode::Char('l') => Some(Action::ToggleLogs),
                _ => None,
            };
        }
        Modal::Stats => {
            return match key.code {
                KeyCode::Esc | KeyCode::Char('s') => Some(Action::ToggleStats),
                _ => None,
            };
        }
        Modal::None => {}
    }

    if state.searching {
        return match key.code {
            KeyCode::Esc => Some(Action::SearchCancel),
            KeyCode::Enter => Some(Action::SearchCommit),
            KeyCode::Backspace => Some(Action::SearchBackspace),
            // Wildcard capture: any printable character lands in the
            // search buffer.
            KeyCode::Char(c) => Some(Action::SearchInput(c)),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Up => Some(Action::MoveSelection(-1)),
        KeyCode::Down => Some(Action::MoveSelection(1)),
        KeyCode::Char('/') => Some(Action::EnterSearch),
        KeyCode::Char('k') => Some(Action::KillSelected),
        KeyCode::Char('g') => Some(Action::ToggleGroup),
        KeyCode::Char('d') => Some(Action::ToggleDetails),
        KeyCode::Char('1') => Some(Action::SetSort(SortKey::Port)),
        KeyCode::Char('2') => Some(Action::SetSort(SortKey::Process)),
        KeyCode::Char('3') => Some(Action::SetSort(SortKey::Pid)),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Char('l') => Some(Action::ToggleLogs),
        KeyCode::Char('s') => Some(Action::ToggleStats),
        KeyCode::Char(':') => Some(Action::OpenCommand),
        KeyCode::Char('q') => Some(Action::Quit),
        _ => None,
    }
}
