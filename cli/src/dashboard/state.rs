//! Dashboard state and the action reducer.
//!
//! Every state transition goes through [`DashboardState::apply`]: keyboard
//! events are mapped to [`Action`] values, the reducer mutates the state it
//! exclusively owns and returns [`Effect`]s for the event loop to execute.
//! This keeps all transitions enumerable and testable without a terminal.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use portdeck_core::{process_snapshot, FilterConfig, PortGroup, PortInfo, SortKey};

/// Fixed refresh timer interval.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Delay after a kill before re-querying, giving the OS time to reap the
/// process and release its sockets.
pub const REAP_DELAY: Duration = Duration::from_millis(200);

const TOAST_TTL: Duration = Duration::from_secs(3);
const PROMOTION_TOAST_TTL: Duration = Duration::from_secs(5);

/// Session kill-count thresholds and the rank earned at each.
const RANKS: &[(u32, &str)] = &[
    (5, "Port Sweeper"),
    (10, "Port Reaper"),
    (25, "Daemon Slayer"),
    (50, "Socket Scourge"),
    (100, "Kernel Harvester"),
];

/// Active modal overlay. At most one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Modal {
    #[default]
    None,
    Help,
    Confirm {
        pid: u32,
        port: u16,
        process_name: String,
    },
    Logs,
    Command,
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Failure,
    Promotion,
}

/// Transient status message with an expiry timestamp.
#[derive(Debug, Clone)]
pub struct Toast {
    pub text: String,
    pub kind: ToastKind,
    pub expires: Instant,
}

/// Logical actions produced by the input handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    MoveSelection(i64),
    EnterSearch,
    SearchInput(char),
    SearchBackspace,
    SearchCommit,
    SearchCancel,
    KillSelected,
    ConfirmKill,
    CancelConfirm,
    ToggleGroup,
    ToggleDetails,
    SetSort(SortKey),
    ToggleHelp,
    ToggleLogs,
    ToggleStats,
    OpenCommand,
    CommandInput(char),
    CommandBackspace,
    CommandSubmit,
    CloseModal,
    Quit,
}

/// Side effects the event loop executes after a reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Run the kill lifecycle for one process.
    Kill { pid: u32, port: u16 },
    /// Run the one-shot kill-by-port service (command prompt).
    KillByPort { port: u16, force: bool },
    /// Leave the dashboard.
    Quit,
}

/// One visible body row: a group header or a selectable port entry.
#[derive(Debug, Clone)]
pub enum Row {
    Group {
        id: String,
        label: String,
        collapsed: bool,
        count: usize,
    },
    Port {
        /// Index into the flattened selectable port list.
        index: usize,
        info: PortInfo,
    },
}

/// All dashboard state, exclusively owned by the reducer.
pub struct DashboardState {
    /// Raw snapshot from the last successful discovery cycle.
    snapshot: Vec<PortInfo>,
    /// Groups rebuilt from the snapshot, collapse state re-applied.
    pub groups: Vec<PortGroup>,
    /// Memoized flattened view; rebuilt whenever snapshot, search,
    /// collapse, or sort change.
    visible: Vec<Row>,
    /// Number of selectable port rows in `visible`.
    port_count: usize,
    pub selected: usize,
    pub modal: Modal,
    pub searching: bool,
    pub search: String,
    pub command_buffer: String,
    pub sort: SortKey,
    pub show_details: bool,
    /// Target port while a kill is in flight.
    pub killing: Option<u16>,
    pub toast: Option<Toast>,
    /// Kills completed this session (not persisted).
    pub kills: u32,
    filter: FilterConfig,
    collapsed: HashSet<String>,
    current_user: String,
}

impl DashboardState {
    pub fn new(filter: FilterConfig) -> Self {
        Self {
            snapshot: Vec::new(),
            groups: Vec::new(),
            visible: Vec::new(),
            port_count: 0,
            selected: 0,
            modal: Modal::None,
            searching: false,
            search: String::new(),
            command_buffer: String::new(),
            sort: filter.sort,
            show_details: false,
            killing: None,
            toast: None,
            kills: 0,
            filter,
            collapsed: HashSet::new(),
            current_user: current_user(),
        }
    }

    // ------------------------------------------------------------------
    // Snapshot and view maintenance
    // ------------------------------------------------------------------

    /// Replace the current snapshot with a fresh discovery cycle's result.
    pub fn set_snapshot(&mut self, ports: Vec<PortInfo>) {
        self.snapshot = ports;
        self.rebuild_groups();
    }

    fn rebuild_groups(&mut self) {
        let mut config = self.filter.clone();
        config.sort = self.sort;
        self.groups = process_snapshot(self.snapshot.clone(), &config);
        // Collapse state survives rebuilds, re-applied by group id.
        for group in &mut self.groups {
            group.collapsed = self.collapsed.contains(&group.id);
        }
        self.rebuild_visible();
    }

    /// Rebuild the flattened row list. This is the memoization point the
    /// collapse toggle and search edits must invalidate.
    fn rebuild_visible(&mut self) {
        self.visible.clear();
        let mut index = 0;
        for group in &self.groups {
            let members: Vec<&PortInfo> = group
                .ports
                .iter()
                .filter(|p| p.matches_search(&self.search))
                .collect();
            if members.is_empty() {
                continue;
            }
            self.visible.push(Row::Group {
                id: group.id.clone(),
                label: group.category.to_string(),
                collapsed: group.collapsed,
                count: members.len(),
            });
            if group.collapsed {
                continue;
            }
            for info in members {
                self.visible.push(Row::Port {
                    index,
                    info: (*info).clone(),
                });
                index += 1;
            }
        }
        self.port_count = index;
        if self.port_count == 0 {
            self.selected = 0;
        } else if self.selected >= self.port_count {
            self.selected = self.port_count - 1;
        }
    }

    pub fn visible_rows(&self) -> &[Row] {
        &self.visible
    }

    pub fn port_count(&self) -> usize {
        self.port_count
    }

    pub fn selected_port(&self) -> Option<&PortInfo> {
        self.visible.iter().find_map(|row| match row {
            Row::Port { index, info } if *index == self.selected => Some(info),
            _ => None,
        })
    }

    /// Circular selection move; empty list is a no-op.
    pub fn move_selection(&mut self, delta: i64) {
        if self.port_count == 0 {
            return;
        }
        let len = self.port_count as i64;
        self.selected = ((self.selected as i64 + delta).rem_euclid(len)) as usize;
    }

    // ------------------------------------------------------------------
    // Toasts
    // ------------------------------------------------------------------

    /// Drop the toast once its expiry has passed. Called at the start of
    /// every render.
    pub fn expire_toast(&mut self) {
        if let Some(toast) = &self.toast {
            if Instant::now() >= toast.expires {
                self.toast = None;
            }
        }
    }

    fn set_toast(&mut self, text: String, kind: ToastKind, ttl: Duration) {
        self.toast = Some(Toast {
            text,
            kind,
            expires: Instant::now() + ttl,
        });
    }

    /// Record a kill outcome, producing the result toast. A success that
    /// crosses a rank threshold earns the longer promotion toast.
    pub fn note_kill_outcome(&mut self, port: u16, success: bool, detail: Option<String>) {
        if success {
            self.kills += 1;
            if let Some((_, rank)) = RANKS.iter().find(|(count, _)| *count == self.kills) {
                self.set_toast(
                    format!("Rank up: {} ({} kills)", rank, self.kills),
                    ToastKind::Promotion,
                    PROMOTION_TOAST_TTL,
                );
            } else {
                self.set_toast(
                    format!("Killed process on port {}", port),
                    ToastKind::Success,
                    TOAST_TTL,
                );
            }
        } else {
            let text = match detail {
                Some(detail) => format!("Failed to kill port {}: {}", port, detail),
                None => format!("Failed to kill process on port {}", port),
            };
            self.set_toast(text, ToastKind::Failure, TOAST_TTL);
        }
    }

    pub fn set_failure_toast(&mut self, text: String) {
        self.set_toast(text, ToastKind::Failure, TOAST_TTL);
    }

    pub fn set_success_toast(&mut self, text: String) {
        self.set_toast(text, ToastKind::Success, TOAST_TTL);
    }

    /// Highest rank earned this session, if any.
    pub fn rank(&self) -> Option<&'static str> {
        RANKS
            .iter()
            .rev()
            .find(|(count, _)| self.kills >= *count)
            .map(|(_, rank)| *rank)
    }

    /// Clear the kill-in-progress flag. The event loop guarantees this runs
    /// on every kill path, success or not.
    pub fn clear_killing(&mut self) {
        self.killing = None;
    }

    // ------------------------------------------------------------------
    // Reducer
    // ------------------------------------------------------------------

    pub fn apply(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::MoveSelection(delta) => {
                self.move_selection(delta);
                vec![]
            }
            Action::EnterSearch => {
                if self.modal == Modal::None {
                    self.searching = true;
                }
                vec![]
            }
            Action::SearchInput(c) => {
                self.search.push(c);
                self.rebuild_visible();
                vec![]
            }
            Action::SearchBackspace => {
                self.search.pop();
                self.rebuild_visible();
                vec![]
            }
            Action::SearchCommit => {
                self.searching = false;
                vec![]
            }
            Action::SearchCancel => {
                self.searching = false;
                self.search.clear();
                self.rebuild_visible();
                vec![]
            }
            Action::KillSelected => self.kill_selected(),
            Action::ConfirmKill => {
                if let Modal::Confirm { pid, port, .. } = self.modal.clone() {
                    self.modal = Modal::None;
                    self.killing = Some(port);
                    vec![Effect::Kill { pid, port }]
                } else {
                    vec![]
                }
            }
            Action::CancelConfirm => {
                if matches!(self.modal, Modal::Confirm { .. }) {
                    self.modal = Modal::None;
                }
                vec![]
            }
            Action::ToggleGroup => {
                self.toggle_selected_group();
                vec![]
            }
            Action::ToggleDetails => {
                self.show_details = !self.show_details;
                vec![]
            }
            Action::SetSort(key) => {
                if self.sort != key {
                    self.sort = key;
                    self.rebuild_groups();
                }
                vec![]
            }
            Action::ToggleHelp => self.toggle_modal(Modal::Help),
            Action::ToggleLogs => self.toggle_modal(Modal::Logs),
            Action::ToggleStats => self.toggle_modal(Modal::Stats),
            Action::OpenCommand => {
                if self.modal == Modal::None && !self.searching {
                    self.command_buffer.clear();
                    self.modal = Modal::Command;
                }
                vec![]
            }
            Action::CommandInput(c) => {
                self.command_buffer.push(c);
                vec![]
            }
            Action::CommandBackspace => {
                self.command_buffer.pop();
                vec![]
            }
            Action::CommandSubmit => self.submit_command(),
            Action::CloseModal => {
                self.modal = Modal::None;
                vec![]
            }
            Action::Quit => vec![Effect::Quit],
        }
    }

    fn toggle_modal(&mut self, modal: Modal) -> Vec<Effect> {
        if self.modal == modal {
            self.modal = Modal::None;
        } else if self.modal == Modal::None && !self.searching {
            self.modal = modal;
        }
        vec![]
    }

    fn kill_selected(&mut self) -> Vec<Effect> {
        if self.killing.is_some() {
            return vec![];
        }
        let Some(info) = self.selected_port().cloned() else {
            return vec![];
        };
        // Killing someone else's process is the one case that asks first.
        if info.user != self.current_user && info.user != "-" {
            self.modal = Modal::Confirm {
                pid: info.pid,
                port: info.port,
                process_name: info.process_name,
            };
            return vec![];
        }
        self.killing = Some(info.port);
        vec![Effect::Kill {
            pid: info.pid,
            port: info.port,
        }]
    }

    fn toggle_selected_group(&mut self) {
        let Some(id) = self.selected_group_id() else {
            return;
        };
        if !self.collapsed.remove(&id) {
            self.collapsed.insert(id);
        }
        self.rebuild_groups();
    }

    /// Group the selection currently sits in; with everything collapsed or
    /// empty, the first visible group.
    fn selected_group_id(&self) -> Option<String> {
        let mut current: Option<String> = None;
        for row in &self.visible {
            match row {
                Row::Group { id, .. } => current = Some(id.clone()),
                Row::Port { index, .. } if *index == self.selected => return current,
                Row::Port { .. } => {}
            }
        }
        // No selectable row (all groups collapsed): act on the first group.
        self.visible.iter().find_map(|row| match row {
            Row::Group { id, .. } => Some(id.clone()),
            _ => None,
        })
    }

    fn submit_command(&mut self) -> Vec<Effect> {
        let text = std::mem::take(&mut self.command_buffer);
        self.modal = Modal::None;
        let mut parts = text.split_whitespace();
        match parts.next() {
            Some("kill") => {
                let Some(port) = parts.next().and_then(|p| p.parse::<u16>().ok()) else {
                    self.set_failure_toast("Usage: kill <port> [-f]".to_string());
                    return vec![];
                };
                let force = parts.next() == Some("-f");
                self.killing = Some(port);
                vec![Effect::KillByPort { port, force }]
            }
            Some("sort") => match parts.next().and_then(SortKey::parse) {
                Some(key) => self.apply(Action::SetSort(key)),
                None => {
                    self.set_failure_toast("Usage: sort <port|process|pid|user>".to_string());
                    vec![]
                }
            },
            Some("filter") => {
                self.search = parts.collect::<Vec<_>>().join(" ");
                self.rebuild_visible();
                vec![]
            }
            Some(other) => {
                self.set_failure_toast(format!("Unknown command: {}", other));
                vec![]
            }
            None => vec![],
        }
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use portdeck_core::Protocol;

    fn port(num: u16, pid: u32, name: &str) -> PortInfo {
        let mut p = PortInfo::new(num, Protocol::Tcp, pid, name, "me");
        p.command = format!("{} --serve", name);
        p
    }

    fn state_with(ports: Vec<PortInfo>) -> DashboardState {
        let mut state = DashboardState::new(FilterConfig::default());
        state.current_user = "me".to_string();
        state.set_snapshot(ports);
        state
    }

    #[test]
    fn test_selection_wraps_both_directions() {
        let mut state = state_with(vec![
            port(3000, 1, "node"),
            port(3001, 2, "node"),
            port(3002, 3, "node"),
        ]);
        assert_eq!(state.port_count(), 3);

        state.apply(Action::MoveSelection(-1));
        assert_eq!(state.selected, 2);
        state.apply(Action::MoveSelection(1));
        assert_eq!(state.selected, 0);
    }

    #[test]
    fn test_selection_noop_when_empty() {
        let mut state = state_with(vec![]);
        state.apply(Action::MoveSelection(1));
        assert_eq!(state.selected, 0);
    }

    #[test]
    fn test_search_filters_by_port_digits() {
        let mut state = state_with(vec![port(3000, 1, "node"), port(8080, 2, "nginx")]);
        state.apply(Action::EnterSearch);
        state.apply(Action::SearchInput('8'));
        state.apply(Action::SearchInput('0'));
        assert_eq!(state.port_count(), 1);
        assert_eq!(state.selected_port().unwrap().port, 8080);

        state.apply(Action::SearchCancel);
        assert_eq!(state.port_count(), 2);
        assert!(state.search.is_empty());
    }

    #[test]
    fn test_search_excludes_modals() {
        let mut state = state_with(vec![]);
        state.apply(Action::EnterSearch);
        state.apply(Action::ToggleHelp);
        assert_eq!(state.modal, Modal::None);
    }

    #[test]
    fn test_only_one_modal_at_a_time() {
        let mut state = state_with(vec![]);
        state.apply(Action::ToggleHelp);
        assert_eq!(state.modal, Modal::Help);
        state.apply(Action::ToggleLogs);
        assert_eq!(state.modal, Modal::Help);
        state.apply(Action::ToggleHelp);
        assert_eq!(state.modal, Modal::None);
    }

    #[test]
    fn test_kill_own_process_goes_straight_to_effect() {
        let mut state = state_with(vec![port(3000, 42, "node")]);
        let effects = state.apply(Action::KillSelected);
        assert_eq!(
            effects,
            vec![Effect::Kill {
                pid: 42,
                port: 3000
            }]
        );
        assert_eq!(state.killing, Some(3000));
    }

    #[test]
    fn test_kill_foreign_process_asks_first() {
        let mut foreign = port(80, 7, "nginx");
        foreign.user = "root".to_string();
        let mut state = state_with(vec![foreign]);

        let effects = state.apply(Action::KillSelected);
        assert!(effects.is_empty());
        assert!(matches!(state.modal, Modal::Confirm { pid: 7, .. }));

        let effects = state.apply(Action::ConfirmKill);
        assert_eq!(effects, vec![Effect::Kill { pid: 7, port: 80 }]);
        assert_eq!(state.modal, Modal::None);
    }

    #[test]
    fn test_kill_ignored_while_kill_in_flight() {
        let mut state = state_with(vec![port(3000, 42, "node")]);
        state.apply(Action::KillSelected);
        let effects = state.apply(Action::KillSelected);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_toggle_group_hides_members_and_survives_rebuild() {
        let mut state = state_with(vec![port(3000, 1, "node"), port(80, 2, "nginx")]);
        assert_eq!(state.port_count(), 2);

        state.apply(Action::ToggleGroup); // selection sits in dev-server
        assert_eq!(state.port_count(), 1);

        // A fresh snapshot rebuild keeps the collapse.
        state.set_snapshot(vec![port(3000, 1, "node"), port(80, 2, "nginx")]);
        assert_eq!(state.port_count(), 1);
    }

    #[test]
    fn test_sort_change_reorders_members() {
        let mut state = state_with(vec![port(9000, 1, "node"), port(3000, 9, "vite")]);
        state.apply(Action::SetSort(SortKey::Pid));
        assert_eq!(state.selected_port().unwrap().pid, 1);
    }

    #[test]
    fn test_toast_expiry() {
        let mut state = state_with(vec![]);
        state.set_toast("gone".to_string(), ToastKind::Success, Duration::ZERO);
        state.expire_toast();
        assert!(state.toast.is_none());
    }

    #[test]
    fn test_promotion_toast_at_threshold() {
        let mut state = state_with(vec![]);
        for _ in 0..4 {
            state.note_kill_outcome(3000, true, None);
        }
        assert_eq!(state.toast.as_ref().unwrap().kind, ToastKind::Success);
        state.note_kill_outcome(3000, true, None);
        let toast = state.toast.as_ref().unwrap();
        assert_eq!(toast.kind, ToastKind::Promotion);
        assert!(toast.text.contains("Port Sweeper"));
        assert_eq!(state.rank(), Some("Port Sweeper"));
    }

    #[test]
    fn test_command_kill_parses() {
        let mut state = state_with(vec![]);
        state.apply(Action::OpenCommand);
        for c in "kill 8080 -f".chars() {
            state.apply(Action::CommandInput(c));
        }
        let effects = state.apply(Action::CommandSubmit);
        assert_eq!(
            effects,
            vec![Effect::KillByPort {
                port: 8080,
                force: true
            }]
        );
    }

    #[test]
    fn test_command_sort_and_unknown() {
        let mut state = state_with(vec![]);
        state.apply(Action::OpenCommand);
        for c in "sort pid".chars() {
            state.apply(Action::CommandInput(c));
        }
        state.apply(Action::CommandSubmit);
        assert_eq!(state.sort, SortKey::Pid);

        state.apply(Action::OpenCommand);
        for c in "frobnicate".chars() {
            state.apply(Action::CommandInput(c));
        }
        state.apply(Action::CommandSubmit);
        assert_eq!(state.toast.as_ref().unwrap().kind, ToastKind::Failure);
    }
}
