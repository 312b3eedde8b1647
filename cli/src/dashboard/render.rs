//! Terminal renderer with delta-diffed repaints.
//!
//! Each frame is built as an in-memory line buffer and flushed to the
//! terminal in a single write. A frame carries a signature of what it drew;
//! when the next frame is structurally compatible (same row set, filter,
//! sort, detail flag, no modal, no toast) only the lines that actually
//! changed are repainted. Anything that invalidates the comparison, or a
//! delta touching more than half of the visible rows, falls back to a full
//! clear-and-redraw.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::queue;
use portdeck_core::SortKey;

use super::format::{cell_left, cell_right, format_lifetime, truncate};
use super::state::{DashboardState, Modal, Row, ToastKind};
use crate::logbuf::LogBuffer;

/// One rendered terminal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub color: Option<Color>,
}

impl Line {
    fn plain(text: String) -> Self {
        Self { text, color: None }
    }

    fn colored(text: String, color: Color) -> Self {
        Self {
            text,
            color: Some(color),
        }
    }
}

/// Everything the paint planner needs to compare two frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMeta {
    pub width: u16,
    pub height: u16,
    pub row_count: usize,
    pub filter: String,
    pub sort: SortKey,
    pub details: bool,
    pub modal: bool,
    pub toast: bool,
    pub selection_line: Option<usize>,
    /// First body line and the body line budget.
    pub body_start: usize,
    pub body_budget: usize,
    /// One signature per body line, selection excluded.
    pub row_sigs: Vec<u64>,
}

pub struct Frame {
    pub lines: Vec<Line>,
    pub meta: FrameMeta,
}

/// How the next frame reaches the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaintPlan {
    Full,
    /// Absolute line indices to repaint.
    Delta(Vec<usize>),
}

/// Decide between a delta and a full repaint.
pub fn plan(prev: Option<&FrameMeta>, next: &FrameMeta) -> PaintPlan {
    let Some(prev) = prev else {
        return PaintPlan::Full;
    };

    // Toasts must never be lost to a partial paint, and a closed modal or
    // expired toast leaves stale lines behind.
    if next.modal || next.toast || prev.modal || prev.toast {
        return PaintPlan::Full;
    }

    if prev.width != next.width
        || prev.height != next.height
        || prev.row_count != next.row_count
        || prev.filter != next.filter
        || prev.sort != next.sort
        || prev.details != next.details
    {
        return PaintPlan::Full;
    }

    let mut changed_rows: Vec<usize> = Vec::new();
    for (i, (old, new)) in prev.row_sigs.iter().zip(next.row_sigs.iter()).enumerate() {
        if old != new {
            changed_rows.push(next.body_start + i);
        }
    }

    // Many simultaneous changes amortize better as one clear-and-redraw.
    if changed_rows.len() > next.row_count / 2 {
        return PaintPlan::Full;
    }

    if prev.selection_line != next.selection_line {
        if let Some(line) = prev.selection_line {
            changed_rows.push(line);
        }
        if let Some(line) = next.selection_line {
            changed_rows.push(line);
        }
    }
    changed_rows.sort_unstable();
    changed_rows.dedup();

    // Header is always repainted, and the detail footer plus status line
    // reflect the current selection, so they are recomputed every frame.
    let mut lines = vec![0, 1];
    lines.extend(changed_rows);
    lines.push(next.body_start + next.body_budget); // detail footer
    lines.push(next.body_start + next.body_budget + 1); // status line
    lines.sort_unstable();
    lines.dedup();
    PaintPlan::Delta(lines)
}

/// Build one frame from dashboard state.
pub fn build_frame(state: &DashboardState, logs: &LogBuffer, width: u16, height: u16) -> Frame {
    let width = width.max(40) as usize;
    let height = height.max(8);
    let body_start = 2usize;
    let body_budget = height as usize - body_start - 3;

    let mut lines = Vec::with_capacity(height as usize);
    lines.push(Line::colored(title_line(state, width), Color::Cyan));
    lines.push(Line::plain(column_header(state, width)));

    let modal_active = state.modal != Modal::None;
    let (body, selection_line, row_sigs, row_count) = if modal_active {
        let body = modal_lines(state, logs, width, body_budget);
        let sigs = vec![0; body.len()];
        (body, None, sigs, 0)
    } else {
        body_lines(state, width, body_start, body_budget)
    };
    lines.extend(body);

    lines.push(Line::plain(detail_footer(state, width)));
    lines.push(Line::colored(status_line(state, width), Color::DarkGrey));
    lines.push(toast_line(state, width));

    let meta = FrameMeta {
        width: width as u16,
        height,
        row_count,
        filter: state.search.clone(),
        sort: state.sort,
        details: state.show_details,
        modal: modal_active,
        toast: state.toast.is_some(),
        selection_line,
        body_start,
        body_budget,
        row_sigs,
    };

    Frame { lines, meta }
}

fn title_line(state: &DashboardState, width: usize) -> String {
    let mut title = if state.searching {
        format!(" portdeck │ search: {}_", state.search)
    } else if !state.search.is_empty() {
        format!(
            " portdeck │ {} ports │ filter: {}",
            state.port_count(),
            state.search
        )
    } else {
        format!(" portdeck │ {} ports", state.port_count())
    };
    if let Some(port) = state.killing {
        title.push_str(&format!(" │ ⟳ killing :{}", port));
    }
    truncate(&title, width)
}

fn column_header(state: &DashboardState, width: usize) -> String {
    let mut header = format!(
        "   {} {} {} {} {} {} {}",
        cell_right("PORT", 5),
        cell_left("PROCESS", 18),
        cell_left("TYPE", 11),
        cell_right("PID", 7),
        cell_left("PROTO", 5),
        cell_left("USER", 10),
        cell_right("UPTIME", 8),
    );
    if state.show_details {
        header.push_str("  COMMAND");
    }
    truncate(&header, width)
}

/// Render the body rows, windowed so the selection stays visible.
fn body_lines(
    state: &DashboardState,
    width: usize,
    body_start: usize,
    budget: usize,
) -> (Vec<Line>, Option<usize>, Vec<u64>, usize) {
    let rows = state.visible_rows();

    // Scroll offset: keep the selected row inside the window.
    let selected_row = rows.iter().position(
        |row| matches!(row, Row::Port { index, .. } if *index == state.selected),
    );
    let offset = match selected_row {
        Some(pos) if pos >= budget => pos + 1 - budget,
        _ => 0,
    };

    let mut lines = Vec::with_capacity(budget);
    let mut sigs = Vec::with_capacity(budget);
    let mut selection_line = None;
    let mut row_count = 0;

    for (slot, row) in rows.iter().skip(offset).take(budget).enumerate() {
        row_count += 1;
        match row {
            Row::Group {
                id,
                label,
                collapsed,
                count,
            } => {
                let marker = if *collapsed { "▸" } else { "▾" };
                lines.push(Line::colored(
                    truncate(&format!(" {} {} ({})", marker, label, count), width),
                    Color::Yellow,
                ));
                sigs.push(sig3(id, *collapsed, *count));
            }
            Row::Port { index, info } => {
                let selected = *index == state.selected;
                if selected {
                    selection_line = Some(body_start + slot);
                }
                let prefix = if selected { " ▶ " } else { "   " };
                let mut text = format!(
                    "{}{} {} {} {} {} {} {}",
                    prefix,
                    cell_right(&info.port.to_string(), 5),
                    cell_left(&info.process_name, 18),
                    cell_left(info.category.unwrap_or("-"), 11),
                    cell_right(&info.pid.to_string(), 7),
                    cell_left(&info.protocol.to_string(), 5),
                    cell_left(&info.user, 10),
                    cell_right(&format_lifetime(info.lifetime), 8),
                );
                if state.show_details {
                    text.push_str("  ");
                    text.push_str(&info.command);
                }
                lines.push(if selected {
                    Line::colored(truncate(&text, width), Color::Green)
                } else {
                    Line::plain(truncate(&text, width))
                });
                sigs.push(port_sig(info));
            }
        }
    }

    while lines.len() < budget {
        lines.push(Line::plain(String::new()));
        sigs.push(0);
    }

    (lines, selection_line, sigs, row_count)
}

fn modal_lines(
    state: &DashboardState,
    logs: &LogBuffer,
    width: usize,
    budget: usize,
) -> Vec<Line> {
    let content: Vec<String> = match &state.modal {
        Modal::Help => vec![
            "  Help".to_string(),
            String::new(),
            "  ↑/↓        navigate".to_string(),
            "  /          search (digits filter ports)".to_string(),
            "  k          kill selected process".to_string(),
            "  g          collapse/expand group".to_string(),
            "  d          toggle command column".to_string(),
            "  1/2/3      sort by port/process/pid".to_string(),
            "  :          command prompt (kill/sort/filter)".to_string(),
            "  l / s / ?  logs / stats / this help".to_string(),
            "  q          quit   (ctrl+c force-quits)".to_string(),
        ],
        Modal::Confirm {
            pid,
            port,
            process_name,
        } => vec![
            "  Confirm kill".to_string(),
            String::new(),
            format!(
                "  {} (pid {}) on port {} belongs to another user.",
                process_name, pid, port
            ),
            String::new(),
            "  Press y to kill it, any other key to cancel.".to_string(),
        ],
        Modal::Logs => {
            let mut lines = vec!["  Logs".to_string(), String::new()];
            if logs.is_empty() {
                lines.push("  (no log entries yet)".to_string());
            } else {
                let tail = logs.tail(budget.saturating_sub(2));
                lines.extend(tail.into_iter().map(|l| format!("  {}", l)));
            }
            lines
        }
        Modal::Command => vec![
            "  Command".to_string(),
            String::new(),
            format!("  :{}_", state.command_buffer),
            String::new(),
            "  kill <port> [-f] │ sort <key> │ filter <text>".to_string(),
        ],
        Modal::Stats => {
            let groups = state.groups.len();
            let ports: usize = state.groups.iter().map(|g| g.ports.len()).sum();
            vec![
                "  Session stats".to_string(),
                String::new(),
                format!("  listening ports : {}", ports),
                format!("  groups          : {}", groups),
                format!("  kills           : {}", state.kills),
                format!("  rank            : {}", state.rank().unwrap_or("unranked")),
                format!("  log lines       : {}", logs.len()),
            ]
        }
        Modal::None => Vec::new(),
    };

    let mut lines: Vec<Line> = content
        .into_iter()
        .take(budget)
        .map(|text| Line::plain(truncate(&text, width)))
        .collect();
    while lines.len() < budget {
        lines.push(Line::plain(String::new()));
    }
    lines
}

fn detail_footer(state: &DashboardState, width: usize) -> String {
    match state.selected_port() {
        Some(info) => {
            let cwd = info.cwd.as_deref().unwrap_or("-");
            truncate(
                &format!(" cmd: {} │ cwd: {}", info.command, cwd),
                width,
            )
        }
        None => " no selection".to_string(),
    }
}

fn status_line(state: &DashboardState, width: usize) -> String {
    let text = if state.searching {
        " type digits to filter │ enter: keep │ esc: clear"
    } else {
        " ↑/↓ move │ k kill │ g group │ d details │ / search │ ? help │ q quit"
    };
    truncate(text, width)
}

fn toast_line(state: &DashboardState, width: usize) -> Line {
    match &state.toast {
        Some(toast) => {
            let color = match toast.kind {
                ToastKind::Success => Color::Green,
                ToastKind::Failure => Color::Red,
                ToastKind::Promotion => Color::Magenta,
            };
            Line::colored(truncate(&format!(" {}", toast.text), width), color)
        }
        None => Line::plain(String::new()),
    }
}

fn port_sig(info: &portdeck_core::PortInfo) -> u64 {
    let mut hasher = DefaultHasher::new();
    info.pid.hash(&mut hasher);
    info.port.hash(&mut hasher);
    info.process_name.hash(&mut hasher);
    info.command.hash(&mut hasher);
    info.lifetime.hash(&mut hasher);
    info.category.hash(&mut hasher);
    hasher.finish()
}

fn sig3(id: &str, collapsed: bool, count: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    collapsed.hash(&mut hasher);
    count.hash(&mut hasher);
    hasher.finish()
}

/// Owns the output stream and the previous frame's signature.
pub struct Renderer<W: Write> {
    out: W,
    logs: LogBuffer,
    prev: Option<FrameMeta>,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, logs: LogBuffer) -> Self {
        Self {
            out,
            logs,
            prev: None,
        }
    }

    /// Build, diff, and paint one frame in a single flush.
    pub fn draw(&mut self, state: &DashboardState, width: u16, height: u16) -> io::Result<()> {
        let frame = build_frame(state, &self.logs, width, height);
        let paint = plan(self.prev.as_ref(), &frame.meta);

        match &paint {
            PaintPlan::Full => {
                queue!(self.out, MoveTo(0, 0), Clear(ClearType::All))?;
                for (y, line) in frame.lines.iter().enumerate() {
                    self.queue_line(y, line)?;
                }
            }
            PaintPlan::Delta(indices) => {
                for &y in indices {
                    if let Some(line) = frame.lines.get(y) {
                        self.queue_line(y, line)?;
                    }
                }
            }
        }

        self.out.flush()?;
        self.prev = Some(frame.meta);
        Ok(())
    }

    fn queue_line(&mut self, y: usize, line: &Line) -> io::Result<()> {
        queue!(self.out, MoveTo(0, y as u16))?;
        if let Some(color) = line.color {
            queue!(self.out, SetForegroundColor(color))?;
        }
        queue!(
            self.out,
            Print(&line.text),
            Clear(ClearType::UntilNewLine),
            ResetColor
        )?;
        Ok(())
    }

    /// Forget the previous frame so the next draw repaints everything.
    pub fn invalidate(&mut self) {
        self.prev = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::state::Action;
    use portdeck_core::{FilterConfig, PortInfo, Protocol};

    fn sample_state() -> DashboardState {
        let mut state = DashboardState::new(FilterConfig::default());
        state.set_snapshot(vec![
            PortInfo::new(3000, Protocol::Tcp, 1, "node", "user"),
            PortInfo::new(3001, Protocol::Tcp, 2, "vite", "user"),
            PortInfo::new(5432, Protocol::Tcp, 3, "postgres", "user"),
        ]);
        state
    }

    fn frame_of(state: &DashboardState) -> Frame {
        build_frame(state, &LogBuffer::new(), 100, 24)
    }

    #[test]
    fn test_first_frame_is_full() {
        let state = sample_state();
        let frame = frame_of(&state);
        assert_eq!(plan(None, &frame.meta), PaintPlan::Full);
    }

    #[test]
    fn test_identical_frames_delta_touches_header_and_footer_only() {
        let state = sample_state();
        let prev = frame_of(&state);
        let next = frame_of(&state);

        let PaintPlan::Delta(lines) = plan(Some(&prev.meta), &next.meta) else {
            panic!("expected delta");
        };
        let footer = next.meta.body_start + next.meta.body_budget;
        assert_eq!(lines, vec![0, 1, footer, footer + 1]);
    }

    #[test]
    fn test_selection_move_deltas_old_and_new_lines() {
        let mut state = sample_state();
        let prev = frame_of(&state);
        let old_line = prev.meta.selection_line.unwrap();

        state.apply(Action::MoveSelection(1));
        let next = frame_of(&state);
        let new_line = next.meta.selection_line.unwrap();
        assert_ne!(old_line, new_line);

        let PaintPlan::Delta(lines) = plan(Some(&prev.meta), &next.meta) else {
            panic!("expected delta");
        };
        assert!(lines.contains(&old_line));
        assert!(lines.contains(&new_line));
        // Header plus the two selection lines plus the recomputed footer.
        let footer = next.meta.body_start + next.meta.body_budget;
        assert_eq!(lines, vec![0, 1, old_line, new_line, footer, footer + 1]);
    }

    #[test]
    fn test_filter_change_forces_full() {
        let mut state = sample_state();
        let prev = frame_of(&state);
        state.apply(Action::EnterSearch);
        state.apply(Action::SearchInput('3'));
        let next = frame_of(&state);
        assert_eq!(plan(Some(&prev.meta), &next.meta), PaintPlan::Full);
    }

    #[test]
    fn test_sort_change_forces_full() {
        let mut state = sample_state();
        let prev = frame_of(&state);
        state.apply(Action::SetSort(portdeck_core::SortKey::Pid));
        let next = frame_of(&state);
        assert_eq!(plan(Some(&prev.meta), &next.meta), PaintPlan::Full);
    }

    #[test]
    fn test_toast_forces_full_both_ways() {
        let mut state = sample_state();
        let prev = frame_of(&state);
        state.note_kill_outcome(3000, true, None);
        let next = frame_of(&state);
        assert_eq!(plan(Some(&prev.meta), &next.meta), PaintPlan::Full);
        // And again once it expires, to clear the line.
        assert_eq!(plan(Some(&next.meta), &prev.meta), PaintPlan::Full);
    }

    #[test]
    fn test_modal_forces_full() {
        let mut state = sample_state();
        let prev = frame_of(&state);
        state.apply(Action::ToggleHelp);
        let next = frame_of(&state);
        assert!(next.meta.modal);
        assert_eq!(plan(Some(&prev.meta), &next.meta), PaintPlan::Full);
    }

    #[test]
    fn test_mass_change_falls_back_to_full() {
        let mut state = sample_state();
        let prev = frame_of(&state);

        // Same row count, same filter/sort, but every row's data changed.
        let mut state2 = DashboardState::new(FilterConfig::default());
        state2.set_snapshot(vec![
            PortInfo::new(4000, Protocol::Tcp, 9, "node", "user"),
            PortInfo::new(4001, Protocol::Tcp, 8, "vite", "user"),
            PortInfo::new(6432, Protocol::Tcp, 7, "postgres", "user"),
        ]);
        let next = frame_of(&state2);
        assert_eq!(prev.meta.row_count, next.meta.row_count);
        assert_eq!(plan(Some(&prev.meta), &next.meta), PaintPlan::Full);
    }

    #[test]
    fn test_stats_modal_reports_log_line_count() {
        let mut state = sample_state();
        state.apply(Action::ToggleStats);
        let logs = LogBuffer::new();
        logs.push("discovery failed, keeping previous snapshot".to_string());

        let frame = build_frame(&state, &logs, 100, 24);
        assert!(frame
            .lines
            .iter()
            .any(|l| l.text.contains("log lines") && l.text.contains('1')));
    }

    #[test]
    fn test_logs_modal_shows_captured_lines() {
        let mut state = sample_state();
        state.apply(Action::ToggleLogs);

        let empty = build_frame(&state, &LogBuffer::new(), 100, 24);
        assert!(empty
            .lines
            .iter()
            .any(|l| l.text.contains("no log entries yet")));

        let logs = LogBuffer::new();
        logs.push("kill attempt errored".to_string());
        let frame = build_frame(&state, &logs, 100, 24);
        assert!(frame
            .lines
            .iter()
            .any(|l| l.text.contains("kill attempt errored")));
    }

    #[test]
    fn test_frame_fills_screen_height() {
        let state = sample_state();
        let frame = frame_of(&state);
        assert_eq!(frame.lines.len(), 24);
    }
}
