//! Interactive dashboard: event loop wiring input, timers, and painting.
//!
//! One cooperative thread of control services the keyboard stream, the
//! refresh ticker, and kill lifecycles; they interleave only at await
//! points, so dashboard state needs no locking.

pub mod format;
mod input;
mod render;
mod state;

use std::io::{self, Write};

use anyhow::Context;
use crossterm::cursor::{Hide, Show};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures::StreamExt;
use portdeck_core::{kill_by_port, FilterConfig, PortDetector, PortSource, SystemPortSource};
use tokio::time::{interval, MissedTickBehavior};

use crate::logbuf::LogBuffer;
use input::map_key;
use render::Renderer;
use state::{DashboardState, Effect, REAP_DELAY, REFRESH_INTERVAL};

/// Run the dashboard until the user quits.
pub async fn run(
    detector: &PortDetector<SystemPortSource>,
    filter: FilterConfig,
    logs: LogBuffer,
) -> anyhow::Result<()> {
    enable_raw_mode().context("failed to enable raw mode")?;
    execute!(io::stdout(), EnterAlternateScreen, Hide)
        .context("failed to enter alternate screen")?;

    let result = event_loop(detector, filter, logs).await;

    restore_terminal();
    result
}

/// Best-effort terminal restoration; also used on the ctrl+c fast path.
fn restore_terminal() {
    let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
    let _ = disable_raw_mode();
}

fn is_force_quit(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

async fn event_loop(
    detector: &PortDetector<SystemPortSource>,
    filter: FilterConfig,
    logs: LogBuffer,
) -> anyhow::Result<()> {
    let mut state = DashboardState::new(filter);
    let mut renderer = Renderer::new(io::stdout(), logs);

    refresh(&mut state, detector).await;
    draw(&mut renderer, &mut state);

    let mut events = EventStream::new();
    let mut ticker = interval(REFRESH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) => {
                        if is_force_quit(&key) {
                            // Bypasses every handler: restore and die now.
                            restore_terminal();
                            std::process::exit(130);
                        }
                        let Some(action) = map_key(&state, key) else {
                            continue;
                        };
                        let effects = state.apply(action);
                        draw(&mut renderer, &mut state);
                        for effect in effects {
                            match effect {
                                Effect::Quit => return Ok(()),
                                Effect::Kill { pid, port } => {
                                    run_kill(&mut state, &mut renderer, detector, pid, port).await;
                                }
                                Effect::KillByPort { port, force } => {
                                    run_kill_by_port(
                                        &mut state, &mut renderer, detector, port, force,
                                    )
                                    .await;
                                }
                            }
                        }
                    }
                    Some(Ok(Event::Resize(_, _))) => {
                        renderer.invalidate();
                        draw(&mut renderer, &mut state);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "terminal event error");
                    }
                    None => return Ok(()),
                }
            }
            _ = ticker.tick() => {
                // The refresh timer fires regardless of modal or search
                // state.
                refresh(&mut state, detector).await;
                draw(&mut renderer, &mut state);
            }
        }
    }
}

/// Run one discovery cycle into the state. A failed cycle keeps the
/// previous snapshot on screen; the failure only goes to the log sink.
async fn refresh(state: &mut DashboardState, detector: &PortDetector<SystemPortSource>) {
    match detector.detect_ports().await {
        Ok(ports) => state.set_snapshot(ports),
        Err(e) => {
            tracing::warn!(error = %e, "discovery failed, keeping previous snapshot");
        }
    }
}

fn draw<W: Write>(renderer: &mut Renderer<W>, state: &mut DashboardState) {
    state.expire_toast();
    let (width, height) = crossterm::terminal::size().unwrap_or((80, 24));
    if let Err(e) = renderer.draw(state, width, height) {
        tracing::error!(error = %e, "render failed");
    }
}

/// The kill lifecycle. The killing flag was set by the reducer before this
/// runs; every path below ends with the flag cleared and a final repaint.
async fn run_kill<W: Write>(
    state: &mut DashboardState,
    renderer: &mut Renderer<W>,
    detector: &PortDetector<SystemPortSource>,
    pid: u32,
    port: u16,
) {
    // Repaint first so the loading indicator is visible before any I/O.
    draw(renderer, state);

    match detector.source().kill_process(pid, false).await {
        Ok(killed) => state.note_kill_outcome(port, killed, None),
        Err(e) => {
            tracing::warn!(pid, error = %e, "kill attempt errored");
            state.note_kill_outcome(port, false, Some(e.to_string()));
        }
    }

    // The attempt may have changed process state either way: drop both the
    // snapshot memo and the pid's metadata before re-querying.
    detector.source().invalidate_metadata(pid);
    detector.clear_cache().await;

    // Give the OS time to reap the process and release its sockets.
    tokio::time::sleep(REAP_DELAY).await;

    refresh(state, detector).await;
    state.clear_killing();
    draw(renderer, state);
}

/// Command-prompt variant: kill everything bound to a port.
async fn run_kill_by_port<W: Write>(
    state: &mut DashboardState,
    renderer: &mut Renderer<W>,
    detector: &PortDetector<SystemPortSource>,
    port: u16,
    force: bool,
) {
    draw(renderer, state);

    match kill_by_port(detector.source(), port, force).await {
        Ok(outcome) => {
            state.kills += outcome.killed.len() as u32;
            if outcome.success {
                state.set_success_toast(outcome.message);
            } else {
                state.set_failure_toast(outcome.message);
            }
        }
        Err(e) => {
            tracing::warn!(port, error = %e, "kill-by-port errored");
            state.set_failure_toast(format!("Kill failed: {}", e));
        }
    }

    detector.clear_cache().await;
    tokio::time::sleep(REAP_DELAY).await;

    refresh(state, detector).await;
    state.clear_killing();
    draw(renderer, state);
}
