//! Duty-cycle scheduler.
//!
//! Computes how long a node sleeps between cycles and runs the base
//! node's idle phase under a supervisor that recovers a stuck phase.
//!
//! ```text
//!   Active ──▶ Idling ──┬──▶ DeepSleep ──(timer)──▶ boot ──▶ Active
//!                       └──▶ QuickIdle ──(button | timeout)──▶ Active
//! ```
//!
//! Wake times land on exact multiples of the quantum in local wall-clock
//! time, so 10:07:33 with a 15-minute quantum sleeps 447 s until 10:15:00.

use core::time::Duration;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use futures_lite::future;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{Platform, StoragePort, WallClock};
use crate::config::NodeConfig;
use crate::diagnostics::{RestartEntry, RestartLog};
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::error::{LivenessFault, Result};
use crate::pipeline::channels::{Flag, PipelineChannels, block_on_timeout};
use crate::reading::PLAUSIBLE_UNIX_FLOOR;
use crate::render::Screen;

const SECS_PER_HOUR: i64 = 3600;
const SECS_PER_DAY: i64 = 86_400;

/// Slack added to a long idle duration before the supervisor calls it stuck.
const IDLE_SLACK: Duration = Duration::from_secs(60);

// ═══════════════════════════════════════════════════════════════
//  Wake alignment
// ═══════════════════════════════════════════════════════════════

/// Overnight hours during which the node stays asleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepWindow {
    /// First sleeping hour (0-23).
    pub start_hour: u8,
    /// Wake hour (0-23), exclusive.
    pub end_hour: u8,
}

impl SleepWindow {
    pub fn contains(&self, hour: u8) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            // wraps midnight
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// How long to sleep, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepPlan {
    /// Until the next quantum boundary.
    Aligned(u32),
    /// Until the wake hour at the end of the sleep window.
    Overnight(u32),
}

impl SleepPlan {
    pub const fn secs(self) -> u32 {
        match self {
            Self::Aligned(s) | Self::Overnight(s) => s,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_secs(u64::from(self.secs()))
    }
}

/// Inputs of one sleep decision. Computed fresh every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeSchedule {
    /// Current Unix time (UTC seconds).
    pub now: i64,
    pub quantum_secs: u32,
    pub utc_offset_secs: i32,
    pub sleep_window: Option<SleepWindow>,
}

impl WakeSchedule {
    pub fn from_config(cfg: &NodeConfig, now: i64) -> Self {
        Self {
            now,
            quantum_secs: cfg.quantum_secs,
            utc_offset_secs: cfg.utc_offset_secs,
            sleep_window: cfg.sleep_window,
        }
    }

    fn local(&self) -> i64 {
        self.now + i64::from(self.utc_offset_secs)
    }

    pub fn local_hour(&self) -> u8 {
        (self.local().rem_euclid(SECS_PER_DAY) / SECS_PER_HOUR) as u8
    }

    /// Seconds until the first quantum boundary strictly after now.
    pub fn secs_to_next_quantum(&self) -> u32 {
        let q = i64::from(self.quantum_secs.max(1));
        let local = self.local();
        let next = (local.div_euclid(q) + 1) * q;
        (next - local) as u32
    }

    pub fn sleep_plan(&self) -> SleepPlan {
        // An unset clock says nothing about the hour of day.
        if let Some(window) = self.sleep_window {
            if self.now >= PLAUSIBLE_UNIX_FLOOR && window.contains(self.local_hour()) {
                let second_of_day = self.local().rem_euclid(SECS_PER_DAY);
                let wake = i64::from(window.end_hour) * SECS_PER_HOUR;
                let secs = (wake - second_of_day).rem_euclid(SECS_PER_DAY);
                return SleepPlan::Overnight(secs as u32);
            }
        }
        SleepPlan::Aligned(self.secs_to_next_quantum())
    }

    /// Absolute Unix time of the next wake.
    pub fn next_wake(&self) -> i64 {
        self.now + i64::from(self.sleep_plan().secs())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Shared UI state
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct UiInner {
    screen: Screen,
    skip_refetch: bool,
}

/// Screen selector and refetch flag, shared by the idle phase and the
/// base cycle. Each access is one short read-modify-write.
#[derive(Debug, Default)]
pub struct UiState {
    inner: Mutex<UiInner>,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> Screen {
        self.lock().screen
    }

    /// Advance to the next screen and return it.
    pub fn cycle_screen(&self) -> Screen {
        let mut ui = self.lock();
        ui.screen = ui.screen.next();
        ui.screen
    }

    pub fn skip_refetch(&self) -> bool {
        self.lock().skip_refetch
    }

    pub fn set_skip_refetch(&self, skip: bool) {
        self.lock().skip_refetch = skip;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UiInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Idle phase
// ═══════════════════════════════════════════════════════════════

/// How an idle phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEnd {
    Button,
    Timeout,
    /// Deep sleep returned (host simulation only).
    Slept,
    Cancelled,
}

/// Signals into and out of the idle phase. Lives in a `static` so the
/// button ISR can reach it.
pub struct IdleSignals {
    /// Given by the debounced button ISR.
    pub button: Flag,
    /// Given by the idle phase when it finished, tagged with its launch
    /// generation.
    pub done: Flag<(u32, IdleEnd)>,
    /// Generation of the only phase allowed to report. Bumped on every
    /// launch and termination.
    generation: AtomicU32,
}

impl IdleSignals {
    pub const fn new() -> Self {
        Self {
            button: embassy_sync::signal::Signal::new(),
            done: embassy_sync::signal::Signal::new(),
            generation: AtomicU32::new(0),
        }
    }

    /// Supersede every earlier phase and return the new generation.
    pub fn next_generation(&self) -> u32 {
        self.generation.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    pub fn is_current(&self, generation: u32) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

impl Default for IdleSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of the base node's idle task.
pub struct IdlePhase {
    signals: &'static IdleSignals,
    channels: Arc<PipelineChannels>,
    ui: Arc<UiState>,
    clock: Arc<dyn WallClock>,
    platform: Arc<dyn Platform>,
    deep_sleep: bool,
    quick_idle: Duration,
}

impl IdlePhase {
    pub fn new(
        cfg: &NodeConfig,
        signals: &'static IdleSignals,
        channels: Arc<PipelineChannels>,
        ui: Arc<UiState>,
        clock: Arc<dyn WallClock>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            signals,
            channels,
            ui,
            clock,
            platform,
            deep_sleep: cfg.deep_sleep,
            quick_idle: Duration::from_secs(u64::from(cfg.quick_idle_secs)),
        }
    }

    /// Deep-sleep for `duration`, or wait for a button press with
    /// `duration` as the ceiling. Signals `done` unless cancelled or
    /// superseded by a later `generation`.
    pub fn run(&self, duration: Duration, cancel: &Flag, generation: u32) -> IdleEnd {
        if self.deep_sleep {
            info!("Idle: deep sleep for {}s", duration.as_secs());
            self.platform.deep_sleep(duration);
            if !self.signals.is_current(generation) {
                return IdleEnd::Cancelled;
            }
            self.signals.done.signal((generation, IdleEnd::Slept));
            return IdleEnd::Slept;
        }

        let started_ms = self.clock.uptime_ms();
        self.ui.set_skip_refetch(false);
        info!("Idle: waiting up to {}s for button", duration.as_secs());

        let end = future::block_on(future::or(
            async {
                cancel.wait().await;
                IdleEnd::Cancelled
            },
            future::or(
                async {
                    self.signals.button.wait().await;
                    IdleEnd::Button
                },
                async {
                    async_io_mini::Timer::after(duration).await;
                    IdleEnd::Timeout
                },
            ),
        ));

        if end != IdleEnd::Cancelled && !self.signals.is_current(generation) {
            warn!("Idle: superseded phase woke ({:?}), discarding", end);
            if end == IdleEnd::Button {
                // Hand the press on to the live phase.
                self.signals.button.signal(());
            }
            return IdleEnd::Cancelled;
        }

        match end {
            IdleEnd::Cancelled => {
                warn!("Idle: cancelled");
                return end;
            }
            IdleEnd::Button => {
                let screen = self.ui.cycle_screen();
                info!("Idle: button, switching to {:?}", screen);
                // Short-circuit the next exchange wait.
                self.channels.exchange_complete.signal(());
            }
            IdleEnd::Timeout | IdleEnd::Slept => info!("Idle: time expired"),
        }

        let elapsed = self.clock.uptime_ms().saturating_sub(started_ms);
        if Duration::from_millis(elapsed) <= self.quick_idle {
            warn!("Idle: only {}ms idle, skipping next remote refresh", elapsed);
            self.ui.set_skip_refetch(true);
        }

        self.signals.done.signal((generation, end));
        end
    }
}

// ═══════════════════════════════════════════════════════════════
//  Stuck-idle supervision
// ═══════════════════════════════════════════════════════════════

/// Starts and stops the idle task.
pub trait IdleLauncher {
    fn launch(&mut self, duration: Duration) -> Result<()>;

    /// Ask the running phase to stop. Cooperative.
    fn terminate(&mut self);
}

/// Runs each idle phase on its own pinned thread.
pub struct ThreadIdleLauncher {
    phase: Arc<IdlePhase>,
    cancel: Option<Arc<Flag>>,
    handle: Option<JoinHandle<IdleEnd>>,
}

impl ThreadIdleLauncher {
    pub fn new(phase: Arc<IdlePhase>) -> Self {
        Self {
            phase,
            cancel: None,
            handle: None,
        }
    }
}

impl IdleLauncher for ThreadIdleLauncher {
    fn launch(&mut self, duration: Duration) -> Result<()> {
        if let Some(h) = self.handle.take() {
            if h.is_finished() {
                let _ = h.join();
            }
        }
        let generation = self.phase.signals.next_generation();
        let cancel: Arc<Flag> = Arc::new(embassy_sync::signal::Signal::new());
        let phase = self.phase.clone();
        let token = cancel.clone();
        let handle = spawn_on_core(Core::App, 3, 8, "idle\0", move || {
            phase.run(duration, &token, generation)
        })?;
        self.cancel = Some(cancel);
        self.handle = Some(handle);
        Ok(())
    }

    fn terminate(&mut self) {
        self.phase.signals.next_generation();
        if let Some(cancel) = self.cancel.take() {
            cancel.signal(());
        }
        // A stuck thread is left detached; its generation is stale, so a
        // late wake can neither report `done` nor touch the UI state.
        self.handle = None;
    }
}

/// Result of one supervised idle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    Completed(IdleEnd),
    /// The first phase got stuck; the relaunch completed.
    Recovered(IdleEnd),
    /// Recovery failed and the node was restarted.
    Restarted(LivenessFault),
}

/// Waits for idle completion with a ceiling; on expiry terminates the
/// phase and launches it exactly once more, then restarts the node.
pub struct IdleSupervisor<L: IdleLauncher, S: StoragePort> {
    launcher: L,
    signals: &'static IdleSignals,
    ceiling: Duration,
    restart_log: RestartLog<S>,
    clock: Arc<dyn WallClock>,
    platform: Arc<dyn Platform>,
}

impl<L: IdleLauncher, S: StoragePort> IdleSupervisor<L, S> {
    pub fn new(
        launcher: L,
        signals: &'static IdleSignals,
        ceiling: Duration,
        restart_log: RestartLog<S>,
        clock: Arc<dyn WallClock>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            launcher,
            signals,
            ceiling,
            restart_log,
            clock,
            platform,
        }
    }

    pub fn restart_log(&self) -> &RestartLog<S> {
        &self.restart_log
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn supervise(&mut self, duration: Duration) -> IdleOutcome {
        // Overnight idles legitimately outlast the ceiling.
        let ceiling = if duration >= self.ceiling {
            duration + IDLE_SLACK
        } else {
            self.ceiling
        };
        self.signals.done.reset();

        match self.launcher.launch(duration) {
            Ok(()) => {
                if let Some(end) = self.wait_done(ceiling) {
                    return IdleOutcome::Completed(end);
                }
                error!("Idle: {} after {}s, relaunching", LivenessFault::IdleStuck, ceiling.as_secs());
            }
            Err(e) => error!("Idle: launch failed ({}), relaunching", e),
        }
        self.launcher.terminate();
        self.signals.done.reset();

        if let Err(e) = self.launcher.launch(duration) {
            error!("Idle: relaunch failed ({})", e);
            return self.restart(LivenessFault::RelaunchFailed);
        }
        info!("Idle: relaunched");
        match self.wait_done(ceiling) {
            Some(end) => IdleOutcome::Recovered(end),
            None => {
                self.launcher.terminate();
                self.restart(LivenessFault::RelaunchStuck)
            }
        }
    }

    /// Wait for the current phase to report, skipping reports from
    /// superseded ones.
    fn wait_done(&self, ceiling: Duration) -> Option<IdleEnd> {
        let deadline = Instant::now() + ceiling;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (generation, end) = block_on_timeout(remaining, self.signals.done.wait())?;
            if self.signals.is_current(generation) {
                return Some(end);
            }
            warn!("Idle: ignoring completion of superseded phase {}", generation);
        }
    }

    fn restart(&mut self, reason: LivenessFault) -> IdleOutcome {
        let entry = RestartEntry {
            unix: self.clock.now_unix(),
            reason,
        };
        if let Err(e) = self.restart_log.record(entry) {
            warn!("Idle: restart reason not persisted ({})", e);
        }
        error!("Idle: {}, restarting node", reason);
        self.platform.restart();
        IdleOutcome::Restarted(reason)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
