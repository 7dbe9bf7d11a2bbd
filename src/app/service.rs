//! Node services — the per-cycle orchestration of each role.
//!
//! [`OutsideNode`] samples, fuses, transmits and deep-sleeps.
//! [`BaseNode`] samples locally, waits for the peer exchange, renders and
//! idles under supervision. Both are hardware-agnostic: all I/O flows
//! through port traits injected at construction.
//!
//! ```text
//!  SensorSource ──▶ ┌──────────────────────────┐ ──▶ Radio / Renderer
//!                   │  OutsideNode | BaseNode  │
//!     WallClock ──▶ │  pipeline · scheduler    │ ──▶ EventSink
//!                   └──────────────────────────┘ ──▶ Platform
//! ```

use core::time::Duration;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, warn};

use crate::config::{NodeConfig, NodeRole};
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::error::Result;
use crate::fusion::FusionEngine;
use crate::history::HistoryStore;
use crate::logstore::LogWriter;
use crate::pipeline::channels::block_on_timeout;
use crate::pipeline::{
    Acquisition, CycleOutcome, Distributor, FanInTiming, FusionStage, LatestValues,
    PipelineChannels, SharedSensor,
};
use crate::render::RenderBuffer;
use crate::scheduler::{IdleLauncher, IdleOutcome, IdleSupervisor, SleepPlan, UiState, WakeSchedule};
use crate::transport::SyncSender;

use super::events::AppEvent;
use super::ports::{
    BatteryMonitor, EventSink, LogAppender, Platform, Radio, RemoteRefresh, Renderer,
    StoragePort, WallClock,
};

// ───────────────────────────────────────────────────────────────
// Shared wiring
// ───────────────────────────────────────────────────────────────

/// Build the fusion stage for this node's local sensors.
pub fn fusion_stage<S: StoragePort>(
    cfg: &NodeConfig,
    channels: Arc<PipelineChannels>,
    history: Arc<HistoryStore<S>>,
    clock: Arc<dyn WallClock>,
    sensors: usize,
) -> FusionStage<S> {
    FusionStage::new(
        channels,
        history,
        FusionEngine::from_config(cfg),
        clock,
        FanInTiming::from_config(cfg, sensors),
    )
}

/// Longest a cycle waits for the first acquisition task to report.
fn trigger_wait(cfg: &NodeConfig) -> Duration {
    cfg.post_wait() + cfg.fan_in_window()
}

fn sleep_plan(cfg: &NodeConfig, clock: &dyn WallClock) -> SleepPlan {
    WakeSchedule::from_config(cfg, clock.now_unix()).sleep_plan()
}

// ───────────────────────────────────────────────────────────────
// Outside node
// ───────────────────────────────────────────────────────────────

/// What one outside cycle achieved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutsideReport {
    pub fusion: CycleOutcome,
    /// `None` when nothing was queued for transmission.
    pub delivered: Option<bool>,
}

/// Dual-sensor node: one fused reading per wake, sent to the base node.
pub struct OutsideNode<R: Radio, S: StoragePort> {
    cfg: NodeConfig,
    channels: Arc<PipelineChannels>,
    sensors: Vec<SharedSensor>,
    acquisition: Acquisition,
    fusion: FusionStage<S>,
    distributor: Distributor,
    sender: SyncSender<R>,
    clock: Arc<dyn WallClock>,
    platform: Arc<dyn Platform>,
}

impl<R: Radio, S: StoragePort> OutsideNode<R, S> {
    pub fn new(
        cfg: NodeConfig,
        sensors: Vec<SharedSensor>,
        history: Arc<HistoryStore<S>>,
        sender: SyncSender<R>,
        clock: Arc<dyn WallClock>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        let channels = Arc::new(PipelineChannels::new());
        let acquisition = Acquisition::new(channels.clone(), clock.clone(), cfg.post_wait());
        let fusion = fusion_stage(&cfg, channels.clone(), history, clock.clone(), sensors.len());
        let distributor = Distributor::for_role(NodeRole::Outside, channels.clone(), cfg.sink_wait());
        Self {
            cfg,
            channels,
            sensors,
            acquisition,
            fusion,
            distributor,
            sender,
            clock,
            platform,
        }
    }

    pub fn with_battery(mut self, battery: Box<dyn BatteryMonitor>) -> Self {
        self.fusion = self.fusion.with_battery(battery);
        self
    }

    pub fn channels(&self) -> &Arc<PipelineChannels> {
        &self.channels
    }

    /// Acquire → fuse → fan out → transmit.
    pub fn run_cycle(&mut self, sink: &mut impl EventSink) -> OutsideReport {
        self.channels.reset_fan_in();
        let launched = self.acquisition.trigger(&self.sensors);
        info!("Outside: cycle started, {} sensor task(s)", launched);

        let fusion = self.fusion.run_cycle_timeout(trigger_wait(&self.cfg));
        sink.emit(&AppEvent::Fused(fusion));
        self.distributor.drain();

        let mut delivered = None;
        while let Some(sample) = self.channels.outbound.try_take() {
            let ok = self.sender.send_with_retry(&sample);
            sink.emit(&AppEvent::Sent { delivered: ok });
            delivered = Some(ok);
        }
        OutsideReport { fusion, delivered }
    }

    /// Sleep until the next aligned wake. Does not return on hardware.
    pub fn sleep(&self, sink: &mut impl EventSink) -> SleepPlan {
        let plan = sleep_plan(&self.cfg, self.clock.as_ref());
        sink.emit(&AppEvent::Sleeping(plan));
        if self.cfg.deep_sleep {
            self.platform.deep_sleep(plan.duration());
        } else {
            std::thread::sleep(plan.duration());
        }
        plan
    }

    pub fn run(&mut self, sink: &mut impl EventSink) {
        loop {
            self.run_cycle(sink);
            self.sleep(sink);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Base node
// ───────────────────────────────────────────────────────────────

/// What one base cycle achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseReport {
    pub exchanged: bool,
    pub local_done: bool,
    pub refreshed: bool,
    pub drained: usize,
}

/// Display node: local sample plus the peer's, rendered, logged, idled.
///
/// The fusion stage, distributor and sink consumers run as long-lived
/// tasks started by [`spawn_pipeline`]; this service only drives the
/// per-cycle trigger and the waits around it.
pub struct BaseNode<L: IdleLauncher, S: StoragePort> {
    cfg: NodeConfig,
    channels: Arc<PipelineChannels>,
    sensors: Vec<SharedSensor>,
    acquisition: Acquisition,
    ui: Arc<UiState>,
    renderer: Box<dyn Renderer>,
    refresh: Option<Box<dyn RemoteRefresh>>,
    buffer: RenderBuffer,
    supervisor: IdleSupervisor<L, S>,
    clock: Arc<dyn WallClock>,
}

impl<L: IdleLauncher, S: StoragePort> BaseNode<L, S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: NodeConfig,
        channels: Arc<PipelineChannels>,
        sensors: Vec<SharedSensor>,
        ui: Arc<UiState>,
        renderer: Box<dyn Renderer>,
        supervisor: IdleSupervisor<L, S>,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        let acquisition = Acquisition::new(channels.clone(), clock.clone(), cfg.post_wait());
        Self {
            cfg,
            channels,
            sensors,
            acquisition,
            ui,
            renderer,
            refresh: None,
            buffer: RenderBuffer::default(),
            supervisor,
            clock,
        }
    }

    pub fn with_refresh(mut self, refresh: Box<dyn RemoteRefresh>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub fn buffer(&self) -> &RenderBuffer {
        &self.buffer
    }

    pub fn supervisor(&self) -> &IdleSupervisor<L, S> {
        &self.supervisor
    }

    /// Trigger → wait for the exchange → refresh → wait for the local
    /// sample → render.
    pub fn run_cycle(&mut self, sink: &mut impl EventSink) -> BaseReport {
        self.channels.local_done.reset();
        let launched = self.acquisition.trigger(&self.sensors);
        info!("Base: cycle started, {} sensor task(s)", launched);

        let exchanged =
            block_on_timeout(self.cfg.exchange_wait(), self.channels.exchange_complete.wait())
                .is_some();
        if !exchanged {
            warn!("Base: no exchange within {}s", self.cfg.exchange_wait().as_secs());
            sink.emit(&AppEvent::ExchangeTimedOut);
        }

        let mut refreshed = false;
        if let Some(refresh) = self.refresh.as_mut() {
            if self.ui.skip_refetch() {
                sink.emit(&AppEvent::RefreshSkipped);
            } else {
                refresh.refresh();
                refreshed = true;
            }
        }

        let local_done =
            block_on_timeout(self.cfg.local_wait(), self.channels.local_done.wait()).is_some();
        if !local_done {
            warn!("Base: local sample not distributed in time");
        }

        let drained = self.buffer.drain_from(&self.channels, self.cfg.sink_wait());
        let screen = self.ui.screen();
        self.renderer.render(screen, &self.buffer);
        sink.emit(&AppEvent::Rendered {
            screen,
            samples: drained.min(usize::from(u8::MAX)) as u8,
        });

        BaseReport {
            exchanged,
            local_done,
            refreshed,
            drained,
        }
    }

    /// Idle until the next aligned wake, under stuck-phase supervision.
    pub fn idle(&mut self, sink: &mut impl EventSink) -> IdleOutcome {
        let plan = sleep_plan(&self.cfg, self.clock.as_ref());
        sink.emit(&AppEvent::Sleeping(plan));
        let outcome = self.supervisor.supervise(plan.duration());
        sink.emit(&AppEvent::Idle(outcome));
        outcome
    }

    pub fn run(&mut self, sink: &mut impl EventSink) {
        loop {
            self.run_cycle(sink);
            self.idle(sink);
        }
    }
}

/// Handles of the base node's long-lived pipeline tasks.
pub struct PipelineTasks {
    pub fusion: JoinHandle<()>,
    pub distributor: JoinHandle<()>,
    pub latest: JoinHandle<()>,
    pub log: JoinHandle<()>,
}

/// Start the base node's fusion, distribution and sink consumer tasks.
pub fn spawn_pipeline<S, A>(
    channels: Arc<PipelineChannels>,
    mut fusion: FusionStage<S>,
    distributor: Distributor,
    latest: Arc<LatestValues>,
    mut log: LogWriter<A>,
) -> Result<PipelineTasks>
where
    S: StoragePort + Send + 'static,
    A: LogAppender + 'static,
{
    let fusion = spawn_on_core(Core::App, 5, 6, "fusion\0", move || {
        loop {
            fusion.run_cycle();
        }
    })?;
    let distributor = spawn_on_core(Core::App, 4, 4, "distrib\0", move || distributor.run())?;
    let ch = channels.clone();
    let latest = spawn_on_core(Core::App, 2, 3, "latest\0", move || latest.run(&ch))?;
    let log = spawn_on_core(Core::App, 2, 6, "logger\0", move || log.run(&channels))?;
    Ok(PipelineTasks {
        fusion,
        distributor,
        latest,
        log,
    })
}
