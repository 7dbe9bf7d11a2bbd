//! Whole-cycle behaviour of both node roles over mock adapters.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use wxnode::adapters::nvs::NvsAdapter;
use wxnode::app::events::AppEvent;
use wxnode::app::ports::{SensorError, WallClock};
use wxnode::app::service::{BaseNode, OutsideNode, fusion_stage, spawn_pipeline};
use wxnode::config::{NodeConfig, NodeRole};
use wxnode::diagnostics::RestartLog;
use wxnode::history::HistoryStore;
use wxnode::logstore::{INSIDE_LOG, LogWriter, OUTSIDE_LOG};
use wxnode::pipeline::{CycleOutcome, Distributor, LatestValues, PipelineChannels, SharedSensor};
use wxnode::reading::{Origin, Reading, Sample, SensorId};
use wxnode::render::Screen;
use wxnode::scheduler::{
    IdleEnd, IdleOutcome, IdlePhase, IdleSignals, IdleSupervisor, SleepPlan, ThreadIdleLauncher,
    UiState,
};
use wxnode::transport::{AckListener, FrameReceiver, RetryPolicy, SensorFrame, SyncSender};

use crate::mock_hw::{
    BASE_MAC, CountingRefresh, FakeClock, MemLog, OUTSIDE_MAC, PeerReply, RecordingPlatform,
    RecordingRadio, RecordingRenderer, RecordingSink, ScriptedSensor, T0, fast_config,
};

fn shared(sensor: ScriptedSensor) -> SharedSensor {
    Arc::new(Mutex::new(sensor))
}

/// Poll `cond` until it holds or a second has passed.
fn eventually(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// ── Outside node ──────────────────────────────────────────────

struct OutsideRig {
    node: OutsideNode<Arc<RecordingRadio>, NvsAdapter>,
    radio: Arc<RecordingRadio>,
    clock: Arc<FakeClock>,
    platform: Arc<RecordingPlatform>,
}

fn outside_rig(sensors: Vec<SharedSensor>, replies: &[PeerReply]) -> OutsideRig {
    let cfg = fast_config(NodeRole::Outside);
    let radio = RecordingRadio::scripted(replies);
    let acks = Arc::new(AckListener::new(BASE_MAC));
    radio.deliver_acks_to(acks.clone());
    let clock = FakeClock::new(T0);
    let platform = RecordingPlatform::new();
    let sender = SyncSender::new(radio.clone(), RetryPolicy::from_config(&cfg), acks, clock.clone());
    let history = Arc::new(HistoryStore::empty(NvsAdapter::default()));
    let node = OutsideNode::new(cfg, sensors, history, sender, clock.clone(), platform.clone());
    OutsideRig {
        node,
        radio,
        clock,
        platform,
    }
}

fn outside_sensors() -> Vec<SharedSensor> {
    vec![
        shared(ScriptedSensor::reading(SensorId::Bme280, 4.0, 80.0, Some(1011.0))),
        shared(ScriptedSensor::reading(SensorId::Sht4x, 4.5, 90.0, None)),
    ]
}

#[test]
fn outside_cycle_delivers_and_takes_time_from_the_ack() {
    let mut rig = outside_rig(outside_sensors(), &[PeerReply::Silent, PeerReply::Ack(T0 as i32 + 30)]);
    let mut sink = RecordingSink::new();

    let report = rig.node.run_cycle(&mut sink);
    let CycleOutcome::Published(sample) = report.fusion else {
        panic!("no sample published: {:?}", report.fusion);
    };
    assert_eq!(report.delivered, Some(true));
    assert_eq!(rig.radio.send_count(), 2);
    assert_eq!(rig.clock.now_unix(), T0 + 30);

    let frame = SensorFrame::decode(&rig.radio.sent()[0].1).unwrap();
    assert_eq!(frame, SensorFrame::from_sample(&sample));
    assert!((frame.temperature_c - 4.25).abs() < 1e-4);
    assert!((frame.humidity_pct - 82.5).abs() < 1e-4);

    assert_eq!(
        sink.events,
        vec![
            AppEvent::Fused(CycleOutcome::Published(sample)),
            AppEvent::Sent { delivered: true },
        ]
    );
}

#[test]
fn outside_cycle_without_sensors_sends_nothing() {
    let sensors = vec![
        shared(ScriptedSensor::failing(SensorId::Bme280, SensorError::Bus)),
        shared(ScriptedSensor::failing(SensorId::Sht4x, SensorError::Bus)),
    ];
    let mut rig = outside_rig(sensors, &[]);
    let mut sink = RecordingSink::new();

    let report = rig.node.run_cycle(&mut sink);
    assert_eq!(report.fusion, CycleOutcome::NoData);
    assert_eq!(report.delivered, None);
    assert_eq!(rig.radio.send_count(), 0);
}

#[test]
fn lost_reading_is_not_retried_next_cycle() {
    let mut rig = outside_rig(outside_sensors(), &[PeerReply::Silent; 3]);
    let mut sink = RecordingSink::new();

    assert_eq!(rig.node.run_cycle(&mut sink).delivered, Some(false));
    assert_eq!(rig.radio.send_count(), 3);
    assert!(rig.node.channels().outbound.is_empty());
    assert_eq!(rig.clock.now_unix(), T0);
}

#[test]
fn outside_sleep_lands_on_the_next_quarter_hour() {
    let mut rig = outside_rig(outside_sensors(), &[PeerReply::Ack(T0 as i32 + 30)]);
    let mut sink = RecordingSink::new();
    rig.node.run_cycle(&mut sink);

    // T0 is 800 s past a quarter hour; the ack moved the clock on by 30 s.
    let plan = rig.node.sleep(&mut sink);
    assert_eq!(plan, SleepPlan::Aligned(70));
    assert_eq!(rig.platform.sleeps(), vec![Duration::from_secs(70)]);
    assert_eq!(sink.events.last(), Some(&AppEvent::Sleeping(SleepPlan::Aligned(70))));
}

// ── Base node ─────────────────────────────────────────────────

struct BaseRig {
    cfg: NodeConfig,
    node: BaseNode<ThreadIdleLauncher, NvsAdapter>,
    channels: Arc<PipelineChannels>,
    receiver: Arc<FrameReceiver<Arc<RecordingRadio>>>,
    radio: Arc<RecordingRadio>,
    signals: &'static IdleSignals,
    ui: Arc<UiState>,
    renderer: RecordingRenderer,
    latest: Arc<LatestValues>,
    log: MemLog,
}

fn base_rig() -> BaseRig {
    let cfg = fast_config(NodeRole::Base);
    let channels = Arc::new(PipelineChannels::new());
    let clock = FakeClock::new(T0);
    let platform = RecordingPlatform::new();
    let radio = RecordingRadio::new();
    let receiver = Arc::new(FrameReceiver::new(
        radio.clone(),
        channels.clone(),
        clock.clone(),
        cfg.ignore_window_ms,
    ));
    let task = receiver.clone();
    std::thread::spawn(move || task.run());

    let sensors = vec![shared(ScriptedSensor::reading(SensorId::Sht4x, 22.4, 45.0, None))];
    let history = Arc::new(HistoryStore::empty(NvsAdapter::default()));
    let fusion = fusion_stage(&cfg, channels.clone(), history, clock.clone(), sensors.len());
    let distributor = Distributor::for_role(NodeRole::Base, channels.clone(), cfg.sink_wait());
    let latest = Arc::new(LatestValues::new());
    let log = MemLog::default();
    spawn_pipeline(channels.clone(), fusion, distributor, latest.clone(), LogWriter::new(log.clone()))
        .unwrap();

    let signals: &'static IdleSignals = Box::leak(Box::new(IdleSignals::new()));
    let ui = Arc::new(UiState::new());
    let phase = Arc::new(IdlePhase::new(
        &cfg,
        signals,
        channels.clone(),
        ui.clone(),
        clock.clone(),
        platform.clone(),
    ));
    let supervisor = IdleSupervisor::new(
        ThreadIdleLauncher::new(phase),
        signals,
        cfg.idle_ceiling(),
        RestartLog::open(NvsAdapter::default()),
        clock.clone(),
        platform,
    );
    let renderer = RecordingRenderer::default();
    let node = BaseNode::new(
        cfg.clone(),
        channels.clone(),
        sensors,
        ui.clone(),
        Box::new(renderer.clone()),
        supervisor,
        clock,
    );
    BaseRig {
        cfg,
        node,
        channels,
        receiver,
        radio,
        signals,
        ui,
        renderer,
        latest,
        log,
    }
}

fn outside_frame() -> Vec<u8> {
    let sample = Sample::local(
        Reading {
            temperature_c: 4.25,
            humidity_pct: 85.0,
            pressure_hpa: Some(1011.0),
            timestamp: T0 as i32 + 5,
        },
        Some(64),
    );
    SensorFrame::from_sample(&sample).encode().to_vec()
}

#[test]
fn base_cycle_renders_local_and_remote_samples() {
    let mut rig = base_rig();
    let mut sink = RecordingSink::new();
    rig.receiver.on_frame_received(&OUTSIDE_MAC, &outside_frame());

    let report = rig.node.run_cycle(&mut sink);
    assert!(report.exchanged);
    assert!(report.local_done);
    // completion is only released once the inside row is on disk
    assert!(rig.log.rows().iter().any(|(path, _)| path == INSIDE_LOG));
    assert!(!report.refreshed);
    assert_eq!(report.drained, 2);

    let buffer = rig.node.buffer();
    let inside = buffer.inside.unwrap();
    assert!((inside.reading.temperature_c - 22.0).abs() < 1e-4);
    assert!((inside.reading.humidity_pct - 40.0).abs() < 1e-4);
    assert_eq!(buffer.outside.unwrap().battery_pct, Some(64));

    let frames = rig.renderer.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0, Screen::Overview);
    assert_eq!(sink.events, vec![AppEvent::Rendered { screen: Screen::Overview, samples: 2 }]);

    // the peer got the time back
    assert_eq!(rig.radio.send_count(), 1);

    assert!(eventually(|| rig.log.rows().len() == 2));
    let mut paths: Vec<String> = rig.log.rows().into_iter().map(|(p, _)| p).collect();
    paths.sort();
    assert_eq!(paths, vec![INSIDE_LOG.to_owned(), OUTSIDE_LOG.to_owned()]);
    assert!(eventually(|| rig.latest.get(Origin::Local).is_some()
        && rig.latest.get(Origin::Remote).is_some()));
}

#[test]
fn base_cycle_gives_up_on_a_silent_peer() {
    let mut rig = base_rig();
    let mut sink = RecordingSink::new();

    let started = Instant::now();
    let report = rig.node.run_cycle(&mut sink);
    assert!(started.elapsed() >= rig.cfg.exchange_wait());
    assert!(!report.exchanged);
    assert!(report.local_done);
    assert_eq!(report.drained, 1);
    assert!(rig.node.buffer().outside.is_none());
    assert_eq!(sink.events[0], AppEvent::ExchangeTimedOut);
}

#[test]
fn short_idle_skips_the_next_refresh() {
    let rig = base_rig();
    let refresh = CountingRefresh::default();
    let BaseRig { node, channels, ui, receiver, .. } = rig;
    let mut node = node.with_refresh(Box::new(refresh.clone()));
    let mut sink = RecordingSink::new();

    ui.set_skip_refetch(true);
    channels.exchange_complete.signal(());
    let report = node.run_cycle(&mut sink);
    assert!(!report.refreshed);
    assert_eq!(refresh.calls.load(Ordering::SeqCst), 0);
    assert!(sink.events.contains(&AppEvent::RefreshSkipped));

    ui.set_skip_refetch(false);
    receiver.on_frame_received(&OUTSIDE_MAC, &outside_frame());
    let report = node.run_cycle(&mut sink);
    assert!(report.refreshed);
    assert_eq!(refresh.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn button_ends_idle_and_switches_screen() {
    let mut rig = base_rig();
    let mut sink = RecordingSink::new();

    rig.signals.button.signal(());
    let outcome = rig.node.idle(&mut sink);

    assert_eq!(outcome, IdleOutcome::Completed(IdleEnd::Button));
    assert_eq!(rig.ui.screen(), Screen::Outside);
    // pressed straight away: the next cycle should not refetch
    assert!(rig.ui.skip_refetch());
    assert!(rig.channels.exchange_complete.signaled());
    assert_eq!(
        sink.events,
        vec![
            AppEvent::Sleeping(SleepPlan::Aligned(100)),
            AppEvent::Idle(IdleOutcome::Completed(IdleEnd::Button)),
        ]
    );
    assert_eq!(rig.node.supervisor().restart_log().count(), 0);
}

#[test]
fn button_press_short_circuits_the_next_exchange_wait() {
    let mut rig = base_rig();
    let mut sink = RecordingSink::new();

    rig.signals.button.signal(());
    rig.node.idle(&mut sink);

    let started = Instant::now();
    let report = rig.node.run_cycle(&mut sink);
    assert!(report.exchanged);
    assert!(started.elapsed() < rig.cfg.exchange_wait());
    assert_eq!(rig.renderer.frames().last().unwrap().0, Screen::Outside);
}
