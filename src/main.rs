//! wxnode Firmware — Main Entry Point
//!
//! One image, two roles. The role comes from the NVS config, falling back
//! to the preset selected at build time (`--features base` for the display
//! node).
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  Bme280 / Sht4x    EspNowRadio    NvsAdapter    SystemClock    │
//! │  (SensorSource)    (Radio)        (Config+NVS)  (WallClock)    │
//! │  FileLogAppender   LogRenderer    AdcBattery    SystemPlatform │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │   OutsideNode | BaseNode                               │    │
//! │  │   pipeline · fusion · history · transport              │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  DutyCycle scheduler · IdleSupervisor (stuck-idle recovery)    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use embedded_hal_bus::i2c::MutexDevice;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::prelude::*;
use log::{info, warn};

use wxnode::adapters::battery_adc::{AdcBattery, DEFAULT_VREF_MV};
use wxnode::adapters::file_log::{FileLogAppender, mount_spiffs};
use wxnode::adapters::log_display::LogRenderer;
use wxnode::adapters::log_sink::LogEventSink;
use wxnode::adapters::nvs::NvsAdapter;
use wxnode::adapters::platform::SystemPlatform;
use wxnode::adapters::radio::EspNowRadio;
use wxnode::adapters::time::SystemClock;
use wxnode::app::events::AppEvent;
use wxnode::app::ports::{ConfigPort, EventSink, Platform, SensorSource, WallClock};
use wxnode::app::service::{BaseNode, OutsideNode, fusion_stage, spawn_pipeline};
use wxnode::config::{NodeConfig, NodeRole};
use wxnode::diagnostics::RestartLog;
use wxnode::drivers::button;
use wxnode::drivers::task_pin::{Core, spawn_on_core};
use wxnode::history::HistoryStore;
use wxnode::logstore::LogWriter;
use wxnode::pipeline::{Distributor, LatestValues, PipelineChannels, SharedSensor};
use wxnode::scheduler::{IdlePhase, IdleSignals, IdleSupervisor, ThreadIdleLauncher, UiState};
use wxnode::sensors::{bme280, sht4x};
use wxnode::transport::{AckListener, FrameReceiver, RetryPolicy, SyncSender};

// ── Board pins ────────────────────────────────────────────────

const BUTTON_GPIO: i32 = 21;

/// Given by the debounced button ISR, consumed by the idle phase.
static IDLE_SIGNALS: IdleSignals = IdleSignals::new();

type SharedI2c = Mutex<I2cDriver<'static>>;

fn build_preset() -> NodeConfig {
    if cfg!(feature = "base") {
        NodeConfig::base()
    } else {
        NodeConfig::outside()
    }
}

fn load_config(nvs: &NvsAdapter) -> NodeConfig {
    let preset = build_preset();
    match nvs.load() {
        Ok(cfg) if cfg.role == preset.role => {
            info!("Config loaded from NVS");
            cfg
        }
        Ok(_) => {
            info!("No config for this role in NVS, using {:?} preset", preset.role);
            preset
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using {:?} preset", e, preset.role);
            preset
        }
    }
}

fn shared<S: SensorSource + 'static>(sensor: S) -> SharedSensor {
    Arc::new(Mutex::new(sensor))
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  wxnode v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    // ── 2. Config ─────────────────────────────────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            NvsAdapter::default()
        }
    };
    let cfg = load_config(&nvs);

    let clock: Arc<dyn WallClock> = Arc::new(SystemClock::new());
    let platform: Arc<dyn Platform> = Arc::new(SystemPlatform::new());
    let mut sink = LogEventSink::new();

    // ── 3. I2C bus shared by the sensor drivers ──────────────
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio17,
        peripherals.pins.gpio18,
        &I2cConfig::new().baudrate(100.kHz().into()),
    )?;
    let bus: &'static SharedI2c = Box::leak(Box::new(Mutex::new(i2c)));

    // ── 4. Radio ──────────────────────────────────────────────
    let radio = Arc::new(EspNowRadio::start(peripherals.modem, sysloop, cfg.peer)?);

    let history = Arc::new(HistoryStore::load(
        NvsAdapter::default(),
        clock.now_unix(),
        cfg.history_max_age_secs,
    ));
    sink.emit(&AppEvent::Started {
        role: cfg.role,
        history_len: history.snapshot().len() as u8,
    });

    match cfg.role {
        NodeRole::Outside => run_outside(cfg, bus, radio, history, clock, platform, &mut sink),
        NodeRole::Base => run_base(cfg, bus, radio, history, clock, platform, &mut sink),
    }
}

// ── Outside node ──────────────────────────────────────────────

fn run_outside(
    cfg: NodeConfig,
    bus: &'static SharedI2c,
    radio: Arc<EspNowRadio>,
    history: Arc<HistoryStore<NvsAdapter>>,
    clock: Arc<dyn WallClock>,
    platform: Arc<dyn Platform>,
    sink: &mut LogEventSink,
) -> Result<()> {
    let mut sensors = Vec::new();
    match bme280::Bme280::init(MutexDevice::new(bus), bme280::DEFAULT_ADDRESS) {
        Ok(bme) => sensors.push(shared(bme)),
        Err(e) => warn!("BME280 unavailable ({}), continuing with SHT4x only", e),
    }
    sensors.push(shared(sht4x::Sht4x::new(MutexDevice::new(bus), sht4x::DEFAULT_ADDRESS)));

    let acks = Arc::new(AckListener::new(cfg.peer));
    let listener = acks.clone();
    radio.on_receive(move |from, bytes| {
        let _ = listener.on_frame(from, bytes);
    })?;

    let sender = SyncSender::new(radio, RetryPolicy::from_config(&cfg), acks, clock.clone());
    let mut node = OutsideNode::new(cfg, sensors, history, sender, clock, platform);
    node.run(sink);
    Ok(())
}

// ── Base node ─────────────────────────────────────────────────

fn run_base(
    cfg: NodeConfig,
    bus: &'static SharedI2c,
    radio: Arc<EspNowRadio>,
    history: Arc<HistoryStore<NvsAdapter>>,
    clock: Arc<dyn WallClock>,
    platform: Arc<dyn Platform>,
    sink: &mut LogEventSink,
) -> Result<()> {
    let channels = Arc::new(PipelineChannels::new());

    let receiver = Arc::new(FrameReceiver::new(
        radio.clone(),
        channels.clone(),
        clock.clone(),
        cfg.ignore_window_ms,
    ));
    let callback = receiver.clone();
    radio.on_receive(move |from, bytes| {
        let _ = callback.on_frame_received(from, bytes);
    })?;
    let _receiver_task = spawn_on_core(Core::Pro, 4, 4, "espnow_rx\0", move || receiver.run())?;

    button::install(BUTTON_GPIO, &IDLE_SIGNALS.button)?;

    let sensors = vec![shared(sht4x::Sht4x::new(
        MutexDevice::new(bus),
        sht4x::DEFAULT_ADDRESS,
    ))];

    // Pipeline tasks: fusion → distributor → {render, latest, log}.
    let mut fusion = fusion_stage(&cfg, channels.clone(), history, clock.clone(), sensors.len());
    match AdcBattery::new(DEFAULT_VREF_MV) {
        Ok(battery) => fusion = fusion.with_battery(Box::new(battery)),
        Err(e) => warn!("Battery ADC unavailable ({})", e),
    }
    let distributor = Distributor::for_role(NodeRole::Base, channels.clone(), cfg.sink_wait());
    let root = mount_spiffs()?;
    let log = LogWriter::new(FileLogAppender::new(root, clock.clone(), cfg.utc_offset_secs));
    let latest = Arc::new(LatestValues::new());
    let _tasks = spawn_pipeline(channels.clone(), fusion, distributor, latest, log)?;

    // Idle phase under supervision.
    let ui = Arc::new(UiState::new());
    let phase = Arc::new(IdlePhase::new(
        &cfg,
        &IDLE_SIGNALS,
        channels.clone(),
        ui.clone(),
        clock.clone(),
        platform.clone(),
    ));
    let restart_log = RestartLog::open(NvsAdapter::default());
    for entry in restart_log.read_all() {
        warn!("Previous restart at {}: {}", entry.unix, entry.reason);
    }
    let supervisor = IdleSupervisor::new(
        ThreadIdleLauncher::new(phase),
        &IDLE_SIGNALS,
        cfg.idle_ceiling(),
        restart_log,
        clock.clone(),
        platform,
    );

    let mut node = BaseNode::new(
        cfg,
        channels,
        sensors,
        ui,
        Box::new(LogRenderer::new()),
        supervisor,
        clock,
    );
    node.run(sink);
    Ok(())
}
