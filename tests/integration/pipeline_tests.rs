//! Acquisition → fusion → distribution → sinks, with scripted sensors.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wxnode::adapters::nvs::NvsAdapter;
use wxnode::app::ports::{SensorError, WallClock};
use wxnode::app::service::fusion_stage;
use wxnode::config::{NodeConfig, NodeRole};
use wxnode::history::HistoryStore;
use wxnode::logstore::{INSIDE_LOG, LogOutcome, LogWriter, OUTSIDE_LOG};
use wxnode::pipeline::{
    Acquisition, CycleOutcome, Distributor, LatestValues, PipelineChannels, SharedSensor,
};
use wxnode::reading::{Origin, Reading, Sample, SensorId};
use wxnode::transport::SensorFrame;

use crate::mock_hw::{FakeClock, MemLog, ScriptedSensor, T0, fast_config};

const CYCLE_WAIT: Duration = Duration::from_millis(500);

fn shared(sensor: ScriptedSensor) -> SharedSensor {
    Arc::new(Mutex::new(sensor))
}

fn outside_pair() -> Vec<SharedSensor> {
    vec![
        shared(ScriptedSensor::reading(SensorId::Bme280, 20.0, 50.0, Some(1013.2))),
        shared(ScriptedSensor::reading(SensorId::Sht4x, 22.0, 60.0, None)),
    ]
}

struct Rig {
    cfg: NodeConfig,
    channels: Arc<PipelineChannels>,
    clock: Arc<FakeClock>,
    history: Arc<HistoryStore<NvsAdapter>>,
    acquisition: Acquisition,
}

impl Rig {
    fn new(role: NodeRole, history: HistoryStore<NvsAdapter>) -> Self {
        let cfg = fast_config(role);
        let channels = Arc::new(PipelineChannels::new());
        let clock = FakeClock::new(T0);
        let acquisition = Acquisition::new(channels.clone(), clock.clone(), cfg.post_wait());
        Self {
            cfg,
            channels,
            clock,
            history: Arc::new(history),
            acquisition,
        }
    }

    fn outside() -> Self {
        Self::new(NodeRole::Outside, HistoryStore::empty(NvsAdapter::default()))
    }

    /// One full fan-in cycle over `sensors`.
    fn cycle(&self, sensors: &[SharedSensor]) -> CycleOutcome {
        self.channels.reset_fan_in();
        assert_eq!(self.acquisition.trigger(sensors), sensors.len());
        let mut stage = fusion_stage(
            &self.cfg,
            self.channels.clone(),
            self.history.clone(),
            self.clock.clone(),
            sensors.len(),
        );
        stage.run_cycle_timeout(CYCLE_WAIT)
    }
}

fn published(outcome: CycleOutcome) -> Sample {
    match outcome {
        CycleOutcome::Published(s) => s,
        other => panic!("expected a published sample, got {:?}", other),
    }
}

// ── Fan-in and fusion ─────────────────────────────────────────

#[test]
fn both_sensors_fuse_and_reach_the_outbound_sink() {
    let rig = Rig::outside();
    let sample = published(rig.cycle(&outside_pair()));

    assert_eq!(sample.origin, Origin::Local);
    assert!((sample.reading.temperature_c - 21.0).abs() < 1e-4);
    // SHT4x humidity corrected by 5 before averaging: (50 + 55) / 2
    assert!((sample.reading.humidity_pct - 52.5).abs() < 1e-4);
    assert_eq!(sample.reading.pressure_hpa, Some(1013.2));
    assert_eq!(sample.reading.timestamp, T0 as i32);

    let distributor = Distributor::for_role(NodeRole::Outside, rig.channels.clone(), rig.cfg.sink_wait());
    assert_eq!(distributor.drain(), 1);
    assert_eq!(rig.channels.outbound.try_take(), Some(sample));
    assert!(rig.channels.local_done.signaled());
}

#[test]
fn failed_barometer_degrades_to_sht_only() {
    let rig = Rig::outside();
    let sensors = vec![
        shared(ScriptedSensor::failing(SensorId::Bme280, SensorError::Bus)),
        shared(ScriptedSensor::reading(SensorId::Sht4x, 22.0, 60.0, None)),
    ];
    let sample = published(rig.cycle(&sensors));
    assert!((sample.reading.temperature_c - 22.0).abs() < 1e-4);
    assert!((sample.reading.humidity_pct - 55.0).abs() < 1e-4);
    assert_eq!(sample.reading.pressure_hpa, None);
    assert_eq!(rig.history.snapshot().len(), 1);
}

#[test]
fn no_answers_leave_history_untouched() {
    let rig = Rig::outside();
    let sensors = vec![
        shared(ScriptedSensor::failing(SensorId::Bme280, SensorError::Checksum)),
        shared(ScriptedSensor::failing(SensorId::Sht4x, SensorError::NotReady)),
    ];
    assert_eq!(rig.cycle(&sensors), CycleOutcome::NoData);
    assert!(rig.history.snapshot().is_empty());
    assert!(rig.channels.published.try_receive().is_err());
}

#[test]
fn battery_percentage_rides_on_local_samples() {
    let rig = Rig::outside();
    let sensors = outside_pair();
    rig.channels.reset_fan_in();
    rig.acquisition.trigger(&sensors);
    let mut stage = fusion_stage(
        &rig.cfg,
        rig.channels.clone(),
        rig.history.clone(),
        rig.clock.clone(),
        sensors.len(),
    )
    .with_battery(Box::new(|| Some(4.25_f32)));
    let sample = published(stage.run_cycle_timeout(CYCLE_WAIT));
    assert_eq!(sample.battery_pct, Some(100));
}

#[test]
fn clock_past_the_32_bit_range_saturates_the_stamp() {
    let rig = Rig::outside();
    rig.clock.set_unix(1 << 40);
    let sample = published(rig.cycle(&outside_pair()));
    assert_eq!(sample.reading.timestamp, i32::MAX);
}

// ── History blend and persistence ─────────────────────────────

#[test]
fn third_cycle_is_blended_with_history() {
    let rig = Rig::outside();
    let warm = |t: f32| vec![shared(ScriptedSensor::reading(SensorId::Bme280, t, 40.0, Some(1000.0)))];

    let first = published(rig.cycle(&warm(10.0)));
    let second = published(rig.cycle(&warm(12.0)));
    assert!((first.reading.temperature_c - 10.0).abs() < 1e-4);
    assert!((second.reading.temperature_c - 12.0).abs() < 1e-4);

    let third = published(rig.cycle(&warm(14.0)));
    // (4·14 + mean(10, 12, 14)) / 5
    assert!((third.reading.temperature_c - 13.6).abs() < 1e-4);
    assert!((third.reading.humidity_pct - 40.0).abs() < 1e-4);
    assert_eq!(rig.history.snapshot().len(), 3);
}

#[test]
fn history_survives_a_reboot() {
    let rig = Rig::outside();
    for _ in 0..3 {
        published(rig.cycle(&outside_pair()));
    }
    let before = rig.history.snapshot();
    let Rig { history, .. } = rig;
    let Ok(history) = Arc::try_unwrap(history) else {
        panic!("history still shared");
    };

    let rebooted = Rig::new(
        NodeRole::Outside,
        HistoryStore::load(history.into_storage(), T0 + 900, 3600),
    );
    assert_eq!(rebooted.history.snapshot(), before);

    // Same readings again: a full ring of identical values blends to itself.
    let sample = published(rebooted.cycle(&outside_pair()));
    assert!((sample.reading.temperature_c - 21.0).abs() < 1e-4);
    assert_eq!(rebooted.history.snapshot().len(), 3);
}

#[test]
fn stale_history_is_dropped_at_boot() {
    let store = HistoryStore::empty(NvsAdapter::default());
    for i in 0..3 {
        store.record(Reading {
            temperature_c: 40.0,
            humidity_pct: 10.0,
            pressure_hpa: None,
            timestamp: T0 as i32 + i,
        });
    }
    let reloaded = HistoryStore::load(store.into_storage(), T0 + 7200, 3600);
    assert!(reloaded.snapshot().is_empty());

    let rig = Rig::new(NodeRole::Outside, reloaded);
    let sample = published(rig.cycle(&outside_pair()));
    // no blending toward the stale 40 °C
    assert!((sample.reading.temperature_c - 21.0).abs() < 1e-4);
}

// ── Base-node sinks ───────────────────────────────────────────

fn remote(ts: i32) -> Sample {
    Sample {
        origin: Origin::Remote,
        reading: Reading {
            temperature_c: 3.25,
            humidity_pct: 88.5,
            pressure_hpa: Some(1008.4),
            timestamp: ts,
        },
        battery_pct: None,
    }
}

#[test]
fn base_fan_out_feeds_render_latest_and_log() {
    let channels = Arc::new(PipelineChannels::new());
    let cfg = fast_config(NodeRole::Base);
    let d = Distributor::for_role(NodeRole::Base, channels.clone(), cfg.sink_wait());

    let report = d.fan_out(remote(T0 as i32));
    assert_eq!(report.delivered, 3);
    assert!(report.dropped.is_empty());
    assert!(!channels.local_done.signaled());

    let latest = LatestValues::new();
    latest.update(channels.latest.try_take().unwrap());
    assert_eq!(latest.get(Origin::Remote), Some(remote(T0 as i32)));
    assert_eq!(latest.get(Origin::Local), None);

    let log = MemLog::default();
    let mut writer = LogWriter::new(log.clone());
    let sample = channels.log.try_take().unwrap();
    assert_eq!(writer.write(&sample), LogOutcome::Written);
    assert_eq!(
        log.rows(),
        vec![(OUTSIDE_LOG.to_owned(), "1700000000,3.25,88.5,1008.4,".to_owned())]
    );
    assert_eq!(channels.render.try_take(), Some(remote(T0 as i32)));
}

#[test]
fn base_completion_waits_for_the_log_row() {
    let channels = Arc::new(PipelineChannels::new());
    let cfg = fast_config(NodeRole::Base);
    let d = Distributor::for_role(NodeRole::Base, channels.clone(), cfg.sink_wait());
    let log = MemLog::default();
    let mut writer = LogWriter::new(log.clone());

    let mut local = remote(T0 as i32);
    local.origin = Origin::Local;
    assert_eq!(d.fan_out(local).delivered, 3);
    assert!(!channels.local_done.signaled());
    assert!(log.rows().is_empty());

    assert_eq!(writer.run_once(&channels, CYCLE_WAIT), Some(LogOutcome::Written));
    assert_eq!(log.rows().len(), 1);
    assert!(channels.local_done.signaled());
}

#[test]
fn log_rows_round_to_ten_seconds_and_split_by_origin() {
    let log = MemLog::default();
    let mut writer = LogWriter::new(log.clone());
    let mut local = remote(T0 as i32 + 14);
    local.origin = Origin::Local;
    local.reading.pressure_hpa = None;
    local.battery_pct = Some(77);
    assert_eq!(writer.write(&local), LogOutcome::Written);
    assert_eq!(
        log.rows(),
        vec![(INSIDE_LOG.to_owned(), "1700000010,3.25,88.5,,77".to_owned())]
    );
}

#[test]
fn remote_timestamp_at_end_of_range_is_logged() {
    let log = MemLog::default();
    let mut writer = LogWriter::new(log.clone());
    let bytes = SensorFrame::from_sample(&remote(i32::MAX - 1)).encode();
    let sample = SensorFrame::decode(&bytes).unwrap().into_sample();
    assert_eq!(writer.write(&sample), LogOutcome::Written);
    assert_eq!(
        log.rows(),
        vec![(OUTSIDE_LOG.to_owned(), "2147483640,3.25,88.5,1008.4,".to_owned())]
    );
}

#[test]
fn unset_clock_and_failing_storage_lose_only_the_row() {
    let log = MemLog::default();
    let mut writer = LogWriter::new(log.clone());
    assert_eq!(writer.write(&remote(12)), LogOutcome::Skipped);
    assert!(log.rows().is_empty());

    let broken = MemLog {
        fail: true,
        ..MemLog::default()
    };
    let mut writer = LogWriter::new(broken);
    assert_eq!(writer.write(&remote(T0 as i32)), LogOutcome::Failed);
}
