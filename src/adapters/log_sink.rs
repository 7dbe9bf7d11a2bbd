//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::pipeline::CycleOutcome;
use crate::scheduler::{IdleOutcome, SleepPlan};

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { role, history_len } => {
                info!("START | role={:?} history={}/3", role, history_len);
            }
            AppEvent::Fused(CycleOutcome::Published(s)) => {
                let r = s.reading;
                info!(
                    "FUSED | T={:.2}\u{00b0}C H={:.1}% P={} batt={} ts={}",
                    r.temperature_c,
                    r.humidity_pct,
                    r.pressure_hpa.map_or_else(|| "-".into(), |p| format!("{:.1}hPa", p)),
                    s.battery_pct.map_or_else(|| "-".into(), |b| format!("{}%", b)),
                    r.timestamp,
                );
            }
            AppEvent::Fused(CycleOutcome::NoData) => warn!("FUSED | no data this cycle"),
            AppEvent::Fused(CycleOutcome::Dropped(s)) => {
                warn!("FUSED | dropped ts={}", s.reading.timestamp);
            }
            AppEvent::Sent { delivered } => {
                if *delivered {
                    info!("LINK  | delivered");
                } else {
                    warn!("LINK  | lost");
                }
            }
            AppEvent::ExchangeTimedOut => warn!("LINK  | exchange timed out"),
            AppEvent::RefreshSkipped => info!("CYCLE | remote refresh skipped"),
            AppEvent::Rendered { screen, samples } => {
                info!("DRAW  | screen={:?} new_samples={}", screen, samples);
            }
            AppEvent::Sleeping(SleepPlan::Aligned(secs)) => info!("SLEEP | {}s to boundary", secs),
            AppEvent::Sleeping(SleepPlan::Overnight(secs)) => info!("SLEEP | {}s overnight", secs),
            AppEvent::Idle(IdleOutcome::Completed(end)) => info!("IDLE  | {:?}", end),
            AppEvent::Idle(IdleOutcome::Recovered(end)) => warn!("IDLE  | recovered, {:?}", end),
            AppEvent::Idle(IdleOutcome::Restarted(fault)) => error!("IDLE  | restart: {}", fault),
        }
    }
}
