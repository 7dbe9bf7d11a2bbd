//! Text renderer adapter.
//!
//! Implements [`Renderer`] by writing the selected screen as a short text
//! panel to the log. Stands in for the e-paper panel driver, which is
//! outside this crate.

use log::info;

use crate::app::ports::Renderer;
use crate::reading::Sample;
use crate::render::{RenderBuffer, Screen};

#[derive(Default)]
pub struct LogRenderer {
    frames: u32,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Screens drawn since boot.
    pub fn frames(&self) -> u32 {
        self.frames
    }
}

fn line(label: &str, sample: Option<&Sample>) -> String {
    match sample {
        None => format!("{label}: --"),
        Some(s) => {
            let r = s.reading;
            let mut out = format!("{label}: {:.1}C {:.0}%", r.temperature_c, r.humidity_pct);
            if let Some(p) = r.pressure_hpa {
                out.push_str(&format!(" {:.0}hPa", p));
            }
            if let Some(b) = s.battery_pct {
                out.push_str(&format!(" bat {}%", b));
            }
            out
        }
    }
}

/// One text line per sample the screen shows.
pub fn panel(screen: Screen, buffer: &RenderBuffer) -> Vec<String> {
    match screen {
        Screen::Overview => vec![
            line("out", buffer.outside.as_ref()),
            line("in", buffer.inside.as_ref()),
        ],
        Screen::Outside => vec![line("out", buffer.outside.as_ref())],
        Screen::Inside => vec![line("in", buffer.inside.as_ref())],
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, screen: Screen, buffer: &RenderBuffer) {
        self.frames += 1;
        for text in panel(screen, buffer) {
            info!("DISPLAY [{:?}] {}", screen, text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{Origin, Reading};

    fn outside() -> Sample {
        Sample {
            origin: Origin::Remote,
            reading: Reading {
                temperature_c: 4.26,
                humidity_pct: 81.4,
                pressure_hpa: Some(1009.6),
                timestamp: 1_700_000_000,
            },
            battery_pct: Some(77),
        }
    }

    #[test]
    fn overview_shows_both_origins() {
        let mut buffer = RenderBuffer::default();
        buffer.absorb(outside());
        let lines = panel(Screen::Overview, &buffer);
        assert_eq!(lines, vec!["out: 4.3C 81% 1010hPa bat 77%", "in: --"]);
    }

    #[test]
    fn detail_screen_shows_one_origin() {
        let buffer = RenderBuffer::default();
        assert_eq!(panel(Screen::Inside, &buffer), vec!["in: --"]);
    }

    #[test]
    fn counts_frames() {
        let mut r = LogRenderer::new();
        r.render(Screen::Outside, &RenderBuffer::default());
        r.render(Screen::Overview, &RenderBuffer::default());
        assert_eq!(r.frames(), 2);
    }
}
