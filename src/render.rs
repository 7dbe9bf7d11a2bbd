//! Screen selection and the buffer the renderer draws from.
//!
//! Each [`Screen`] variant maps to one render routine on the display side;
//! the button cycles through them in order.

use core::time::Duration;

use crate::pipeline::channels::PipelineChannels;
use crate::reading::{Origin, Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    /// Inside and outside side by side, plus forecast.
    #[default]
    Overview,
    /// Outside reading with history detail.
    Outside,
    /// Inside reading with history detail.
    Inside,
}

impl Screen {
    pub const COUNT: usize = 3;

    pub const fn next(self) -> Self {
        match self {
            Self::Overview => Self::Outside,
            Self::Outside => Self::Inside,
            Self::Inside => Self::Overview,
        }
    }
}

/// Latest sample per origin, as drained from the render sink.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderBuffer {
    pub inside: Option<Sample>,
    pub outside: Option<Sample>,
}

impl RenderBuffer {
    pub fn absorb(&mut self, sample: Sample) {
        match sample.origin {
            Origin::Local => self.inside = Some(sample),
            Origin::Remote => self.outside = Some(sample),
        }
    }

    /// Pull everything queued for rendering, waiting up to `settle` for
    /// stragglers still passing through the distributor.
    pub fn drain_from(&mut self, channels: &PipelineChannels, settle: Duration) -> usize {
        let mut n = 0;
        while let Some(sample) = channels.render.take_timeout(settle) {
            self.absorb(sample);
            n += 1;
        }
        n
    }
}
