//! Reading pipeline: acquisition → fan-in fusion → fan-out distribution.
//!
//! Stage ordering is carried entirely by queue dependencies; no stage
//! relies on task priorities to run before another.

pub mod acquisition;
pub mod channels;
pub mod distributor;
pub mod fusion_stage;
pub mod latest;

pub use acquisition::{Acquisition, SharedSensor};
pub use channels::{PipelineChannels, SinkId, block_on_timeout};
pub use distributor::{Distributor, FanOut};
pub use fusion_stage::{CycleOutcome, FanInTiming, FusionStage};
pub use latest::LatestValues;
