//! Peripheral helpers: the screen button and core-pinned task spawning.

pub mod button;
pub mod task_pin;
