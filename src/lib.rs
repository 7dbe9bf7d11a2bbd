//! wxnode firmware library.
//!
//! Exposes the pipeline, transport and scheduling logic for integration
//! testing. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module, with host
//! simulation backends alongside.

#![deny(unused_must_use)]

pub mod app;
pub mod battery;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fusion;
pub mod history;
pub mod logstore;
pub mod pipeline;
pub mod reading;
pub mod render;
pub mod scheduler;
pub mod transport;

pub mod adapters;
pub mod drivers;
pub mod sensors;
