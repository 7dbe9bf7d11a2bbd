//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one part of the node
//! against mock adapters. All tests run on the host with no real hardware.

mod mock_hw;
mod node_tests;
mod pipeline_tests;
mod transport_tests;
