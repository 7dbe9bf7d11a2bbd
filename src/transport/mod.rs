//! Outside → base link over a best-effort radio.
//!
//! ```text
//!  outside node                               base node
//!  ────────────                               ─────────
//!  SyncSender::send_with_retry ──SensorFrame──▶ FrameReceiver::on_frame_received
//!        ▲                                          │ (length, ignore window)
//!        │                                          ▼ Receipt
//!  AckListener::on_frame ◀──────ClockFrame──── FrameReceiver::run (task):
//!                                              reply if clock is plausible
//! ```
//!
//! The clock reply doubles as the acknowledgement.

pub mod frame;
pub mod receiver;
pub mod sender;

/// 6-byte radio (MAC) address.
pub type MacAddr = [u8; 6];

pub use frame::{ClockFrame, FrameError, SensorFrame};
pub use receiver::{FrameDisposition, FrameReceiver, Receipt};
pub use sender::{AckListener, RetryPolicy, RetryState, SyncSender};
