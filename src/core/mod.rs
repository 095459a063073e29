//! Core session components.
//!
//! This module contains the connection and session machinery:
//!
//! - **transport**: WebSocket text channel with a dedicated I/O thread
//! - **conn**: connection lifecycle state machine with backoff/retry
//! - **buffer**: wrapper around the external vt100 emulation buffer
//! - **session**: high-level persistent session combining all of it
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── Transport (WebSocket I/O thread -> event channel)
//! ├── ConnectionController (connect / backoff / give up / reset)
//! ├── EmulationBuffer (vt100 grid + scrollback)
//! └── StatusHub (status subscribers)
//! ```

pub mod buffer;
pub mod conn;
pub mod session;
pub mod transport;
