//! `metacash` — daemon mediating between an SSP6 cash-handling peripheral
//! bus (coin hopper + note validator) and a pub/sub message bus.
//!
//! See `transport`/`codec` for the protocol engine, `device`/`poll_loop`/
//! `translate` for per-peripheral state and event translation, and
//! `router`/`bus`/`supervisor` for the command-facing half.

pub mod bus;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod poll_loop;
pub mod router;
pub mod supervisor;
pub mod transport;
pub mod translate;
