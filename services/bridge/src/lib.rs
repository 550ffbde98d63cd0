//! Callbridge Server Library Crate
//!
//! This library contains all the core logic for the callbridge service: the
//! telephony frame codec, the PCM resampling pipeline, the per-call bridge
//! tasks (inbound forwarder, outbound dispatcher, AI event loop) and their
//! session supervisor, plus configuration, shared state, and routing. The
//! `bin/server.rs` binary is a thin wrapper around this library.

pub mod audio;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod frames;
pub mod resample;
pub mod router;
pub mod state;
pub mod tools;
pub mod ws;
