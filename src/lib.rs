//! adhan_flow: core library for the Adhan scheduler.
//!
//! Tracks today's prayer times, interrupts background music for the Adhan,
//! and resumes the playlist after a fixed delay. The CLI consumes this crate.

pub mod audio_runtime;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod player;
pub mod playlist;
pub mod schedule;
pub mod source;
pub mod testing;
pub mod ticker;
pub mod track;
pub mod worker;

pub use error::{Error, Result};
