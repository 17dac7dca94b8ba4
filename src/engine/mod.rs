//! Core engine: the subscribe → filter → record → correlate → buy loop,
//! plus the trade executor and portfolio reporting it shares with the CLI.

pub mod correlator;
pub mod executor;
pub mod monitor;
pub mod portfolio;
