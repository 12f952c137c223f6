//! fm_playout — timed playout of an audio queue through a PiFmRds transmitter.
//!
//! The scheduler, its run state and the progress snapshot live here. The CLI
//! consumes this crate.

pub mod config;
pub mod error;
pub mod library;
pub mod media_info;
pub mod queue;
pub mod rds;
pub mod request;
pub mod scheduler;
pub mod snapshot;
pub mod track;
pub mod transmitter;
