//! autosort - sort a flat directory into category folders by file extension
//!
//! This library provides the extension-based categorizer, the sort engine that
//! moves files into `target/<category>/` (optionally `target/<category>/<ext>/`),
//! a scheduler that runs the engine once or on a fixed period without blocking
//! the caller, and TOML-backed settings for all of it.

pub mod categories;
pub mod cli;
pub mod config;
pub mod logging;
pub mod output;
pub mod scheduler;
pub mod sorter;

pub use categories::{CategoryError, CategoryMap, FALLBACK_CATEGORY};
pub use config::{ConfigError, SorterConfig};
pub use scheduler::{
    IntervalPeriod, Notification, RunFailure, RunReport, RunTicket, ScheduleHandle, Scheduler,
    StartStatus, StopStatus,
};
pub use sorter::{
    ExtensionlessPlacement, FileMoveError, LogSink, RunStats, SortEngine, SortError, SortRequest,
    SortRunResult,
};
