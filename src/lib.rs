//! procsentinel - process table monitoring library
//!
//! Snapshots the process table on a fixed interval, diffs consecutive
//! snapshots, and publishes created / terminated / modified events.

pub mod cli;
pub mod config;
pub mod constants;
pub mod filter;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod output;
pub mod supervisor;
