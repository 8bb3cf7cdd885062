//! Historical train performance collector.
//!
//! Pulls per-service punctuality records from the National Rail Historical
//! Service Performance API for a set of routes and dates, and stores them
//! locally. Runs are resumable: interrupting a run and starting it again
//! repeats no completed work.

pub mod collector;
pub mod config;
pub mod domain;
pub mod hsp;
pub mod store;
