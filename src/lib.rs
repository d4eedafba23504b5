//! Bidirectional message bridge between a reference Discord deployment and
//! a Spacebar-compatible deployment.
//!
//! For each configured channel pair, text messages, edits, and deletions
//! are mirrored from one side to the other, with reply threading preserved
//! across the bridge through a persistent mapping of source message ids to
//! mirrored message ids.
//!
//! The binary (`main.rs`) is a thin orchestrator: load configuration, open
//! both pair stores, connect both gateway sessions, and run the two relay
//! loops in [`bridge::run`]. Everything else is exposed here as a library
//! so the formatter, pair store, and relay logic can be unit-tested without
//! a running gateway.

pub mod bridge;
pub mod config;
pub mod error;
pub mod formatter;
pub mod gateway;
pub mod io;
pub mod model;
pub mod pairstore;
pub mod rest;

mod serial;

pub use error::{Error, Result};
