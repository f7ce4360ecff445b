//! # wayfinder-server
//!
//! HTTP server library for the wayfinder indoor positioning engine.
//!
//! This library provides the API handlers and state management for wayfinder.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod event_log;
pub mod logging;
pub mod state;
