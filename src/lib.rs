//! Flutter Butler host library
//!
//! Runs the protection engine against a simulated device and speaks the channel
//! protocol as NDJSON over stdio.

pub mod headless;

pub use headless::{run_headless, serve, HeadlessOptions};
