//! Personal productivity telemetry daemon. Watches which application holds
//! foreground focus, periodically scans configured workspaces for new git
//! commits, and turns both streams into a 0-100 focus score with per-app
//! usage statistics.
//!

pub mod cli;
pub mod daemon;
pub mod focus_api;
pub mod scan;
pub mod stats;
pub mod storage;
pub mod tracker;
pub mod utils;
