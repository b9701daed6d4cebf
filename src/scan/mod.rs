//! Workspace scanning for coding activity. [service::GitScanService] walks
//! the configured workspace roots, extracts commit metadata through the git
//! cli, and records commits it has not seen before.
//! [scheduler::ScanScheduler] drives it on the configured cadence.

pub mod scheduler;
pub mod service;
