//! Durable state lives in a single application directory:
//!  - `records/` holds activity spans as JSON-lines files, one per UTC day.
//!  - `git-activity` holds every recorded commit as JSON lines.
//!  - `settings.json` and `categories.json` hold configuration.
//!
//! Files shared between the daemon and the cli are guarded with fs4 locks.

pub mod activity_store;
pub mod categories;
pub mod entities;
pub mod git_store;
pub mod settings;
