//! Contains logic for sampling the foreground application in different
//! environments. [GenericFocusSampler] is the main artifact of this module
//! that abstracts the operations.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::sync::Arc;

use anyhow::Result;
#[cfg(test)]
use mockall::automock;

/// Identity of the application currently holding input focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    /// Stable key for the application. On macOS-like systems this is the
    /// bundle identifier; on the supported backends it is the full path to
    /// the focused process executable.
    pub app_id: Arc<str>,
    /// Human readable name, e.g. 'firefox' or 'Xcode'.
    pub app_name: Arc<str>,
}

/// Capability for observing foreground focus. The monitor loop only talks to
/// this trait, so it can be driven by a scripted sequence of samples in tests.
#[cfg_attr(test, automock)]
pub trait FocusSampler: Send + 'static {
    fn sample(&mut self) -> Result<AppIdentity>;

    /// Retrieve amount of time the user has been inactive in milliseconds.
    fn idle_time_ms(&mut self) -> Result<u32>;
}

/// Serves as a cross-compatible [FocusSampler] implementation.
pub struct GenericFocusSampler {
    inner: Box<dyn FocusSampler>,
}

impl GenericFocusSampler {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsFocusSampler;
                Ok(Self {
                    inner: Box::new(WindowsFocusSampler::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11FocusSampler;
                Ok(Self {
                    inner: Box::new(X11FocusSampler::new()?),
                })
            }
            else {
                // This runtime error is needed to allow the project to be compiled during testing.
                unimplemented!("No focus sampler backend was specified")
            }
        }
    }
}

impl FocusSampler for GenericFocusSampler {
    fn sample(&mut self) -> Result<AppIdentity> {
        self.inner.sample()
    }

    fn idle_time_ms(&mut self) -> Result<u32> {
        self.inner.idle_time_ms()
    }
}

/// Derives a display name from an executable path, e.g.
/// `/usr/bin/firefox` becomes `firefox`.
pub fn app_name_from_path(path: &str) -> Arc<str> {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|v| v.to_str())
        .unwrap_or(path)
        .into()
}
