use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identity recorded while the session is idle or sitting on the lock
/// screen. Spans carrying it are excluded from every aggregate.
pub const LOGIN_WINDOW_APP_ID: &str = "com.apple.loginwindow";

/// One contiguous span of foreground use of a single application. Stored on
/// disk as an interval rather than raw samples to keep record files small.
/// Immutable once written.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize, Clone)]
pub struct ActivityLog {
    pub app_id: Arc<str>,
    pub app_name: Arc<str>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "duration_ser")]
    pub duration: Duration,
}

impl ActivityLog {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.duration
    }

    pub fn is_idle(&self) -> bool {
        &*self.app_id == LOGIN_WINDOW_APP_ID
    }

    /// Splits a span into 2 halves, 1 before split, 1 after. Used to cut
    /// spans down to a queried window.
    pub fn split_by(self, split: DateTime<Utc>) -> (Option<ActivityLog>, Option<ActivityLog>) {
        let end = self.end();
        if split < self.start {
            (None, Some(self))
        } else if split >= end {
            (Some(self), None)
        } else {
            let before = ActivityLog {
                app_id: self.app_id.clone(),
                app_name: self.app_name.clone(),
                start: self.start,
                duration: split - self.start,
            };
            let after = ActivityLog {
                app_id: self.app_id,
                app_name: self.app_name,
                start: split,
                duration: end - split,
            };
            (Some(before), Some(after))
        }
    }

    /// Returns usage restricted to `[from, to)`. A span entirely outside the
    /// window, or touching it only at a boundary, yields `None`.
    pub fn clamp(self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<ActivityLog> {
        self.split_by(from)
            .1
            .and_then(|v| v.split_by(to).0)
            .filter(|v| v.duration > Duration::zero())
    }

    pub fn with_duration(self, duration: Duration) -> Self {
        Self { duration, ..self }
    }
}

mod duration_ser {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(s))
    }
}

/// Productivity classification of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Productive,
    Neutral,
    Distracting,
}

impl Category {
    pub fn weight(&self, weights: &CategoryWeights) -> f64 {
        match self {
            Category::Productive => weights.productive,
            Category::Neutral => weights.neutral,
            Category::Distracting => weights.distracting,
        }
    }
}

/// Policy table mapping categories to score weights. The exact values are
/// user policy, so they live in [AppSettings] rather than in code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub productive: f64,
    pub neutral: f64,
    pub distracting: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            productive: 1.0,
            neutral: 0.5,
            distracting: 0.0,
        }
    }
}

/// User- or default-assigned classification of one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCategory {
    pub app_id: Arc<str>,
    pub app_name: Arc<str>,
    pub category: Category,
    #[serde(default)]
    pub is_default: bool,
}

/// One recorded commit observed during a scan. `(repo_path, commit_hash)`
/// is unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitActivity {
    pub repo_path: Arc<str>,
    pub commit_hash: Arc<str>,
    pub author: Arc<str>,
    pub message: Arc<str>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
}

/// Process-wide configuration. Exactly one logical instance, created with
/// defaults at first run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub auto_scan_enabled: bool,
    /// 0 means manual-only: the scheduler never triggers scans itself.
    pub git_scan_frequency_hours: u32,
    pub workspace_roots: Vec<PathBuf>,
    #[serde(default)]
    pub weights: CategoryWeights,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            auto_scan_enabled: true,
            git_scan_frequency_hours: 6,
            workspace_roots: vec![],
            weights: CategoryWeights::default(),
        }
    }
}

/// Summary of one scan invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitScanResult {
    pub repositories_found: u32,
    pub commits_found: u32,
    pub new_commits_added: u32,
    pub scan_duration: std::time::Duration,
    /// One entry per failed repository or step; empty on full success.
    pub errors: Vec<String>,
}

impl GitScanResult {
    /// Result for a scan that could not start at all.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            errors: vec![reason.into()],
            ..Self::default()
        }
    }
}

/// Per-application usage total, derived fresh for every aggregation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppUsageStat {
    pub app_id: Arc<str>,
    pub app_name: Arc<str>,
    pub total: Duration,
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::ActivityLog;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap()
    }

    fn log(offset_s: i64, duration_s: i64) -> ActivityLog {
        ActivityLog {
            app_id: "xcode".into(),
            app_name: "Xcode".into(),
            start: base() + Duration::seconds(offset_s),
            duration: Duration::seconds(duration_s),
        }
    }

    #[test]
    fn test_clamp_truncates_at_both_edges() {
        let clamped = log(0, 100)
            .clamp(base() + Duration::seconds(25), base() + Duration::seconds(75))
            .unwrap();
        assert_eq!(clamped.start, base() + Duration::seconds(25));
        assert_eq!(clamped.duration, Duration::seconds(50));
    }

    #[test]
    fn test_clamp_excludes_span_starting_at_window_end() {
        // touching the end boundary is not being inside the window
        assert_eq!(log(3600, 100).clamp(base(), base() + Duration::seconds(3600)), None);
    }

    #[test]
    fn test_clamp_excludes_span_ending_at_window_start() {
        assert_eq!(log(0, 100).clamp(base() + Duration::seconds(100), base() + Duration::seconds(200)), None);
    }
}
