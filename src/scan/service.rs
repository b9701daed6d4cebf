use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::Mutex,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    storage::{
        entities::{AppSettings, GitActivity, GitScanResult},
        git_store::GitActivityStore,
    },
    utils::clock::Clock,
};

/// Discovery stops descending this many levels below a workspace root, so a
/// misconfigured root can't send the scan through an entire filesystem.
const MAX_DISCOVERY_DEPTH: usize = 4;

/// Upper bound on commits examined per repository in one pass. Keeps the
/// first scan of a huge history from doing unbounded work.
const COMMIT_CAP: usize = 1000;

const GIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack subtracted from the incremental scan boundary. Commits land with
/// author dates slightly out of order; re-reading an hour of history is free
/// because of the dedup check.
const BOUNDARY_SLACK: chrono::Duration = chrono::Duration::hours(1);

/// One commit as parsed from `git log` output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CommitInfo {
    hash: String,
    author: String,
    date: DateTime<Utc>,
    message: String,
}

/// Walks workspace roots, lists commits and records the ones not seen
/// before. One instance per process; invocations are serialized through an
/// internal guard.
pub struct GitScanService<G> {
    git_store: G,
    clock: Box<dyn Clock>,
    scan_guard: Mutex<()>,
}

impl<G: GitActivityStore + Sync + Send> GitScanService<G> {
    pub fn new(git_store: G, clock: Box<dyn Clock>) -> Self {
        Self {
            git_store,
            clock,
            scan_guard: Mutex::new(()),
        }
    }

    /// Runs one full scan, waiting for any scan already in flight.
    #[instrument(skip(self, settings))]
    pub async fn scan(&self, settings: &AppSettings) -> GitScanResult {
        let _guard = self.scan_guard.lock().await;
        self.scan_inner(settings).await
    }

    /// Runs one full scan, or rejects with a status entry when another scan
    /// is already in flight.
    pub async fn try_scan(&self, settings: &AppSettings) -> GitScanResult {
        match self.scan_guard.try_lock() {
            Ok(_guard) => self.scan_inner(settings).await,
            Err(_) => GitScanResult::aborted("scan already in progress"),
        }
    }

    async fn scan_inner(&self, settings: &AppSettings) -> GitScanResult {
        let started = self.clock.instant();
        let mut result = GitScanResult::default();

        if settings.workspace_roots.is_empty() {
            result
                .errors
                .push("no workspace roots configured".to_string());
            result.scan_duration = started.elapsed();
            return result;
        }

        let session = match self.git_store.begin_scan().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to lock git activity store {e:?}");
                result.errors.push(format!("store lock failed: {e}"));
                result.scan_duration = started.elapsed();
                return result;
            }
        };

        let mut repositories = Vec::new();
        for root in &settings.workspace_roots {
            discover_repositories(root, MAX_DISCOVERY_DEPTH, &mut repositories, &mut result.errors);
        }
        result.repositories_found = repositories.len() as u32;

        for repo in repositories {
            match self.scan_repository(&repo).await {
                Ok((examined, added)) => {
                    result.commits_found += examined;
                    result.new_commits_added += added;
                }
                Err(e) => {
                    // a single bad repository must never abort the scan
                    warn!("Failed to scan {repo:?}: {e:?}");
                    result.errors.push(format!("{}: {e}", repo.display()));
                }
            }
        }

        if let Err(e) = session.release().await {
            warn!("Failed to release git activity store lock {e:?}");
        }

        result.scan_duration = started.elapsed();
        info!(
            "Scan finished: {} repos, {} commits examined, {} new, {} errors in {:?}",
            result.repositories_found,
            result.commits_found,
            result.new_commits_added,
            result.errors.len(),
            result.scan_duration
        );
        result
    }

    /// Returns `(commits examined, commits newly recorded)`.
    async fn scan_repository(&self, repo: &Path) -> Result<(u32, u32)> {
        let repo_key = repo.to_string_lossy().to_string();

        let since = self
            .git_store
            .latest_for_repo(&repo_key)
            .await?
            .map(|v| v - BOUNDARY_SLACK);

        let commits = list_commits(repo, since).await?;

        let mut added = 0u32;
        for commit in &commits {
            if self.git_store.exists(&repo_key, &commit.hash).await? {
                continue;
            }
            self.git_store
                .insert(GitActivity {
                    repo_path: repo_key.as_str().into(),
                    commit_hash: commit.hash.as_str().into(),
                    author: commit.author.as_str().into(),
                    message: commit.message.as_str().into(),
                    date: commit.date,
                })
                .await?;
            added += 1;
        }

        debug!("Scanned {repo:?}: {} commits, {} new", commits.len(), added);
        Ok((commits.len() as u32, added))
    }
}

/// Depth-bounded walk collecting directories that carry git metadata.
/// Discovery does not descend into a found repository. Unreadable
/// directories are reported and skipped.
fn discover_repositories(
    root: &Path,
    depth_left: usize,
    found: &mut Vec<PathBuf>,
    errors: &mut Vec<String>,
) {
    // `.git` may be a file for worktrees, so only check existence
    if root.join(".git").exists() {
        found.push(root.to_path_buf());
        return;
    }
    if depth_left == 0 {
        return;
    }

    let entries = match std::fs::read_dir(root) {
        Ok(v) => v,
        Err(e) => {
            errors.push(format!("{}: {e}", root.display()));
            return;
        }
    };

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let is_dir = entry.file_type().map(|v| v.is_dir()).unwrap_or(false);
        let hidden = path
            .file_name()
            .and_then(|v| v.to_str())
            .map(|v| v.starts_with('.'))
            .unwrap_or(false);
        if is_dir && !hidden {
            discover_repositories(&path, depth_left - 1, found, errors);
        }
    }
}

/// Lists commits reachable from the current branch head, newest first,
/// bounded by [COMMIT_CAP] and optionally by a `--since` boundary.
async fn list_commits(repo: &Path, since: Option<DateTime<Utc>>) -> Result<Vec<CommitInfo>> {
    let mut cmd = Command::new("git");
    cmd.arg("log")
        .arg("--format=%H|%an|%at|%s")
        .arg(format!("-n{COMMIT_CAP}"))
        .current_dir(repo)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(since) = since {
        cmd.arg(format!("--since={}", since.to_rfc3339()));
    }

    let mut child = cmd.spawn()?;

    let output = tokio::time::timeout(GIT_TIMEOUT, async {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("git stdout was not captured"))?;
        let mut reader = BufReader::new(stdout).lines();
        let mut commits = Vec::new();
        while let Ok(Some(line)) = reader.next_line().await {
            if let Some(commit) = parse_log_line(&line) {
                commits.push(commit);
            }
        }
        let status = child.wait().await?;
        Ok::<_, anyhow::Error>((commits, status))
    })
    .await;

    match output {
        Ok(Ok((commits, status))) if status.success() => Ok(commits),
        Ok(Ok((_, status))) => Err(anyhow!("git log exited with {status}")),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(anyhow!("git log timed out after {GIT_TIMEOUT:?}")),
    }
}

/// Parses one `%H|%an|%at|%s` line. Malformed lines yield `None`.
fn parse_log_line(line: &str) -> Option<CommitInfo> {
    let mut parts = line.splitn(4, '|');
    let hash = parts.next()?.trim();
    let author = parts.next()?;
    let timestamp = parts.next()?.parse::<i64>().ok()?;
    let message = parts.next().unwrap_or("");

    if hash.len() != 40 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(CommitInfo {
        hash: hash.to_string(),
        author: author.to_string(),
        date: Utc.timestamp_opt(timestamp, 0).single()?,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::process::Command;

    use anyhow::Result;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    use super::{discover_repositories, parse_log_line, GitScanService};
    use crate::{
        storage::{
            entities::AppSettings,
            git_store::{GitActivityStore, GitActivityStoreImpl},
        },
        utils::clock::DefaultClock,
    };

    fn git(repo: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(repo)
            .env("GIT_AUTHOR_NAME", "dev")
            .env("GIT_AUTHOR_EMAIL", "dev@example.com")
            .env("GIT_COMMITTER_NAME", "dev")
            .env("GIT_COMMITTER_EMAIL", "dev@example.com")
            .status()
            .expect("git should be runnable in tests");
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo_with_commits(root: &Path, name: &str, commits: usize) -> PathBuf {
        let repo = root.join(name);
        std::fs::create_dir_all(&repo).unwrap();
        git(&repo, &["init", "-q"]);
        for i in 0..commits {
            std::fs::write(repo.join(format!("file{i}.txt")), format!("{i}")).unwrap();
            git(&repo, &["add", "."]);
            git(&repo, &["commit", "-q", "-m", &format!("commit {i}")]);
        }
        repo
    }

    async fn service(dir: &Path) -> GitScanService<GitActivityStoreImpl> {
        let store = GitActivityStoreImpl::open(dir.join("state")).await.unwrap();
        GitScanService::new(store, Box::new(DefaultClock))
    }

    fn settings(roots: Vec<PathBuf>) -> AppSettings {
        AppSettings {
            workspace_roots: roots,
            ..AppSettings::default()
        }
    }

    #[test]
    fn test_parse_log_line() {
        let line = "0123456789abcdef0123456789abcdef01234567|dev|1530700000|fix: handle | in messages";
        let commit = parse_log_line(line).unwrap();
        assert_eq!(commit.author, "dev");
        assert_eq!(commit.message, "fix: handle | in messages");
        assert_eq!(commit.date.timestamp(), 1530700000);

        assert!(parse_log_line("garbage").is_none());
        assert!(parse_log_line("shorthash|dev|1530700000|msg").is_none());
        assert!(parse_log_line(
            "0123456789abcdef0123456789abcdef01234567|dev|not-a-number|msg"
        )
        .is_none());
    }

    #[test]
    fn test_discovery_is_depth_bounded() {
        let dir = tempdir().unwrap();
        let deep = dir
            .path()
            .join("a")
            .join("b")
            .join("c")
            .join("d")
            .join("e");
        std::fs::create_dir_all(deep.join(".git")).unwrap();
        let shallow = dir.path().join("repo");
        std::fs::create_dir_all(shallow.join(".git")).unwrap();

        let mut found = vec![];
        let mut errors = vec![];
        discover_repositories(dir.path(), 4, &mut found, &mut errors);

        assert_eq!(found, vec![shallow]);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_scan_records_new_commits() -> Result<()> {
        let dir = tempdir()?;
        let workspace = dir.path().join("workspace");
        init_repo_with_commits(&workspace, "project", 3);

        let service = service(dir.path()).await;
        let result = service.scan(&settings(vec![workspace])).await;

        assert_eq!(result.repositories_found, 1);
        assert_eq!(result.commits_found, 3);
        assert_eq!(result.new_commits_added, 3);
        assert!(result.errors.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_scan_adds_nothing() -> Result<()> {
        let dir = tempdir()?;
        let workspace = dir.path().join("workspace");
        init_repo_with_commits(&workspace, "project", 2);

        let service = service(dir.path()).await;
        let settings = settings(vec![workspace]);

        let first = service.scan(&settings).await;
        assert_eq!(first.new_commits_added, 2);

        let second = service.scan(&settings).await;
        assert_eq!(second.new_commits_added, 0);
        assert_eq!(second.repositories_found, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_dedup_holds_across_store_instances() -> Result<()> {
        let dir = tempdir()?;
        let workspace = dir.path().join("workspace");
        init_repo_with_commits(&workspace, "project", 1);

        // both stores open before any scan, so each starts with an empty index
        let service_a = service(dir.path()).await;
        let service_b = service(dir.path()).await;
        let settings = settings(vec![workspace]);

        let first = service_a.scan(&settings).await;
        assert_eq!(first.new_commits_added, 1);

        let second = service_b.scan(&settings).await;
        assert_eq!(second.new_commits_added, 0);

        let store = GitActivityStoreImpl::open(dir.path().join("state")).await?;
        let found = store
            .query_range(Utc::now() - Duration::days(1), Utc::now() + Duration::days(1))
            .await?;
        assert_eq!(found.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_root_reported_without_abort() -> Result<()> {
        let dir = tempdir()?;
        let workspace = dir.path().join("workspace");
        init_repo_with_commits(&workspace, "project", 1);

        let service = service(dir.path()).await;
        let missing = dir.path().join("does-not-exist");
        let result = service
            .scan(&settings(vec![missing.clone(), workspace]))
            .await;

        assert_eq!(result.repositories_found, 1);
        assert_eq!(result.new_commits_added, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with(&missing.display().to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_no_roots_configured() -> Result<()> {
        let dir = tempdir()?;
        let service = service(dir.path()).await;

        let result = service.scan(&settings(vec![])).await;

        assert_eq!(result.repositories_found, 0);
        assert_eq!(result.commits_found, 0);
        assert_eq!(result.new_commits_added, 0);
        assert_eq!(result.errors, vec!["no workspace roots configured"]);
        Ok(())
    }
}
