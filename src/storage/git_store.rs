use std::{
    collections::{HashMap, HashSet},
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::PathBuf,
    sync::Mutex,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::warn;

use super::entities::GitActivity;

pub const GIT_ACTIVITY_FILE: &str = "git-activity";
pub const GIT_ACTIVITY_LOCK_FILE: &str = "git-activity.lock";

/// Durable store of observed commits. The scan service owns the write path.
/// `(repo_path, commit_hash)` is unique: [GitActivityStore::insert] must only
/// be called after [GitActivityStore::exists] came back false.
pub trait GitActivityStore {
    /// Takes the scan lock, serializing scans against every other process,
    /// and reloads the dedup index so commits they recorded are visible.
    /// Held until the returned session is released or dropped.
    fn begin_scan(&self) -> impl Future<Output = Result<ScanSession>> + Send;

    fn insert(&self, activity: GitActivity) -> impl Future<Output = Result<()>> + Send;

    fn exists(&self, repo_path: &str, hash: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Commit date of the newest recorded activity for a repository, used as
    /// the incremental scan boundary.
    fn latest_for_repo(
        &self,
        repo_path: &str,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>>> + Send;

    /// Commits with `date` in `[start, end)`, newest first.
    fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<GitActivity>>> + Send;
}

impl<T: Deref + Sync> GitActivityStore for T
where
    T::Target: GitActivityStore + Sync,
{
    fn begin_scan(&self) -> impl Future<Output = Result<ScanSession>> + Send {
        self.deref().begin_scan()
    }

    fn insert(&self, activity: GitActivity) -> impl Future<Output = Result<()>> + Send {
        self.deref().insert(activity)
    }

    fn exists(&self, repo_path: &str, hash: &str) -> impl Future<Output = Result<bool>> + Send {
        self.deref().exists(repo_path, hash)
    }

    fn latest_for_repo(
        &self,
        repo_path: &str,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>>> + Send {
        self.deref().latest_for_repo(repo_path)
    }

    fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<GitActivity>>> + Send {
        self.deref().query_range(start, end)
    }
}

/// Exclusive hold on the scan lock file. Dropping it releases the lock.
pub struct ScanSession {
    lock: File,
}

impl ScanSession {
    /// Releases the lock eagerly instead of waiting for drop.
    pub async fn release(self) -> Result<()> {
        self.lock.unlock_async().await?;
        Ok(())
    }
}

#[derive(Default)]
struct DedupIndex {
    seen: HashSet<(String, String)>,
    latest: HashMap<String, DateTime<Utc>>,
}

impl DedupIndex {
    fn record(&mut self, activity: &GitActivity) {
        self.seen.insert((
            activity.repo_path.to_string(),
            activity.commit_hash.to_string(),
        ));
        let entry = self
            .latest
            .entry(activity.repo_path.to_string())
            .or_insert(activity.date);
        if activity.date > *entry {
            *entry = activity.date;
        }
    }
}

/// The main realization of [GitActivityStore]. One JSON-lines file with an
/// in-memory `(repo, hash)` index built at open time so dedup checks don't
/// touch the disk.
pub struct GitActivityStoreImpl {
    path: PathBuf,
    lock_path: PathBuf,
    index: Mutex<DedupIndex>,
}

impl GitActivityStoreImpl {
    pub async fn open(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(GIT_ACTIVITY_FILE);
        let lock_path = dir.join(GIT_ACTIVITY_LOCK_FILE);

        let mut index = DedupIndex::default();
        for activity in read_all(&path).await? {
            index.record(&activity);
        }

        Ok(Self {
            path,
            lock_path,
            index: Mutex::new(index),
        })
    }
}

async fn read_all(path: &PathBuf) -> Result<Vec<GitActivity>> {
    let file = match File::open(path).await {
        Ok(v) => v,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => Err(e)?,
    };
    file.lock_shared()?;
    let buffer = BufReader::new(file);
    let mut lines = buffer.lines();
    let mut activities = vec![];
    while let Ok(Some(v)) = lines.next_line().await {
        match serde_json::from_str::<GitActivity>(&v) {
            Ok(v) => activities.push(v),
            Err(e) => {
                // ignore illegal values. Might happen after shutdowns
                warn!("Found illegal git activity line {}: {e}", &v)
            }
        }
    }
    lines.into_inner().into_inner().unlock_async().await?;
    Ok(activities)
}

impl GitActivityStore for GitActivityStoreImpl {
    async fn begin_scan(&self) -> Result<ScanSession> {
        let lock = File::options()
            .write(true)
            .create(true)
            .open(&self.lock_path)
            .await?;
        // waits for a scan running in another process
        lock.lock_exclusive()?;

        let mut index = DedupIndex::default();
        for activity in read_all(&self.path).await? {
            index.record(&activity);
        }
        *self.index.lock().expect("dedup index lock poisoned") = index;

        Ok(ScanSession { lock })
    }

    async fn insert(&self, activity: GitActivity) -> Result<()> {
        let mut buffer = serde_json::to_vec(&activity)?;
        buffer.push(b'\n');

        let mut file = File::options()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        file.lock_exclusive()?;
        let result = async {
            file.write_all(&buffer).await?;
            file.flush().await
        }
        .await;
        file.unlock_async().await?;
        result?;

        self.index
            .lock()
            .expect("dedup index lock poisoned")
            .record(&activity);
        Ok(())
    }

    async fn exists(&self, repo_path: &str, hash: &str) -> Result<bool> {
        Ok(self
            .index
            .lock()
            .expect("dedup index lock poisoned")
            .seen
            .contains(&(repo_path.to_string(), hash.to_string())))
    }

    async fn latest_for_repo(&self, repo_path: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .index
            .lock()
            .expect("dedup index lock poisoned")
            .latest
            .get(repo_path)
            .copied())
    }

    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GitActivity>> {
        let mut activities = read_all(&self.path)
            .await?
            .into_iter()
            .filter(|v| v.date >= start && v.date < end)
            .collect::<Vec<_>>();
        activities.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(activities)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{GitActivityStore, GitActivityStoreImpl};
    use crate::storage::entities::GitActivity;

    fn commit(repo: &str, hash: &str, offset_s: i64) -> GitActivity {
        GitActivity {
            repo_path: repo.into(),
            commit_hash: hash.into(),
            author: "dev".into(),
            message: "change things".into(),
            date: Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap()
                + Duration::seconds(offset_s),
        }
    }

    #[tokio::test]
    async fn test_insert_and_exists() -> Result<()> {
        let dir = tempdir()?;
        let store = GitActivityStoreImpl::open(dir.path().to_owned()).await?;

        assert!(!store.exists("/repo/a", "abc").await?);
        store.insert(commit("/repo/a", "abc", 0)).await?;
        assert!(store.exists("/repo/a", "abc").await?);
        // same hash in a different repo is a different commit record
        assert!(!store.exists("/repo/b", "abc").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_index_survives_reopen() -> Result<()> {
        let dir = tempdir()?;
        {
            let store = GitActivityStoreImpl::open(dir.path().to_owned()).await?;
            store.insert(commit("/repo/a", "abc", 0)).await?;
        }

        let store = GitActivityStoreImpl::open(dir.path().to_owned()).await?;
        assert!(store.exists("/repo/a", "abc").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_begin_scan_picks_up_other_writers() -> Result<()> {
        let dir = tempdir()?;
        let store_a = GitActivityStoreImpl::open(dir.path().to_owned()).await?;
        let store_b = GitActivityStoreImpl::open(dir.path().to_owned()).await?;

        store_a.insert(commit("/repo/a", "abc", 0)).await?;

        // b opened before the insert, so its index is stale
        assert!(!store_b.exists("/repo/a", "abc").await?);
        let session = store_b.begin_scan().await?;
        assert!(store_b.exists("/repo/a", "abc").await?);
        session.release().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_latest_for_repo() -> Result<()> {
        let dir = tempdir()?;
        let store = GitActivityStoreImpl::open(dir.path().to_owned()).await?;

        assert_eq!(store.latest_for_repo("/repo/a").await?, None);

        store.insert(commit("/repo/a", "abc", 0)).await?;
        store.insert(commit("/repo/a", "def", 600)).await?;
        store.insert(commit("/repo/a", "old", -600)).await?;

        assert_eq!(
            store.latest_for_repo("/repo/a").await?,
            Some(commit("/repo/a", "def", 600).date)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_query_range_newest_first_half_open() -> Result<()> {
        let dir = tempdir()?;
        let store = GitActivityStoreImpl::open(dir.path().to_owned()).await?;

        store.insert(commit("/repo/a", "a", 0)).await?;
        store.insert(commit("/repo/a", "b", 60)).await?;
        store.insert(commit("/repo/a", "c", 120)).await?;

        let base = commit("/repo/a", "a", 0).date;
        let found = store.query_range(base, base + Duration::seconds(120)).await?;

        assert_eq!(found.len(), 2);
        assert_eq!(&*found[0].commit_hash, "b");
        assert_eq!(&*found[1].commit_hash, "a");
        Ok(())
    }
}
