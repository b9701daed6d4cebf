use std::{
    future::{self, Future},
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use fs4::tokio::AsyncFileExt;
use futures::{stream, Stream, StreamExt};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::utils::time::{date_to_record_name, next_day_start};

use super::entities::ActivityLog;

/// Durable store of closed activity spans. The monitor owns the write path;
/// reports and the tracker facade only read.
pub trait ActivityStore {
    fn insert(&self, log: ActivityLog) -> impl Future<Output = Result<()>> + Send;

    /// Spans overlapping `[start, end)`, clamped to the window, newest first.
    fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ActivityLog>>> + Send;
}

impl<T: Deref + Sync> ActivityStore for T
where
    T::Target: ActivityStore + Sync,
{
    fn insert(&self, log: ActivityLog) -> impl Future<Output = Result<()>> + Send {
        self.deref().insert(log)
    }

    fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ActivityLog>>> + Send {
        self.deref().query_range(start, end)
    }
}

/// The main realization of [ActivityStore]. One JSON-lines file per UTC day.
pub struct ActivityStoreImpl {
    record_dir: PathBuf,
}

impl ActivityStoreImpl {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self { record_dir })
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.record_dir.join(date_to_record_name(date))
    }

    /// Reads every span recorded for one UTC day. A missing file reads as an
    /// empty day.
    pub async fn get_data_for(&self, date: NaiveDate) -> Result<Vec<ActivityLog>> {
        match read_day_file(&self.day_path(date)).await {
            Ok(logs) => Ok(logs),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e)?,
        }
    }

    async fn append(&self, log: ActivityLog) -> Result<()> {
        let path = self.day_path(log.start.date_naive());

        let mut file = File::options()
            .append(true)
            .create(true)
            .open(path)
            .await?;

        let mut buffer = serde_json::to_vec(&log)?;
        buffer.push(b'\n');

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = async {
            file.write_all(&buffer).await?;
            file.flush().await
        }
        .await;
        file.unlock_async().await?;
        result?;
        Ok(())
    }
}

async fn read_day_file(path: &Path) -> Result<Vec<ActivityLog>, std::io::Error> {
    debug!("Extracting {path:?}");
    let file = File::open(path).await?;
    file.lock_shared()?;
    let buffer = BufReader::new(file);
    let mut lines = buffer.lines();
    let mut logs = vec![];
    while let Ok(Some(v)) = lines.next_line().await {
        match serde_json::from_str::<ActivityLog>(&v) {
            Ok(v) => logs.push(v),
            Err(e) => {
                // ignore illegal values. Might happen after shutdowns
                warn!(
                    "During parsing in path {:?} found illegal json string {}:  {e}",
                    path, &v
                )
            }
        }
    }

    lines.into_inner().into_inner().unlock_async().await?;

    Ok(logs)
}

impl ActivityStore for ActivityStoreImpl {
    async fn insert(&self, log: ActivityLog) -> Result<()> {
        let mut log = log;
        // spans are filed under their start date, so anything crossing UTC
        // midnight is cut at the boundary to keep every day file complete
        while let (Some(head), Some(tail)) = log.clone().split_by(next_day_start(log.start)) {
            self.append(head).await?;
            log = tail;
        }
        self.append(log).await
    }

    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityLog>> {
        let mut logs: Vec<ActivityLog> = extract_between(self, start, end).collect().await;
        logs.sort_by(|a, b| b.start.cmp(&a.start));
        Ok(logs)
    }
}

/// Streams spans between 2 dates, reading day files concurrently and clamping
/// each span to the window. Unreadable days degrade to empty with a log line.
fn extract_between(
    storage: &ActivityStoreImpl,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> impl Stream<Item = ActivityLog> + '_ {
    date_range(start.date_naive(), end.date_naive())
        .map(move |day| async move {
            storage.get_data_for(day).await.unwrap_or_else(|e| {
                warn!("Failed to read records for {day}: {e:?}");
                vec![]
            })
        })
        .buffered(4)
        .flat_map(stream::iter)
        .filter_map(move |v| future::ready(v.clamp(start, end)))
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold((start, end), |(mut current, end)| {
        future::ready({
            if current <= end {
                let last_current = current;
                current = current.succ_opt().expect("End of time should never happen");
                Some((last_current, (current, end)))
            } else {
                None
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{ActivityStore, ActivityStoreImpl};
    use crate::storage::entities::ActivityLog;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn log(app: &str, offset_s: i64, duration_s: i64) -> ActivityLog {
        ActivityLog {
            app_id: app.into(),
            app_name: app.into(),
            start: Utc.from_utc_datetime(&TEST_START_DATE) + Duration::seconds(offset_s),
            duration: Duration::seconds(duration_s),
        }
    }

    #[tokio::test]
    async fn test_insert_and_query_basic() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;

        storage.insert(log("xcode", 0, 100)).await?;
        storage.insert(log("chrome", 100, 50)).await?;

        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let logs = storage
            .query_range(start, start + Duration::hours(1))
            .await?;

        // newest first
        assert_eq!(logs.len(), 2);
        assert_eq!(&*logs[0].app_id, "chrome");
        assert_eq!(&*logs[1].app_id, "xcode");
        Ok(())
    }

    #[tokio::test]
    async fn test_query_clamps_to_window() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;

        storage.insert(log("xcode", 0, 100)).await?;

        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let logs = storage
            .query_range(start + Duration::seconds(50), start + Duration::hours(1))
            .await?;

        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].start, start + Duration::seconds(50));
        assert_eq!(logs[0].duration, Duration::seconds(50));
        Ok(())
    }

    #[tokio::test]
    async fn test_query_excludes_end_boundary() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;

        // starts exactly at the end of the queried window
        storage.insert(log("xcode", 3600, 100)).await?;

        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let logs = storage
            .query_range(start, start + Duration::seconds(3600))
            .await?;

        assert!(logs.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_query_spans_multiple_days() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;

        storage.insert(log("day one", 0, 60)).await?;
        storage.insert(log("day two", 86_400, 60)).await?;

        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let logs = storage.query_range(start, start + Duration::days(2)).await?;

        assert_eq!(logs.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_span_crossing_midnight_queryable_from_next_day() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;

        // 23:30 on day one, running 2 hours into day two
        storage.insert(log("xcode", 84_600, 7200)).await?;

        let day_two = Utc.from_utc_datetime(&TEST_START_DATE) + Duration::days(1);
        let logs = storage.query_range(day_two, day_two + Duration::days(1)).await?;

        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].start, day_two);
        assert_eq!(logs[0].duration, Duration::seconds(5400));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_line_is_skipped() -> Result<()> {
        let dir = tempdir()?;
        let storage = ActivityStoreImpl::new(dir.path().to_owned())?;

        storage.insert(log("xcode", 0, 100)).await?;

        let day_path = dir.path().join("2018-07-04");
        let mut content = std::fs::read_to_string(&day_path)?;
        content.push_str("{\"not a record");
        std::fs::write(&day_path, content)?;

        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let logs = storage.query_range(start, start + Duration::hours(1)).await?;

        assert_eq!(logs.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_usable_through_arc() -> Result<()> {
        let dir = tempdir()?;
        let storage = Arc::new(ActivityStoreImpl::new(dir.path().to_owned())?);

        storage.insert(log("xcode", 0, 10)).await?;
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        assert_eq!(storage.query_range(start, start + Duration::hours(1)).await?.len(), 1);
        Ok(())
    }
}
