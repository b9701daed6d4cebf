use std::{future::Future, io::ErrorKind, ops::Deref, path::PathBuf};

use anyhow::Result;
use tracing::info;

use super::entities::AppSettings;

pub const SETTINGS_FILE: &str = "settings.json";

/// Access to the process-wide configuration singleton. The scheduler
/// re-reads it on every iteration, so edits apply without a restart.
pub trait SettingsStore {
    fn current(&self) -> impl Future<Output = Result<AppSettings>> + Send;

    fn save(&self, settings: &AppSettings) -> impl Future<Output = Result<()>> + Send;
}

impl<T: Deref + Sync> SettingsStore for T
where
    T::Target: SettingsStore + Sync,
{
    fn current(&self) -> impl Future<Output = Result<AppSettings>> + Send {
        self.deref().current()
    }

    fn save(&self, settings: &AppSettings) -> impl Future<Output = Result<()>> + Send {
        self.deref().save(settings)
    }
}

/// Settings as a single JSON file in the application directory.
pub struct SettingsStoreImpl {
    path: PathBuf,
}

impl SettingsStoreImpl {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join(SETTINGS_FILE),
        })
    }
}

impl SettingsStore for SettingsStoreImpl {
    /// Reads current settings, seeding the file with defaults at first run.
    async fn current(&self) -> Result<AppSettings> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let defaults = AppSettings::default();
                info!("No settings file found, creating {:?}", self.path);
                self.save(&defaults).await?;
                Ok(defaults)
            }
            Err(e) => Err(e)?,
        }
    }

    async fn save(&self, settings: &AppSettings) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(settings)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}
