use std::{future::Future, io::ErrorKind, ops::Deref, path::PathBuf};

use anyhow::Result;
use tracing::info;

use super::entities::{AppCategory, Category};

pub const CATEGORIES_FILE: &str = "categories.json";

/// Read path used by the scoring pipeline plus the cli's write path for
/// maintaining the map. Applications without a mapping count as neutral.
pub trait CategoryStore {
    fn query_all(&self) -> impl Future<Output = Result<Vec<AppCategory>>> + Send;

    /// Adds or replaces the mapping for one application.
    fn assign(&self, category: AppCategory) -> impl Future<Output = Result<()>> + Send;
}

impl<T: Deref + Sync> CategoryStore for T
where
    T::Target: CategoryStore + Sync,
{
    fn query_all(&self) -> impl Future<Output = Result<Vec<AppCategory>>> + Send {
        self.deref().query_all()
    }

    fn assign(&self, category: AppCategory) -> impl Future<Output = Result<()>> + Send {
        self.deref().assign(category)
    }
}

/// Category map as a single JSON file, seeded with a small set of well-known
/// applications the first time it is read.
pub struct CategoryStoreImpl {
    path: PathBuf,
}

impl CategoryStoreImpl {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join(CATEGORIES_FILE),
        })
    }

    async fn write_all(&self, categories: &[AppCategory]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(categories)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

impl CategoryStore for CategoryStoreImpl {
    async fn query_all(&self) -> Result<Vec<AppCategory>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let defaults = default_categories();
                info!("No category file found, seeding {:?}", self.path);
                self.write_all(&defaults).await?;
                Ok(defaults)
            }
            Err(e) => Err(e)?,
        }
    }

    async fn assign(&self, category: AppCategory) -> Result<()> {
        let mut categories = self.query_all().await?;
        match categories.iter_mut().find(|v| v.app_id == category.app_id) {
            Some(existing) => *existing = category,
            None => categories.push(category),
        }
        self.write_all(&categories).await
    }
}

fn entry(app_id: &str, app_name: &str, category: Category) -> AppCategory {
    AppCategory {
        app_id: app_id.into(),
        app_name: app_name.into(),
        category,
        is_default: true,
    }
}

/// Seed mapping for well-known applications. Everything else starts neutral
/// until the user categorizes it.
fn default_categories() -> Vec<AppCategory> {
    vec![
        entry("com.apple.dt.Xcode", "Xcode", Category::Productive),
        entry("com.microsoft.VSCode", "Visual Studio Code", Category::Productive),
        entry("com.jetbrains.intellij", "IntelliJ IDEA", Category::Productive),
        entry("com.apple.Terminal", "Terminal", Category::Productive),
        entry("com.googlecode.iterm2", "iTerm", Category::Productive),
        entry("com.google.Chrome", "Google Chrome", Category::Neutral),
        entry("com.apple.Safari", "Safari", Category::Neutral),
        entry("org.mozilla.firefox", "Firefox", Category::Neutral),
        entry("com.tinyspeck.slackmacgap", "Slack", Category::Neutral),
        entry("com.apple.mail", "Mail", Category::Neutral),
        entry("com.apple.Music", "Music", Category::Distracting),
        entry("com.spotify.client", "Spotify", Category::Distracting),
        entry("com.apple.TV", "TV", Category::Distracting),
    ]
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::{entry, CategoryStore, CategoryStoreImpl};
    use crate::storage::entities::Category;

    #[tokio::test]
    async fn test_first_read_seeds_defaults() -> Result<()> {
        let dir = tempdir()?;
        let store = CategoryStoreImpl::new(dir.path().to_owned())?;

        let categories = store.query_all().await?;
        assert!(!categories.is_empty());
        assert!(categories.iter().all(|v| v.is_default));
        Ok(())
    }

    #[tokio::test]
    async fn test_assign_overrides_default() -> Result<()> {
        let dir = tempdir()?;
        let store = CategoryStoreImpl::new(dir.path().to_owned())?;

        let mut override_entry = entry("com.google.Chrome", "Google Chrome", Category::Distracting);
        override_entry.is_default = false;
        store.assign(override_entry.clone()).await?;

        let categories = store.query_all().await?;
        let chrome = categories
            .iter()
            .find(|v| &*v.app_id == "com.google.Chrome")
            .unwrap();
        assert_eq!(chrome, &override_entry);
        // no duplicate entry was appended
        assert_eq!(
            categories
                .iter()
                .filter(|v| &*v.app_id == "com.google.Chrome")
                .count(),
            1
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_assign_new_application() -> Result<()> {
        let dir = tempdir()?;
        let store = CategoryStoreImpl::new(dir.path().to_owned())?;

        let mut custom = entry("io.github.mpv", "mpv", Category::Distracting);
        custom.is_default = false;
        store.assign(custom.clone()).await?;

        let categories = store.query_all().await?;
        assert!(categories.contains(&custom));
        Ok(())
    }
}
