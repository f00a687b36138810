use crate::config::DataConfig;
use crate::models::{Media, Review};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

/// A collection persisted as one JSON array document.
///
/// Every access goes through [`JsonCollection::lock`], so a load → mutate →
/// save cycle never interleaves with another writer on the same collection.
/// Nothing guards against a crash halfway through a write.
pub struct JsonCollection<T> {
    name: &'static str,
    path: PathBuf,
    lock: Mutex<()>,
    _records: PhantomData<fn() -> T>,
}

/// Exclusive access to a collection for the lifetime of the guard
pub struct CollectionGuard<'a, T> {
    collection: &'a JsonCollection<T>,
    _guard: MutexGuard<'a, ()>,
}

impl<T> JsonCollection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(name: &'static str, path: impl Into<PathBuf>) -> Self {
        Self {
            name,
            path: path.into(),
            lock: Mutex::new(()),
            _records: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for exclusive access
    pub async fn lock(&self) -> CollectionGuard<'_, T> {
        CollectionGuard {
            collection: self,
            _guard: self.lock.lock().await,
        }
    }

    /// Read-only snapshot of the whole collection
    pub async fn load(&self) -> Result<Vec<T>> {
        self.lock().await.load().await
    }
}

impl<T> CollectionGuard<'_, T>
where
    T: Serialize + DeserializeOwned,
{
    /// Read every record; a missing document is an empty collection
    #[instrument(skip(self), fields(collection = self.collection.name))]
    pub async fn load(&self) -> Result<Vec<T>> {
        let path = &self.collection.path;

        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let records: Vec<T> = serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        debug!(count = records.len(), "Collection loaded");

        Ok(records)
    }

    /// Replace the whole stored collection
    #[instrument(skip(self, records), fields(collection = self.collection.name, count = records.len()))]
    pub async fn save(&self, records: &[T]) -> Result<()> {
        let path = &self.collection.path;

        let raw = serde_json::to_vec_pretty(records)
            .with_context(|| format!("Failed to serialize {}", self.collection.name))?;

        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        debug!("Collection saved");

        Ok(())
    }
}

/// Both catalog collections
pub struct CatalogStore {
    pub medias: JsonCollection<Media>,
    pub reviews: JsonCollection<Review>,
}

impl CatalogStore {
    /// Open the collections under the configured data directory
    pub async fn open(config: &DataConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", config.dir.display()))?;

        info!(dir = %config.dir.display(), "Catalog store opened");

        Ok(Self {
            medias: JsonCollection::new("medias", config.medias_path()),
            reviews: JsonCollection::new("reviews", config.reviews_path()),
        })
    }

    pub async fn find_media(&self, id: &str) -> Result<Option<Media>> {
        let medias = self.medias.load().await?;
        Ok(medias.into_iter().find(|m| m.id == id))
    }

    pub async fn media_exists(&self, id: &str) -> Result<bool> {
        Ok(self.find_media(id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMedia;

    fn sample(title: &str) -> Media {
        Media::new(NewMedia {
            title: title.to_string(),
            year: "1999".to_string(),
            media_type: "movie".to_string(),
            poster: "http://x/p.jpg".to_string(),
        })
    }

    async fn open_store(dir: &Path) -> CatalogStore {
        let config = DataConfig {
            dir: dir.join("data"),
            ..Default::default()
        };
        CatalogStore::open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_document_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;

        assert!(store.medias.load().await.unwrap().is_empty());
        assert!(store.reviews.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_replaces_whole_collection() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;

        {
            let guard = store.medias.lock().await;
            guard.save(&[sample("Alien"), sample("Heat")]).await.unwrap();
        }
        {
            let guard = store.medias.lock().await;
            let mut medias = guard.load().await.unwrap();
            medias.retain(|m| m.title != "Alien");
            guard.save(&medias).await.unwrap();
        }

        let medias = store.medias.load().await.unwrap();
        assert_eq!(medias.len(), 1);
        assert_eq!(medias[0].title, "Heat");
    }

    #[tokio::test]
    async fn test_find_media() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;
        let media = sample("Heat");

        store.medias.lock().await.save(&[media.clone()]).await.unwrap();

        assert_eq!(store.find_media(&media.id).await.unwrap(), Some(media));
        assert!(!store.media_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;

        tokio::fs::write(store.medias.path(), b"{ not json").await.unwrap();

        assert!(store.medias.load().await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_updates() {
        let tmp = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(open_store(tmp.path()).await);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let guard = store.medias.lock().await;
                    let mut medias = guard.load().await.unwrap();
                    medias.push(sample(&format!("title-{i}")));
                    guard.save(&medias).await.unwrap();
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.medias.load().await.unwrap().len(), 16);
    }
}
