//! File-backed vector store: one JSON document per collection under a
//! persist directory, searched by brute-force cosine distance.

use crate::traits::VectorIndex;
use crate::{IndexEntry, SearchError, SimilarityHit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

const TEMP_SUFFIX: &str = "tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedCollection {
    name: String,
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

pub struct LocalVectorStore {
    root: PathBuf,
    collections: RwLock<HashMap<String, PersistedCollection>>,
}

impl LocalVectorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drops every cached collection and removes temp files left behind by
    /// interrupted writes. Safe to call on a directory that does not exist.
    pub async fn clear_system_cache(&self) -> Result<(), SearchError> {
        self.collections.write().await.clear();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error.into()),
        };

        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_temp = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == TEMP_SUFFIX);
            if is_temp {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        debug!(root = %self.root.display(), removed, "cleared store cache");
        Ok(())
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        let file_name = collection
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();
        self.root.join(format!("{file_name}.json"))
    }

    async fn read_collection(&self, collection: &str) -> Result<Option<PersistedCollection>, SearchError> {
        match tokio::fs::read(self.collection_path(collection)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn persist(&self, collection: &PersistedCollection) -> Result<(), SearchError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.collection_path(&collection.name);
        let temp = target.with_extension(TEMP_SUFFIX);
        tokio::fs::write(&temp, serde_json::to_vec(collection)?).await?;
        tokio::fs::rename(&temp, &target).await?;
        Ok(())
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for LocalVectorStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimensions: usize,
    ) -> Result<(), SearchError> {
        let mut collections = self.collections.write().await;

        if !collections.contains_key(collection) {
            let loaded = match self.read_collection(collection).await? {
                Some(existing) => {
                    info!(
                        collection,
                        entries = existing.entries.len(),
                        "reusing persisted collection"
                    );
                    existing
                }
                None => {
                    let created = PersistedCollection {
                        name: collection.to_string(),
                        dimensions,
                        entries: Vec::new(),
                    };
                    self.persist(&created).await?;
                    info!(collection, dimensions, "created collection");
                    created
                }
            };
            collections.insert(collection.to_string(), loaded);
        }

        let stored = collections
            .get(collection)
            .map(|existing| existing.dimensions)
            .unwrap_or(dimensions);
        if stored != dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: stored,
                found: dimensions,
            });
        }
        Ok(())
    }

    async fn existing_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, SearchError> {
        let collections = self.collections.read().await;
        let stored = collections
            .get(collection)
            .ok_or_else(|| SearchError::UnknownCollection(collection.to_string()))?;

        let wanted = ids.iter().collect::<HashSet<_>>();
        Ok(stored
            .entries
            .iter()
            .filter(|entry| wanted.contains(&entry.id))
            .map(|entry| entry.id.clone())
            .collect())
    }

    async fn upsert(&self, collection: &str, entries: &[IndexEntry]) -> Result<(), SearchError> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| SearchError::UnknownCollection(collection.to_string()))?;

        if let Some(bad) = entries
            .iter()
            .find(|entry| entry.vector.len() != stored.dimensions)
        {
            return Err(SearchError::DimensionMismatch {
                expected: stored.dimensions,
                found: bad.vector.len(),
            });
        }

        // Work on a copy so a failed write leaves the cached state untouched.
        let mut updated = stored.clone();
        let mut positions = updated
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.id.clone(), position))
            .collect::<HashMap<_, _>>();
        for entry in entries {
            match positions.get(&entry.id) {
                Some(&position) => updated.entries[position] = entry.clone(),
                None => {
                    positions.insert(entry.id.clone(), updated.entries.len());
                    updated.entries.push(entry.clone());
                }
            }
        }

        self.persist(&updated).await?;
        *stored = updated;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SimilarityHit>, SearchError> {
        let collections = self.collections.read().await;
        let stored = collections
            .get(collection)
            .ok_or_else(|| SearchError::UnknownCollection(collection.to_string()))?;

        if query_vector.len() != stored.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: stored.dimensions,
                found: query_vector.len(),
            });
        }

        let mut hits = stored
            .entries
            .iter()
            .map(|entry| SimilarityHit {
                entry_id: entry.id.clone(),
                text: entry.text.clone(),
                metadata: Some(entry.metadata.clone()),
                distance: cosine_distance(&entry.vector, query_vector),
            })
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize, SearchError> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|stored| stored.entries.len())
            .ok_or_else(|| SearchError::UnknownCollection(collection.to_string()))
    }
}
