use crate::{IndexEntry, SearchError, SimilarityHit};
use async_trait::async_trait;
use std::collections::HashSet;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the collection if it is missing. An existing collection with a
    /// different dimensionality is an error.
    async fn ensure_collection(&self, collection: &str, dimensions: usize)
        -> Result<(), SearchError>;

    /// Returns the subset of `ids` already stored in `collection`.
    async fn existing_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, SearchError>;

    async fn upsert(&self, collection: &str, entries: &[IndexEntry]) -> Result<(), SearchError>;

    /// Nearest entries to `query_vector`, closest first.
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SimilarityHit>, SearchError>;

    async fn count(&self, collection: &str) -> Result<usize, SearchError>;
}
