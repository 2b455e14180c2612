use crate::chunking::make_entry_id;
use crate::embeddings::Embedder;
use crate::traits::VectorIndex;
use crate::{
    DocumentFingerprint, EntryMetadata, IndexEntry, IndexReport, Page, SearchError,
    SimilarityResult,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Read-only view of a built collection: the store, the embedder that
/// produced its vectors, and the collection name.
#[derive(Clone)]
pub struct IndexHandle {
    store: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    collection: String,
}

impl IndexHandle {
    pub fn new(
        store: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn similarity_search_with_score(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<SimilarityResult, SearchError> {
        let query_vector = self.embedder.embed(query).await?;
        let hits = self
            .store
            .search(&self.collection, &query_vector, top_k)
            .await?;
        debug!(collection = %self.collection, hits = hits.len(), "similarity search");
        Ok(hits)
    }

    pub async fn entry_count(&self) -> Result<usize, SearchError> {
        self.store.count(&self.collection).await
    }
}

/// Embeds `pages` and stores them in `collection`.
///
/// Entries already present (same document checksum, page, position and text)
/// are skipped, so rebuilding over a persisted collection adds nothing. New
/// entries are all embedded before a single upsert: an embedding failure
/// leaves the collection as it was.
pub async fn build_index(
    document: &DocumentFingerprint,
    pages: &[Page],
    collection: &str,
    store: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
) -> Result<(IndexHandle, IndexReport), SearchError> {
    store
        .ensure_collection(collection, embedder.dimensions())
        .await?;

    let ids = pages
        .iter()
        .map(|page| {
            make_entry_id(
                &document.checksum,
                page.metadata.page,
                page.metadata.chunk_index,
                &page.text,
            )
        })
        .collect::<Vec<_>>();
    let existing = store.existing_ids(collection, &ids).await?;

    let pending = pages
        .iter()
        .zip(ids)
        .filter(|(_, id)| !existing.contains(id))
        .collect::<Vec<_>>();

    let texts = pending
        .iter()
        .map(|(page, _)| page.text.as_str())
        .collect::<Vec<_>>();
    let vectors = embedder.embed_batch(&texts).await?;
    if vectors.len() != pending.len() {
        return Err(SearchError::Embedding {
            provider: "embedder".to_string(),
            message: format!(
                "embedded {} texts but received {} vectors",
                pending.len(),
                vectors.len()
            ),
        });
    }

    let entries = pending
        .into_iter()
        .zip(vectors)
        .map(|((page, id), vector)| IndexEntry {
            id,
            vector,
            text: page.text.clone(),
            metadata: EntryMetadata {
                collection: collection.to_string(),
                source: page.metadata.source.clone(),
                page: page.metadata.page,
                chunk_index: page.metadata.chunk_index,
            },
        })
        .collect::<Vec<_>>();

    store.upsert(collection, &entries).await?;

    let report = IndexReport {
        collection: collection.to_string(),
        total_pages: pages.len(),
        inserted: entries.len(),
        skipped_existing: pages.len() - entries.len(),
    };
    info!(
        collection,
        inserted = report.inserted,
        skipped = report.skipped_existing,
        "index ready"
    );

    Ok((IndexHandle::new(store, embedder, collection), report))
}
