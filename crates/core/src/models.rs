use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_title: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub source: String,
    /// 1-based page number in the source document.
    pub page: u32,
    /// Position of this chunk within its page.
    pub chunk_index: u32,
}

/// One ingested text unit: a whole page, or a piece of one when the page
/// exceeds the chunk size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub ordinal: u64,
    pub text: String,
    pub metadata: PageMetadata,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub fingerprint: DocumentFingerprint,
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub collection: String,
    pub source: String,
    pub page: u32,
    pub chunk_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: EntryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub entry_id: String,
    pub text: String,
    pub metadata: Option<EntryMetadata>,
    /// Cosine distance, lower is closer.
    pub distance: f32,
}

pub type SimilarityResult = Vec<SimilarityHit>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub collection: String,
    pub total_pages: usize,
    pub inserted: usize,
    pub skipped_existing: usize,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 4_000,
            chunk_overlap_chars: 200,
        }
    }
}
