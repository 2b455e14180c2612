use crate::chunking::{chunk_by_paragraph, ChunkingConfig};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::{DocumentFingerprint, IngestError, IngestionOptions, LoadedDocument, Page, PageMetadata};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Loads a PDF and splits it into ordered [`Page`] units.
pub fn load_document(path: &Path, options: &IngestionOptions) -> Result<LoadedDocument, IngestError> {
    load_document_with(&LopdfExtractor, path, options)
}

pub fn load_document_with<E: PdfExtractor + ?Sized>(
    extractor: &E,
    path: &Path,
    options: &IngestionOptions,
) -> Result<LoadedDocument, IngestError> {
    let config = ChunkingConfig::from(options);
    config.validate()?;

    let fingerprint = build_document_fingerprint(path)?;
    let extracted = extractor.extract_pages(path)?;

    let mut pages = Vec::new();
    let mut ordinal = 0u64;
    for page in extracted {
        let pieces = chunk_by_paragraph(&page.text, config);
        debug!(page = page.number, pieces = pieces.len(), "split page");

        for (chunk_index, text) in pieces.into_iter().enumerate() {
            pages.push(Page {
                ordinal,
                text,
                metadata: PageMetadata {
                    source: fingerprint.source_path.clone(),
                    page: page.number,
                    chunk_index: chunk_index as u32,
                },
            });
            ordinal = ordinal.saturating_add(1);
        }
    }

    info!(
        source = %fingerprint.source_path,
        pages = pages.len(),
        "document loaded"
    );

    Ok(LoadedDocument { fingerprint, pages })
}

fn build_document_fingerprint(path: &Path) -> Result<DocumentFingerprint, IngestError> {
    let checksum = digest_file(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    Ok(DocumentFingerprint {
        document_title: name.to_string(),
        source_path: path.to_string_lossy().to_string(),
        checksum,
        ingested_at: Utc::now(),
    })
}
