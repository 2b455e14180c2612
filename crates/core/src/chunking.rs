use crate::error::IngestError;
use crate::models::IngestionOptions;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Splits page text into pieces of at most `max_chars` characters.
///
/// Blank-line separated paragraphs are packed together while they fit; a
/// paragraph longer than the limit is cut into overlapping windows.
pub fn chunk_by_paragraph(text: &str, config: ChunkingConfig) -> Vec<String> {
    let paragraphs = text
        .split("\n\n")
        .map(|paragraph| paragraph.trim().replace('\t', " "))
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>();

    let mut packed = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for paragraph in paragraphs {
        let paragraph_chars = paragraph.chars().count();

        if current.is_empty() {
            current.push_str(&paragraph);
            current_chars = paragraph_chars;
            continue;
        }

        if current_chars + paragraph_chars + 2 <= config.max_chars {
            current.push_str("\n\n");
            current.push_str(&paragraph);
            current_chars += paragraph_chars + 2;
        } else {
            packed.push(std::mem::take(&mut current));
            current.push_str(&paragraph);
            current_chars = paragraph_chars;
        }
    }

    if !current.is_empty() {
        packed.push(current);
    }

    let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);
    let mut chunks = Vec::new();
    for chunk in packed {
        let chars: Vec<char> = chunk.chars().collect();
        if chars.len() <= config.max_chars {
            chunks.push(chunk);
            continue;
        }

        let mut start = 0;
        while start < chars.len() {
            let end = (start + config.max_chars).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }

    chunks
}

/// Stable identifier for an index entry. Identical content from the same
/// document always hashes to the same id, which is what lets a rebuild skip
/// entries that are already stored.
pub fn make_entry_id(checksum: &str, page: u32, chunk_index: u32, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(checksum.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(chunk_index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
