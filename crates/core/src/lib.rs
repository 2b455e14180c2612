pub mod agent;
pub mod bootstrap;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod stores;
pub mod traits;

pub use agent::{AnswerStrategy, RetrieveThenGenerate, SimilaritySearchTool, ToolUsingAgent};
pub use bootstrap::{initialize, initialize_with, AppContext};
pub use chunking::{chunk_by_paragraph, ChunkingConfig};
pub use config::{
    EmbedderKind, IndexBackend, ProviderConfig, QaConfig, RetrievalConfig, StoreInfo,
    StrategyKind,
};
pub use embeddings::{CharacterNgramEmbedder, Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{AnswerError, GenerationError, IngestError, SearchError, StartupError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use generation::{AssistantTurn, ChatMessage, Generator, OpenAiChatModel, ToolCall, ToolSpec};
pub use index::{build_index, IndexHandle};
pub use ingest::{digest_file, load_document};
pub use models::{
    DocumentFingerprint, EntryMetadata, IndexEntry, IndexReport, IngestionOptions, LoadedDocument,
    Page, PageMetadata, SimilarityHit, SimilarityResult,
};
pub use normalize::normalize;
pub use pipeline::{reformat, reformat_prompt, Answer, AnswerPipeline};
pub use stores::{LocalVectorStore, QdrantStore};
pub use traits::VectorIndex;
