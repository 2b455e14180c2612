use crate::error::StartupError;
use crate::models::IngestionOptions;
use std::fmt;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1/";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_OPENAI_EMBEDDING_DIMENSIONS: usize = 1536;

/// Credentials and endpoints for the hosted model provider. Built once at
/// startup and shared by reference; the key is never written back to the
/// environment.
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub chat_model: String,
    pub temperature: f32,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
}

impl ProviderConfig {
    /// Resolves `path` against the API base, tolerating a base without a
    /// trailing slash.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.api_base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base)?.join(path)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.7,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_OPENAI_EMBEDDING_DIMENSIONS,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBackend {
    /// JSON files under the persist directory.
    Local,
    Qdrant { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    OpenAi,
    /// Offline trigram hashing; needs no credentials.
    CharacterNgram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    ToolUsingAgent,
    RetrieveThenGenerate,
}

/// Name and description the agent sees for the similarity-search tool.
#[derive(Debug, Clone)]
pub struct StoreInfo {
    pub name: String,
    pub description: String,
}

impl Default for StoreInfo {
    fn default() -> Self {
        Self {
            name: "annual_report".to_string(),
            description: "A banking annual report as a PDF document".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub strategy: StrategyKind,
    pub max_tool_rounds: usize,
    pub reformat_subject: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            strategy: StrategyKind::ToolUsingAgent,
            max_tool_rounds: 3,
            reformat_subject: "financial data summary".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QaConfig {
    pub document_path: PathBuf,
    pub collection: String,
    pub persist_dir: PathBuf,
    pub backend: IndexBackend,
    pub embedder: EmbedderKind,
    pub provider: ProviderConfig,
    pub retrieval: RetrievalConfig,
    pub ingestion: IngestionOptions,
    pub store_info: StoreInfo,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            document_path: PathBuf::from("data/annualreport.pdf"),
            collection: "annualreport".to_string(),
            persist_dir: PathBuf::from("./chroma_db"),
            backend: IndexBackend::Local,
            embedder: EmbedderKind::OpenAi,
            provider: ProviderConfig::default(),
            retrieval: RetrievalConfig::default(),
            ingestion: IngestionOptions::default(),
            store_info: StoreInfo::default(),
        }
    }
}

impl QaConfig {
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.collection.trim().is_empty() {
            return Err(StartupError::Config("collection name is empty".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(StartupError::Config("top_k must be at least 1".to_string()));
        }
        if self.provider.embedding_dimensions == 0 {
            return Err(StartupError::Config(
                "embedding dimensions must be at least 1".to_string(),
            ));
        }
        self.provider
            .endpoint("chat/completions")
            .map_err(|error| StartupError::Config(format!("invalid api base: {error}")))?;
        if let IndexBackend::Qdrant { url } = &self.backend {
            Url::parse(url)
                .map_err(|error| StartupError::Config(format!("invalid qdrant url: {error}")))?;
        }
        Ok(())
    }
}
