use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{provider} rejected the credentials or none were configured")]
    Unauthorized { provider: String },

    #[error("embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("vector dimension {found} does not match collection dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("collection does not exist: {0}")]
    UnknownCollection(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{provider} rejected the credentials or none were configured")]
    Unauthorized { provider: String },

    #[error("generation api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed generation response: {0}")]
    MalformedResponse(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("agent misused tool {tool}: {details}")]
    ToolMisuse { tool: String, details: String },

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("document ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("index build failed: {0}")]
    Index(#[from] SearchError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
