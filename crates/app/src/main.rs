mod server;
mod view;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use pdf_qa_core::config::{
    DEFAULT_API_BASE, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_OPENAI_EMBEDDING_DIMENSIONS,
};
use pdf_qa_core::{
    initialize, EmbedderKind, IndexBackend, IngestionOptions, ProviderConfig, QaConfig,
    RetrievalConfig, StoreInfo, StrategyKind,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    /// JSON files under --persist-dir
    Local,
    /// Qdrant REST API at --qdrant-url
    Qdrant,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmbedderArg {
    Openai,
    /// Offline trigram hashing, no credentials needed
    Ngram,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    /// Let the model call similarity search as a tool
    Tools,
    /// Retrieve once, then generate
    SingleShot,
}

#[derive(Parser, Debug)]
#[command(name = "pdf-qa", version, about = "Ask questions about a PDF in the browser")]
struct Cli {
    /// PDF to index at startup
    #[arg(long, env = "PDF_QA_DOCUMENT", default_value = "data/annualreport.pdf")]
    document: PathBuf,

    /// Collection name inside the index
    #[arg(long, env = "PDF_QA_COLLECTION", default_value = "annualreport")]
    collection: String,

    /// Directory for the local index
    #[arg(long, env = "PDF_QA_PERSIST_DIR", default_value = "./chroma_db")]
    persist_dir: PathBuf,

    #[arg(long, env = "PDF_QA_BACKEND", value_enum, default_value = "local")]
    backend: BackendArg,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    #[arg(long, env = "PDF_QA_EMBEDDER", value_enum, default_value = "openai")]
    embedder: EmbedderArg,

    /// API key for the model provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_API_BASE)]
    api_base: String,

    #[arg(long, env = "PDF_QA_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    #[arg(long, env = "PDF_QA_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    #[arg(long, env = "PDF_QA_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    #[arg(long, env = "PDF_QA_EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_OPENAI_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Passages returned per similarity search
    #[arg(long, env = "PDF_QA_TOP_K", default_value_t = 4)]
    top_k: usize,

    #[arg(long, env = "PDF_QA_STRATEGY", value_enum, default_value = "tools")]
    strategy: StrategyArg,

    /// Tool-call rounds before the agent must answer
    #[arg(long, env = "PDF_QA_MAX_TOOL_ROUNDS", default_value_t = 3)]
    max_tool_rounds: usize,

    #[arg(long, env = "PDF_QA_CHUNK_SIZE", default_value_t = 4_000)]
    chunk_size: usize,

    #[arg(long, env = "PDF_QA_CHUNK_OVERLAP", default_value_t = 200)]
    chunk_overlap: usize,

    /// Tool name the agent sees for the document
    #[arg(long, env = "PDF_QA_STORE_NAME", default_value = "annual_report")]
    store_name: String,

    #[arg(
        long,
        env = "PDF_QA_STORE_DESCRIPTION",
        default_value = "A banking annual report as a PDF document"
    )]
    store_description: String,

    /// What the reformatting prompt calls the answer
    #[arg(long, env = "PDF_QA_REFORMAT_SUBJECT", default_value = "financial data summary")]
    reformat_subject: String,

    #[arg(long, env = "PDF_QA_BIND", default_value = "127.0.0.1:8501")]
    bind: SocketAddr,
}

impl Cli {
    fn to_config(&self) -> QaConfig {
        QaConfig {
            document_path: self.document.clone(),
            collection: self.collection.clone(),
            persist_dir: self.persist_dir.clone(),
            backend: match self.backend {
                BackendArg::Local => IndexBackend::Local,
                BackendArg::Qdrant => IndexBackend::Qdrant {
                    url: self.qdrant_url.clone(),
                },
            },
            embedder: match self.embedder {
                EmbedderArg::Openai => EmbedderKind::OpenAi,
                EmbedderArg::Ngram => EmbedderKind::CharacterNgram,
            },
            provider: ProviderConfig {
                api_key: self.api_key.clone(),
                api_base: self.api_base.clone(),
                chat_model: self.chat_model.clone(),
                temperature: self.temperature,
                embedding_model: self.embedding_model.clone(),
                embedding_dimensions: self.embedding_dimensions,
            },
            retrieval: RetrievalConfig {
                top_k: self.top_k,
                strategy: match self.strategy {
                    StrategyArg::Tools => StrategyKind::ToolUsingAgent,
                    StrategyArg::SingleShot => StrategyKind::RetrieveThenGenerate,
                },
                max_tool_rounds: self.max_tool_rounds,
                reformat_subject: self.reformat_subject.clone(),
            },
            ingestion: IngestionOptions {
                chunk_max_chars: self.chunk_size,
                chunk_overlap_chars: self.chunk_overlap,
            },
            store_info: StoreInfo {
                name: self.store_name.clone(),
                description: self.store_description.clone(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.to_config();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        document = %config.document_path.display(),
        provider = ?config.provider,
        "pdf-qa boot"
    );

    let context = initialize(&config).await?;
    server::serve(cli.bind, server::AppState::new(context)).await
}
