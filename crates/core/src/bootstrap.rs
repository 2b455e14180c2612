use crate::agent::{AnswerStrategy, RetrieveThenGenerate, SimilaritySearchTool, ToolUsingAgent};
use crate::config::{EmbedderKind, IndexBackend, QaConfig, StrategyKind};
use crate::embeddings::{CharacterNgramEmbedder, Embedder, OpenAiEmbedder};
use crate::generation::{Generator, OpenAiChatModel};
use crate::index::{build_index, IndexHandle};
use crate::ingest::load_document;
use crate::pipeline::AnswerPipeline;
use crate::stores::{LocalVectorStore, QdrantStore};
use crate::traits::VectorIndex;
use crate::{DocumentFingerprint, IndexReport, StartupError};
use std::sync::Arc;
use tracing::info;

/// Everything a request needs, built once by [`initialize`] and handed to the
/// presentation layer explicitly.
#[derive(Clone)]
pub struct AppContext {
    pub document: DocumentFingerprint,
    pub index: IndexHandle,
    pub pipeline: AnswerPipeline,
    pub report: IndexReport,
    pub top_k: usize,
}

impl AppContext {
    pub fn new(
        document: DocumentFingerprint,
        index: IndexHandle,
        pipeline: AnswerPipeline,
        report: IndexReport,
        top_k: usize,
    ) -> Self {
        Self {
            document,
            index,
            pipeline,
            report,
            top_k,
        }
    }
}

/// The store a config asks for. The local store's stale temp files are
/// cleared before it is handed out.
pub async fn open_store(config: &QaConfig) -> Result<Arc<dyn VectorIndex>, StartupError> {
    match &config.backend {
        IndexBackend::Local => {
            let store = LocalVectorStore::new(&config.persist_dir);
            store.clear_system_cache().await?;
            Ok(Arc::new(store))
        }
        IndexBackend::Qdrant { url } => Ok(Arc::new(QdrantStore::new(url.clone()))),
    }
}

pub fn make_embedder(config: &QaConfig) -> Arc<dyn Embedder> {
    match config.embedder {
        EmbedderKind::OpenAi => Arc::new(OpenAiEmbedder::new(config.provider.clone())),
        EmbedderKind::CharacterNgram => Arc::new(CharacterNgramEmbedder::default()),
    }
}

/// Builds every collaborator from `config` and runs the startup sequence.
pub async fn initialize(config: &QaConfig) -> Result<AppContext, StartupError> {
    config.validate()?;
    let store = open_store(config).await?;
    let embedder = make_embedder(config);
    let generator: Arc<dyn Generator> = Arc::new(OpenAiChatModel::new(config.provider.clone()));
    initialize_with(config, store, embedder, generator).await
}

/// Loads the document, builds the index and wires the answering pipeline.
/// Any failure aborts startup; no context exists until every step succeeded.
pub async fn initialize_with(
    config: &QaConfig,
    store: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
) -> Result<AppContext, StartupError> {
    let loaded = load_document(&config.document_path, &config.ingestion)?;

    let (index, report) = build_index(
        &loaded.fingerprint,
        &loaded.pages,
        &config.collection,
        store,
        embedder,
    )
    .await?;

    let tool = SimilaritySearchTool::new(
        index.clone(),
        config.store_info.clone(),
        config.retrieval.top_k,
    );
    let strategy: Arc<dyn AnswerStrategy> = match config.retrieval.strategy {
        StrategyKind::ToolUsingAgent => Arc::new(ToolUsingAgent::new(
            tool,
            generator.clone(),
            config.retrieval.max_tool_rounds,
        )),
        StrategyKind::RetrieveThenGenerate => {
            Arc::new(RetrieveThenGenerate::new(tool, generator.clone()))
        }
    };
    let pipeline = AnswerPipeline::new(strategy, generator)
        .with_reformat_subject(config.retrieval.reformat_subject.clone());

    info!(
        document = %loaded.fingerprint.document_title,
        collection = %config.collection,
        strategy = ?config.retrieval.strategy,
        "startup complete"
    );

    Ok(AppContext::new(
        loaded.fingerprint,
        index,
        pipeline,
        report,
        config.retrieval.top_k,
    ))
}
