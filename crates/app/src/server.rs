use crate::view::{render_page, Outcome};
use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use pdf_qa_core::{AnswerError, AppContext, SimilarityHit};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    context: Arc<AppContext>,
    // One question is answered at a time.
    interaction: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(context: AppContext) -> Self {
        Self {
            context: Arc::new(context),
            interaction: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: String,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    question: String,
    answer: String,
    top_match: Option<SimilarityHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_match_error: Option<String>,
}

struct Interaction {
    question: String,
    answer: String,
    top_match: Result<Option<SimilarityHit>, String>,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ask", post(ask_form))
        .route("/api/ask", post(ask_json))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app_router(state)).await?;
    Ok(())
}

/// Runs the pipeline, then the similarity search for the panel. A panel
/// failure does not discard the answer.
async fn interact(state: &AppState, question: &str) -> Result<Interaction, AnswerError> {
    let _guard = state.interaction.lock().await;
    let context = &state.context;

    let answer = context.pipeline.answer(question).await?;

    let top_match = context
        .index
        .similarity_search_with_score(&answer.question, context.top_k)
        .await
        .map(|hits| hits.into_iter().next())
        .map_err(|err| {
            warn!(error = %err, "similarity panel search failed");
            err.to_string()
        });

    Ok(Interaction {
        question: answer.question,
        answer: answer.formatted,
        top_match,
    })
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_page(
        &state.context.document.document_title,
        &Outcome::Empty,
    ))
}

async fn ask_form(State(state): State<AppState>, Form(form): Form<AskRequest>) -> Response {
    let title = state.context.document.document_title.clone();
    if form.question.trim().is_empty() {
        return Html(render_page(&title, &Outcome::Empty)).into_response();
    }

    match interact(&state, &form.question).await {
        Ok(done) => Html(render_page(
            &title,
            &Outcome::Answered {
                question: &done.question,
                answer: &done.answer,
                top_match: done.top_match.as_ref().map(Option::as_ref).map_err(String::clone),
            },
        ))
        .into_response(),
        Err(err) => {
            warn!(error = %err, "question failed");
            let message = err.to_string();
            let page = render_page(
                &title,
                &Outcome::Failed {
                    question: form.question.trim(),
                    message: &message,
                },
            );
            (StatusCode::BAD_GATEWAY, Html(page)).into_response()
        }
    }
}

async fn ask_json(State(state): State<AppState>, Json(request): Json<AskRequest>) -> Response {
    match interact(&state, &request.question).await {
        Ok(done) => {
            let (top_match, top_match_error) = match done.top_match {
                Ok(hit) => (hit, None),
                Err(message) => (None, Some(message)),
            };
            Json(AskResponse {
                question: done.question,
                answer: done.answer,
                top_match,
                top_match_error,
            })
            .into_response()
        }
        Err(AnswerError::EmptyQuestion) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": AnswerError::EmptyQuestion.to_string() })),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "question failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let context = &state.context;
    match context.index.entry_count().await {
        Ok(entries) => Json(json!({
            "status": "ok",
            "document": context.document.document_title,
            "collection": context.index.collection(),
            "entries": entries,
        }))
        .into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "error": err.to_string() })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use pdf_qa_core::{
        build_index, AnswerPipeline, AssistantTurn, CharacterNgramEmbedder, ChatMessage,
        DocumentFingerprint, GenerationError, Generator, LocalVectorStore, Page, PageMetadata,
        RetrieveThenGenerate, SimilaritySearchTool, StoreInfo, ToolSpec,
    };
    use serde_json::Value;
    use tempfile::TempDir;

    /// Drafts spaced-out text, reformats into Markdown, and fails on demand.
    struct CannedGenerator;

    #[async_trait]
    impl Generator for CannedGenerator {
        async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
            if prompt.starts_with("Please reformat") {
                return Ok("**Net profit:** 500m <script>x</script>".to_string());
            }
            if prompt.contains("Question: explode") {
                return Err(GenerationError::Api {
                    status: 500,
                    message: "upstream broke".to_string(),
                });
            }
            Ok("N e t   profit was 500m".to_string())
        }

        async fn converse(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<AssistantTurn, GenerationError> {
            Ok(AssistantTurn::Answer("unused".to_string()))
        }
    }

    fn page(ordinal: u64, text: &str) -> Page {
        Page {
            ordinal,
            text: text.to_string(),
            metadata: PageMetadata {
                source: "annualreport.pdf".to_string(),
                page: ordinal as u32 + 1,
                chunk_index: 0,
            },
        }
    }

    async fn test_state() -> (TempDir, AppState) {
        let dir = TempDir::new().expect("tempdir");
        let document = DocumentFingerprint {
            document_title: "annualreport".to_string(),
            source_path: "annualreport.pdf".to_string(),
            checksum: "abc123".to_string(),
            ingested_at: Utc::now(),
        };
        let pages = vec![
            page(0, "Net profit was 500m in the reporting year"),
            page(1, "The bank issued green bonds for sustainability"),
        ];
        let (index, report) = build_index(
            &document,
            &pages,
            "annualreport",
            Arc::new(LocalVectorStore::new(dir.path())),
            Arc::new(CharacterNgramEmbedder::default()),
        )
        .await
        .expect("index builds");

        let generator = Arc::new(CannedGenerator);
        let tool = SimilaritySearchTool::new(
            index.clone(),
            StoreInfo {
                name: "annual_report".to_string(),
                description: "A banking annual report as a PDF document".to_string(),
            },
            4,
        );
        let pipeline = AnswerPipeline::new(
            Arc::new(RetrieveThenGenerate::new(tool, generator.clone())),
            generator,
        );
        let context = AppContext::new(document, index, pipeline, report, 4);
        (dir, AppState::new(context))
    }

    async fn spawn_server() -> (TempDir, String, tokio::task::JoinHandle<()>) {
        let (dir, state) = test_state().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app_router(state))
                .await
                .expect("server run");
        });
        (dir, format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn form_page_lists_example_questions() {
        let (_dir, base, handle) = spawn_server().await;

        let body = reqwest::get(format!("{base}/"))
            .await
            .expect("index response")
            .text()
            .await
            .expect("index body");

        assert!(body.contains("Enter your question here"));
        assert!(body.contains("Provide a summary of the bank&#39;s financial performance."));
        handle.abort();
    }

    #[tokio::test]
    async fn form_submission_renders_answer_and_panel() {
        let (_dir, base, handle) = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/ask"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body("question=What+was+the+net+profit%3F")
            .send()
            .await
            .expect("ask response");
        assert!(response.status().is_success());
        let body = response.text().await.expect("ask body");

        assert!(body.contains("<strong>Net profit:</strong> 500m"));
        assert!(!body.contains("<script>"));
        assert!(body.contains("<summary>Document Similarity Search</summary>"));
        assert!(body.contains("<pre>Net profit was 500m in the reporting year</pre>"));
        handle.abort();
    }

    #[tokio::test]
    async fn blank_form_submission_shows_the_plain_page() {
        let (_dir, base, handle) = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/ask"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body("question=+++")
            .send()
            .await
            .expect("ask response");
        assert!(response.status().is_success());
        let body = response.text().await.expect("ask body");

        assert!(!body.contains("Document Similarity Search"));
        assert!(!body.contains("role=\"alert\""));
        handle.abort();
    }

    #[tokio::test]
    async fn api_returns_answer_and_top_match() {
        let (_dir, base, handle) = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/api/ask"))
            .json(&json!({ "question": "  What was the net profit?  " }))
            .send()
            .await
            .expect("api response");
        assert!(response.status().is_success());
        let body: Value = response.json().await.expect("api json");

        assert_eq!(body["question"], "What was the net profit?");
        assert_eq!(body["answer"], "**Net profit:** 500m <script>x</script>");
        assert_eq!(
            body["top_match"]["text"],
            "Net profit was 500m in the reporting year"
        );
        assert!(body.get("top_match_error").is_none());
        handle.abort();
    }

    #[tokio::test]
    async fn api_maps_failures_to_status_codes() {
        let (_dir, base, handle) = spawn_server().await;
        let client = reqwest::Client::new();

        let empty = client
            .post(format!("{base}/api/ask"))
            .json(&json!({ "question": "" }))
            .send()
            .await
            .expect("empty response");
        assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);

        let failed = client
            .post(format!("{base}/api/ask"))
            .json(&json!({ "question": "explode" }))
            .send()
            .await
            .expect("failed response");
        assert_eq!(failed.status(), reqwest::StatusCode::BAD_GATEWAY);
        let body: Value = failed.json().await.expect("error json");
        assert!(body["error"]
            .as_str()
            .is_some_and(|message| message.contains("upstream broke")));
        handle.abort();
    }

    #[tokio::test]
    async fn failed_form_question_shows_an_error_page() {
        let (_dir, base, handle) = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/ask"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body("question=explode")
            .send()
            .await
            .expect("ask response");

        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
        let body = response.text().await.expect("ask body");
        assert!(body.contains("role=\"alert\""));
        assert!(body.contains("upstream broke"));
        handle.abort();
    }

    #[tokio::test]
    async fn health_reports_indexed_entries() {
        let (_dir, base, handle) = spawn_server().await;

        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .expect("health response")
            .json()
            .await
            .expect("health json");

        assert_eq!(body["status"], "ok");
        assert_eq!(body["document"], "annualreport");
        assert_eq!(body["entries"], 2);
        handle.abort();
    }
}
