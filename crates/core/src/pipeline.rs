use crate::agent::AnswerStrategy;
use crate::generation::Generator;
use crate::normalize::normalize;
use crate::{AnswerError, GenerationError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_REFORMAT_SUBJECT: &str = "financial data summary";

/// Every stage of one answered question. Only `formatted` is meant for
/// display; the rest is kept for logging and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub draft: String,
    pub normalized: String,
    pub formatted: String,
}

pub fn reformat_prompt(subject: &str, text: &str) -> String {
    format!(
        "Please reformat the following {subject} to be clear, concise, and easy to read:\n{text}"
    )
}

/// Asks the model to rewrite `normalized_text`; the reply is returned as is.
pub async fn reformat(
    normalized_text: &str,
    subject: &str,
    generator: &dyn Generator,
) -> Result<String, GenerationError> {
    generator
        .complete(&reformat_prompt(subject, normalized_text))
        .await
}

#[derive(Clone)]
pub struct AnswerPipeline {
    strategy: Arc<dyn AnswerStrategy>,
    generator: Arc<dyn Generator>,
    reformat_subject: String,
}

impl AnswerPipeline {
    pub fn new(strategy: Arc<dyn AnswerStrategy>, generator: Arc<dyn Generator>) -> Self {
        Self {
            strategy,
            generator,
            reformat_subject: DEFAULT_REFORMAT_SUBJECT.to_string(),
        }
    }

    pub fn with_reformat_subject(mut self, subject: impl Into<String>) -> Self {
        self.reformat_subject = subject.into();
        self
    }

    /// Drafts, normalizes, then reformats. A failure at any stage fails the
    /// whole question; an earlier stage's text is never returned in its place.
    pub async fn answer(&self, question: &str) -> Result<Answer, AnswerError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AnswerError::EmptyQuestion);
        }

        let draft = self.strategy.draft(question).await?;
        let normalized = normalize(&draft);
        debug!(draft_len = draft.len(), normalized_len = normalized.len(), "draft normalized");

        let formatted = reformat(&normalized, &self.reformat_subject, self.generator.as_ref()).await?;
        info!(question, answer_len = formatted.len(), "question answered");

        Ok(Answer {
            question: question.to_string(),
            draft,
            normalized,
            formatted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::{report_tool, search_call, ScriptedGenerator};
    use crate::agent::ToolUsingAgent;
    use crate::generation::AssistantTurn;
    use async_trait::async_trait;

    struct FixedDraft(&'static str);

    #[async_trait]
    impl AnswerStrategy for FixedDraft {
        async fn draft(&self, _question: &str) -> Result<String, AnswerError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn prompt_wraps_the_text() {
        let prompt = reformat_prompt(DEFAULT_REFORMAT_SUBJECT, "Net profit was $500m");
        assert_eq!(
            prompt,
            "Please reformat the following financial data summary to be clear, concise, \
             and easy to read:\nNet profit was $500m"
        );
    }

    #[tokio::test]
    async fn reformat_sees_the_normalized_draft() -> Result<(), AnswerError> {
        let (_dir, tool) = report_tool().await;
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(search_call("call_1", "annual_report", "What was the net profit?")),
            Ok(AssistantTurn::Answer(
                "N e t   p r o f i t   w a s   $ 5 0 0 m".to_string(),
            )),
            Ok(AssistantTurn::Answer("**Net profit:** $500m".to_string())),
        ]));
        let agent = Arc::new(ToolUsingAgent::new(tool, generator.clone(), 3));
        let pipeline = AnswerPipeline::new(agent, generator.clone());

        let answer = pipeline.answer("What was the net profit?").await?;

        assert_eq!(answer.draft, "N e t   p r o f i t   w a s   $ 5 0 0 m");
        assert_eq!(answer.normalized, "Net profit was $500m");
        assert_eq!(answer.formatted, "**Net profit:** $500m");
        let prompts = generator.prompts.lock().expect("lock");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("\nNet profit was $500m"));
        assert!(!prompts[0].contains("N e t"));
        Ok(())
    }

    #[tokio::test]
    async fn reformat_failure_does_not_fall_back_to_the_draft() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Err(GenerationError::Api {
            status: 503,
            message: "overloaded".to_string(),
        })]));
        let pipeline = AnswerPipeline::new(Arc::new(FixedDraft("Net profit was $500m")), generator);

        let result = pipeline.answer("What was the net profit?").await;

        assert!(matches!(
            result,
            Err(AnswerError::Generation(GenerationError::Api { status: 503, .. }))
        ));
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let generator = Arc::new(ScriptedGenerator::new(Vec::new()));
        let pipeline = AnswerPipeline::new(Arc::new(FixedDraft("unused")), generator.clone());

        let result = pipeline.answer("   ").await;

        assert!(matches!(result, Err(AnswerError::EmptyQuestion)));
        assert!(generator.prompts.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn custom_subject_reaches_the_prompt() -> Result<(), AnswerError> {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(AssistantTurn::Answer(
            "ok".to_string(),
        ))]));
        let pipeline = AnswerPipeline::new(Arc::new(FixedDraft("draft")), generator.clone())
            .with_reformat_subject("answer");

        pipeline.answer("question").await?;

        let prompts = generator.prompts.lock().expect("lock");
        assert!(prompts[0].starts_with("Please reformat the following answer to be clear"));
        Ok(())
    }
}
