//! Grounded answer generation over retrieved passages.
//!
//! [`AnswerGenerator`] turns a query plus its retrieved passages into a
//! natural-language answer that cites its sources. [`OpenAiGenerator`]
//! implements it against the chat completions API.
//!
//! Failure and emptiness are distinct: a provider error is
//! [`Error::Generation`], while a model that replies with nothing yields
//! a successful [`Answer`] with empty text. Callers can tell "no answer
//! in the corpus" from "the call failed".

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use folio_core::error::{Error, Result};
use folio_core::Passage;

use crate::config::GenerationConfig;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are an expert assistant for literary text analysis. \
Your mission is to answer questions with maximum precision, using only the excerpts provided. \
Make no outside assumptions and never fill in missing information from your own knowledge. \
If the exact answer is not found, derive the best possible answer by rigorously analysing the context. \
When several excerpts are available, cross-reference them to reach the best deduction. \
If an excerpt contains no useful information, ignore it entirely. \
Your answers must be concise, direct, and to the point.";

const USER_PROMPT_HEADER: &str = "Here are excerpts drawn from the books.\n\
Answer the question precisely, based exclusively on these excerpts.\n\
If the exact answer is available, give it immediately.\n\
If it is not explicitly given, derive a logical answer with the most rigorous analysis possible.\n\
Only take into account the excerpts that contain useful information and ignore the rest.\n\n\
Answer:\n\
[Your answer here]\n\n\
Sources used:\n\
- Book: [book name], Page: [page number]\n\n\
If several excerpts are useful, list them all.\n\n";

/// A generated answer with the sources that grounded it.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Model reply; empty when the model produced no text.
    pub text: String,
    /// `(source_id, page range)` of every passage given as context, in
    /// the order they were provided.
    pub sources: Vec<(String, String)>,
}

/// Produces a grounded answer from a query and retrieved passages.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, query: &str, passages: &[Passage]) -> Result<Answer>;
}

/// Format passages into the context block the prompt expects.
///
/// One block per passage: a `Source: X, Page: Y` header line followed
/// by the content, blocks separated by blank lines.
pub fn format_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| format!("Source: {}, Page: {}\n{}", p.source_id, p.page_label(), p.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_messages(query: &str, passages: &[Passage]) -> serde_json::Value {
    let user = format!(
        "{}### Excerpts:\n\n{}\n\n### Question: {}",
        USER_PROMPT_HEADER,
        format_context(passages),
        query
    );
    serde_json::json!([
        { "role": "system", "content": SYSTEM_PROMPT },
        { "role": "user", "content": user },
    ])
}

fn collect_sources(passages: &[Passage]) -> Vec<(String, String)> {
    passages
        .iter()
        .map(|p| (p.source_id.clone(), p.page_label()))
        .collect()
}

/// Answer generator backed by the OpenAI chat completions API.
pub struct OpenAiGenerator {
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    /// Build a generator from configuration.
    ///
    /// Fails with [`Error::Config`] when `OPENAI_API_KEY` is missing
    /// from the environment.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::config("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Generation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(&self, query: &str, passages: &[Passage]) -> Result<Answer> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": build_messages(query, passages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        debug!(passages = passages.len(), model = %self.model, "requesting answer");

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "chat API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("invalid chat response: {}", e)))?;

        let text = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .map(|t| t.trim().to_string())
            // A present but null content is an empty reply, not a failure.
            .unwrap_or_default();

        Ok(Answer {
            text,
            sources: collect_sources(passages),
        })
    }
}
