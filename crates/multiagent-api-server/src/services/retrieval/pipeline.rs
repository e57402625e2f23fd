use super::index::{DocumentIndex, ScoredPassage};
use crate::config::{PromptsConfig, RagConfig};
use crate::services::providers::{EmbeddingProvider, LlmProvider};
use crate::services::session::{Role, Turn};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PASSAGE_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub fetch_k: usize,
    pub mmr_lambda: f32,
    pub unknown_sentinel: String,
    pub condense_prompt: String,
    pub answer_prompt: String,
}

impl RetrievalConfig {
    pub fn from_settings(rag: &RagConfig, prompts: &PromptsConfig) -> Self {
        Self {
            top_k: rag.retrieval_top_k,
            fetch_k: rag.fetch_k,
            mmr_lambda: rag.mmr_lambda,
            unknown_sentinel: rag.unknown_sentinel.clone(),
            condense_prompt: prompts.condense_system_prompt.clone(),
            answer_prompt: prompts.answer_system_prompt.clone(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::from_settings(&RagConfig::default(), &PromptsConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalAnswer {
    pub text: String,
    /// Source identifiers in first-retrieved order
    pub sources: Vec<String>,
}

/// Result of one retrieval round. The document handler branches on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    Answered(RetrievalAnswer),
    /// Nothing retrieved, empty answer, or the model replied with the unknown sentinel
    Insufficient,
    /// Condensation, embedding, search or synthesis failed
    Failed(String),
}

/// Blank answers count as unknown too. Quotes and trailing punctuation around
/// the sentinel are ignored.
pub fn is_unknown_answer(text: &str, sentinel: &str) -> bool {
    let strip = |s: &str| {
        s.trim()
            .trim_matches(|c: char| matches!(c, '\'' | '"' | '«' | '»' | '.' | '!'))
            .trim()
            .to_lowercase()
    };
    let text = strip(text);
    text.is_empty() || text == strip(sentinel)
}

/// History-aware question answering over one session's document index.
pub struct RetrievalPipeline {
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl RetrievalPipeline {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self { llm, embedder, config }
    }

    pub fn unknown_sentinel(&self) -> &str {
        &self.config.unknown_sentinel
    }

    /// Never errors: every failure is folded into [`RetrievalOutcome::Failed`].
    pub async fn answer(
        &self,
        index: &DocumentIndex,
        question: &str,
        history: &[Turn],
    ) -> RetrievalOutcome {
        match self.run(index, question, history).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("❌ Retrieval failed: {:#}", e);
                RetrievalOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run(
        &self,
        index: &DocumentIndex,
        question: &str,
        history: &[Turn],
    ) -> Result<RetrievalOutcome> {
        if index.is_empty() {
            debug!("Index is empty, nothing to retrieve");
            return Ok(RetrievalOutcome::Insufficient);
        }

        let query = self.condense(question, history).await?;
        let query_vector = self.embedder.embed(&query).await?;
        let passages = index.mmr_search(
            &query_vector,
            self.config.top_k,
            self.config.fetch_k,
            self.config.mmr_lambda,
        )?;

        if passages.is_empty() {
            info!("MMR returned no passages");
            return Ok(RetrievalOutcome::Insufficient);
        }
        let best = passages.iter().map(|p| p.relevance).fold(f32::MIN, f32::max);
        info!(
            "Retrieved {} passage(s) via MMR (best relevance {:.3})",
            passages.len(),
            best
        );

        let raw = self
            .llm
            .generate(&self.synthesis_prompt(question, &passages))
            .await?;

        if is_unknown_answer(&raw, &self.config.unknown_sentinel) {
            info!("📄 Synthesis found no grounded answer");
            return Ok(RetrievalOutcome::Insufficient);
        }

        Ok(RetrievalOutcome::Answered(attach_sources(raw, &passages)))
    }

    /// Rewrites the question as a standalone retrieval query. Without history the
    /// question is used as-is and no model call is made.
    pub async fn condense(&self, question: &str, history: &[Turn]) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let prompt = format!(
            "{}\n\nCronologia:\n{}\n\nDomanda: {}",
            self.config.condense_prompt,
            render_history(history),
            question
        );
        let rewritten = self.llm.generate(&prompt).await?;
        let rewritten = rewritten.trim();

        if rewritten.is_empty() {
            Ok(question.to_string())
        } else {
            debug!("Condensed query: {}", rewritten);
            Ok(rewritten.to_string())
        }
    }

    fn synthesis_prompt(&self, question: &str, passages: &[ScoredPassage]) -> String {
        let context = passages
            .iter()
            .map(|p| format!("[Fonte: {}]\n{}", p.passage.source, p.passage.content))
            .collect::<Vec<_>>()
            .join(PASSAGE_SEPARATOR);

        format!(
            "{}\nDomanda: {}\n\nContesto:\n{}",
            self.config.answer_prompt, question, context
        )
    }
}

fn render_history(history: &[Turn]) -> String {
    history
        .iter()
        .map(|turn| match turn.role {
            Role::User => format!("Utente: {}", turn.content),
            Role::Assistant => format!("Assistente: {}", turn.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keeps the sources the model cited; if it cited none, lists every retrieved source.
fn attach_sources(raw: String, passages: &[ScoredPassage]) -> RetrievalAnswer {
    let mut retrieved: Vec<String> = Vec::new();
    for p in passages {
        if !retrieved.contains(&p.passage.source) {
            retrieved.push(p.passage.source.clone());
        }
    }

    let text = raw.trim().to_string();
    let cited: Vec<String> = retrieved
        .iter()
        .filter(|s| text.contains(s.as_str()))
        .cloned()
        .collect();

    if cited.is_empty() {
        RetrievalAnswer {
            text: format!("{}\n\nFonti: {}", text, retrieved.join(", ")),
            sources: retrieved,
        }
    } else {
        RetrievalAnswer { text, sources: cited }
    }
}
