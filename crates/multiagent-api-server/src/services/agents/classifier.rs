/// Message router
/// Picks the strategy for a message: keyword roots first (cheap, no model call),
/// then an optional closed-choice LLM fallback for the ambiguous cases.

use crate::services::providers::LlmProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingDecision {
    /// Answer from the session's uploaded documents
    Document,
    /// Free-form answer from the LLM
    General,
    /// Question about the last uploaded image
    Vision,
}

impl RoutingDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingDecision::Document => "document",
            RoutingDecision::General => "general",
            RoutingDecision::Vision => "vision",
        }
    }

    /// Exact label match only.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "document" => Some(RoutingDecision::Document),
            "general" => Some(RoutingDecision::General),
            "vision" => Some(RoutingDecision::Vision),
            _ => None,
        }
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request working state. Once `decision` is set it is never recomputed.
#[derive(Debug, Clone)]
pub struct RequestState {
    pub message: String,
    pub decision: Option<RoutingDecision>,
}

impl RequestState {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            decision: None,
        }
    }
}

/// Word roots, matched as substrings of the normalized text.
pub const VISION_ROOTS: &[&str] = &["vedi", "img", "immagin", "foto", "raffigur", "disegn"];

pub const DOCUMENT_ROOTS: &[&str] = &[
    "pdf", "csv", "txt", "docx", "documento", "manuale", "contenuto",
    "riassum", "analizz", "esamin",
    "cerc", "trova", "ricerc", "informazioni",
    "spieg", "riassunto", "file", "parla", "tratta",
];

pub const CONTENT_QUESTION_PATTERNS: &[&str] = &[
    "che cosa contiene",
    "qual è il contenuto",
    "fammi un riassunto",
    "spiega il documento",
];

/// Lowercase, then drop everything that is neither a word character nor whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

fn first_match<'a>(text: &str, patterns: &[&'a str]) -> Option<&'a str> {
    patterns.iter().copied().find(|p| text.contains(p))
}

/// Pure keyword policy. `None` means ambiguous: resources exist but nothing matched.
pub fn heuristic_decision(
    normalized: &str,
    has_document: bool,
    has_image: bool,
) -> Option<RoutingDecision> {
    if has_image {
        if let Some(root) = first_match(normalized, VISION_ROOTS) {
            debug!("Detected Vision intent: matched '{}'", root);
            return Some(RoutingDecision::Vision);
        }
    }

    if has_document {
        let matched = first_match(normalized, DOCUMENT_ROOTS)
            .or_else(|| first_match(normalized, CONTENT_QUESTION_PATTERNS));
        if let Some(pattern) = matched {
            debug!("Detected Document intent: matched '{}'", pattern);
            return Some(RoutingDecision::Document);
        }
    }

    if !has_document && !has_image {
        debug!("No document or image in session, routing to General");
        return Some(RoutingDecision::General);
    }

    None
}

pub struct Classifier {
    fallback: Option<Arc<dyn LlmProvider>>,
    prompt_template: String,
}

impl Classifier {
    pub fn new(fallback: Option<Arc<dyn LlmProvider>>, prompt_template: impl Into<String>) -> Self {
        Self {
            fallback,
            prompt_template: prompt_template.into(),
        }
    }

    /// Sets and returns `state.decision`; an existing decision is returned unchanged.
    pub async fn classify(
        &self,
        state: &mut RequestState,
        has_document: bool,
        has_image: bool,
    ) -> RoutingDecision {
        if let Some(decision) = state.decision {
            return decision;
        }

        let normalized = normalize(&state.message);
        let decision = match heuristic_decision(&normalized, has_document, has_image) {
            Some(decision) => decision,
            None => match &self.fallback {
                Some(llm) => {
                    self.ask_fallback(llm.as_ref(), &state.message, has_document, has_image)
                        .await
                }
                None => {
                    debug!("Ambiguous message and no router LLM, routing to General");
                    RoutingDecision::General
                }
            },
        };

        info!("🕵️ Routing decision: {}", decision);
        state.decision = Some(decision);
        decision
    }

    fn router_prompt(&self, message: &str, has_document: bool, has_image: bool) -> String {
        self.prompt_template
            .replace("{has_images}", if has_image { "true" } else { "false" })
            .replace("{has_documents}", if has_document { "true" } else { "false" })
            .replace("{message}", message)
    }

    async fn ask_fallback(
        &self,
        llm: &dyn LlmProvider,
        message: &str,
        has_document: bool,
        has_image: bool,
    ) -> RoutingDecision {
        let prompt = self.router_prompt(message, has_document, has_image);
        match llm.generate(&prompt).await {
            Ok(answer) => {
                let label = answer.trim().to_lowercase();
                match RoutingDecision::from_label(&label) {
                    Some(decision) => {
                        info!("🕵️ Router LLM picked '{}'", decision);
                        decision
                    }
                    None => {
                        info!("Router LLM answered '{}', not a valid label; using General", label);
                        RoutingDecision::General
                    }
                }
            }
            Err(e) => {
                warn!("⚠️ Router LLM failed, falling back to General: {:#}", e);
                RoutingDecision::General
            }
        }
    }
}
