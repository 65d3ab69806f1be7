//! Site generation via OpenRouter.
//!
//! Turns a build brief (plus checks, attachments, and any previous README)
//! into a set of site files. The model is asked for strict JSON; responses
//! are de-fenced and re-extracted before parsing because models decorate
//! their output anyway.

use crate::attachments::SavedAttachment;
use crate::request::Round;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";
const MAX_TOKENS: u32 = 8192;
const GENERATION_TIMEOUT_SECS: u64 = 120;

/// What one generation call produced: text files keyed by repository path,
/// plus the materialized attachments the build actually used.
#[derive(Debug, Clone, Default)]
pub struct GeneratedSite {
    pub files: BTreeMap<String, String>,
    pub attachments: Vec<SavedAttachment>,
}

/// Minimal single-file site used when the provider call fails. The pipeline
/// must always have something publishable.
pub fn fallback_site() -> GeneratedSite {
    let mut files = BTreeMap::new();
    files.insert(
        "index.html".to_string(),
        "<html><body><h1>Fallback</h1></body></html>".to_string(),
    );
    GeneratedSite {
        files,
        attachments: Vec::new(),
    }
}

/// Everything the generator gets to see for one request.
pub struct GenerationInput<'a> {
    pub brief: &'a str,
    pub checks: &'a [String],
    pub attachments: &'a [SavedAttachment],
    pub round: Round,
    /// README from the previous round, when one exists.
    pub prev_readme: Option<&'a str>,
}

/// Seam over the code-generation call so the orchestrator can be tested
/// without a provider.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, input: &GenerationInput<'_>) -> anyhow::Result<GeneratedSite>;
}

// ============================================================================
// OpenRouter client
// ============================================================================

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: String,
}

#[derive(Deserialize)]
struct SiteFiles {
    files: BTreeMap<String, String>,
}

pub struct OpenRouterGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenRouterGenerator {
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(GENERATION_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        })
    }
}

#[async_trait]
impl CodeGenerator for OpenRouterGenerator {
    async fn generate(&self, input: &GenerationInput<'_>) -> anyhow::Result<GeneratedSite> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: build_user_prompt(input),
                },
            ],
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        let response = self
            .client
            .post(OPENROUTER_URL)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", "https://github.com/cameronspears/pagesmith")
            .header("X-Title", "Pagesmith")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "Generation API error {}: {}",
                status,
                truncate_str(&text, 200)
            ));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Failed to parse provider response: {}", e))?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("Provider returned no choices"))?;

        let files = parse_site_files(&content)?;
        Ok(GeneratedSite {
            files,
            attachments: input.attachments.to_vec(),
        })
    }
}

const SYSTEM_PROMPT: &str = r#"You build small static web apps. Respond with a single JSON object and nothing else:

{"files": {"index.html": "<file content>", "README.md": "<file content>", ...}}

Rules:
1. Every value is the complete text of that file.
2. Always include index.html as the entry point and a README.md describing the app.
3. Plain HTML/CSS/JS only; no build step, no external package managers.
4. The app must satisfy every acceptance check it is given."#;

fn build_user_prompt(input: &GenerationInput<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("Brief:\n{}\n", input.brief));

    if !input.checks.is_empty() {
        prompt.push_str("\nAcceptance checks:\n");
        for check in input.checks {
            prompt.push_str(&format!("- {}\n", check));
        }
    }

    if !input.attachments.is_empty() {
        prompt.push_str("\nAttached files (already committed alongside your code, reference them by name):\n");
        for attachment in input.attachments {
            prompt.push_str(&format!("- {} ({})\n", attachment.name, attachment.mime));
        }
    }

    match input.round {
        Round::Fresh => {
            prompt.push_str("\nThis is round 1: build the app from scratch.\n");
        }
        Round::Revision => {
            prompt.push_str("\nThis is round 2: revise the existing app.\n");
            if let Some(readme) = input.prev_readme {
                prompt.push_str(&format!("\nREADME from the previous round:\n{}\n", readme));
            }
        }
    }

    prompt
}

// ============================================================================
// Response parsing
// ============================================================================

/// Strip markdown code fences from a response
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = if trimmed.starts_with("```json") {
        trimmed.strip_prefix("```json").unwrap_or(trimmed)
    } else if trimmed.starts_with("```") {
        trimmed.strip_prefix("```").unwrap_or(trimmed)
    } else {
        trimmed
    };
    let clean = if clean.ends_with("```") {
        clean.strip_suffix("```").unwrap_or(clean)
    } else {
        clean
    };
    clean.trim()
}

/// Extract the outermost JSON object from surrounding prose.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start <= end {
        Some(&text[start..=end])
    } else {
        None
    }
}

fn parse_site_files(response: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let clean = strip_markdown_fences(response);
    let json_str = extract_json_object(clean).unwrap_or(clean);

    let parsed: SiteFiles = serde_json::from_str(json_str).map_err(|e| {
        anyhow::anyhow!(
            "Generated files could not be parsed ({}). Response preview: {}",
            e,
            truncate_str(json_str, 200)
        )
    })?;

    if parsed.files.is_empty() {
        return Err(anyhow::anyhow!("Generator returned an empty file set"));
    }
    Ok(parsed.files)
}

/// Truncate a string for display (Unicode-safe)
fn truncate_str(s: &str, max_chars: usize) -> &str {
    if s.chars().count() <= max_chars {
        s
    } else {
        let byte_idx = s
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        &s[..byte_idx]
    }
}
