//! LLM-based lead assessment.
//!
//! Builds a prompt describing a lead and its website signals, sends it to
//! an OpenAI-compatible chat-completions endpoint and parses the JSON
//! answer. Transport is behind [`ChatBackend`] so the retry loop can be
//! driven without a network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::lead::{DealSize, Lead, Urgency, truncate_chars};

pub const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

const MAX_TOKENS: u32 = 400;
const TEMPERATURE: f32 = 0.7;
const AI_TIMEOUT_SECS: u64 = 30;

pub const SYSTEM_PROMPT: &str = "You are an expert digital marketing consultant specializing in helping Indian local businesses improve their online presence. You analyze business data and identify the most promising leads for web/digital services.

Respond ONLY with valid JSON. No markdown, no explanation outside JSON.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Transport-level failure of one completion attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("rate limited")]
    RateLimited,
    #[error("API returned status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(String),
}

/// One round-trip to a chat-completion service, returning the message text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError>;
}

/// OpenAI-compatible HTTP backend (Groq by default).
#[derive(Clone)]
pub struct OpenAiCompatBackend {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiCompatBackend {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self { client, api_key: api_key.into(), endpoint: GROQ_URL.to_string() }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
        debug!(model = %request.model, "chat completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .timeout(Duration::from_secs(AI_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            200 => {}
            429 => return Err(ChatError::RateLimited),
            status => return Err(ChatError::Status(status)),
        }

        let body: ChatResponse = response.json().await.map_err(|e| ChatError::Transport(e.to_string()))?;

        Ok(body.choices.into_iter().next().and_then(|c| c.message.content).unwrap_or_default())
    }
}

/// Bounded retry schedule for AI calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Rate-limit wait per attempt number: 1x, 2x, 3x ...
    pub rate_limit_step: Duration,
    /// Wait after a non-success status.
    pub status_delay: Duration,
    /// Wait after a transport error.
    pub error_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            rate_limit_step: Duration::from_secs(5),
            status_delay: Duration::from_secs(2),
            error_delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Same attempt count with every wait set to zero.
    pub fn immediate(attempts: u32) -> Self {
        Self { attempts, rate_limit_step: Duration::ZERO, status_delay: Duration::ZERO, error_delay: Duration::ZERO }
    }
}

/// Parsed model verdict for one lead.
#[derive(Debug, Clone, PartialEq)]
pub struct AiAssessment {
    /// `None` when the model omitted the score.
    pub lead_score: Option<u8>,
    pub service_opportunity: String,
    pub gaps_found: String,
    pub reasoning: String,
    pub recommended_pitch: String,
    pub urgency: Urgency,
    pub estimated_deal_size: DealSize,
}

/// Seam for the AI pass of the scoring step.
#[async_trait]
pub trait AiScorer: Send + Sync {
    /// `None` after exhausted retries or an unparseable answer.
    async fn ai_score(&self, lead: &Lead) -> Option<AiAssessment>;
}

/// [`AiScorer`] that prompts a chat model.
#[derive(Clone)]
pub struct LlmScorer {
    backend: Arc<dyn ChatBackend>,
    model: String,
    retry: RetryPolicy,
}

impl LlmScorer {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend, model: DEFAULT_MODEL.to_string(), retry: RetryPolicy::default() }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request_for(&self, lead: &Lead) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(build_prompt(lead))],
        }
    }
}

#[async_trait]
impl AiScorer for LlmScorer {
    async fn ai_score(&self, lead: &Lead) -> Option<AiAssessment> {
        let request = self.request_for(lead);
        let attempts = self.retry.attempts;

        for attempt in 1..=attempts {
            let last = attempt == attempts;

            match self.backend.complete(&request).await {
                Ok(content) => {
                    // a malformed answer is terminal; asking again rarely helps
                    return match parse_assessment(&content) {
                        Ok(assessment) => Some(assessment),
                        Err(e) => {
                            error!(lead = %lead.company_name, error = %e, "AI JSON parse error");
                            None
                        }
                    };
                }
                Err(ChatError::RateLimited) => {
                    let wait = self.retry.rate_limit_step * attempt;
                    warn!(lead = %lead.company_name, attempt, "rate limited, waiting {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
                Err(ChatError::Status(status)) => {
                    error!(lead = %lead.company_name, attempt, status, "AI API error");
                    if last {
                        return None;
                    }
                    tokio::time::sleep(self.retry.status_delay).await;
                }
                Err(ChatError::Transport(reason)) => {
                    error!(lead = %lead.company_name, attempt, %reason, "AI scoring error");
                    if !last {
                        tokio::time::sleep(self.retry.error_delay).await;
                    }
                }
            }
        }

        None
    }
}

/// Builds the user prompt for a lead.
pub fn build_prompt(lead: &Lead) -> String {
    let s = &lead.signals;
    let signals = [
        ("SSL", s.has_ssl),
        ("Mobile Optimized", s.has_mobile_viewport),
        ("WhatsApp Button", s.has_whatsapp),
        ("Online Booking", s.has_booking_form),
        ("Live Chat", s.has_chatbot),
        ("Online Payment", s.has_online_payment),
        ("Contact Form", s.has_contact_form),
        ("Gallery/Portfolio", s.has_gallery),
        ("Testimonials", s.has_testimonials),
        ("Blog/Content", s.has_blog),
    ]
    .iter()
    .map(|(name, present)| format!("  {}: {}", name, if *present { "✓" } else { "✗" }))
    .collect::<Vec<_>>()
    .join("\n");

    let tech = if s.tech_stack_detected.is_empty() { "Unknown".to_string() } else { s.tech_stack_detected.join(", ") };
    let copyright = s.copyright_year.map_or_else(|| "Unknown".to_string(), |y| y.to_string());
    let website = if lead.display_website().is_empty() { "NONE" } else { lead.display_website() };
    let rating = lead.google_rating.map_or_else(|| "N/A".to_string(), |r| r.to_string());
    let gaps = lead.rule.as_ref().map(|r| r.rule_gaps.join(", ")).unwrap_or_default();

    format!(
        r#"Analyze this Indian local business as a potential digital services lead:

BUSINESS INFO:
  Name: {name}
  Type: {kind}
  City: {city}
  Website: {website}
  Phone: {phone}
  Google Rating: {rating} ({reviews} reviews)

WEBSITE SIGNALS:
{signals}
  Tech Stack: {tech}
  Copyright Year: {copyright}

WEBSITE CONTENT PREVIEW:
  Title: {title}
  Description: {desc}
  Content: {content}

PRE-ANALYSIS GAPS: {gaps}

Respond with JSON:
{{
  "lead_score": <integer 1-10>,
  "service_opportunity": "<primary service: Website/SEO/WhatsApp/Redesign/etc>",
  "gaps_found": "<2-3 sentence summary of digital gaps>",
  "reasoning": "<why this score - business potential + digital gap severity>",
  "recommended_pitch": "<1 sentence cold outreach hook in conversational Hindi-English>",
  "urgency": "<HIGH/MEDIUM/LOW - how urgently do they need help>",
  "estimated_deal_size": "<small/medium/large>"
}}"#,
        name = or_na(&lead.company_name),
        kind = or_na(&lead.business_type),
        city = or_na(&lead.city),
        phone = or_na(&lead.phone),
        reviews = lead.google_reviews,
        title = truncate_chars(&s.page_title, 100),
        desc = truncate_chars(&s.meta_desc, 150),
        content = truncate_chars(&s.page_snippet, 300),
    )
}

/// Parses a model answer, tolerating a surrounding markdown code fence.
pub fn parse_assessment(content: &str) -> Result<AiAssessment, serde_json::Error> {
    let object: Map<String, Value> = serde_json::from_str(strip_code_fence(content))?;

    let lead_score = object.get("lead_score").and_then(score_value);

    Ok(AiAssessment {
        lead_score,
        service_opportunity: text_value(object.get("service_opportunity")),
        gaps_found: text_value(object.get("gaps_found")),
        reasoning: text_value(object.get("reasoning")),
        recommended_pitch: text_value(object.get("recommended_pitch")),
        urgency: Urgency::parse_lenient(&text_value(object.get("urgency"))),
        estimated_deal_size: DealSize::parse_lenient(&text_value(object.get("estimated_deal_size"))),
    })
}

fn strip_code_fence(content: &str) -> &str {
    content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Integer score in `1..=10`, accepting numbers or numeric strings.
fn score_value(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(raw.round().clamp(1.0, 10.0) as u8)
}

fn text_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map_or_else(|| item.to_string(), str::to_string))
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn or_na(value: &str) -> &str {
    if value.is_empty() { "N/A" } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchConfig, build_client};
    use crate::lead::SignalSet;
    use crate::testing::{CannedResponse, serve};
    use std::sync::Mutex;

    /// Replays a fixed script of outcomes and counts calls.
    struct Scripted {
        outcomes: Mutex<Vec<Result<String, ChatError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<String, ChatError>>) -> Arc<Self> {
            outcomes.reverse();
            Arc::new(Self { outcomes: Mutex::new(outcomes), calls: Mutex::new(0) })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, ChatError> {
            *self.calls.lock().unwrap() += 1;
            self.outcomes.lock().unwrap().pop().unwrap_or(Err(ChatError::Status(500)))
        }
    }

    const GOOD_ANSWER: &str = r#"{"lead_score": 8, "service_opportunity": "WhatsApp Automation", "gaps_found": "No booking. No chat.", "reasoning": "Busy clinic", "recommended_pitch": "Aapke patients WhatsApp pe book kar sakte hain", "urgency": "HIGH", "estimated_deal_size": "large"}"#;

    fn lead() -> Lead {
        let mut lead = Lead::named("Bright Smiles Dental");
        lead.business_type = "dental clinic".to_string();
        lead.city = "Pune".to_string();
        lead.website = "brightsmiles.in".to_string();
        lead.google_rating = Some(4.6);
        lead.google_reviews = 120;
        lead.signals = SignalSet { has_ssl: true, copyright_year: Some(2018), ..Default::default() };
        lead
    }

    fn scorer(backend: Arc<Scripted>) -> LlmScorer {
        LlmScorer::new(backend).with_retry(RetryPolicy::immediate(3))
    }

    #[test]
    fn test_prompt_mentions_signals_and_identity() {
        let prompt = build_prompt(&lead());
        assert!(prompt.contains("Name: Bright Smiles Dental"));
        assert!(prompt.contains("Website: brightsmiles.in"));
        assert!(prompt.contains("SSL: ✓"));
        assert!(prompt.contains("WhatsApp Button: ✗"));
        assert!(prompt.contains("Copyright Year: 2018"));
        assert!(prompt.contains("Tech Stack: Unknown"));
        assert!(prompt.contains("Google Rating: 4.6 (120 reviews)"));
    }

    #[test]
    fn test_parse_assessment() {
        let a = parse_assessment(GOOD_ANSWER).unwrap();
        assert_eq!(a.lead_score, Some(8));
        assert_eq!(a.service_opportunity, "WhatsApp Automation");
        assert_eq!(a.urgency, Urgency::High);
        assert_eq!(a.estimated_deal_size, DealSize::Large);
    }

    #[test]
    fn test_parse_assessment_fenced_and_loose() {
        let fenced = "```json\n{\"lead_score\": \"9\", \"gaps_found\": [\"No SSL\", \"No booking\"]}\n```";
        let a = parse_assessment(fenced).unwrap();
        assert_eq!(a.lead_score, Some(9));
        assert_eq!(a.gaps_found, "No SSL, No booking");
        assert_eq!(a.urgency, Urgency::Medium);
        assert_eq!(a.estimated_deal_size, DealSize::Medium);
    }

    #[test]
    fn test_parse_assessment_clamps_score() {
        assert_eq!(parse_assessment(r#"{"lead_score": 14}"#).unwrap().lead_score, Some(10));
        assert_eq!(parse_assessment(r#"{"lead_score": null}"#).unwrap().lead_score, None);
    }

    #[test]
    fn test_parse_assessment_rejects_garbage() {
        assert!(parse_assessment("Sure! Here is the analysis: great lead").is_err());
        assert!(parse_assessment("[1, 2, 3]").is_err());
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let backend = Scripted::new(vec![Ok(GOOD_ANSWER.to_string())]);
        let result = scorer(backend.clone()).ai_score(&lead()).await;
        assert_eq!(result.unwrap().lead_score, Some(8));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_after_status_then_succeeds() {
        let backend = Scripted::new(vec![Err(ChatError::Status(503)), Ok(GOOD_ANSWER.to_string())]);
        assert!(scorer(backend.clone()).ai_score(&lead()).await.is_some());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let backend = Scripted::new(vec![
            Err(ChatError::RateLimited),
            Err(ChatError::RateLimited),
            Ok(GOOD_ANSWER.to_string()),
        ]);
        assert!(scorer(backend.clone()).ai_score(&lead()).await.is_some());
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_failures() {
        let backend = Scripted::new(vec![
            Err(ChatError::Transport("connection reset".to_string())),
            Err(ChatError::Status(500)),
            Err(ChatError::Status(500)),
            Ok(GOOD_ANSWER.to_string()),
        ]);
        assert!(scorer(backend.clone()).ai_score(&lead()).await.is_none());
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_parse_error_is_not_retried() {
        let backend = Scripted::new(vec![Ok("not json at all".to_string()), Ok(GOOD_ANSWER.to_string())]);
        assert!(scorer(backend.clone()).ai_score(&lead()).await.is_none());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_backoff_grows_with_attempt() {
        let backend = Scripted::new(vec![Err(ChatError::RateLimited), Err(ChatError::RateLimited)]);
        let policy = RetryPolicy { rate_limit_step: Duration::from_millis(20), ..RetryPolicy::immediate(2) };
        let scorer = LlmScorer::new(backend).with_retry(policy);

        let started = std::time::Instant::now();
        assert!(scorer.ai_score(&lead()).await.is_none());
        // 20ms after the first attempt, 40ms after the second
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_http_backend_classifies_statuses() {
        let envelope = serde_json::json!({ "choices": [ { "message": { "role": "assistant", "content": GOOD_ANSWER } } ] });
        let server = serve(vec![
            CannedResponse::json(429, "{}"),
            CannedResponse::json(500, "{}"),
            CannedResponse::json(200, envelope.to_string()),
        ])
        .await;

        let client = build_client(&FetchConfig::default()).unwrap();
        let backend = OpenAiCompatBackend::new(client, "gsk_test").with_endpoint(server.base_url.clone());
        let request = LlmScorer::new(Arc::new(backend.clone())).request_for(&lead());

        assert_eq!(backend.complete(&request).await, Err(ChatError::RateLimited));
        assert_eq!(backend.complete(&request).await, Err(ChatError::Status(500)));
        assert_eq!(backend.complete(&request).await.unwrap(), GOOD_ANSWER);

        let sent = &server.recorded()[2];
        assert!(sent.request_line.starts_with("POST"));
        assert!(sent.body.contains("\"max_tokens\":400"));
        assert!(sent.body.contains("llama-3.3-70b-versatile"));
    }
}
