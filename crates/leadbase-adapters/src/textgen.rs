//! Chat-completion client for hook generation and salary screening.
//!
//! The service is a black box with latency and occasionally malformed
//! output: hook failures surface as errors the caller counts and skips,
//! salary screening degrades to a "keep" verdict instead of failing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use leadbase_core::Lead;

use crate::http::{send_with_retry, BackoffPolicy, FetchError};
use crate::secrets::ApiKey;

#[derive(Debug, Clone)]
pub struct TextGenConfig {
    pub base_url: String,
    pub model: String,
    /// Name dropped into the closing line of every hook.
    pub brand: String,
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for TextGenConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            brand: "Our team".to_string(),
            timeout: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TextGenError {
    #[error("building http client: {0}")]
    Client(reqwest::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("decoding completion response: {0}")]
    Decode(String),
    #[error("completion response contained no choices")]
    EmptyCompletion,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalaryConfidence {
    High,
    Medium,
    #[default]
    Low,
}

/// JSON verdict returned by the screening prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryVerdict {
    pub likely_150k_plus: bool,
    #[serde(default)]
    pub confidence: SalaryConfidence,
    #[serde(default)]
    pub reasoning: String,
}

impl SalaryVerdict {
    /// Safe default when the service fails or replies with garbage.
    pub fn keep_by_default(reason: &str) -> Self {
        Self {
            likely_150k_plus: true,
            confidence: SalaryConfidence::Low,
            reasoning: format!("{reason}; keeping lead by default"),
        }
    }
}

pub struct TextGenClient {
    client: reqwest::Client,
    config: TextGenConfig,
    api_key: ApiKey,
}

impl TextGenClient {
    pub fn new(api_key: ApiKey, config: TextGenConfig) -> Result<Self, TextGenError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(TextGenError::Client)?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub async fn generate_hook(&self, lead: &Lead) -> Result<String, TextGenError> {
        let prompt = self.hook_prompt(lead);
        let content = self
            .chat(
                "You are an expert at crafting compelling, concise professional outreach messages.",
                &prompt,
                0.7,
                200,
            )
            .await?;
        let hook = content.trim().to_string();
        if hook.is_empty() {
            return Err(TextGenError::EmptyCompletion);
        }
        Ok(hook)
    }

    /// Never fails: any service or parse problem becomes a "keep" verdict.
    pub async fn screen_salary(&self, lead: &Lead) -> SalaryVerdict {
        let prompt = salary_prompt(lead);
        let content = self
            .chat(
                "You are an expert salary analyst with deep knowledge of US job market compensation. Respond only with valid JSON.",
                &prompt,
                0.3,
                150,
            )
            .await;
        match content {
            Ok(content) => match parse_verdict(&content) {
                Some(verdict) => verdict,
                None => {
                    warn!(lead_id = lead.id, "malformed screening verdict");
                    SalaryVerdict::keep_by_default("malformed verdict")
                }
            },
            Err(err) => {
                warn!(lead_id = lead.id, error = %err, "screening request failed");
                SalaryVerdict::keep_by_default("screening request failed")
            }
        }
    }

    pub fn hook_prompt(&self, lead: &Lead) -> String {
        let name = lead.full_name();
        let credentials = lead.headline.as_deref().unwrap_or_default();
        let title = lead.current_title.as_deref().unwrap_or_default();
        let location = lead.location.as_deref().unwrap_or_default();
        let company = lead.current_company.as_deref().unwrap_or_default();
        let brand = &self.config.brand;

        format!(
            r#"Parse this information about a professional:

Name: {name}
Credentials: {credentials}
Title keywords: {title}
Location: {location}
Current role: {title}
Company: {company}

Use the Name, Credentials, Title keywords, Current role, and Company fields to craft a 1-paragraph "hook". The hook is to establish my credibility as someone who can help secure them a job in this tough market impacted by AI. The language needs to be very simple. The last sentence should be something like - {brand} can help you land your next role... something like that.

The "hook" should:
- Challenge the reader's current positioning (e.g., "many firms still treat this as...")
- Point to the elevated value they bring (based on credentials/title keywords)
- Be concise and impactful
- Be super pithy, plain, direct and succinct. No more than 3 short sentences
- Create need by citing how recruiting for roles like theirs are changing due to AI
- Do not include step-by-step service description or promotion, just the paragraph
- Write in second person ("you") and reference the credentials and experience from the input
- Maintain a professional tone suited for a senior-level audience

Generate only the hook paragraph, nothing else."#
        )
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, TextGenError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.as_str())
            .json(&body);
        let bytes = send_with_retry(request, &self.config.backoff).await?;

        let parsed: ChatResponse = serde_json::from_slice(&bytes)
            .map_err(|err| TextGenError::Decode(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(TextGenError::EmptyCompletion)
    }
}

pub fn salary_prompt(lead: &Lead) -> String {
    let title = lead.current_title.as_deref().unwrap_or_default();
    let company = lead.current_company.as_deref().unwrap_or_default();
    let headline = lead.headline.as_deref().unwrap_or_default();
    let location = lead.location.as_deref().unwrap_or_default();

    format!(
        r#"Analyze this professional profile and determine if they likely earn $150,000+ per year in the United States job market.

Job Title: {title}
Company: {company}
Headline: {headline}
Location: {location}

Consider:
- Job title seniority (C-level, VP, Director, Senior, Manager, etc.)
- Industry and company type
- Geographic location (major tech hubs pay more)
- Typical salary ranges for this role
- Professional credentials and experience level indicated

Respond with ONLY a JSON object in this exact format:
{{"likely_150k_plus": true/false, "confidence": "high/medium/low", "reasoning": "brief explanation"}}"#
    )
}

/// Pull the verdict out of a completion that may be wrapped in prose or code
/// fences. Returns None when no parseable object is present.
pub fn parse_verdict(content: &str) -> Option<SalaryVerdict> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_lead() -> Lead {
        Lead {
            id: 7,
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            headline: Some("Engineering leader, 15y distributed systems".into()),
            location: Some("Austin, TX".into()),
            current_title: Some("VP Engineering".into()),
            current_company: Some("Analytical Engines".into()),
            email_address: None,
            phone_number: None,
            profile_url: Some("https://example.com/in/ada".into()),
            linkedin_url: None,
            active_project: None,
            notes: None,
            feedback: None,
            viewed: false,
            viewed_at: None,
            viewed_by: None,
            hook: None,
            hook_generated_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn hook_prompt_carries_profile_fields_and_brand() {
        let client = TextGenClient::new(
            ApiKey::new("sk-test"),
            TextGenConfig {
                brand: "Acme Career Co".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let prompt = client.hook_prompt(&sample_lead());
        assert!(prompt.contains("Name: Ada Lovelace"));
        assert!(prompt.contains("Company: Analytical Engines"));
        assert!(prompt.contains("Acme Career Co can help you land your next role"));
    }

    #[test]
    fn verdict_parses_bare_json() {
        let verdict = parse_verdict(
            r#"{"likely_150k_plus": false, "confidence": "high", "reasoning": "junior title"}"#,
        )
        .unwrap();
        assert!(!verdict.likely_150k_plus);
        assert_eq!(verdict.confidence, SalaryConfidence::High);
    }

    #[test]
    fn verdict_parses_fenced_json() {
        let content = "```json\n{\"likely_150k_plus\": true, \"confidence\": \"medium\", \"reasoning\": \"senior role\"}\n```";
        let verdict = parse_verdict(content).unwrap();
        assert!(verdict.likely_150k_plus);
        assert_eq!(verdict.confidence, SalaryConfidence::Medium);
    }

    #[test]
    fn malformed_verdict_is_rejected_not_panicked() {
        assert!(parse_verdict("no json here").is_none());
        assert!(parse_verdict("{not valid}").is_none());
    }

    #[test]
    fn default_verdict_keeps_the_lead() {
        let verdict = SalaryVerdict::keep_by_default("timeout");
        assert!(verdict.likely_150k_plus);
        assert_eq!(verdict.confidence, SalaryConfidence::Low);
    }
}
