//! # Truthfulness Oracle
//!
//! Hosted language model that scores news text, screenshots and articles from 0 to 100.
//!
//! ## Flows
//!
//! - Text: one chat completion, JSON reply with score, reasoning and a short neutral summary
//! - Image: same call with the image attached as a data URI, score only
//! - URL: the reader service turns the page into text first, then the text flow runs on it
//!
//! Any OpenAI-compatible chat completions endpoint works. The reader is any service answering
//! `GET {reader}/{url}` with `{"data": {"content": "..."}}`.
//!
//! ## Failure
//!
//! Network errors, non-2xx statuses and replies we cannot read all become
//! [`OracleError::AnalysisFailed`]. Voting and trending never depend on this module.
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, Url, header};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

const TEXT_PROMPT: &str = "You are a fact checker. Rate how likely the news text is to be true \
    as a percentage from 0 to 100, explain the rating briefly, and summarize the news neutrally \
    in at most 10 words. Reply with a JSON object: \
    {\"truthfulnessPercentage\": number, \"reason\": string, \"summary\": string}";

const IMAGE_PROMPT: &str = "You are a fact checker. Read the text in the attached image and rate \
    how likely it is to be true as a percentage from 0 to 100. Reply with a JSON object: \
    {\"truthfulnessPercentage\": number}";

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Nothing to analyze: {0}")]
    EmptyInput(&'static str),

    #[error("Image is {0} bytes, the limit is {MAX_IMAGE_BYTES}")]
    ImageTooLarge(usize),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        OracleError::AnalysisFailed(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnalysis {
    pub truthfulness_percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    pub truthfulness_percentage: u8,
}

#[async_trait]
pub trait TruthfulnessOracle: Send + Sync {
    async fn score_text(&self, text: &str) -> Result<TextAnalysis, OracleError>;

    async fn score_image(&self, image: &[u8], mime: &str) -> Result<ImageAnalysis, OracleError>;

    async fn score_url(&self, url: &str) -> Result<TextAnalysis, OracleError>;
}

pub fn check_text(text: &str) -> Result<&str, OracleError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(OracleError::EmptyInput("news text cannot be empty"));
    }
    Ok(text)
}

pub fn check_image(image: &[u8]) -> Result<(), OracleError> {
    if image.is_empty() {
        return Err(OracleError::EmptyInput("no image uploaded"));
    }
    if image.len() > MAX_IMAGE_BYTES {
        return Err(OracleError::ImageTooLarge(image.len()));
    }
    Ok(())
}

pub fn check_url(url: &str) -> Result<Url, OracleError> {
    let parsed = Url::parse(url.trim()).map_err(|e| OracleError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(OracleError::InvalidUrl(format!("unsupported scheme {other}"))),
    }
}

pub struct HttpOracle {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    reader_url: String,
    reader_key: Option<String>,
}

impl HttpOracle {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            reader_url: "https://r.jina.ai".to_string(),
            reader_key: None,
        })
    }

    pub fn with_reader(mut self, reader_url: impl Into<String>, reader_key: Option<String>) -> Self {
        self.reader_url = reader_url.into().trim_end_matches('/').to_string();
        self.reader_key = reader_key;
        self
    }

    async fn complete(&self, system: &str, user: Value) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "response_format": { "type": "json_object" },
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Oracle returned {status}: {body}");
            return Err(OracleError::AnalysisFailed(format!("oracle returned {status}")));
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OracleError::AnalysisFailed("oracle reply had no content".into()))
    }

    async fn read_url(&self, url: &Url) -> Result<String, OracleError> {
        let mut request = self
            .client
            .get(format!("{}/{}", self.reader_url, url))
            .header(header::ACCEPT, "application/json");
        if let Some(key) = &self.reader_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("Reader returned {status} for {url}");
            return Err(OracleError::AnalysisFailed(
                "could not retrieve content from the provided URL".into(),
            ));
        }

        let page: ReaderResponse = response.json().await?;
        let content = page.data.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(OracleError::AnalysisFailed(
                "could not extract meaningful content from the URL".into(),
            ));
        }

        debug!("Read {} characters from {url}", content.len());
        Ok(content)
    }
}

#[async_trait]
impl TruthfulnessOracle for HttpOracle {
    async fn score_text(&self, text: &str) -> Result<TextAnalysis, OracleError> {
        let text = check_text(text)?;
        let content = self
            .complete(TEXT_PROMPT, Value::String(format!("News text: {text}")))
            .await?;

        parse_text_reply(&content)
    }

    async fn score_image(&self, image: &[u8], mime: &str) -> Result<ImageAnalysis, OracleError> {
        check_image(image)?;
        let data_uri = format!("data:{mime};base64,{}", STANDARD.encode(image));

        let content = self
            .complete(
                IMAGE_PROMPT,
                json!([
                    { "type": "text", "text": "Analyze this image." },
                    { "type": "image_url", "image_url": { "url": data_uri } },
                ]),
            )
            .await?;

        Ok(ImageAnalysis {
            truthfulness_percentage: parse_percentage(&content)?,
        })
    }

    async fn score_url(&self, url: &str) -> Result<TextAnalysis, OracleError> {
        let url = check_url(url)?;
        let text = self.read_url(&url).await?;

        self.score_text(&text).await
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ReaderResponse {
    data: ReaderData,
}

#[derive(Deserialize)]
struct ReaderData {
    content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextReply {
    truthfulness_percentage: f64,
    reason: Option<String>,
    #[serde(default)]
    summary: String,
}

fn clamp_score(score: f64) -> Result<u8, OracleError> {
    if !score.is_finite() {
        return Err(OracleError::AnalysisFailed(format!("score {score} is not a number")));
    }
    Ok(score.round().clamp(0.0, 100.0) as u8)
}

fn parse_text_reply(content: &str) -> Result<TextAnalysis, OracleError> {
    let reply: TextReply = serde_json::from_str(strip_fences(content))
        .map_err(|e| OracleError::AnalysisFailed(format!("unreadable oracle reply: {e}")))?;

    Ok(TextAnalysis {
        truthfulness_percentage: clamp_score(reply.truthfulness_percentage)?,
        reason: reply.reason.filter(|r| !r.trim().is_empty()),
        summary: reply.summary.trim().to_string(),
    })
}

/// Accepts `{"truthfulnessPercentage": n}` or a bare number such as `85%`.
fn parse_percentage(content: &str) -> Result<u8, OracleError> {
    let content = strip_fences(content);

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content) {
        if let Some(score) = map.get("truthfulnessPercentage").and_then(Value::as_f64) {
            return clamp_score(score);
        }
    }

    content
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .map_err(|_| OracleError::AnalysisFailed(format!("unreadable oracle reply: {content}")))
        .and_then(clamp_score)
}

fn strip_fences(content: &str) -> &str {
    content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
