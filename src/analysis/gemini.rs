//! Gemini `generateContent` client for capture analysis and image edits.
//!
//! Analysis calls ask the model for a JSON body (`description` + `points`)
//! and fall back to treating the reply as free text when the model ignores
//! the response schema. Edit calls use an image-output model and surface
//! whichever modality comes back.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::warn;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{AnalysisClient, AnalysisError, EditOutcome};
use crate::models::{AnalysisResult, MediaPayload};
use crate::settings::SettingsStore;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const ANALYZE_PROMPT: &str = "Describe what this capture shows. Respond with JSON: \
{\"description\": one-sentence summary, \"points\": array of 3-6 short insight strings}.";

pub struct GeminiClient {
    http: Client,
    settings: Arc<SettingsStore>,
}

impl GeminiClient {
    /// Key, model names and timeout are resolved per call from the settings
    /// store, so a key added after startup takes effect without a restart.
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self {
            http: Client::new(),
            settings,
        }
    }

    async fn generate(&self, model: &str, body: Value) -> Result<Vec<Part>, AnalysisError> {
        let config = self.settings.analysis();
        let api_key = config.resolve_api_key().ok_or(AnalysisError::MissingApiKey)?;
        let url = format!("{API_BASE}/{model}:generateContent");

        let response = self
            .http
            .post(&url)
            .query(&[("key", api_key.as_str())])
            .timeout(Duration::from_secs(config.timeout_secs))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AnalysisError::RemoteStatus {
                status: status.as_u16(),
                message: truncate(&message, 300),
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| AnalysisError::Malformed(err.to_string()))?;

        let parts = parsed
            .candidates
            .into_iter()
            .next()
            .map(|candidate| candidate.content.parts)
            .unwrap_or_default();

        if parts.is_empty() {
            return Err(AnalysisError::Malformed("response carried no candidates".into()));
        }
        Ok(parts)
    }

    async fn analyze(&self, payload: &MediaPayload) -> Result<AnalysisResult, AnalysisError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": {
                        "mimeType": payload.mime_type,
                        "data": STANDARD.encode(&payload.bytes),
                    }},
                    { "text": ANALYZE_PROMPT },
                ],
            }],
            "generationConfig": { "responseMimeType": "application/json" },
        });

        let model = self.settings.analysis().analysis_model;
        let parts = self.generate(&model, body).await?;
        let text = collect_text(&parts);
        if text.trim().is_empty() {
            return Err(AnalysisError::Malformed("analysis reply carried no text".into()));
        }
        Ok(parse_analysis_text(&text))
    }
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    async fn analyze_image(&self, payload: &MediaPayload) -> Result<AnalysisResult, AnalysisError> {
        self.analyze(payload).await
    }

    async fn analyze_video(&self, payload: &MediaPayload) -> Result<AnalysisResult, AnalysisError> {
        self.analyze(payload).await
    }

    async fn edit_image(
        &self,
        payload: &MediaPayload,
        instruction: &str,
    ) -> Result<EditOutcome, AnalysisError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": {
                        "mimeType": payload.mime_type,
                        "data": STANDARD.encode(&payload.bytes),
                    }},
                    { "text": instruction },
                ],
            }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });

        let model = self.settings.analysis().edit_model;
        let parts = self.generate(&model, body).await?;
        Ok(outcome_from_parts(parts))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

fn collect_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefer the structured body the prompt asks for; degrade to bullet-line
/// splitting when the model answered in prose anyway.
fn parse_analysis_text(text: &str) -> AnalysisResult {
    #[derive(Deserialize)]
    struct Structured {
        description: Option<String>,
        #[serde(default)]
        points: Vec<String>,
    }

    if let Ok(structured) = serde_json::from_str::<Structured>(text.trim()) {
        return AnalysisResult {
            description: structured.description.filter(|d| !d.trim().is_empty()),
            points: structured
                .points
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        };
    }

    let mut description_lines = Vec::new();
    let mut points = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
            .or_else(|| trimmed.strip_prefix("• "))
        {
            points.push(rest.trim().to_string());
        } else {
            description_lines.push(trimmed);
        }
    }

    AnalysisResult {
        description: if description_lines.is_empty() {
            None
        } else {
            Some(description_lines.join(" "))
        },
        points,
    }
}

fn outcome_from_parts(parts: Vec<Part>) -> EditOutcome {
    let mut outcome = EditOutcome::default();
    let mut texts = Vec::new();

    for part in parts {
        if let Some(inline) = part.inline_data {
            match STANDARD.decode(inline.data.as_bytes()) {
                Ok(bytes) if outcome.image.is_none() => {
                    outcome.image = Some(MediaPayload::new(bytes, inline.mime_type));
                }
                Ok(_) => {}
                Err(err) => warn!("discarding undecodable inline image part: {err}"),
            }
        }
        if let Some(text) = part.text {
            if !text.trim().is_empty() {
                texts.push(text.trim().to_string());
            }
        }
    }

    if !texts.is_empty() {
        outcome.text = Some(texts.join("\n"));
    }
    outcome
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(text: Option<&str>, inline: Option<(&str, &str)>) -> Part {
        Part {
            text: text.map(str::to_string),
            inline_data: inline.map(|(mime, data)| InlineData {
                mime_type: mime.to_string(),
                data: data.to_string(),
            }),
        }
    }

    #[test]
    fn parses_structured_analysis_body() {
        let result = parse_analysis_text(
            r#"{"description": "A tabby cat on a windowsill.", "points": ["Indoor scene", "Natural light"]}"#,
        );
        assert_eq!(
            result.description.as_deref(),
            Some("A tabby cat on a windowsill.")
        );
        assert_eq!(result.points, vec!["Indoor scene", "Natural light"]);
    }

    #[test]
    fn falls_back_to_bullet_splitting() {
        let result = parse_analysis_text("A busy street market.\n- fruit stalls\n* many shoppers");
        assert_eq!(result.description.as_deref(), Some("A busy street market."));
        assert_eq!(result.points, vec!["fruit stalls", "many shoppers"]);
    }

    #[test]
    fn edit_outcome_prefers_first_inline_image() {
        let encoded = STANDARD.encode([1u8, 2, 3]);
        let outcome = outcome_from_parts(vec![
            part(Some("done"), None),
            part(None, Some(("image/png", encoded.as_str()))),
        ]);

        let image = outcome.image.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.bytes, vec![1, 2, 3]);
        assert_eq!(outcome.text.as_deref(), Some("done"));
    }

    #[test]
    fn empty_parts_yield_empty_outcome() {
        assert!(outcome_from_parts(Vec::new()).is_empty());
    }
}
