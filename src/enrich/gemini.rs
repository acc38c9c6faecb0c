#![cfg(feature = "enrich-gemini")]

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use super::{Enricher, WasteAnalysis, ANALYSIS_PROMPT};
use crate::config::EnrichmentSettings;

/// Gemini `generateContent` client returning structured waste analyses.
pub struct GeminiClient {
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(endpoint: &str, model: &str, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(anyhow!("gemini api key must not be empty"));
        }
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.trim().to_string(),
        })
    }

    /// Build a client from settings, reading the key from the configured env var.
    pub fn from_settings(settings: &EnrichmentSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .map_err(|_| anyhow!("{} must be set for deep scans", settings.api_key_env))?;
        Self::new(&settings.endpoint, &settings.model, &api_key)
    }

    fn request_body(jpeg: &[u8]) -> serde_json::Value {
        let data = base64::engine::general_purpose::STANDARD.encode(jpeg);
        json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": "image/jpeg", "data": data } },
                    { "text": ANALYSIS_PROMPT }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "itemName": { "type": "STRING" },
                        "material": { "type": "STRING" },
                        "recyclability": {
                            "type": "STRING",
                            "enum": ["Recyclable", "Non-Recyclable", "Compostable", "Hazardous"]
                        },
                        "disposalAdvice": { "type": "STRING" }
                    },
                    "required": ["itemName", "material", "recyclability", "disposalAdvice"]
                }
            }
        })
    }
}

fn parse_response(raw: &str) -> Result<WasteAnalysis> {
    let response: GenerateResponse =
        serde_json::from_str(raw).context("invalid generateContent response")?;
    let text = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text)
        .ok_or_else(|| anyhow!("No response from AI"))?;
    serde_json::from_str(&text).context("AI response did not match the analysis schema")
}

impl Enricher for GeminiClient {
    fn analyze(&self, jpeg: &[u8]) -> Result<WasteAnalysis> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        );
        let body = serde_json::to_string(&Self::request_body(jpeg))?;
        let raw = ureq::post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .with_context(|| format!("gemini request to model {} failed", self.model))?
            .into_string()
            .context("read gemini response body")?;
        parse_response(&raw)
    }
}
