//! Gemini generateContent 客户端
//!
//! 通过 reqwest 调用 Generative Language API；图像以 base64 inline_data
//! 附在 parts 里。只取第一个 candidate 的全部文本片段拼接返回。

use base64::Engine;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::oracle::traits::{OracleClient, OracleError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
        }
    }

    async fn request(&self, body: Value) -> Result<String, OracleError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(OracleError::Http(format!("{}: {}", status, text)));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        extract_text(&value)
    }
}

/// candidates[0].content.parts[].text 拼接
fn extract_text(value: &Value) -> Result<String, OracleError> {
    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| OracleError::Malformed("missing candidates[0].content.parts".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl OracleClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        self.request(body).await
    }

    async fn generate_with_image(
        &self,
        prompt: &str,
        png: &[u8],
    ) -> Result<String, OracleError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png);
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": "image/png", "data": encoded } }
                ]
            }]
        });
        self.request(body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_joined_text_parts() {
        let v: Value = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"hello "},{"text":"world"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(&v).unwrap(), "hello world");
    }

    #[test]
    fn missing_candidates_is_malformed() {
        let v: Value = serde_json::from_str(r#"{"promptFeedback":{}}"#).unwrap();
        assert!(matches!(extract_text(&v), Err(OracleError::Malformed(_))));
    }

    #[test]
    fn empty_text_is_empty_response() {
        let v: Value =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[]}}]}"#).unwrap();
        assert!(matches!(extract_text(&v), Err(OracleError::EmptyResponse)));
    }
}
