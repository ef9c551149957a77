//! HTTP client for the text2text inference endpoints.
//!
//! The fine-tuned generation model and both translation models are served
//! behind endpoints with the same contract: `POST /generate` with `inputs`
//! and decoding `parameters`, returning `generated_text`. One call per
//! request — quality failures are handled downstream, not by retrying.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub num_beams: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_repeat_ngram_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    pub do_sample: bool,
    pub early_stopping: bool,
}

impl GenerationParams {
    /// Decoding parameters for the chat generation model.
    pub fn chat() -> Self {
        Self {
            max_new_tokens: 500,
            num_beams: 4,
            repetition_penalty: Some(1.8),
            no_repeat_ngram_size: Some(5),
            temperature: Some(0.85),
            top_p: Some(0.9),
            do_sample: true,
            early_stopping: true,
        }
    }

    /// Decoding parameters for the translation models.
    pub fn translation() -> Self {
        Self {
            max_new_tokens: 512,
            num_beams: 4,
            repetition_penalty: None,
            no_repeat_ngram_size: None,
            temperature: None,
            top_p: None,
            do_sample: false,
            early_stopping: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: &'a GenerationParams,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    generated_text: String,
}

#[derive(Debug, Clone)]
pub struct Text2TextClient {
    client: reqwest::Client,
    base_url: String,
}

impl Text2TextClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .context("Failed to build inference HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn generate(&self, inputs: &str, params: &GenerationParams) -> Result<String> {
        let url = format!("{}/generate", self.base_url);
        let request = GenerateRequest { inputs, parameters: params };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Inference request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(crate::errors::ServiceError::Inference(format!(
                "{url} returned {status}: {snippet}"
            ))
            .into());
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse inference response")?;
        Ok(parsed.generated_text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_params_serialize_all_decoding_knobs() {
        let params = GenerationParams::chat();
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["num_beams"], 4);
        assert_eq!(json["no_repeat_ngram_size"], 5);
        assert_eq!(json["do_sample"], true);
    }

    #[test]
    fn translation_params_omit_sampling_knobs() {
        let params = GenerationParams::translation();
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("repetition_penalty").is_none());
        assert_eq!(json["num_beams"], 4);
    }

    #[test]
    fn trailing_slash_trimmed_from_base_url() {
        let client = Text2TextClient::new("http://localhost:8090/").unwrap();
        assert_eq!(client.base_url, "http://localhost:8090");
    }
}
