use crate::{
    config::GeminiConfig,
    error::{Error, Result},
};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

/// Trait for services that turn a prompt into raw text.
///
/// Implementations return the model's text verbatim. Shape validation
/// (for example "must contain a tab") is the caller's job.
pub trait TextGenerator {
    /// Sends `prompt` and returns the generated text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] or [`Error::Api`] when the request fails,
    /// and [`Error::MalformedResponse`] when the reply can't be read or was
    /// cut off before producing any text.
    fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Blocking client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("rename-forge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint, self.config.model
        )
    }
}

impl TextGenerator for GeminiClient {
    #[instrument(skip(self, prompt), fields(model = %self.config.model, prompt_len = prompt.len()))]
    fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        let raw = response.text().map_err(|e| Error::network(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::api(status.as_u16(), api_error_message(&raw)));
        }

        let text = extract_text(&raw)?;
        debug!("Received {} bytes of generated text", text.len());
        Ok(text)
    }
}

/// Pulls the human-readable message out of a Google API error body.
fn api_error_message(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| raw.trim().to_string())
}

/// Joins the text parts of the first candidate.
///
/// Empty text is returned as-is when the candidate finished with `STOP`;
/// callers decide whether an empty answer is acceptable.
fn extract_text(raw: &str) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(raw)
        .map_err(|e| Error::malformed(format!("invalid JSON from service: {e}")))?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let reason = parsed
            .prompt_feedback
            .map_or_else(
                || "no candidates returned".to_string(),
                |f| format!("prompt blocked: {f}"),
            );
        return Err(Error::malformed(reason));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    // An empty reply is only legitimate when generation finished normally.
    match candidate.finish_reason.as_deref() {
        Some(reason) if text.trim().is_empty() && reason != "STOP" => Err(Error::malformed(
            format!("empty response (finish reason: {reason})"),
        )),
        _ => Ok(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_joins_parts() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "A.mkv\tA (2001).mkv\n"}, {"text": "B.mkv\tB (2002).mkv"}]},
                "finishReason": "STOP"
            }]
        }"#;

        let text = extract_text(raw).unwrap();
        assert_eq!(text, "A.mkv\tA (2001).mkv\nB.mkv\tB (2002).mkv");
    }

    #[test]
    fn test_extract_text_no_candidates() {
        let raw = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = extract_text(raw).unwrap_err();
        assert!(err.is_malformed());
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_text_empty_candidate() {
        let raw = r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#;
        let err = extract_text(raw).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_extract_text_empty_but_finished() {
        let raw = r#"{"candidates": [{"content": {"parts": []}, "finishReason": "STOP"}]}"#;
        assert_eq!(extract_text(raw).unwrap(), "");
    }

    #[test]
    fn test_extract_text_invalid_json() {
        assert!(extract_text("<html>502</html>").unwrap_err().is_malformed());
    }

    #[test]
    fn test_api_error_message() {
        let raw = r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(raw), "API key not valid.");
        assert_eq!(api_error_message(" upstream timeout \n"), "upstream timeout");
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: "hello" }],
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["contents"][0]["role"], "user");
    }

    #[test]
    fn test_url() {
        let config = GeminiConfig::new("key")
            .unwrap()
            .with_endpoint("http://localhost:9999/v1beta/")
            .with_model("gemini-test");
        let client = GeminiClient::new(config).unwrap();
        assert_eq!(
            client.url(),
            "http://localhost:9999/v1beta/models/gemini-test:generateContent"
        );
    }
}
