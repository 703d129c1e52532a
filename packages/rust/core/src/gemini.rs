//! Google Generative Language (Gemini) REST client.
//!
//! Implements [`ImageEditor`] and [`VisionEvaluator`] over
//! `models/{model}:generateContent`. Images travel as base64 PNG inline
//! data parts.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use homeviz_shared::{GeminiConfig, HomeVizError, Result};

use crate::services::{ImageEditor, VisionEvaluator};

/// User-Agent string for Gemini requests.
const USER_AGENT: &str = concat!("HomeViz/", env!("CARGO_PKG_VERSION"));

/// Longest error body excerpt carried in an error message.
const MAX_ERROR_BODY: usize = 300;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineData>,
    #[serde(default)]
    thought: bool,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .iter()
            .take(1)
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Gemini client shared by the edit and vision capabilities.
pub struct GeminiClient {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl GeminiClient {
    /// Build a client for the model and endpoint in `config`.
    pub fn new(config: &GeminiConfig, api_key: String) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{base}/models/{}:generateContent", config.model))
            .map_err(|e| HomeVizError::config(format!("invalid gemini.base_url: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HomeVizError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<GenerateResponse> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| HomeVizError::Network(format!("gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
            if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
                return Err(HomeVizError::RateLimited(format!("HTTP {status}: {excerpt}")));
            }
            return Err(HomeVizError::Network(format!("HTTP {status}: {excerpt}")));
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| HomeVizError::Network(format!("invalid gemini response: {e}")))
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ImageEditor for GeminiClient {
    async fn edit(&self, image: &DynamicImage, prompt: &str) -> Result<DynamicImage> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![image_part(image)?, RequestPart::Text { text: prompt }],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
            }),
        };

        let response = self.generate(&request).await?;
        let inline = response
            .parts()
            .filter(|p| !p.thought)
            .find_map(|p| p.inline_data.as_ref())
            .or_else(|| response.parts().find_map(|p| p.inline_data.as_ref()));

        match inline {
            Some(data) => {
                debug!(mime = %data.mime_type, "received edited image");
                decode_image(&data.data)
            }
            None => {
                warn!("no image data in gemini response, returning input image");
                Ok(image.clone())
            }
        }
    }
}

#[async_trait]
impl VisionEvaluator for GeminiClient {
    async fn evaluate(&self, images: &[DynamicImage], prompt: &str) -> Result<String> {
        let mut parts = images
            .iter()
            .map(image_part)
            .collect::<Result<Vec<_>>>()?;
        parts.push(RequestPart::Text { text: prompt });

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: None,
        };

        let response = self.generate(&request).await?;
        let text: Vec<&str> = response
            .parts()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text.as_deref())
            .collect();
        Ok(text.join("\n").trim().to_string())
    }
}

fn image_part(image: &DynamicImage) -> Result<RequestPart<'static>> {
    Ok(RequestPart::Image {
        inline_data: InlineData {
            mime_type: "image/png".to_string(),
            data: encode_png(image)?,
        },
    })
}

/// Base64 of the PNG encoding of `image`.
pub fn encode_png(image: &DynamicImage) -> Result<String> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| HomeVizError::Image(format!("PNG encoding failed: {e}")))?;
    Ok(BASE64.encode(buf))
}

fn decode_image(data: &str) -> Result<DynamicImage> {
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| HomeVizError::Image(format!("invalid base64 image data: {e}")))?;
    image::load_from_memory(&bytes)
        .map_err(|e| HomeVizError::Image(format!("undecodable image data: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::{solid, tag_of};
    use serde_json::{Value, json};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> GeminiClient {
        let config = GeminiConfig {
            base_url: server.uri(),
            model: "test-model".into(),
            ..GeminiConfig::default()
        };
        GeminiClient::new(&config, "test-key".into()).unwrap()
    }

    fn image_response(image: &DynamicImage) -> Value {
        json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Here is the edited image."},
                        {"inlineData": {"mimeType": "image/png", "data": encode_png(image).unwrap()}}
                    ]
                }
            }]
        })
    }

    #[tokio::test]
    async fn edit_decodes_returned_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/test-model:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_response(&solid(42))))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let edited = client.edit(&solid(1), "Install screens").await.unwrap();
        assert_eq!(tag_of(&edited), 42);

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["text"], "Install screens");
        assert_eq!(
            body["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
    }

    #[tokio::test]
    async fn edit_without_image_returns_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "I can't do that."}]}}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let edited = client.edit(&solid(7), "Install screens").await.unwrap();
        assert_eq!(tag_of(&edited), 7);
    }

    #[tokio::test]
    async fn http_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.edit(&solid(1), "x").await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn resource_exhausted_body_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": {"code": 503, "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.evaluate(&[solid(1)], "rate").await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn server_error_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.edit(&solid(1), "x").await.unwrap_err();
        assert!(matches!(err, HomeVizError::Network(ref m) if m.contains("500")));
    }

    #[tokio::test]
    async fn evaluate_sends_all_images_and_joins_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [
                    {"text": "thinking about it", "thought": true},
                    {"text": "{\"score\": 0.8,"},
                    {"text": "\"reason\": \"ok\"}"}
                ]}}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let text = client
            .evaluate(&[solid(1), solid(2)], "Rate this")
            .await
            .unwrap();
        assert_eq!(text, "{\"score\": 0.8,\n\"reason\": \"ok\"}");

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let config = GeminiConfig {
            base_url: "not a url".into(),
            ..GeminiConfig::default()
        };
        let err = GeminiClient::new(&config, "k".into()).unwrap_err();
        assert!(matches!(err, HomeVizError::Config { .. }));
    }
}
