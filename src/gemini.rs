use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn, error};

use crate::{config::Config, error::IllustratorError, models::{Character, MAX_IMAGES_PER_PROMPT}};

/// Everything the prompt endpoint needs, copied out of the session.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub api_key: String,
    pub story: String,
    pub style: String,
    pub count: u32,
    pub characters: Vec<Character>,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub api_key: String,
    pub prompt: String,
    pub count: u8,
}

impl ImageRequest {
    pub fn validate(&self) -> Result<(), IllustratorError> {
        if self.prompt.trim().is_empty() {
            return Err(IllustratorError::validation("Prompt text is empty."));
        }
        if self.count == 0 || self.count > MAX_IMAGES_PER_PROMPT {
            return Err(IllustratorError::validation(format!(
                "Number of images must be between 1 and {MAX_IMAGES_PER_PROMPT}."
            )));
        }
        Ok(())
    }
}

/// The two generative calls the orchestrator drives.
#[async_trait]
pub trait IllustrationBackend: Send + Sync {
    async fn generate_prompts(&self, request: &PromptRequest) -> Result<Vec<String>, IllustratorError>;
    /// Returns displayable data URIs.
    async fn generate_images(&self, request: &ImageRequest) -> Result<Vec<String>, IllustratorError>;
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "bytesBase64Encoded" {
                    if let serde_json::Value::String(s) = val {
                        let total = s.chars().count();
                        if total > 100 {
                            let head: String = s.chars().take(50).collect();
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", head, total - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn loggable_body(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(mut value) => {
            truncate_base64_in_json(&mut value);
            value.to_string()
        }
        Err(_) if body.len() > 1000 => format!("{}...", body.chars().take(1000).collect::<String>()),
        Err(_) => body.to_string(),
    }
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
        }
    }

    pub fn build_illustration_instruction(story: &str, style: &str, count: u32, characters: &[Character]) -> String {
        let mut instruction = format!(
            "Based on the following story, generate {count} highly detailed illustration prompts. \
            Each prompt should describe a key scene or character from the story, focusing on key visual elements, \
            atmosphere, and character actions, suitable for an image generation model. \
            Seamlessly incorporate relevant character descriptions from the provided list into each prompt. \
            Incorporate the style \"{style}\" into each prompt."
        );
        if !characters.is_empty() {
            instruction.push_str("\n\nCharacters and their descriptions:\n");
            for c in characters {
                instruction.push_str(&format!("Character Name: {}, Description: {}\n", c.name, c.description));
            }
        }
        instruction.push_str(&format!(
            "\nStory:\n{story}\n\nProvide the output as a JSON array of strings, where each string is an illustration prompt. \
            For example: [\"Prompt 1\", \"Prompt 2\"]"
        ));
        instruction
    }

    async fn post(&self, method: &str, api_key: &str, body: serde_json::Value) -> Result<String, IllustratorError> {
        let url = format!("{}/models/{}?key={}", self.base_url, method, api_key);
        let shown = if api_key.is_empty() { url.clone() } else { url.replace(api_key, "***") };
        info!("🔗 Making request to: {}", shown);

        let response = self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| IllustratorError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);
        let response_text = response.text().await.map_err(|e| IllustratorError::Http(e.to_string()))?;

        if !status.is_success() {
            error!("❌ API Error response: {}", loggable_body(&response_text));
            return Err(IllustratorError::Remote(remote_message(status, &response_text)));
        }
        info!("📥 Raw Gemini API response: {}", loggable_body(&response_text));
        Ok(response_text)
    }
}

#[async_trait]
impl IllustrationBackend for GeminiClient {
    async fn generate_prompts(&self, request: &PromptRequest) -> Result<Vec<String>, IllustratorError> {
        let instruction = Self::build_illustration_instruction(&request.story, &request.style, request.count, &request.characters);
        info!("🎯 Requesting {} illustration prompts ({} characters)", request.count, request.characters.len());

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": instruction}]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "ARRAY",
                    "items": {"type": "STRING"}
                }
            }
        });

        let method = format!("{}:generateContent", self.text_model);
        let raw = self.post(&method, &request.api_key, body).await?;
        let prompts = parse_prompt_response(&raw)?;
        if prompts.len() != request.count as usize {
            warn!("⚠️ Asked for {} prompts, model returned {}", request.count, prompts.len());
        }
        info!("✅ Generated {} illustration prompts", prompts.len());
        Ok(prompts)
    }

    async fn generate_images(&self, request: &ImageRequest) -> Result<Vec<String>, IllustratorError> {
        request.validate()?;
        let preview: String = request.prompt.chars().take(100).collect();
        info!("🎯 Generating {} image(s) for prompt: {}", request.count, preview);

        let body = json!({
            "instances": {"prompt": request.prompt},
            "parameters": {"sampleCount": request.count}
        });

        let method = format!("{}:predict", self.image_model);
        let raw = self.post(&method, &request.api_key, body).await?;
        let urls = parse_image_response(&raw)?;
        info!("✅ Received {} image(s)", urls.len());
        Ok(urls)
    }
}

/// Prefers the service's `error.message`, then the status reason.
fn remote_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or(status.as_str()).to_string())
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct ErrorEnvelope { error: ErrorBody }

#[derive(Debug, Deserialize)]
struct ErrorBody { #[serde(default)] message: Option<String> }

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
struct Part { #[serde(default)] text: Option<String> }

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "bytesBase64Encoded", default)]
    bytes_base64_encoded: Option<String>,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
}

const MALFORMED_PROMPTS: &str = "Could not generate prompts. The API response was empty or malformed.";

pub fn parse_prompt_response(raw: &str) -> Result<Vec<String>, IllustratorError> {
    let parsed: GeminiResponse = serde_json::from_str(raw)
        .map_err(|_| IllustratorError::PromptGeneration(MALFORMED_PROMPTS.into()))?;
    let text = parsed.candidates
        .first()
        .and_then(|c| c.content.parts.first())
        .and_then(|p| p.text.as_deref())
        .ok_or_else(|| IllustratorError::PromptGeneration(MALFORMED_PROMPTS.into()))?;

    let prompts: Vec<String> = serde_json::from_str(text)
        .map_err(|e| IllustratorError::PromptGeneration(format!("Model output is not a JSON array of strings: {e}")))?;
    if prompts.is_empty() {
        return Err(IllustratorError::PromptGeneration("Model returned no illustration prompts.".into()));
    }
    Ok(prompts)
}

/// Entries without decodable image bytes are dropped, not counted as errors.
pub fn parse_image_response(raw: &str) -> Result<Vec<String>, IllustratorError> {
    let parsed: PredictResponse = serde_json::from_str(raw).map_err(|e| {
        warn!("⚠️ Unexpected predict response shape: {}", e);
        IllustratorError::NoImageData
    })?;
    let total = parsed.predictions.len();

    let urls: Vec<String> = parsed.predictions
        .into_iter()
        .filter_map(|p| {
            let data = p.bytes_base64_encoded.filter(|d| !d.is_empty())?;
            let mime = match p.mime_type {
                Some(mime) => mime,
                None => sniff_mime_type(&data)?,
            };
            Some(format!("data:{};base64,{}", mime, data))
        })
        .collect();

    if urls.len() < total {
        warn!("⚠️ Dropped {} of {} predictions without usable image data", total - urls.len(), total);
    }
    if urls.is_empty() {
        return Err(IllustratorError::NoImageData);
    }
    Ok(urls)
}

/// `None` when the payload is not valid base64.
fn sniff_mime_type(data: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(data).ok()?;
    let mime = image::guess_format(&bytes)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| "image/png".to_string());
    Some(mime)
}
