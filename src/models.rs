use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const DEFAULT_STYLE: &str = "fantasy art, vibrant colors";
pub const DEFAULT_NUM_ILLUSTRATIONS: u32 = 3;
pub const MAX_IMAGES_PER_PROMPT: u8 = 4;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Character {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Idle,
    Loading,
    Success,
    Error,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IllustrationPrompt {
    pub id: Uuid,
    pub prompt_text: String,
    pub num_images_to_generate: u8,
    pub image_urls: Vec<String>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl IllustrationPrompt {
    pub fn new(prompt_text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt_text,
            num_images_to_generate: 1,
            image_urls: Vec::new(),
            is_loading: false,
            error: None,
            last_updated: Utc::now(),
        }
    }

    pub fn status(&self) -> ItemStatus {
        if self.is_loading {
            ItemStatus::Loading
        } else if self.error.is_some() {
            ItemStatus::Error
        } else if !self.image_urls.is_empty() {
            ItemStatus::Success
        } else {
            ItemStatus::Idle
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub story: String,
    pub style: String,
    pub num_illustrations: u32,
    pub api_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            story: String::new(),
            style: DEFAULT_STYLE.to_string(),
            num_illustrations: DEFAULT_NUM_ILLUSTRATIONS,
            api_key: String::new(),
        }
    }
}

/// Fields of the session form that can be cleared individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionField {
    Story,
    Style,
    NumIllustrations,
    ApiKey,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    #[serde(default)]
    pub story: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub num_illustrations: Option<u32>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CharacterInput {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DraftUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PromptEdit {
    #[serde(default)]
    pub prompt_text: Option<String>,
    #[serde(default)]
    pub num_images_to_generate: Option<u8>,
}
