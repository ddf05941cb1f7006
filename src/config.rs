use anyhow::{Context, Result};
use std::path::PathBuf;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-3.0-generate-002";
/// `STORE_PATH` value that keeps the session in memory only.
pub const IN_MEMORY_STORE: &str = ":memory:";

#[derive(Debug, Clone)]
pub struct Config {
    /// Used when the session has no key of its own.
    pub fallback_api_key: String,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub store_path: PathBuf,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fallback_api_key: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            store_path: PathBuf::from("story_illustrator.json"),
            port: 8080,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let port = match lookup("PORT") {
            Some(raw) => raw.parse().with_context(|| format!("PORT must be a port number, got {raw:?}"))?,
            None => defaults.port,
        };
        Ok(Self {
            fallback_api_key: lookup("GEMINI_API_KEY").unwrap_or(defaults.fallback_api_key),
            api_base: lookup("GEMINI_API_BASE").unwrap_or(defaults.api_base),
            text_model: lookup("GEMINI_TEXT_MODEL").unwrap_or(defaults.text_model),
            image_model: lookup("GEMINI_IMAGE_MODEL").unwrap_or(defaults.image_model),
            store_path: lookup("STORE_PATH").map(PathBuf::from).unwrap_or(defaults.store_path),
            port,
        })
    }
}
