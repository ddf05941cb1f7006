//! Durable key-value storage for the session form.
//!
//! Each form field lives under its own fixed key, so a corrupt entry only
//! costs that one field.

use std::{collections::{BTreeMap, HashMap}, fs, path::{Path, PathBuf}, sync::Arc};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::{
    error::IllustratorError,
    models::{Character, DEFAULT_NUM_ILLUSTRATIONS},
    registry::CharacterRegistry,
    state::Session,
};

pub const STORY_KEY: &str = "storyIllustrator_story";
pub const STYLE_KEY: &str = "storyIllustrator_stylePrompt";
pub const NUM_ILLUSTRATIONS_KEY: &str = "storyIllustrator_numIllustrations";
pub const CHARACTERS_KEY: &str = "storyIllustrator_characters";
pub const DRAFT_NAME_KEY: &str = "storyIllustrator_currentCharacterName";
pub const DRAFT_DESCRIPTION_KEY: &str = "storyIllustrator_currentCharacterDescription";
pub const API_KEY_KEY: &str = "storyIllustrator_geminiApiKey";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, IllustratorError>;
    fn set(&self, key: &str, value: &str) -> Result<(), IllustratorError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, IllustratorError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), IllustratorError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A JSON object file holding every entry; rewritten whole on each set.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IllustratorError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("⚠️ Store file {} is not a JSON object ({}), starting empty", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(IllustratorError::Persistence(format!("read {}: {}", path.display(), e))),
        };
        info!("💾 Opened store {} with {} entries", path.display(), entries.len());
        Ok(Self { path, entries: RwLock::new(entries) })
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), IllustratorError> {
        let body = serde_json::to_string_pretty(entries)
            .map_err(|e| IllustratorError::Persistence(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| IllustratorError::Persistence(format!("write {}: {}", self.path.display(), e)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, IllustratorError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), IllustratorError> {
        let mut entries = self.entries.write();
        if entries.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }
}

/// The slice of the session that survives restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFields {
    pub story: String,
    pub style: String,
    pub num_illustrations: u32,
    pub characters: Vec<Character>,
    pub draft_name: String,
    pub draft_description: String,
    pub api_key: String,
}

impl PersistedFields {
    pub fn capture(session: &Session) -> Self {
        Self {
            story: session.config.story.clone(),
            style: session.config.style.clone(),
            num_illustrations: session.config.num_illustrations,
            characters: session.characters.as_slice().to_vec(),
            draft_name: session.draft.name.clone(),
            draft_description: session.draft.description.clone(),
            api_key: session.config.api_key.clone(),
        }
    }

    fn entries(&self) -> Result<[(&'static str, String); 7], IllustratorError> {
        let characters = serde_json::to_string(&self.characters)
            .map_err(|e| IllustratorError::Persistence(e.to_string()))?;
        Ok([
            (STORY_KEY, self.story.clone()),
            (STYLE_KEY, self.style.clone()),
            (NUM_ILLUSTRATIONS_KEY, self.num_illustrations.to_string()),
            (CHARACTERS_KEY, characters),
            (DRAFT_NAME_KEY, self.draft_name.clone()),
            (DRAFT_DESCRIPTION_KEY, self.draft_description.clone()),
            (API_KEY_KEY, self.api_key.clone()),
        ])
    }
}

fn parse_count(raw: &str) -> Result<u32, IllustratorError> {
    match raw.trim().parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(IllustratorError::Persistence(format!("invalid illustration count {raw:?}"))),
    }
}

fn parse_characters(raw: &str) -> Result<Vec<Character>, IllustratorError> {
    serde_json::from_str(raw).map_err(|e| IllustratorError::Persistence(format!("invalid character list: {e}")))
}

#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Missing or empty entries keep their defaults; malformed ones are reset.
    pub fn restore(&self) -> Result<Session, IllustratorError> {
        let mut session = Session::default();
        let read = |key: &str| -> Result<Option<String>, IllustratorError> {
            Ok(self.store.get(key)?.filter(|v| !v.is_empty()))
        };

        if let Some(story) = read(STORY_KEY)? { session.config.story = story; }
        if let Some(style) = read(STYLE_KEY)? { session.config.style = style; }
        if let Some(raw) = read(NUM_ILLUSTRATIONS_KEY)? {
            session.config.num_illustrations = parse_count(&raw).unwrap_or_else(|e| {
                warn!("⚠️ {}; using {}", e, DEFAULT_NUM_ILLUSTRATIONS);
                DEFAULT_NUM_ILLUSTRATIONS
            });
        }
        if let Some(raw) = read(CHARACTERS_KEY)? {
            let characters = parse_characters(&raw).unwrap_or_else(|e| {
                warn!("⚠️ {}; resetting characters", e);
                Vec::new()
            });
            session.characters = CharacterRegistry::from_characters(characters);
        }
        if let Some(name) = read(DRAFT_NAME_KEY)? { session.draft.name = name; }
        if let Some(description) = read(DRAFT_DESCRIPTION_KEY)? { session.draft.description = description; }
        if let Some(key) = read(API_KEY_KEY)? { session.config.api_key = key; }

        info!(
            "📂 Restored session: {} chars of story, {} characters",
            session.config.story.len(),
            session.characters.len()
        );
        self.persist_all(&PersistedFields::capture(&session))?;
        Ok(session)
    }

    pub fn persist_all(&self, fields: &PersistedFields) -> Result<(), IllustratorError> {
        for (key, value) in fields.entries()? {
            self.store.set(key, &value)?;
        }
        Ok(())
    }

    /// Writes only the entries whose field changed between the two snapshots.
    pub fn observe(&self, before: &PersistedFields, after: &PersistedFields) -> Result<(), IllustratorError> {
        if before == after {
            return Ok(());
        }
        let old = before.entries()?;
        for ((key, new_value), (_, old_value)) in after.entries()?.into_iter().zip(old) {
            if new_value != old_value {
                self.store.set(key, &new_value)?;
            }
        }
        Ok(())
    }
}
