//! Session state and the actions that move it forward.
//!
//! Every user action and every settled network call is an [`Action`] applied
//! through [`Session::apply`]. Nothing here touches the network or the store.

use chrono::Utc;
use serde::Serialize;
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::{
    error::IllustratorError,
    models::{DraftUpdate, IllustrationPrompt, PromptEdit, SessionConfig, SessionField, SessionUpdate, MAX_IMAGES_PER_PROMPT},
    registry::{CharacterDraft, CharacterRegistry, DraftOutcome},
};

#[derive(Debug, Clone)]
pub enum Action {
    UpdateSession(SessionUpdate),
    ClearField(SessionField),
    AddCharacter { name: String, description: String },
    UpdateCharacter { id: Uuid, name: String, description: String },
    RemoveCharacter(Uuid),
    EditCharacter(Uuid),
    UpdateDraft(DraftUpdate),
    SubmitDraft,
    EditPrompt { id: Uuid, edit: PromptEdit },
    PromptsRequested,
    PromptsGenerated(Vec<String>),
    PromptsFailed(IllustratorError),
    ImageRequested(Uuid),
    ImageSettled { id: Uuid, outcome: Result<Vec<String>, IllustratorError> },
    BatchCompleted,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(flatten)]
    pub config: SessionConfig,
    pub characters: CharacterRegistry,
    pub draft: CharacterDraft,
    pub prompts: Vec<IllustrationPrompt>,
    pub is_generating_prompts: bool,
    pub prompt_error: Option<String>,
    pub message: Option<String>,
}

fn validate_image_count(count: u8) -> Result<(), IllustratorError> {
    if count == 0 || count > MAX_IMAGES_PER_PROMPT {
        return Err(IllustratorError::validation(format!(
            "Number of images must be between 1 and {MAX_IMAGES_PER_PROMPT}."
        )));
    }
    Ok(())
}

fn validate_illustration_count(count: u32) -> Result<(), IllustratorError> {
    if count == 0 {
        return Err(IllustratorError::validation("Please request at least one illustration."));
    }
    Ok(())
}

impl Session {
    pub fn prompt(&self, id: Uuid) -> Option<&IllustrationPrompt> {
        self.prompts.iter().find(|p| p.id == id)
    }

    fn prompt_mut(&mut self, id: Uuid) -> Option<&mut IllustrationPrompt> {
        self.prompts.iter_mut().find(|p| p.id == id)
    }

    /// Validation failures are also shown in the message area.
    pub fn apply(&mut self, action: Action) -> Result<(), IllustratorError> {
        let result = self.reduce(action);
        if let Err(IllustratorError::Validation(msg)) = &result {
            self.message = Some(msg.clone());
        }
        result
    }

    fn reduce(&mut self, action: Action) -> Result<(), IllustratorError> {
        match action {
            Action::UpdateSession(update) => {
                if let Some(count) = update.num_illustrations {
                    validate_illustration_count(count)?;
                }
                let config = &mut self.config;
                if let Some(story) = update.story { config.story = story; }
                if let Some(style) = update.style { config.style = style; }
                if let Some(count) = update.num_illustrations { config.num_illustrations = count; }
                if let Some(key) = update.api_key { config.api_key = key; }
            }
            Action::ClearField(field) => match field {
                SessionField::Story => self.config.story.clear(),
                SessionField::Style => self.config.style.clear(),
                SessionField::NumIllustrations => self.config.num_illustrations = 1,
                SessionField::ApiKey => self.config.api_key.clear(),
            },
            Action::AddCharacter { name, description } => {
                self.characters.add(&name, &description)?;
                self.message = Some("Character added successfully!".into());
            }
            Action::UpdateCharacter { id, name, description } => {
                if self.characters.update(id, &name, &description)? {
                    self.message = Some("Character updated successfully!".into());
                }
            }
            Action::RemoveCharacter(id) => {
                self.characters.remove(id);
                if self.draft.editing_id == Some(id) {
                    self.draft.reset();
                }
                self.message = Some("Character removed.".into());
            }
            Action::EditCharacter(id) => {
                if self.draft.begin_edit(&self.characters, id) {
                    self.message = None;
                }
            }
            Action::UpdateDraft(update) => {
                if let Some(name) = update.name { self.draft.name = name; }
                if let Some(description) = update.description { self.draft.description = description; }
            }
            Action::SubmitDraft => {
                let (id, text) = match self.draft.submit(&mut self.characters)? {
                    DraftOutcome::Added(id) => (id, "Character added successfully!"),
                    DraftOutcome::Updated(id) => (id, "Character updated successfully!"),
                };
                tracing::debug!("Saved character {} from draft", id);
                self.message = Some(text.into());
            }
            Action::EditPrompt { id, edit } => {
                if let Some(count) = edit.num_images_to_generate {
                    validate_image_count(count)?;
                }
                let prompt = self.prompt_mut(id).ok_or(IllustratorError::UnknownPrompt(id))?;
                if let Some(text) = edit.prompt_text { prompt.prompt_text = text; }
                if let Some(count) = edit.num_images_to_generate { prompt.num_images_to_generate = count; }
                prompt.last_updated = Utc::now();
            }
            Action::PromptsRequested => {
                if self.is_generating_prompts {
                    return Err(IllustratorError::validation("Illustration prompts are already being generated."));
                }
                if self.config.story.trim().is_empty() {
                    return Err(IllustratorError::validation("Please enter a story to generate prompts."));
                }
                validate_illustration_count(self.config.num_illustrations)?;
                self.is_generating_prompts = true;
                self.prompt_error = None;
                self.prompts.clear();
                self.message = Some("Generating illustration prompts...".into());
            }
            Action::PromptsGenerated(texts) => {
                self.prompts = texts.into_iter().map(IllustrationPrompt::new).collect();
                self.message = Some("Illustration prompts generated successfully! Now generating initial images...".into());
            }
            Action::PromptsFailed(err) => {
                self.prompts.clear();
                self.is_generating_prompts = false;
                self.prompt_error = Some(format!("Failed to generate prompts: {err}"));
                self.message = None;
            }
            Action::ImageRequested(id) => {
                let prompt = self.prompt_mut(id).ok_or(IllustratorError::UnknownPrompt(id))?;
                prompt.is_loading = true;
                prompt.error = None;
                prompt.image_urls.clear();
                prompt.last_updated = Utc::now();
                self.message = None;
            }
            Action::ImageSettled { id, outcome } => {
                // The batch may have been replaced while the call was in flight.
                let Some(prompt) = self.prompt_mut(id) else {
                    tracing::warn!("⚠️ Discarding image result for stale prompt {}", id);
                    return Ok(());
                };
                prompt.is_loading = false;
                match outcome {
                    Ok(urls) => {
                        prompt.image_urls = urls;
                        prompt.error = None;
                    }
                    Err(err) => {
                        prompt.image_urls.clear();
                        prompt.error = Some(err.image_failure_text());
                    }
                }
                prompt.last_updated = Utc::now();
            }
            Action::BatchCompleted => {
                self.is_generating_prompts = false;
                self.message = Some("All initial illustration prompts and images generated!".into());
            }
        }
        Ok(())
    }
}
