use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::{error::IllustratorError, models::Character};

const BLANK_CHARACTER: &str = "Please enter both character name and description.";

fn validate(name: &str, description: &str) -> Result<(), IllustratorError> {
    if name.trim().is_empty() || description.trim().is_empty() {
        return Err(IllustratorError::validation(BLANK_CHARACTER));
    }
    Ok(())
}

/// Ordered character list, insertion order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterRegistry {
    characters: Vec<Character>,
}

impl CharacterRegistry {
    pub fn from_characters(characters: Vec<Character>) -> Self {
        Self { characters }
    }

    pub fn add(&mut self, name: &str, description: &str) -> Result<&Character, IllustratorError> {
        validate(name, description)?;
        let mut id = Uuid::new_v4();
        while self.get(id).is_some() {
            id = Uuid::new_v4();
        }
        self.characters.push(Character { id, name: name.to_string(), description: description.to_string() });
        Ok(&self.characters[self.characters.len() - 1])
    }

    /// Returns `Ok(false)` when no record has this id.
    pub fn update(&mut self, id: Uuid, name: &str, description: &str) -> Result<bool, IllustratorError> {
        validate(name, description)?;
        match self.characters.iter_mut().find(|c| c.id == id) {
            Some(character) => {
                character.name = name.to_string();
                character.description = description.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove(&mut self, id: Uuid) -> Option<Character> {
        let index = self.characters.iter().position(|c| c.id == id)?;
        Some(self.characters.remove(index))
    }

    pub fn get(&self, id: Uuid) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn as_slice(&self) -> &[Character] {
        &self.characters
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftOutcome {
    Added(Uuid),
    Updated(Uuid),
}

/// The character edit form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDraft {
    pub name: String,
    pub description: String,
    pub editing_id: Option<Uuid>,
}

impl CharacterDraft {
    pub fn begin_edit(&mut self, registry: &CharacterRegistry, id: Uuid) -> bool {
        let Some(character) = registry.get(id) else { return false };
        self.name = character.name.clone();
        self.description = character.description.clone();
        self.editing_id = Some(id);
        true
    }

    /// Adds or updates a record from the draft and clears the form on success.
    pub fn submit(&mut self, registry: &mut CharacterRegistry) -> Result<DraftOutcome, IllustratorError> {
        let outcome = match self.editing_id {
            Some(id) => {
                registry.update(id, &self.name, &self.description)?;
                DraftOutcome::Updated(id)
            }
            None => DraftOutcome::Added(registry.add(&self.name, &self.description)?.id),
        };
        self.reset();
        Ok(outcome)
    }

    pub fn reset(&mut self) {
        self.name.clear();
        self.description.clear();
        self.editing_id = None;
    }
}
