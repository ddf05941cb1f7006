use std::{collections::VecDeque, sync::Arc};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn, error};
use uuid::Uuid;

use crate::{
    error::IllustratorError,
    gemini::{IllustrationBackend, ImageRequest, PromptRequest},
    models::IllustrationPrompt,
    state::{Action, Session},
    store::{PersistedFields, Persistence},
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BatchEvent {
    PromptsReady { count: usize },
    ItemStarted { id: Uuid },
    ItemSettled { id: Uuid, images: usize, error: Option<String> },
    BatchCompleted { succeeded: usize, failed: usize },
    BatchFailed { error: String },
}

/// FIFO of prompt ids whose images are generated one at a time.
#[derive(Debug, Default)]
pub struct ImageQueue {
    pending: VecDeque<Uuid>,
}

impl ImageQueue {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self { pending: ids.into_iter().collect() }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Iterator for ImageQueue {
    type Item = Uuid;

    fn next(&mut self) -> Option<Uuid> {
        self.pending.pop_front()
    }
}

/// Owns the session and applies every transition through the reducer,
/// mirroring persisted fields after each one.
pub struct Orchestrator {
    session: RwLock<Session>,
    backend: Arc<dyn IllustrationBackend>,
    persistence: Persistence,
    fallback_api_key: String,
    events: broadcast::Sender<BatchEvent>,
}

impl Orchestrator {
    pub fn new(session: Session, backend: Arc<dyn IllustrationBackend>, persistence: Persistence, fallback_api_key: String) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { session: RwLock::new(session), backend, persistence, fallback_api_key, events }
    }

    pub fn snapshot(&self) -> Session {
        self.session.read().clone()
    }

    pub fn prompt(&self, id: Uuid) -> Option<IllustrationPrompt> {
        self.session.read().prompt(id).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: BatchEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Applies one action and writes any changed persisted field.
    /// A failed write keeps the new state but is reported to the caller.
    pub fn dispatch(&self, action: Action) -> Result<Session, IllustratorError> {
        match self.transition(action)? {
            (_, Some(e)) => Err(e),
            (session, None) => Ok(session),
        }
    }

    /// Like `dispatch`, but a failed write only lands in the message area so
    /// a running batch still reaches its terminal state.
    fn transition(&self, action: Action) -> Result<(Session, Option<IllustratorError>), IllustratorError> {
        let mut session = self.session.write();
        let before = PersistedFields::capture(&session);
        let result = session.apply(action);
        let after = PersistedFields::capture(&session);
        let unsaved = self.persistence.observe(&before, &after).err();
        if let Some(e) = &unsaved {
            error!("❌ Failed to persist session: {}", e);
            session.message = Some(e.to_string());
        }
        result.map(|_| (session.clone(), unsaved))
    }

    fn api_key(&self, session: &Session) -> String {
        if session.config.api_key.is_empty() {
            self.fallback_api_key.clone()
        } else {
            session.config.api_key.clone()
        }
    }

    /// Runs a batch on its own task so a dropped caller cannot leave the
    /// session stuck mid-batch.
    pub async fn run_batch(self: Arc<Self>) -> Result<Vec<Uuid>, IllustratorError> {
        let worker = tokio::spawn(async move { self.generate_prompts().await });
        worker.await.unwrap_or_else(|e| {
            error!("❌ Batch task ended abnormally: {}", e);
            Err(IllustratorError::PromptGeneration(format!("Batch task ended abnormally: {e}")))
        })
    }

    /// Detached counterpart of `generate_image`.
    pub async fn run_image(self: Arc<Self>, id: Uuid) -> Result<IllustrationPrompt, IllustratorError> {
        let worker = tokio::spawn(async move { self.generate_image(id).await });
        worker.await.unwrap_or_else(|e| {
            error!("❌ Image task for {} ended abnormally: {}", id, e);
            Err(IllustratorError::Remote(format!("Image task ended abnormally: {e}")))
        })
    }

    /// Generates a fresh batch of prompts, then images for each of them in order.
    pub async fn generate_prompts(&self) -> Result<Vec<Uuid>, IllustratorError> {
        let request = {
            let (session, _) = self.transition(Action::PromptsRequested)?;
            if session.characters.is_empty() {
                info!("No characters defined; prompts rely on the story alone");
            }
            PromptRequest {
                api_key: self.api_key(&session),
                story: session.config.story.clone(),
                style: session.config.style.clone(),
                count: session.config.num_illustrations,
                characters: session.characters.as_slice().to_vec(),
            }
        };
        info!("🚀 Generating {} illustration prompts", request.count);

        let texts = match self.backend.generate_prompts(&request).await {
            Ok(texts) => texts,
            Err(e) => {
                error!("❌ Prompt generation failed: {}", e);
                self.transition(Action::PromptsFailed(e.clone()))?;
                self.emit(BatchEvent::BatchFailed { error: e.to_string() });
                return Err(e);
            }
        };

        let (session, _) = self.transition(Action::PromptsGenerated(texts))?;
        let ids: Vec<Uuid> = session.prompts.iter().map(|p| p.id).collect();
        self.emit(BatchEvent::PromptsReady { count: ids.len() });

        let queue = ImageQueue::new(ids.iter().copied());
        if queue.is_empty() {
            warn!("No prompts to illustrate in this batch");
        } else {
            info!("🖼️ Queued {} prompts for image generation", queue.len());
        }
        let (mut succeeded, mut failed) = (0, 0);
        for id in queue {
            match self.generate_image(id).await {
                Ok(_) => succeeded += 1,
                Err(_) => failed += 1,
            }
        }

        self.transition(Action::BatchCompleted)?;
        info!("✅ Batch finished: {} succeeded, {} failed", succeeded, failed);
        self.emit(BatchEvent::BatchCompleted { succeeded, failed });
        Ok(ids)
    }

    /// Runs one prompt item through loading to success or error.
    /// Failures are recorded on the item as well as returned.
    pub async fn generate_image(&self, id: Uuid) -> Result<IllustrationPrompt, IllustratorError> {
        let request = {
            let (session, _) = self.transition(Action::ImageRequested(id))?;
            let prompt = session.prompt(id).ok_or(IllustratorError::UnknownPrompt(id))?;
            ImageRequest {
                api_key: self.api_key(&session),
                prompt: prompt.prompt_text.clone(),
                count: prompt.num_images_to_generate,
            }
        };
        self.emit(BatchEvent::ItemStarted { id });

        let outcome = match request.validate() {
            Ok(()) => self.backend.generate_images(&request).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            error!("❌ Image generation for {} failed: {}", id, e);
        }
        let images = outcome.as_ref().map(Vec::len).unwrap_or(0);
        let settled_error = outcome.as_ref().err().cloned();
        self.transition(Action::ImageSettled { id, outcome })?;
        self.emit(BatchEvent::ItemSettled { id, images, error: settled_error.as_ref().map(|e| e.image_failure_text()) });

        let prompt = self.prompt(id);
        if let Some(p) = &prompt {
            info!("🏁 Prompt {} settled as {:?}", id, p.status());
        }
        match settled_error {
            Some(e) => Err(e),
            None => prompt.ok_or(IllustratorError::UnknownPrompt(id)),
        }
    }
}
