use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    error::IllustratorError,
    gemini::{IllustrationBackend, ImageRequest, PromptRequest},
    store::KeyValueStore,
};

/// Backend that replays queued responses and records what it was asked.
#[derive(Default)]
pub struct ScriptedBackend {
    prompt_responses: Mutex<VecDeque<Result<Vec<String>, IllustratorError>>>,
    image_responses: Mutex<VecDeque<Result<Vec<String>, IllustratorError>>>,
    prompt_requests: Mutex<Vec<PromptRequest>>,
    image_requests: Mutex<Vec<ImageRequest>>,
    image_gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_prompts(&self, response: Result<Vec<String>, IllustratorError>) {
        self.prompt_responses.lock().push_back(response);
    }

    pub fn push_images(&self, response: Result<Vec<String>, IllustratorError>) {
        self.image_responses.lock().push_back(response);
    }

    pub fn last_prompt_request(&self) -> Option<PromptRequest> {
        self.prompt_requests.lock().last().cloned()
    }

    pub fn last_image_request(&self) -> Option<ImageRequest> {
        self.image_requests.lock().last().cloned()
    }

    /// Image calls wait on the returned gate until it is notified.
    pub fn hold_images(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.image_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn image_prompts(&self) -> Vec<String> {
        self.image_requests.lock().iter().map(|r| r.prompt.clone()).collect()
    }
}

#[async_trait]
impl IllustrationBackend for ScriptedBackend {
    async fn generate_prompts(&self, request: &PromptRequest) -> Result<Vec<String>, IllustratorError> {
        self.prompt_requests.lock().push(request.clone());
        self.prompt_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(IllustratorError::PromptGeneration("no scripted response".into())))
    }

    async fn generate_images(&self, request: &ImageRequest) -> Result<Vec<String>, IllustratorError> {
        self.image_requests.lock().push(request.clone());
        let gate = self.image_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.image_responses.lock().pop_front().unwrap_or(Err(IllustratorError::NoImageData))
    }
}

/// Store whose writes always fail; reads see nothing.
#[derive(Debug, Default)]
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>, IllustratorError> {
        Ok(None)
    }

    fn set(&self, key: &str, _value: &str) -> Result<(), IllustratorError> {
        Err(IllustratorError::Persistence(format!("disk full while writing {key}")))
    }
}
