use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{LlmClient, OraclePrompt};

/// Deterministic client that replays queued replies in order and records every prompt.
///
/// Used wherever a reproducible oracle is needed (tests, dry runs). Once the queue is
/// drained every further call fails.
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<OraclePrompt>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a textual reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    /// Queue a transport failure.
    pub fn fail(self, error: impl Into<String>) -> Self {
        self.push(Err(error.into()))
    }

    fn push(self, entry: Result<String, String>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(entry);
        self
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<OraclePrompt> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &OraclePrompt) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.clone());
        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(error)) => Err(anyhow!(error)),
            None => Err(anyhow!("scripted client has no reply left")),
        }
    }
}
