//! Scripted language model for orchestrator and extraction tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use pilot_core::error::ModelError;
use pilot_core::message::Message;
use pilot_core::model::{LanguageModel, TokenStream};

use crate::extraction::EXTRACTION_SYSTEM_PROMPT;

/// Replies with queued responses in order, and with a fixed reply to
/// fact-extraction calls. Once the queue is empty every call fails.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    extraction: String,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            extraction: r#"{"facts": []}"#.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_extraction(mut self, reply: &str) -> Self {
        self.extraction = reply.to_string();
        self
    }

    /// Every prompt received, extraction calls included.
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    /// System prompts of the non-extraction calls.
    pub fn system_prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| s != EXTRACTION_SYSTEM_PROMPT)
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &str,
        _history: &[Message],
        system_prompt: &str,
    ) -> Result<String, ModelError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), system_prompt.to_string()));

        if system_prompt == EXTRACTION_SYSTEM_PROMPT {
            return Ok(self.extraction.clone());
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::Unavailable("script exhausted".into()))
    }

    /// Streams the next scripted reply three characters at a time.
    async fn generate_stream(
        &self,
        prompt: &str,
        history: &[Message],
        system_prompt: &str,
        _images: &[String],
    ) -> Result<TokenStream, ModelError> {
        let text = self.generate(prompt, history, system_prompt).await?;
        let chars: Vec<char> = text.chars().collect();
        let tokens: Vec<String> = chars.chunks(3).map(|c| c.iter().collect()).collect();

        let (tx, rx) = tokio::sync::mpsc::channel(tokens.len().max(1));
        for token in tokens {
            let _ = tx.send(Ok(token)).await;
        }
        Ok(rx)
    }
}

/// Never finishes a completion. Its stream yields one token and then
/// stays open without sending anything else.
pub struct StallingModel;

#[async_trait]
impl LanguageModel for StallingModel {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _history: &[Message],
        _system_prompt: &str,
    ) -> Result<String, ModelError> {
        std::future::pending().await
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _history: &[Message],
        _system_prompt: &str,
        _images: &[String],
    ) -> Result<TokenStream, ModelError> {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let _ = tx.send(Ok("Sto ".to_string())).await;
        tokio::spawn(async move {
            let _open = tx;
            std::future::pending::<()>().await
        });
        Ok(rx)
    }
}
