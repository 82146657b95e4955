//! Scripted completion provider and echo renderer.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use lorekeeper_core::error::GameError;
use lorekeeper_core::provider::{CompletionProvider, PromptRenderer, PromptTemplate};
use serde_json::Value;

/// A completion provider that replays a predetermined script of responses
/// and records every prompt it receives. Once the script is exhausted it
/// returns the fallback response, or a transient error when none is set.
#[derive(Debug, Default)]
pub struct ScriptedCompletionProvider {
    script: Mutex<VecDeque<Result<String, GameError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletionProvider {
    /// Creates a provider replaying `responses` in order.
    #[must_use]
    pub fn new(responses: Vec<Result<String, GameError>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Creates a provider that answers every prompt with `response`.
    #[must_use]
    pub fn always(response: impl Into<String>) -> Self {
        Self {
            fallback: Some(response.into()),
            ..Self::default()
        }
    }

    /// Sets the response used once the script runs out.
    #[must_use]
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Returns every prompt received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of completion calls made so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String, GameError> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| GameError::TransientProvider("script exhausted".into())),
        }
    }
}

/// Renders `<template name>\n<context JSON>` so tests can assert on what the
/// pipeline asked for.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoPromptRenderer;

impl PromptRenderer for EchoPromptRenderer {
    fn render(&self, template: PromptTemplate, context: &Value) -> Result<String, GameError> {
        Ok(format!("{}\n{context}", template.name()))
    }
}
