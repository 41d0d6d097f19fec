// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock language-model provider for deterministic testing.
//!
//! `MockProvider` implements `ReplyProvider` with pre-configured responses,
//! enabling fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use waylink_core::types::{ReplyRequest, ReplyResponse};
use waylink_core::{ReplyProvider, WaylinkError};

/// Scripted outcome of one provider call.
#[derive(Debug, Clone)]
pub enum ProviderScript {
    /// Return the given text with the given token cost.
    Reply { text: String, tokens: u32 },
    /// Fail with a provider error.
    Fail,
}

/// A mock provider that pops scripted outcomes from a FIFO queue.
///
/// When the queue is empty, a default "mock reply" is returned. Every
/// received request is recorded for assertion.
pub struct MockProvider {
    scripts: Arc<Mutex<VecDeque<ProviderScript>>>,
    requests: Arc<Mutex<Vec<ReplyRequest>>>,
}

impl MockProvider {
    /// Create a mock provider with an empty script queue.
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock provider pre-loaded with replies.
    pub fn with_replies(replies: Vec<&str>) -> Self {
        let provider = Self::new();
        let scripts = replies
            .into_iter()
            .map(|text| ProviderScript::Reply {
                text: text.to_string(),
                tokens: 42,
            })
            .collect();
        *provider.scripts.try_lock().expect("fresh mutex") = scripts;
        provider
    }

    /// Queue a scripted outcome.
    pub async fn push(&self, script: ProviderScript) {
        self.scripts.lock().await.push_back(script);
    }

    /// Requests received so far.
    pub async fn requests(&self) -> Vec<ReplyRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of calls made.
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplyProvider for MockProvider {
    async fn complete(&self, request: ReplyRequest) -> Result<ReplyResponse, WaylinkError> {
        self.requests.lock().await.push(request);

        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .unwrap_or(ProviderScript::Reply {
                text: "mock reply".to_string(),
                tokens: 42,
            });

        match script {
            ProviderScript::Reply { text, tokens } => Ok(ReplyResponse {
                text,
                model: "mock-model".to_string(),
                tokens_used: tokens,
            }),
            ProviderScript::Fail => Err(WaylinkError::Provider {
                message: "scripted provider failure".to_string(),
                source: None,
            }),
        }
    }
}
