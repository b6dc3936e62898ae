//! Conversational tutor built on the text generation facade.

use crate::env::defaults;
use crate::llm::TextGenerator;
use crate::pipeline::prompts::TUTOR_SYSTEM;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, future};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const NO_QUESTION_REPLY: &str = "No user question found in the message history.";
pub const TUTOR_AGENT_NAME: &str = "MATist";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorReply {
    pub agent: String,
    pub response: String,
    pub reason: String,
}

pub struct TutorAgent {
    generator: Arc<TextGenerator>,
    max_messages: usize,
    context_messages: usize,
}

impl TutorAgent {
    pub fn new(generator: Arc<TextGenerator>) -> Self {
        Self {
            generator,
            max_messages: defaults::TUTOR_MAX_MESSAGES,
            context_messages: defaults::TUTOR_CONTEXT_MESSAGES,
        }
    }

    pub async fn reply(&self, messages: &[ChatMessage]) -> TutorReply {
        let Some(query) = self.prepare(messages) else {
            return TutorReply {
                agent: TUTOR_AGENT_NAME.to_string(),
                response: NO_QUESTION_REPLY.to_string(),
                reason: "Missing user query.".to_string(),
            };
        };

        TutorReply {
            agent: TUTOR_AGENT_NAME.to_string(),
            response: self.generator.respond(TUTOR_SYSTEM, &query).await,
            reason: "MATist educational assistant".to_string(),
        }
    }

    pub async fn reply_stream(&self, messages: &[ChatMessage]) -> BoxStream<'static, String> {
        match self.prepare(messages) {
            Some(query) => self.generator.respond_stream(TUTOR_SYSTEM, &query).await,
            None => stream::once(future::ready(NO_QUESTION_REPLY.to_string())).boxed(),
        }
    }

    fn prepare(&self, messages: &[ChatMessage]) -> Option<String> {
        let history = trim_history(messages, self.max_messages);
        let query = latest_user_query(history)?;
        debug!("Tutor query with {} messages of history", history.len());
        Some(build_context_query(history, self.context_messages, query))
    }
}

/// Keep only the newest `max` messages.
pub fn trim_history(messages: &[ChatMessage], max: usize) -> &[ChatMessage] {
    &messages[messages.len().saturating_sub(max)..]
}

pub fn latest_user_query(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|message| message.role == ChatRole::User && !message.content.trim().is_empty())
        .map(|message| message.content.as_str())
}

pub fn build_context_query(messages: &[ChatMessage], context: usize, query: &str) -> String {
    let context = trim_history(messages, context)
        .iter()
        .map(|message| format!("{}: {}", message.role.as_str(), message.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Context:\n{}\n\nCurrent query: {}", context, query)
}
