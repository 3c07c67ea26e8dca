use std::collections::HashMap;

use crate::attachments::ImageAttachment;
use crate::format::{self, MessageDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

/// One chat bubble. Immutable once appended; the markdown is rendered a
/// single time here rather than on every view pass.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub sender: Sender,
    pub content: String,
    pub document: MessageDocument,
    pub images: Vec<ImageAttachment>,
    #[allow(dead_code)]
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, images: Vec<ImageAttachment>) -> Self {
        Self::new(Sender::User, content.into(), images)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, content.into(), Vec::new())
    }

    fn new(sender: Sender, content: String, images: Vec<ImageAttachment>) -> Self {
        let document = format::render(&content);
        ChatMessage {
            sender,
            content,
            document,
            images,
            timestamp: now_secs(),
        }
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Per-knowledge-base conversation history, keyed by KB id. Buckets are
/// created on first append and cleared independently; nothing here
/// survives the process.
#[derive(Debug, Default)]
pub struct ConversationStore {
    buckets: HashMap<String, Vec<ChatMessage>>,
}

impl ConversationStore {
    pub fn append(&mut self, kb_id: &str, message: ChatMessage) {
        self.buckets
            .entry(kb_id.to_string())
            .or_default()
            .push(message);
    }

    pub fn clear(&mut self, kb_id: &str) {
        if let Some(bucket) = self.buckets.get_mut(kb_id) {
            bucket.clear();
        }
    }

    pub fn messages(&self, kb_id: &str) -> &[ChatMessage] {
        self.buckets
            .get(kb_id)
            .map(|bucket| bucket.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self, kb_id: &str) -> bool {
        self.messages(kb_id).is_empty()
    }
}
