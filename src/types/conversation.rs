//! Append-only conversation state owned by one loop run.

use std::collections::HashSet;

use crate::error::{BridgeError, Result};

use super::message::{Message, Role};

/// Ordered message history.
///
/// Only appends are possible, and a tool message is accepted only when its
/// `tool_call_id` answers a call emitted earlier in the same conversation.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    emitted_call_ids: HashSet<String>,
}

impl Conversation {
    pub fn new(initial: Vec<Message>) -> Result<Self> {
        let mut conversation = Self::default();
        for message in initial {
            conversation.push(message)?;
        }
        Ok(conversation)
    }

    /// Append one message.
    pub fn push(&mut self, message: Message) -> Result<()> {
        if message.role == Role::Tool {
            let Some(call_id) = message.tool_call_id.as_deref() else {
                return Err(BridgeError::InvalidState(
                    "tool message without tool_call_id".to_string(),
                ));
            };
            if !self.emitted_call_ids.contains(call_id) {
                return Err(BridgeError::InvalidState(format!(
                    "tool message answers unknown call '{call_id}'"
                )));
            }
        }
        for call in &message.tool_calls {
            self.emitted_call_ids.insert(call.id.clone());
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
