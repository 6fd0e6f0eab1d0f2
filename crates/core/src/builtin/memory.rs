use crate::provider::{ChatMessage, MemoryStore, Role};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;

/// Remembers nothing.
#[derive(Debug, Default)]
pub struct NoMemory;

#[async_trait]
impl MemoryStore for NoMemory {
    async fn recall(&self, _query: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn remember(&mut self, _dialogue: &[ChatMessage]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShortTermMemoryParams {
    /// How many user/assistant exchanges to keep.
    pub max_exchanges: usize,
}

impl Default for ShortTermMemoryParams {
    fn default() -> Self {
        Self { max_exchanges: 8 }
    }
}

/// Keeps the most recent exchanges of the session and replays them as a
/// plain-text summary.
#[derive(Debug)]
pub struct ShortTermMemory {
    max_exchanges: usize,
    exchanges: VecDeque<(String, String)>,
}

impl ShortTermMemory {
    pub fn new(params: ShortTermMemoryParams) -> Self {
        Self {
            max_exchanges: params.max_exchanges.max(1),
            exchanges: VecDeque::new(),
        }
    }
}

#[async_trait]
impl MemoryStore for ShortTermMemory {
    async fn recall(&self, _query: &str) -> Result<Option<String>> {
        if self.exchanges.is_empty() {
            return Ok(None);
        }
        let summary = self
            .exchanges
            .iter()
            .map(|(user, assistant)| format!("User: {user}\nAssistant: {assistant}"))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Some(summary))
    }

    async fn remember(&mut self, dialogue: &[ChatMessage]) -> Result<()> {
        // Only the latest exchange is new; earlier ones were recorded on previous turns.
        let mut tail = dialogue.iter().rev();
        let (Some(assistant), Some(user)) = (tail.next(), tail.next()) else {
            return Ok(());
        };
        if assistant.role != Role::Assistant || user.role != Role::User {
            return Ok(());
        }
        self.exchanges
            .push_back((user.content.clone(), assistant.content.clone()));
        while self.exchanges.len() > self.max_exchanges {
            self.exchanges.pop_front();
        }
        Ok(())
    }
}
