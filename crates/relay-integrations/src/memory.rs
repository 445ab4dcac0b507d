//! In-memory recording implementations used by tests.

use crate::traits::{Billing, ChatHistory, HistoryMessage, TrialGate, TrialStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{GatewayError, UsageRecord};
use std::collections::HashMap;

/// Billing fake that records every call
#[derive(Default)]
pub struct MemoryBilling {
    /// (api_key, cost, description) per deduction
    pub deductions: Mutex<Vec<(String, f64, String)>>,
    /// Recorded usage tuples
    pub usage: Mutex<Vec<UsageRecord>>,
}

impl MemoryBilling {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded usage tuples
    #[must_use]
    pub fn usage_count(&self) -> usize {
        self.usage.lock().len()
    }
}

#[async_trait]
impl Billing for MemoryBilling {
    async fn deduct_credits(
        &self,
        api_key: &str,
        cost: f64,
        description: &str,
        _metadata: serde_json::Value,
    ) -> Result<(), GatewayError> {
        self.deductions
            .lock()
            .push((api_key.to_string(), cost, description.to_string()));
        Ok(())
    }

    async fn record_usage(
        &self,
        _user_id: &str,
        _api_key: &str,
        record: &UsageRecord,
    ) -> Result<(), GatewayError> {
        self.usage.lock().push(record.clone());
        Ok(())
    }
}

/// Trial gate fake with a fixed status and usage recording
pub struct MemoryTrialGate {
    /// Status returned from `validate_access`
    pub status: TrialStatus,
    /// (tokens, requests) per `track_usage` call
    pub tracked: Mutex<Vec<(u64, u64)>>,
}

impl MemoryTrialGate {
    /// Create with the given status
    #[must_use]
    pub fn new(status: TrialStatus) -> Self {
        Self {
            status,
            tracked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TrialGate for MemoryTrialGate {
    async fn validate_access(&self, _api_key: &str) -> Result<TrialStatus, GatewayError> {
        Ok(self.status.clone())
    }

    async fn track_usage(
        &self,
        _api_key: &str,
        tokens: u64,
        requests: u64,
    ) -> Result<(), GatewayError> {
        self.tracked.lock().push((tokens, requests));
        Ok(())
    }
}

/// Chat history fake backed by a map
#[derive(Default)]
pub struct MemoryChatHistory {
    sessions: Mutex<HashMap<i64, Vec<HistoryMessage>>>,
}

impl MemoryChatHistory {
    /// Create an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session with messages
    pub fn seed(&self, session_id: i64, messages: Vec<HistoryMessage>) {
        self.sessions.lock().insert(session_id, messages);
    }
}

#[async_trait]
impl ChatHistory for MemoryChatHistory {
    async fn get(
        &self,
        session_id: i64,
        _user_id: &str,
    ) -> Result<Option<Vec<HistoryMessage>>, GatewayError> {
        Ok(self.sessions.lock().get(&session_id).cloned())
    }

    async fn save(
        &self,
        session_id: i64,
        _user_id: &str,
        role: &str,
        content: &str,
        _model: &str,
        _tokens: u32,
    ) -> Result<(), GatewayError> {
        self.sessions
            .lock()
            .entry(session_id)
            .or_default()
            .push(HistoryMessage {
                role: role.to_string(),
                content: content.to_string(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_history_roundtrip() {
        let history = MemoryChatHistory::new();
        history
            .save(1, "u", "user", "hello", "m", 0)
            .await
            .unwrap();
        history
            .save(1, "u", "assistant", "hi", "m", 2)
            .await
            .unwrap();
        let messages = history.get(1, "u").await.unwrap().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "hi");
        assert!(history.get(2, "u").await.unwrap().is_none());
    }
}
