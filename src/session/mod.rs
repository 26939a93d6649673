// src/session/mod.rs

//! Bounded per-session conversation memory, persisted through the cache
//! backend so every worker and process sees the same history.
//!
//! Ordering is by append time, newest last. Appends are last-writer-wins;
//! two jobs racing in one session may interleave, which is acceptable —
//! history is a convenience feature, not a correctness invariant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::cache::{Cache, Namespace};
use crate::config::SessionConfig;

/// One completed interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    pub sql: String,
    pub summary: String,
    pub asked_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ConversationMemory {
    cache: Cache,
    history_limit: usize,
    ttl: Duration,
}

impl ConversationMemory {
    pub fn new(cache: Cache, config: &SessionConfig) -> Self {
        Self {
            cache,
            history_limit: config.history_limit,
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    /// Append one interaction, truncating the oldest entries beyond the
    /// history limit. Refreshes the session TTL.
    pub async fn append(&self, session_id: &str, question: &str, sql: &str, summary: &str) {
        let mut entries = self.load(session_id).await;

        entries.push(HistoryEntry {
            question: question.to_string(),
            sql: sql.to_string(),
            summary: summary.to_string(),
            asked_at: Utc::now(),
        });

        if entries.len() > self.history_limit {
            let excess = entries.len() - self.history_limit;
            entries.drain(..excess);
        }

        debug!(session_id, entries = entries.len(), "Appended history entry");
        self.store(session_id, &entries).await;
    }

    /// Up to `k` most recent entries in insertion order, newest last.
    /// Access refreshes the session TTL.
    pub async fn recent(&self, session_id: &str, k: usize) -> Vec<HistoryEntry> {
        let entries = self.load(session_id).await;

        if !entries.is_empty() {
            // Rewrite to push the TTL forward
            self.store(session_id, &entries).await;
        }

        let skip = entries.len().saturating_sub(k);
        entries.into_iter().skip(skip).collect()
    }

    pub async fn clear(&self, session_id: &str) {
        self.cache.invalidate(Namespace::Session, session_id).await;
    }

    async fn load(&self, session_id: &str) -> Vec<HistoryEntry> {
        self.cache
            .get_json(Namespace::Session, session_id)
            .await
            .unwrap_or_default()
    }

    async fn store(&self, session_id: &str, entries: &[HistoryEntry]) {
        self.cache
            .put_json(Namespace::Session, session_id, &entries, self.ttl)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(history_limit: usize) -> ConversationMemory {
        ConversationMemory::new(
            Cache::in_memory(100),
            &SessionConfig {
                ttl_secs: 3600,
                history_limit,
                context_window: history_limit,
            },
        )
    }

    #[tokio::test]
    async fn test_append_then_recent_round_trip() {
        let memory = memory(10);

        memory.append("s1", "How many users?", "SELECT COUNT(*) FROM users;", "3 users").await;

        let recent = memory.recent("s1", 1).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].question, "How many users?");
        assert_eq!(recent[0].sql, "SELECT COUNT(*) FROM users;");
        assert_eq!(recent[0].summary, "3 users");
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let memory = memory(2);

        memory.append("s1", "q1", "SELECT 1;", "a1").await;
        memory.append("s1", "q2", "SELECT 2;", "a2").await;
        memory.append("s1", "q3", "SELECT 3;", "a3").await;

        let recent = memory.recent("s1", 10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].question, "q2");
        assert_eq!(recent[1].question, "q3");
    }

    #[tokio::test]
    async fn test_recent_returns_newest_last() {
        let memory = memory(10);

        for i in 0..5 {
            memory.append("s1", &format!("q{}", i), "SELECT 1;", "a").await;
        }

        let recent = memory.recent("s1", 3).await;
        let questions: Vec<_> = recent.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3", "q4"]);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let memory = memory(10);

        memory.append("s1", "q1", "SELECT 1;", "a").await;
        memory.append("s2", "q2", "SELECT 2;", "b").await;

        assert_eq!(memory.recent("s1", 10).await.len(), 1);
        assert_eq!(memory.recent("s2", 10).await[0].question, "q2");
    }

    #[tokio::test]
    async fn test_clear_empties_history() {
        let memory = memory(10);

        memory.append("s1", "q1", "SELECT 1;", "a").await;
        memory.clear("s1").await;

        assert!(memory.recent("s1", 10).await.is_empty());
    }
}
