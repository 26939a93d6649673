// src/cache/keys.rs
// Key derivation - one named function per namespace
//
// Every input that affects a cached payload must be folded into its key;
// that is what makes last-writer-wins races safe. Keys are SHA-256 over a
// canonical JSON encoding of the inputs.

use serde_json::json;

use crate::session::HistoryEntry;
use crate::utils::sha256_hex;

/// Canonical form of a user question: trimmed, lowercased, inner whitespace
/// collapsed. This is the question identity for the answer cache.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `lm_response` — one chat completion, fully determined by its request.
pub fn lm_response_key(system: &str, user: &str, temperature: f32, model: &str) -> String {
    let canonical = json!({
        "system": system,
        "user": user,
        "temperature": format!("{:.2}", temperature),
        "model": model,
    });

    sha256_hex(&format!("lm_response:{}", canonical))
}

/// Digest of the conversation context that feeds the answer cache.
///
/// Entries for the question currently being asked are excluded: the answer
/// to a question does not depend on its own earlier asking, and including
/// them would make every repeat a guaranteed miss.
pub fn history_digest(entries: &[HistoryEntry], current_normalized: &str) -> String {
    let relevant: Vec<_> = entries
        .iter()
        .filter(|e| normalize_question(&e.question) != current_normalized)
        .map(|e| json!({"q": e.question, "sql": e.sql, "a": e.summary}))
        .collect();

    sha256_hex(&json!(relevant).to_string())
}

/// `answer` — a completed payload for a question in a conversation state.
pub fn answer_key(normalized_question: &str, history_digest: &str) -> String {
    let canonical = json!({
        "question": normalized_question,
        "history": history_digest,
    });

    sha256_hex(&format!("answer:{}", canonical))
}

/// `schema` — DDL snapshots are keyed by bare table name.
pub fn schema_key(table: &str) -> String {
    table.to_string()
}

/// Digest of a formatted answer, input to the suggestion key.
pub fn answer_digest(summary: &str) -> String {
    sha256_hex(summary)
}

/// `suggestion` — follow-ups depend on the question and the answer shown.
pub fn suggestion_key(question: &str, answer_digest: &str) -> String {
    let canonical = json!({
        "question": question,
        "answer": answer_digest,
    });

    sha256_hex(&format!("suggestion:{}", canonical))
}
