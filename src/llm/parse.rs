// src/llm/parse.rs
// Defensive parsing of LM replies
//
// A stage must never fail solely because the model wrapped its JSON in code
// fences or chatted around it. Each extractor accepts the well-formed shape
// first and falls back to progressively looser readings.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Tagged parse result: structured when the reply parsed, the raw text
/// otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum LmJson {
    Parsed(Value),
    Textual(String),
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[a-zA-Z]*\n?(.*?)```").expect("fence regex"))
}

/// Remove markdown code fences, keeping their contents. Text outside the
/// first fence is dropped when a fence is present.
pub fn strip_code_fences(text: &str) -> String {
    if let Some(caps) = fence_re().captures(text) {
        caps.get(1).map(|m| m.as_str()).unwrap_or("").trim().to_string()
    } else {
        text.trim().to_string()
    }
}

/// Parse a reply as JSON: direct, then fence-stripped, then the first
/// balanced `{...}`/`[...]` slice.
pub fn extract_json(text: &str) -> LmJson {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return LmJson::Parsed(value);
    }

    let stripped = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(&stripped) {
        return LmJson::Parsed(value);
    }

    if let Some(slice) = first_json_slice(&stripped) {
        if let Ok(value) = serde_json::from_str::<Value>(slice) {
            return LmJson::Parsed(value);
        }
    }

    LmJson::Textual(text.trim().to_string())
}

/// First balanced JSON object or array embedded in free text.
fn first_json_slice(text: &str) -> Option<&str> {
    let open = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let (open_ch, close_ch) = if bytes[open] == b'{' { (b'{', b'}') } else { (b'[', b']') };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            _ if b == open_ch => depth += 1,
            _ if b == close_ch => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Table names chosen by the model, restricted to the known set.
///
/// Accepts a JSON array of names; otherwise scans the reply for known
/// table names. Order follows appearance in the reply; duplicates are
/// dropped.
pub fn extract_table_names(text: &str, known: &[String]) -> Vec<String> {
    if let LmJson::Parsed(Value::Array(items)) = extract_json(text) {
        let mut chosen = Vec::new();

        for item in items {
            let Some(name) = item.as_str() else { continue };
            let Some(canonical) = known.iter().find(|k| k.eq_ignore_ascii_case(name.trim())) else {
                continue;
            };

            if !chosen.contains(canonical) {
                chosen.push(canonical.clone());
            }
        }

        if !chosen.is_empty() {
            return chosen;
        }
    }

    // Free-text fallback: substring match against the known set
    let lowered = text.to_lowercase();
    let mut found: Vec<(usize, String)> = known
        .iter()
        .filter_map(|table| {
            lowered.find(&table.to_lowercase()).map(|pos| (pos, table.clone()))
        })
        .collect();

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, table)| table).collect()
}

/// A single SQL statement from the reply: fences stripped, whitespace
/// trimmed. None when nothing statement-like remains.
pub fn extract_sql(text: &str) -> Option<String> {
    let sql = strip_code_fences(text);
    let sql = sql.trim().trim_end_matches(';').trim();

    if sql.is_empty() {
        return None;
    }

    Some(format!("{};", sql))
}

/// Leading keyword allowlist for a read-only deployment.
pub fn is_read_only(sql: &str) -> bool {
    let first = sql
        .trim_start_matches(['(', ' ', '\n', '\t'])
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();

    matches!(first.as_str(), "select" | "with" | "explain" | "show" | "values" | "table")
}

/// Follow-up suggestions: a JSON array of strings, or one per line with
/// bullets and numbering stripped. Deduplicated, truncated to `max`.
pub fn extract_suggestions(text: &str, max: usize) -> Vec<String> {
    let raw: Vec<String> = match extract_json(text) {
        LmJson::Parsed(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => strip_code_fences(text)
            .lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches(['-', '*', '•'])
                    .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
                    .trim()
                    .to_string()
            })
            .collect(),
    };

    let mut seen = Vec::new();
    for suggestion in raw {
        if suggestion.is_empty() {
            continue;
        }

        if !seen.iter().any(|s: &String| s.eq_ignore_ascii_case(&suggestion)) {
            seen.push(suggestion);
        }

        if seen.len() == max {
            break;
        }
    }

    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn known() -> Vec<String> {
        vec!["users".to_string(), "orders".to_string(), "order_items".to_string()]
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(
            strip_code_fences("```sql\nSELECT 1;\n```"),
            "SELECT 1;"
        );
        assert_eq!(
            strip_code_fences("Here you go:\n```json\n[1, 2]\n```\nEnjoy!"),
            "[1, 2]"
        );
        assert_eq!(strip_code_fences("  SELECT 1;  "), "SELECT 1;");
    }

    #[test]
    fn test_extract_json_direct_and_fenced() {
        assert_eq!(
            extract_json("[\"users\"]"),
            LmJson::Parsed(json!(["users"]))
        );
        assert_eq!(
            extract_json("```json\n{\"kind\": \"bar\"}\n```"),
            LmJson::Parsed(json!({"kind": "bar"}))
        );
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let reply = "Sure! The relevant tables are [\"users\", \"orders\"] as requested.";
        assert_eq!(
            extract_json(reply),
            LmJson::Parsed(json!(["users", "orders"]))
        );
    }

    #[test]
    fn test_extract_json_falls_back_to_text() {
        assert_eq!(
            extract_json("no structure here"),
            LmJson::Textual("no structure here".to_string())
        );
    }

    #[test]
    fn test_table_names_from_json_array() {
        let chosen = extract_table_names("[\"Orders\", \"users\", \"unknown\"]", &known());
        assert_eq!(chosen, vec!["orders", "users"]);
    }

    #[test]
    fn test_table_names_from_free_text() {
        let chosen = extract_table_names(
            "You'll want the orders table joined with users.",
            &known(),
        );
        assert_eq!(chosen, vec!["orders", "users"]);
    }

    #[test]
    fn test_table_names_never_invents() {
        let chosen = extract_table_names("[\"payments\"]", &known());
        assert!(chosen.is_empty());
    }

    #[test]
    fn test_extract_sql_normalizes() {
        assert_eq!(
            extract_sql("```sql\nSELECT COUNT(*) FROM users\n```").unwrap(),
            "SELECT COUNT(*) FROM users;"
        );
        assert_eq!(
            extract_sql("SELECT 1;").unwrap(),
            "SELECT 1;"
        );
        assert!(extract_sql("``````").is_none());
        assert!(extract_sql("   ").is_none());
    }

    #[test]
    fn test_read_only_filter() {
        assert!(is_read_only("SELECT * FROM users;"));
        assert!(is_read_only("WITH t AS (SELECT 1) SELECT * FROM t;"));
        assert!(is_read_only("  explain SELECT 1;"));
        assert!(!is_read_only("DROP TABLE users;"));
        assert!(!is_read_only("UPDATE users SET name = 'x';"));
        assert!(!is_read_only("INSERT INTO users VALUES (1);"));
        assert!(!is_read_only("DELETE FROM users;"));
    }

    #[test]
    fn test_suggestions_json_and_lines() {
        let from_json = extract_suggestions("[\"Top 5 users?\", \"Users per month?\"]", 5);
        assert_eq!(from_json, vec!["Top 5 users?", "Users per month?"]);

        let from_lines = extract_suggestions("1. First question?\n2. Second question?\n", 5);
        assert_eq!(from_lines, vec!["First question?", "Second question?"]);
    }

    #[test]
    fn test_suggestions_dedup_and_truncate() {
        let text = "[\"A?\", \"a?\", \"B?\", \"C?\", \"D?\", \"E?\", \"F?\"]";
        let suggestions = extract_suggestions(text, 5);
        assert_eq!(suggestions, vec!["A?", "B?", "C?", "D?", "E?"]);
    }
}
