// src/agent/prompts.rs
// Per-stage prompt builders
//
// Prompts are part of cache keys, so building them must be deterministic
// for fixed inputs.

use crate::connector::QueryResult;
use crate::session::HistoryEntry;

/// Conversation context block shared by the generation stages.
pub fn format_context(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut out = String::from("Conversation so far (oldest first):\n");
    for entry in history {
        out.push_str(&format!(
            "Q: {}\nSQL: {}\nA: {}\n",
            entry.question, entry.sql, entry.summary
        ));
    }
    out
}

pub fn choose_tables(question: &str, context: &str, tables: &[String]) -> (String, String) {
    let system = "You select database tables relevant to a user question.\n\
         Reply with ONLY a JSON array of table names drawn from the provided list.\n\
         Example: [\"users\", \"orders\"]"
        .to_string();

    let user = format!(
        "{}Available tables: {}\n\nQuestion: {}",
        prefix_context(context),
        tables.join(", "),
        question
    );

    (system, user)
}

pub fn generate_sql(question: &str, context: &str, ddl_bundle: &[(String, String)]) -> (String, String) {
    let system = "You write a single SQL SELECT statement answering the user's question.\n\
         Use only the tables and columns in the provided schema.\n\
         Reply with ONLY the SQL statement, no explanation."
        .to_string();

    let user = format!(
        "{}Schema:\n{}\nQuestion: {}",
        prefix_context(context),
        render_bundle(ddl_bundle),
        question
    );

    (system, user)
}

pub fn correct_sql(
    question: &str,
    failed_sql: &str,
    error: &str,
    ddl_bundle: &[(String, String)],
) -> (String, String) {
    let system = "You repair a failing SQL statement.\n\
         Use only the tables and columns in the provided schema.\n\
         Reply with ONLY the corrected SQL statement, no explanation."
        .to_string();

    let user = format!(
        "Schema:\n{}\nQuestion: {}\n\nFailing SQL:\n{}\n\nDatabase error:\n{}",
        render_bundle(ddl_bundle),
        question,
        failed_sql,
        error
    );

    (system, user)
}

pub fn summarize(question: &str, sql: &str, result: &QueryResult) -> (String, String) {
    let system = "You summarize a SQL result for a non-technical reader in one or two sentences.\n\
         Use ONLY values that appear in the result rows; never invent numbers or names.\n\
         If the result is empty, say that no matching data was found."
        .to_string();

    let user = format!(
        "Question: {}\nSQL: {}\nResult:\n{}",
        question,
        sql,
        render_result(result)
    );

    (system, user)
}

pub fn suggest_followups(question: &str, summary: &str, max: usize) -> (String, String) {
    let system = format!(
        "You propose up to {} short follow-up questions a user might ask next.\n\
         Reply with ONLY a JSON array of strings.",
        max
    );

    let user = format!("Previous question: {}\nAnswer given: {}", question, summary);

    (system, user)
}

pub fn classify(question: &str) -> (String, String) {
    let system = "You classify a database question by the work it takes to answer.\n\
         Reply with exactly one word: simple, standard, or complex."
        .to_string();

    (system, format!("Question: {}", question))
}

pub fn visualization(question: &str, sql: &str, sample: &QueryResult) -> (String, String) {
    let system = "You recommend a chart type for a SQL result.\n\
         Reply with ONLY a JSON object like {\"kind\": \"bar\", \"reason\": \"...\"}.\n\
         kind must be one of: bar, horizontal_bar, line, pie, scatter, table, none."
        .to_string();

    let user = format!(
        "Question: {}\nSQL: {}\nResult sample:\n{}",
        question,
        sql,
        render_result(sample)
    );

    (system, user)
}

fn prefix_context(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!("{}\n", context)
    }
}

fn render_bundle(ddl_bundle: &[(String, String)]) -> String {
    ddl_bundle
        .iter()
        .map(|(_, ddl)| ddl.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Pipe-separated rendering of a result, bounded to keep prompts small.
fn render_result(result: &QueryResult) -> String {
    const MAX_ROWS: usize = 50;

    let mut out = result.columns.join(" | ");
    out.push('\n');

    for row in result.rows.iter().take(MAX_ROWS) {
        let rendered: Vec<String> = row
            .iter()
            .map(|value| match value {
                serde_json::Value::Null => "NULL".to_string(),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        out.push_str(&rendered.join(" | "));
        out.push('\n');
    }

    if result.rows.len() > MAX_ROWS {
        out.push_str(&format!("... ({} more rows)\n", result.rows.len() - MAX_ROWS));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_block_is_ordered() {
        let history = vec![
            HistoryEntry {
                question: "q1".into(),
                sql: "SELECT 1;".into(),
                summary: "a1".into(),
                asked_at: chrono::Utc::now(),
            },
            HistoryEntry {
                question: "q2".into(),
                sql: "SELECT 2;".into(),
                summary: "a2".into(),
                asked_at: chrono::Utc::now(),
            },
        ];

        let block = format_context(&history);
        let q1 = block.find("Q: q1").unwrap();
        let q2 = block.find("Q: q2").unwrap();
        assert!(q1 < q2);
    }

    #[test]
    fn test_prompts_are_deterministic() {
        let tables = vec!["users".to_string()];
        let a = choose_tables("how many users?", "", &tables);
        let b = choose_tables("how many users?", "", &tables);
        assert_eq!(a, b);
    }

    #[test]
    fn test_result_rendering_shows_values_and_nulls() {
        let result = QueryResult {
            columns: vec!["name".into(), "total".into()],
            rows: vec![vec![json!("alice"), json!(10)], vec![json!(null), json!(2)]],
        };

        let rendered = render_result(&result);
        assert!(rendered.contains("name | total"));
        assert!(rendered.contains("alice | 10"));
        assert!(rendered.contains("NULL | 2"));
    }

    #[test]
    fn test_summary_prompt_carries_no_invention_constraint() {
        let (system, _) = summarize("q", "SELECT 1;", &QueryResult::empty());
        assert!(system.contains("never invent"));
    }
}
