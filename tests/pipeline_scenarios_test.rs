// tests/pipeline_scenarios_test.rs
// End-to-end pipeline scenarios through the dispatcher, LM stubbed

mod common;

use std::time::Duration;

use askdb::dispatch::ResultRecord;
use askdb::error::ErrorKind;
use common::*;
use serde_json::json;

const POLL_DEADLINE: Duration = Duration::from_secs(5);

/// Scenario A: happy path on a cache miss, then a byte-equal cache hit.
#[tokio::test]
async fn happy_path_then_answer_cache_hit() {
    let h = harness(10, dispatch_config(3, 50, 60));
    script_happy_path(&h.lm);
    h.connector.push_rows(vec!["count"], vec![vec![json!(3)]]);

    let job_id = h
        .dispatcher
        .submit("How many users?", Some("s1".into()))
        .await
        .unwrap();

    let first = match wait_terminal(&h.dispatcher, &job_id, POLL_DEADLINE).await {
        ResultRecord::Succeeded { payload, .. } => payload,
        other => panic!("expected success, got {:?}", other),
    };

    assert_eq!(first.sql, "SELECT COUNT(*) FROM users;");
    assert_eq!(first.summary, "There are 3 users.");
    assert_eq!(first.table.columns, vec!["count"]);
    assert_eq!(first.table.rows, vec![vec![json!(3)]]);
    assert_eq!(first.suggestions.len(), 2);
    assert!(!first.correction_applied);

    let calls_after_first = h.lm.calls();

    // Same question, same session, within TTL: served from the answer cache
    let job_id = h
        .dispatcher
        .submit("How many users?", Some("s1".into()))
        .await
        .unwrap();

    let second = match wait_terminal(&h.dispatcher, &job_id, POLL_DEADLINE).await {
        ResultRecord::Succeeded { payload, .. } => payload,
        other => panic!("expected success, got {:?}", other),
    };

    assert_eq!(first, second);
    assert_eq!(h.lm.calls(), calls_after_first, "cached run must not call the LM");
}

/// Scenario B: the first statement fails, the correction succeeds.
#[tokio::test]
async fn correction_succeeds_on_second_attempt() {
    let h = harness(10, dispatch_config(3, 50, 60));

    h.lm.push("[\"users\"]");
    h.lm.push("SELECT COUNT(*) FROM user;");
    h.lm.push("SELECT COUNT(*) FROM users;");
    h.lm.push("There are 3 users.");
    h.lm.push("[]");

    h.connector.push_result(Err(askdb::connector::ConnectorError::Syntax(
        "relation \"user\" does not exist".into(),
    )));
    h.connector.push_rows(vec!["count"], vec![vec![json!(3)]]);

    let job_id = h.dispatcher.submit("How many users?", None).await.unwrap();

    match wait_terminal(&h.dispatcher, &job_id, POLL_DEADLINE).await {
        ResultRecord::Succeeded { payload, .. } => {
            assert!(payload.correction_applied);
            assert_eq!(payload.sql, "SELECT COUNT(*) FROM users;");
        }
        other => panic!("expected success, got {:?}", other),
    }
}

/// Scenario C: every correction fails; exactly max_attempts LM correction
/// calls, then SQLExecutionFailed.
#[tokio::test]
async fn correction_exhausted_after_three_attempts() {
    let h = harness(10, dispatch_config(3, 50, 60));

    h.lm.push("[\"users\"]");
    h.lm.push("SELECT COUNT(*) FROM user;");
    for _ in 0..3 {
        h.lm.push("SELECT COUNT(*) FROM user;");
    }

    for _ in 0..4 {
        h.connector.push_result(Err(askdb::connector::ConnectorError::Syntax(
            "relation \"user\" does not exist".into(),
        )));
    }

    let job_id = h.dispatcher.submit("How many users?", None).await.unwrap();

    match wait_terminal(&h.dispatcher, &job_id, POLL_DEADLINE).await {
        ResultRecord::Failed { kind, .. } => assert_eq!(kind, ErrorKind::SqlExecutionFailed),
        other => panic!("expected failure, got {:?}", other),
    }

    // 1 table choice + 1 synthesis + exactly 3 corrections
    assert_eq!(h.lm.calls(), 5);
}

/// Scenario F: history_limit = 2, three successful questions; the session
/// keeps questions 2 and 3, in that order.
#[tokio::test]
async fn history_cap_drops_oldest() {
    let h = harness(2, dispatch_config(3, 50, 60));

    for i in 1..=3 {
        h.lm.push("[\"users\"]");
        h.lm.push(&format!("SELECT COUNT(*) FROM users WHERE id > {};", i));
        h.lm.push(&format!("Answer {}.", i));
        h.lm.push("[]");
        h.connector.push_rows(vec!["count"], vec![vec![json!(i)]]);

        let job_id = h
            .dispatcher
            .submit(&format!("Question number {}?", i), Some("s1".into()))
            .await
            .unwrap();

        match wait_terminal(&h.dispatcher, &job_id, POLL_DEADLINE).await {
            ResultRecord::Succeeded { .. } => {}
            other => panic!("expected success, got {:?}", other),
        }
    }

    let recent = h.memory.recent("s1", 10).await;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].question, "Question number 2?");
    assert_eq!(recent[1].question, "Question number 3?");
}

/// Table choice returning nothing known fails with NoRelevantTables.
#[tokio::test]
async fn unknown_tables_fail_cleanly() {
    let h = harness(10, dispatch_config(3, 50, 60));
    h.lm.push("[\"payments\"]");

    let job_id = h
        .dispatcher
        .submit("What were total payments?", None)
        .await
        .unwrap();

    match wait_terminal(&h.dispatcher, &job_id, POLL_DEADLINE).await {
        ResultRecord::Failed { kind, .. } => assert_eq!(kind, ErrorKind::NoRelevantTables),
        other => panic!("expected failure, got {:?}", other),
    }
}

/// Succeeded payloads keep columns and rows rectangular.
#[tokio::test]
async fn result_table_is_rectangular() {
    let h = harness(10, dispatch_config(3, 50, 60));

    h.lm.push("[\"users\"]");
    h.lm.push("SELECT id, name FROM users;");
    h.lm.push("Two users exist.");
    h.lm.push("[]");
    h.connector.push_rows(
        vec!["id", "name"],
        vec![vec![json!(1), json!("a")], vec![json!(2), json!(null)]],
    );

    let job_id = h.dispatcher.submit("List users", None).await.unwrap();

    match wait_terminal(&h.dispatcher, &job_id, POLL_DEADLINE).await {
        ResultRecord::Succeeded { payload, .. } => {
            for row in &payload.table.rows {
                assert_eq!(row.len(), payload.table.columns.len());
            }
        }
        other => panic!("expected success, got {:?}", other),
    }
}
