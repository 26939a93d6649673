// src/agent/viz.rs
// Visualization recommendation - one LM call, heuristic fallback, and a
// hard degrade to `none` when the LM is unavailable

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::prompts;
use crate::connector::QueryResult;
use crate::llm::{ChatCompleter, LmJson};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VizKind {
    Bar,
    HorizontalBar,
    Line,
    Pie,
    Scatter,
    Table,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizRecommendation {
    pub kind: VizKind,
    pub reason: String,
}

/// Recommend a chart for a result sample. LM unavailability degrades to
/// `none`; an unparseable reply falls back to the shape heuristic.
pub async fn recommend_visualization(
    lm: &dyn ChatCompleter,
    question: &str,
    sql: &str,
    sample: &QueryResult,
) -> VizRecommendation {
    let (system, user) = prompts::visualization(question, sql, sample);

    match lm.complete_json(&system, &user, 0.0).await {
        Err(e) => {
            debug!("Visualization LM call failed, degrading to none: {}", e);
            VizRecommendation {
                kind: VizKind::None,
                reason: "language model unavailable".to_string(),
            }
        }
        Ok(LmJson::Parsed(value)) => parse_recommendation(&value).unwrap_or_else(|| heuristic(sample)),
        Ok(LmJson::Textual(_)) => heuristic(sample),
    }
}

fn parse_recommendation(value: &Value) -> Option<VizRecommendation> {
    let kind = match value.get("kind")?.as_str()? {
        "bar" => VizKind::Bar,
        "horizontal_bar" => VizKind::HorizontalBar,
        "line" => VizKind::Line,
        "pie" => VizKind::Pie,
        "scatter" => VizKind::Scatter,
        "table" => VizKind::Table,
        "none" => VizKind::None,
        _ => return None,
    };

    Some(VizRecommendation {
        kind,
        reason: value
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .to_string(),
    })
}

/// Shape-based fallback when the LM reply is unusable.
fn heuristic(sample: &QueryResult) -> VizRecommendation {
    if sample.columns.len() == 2 && sample.rows.len() > 1 {
        let first_column_temporal = sample.columns[0].to_lowercase().contains("date")
            || sample.columns[0].to_lowercase().contains("time")
            || sample.columns[0].to_lowercase().contains("month");

        let second_column_numeric = sample
            .rows
            .iter()
            .all(|row| row.get(1).map(|v| v.is_number() || v.is_null()).unwrap_or(false));

        if first_column_temporal && second_column_numeric {
            return VizRecommendation {
                kind: VizKind::Line,
                reason: "time-keyed numeric series".to_string(),
            };
        }

        if second_column_numeric {
            return VizRecommendation {
                kind: VizKind::Bar,
                reason: "categories with one numeric measure".to_string(),
            };
        }
    }

    VizRecommendation {
        kind: VizKind::Table,
        reason: "no obvious chart shape".to_string(),
    }
}
