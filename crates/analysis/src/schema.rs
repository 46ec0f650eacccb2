//! Typed shapes for model analysis/learning responses.
//!
//! Responses are untrusted: every field defaults when absent, and ids may
//! arrive as numbers or digit strings. An entry whose id cannot be decoded
//! keeps `id: None` and is skipped (with a warning) instead of failing the
//! whole batch.

use serde::{Deserialize, Deserializer};

/// Response shape for the direct-analysis flow.
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub used_expressions: Vec<UsedExpression>,
    #[serde(default)]
    pub unused_expressions: Vec<UnusedExpression>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsedExpression {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnusedExpression {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Response shape for the learning flow (both stages).
///
/// Stage 1 (usage check) replies with `used_expressions` only; stage 2
/// (situation refinement) replies with `expressions`.
#[derive(Debug, Default, Deserialize)]
pub struct LearningResponse {
    #[serde(default)]
    pub expressions: Vec<LearningEntry>,
}

#[derive(Debug, Deserialize)]
pub struct LearningEntry {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    /// Echo of the current situation; informational only.
    #[serde(default)]
    pub situation: Option<String>,
    #[serde(default)]
    pub new_situation: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Accept an id as a JSON number or a string of digits; anything else
/// decodes to `None`.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => {
            let token = s.trim();
            if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
                token.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    })
}

/// Accept a number as a JSON number or a numeric string.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_ids_both_decode() {
        let parsed: LearningResponse = serde_json::from_str(
            r#"{"expressions": [{"id": 5}, {"id": "7"}, {"id": "abc"}]}"#,
        )
        .unwrap();
        let ids: Vec<Option<i64>> = parsed.expressions.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![Some(5), Some(7), None]);
    }

    #[test]
    fn missing_fields_default() {
        let parsed: AnalysisResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.used_expressions.is_empty());
        assert!(parsed.unused_expressions.is_empty());
        assert!(parsed.summary.is_none());
    }

    #[test]
    fn confidence_tolerates_strings() {
        let parsed: AnalysisResponse = serde_json::from_str(
            r#"{"used_expressions": [{"id": 1, "confidence": "0.85", "reason": "matches tone"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.used_expressions[0].confidence, Some(0.85));
    }

    #[test]
    fn learning_entry_full_shape() {
        let parsed: LearningResponse = serde_json::from_str(
            r#"{"expressions": [{"id": 5, "situation": "道歉", "new_situation": "道歉语境", "reason": "语气更软"}]}"#,
        )
        .unwrap();
        let entry = &parsed.expressions[0];
        assert_eq!(entry.id, Some(5));
        assert_eq!(entry.new_situation.as_deref(), Some("道歉语境"));
        assert_eq!(entry.reason.as_deref(), Some("语气更软"));
    }

    #[test]
    fn null_id_decodes_to_none() {
        let parsed: LearningResponse =
            serde_json::from_str(r#"{"expressions": [{"id": null, "new_situation": "x"}]}"#)
                .unwrap();
        assert!(parsed.expressions[0].id.is_none());
    }
}
