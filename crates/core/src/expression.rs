//! Expression domain records.
//!
//! An [`Expression`] is one reusable phrasing pattern for a chat: a free-text
//! `situation` describing when it applies, the literal `style` content, and a
//! floating `weight` that governs selection likelihood. Weights live in
//! [0.01, 5.0] while the record exists; a decrement to ≤ 0 deletes the record
//! instead of storing a non-positive weight.

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

/// Fixed discriminator value for this family of records.
pub const EXPRESSION_KIND: &str = "expression";

/// A single persisted expression record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    /// Store-assigned unique ID, immutable once created.
    pub id: i64,

    /// Canonical chat identifier this expression is scoped to.
    pub chat_id: String,

    /// Free-text description of the context where the style applies.
    pub situation: String,

    /// The literal phrasing/content.
    pub style: String,

    /// Confidence/frequency score in [0.01, 5.0].
    pub weight: f64,

    /// Epoch seconds of the last mutation.
    pub last_active_time: f64,

    /// Epoch seconds of first persistence; backfilled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_date: Option<f64>,

    /// Record-kind discriminator, always [`EXPRESSION_KIND`].
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    EXPRESSION_KIND.into()
}

impl Expression {
    /// Refresh `last_active_time` to now and backfill `create_date` if it
    /// was never set. Called before every save.
    pub fn touch(&mut self) {
        self.last_active_time = now_epoch();
        if self.create_date.is_none() {
            self.create_date = Some(self.last_active_time);
        }
    }
}

/// Fields for a not-yet-persisted expression. The store assigns the id and
/// stamps both timestamps on create.
#[derive(Debug, Clone)]
pub struct NewExpression {
    pub chat_id: String,
    pub situation: String,
    pub style: String,
    pub weight: f64,
}

/// One page of expressions for a chat, ordered by weight desc then
/// `last_active_time` desc.
#[derive(Debug, Clone)]
pub struct ExpressionPage {
    /// Total records for the chat, across all pages.
    pub total: u64,
    /// The (clamped) page that was actually returned, 1-based.
    pub page: u64,
    /// Total pages at the requested size, at least 1.
    pub page_count: u64,
    pub rows: Vec<Expression>,
}

/// Current time as epoch seconds with sub-second precision.
pub fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Format an epoch-seconds timestamp for display in local time.
///
/// Falls back to the raw number when the timestamp is out of range.
pub fn format_epoch(ts: f64) -> String {
    match Local.timestamp_opt(ts as i64, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => format!("{ts}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Expression {
        Expression {
            id: 1,
            chat_id: "abc".into(),
            situation: "感叹".into(),
            style: "哇塞".into(),
            weight: 2.0,
            last_active_time: 0.0,
            create_date: None,
            kind: EXPRESSION_KIND.into(),
        }
    }

    #[test]
    fn touch_backfills_create_date() {
        let mut expr = sample();
        assert!(expr.create_date.is_none());
        expr.touch();
        assert!(expr.last_active_time > 0.0);
        assert_eq!(expr.create_date, Some(expr.last_active_time));
    }

    #[test]
    fn touch_preserves_existing_create_date() {
        let mut expr = sample();
        expr.create_date = Some(123.0);
        expr.touch();
        assert_eq!(expr.create_date, Some(123.0));
        assert!(expr.last_active_time > 123.0);
    }

    #[test]
    fn serialization_defaults_kind() {
        let json = r#"{"id":5,"chat_id":"c","situation":"s","style":"y","weight":1.0,"last_active_time":10.0}"#;
        let expr: Expression = serde_json::from_str(json).unwrap();
        assert_eq!(expr.kind, EXPRESSION_KIND);
        assert!(expr.create_date.is_none());
    }

    #[test]
    fn format_epoch_out_of_range_falls_back() {
        let formatted = format_epoch(1e18);
        assert!(formatted.contains("1e18") || formatted.contains("1000000000000000000"));
    }
}
