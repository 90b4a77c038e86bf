//! Scripted [`SqlExecutor`] for tests.
//!
//! Replies are chosen by case-insensitive substring match on the statement
//! text, optionally restricted to one target. Every call is recorded so tests
//! can assert on the generated SQL and bound values, or that no round-trip
//! happened at all.

use crate::db::provider::{SqlExecutor, SqlStatement};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseTarget, ResultSet, Row};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::{Mutex, MutexGuard};

/// What a matched rule answers with.
#[derive(Debug, Clone)]
pub enum MockReply {
    Sets(Vec<ResultSet>),
    Affected(u64),
    /// Surfaces as a `DbError::Query` with this message
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Query,
    Execute,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub target: DatabaseTarget,
    pub statement: SqlStatement,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    target: Option<DatabaseTarget>,
    reply: MockReply,
}

#[derive(Debug, Default)]
pub struct MockExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Turn JSON objects into rows; anything else is skipped.
pub fn rows_from_json(rows: Vec<JsonValue>) -> Vec<Row> {
    rows.into_iter()
        .filter_map(|v| match v {
            JsonValue::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `pattern` on any target.
    ///
    /// A later rule with the same pattern and target replaces the earlier one.
    pub fn on(&self, pattern: &str, reply: MockReply) -> &Self {
        self.add_rule(pattern, None, reply)
    }

    /// Answer statements containing `pattern` on one target only.
    pub fn on_target(&self, target: DatabaseTarget, pattern: &str, reply: MockReply) -> &Self {
        self.add_rule(pattern, Some(target), reply)
    }

    /// Shorthand for a single result set built from JSON objects.
    pub fn rows(&self, pattern: &str, rows: Vec<JsonValue>) -> &Self {
        self.on(pattern, MockReply::Sets(vec![ResultSet::from_rows(rows_from_json(rows))]))
    }

    pub fn rows_for(&self, target: DatabaseTarget, pattern: &str, rows: Vec<JsonValue>) -> &Self {
        self.on_target(
            target,
            pattern,
            MockReply::Sets(vec![ResultSet::from_rows(rows_from_json(rows))]),
        )
    }

    pub fn affected(&self, pattern: &str, count: u64) -> &Self {
        self.on(pattern, MockReply::Affected(count))
    }

    pub fn fail(&self, pattern: &str, message: &str) -> &Self {
        self.on(pattern, MockReply::Error(message.to_string()))
    }

    fn add_rule(&self, pattern: &str, target: Option<DatabaseTarget>, reply: MockReply) -> &Self {
        let pattern = pattern.to_lowercase();
        let mut rules = lock(&self.rules);
        match rules
            .iter_mut()
            .find(|r| r.pattern == pattern && r.target == target)
        {
            Some(rule) => rule.reply = reply,
            None => rules.push(Rule {
                pattern,
                target,
                reply,
            }),
        }
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// SQL text of every call received so far.
    pub fn statements(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .map(|c| c.statement.sql.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Most recent call whose SQL contains `pattern` (case-insensitive).
    pub fn last_call_matching(&self, pattern: &str) -> Option<RecordedCall> {
        let pattern = pattern.to_lowercase();
        lock(&self.calls)
            .iter()
            .rev()
            .find(|c| c.statement.sql.to_lowercase().contains(&pattern))
            .cloned()
    }

    /// Target-specific rules win over generic ones, then the longest pattern wins.
    fn reply_for(&self, target: DatabaseTarget, sql: &str) -> Option<MockReply> {
        let sql = sql.to_lowercase();
        lock(&self.rules)
            .iter()
            .filter(|r| r.target.is_none_or(|t| t == target) && sql.contains(&r.pattern))
            .max_by_key(|r| (r.target.is_some(), r.pattern.len()))
            .map(|r| r.reply.clone())
    }

    fn record(&self, kind: CallKind, target: DatabaseTarget, stmt: &SqlStatement) {
        lock(&self.calls).push(RecordedCall {
            kind,
            target,
            statement: stmt.clone(),
        });
    }
}

fn mock_error(message: String) -> DbError {
    DbError::query(message, None, "Scripted failure")
}

#[async_trait]
impl SqlExecutor for MockExecutor {
    async fn query(&self, target: DatabaseTarget, stmt: &SqlStatement) -> DbResult<Vec<ResultSet>> {
        self.record(CallKind::Query, target, stmt);
        match self.reply_for(target, &stmt.sql) {
            Some(MockReply::Sets(sets)) => Ok(sets),
            Some(MockReply::Error(message)) => Err(mock_error(message)),
            Some(MockReply::Affected(_)) | None => Ok(Vec::new()),
        }
    }

    async fn execute(&self, target: DatabaseTarget, stmt: &SqlStatement) -> DbResult<u64> {
        self.record(CallKind::Execute, target, stmt);
        match self.reply_for(target, &stmt.sql) {
            Some(MockReply::Affected(n)) => Ok(n),
            Some(MockReply::Error(message)) => Err(mock_error(message)),
            Some(MockReply::Sets(_)) | None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_most_specific_rule_wins() {
        let mock = MockExecutor::new();
        mock.rows("FROM", vec![json!({"a": 1})])
            .rows("FROM INFORMATION_SCHEMA.TABLES", vec![json!({"a": 2})])
            .rows_for(DatabaseTarget::DataMgmt, "from", vec![json!({"a": 3})]);

        let stmt = SqlStatement::new("SELECT * FROM INFORMATION_SCHEMA.TABLES");
        let master = mock.query_first(DatabaseTarget::Master, &stmt).await.unwrap();
        assert_eq!(master.rows[0]["a"], 2);
        let data = mock.query_first(DatabaseTarget::DataMgmt, &stmt).await.unwrap();
        assert_eq!(data.rows[0]["a"], 3);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_rule_replacement_and_errors() {
        let mock = MockExecutor::new();
        mock.affected("UPDATE", 1);
        mock.affected("update", 4);
        let stmt = SqlStatement::new("UPDATE t SET a = 1");
        assert_eq!(mock.execute(DatabaseTarget::Master, &stmt).await.unwrap(), 4);

        mock.fail("UPDATE", "Violation of PRIMARY KEY constraint");
        let err = mock.execute(DatabaseTarget::Master, &stmt).await.unwrap_err();
        assert_eq!(err.kind(), "query");
    }

    #[tokio::test]
    async fn test_unmatched_statement_is_empty() {
        let mock = MockExecutor::new();
        let stmt = SqlStatement::new("SELECT 1");
        assert!(mock.query(DatabaseTarget::Master, &stmt).await.unwrap().is_empty());
        assert_eq!(mock.execute(DatabaseTarget::Master, &stmt).await.unwrap(), 0);
        assert_eq!(mock.last_call_matching("select").unwrap().kind, CallKind::Execute);
    }
}
