//! Connection provider seam.
//!
//! Every component that talks to SQL Server does so through an
//! `Arc<dyn SqlExecutor>`, so the pooled [`ConnectionManager`] can be swapped
//! for a scripted executor in tests.
//!
//! [`ConnectionManager`]: crate::db::ConnectionManager

use crate::error::DbResult;
use crate::models::{DatabaseTarget, QueryParam, ResultSet};
use async_trait::async_trait;

/// A statement with positional `@P1..@Pn` placeholders and their values.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Append a value for the next positional placeholder.
    pub fn bind(mut self, param: impl Into<QueryParam>) -> Self {
        self.params.push(param.into());
        self
    }
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a statement and collect every result set it produces.
    async fn query(&self, target: DatabaseTarget, stmt: &SqlStatement) -> DbResult<Vec<ResultSet>>;

    /// Run a statement and return the driver-reported affected-row count.
    async fn execute(&self, target: DatabaseTarget, stmt: &SqlStatement) -> DbResult<u64>;

    /// Run a statement and return only its first result set (empty if none).
    async fn query_first(&self, target: DatabaseTarget, stmt: &SqlStatement) -> DbResult<ResultSet> {
        Ok(self.query(target, stmt).await?.into_iter().next().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_bind_order() {
        let stmt = SqlStatement::new("SELECT * FROM t WHERE a = @P1 AND b = @P2")
            .bind("x")
            .bind(2i64);
        assert_eq!(
            stmt.params,
            vec![QueryParam::String("x".into()), QueryParam::Int(2)]
        );
    }
}
