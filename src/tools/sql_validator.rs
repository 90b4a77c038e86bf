//! SQL statement and identifier validation.
//!
//! Free-form SQL sent to `execute_query` and caller-written WHERE clauses
//! are tokenized with [sqlparser](https://docs.rs/sqlparser/)'s MS SQL
//! tokenizer, so keywords hidden inside string literals or quoted identifiers
//! are not mistaken for statements, and comments cannot be used to disguise
//! the leading keyword.
//!
//! Table, schema, column and procedure names cannot be bound as parameters.
//! They pass [`validate_identifier`] and are always emitted bracket-quoted.

use crate::error::{DbError, DbResult};
use sqlparser::dialect::MsSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace, Word};

/// Longest identifier SQL Server accepts (sysname).
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Leading keywords accepted by `execute_query`.
pub const ALLOWED_STATEMENTS: [&str; 6] = ["SELECT", "INSERT", "UPDATE", "DELETE", "EXEC", "EXECUTE"];

/// Words rejected anywhere in free-form SQL and WHERE clauses.
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "DROP",
    "TRUNCATE",
    "ALTER",
    "CREATE",
    "GRANT",
    "REVOKE",
    "DENY",
    "BACKUP",
    "RESTORE",
    "SHUTDOWN",
    "KILL",
    "DBCC",
    "RECONFIGURE",
    "OPENROWSET",
    "OPENDATASOURCE",
    "OPENQUERY",
    "SP_EXECUTESQL",
    "SP_CONFIGURE",
];

/// Extended stored procedures (`xp_cmdshell` and friends) are blocked by prefix.
const BLOCKED_PREFIX: &str = "XP_";

/// Blocked entries that name callable objects. These stay blocked when written
/// as `[name]` or `"name"`; quoted keywords such as `[Create]` are plain identifiers.
const BLOCKED_OBJECTS: &[&str] = &[
    "OPENROWSET",
    "OPENDATASOURCE",
    "OPENQUERY",
    "SP_EXECUTESQL",
    "SP_CONFIGURE",
];

mod error_messages {
    pub const EMPTY: &str = "SQL statement is empty";
    pub const DISALLOWED_START: &str =
        "Only SELECT, INSERT, UPDATE, DELETE, EXEC and EXECUTE statements are allowed";
    pub const DYNAMIC_EXEC: &str =
        "Dynamic SQL execution is not allowed; EXEC must name a stored procedure";
    pub const WHERE_EMPTY: &str = "where_clause must not be empty";
    pub const WHERE_SEPARATOR: &str = "where_clause must not contain statement separators (;)";
    pub const WHERE_COMMENT: &str = "where_clause must not contain comments";
}

/// Statement class derived from the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// EXEC / EXECUTE of a stored procedure
    Exec,
}

impl StatementKind {
    fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "SELECT" => Some(Self::Select),
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "EXEC" | "EXECUTE" => Some(Self::Exec),
            _ => None,
        }
    }

    /// True for statements whose result is a row set rather than an affected count.
    pub fn returns_rows(&self) -> bool {
        matches!(self, Self::Select | Self::Exec)
    }
}

fn tokenize(sql: &str) -> DbResult<Vec<Token>> {
    let dialect = MsSqlDialect {};
    Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| DbError::validation(format!("Failed to tokenize SQL: {e}")))
}

fn is_comment(token: &Token) -> bool {
    matches!(
        token,
        Token::Whitespace(Whitespace::SingleLineComment { .. } | Whitespace::MultiLineComment(_))
    )
}

fn significant(tokens: &[Token]) -> impl Iterator<Item = &Token> {
    tokens.iter().filter(|t| !matches!(t, Token::Whitespace(_)))
}

/// Word that names a blocked operation, quoted or not.
fn blocked_word(word: &Word) -> Option<String> {
    let upper = word.value.trim().to_ascii_uppercase();
    let listed = if word.quote_style.is_some() {
        BLOCKED_OBJECTS
    } else {
        BLOCKED_KEYWORDS
    };
    if listed.contains(&upper.as_str()) || upper.starts_with(BLOCKED_PREFIX) {
        Some(upper)
    } else {
        None
    }
}

/// `EXEC name ...` or `EXEC @status = name ...`; anything else is dynamic SQL.
fn check_exec_target<'a>(mut words: impl Iterator<Item = &'a Token>) -> DbResult<()> {
    let is_procedure = |token: Option<&Token>| {
        matches!(token, Some(Token::Word(word)) if !word.value.starts_with('@'))
    };
    let first = words.next();
    let ok = match first {
        Some(Token::Word(word)) if word.value.starts_with('@') => {
            matches!(words.next(), Some(Token::Eq)) && is_procedure(words.next())
        }
        other => is_procedure(other),
    };
    if ok {
        Ok(())
    } else {
        Err(DbError::validation(error_messages::DYNAMIC_EXEC))
    }
}

fn reject_blocked(tokens: &[Token]) -> DbResult<()> {
    for token in tokens {
        if let Token::Word(word) = token
            && let Some(keyword) = blocked_word(word)
        {
            return Err(DbError::validation(format!(
                "{keyword} is not allowed through this server"
            )));
        }
    }
    Ok(())
}

/// Validate free-form SQL for `execute_query` and classify it.
///
/// The first keyword (after whitespace and comments) must be one of
/// [`ALLOWED_STATEMENTS`], and no [`BLOCKED_KEYWORDS`] may appear anywhere in
/// the batch outside literals. Blocked procedures and rowset functions are
/// also caught when written as quoted identifiers.
///
/// # Examples
///
/// ```
/// use ssms_mcp_server::tools::sql_validator::{validate_query, StatementKind};
///
/// assert_eq!(validate_query("  select * from Users").unwrap(), StatementKind::Select);
/// assert!(validate_query("DROP TABLE Users").is_err());
/// ```
pub fn validate_query(sql: &str) -> DbResult<StatementKind> {
    if sql.trim().is_empty() {
        return Err(DbError::validation(error_messages::EMPTY));
    }

    let tokens = tokenize(sql)?;
    let mut words = significant(&tokens);

    let kind = match words.next() {
        Some(Token::Word(word)) if word.quote_style.is_none() => {
            StatementKind::from_keyword(&word.value).ok_or_else(|| {
                DbError::validation(format!(
                    "{} (got {})",
                    error_messages::DISALLOWED_START,
                    word.value.to_ascii_uppercase()
                ))
            })?
        }
        Some(_) => return Err(DbError::validation(error_messages::DISALLOWED_START)),
        None => return Err(DbError::validation(error_messages::EMPTY)),
    };

    if kind == StatementKind::Exec {
        check_exec_target(words)?;
    }

    reject_blocked(&tokens)?;
    Ok(kind)
}

/// Validate a caller-written WHERE clause (without the `WHERE` keyword).
///
/// The clause is appended verbatim to a generated statement, so it may not
/// end the statement, hide text in comments, or name blocked operations.
pub fn validate_where_clause(clause: &str) -> DbResult<()> {
    if clause.trim().is_empty() {
        return Err(DbError::validation(error_messages::WHERE_EMPTY));
    }

    let tokens = tokenize(clause)?;
    if tokens.iter().any(|t| matches!(t, Token::SemiColon)) {
        return Err(DbError::validation(error_messages::WHERE_SEPARATOR));
    }
    if tokens.iter().any(is_comment) {
        return Err(DbError::validation(error_messages::WHERE_COMMENT));
    }
    reject_blocked(&tokens)
}

/// Check that `name` is a plain identifier: `[A-Za-z_][A-Za-z0-9_]*`, at most 128 chars.
///
/// `what` names the argument in the error message (e.g. "table", "column").
pub fn validate_identifier(name: &str, what: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::validation(format!("{what} name must not be empty")));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(DbError::validation(format!(
            "{what} name exceeds {MAX_IDENTIFIER_LEN} characters"
        )));
    }

    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DbError::validation(format!(
            "Invalid {what} name '{name}': only letters, digits and underscores are allowed, \
             and it must not start with a digit"
        )));
    }
    Ok(())
}

/// Validate and bracket-quote an identifier.
pub fn quote_identifier(name: &str, what: &str) -> DbResult<String> {
    validate_identifier(name, what)?;
    Ok(format!("[{name}]"))
}

/// `[schema].[object]`, both parts validated.
pub fn qualified_name(schema: &str, object: &str, what: &str) -> DbResult<String> {
    Ok(format!(
        "{}.{}",
        quote_identifier(schema, "schema")?,
        quote_identifier(object, what)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_leading_keywords() {
        assert_eq!(validate_query("SELECT 1").unwrap(), StatementKind::Select);
        assert_eq!(
            validate_query("\n  insert into t (a) values (1)").unwrap(),
            StatementKind::Insert
        );
        assert_eq!(validate_query("Update t SET a = 1").unwrap(), StatementKind::Update);
        assert_eq!(validate_query("DELETE FROM t WHERE a = 1").unwrap(), StatementKind::Delete);
        assert_eq!(validate_query("EXEC dbo.usp_Report").unwrap(), StatementKind::Exec);
        assert_eq!(validate_query("execute usp_Report @Id = 1").unwrap(), StatementKind::Exec);
    }

    #[test]
    fn test_leading_comment_is_skipped() {
        assert_eq!(
            validate_query("-- report\n/* v2 */ SELECT * FROM t").unwrap(),
            StatementKind::Select
        );
    }

    #[test]
    fn test_disallowed_leading_keywords() {
        for sql in [
            "DROP TABLE Users",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "MERGE t USING s ON 1=1 WHEN MATCHED THEN DELETE;",
            "DECLARE @x INT",
            "USE master",
            "  ",
            "(SELECT 1)",
        ] {
            let err = validate_query(sql).unwrap_err();
            assert_eq!(err.kind(), "validation", "{sql}");
        }
    }

    #[test]
    fn test_blocked_keyword_later_in_batch() {
        let err = validate_query("SELECT 1; DROP TABLE Users").unwrap_err();
        assert!(err.to_string().contains("DROP"));
        assert!(validate_query("EXEC xp_cmdshell 'dir'").is_err());
        assert!(validate_query("SELECT * FROM OPENROWSET('SQLNCLI', 'x', 'y')").is_err());
    }

    #[test]
    fn test_quoted_blocked_procedures_rejected() {
        for sql in [
            "EXEC [xp_cmdshell] 'dir'",
            "EXEC master.dbo.[xp_cmdshell] 'dir'",
            "EXEC [sp_executesql] N'DROP TABLE Users'",
            "EXEC \"sp_configure\" 'show advanced options', 1",
            "EXEC @rc = [master].[dbo].[xp_cmdshell] 'dir'",
            "SELECT * FROM [OPENQUERY](srv, 'q')",
        ] {
            let err = validate_query(sql).unwrap_err();
            assert_eq!(err.kind(), "validation", "{sql}");
        }
    }

    #[test]
    fn test_keywords_inside_literals_are_fine() {
        assert!(validate_query("SELECT * FROM Notes WHERE body = 'please drop by'").is_ok());
        assert!(validate_query("SELECT [Create] FROM Audit").is_ok());
    }

    #[test]
    fn test_dynamic_exec_rejected() {
        assert!(validate_query("EXEC ('SELECT 1')").is_err());
        assert!(validate_query("EXEC @sql").is_err());
        assert!(validate_query("EXEC").is_err());
        assert!(validate_query("EXEC @rc").is_err());
        assert!(validate_query("EXEC @rc = @proc").is_err());
        assert!(validate_query("EXEC @rc = ('SELECT 1')").is_err());
    }

    #[test]
    fn test_exec_with_return_status() {
        assert_eq!(
            validate_query("EXEC @rc = dbo.usp_X @Id = 1").unwrap(),
            StatementKind::Exec
        );
        assert_eq!(
            validate_query("EXECUTE @rc=[dbo].[usp_X]").unwrap(),
            StatementKind::Exec
        );
    }

    #[test]
    fn test_where_clause_guard() {
        assert!(validate_where_clause("Id = @id AND Status <> 'closed'").is_ok());
        assert!(validate_where_clause("   ").is_err());
        assert!(validate_where_clause("1=1; DROP TABLE t").is_err());
        assert!(validate_where_clause("Id = 1 -- AND Owner = @me").is_err());
        assert!(validate_where_clause("Id = 1 /* x */").is_err());
        assert!(validate_where_clause("Id IN (SELECT Id FROM OPENQUERY(srv, 'q'))").is_err());
    }

    #[test]
    fn test_identifier_rules() {
        assert!(validate_identifier("File_Detail", "table").is_ok());
        assert!(validate_identifier("_tmp1", "column").is_ok());
        assert!(validate_identifier("1abc", "table").is_err());
        assert!(validate_identifier("a b", "table").is_err());
        assert!(validate_identifier("Users]; DROP TABLE x--", "table").is_err());
        assert!(validate_identifier("", "schema").is_err());
        assert!(validate_identifier(&"a".repeat(129), "table").is_err());
        assert!(validate_identifier(&"a".repeat(128), "table").is_ok());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(qualified_name("dbo", "Users", "table").unwrap(), "[dbo].[Users]");
        assert!(qualified_name("dbo", "Us]ers", "table").is_err());
    }
}
