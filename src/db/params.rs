//! Parameter handling for SQL Server statements.
//!
//! Callers write `@name` placeholders and pass values in a JSON object. The
//! driver only understands positional `@P1..@Pn`, so [`rewrite_named`]
//! renumbers the placeholders and orders the values to match.

use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// Output of [`rewrite_named`].
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenSql {
    pub sql: String,
    /// Values in placeholder order, starting at `@P{start_index}`
    pub params: Vec<QueryParam>,
}

/// Rewrite `@name` placeholders into positional `@Pn` ones.
///
/// Names are matched case-insensitively against `values`; a name used more
/// than once keeps its first index. Placeholders with no supplied value are
/// left untouched (they may be local variables), as are `@@globals` and
/// anything inside string literals, quoted identifiers or comments. A supplied
/// value that the SQL never references is rejected.
pub fn rewrite_named(
    sql: &str,
    values: &Map<String, JsonValue>,
    start_index: usize,
) -> DbResult<RewrittenSql> {
    rewrite(sql, values, start_index, false)
}

/// Like [`rewrite_named`], but every `@name` must have a supplied value.
///
/// Used for WHERE fragments, which cannot declare local variables, so an
/// unknown name could only resolve to one of the generated `@Pn` slots.
pub fn rewrite_named_strict(
    sql: &str,
    values: &Map<String, JsonValue>,
    start_index: usize,
) -> DbResult<RewrittenSql> {
    rewrite(sql, values, start_index, true)
}

fn rewrite(
    sql: &str,
    values: &Map<String, JsonValue>,
    start_index: usize,
    strict: bool,
) -> DbResult<RewrittenSql> {
    let lookup: HashMap<String, (&str, &JsonValue)> = values
        .iter()
        .map(|(k, v)| (normalize_name(k), (k.as_str(), v)))
        .collect();
    if lookup.len() != values.len() {
        return Err(DbError::validation(
            "parameter names must be unique ignoring case",
        ));
    }

    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut assigned: HashMap<String, usize> = HashMap::new();
    let mut params = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '[' => {
                let close = if c == '[' { ']' } else { c };
                let end = skip_quoted(&chars, i, close);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map_or(chars.len(), |p| i + p);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = find_block_comment_end(&chars, i + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            '@' if chars.get(i + 1) == Some(&'@') => {
                let end = i + 2 + ident_len(&chars[i + 2..]);
                out.extend(&chars[i..end]);
                i = end;
            }
            '@' => {
                let len = ident_len(&chars[i + 1..]);
                if len == 0 {
                    out.push(c);
                    i += 1;
                    continue;
                }
                let name: String = chars[i + 1..i + 1 + len].iter().collect();
                let key = normalize_name(&name);
                match lookup.get(&key) {
                    Some((_, value)) => {
                        let index = match assigned.get(&key) {
                            Some(idx) => *idx,
                            None => {
                                let idx = start_index + params.len();
                                params.push(QueryParam::from(*value));
                                assigned.insert(key, idx);
                                idx
                            }
                        };
                        out.push_str(&format!("@P{index}"));
                    }
                    None if strict => {
                        return Err(DbError::validation(format!(
                            "@{name} is referenced but no value was supplied for it"
                        )));
                    }
                    None => {
                        out.push('@');
                        out.push_str(&name);
                    }
                }
                i += 1 + len;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    let mut unused: Vec<&str> = lookup
        .iter()
        .filter(|(key, _)| !assigned.contains_key(*key))
        .map(|(_, (original, _))| *original)
        .collect();
    if !unused.is_empty() {
        unused.sort_unstable();
        return Err(DbError::validation(format!(
            "parameters not referenced in SQL: {}",
            unused.join(", ")
        )));
    }

    Ok(RewrittenSql { sql: out, params })
}

/// Convert a JSON array of positional values, for SQL already written with `@P1..`.
pub fn positional(values: &[JsonValue]) -> Vec<QueryParam> {
    values.iter().map(QueryParam::from).collect()
}

/// Strip a leading `@` and lowercase, so `@Id`, `id` and `ID` collide.
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_start_matches('@').to_lowercase()
}

/// Bind a parameter to a tiberius query.
pub(crate) fn bind_param<'a>(query: &mut tiberius::Query<'a>, param: &'a QueryParam) {
    match param {
        QueryParam::Null => query.bind(Option::<&str>::None),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '#'
}

fn ident_len(chars: &[char]) -> usize {
    chars.iter().take_while(|c| is_ident_char(**c)).count()
}

/// Index just past the closing quote. Doubled quotes are escapes.
fn skip_quoted(chars: &[char], start: usize, close: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == close {
            if chars.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn find_block_comment_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}
