//! SQL Server to JSON value mapping.
//!
//! Integers, floats and bits map to JSON numbers and booleans. Everything
//! whose precision or format JSON cannot carry (decimal, money, date/time,
//! uniqueidentifier, xml) becomes a string; binary becomes base64.

use crate::error::DbResult;
use crate::models::{ResultSet, Row};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Number, Value as JsonValue};
use tiberius::{ColumnData, FromSql};

/// Convert one driver cell to JSON.
pub fn column_value(data: &ColumnData<'static>) -> DbResult<JsonValue> {
    let value = match data {
        ColumnData::U8(v) => v.map(JsonValue::from),
        ColumnData::I16(v) => v.map(JsonValue::from),
        ColumnData::I32(v) => v.map(JsonValue::from),
        ColumnData::I64(v) => v.map(JsonValue::from),
        ColumnData::F32(v) => v.map(|f| float_value(f64::from(f))),
        ColumnData::F64(v) => v.map(float_value),
        ColumnData::Bit(v) => v.map(JsonValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| JsonValue::String(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| JsonValue::String(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| JsonValue::String(STANDARD.encode(b))),
        ColumnData::Numeric(v) => v.as_ref().map(|n| JsonValue::String(n.to_string())),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| JsonValue::String(x.clone().into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?
                .map(|dt| JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)?.map(|d| JsonValue::String(d.to_string())),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(|t| JsonValue::String(t.to_string())),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)?
            .map(|dt| JsonValue::String(dt.to_rfc3339())),
    };
    Ok(value.unwrap_or(JsonValue::Null))
}

/// NaN and infinity have no JSON form.
fn float_value(f: f64) -> JsonValue {
    Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
}

/// Convert a driver row to a JSON object keyed by column name.
///
/// Unnamed columns (e.g. `SELECT 1`) are keyed by their 1-based position.
pub fn convert_row(row: tiberius::Row) -> DbResult<Row> {
    let names: Vec<String> = row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| column_key(c.name(), i))
        .collect();

    let mut out = Row::new();
    for (name, data) in names.into_iter().zip(row) {
        out.insert(name, column_value(&data)?);
    }
    Ok(out)
}

fn column_key(name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("column{}", index + 1)
    } else {
        name.to_string()
    }
}

/// Convert the result sets of a query stream, keeping select-list column order.
pub fn convert_result_sets(sets: Vec<Vec<tiberius::Row>>) -> DbResult<Vec<ResultSet>> {
    sets.into_iter()
        .map(|rows| {
            let columns = rows
                .first()
                .map(|r| {
                    r.columns()
                        .iter()
                        .enumerate()
                        .map(|(i, c)| column_key(c.name(), i))
                        .collect()
                })
                .unwrap_or_default();
            let rows = rows
                .into_iter()
                .map(convert_row)
                .collect::<DbResult<Vec<_>>>()?;
            Ok(ResultSet { columns, rows })
        })
        .collect()
}
