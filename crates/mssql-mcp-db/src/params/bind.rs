//! JSON-to-SQL parameter binding.
//!
//! Keys match case-insensitively, with or without the `@` prefix. Missing
//! parameters with a catalog default are omitted so the server applies the
//! default; missing required parameters fail. Values are converted per the
//! target type family with range, length and format checks.

use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tiberius::ToSql;
use tracing::warn;

use super::{ParameterDescriptor, SqlTypeFamily};
use crate::error::DbError;

/// A typed binding ready for the driver, in ordinal order.
#[derive(Debug, Clone)]
pub struct BoundParameter {
    /// Bare parameter name (no `@`).
    pub name: String,
    pub value: SqlValue,
}

/// Owned typed value; `None` in a variant is a typed SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    TinyInt(Option<u8>),
    SmallInt(Option<i16>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Real(Option<f32>),
    Float(Option<f64>),
    Bit(Option<bool>),
    Decimal(Option<Decimal>),
    String(Option<String>),
    Binary(Option<Vec<u8>>),
    Uuid(Option<uuid::Uuid>),
    Date(Option<NaiveDate>),
    Time(Option<NaiveTime>),
    DateTime(Option<NaiveDateTime>),
    DateTimeOffset(Option<DateTime<Utc>>),
}

impl SqlValue {
    /// Borrow as a driver-bindable value.
    pub fn as_sql(&self) -> &dyn ToSql {
        match self {
            SqlValue::TinyInt(v) => v,
            SqlValue::SmallInt(v) => v,
            SqlValue::Int(v) => v,
            SqlValue::BigInt(v) => v,
            SqlValue::Real(v) => v,
            SqlValue::Float(v) => v,
            SqlValue::Bit(v) => v,
            SqlValue::Decimal(v) => v,
            SqlValue::String(v) => v,
            SqlValue::Binary(v) => v,
            SqlValue::Uuid(v) => v,
            SqlValue::Date(v) => v,
            SqlValue::Time(v) => v,
            SqlValue::DateTime(v) => v,
            SqlValue::DateTimeOffset(v) => v,
        }
    }
}

/// Bind a JSON argument object against the descriptor list.
///
/// The result is in ascending ordinal order with no gaps for required
/// parameters; omitted defaults simply do not appear.
pub fn bind_parameters(
    descriptors: &[ParameterDescriptor],
    args: &serde_json::Map<String, Value>,
) -> Result<Vec<BoundParameter>, DbError> {
    let mut bound = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let value = lookup(args, descriptor.bare_name());

        if descriptor.is_output {
            if value.is_some() {
                return Err(DbError::OutputParameterUnsupported {
                    name: descriptor.bare_name().to_string(),
                });
            }
            continue;
        }

        match value {
            None => {
                if descriptor.has_default {
                    continue;
                }
                return Err(DbError::ParameterMissing {
                    name: descriptor.bare_name().to_string(),
                });
            }
            Some(json) => {
                let value = convert(descriptor, json)?;
                bound.push(BoundParameter {
                    name: descriptor.bare_name().to_string(),
                    value,
                });
            }
        }
    }

    for key in args.keys() {
        let bare = key.trim_start_matches('@');
        if !descriptors
            .iter()
            .any(|d| d.bare_name().eq_ignore_ascii_case(bare))
        {
            warn!(parameter = key.as_str(), "ignoring argument with no matching parameter");
        }
    }

    Ok(bound)
}

fn lookup<'a>(args: &'a serde_json::Map<String, Value>, bare_name: &str) -> Option<&'a Value> {
    args.iter()
        .find(|(key, _)| key.trim_start_matches('@').eq_ignore_ascii_case(bare_name))
        .map(|(_, value)| value)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(descriptor: &ParameterDescriptor, value: &Value) -> DbError {
    DbError::ParameterType {
        name: descriptor.bare_name().to_string(),
        source_type: json_type_name(value).to_string(),
        target_type: descriptor.display_type(),
    }
}

fn convert(descriptor: &ParameterDescriptor, value: &Value) -> Result<SqlValue, DbError> {
    let family = descriptor.family();

    if value.is_null() {
        if !descriptor.is_nullable {
            return Err(DbError::NullNotAllowed {
                name: descriptor.bare_name().to_string(),
            });
        }
        return Ok(null_of(family));
    }

    match family {
        SqlTypeFamily::TinyInt => {
            let n = integral(descriptor, value)?;
            let v = u8::try_from(n).map_err(|_| type_error(descriptor, value))?;
            Ok(SqlValue::TinyInt(Some(v)))
        }
        SqlTypeFamily::SmallInt => {
            let n = integral(descriptor, value)?;
            let v = i16::try_from(n).map_err(|_| type_error(descriptor, value))?;
            Ok(SqlValue::SmallInt(Some(v)))
        }
        SqlTypeFamily::Int => {
            let n = integral(descriptor, value)?;
            let v = i32::try_from(n).map_err(|_| type_error(descriptor, value))?;
            Ok(SqlValue::Int(Some(v)))
        }
        SqlTypeFamily::BigInt => Ok(SqlValue::BigInt(Some(integral(descriptor, value)?))),
        SqlTypeFamily::Decimal => {
            let d = match value {
                Value::Number(n) => Decimal::from_str(&n.to_string())
                    .map_err(|_| type_error(descriptor, value))?,
                Value::String(s) => {
                    Decimal::from_str(s.trim()).map_err(|_| type_error(descriptor, value))?
                }
                _ => return Err(type_error(descriptor, value)),
            };
            Ok(SqlValue::Decimal(Some(d)))
        }
        SqlTypeFamily::Real => {
            let f = floating(descriptor, value)?;
            Ok(SqlValue::Real(Some(f as f32)))
        }
        SqlTypeFamily::Float => Ok(SqlValue::Float(Some(floating(descriptor, value)?))),
        SqlTypeFamily::Bit => Ok(SqlValue::Bit(Some(bit(descriptor, value)?))),
        SqlTypeFamily::Char | SqlTypeFamily::NChar => {
            let Value::String(s) = value else {
                return Err(type_error(descriptor, value));
            };
            if let Some(limit) = descriptor.declared_char_length() {
                let chars = s.chars().count();
                if chars > limit as usize {
                    return Err(DbError::ParameterType {
                        name: descriptor.bare_name().to_string(),
                        source_type: format!("string of length {chars}"),
                        target_type: descriptor.display_type(),
                    });
                }
            }
            Ok(SqlValue::String(Some(s.clone())))
        }
        SqlTypeFamily::Binary => {
            let Value::String(s) = value else {
                return Err(type_error(descriptor, value));
            };
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(s.trim())
                .unwrap_or_else(|_| s.as_bytes().to_vec());
            Ok(SqlValue::Binary(Some(bytes)))
        }
        SqlTypeFamily::Date => {
            let Value::String(s) = value else {
                return Err(type_error(descriptor, value));
            };
            let d = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|_| type_error(descriptor, value))?;
            Ok(SqlValue::Date(Some(d)))
        }
        SqlTypeFamily::Time => {
            let Value::String(s) = value else {
                return Err(type_error(descriptor, value));
            };
            let s = s.trim();
            let t = NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                .map_err(|_| type_error(descriptor, value))?;
            Ok(SqlValue::Time(Some(t)))
        }
        SqlTypeFamily::DateTime => {
            let Value::String(s) = value else {
                return Err(type_error(descriptor, value));
            };
            Ok(SqlValue::DateTime(Some(
                parse_datetime(s.trim()).ok_or_else(|| type_error(descriptor, value))?,
            )))
        }
        SqlTypeFamily::DateTimeOffset => {
            let Value::String(s) = value else {
                return Err(type_error(descriptor, value));
            };
            let s = s.trim();
            let dt = DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| parse_datetime(s).map(|naive| naive.and_utc()))
                .ok_or_else(|| type_error(descriptor, value))?;
            Ok(SqlValue::DateTimeOffset(Some(dt)))
        }
        SqlTypeFamily::Uuid => {
            let Value::String(s) = value else {
                return Err(type_error(descriptor, value));
            };
            let id = uuid::Uuid::parse_str(s.trim()).map_err(|_| type_error(descriptor, value))?;
            Ok(SqlValue::Uuid(Some(id)))
        }
        SqlTypeFamily::Xml => {
            let Value::String(s) = value else {
                return Err(type_error(descriptor, value));
            };
            Ok(SqlValue::String(Some(s.clone())))
        }
        // Unknown types pass through unchanged as text.
        SqlTypeFamily::Unknown => Ok(SqlValue::String(Some(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }))),
    }
}

fn null_of(family: SqlTypeFamily) -> SqlValue {
    match family {
        SqlTypeFamily::TinyInt => SqlValue::TinyInt(None),
        SqlTypeFamily::SmallInt => SqlValue::SmallInt(None),
        SqlTypeFamily::Int => SqlValue::Int(None),
        SqlTypeFamily::BigInt => SqlValue::BigInt(None),
        SqlTypeFamily::Real => SqlValue::Real(None),
        SqlTypeFamily::Float => SqlValue::Float(None),
        SqlTypeFamily::Bit => SqlValue::Bit(None),
        SqlTypeFamily::Decimal => SqlValue::Decimal(None),
        SqlTypeFamily::Binary => SqlValue::Binary(None),
        SqlTypeFamily::Uuid => SqlValue::Uuid(None),
        SqlTypeFamily::Date => SqlValue::Date(None),
        SqlTypeFamily::Time => SqlValue::Time(None),
        SqlTypeFamily::DateTime => SqlValue::DateTime(None),
        SqlTypeFamily::DateTimeOffset => SqlValue::DateTimeOffset(None),
        SqlTypeFamily::Char | SqlTypeFamily::NChar | SqlTypeFamily::Xml | SqlTypeFamily::Unknown => {
            SqlValue::String(None)
        }
    }
}

fn integral(descriptor: &ParameterDescriptor, value: &Value) -> Result<i64, DbError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    return Ok(f as i64);
                }
            }
            Err(type_error(descriptor, value))
        }
        Value::String(s) => s.trim().parse().map_err(|_| type_error(descriptor, value)),
        _ => Err(type_error(descriptor, value)),
    }
}

fn floating(descriptor: &ParameterDescriptor, value: &Value) -> Result<f64, DbError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| type_error(descriptor, value)),
        Value::String(s) => s.trim().parse().map_err(|_| type_error(descriptor, value)),
        _ => Err(type_error(descriptor, value)),
    }
}

fn bit(descriptor: &ParameterDescriptor, value: &Value) -> Result<bool, DbError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(type_error(descriptor, value)),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(true),
            "false" | "no" | "n" | "0" => Ok(false),
            _ => Err(type_error(descriptor, value)),
        },
        _ => Err(type_error(descriptor, value)),
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
