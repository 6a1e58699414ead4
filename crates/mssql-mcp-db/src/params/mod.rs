//! Stored-procedure parameter engine.
//!
//! [`describe`] discovers parameter metadata from the catalog, [`bind`]
//! coerces loosely-typed JSON arguments into typed driver bindings, and
//! [`schema`] renders descriptors as JSON Schema or a Markdown table.

pub mod bind;
pub mod defaults;
pub mod describe;
pub mod schema;

pub use bind::{bind_parameters, BoundParameter, SqlValue};

use crate::error::DbError;

/// One stored-procedure parameter, as discovered from the catalog.
///
/// Ordinals are 1-based for inputs; ordinal 0 is the return value and is
/// filtered out by discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub ordinal: i32,
    /// Name including the `@` prefix.
    pub name: String,
    /// Lowercase SQL type name, e.g. `nvarchar`.
    pub sql_type: String,
    /// Declared storage length in bytes; `-1` for `(max)` types.
    pub max_length: i16,
    pub precision: u8,
    pub scale: u8,
    pub is_output: bool,
    pub has_default: bool,
    /// Textual default recovered from the procedure definition, if any.
    /// A `NULL` default is recorded as the string `"NULL"`.
    pub default_value: Option<String>,
    pub is_nullable: bool,
}

/// SQL type families the binder distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlTypeFamily {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Decimal,
    Real,
    Float,
    Bit,
    /// Single-byte character types: char, varchar, text.
    Char,
    /// UTF-16 character types: nchar, nvarchar, ntext.
    NChar,
    Binary,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    Uuid,
    Xml,
    Unknown,
}

impl ParameterDescriptor {
    /// Name without the `@` prefix.
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches('@')
    }

    pub fn family(&self) -> SqlTypeFamily {
        match self.sql_type.as_str() {
            "tinyint" => SqlTypeFamily::TinyInt,
            "smallint" => SqlTypeFamily::SmallInt,
            "int" => SqlTypeFamily::Int,
            "bigint" => SqlTypeFamily::BigInt,
            "decimal" | "numeric" | "money" | "smallmoney" => SqlTypeFamily::Decimal,
            "real" => SqlTypeFamily::Real,
            "float" => SqlTypeFamily::Float,
            "bit" => SqlTypeFamily::Bit,
            "char" | "varchar" | "text" => SqlTypeFamily::Char,
            "nchar" | "nvarchar" | "ntext" => SqlTypeFamily::NChar,
            "binary" | "varbinary" | "image" => SqlTypeFamily::Binary,
            "date" => SqlTypeFamily::Date,
            "time" => SqlTypeFamily::Time,
            "datetime" | "datetime2" | "smalldatetime" => SqlTypeFamily::DateTime,
            "datetimeoffset" => SqlTypeFamily::DateTimeOffset,
            "uniqueidentifier" => SqlTypeFamily::Uuid,
            "xml" => SqlTypeFamily::Xml,
            _ => SqlTypeFamily::Unknown,
        }
    }

    /// Declared length in characters; `None` for `(max)` or non-character
    /// types. N-types store two bytes per character.
    pub fn declared_char_length(&self) -> Option<i32> {
        if self.max_length < 0 {
            return None;
        }
        match self.family() {
            SqlTypeFamily::Char => Some(self.max_length as i32),
            SqlTypeFamily::NChar => Some(self.max_length as i32 / 2),
            _ => None,
        }
    }

    /// Display form of the type, e.g. `nvarchar(40)` or `decimal(10,2)`.
    pub fn display_type(&self) -> String {
        match self.family() {
            SqlTypeFamily::Char | SqlTypeFamily::NChar | SqlTypeFamily::Binary => {
                match self.declared_char_length() {
                    Some(n) => format!("{}({n})", self.sql_type),
                    None if self.max_length < 0 => format!("{}(max)", self.sql_type),
                    None => format!("{}({})", self.sql_type, self.max_length),
                }
            }
            SqlTypeFamily::Decimal => {
                format!("{}({},{})", self.sql_type, self.precision, self.scale)
            }
            _ => self.sql_type.clone(),
        }
    }
}

/// Split `schema.name` with a default schema of `dbo`, honoring square
/// brackets. Bracketed parts may contain dots; `]]` unescapes to `]`.
pub fn parse_object_name(raw: &str) -> Result<(String, String), DbError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DbError::empty_argument("Procedure name"));
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();
    let mut in_brackets = false;

    while let Some(c) = chars.next() {
        match c {
            '[' if !in_brackets => in_brackets = true,
            ']' if in_brackets => {
                if chars.peek() == Some(&']') {
                    chars.next();
                    current.push(']');
                } else {
                    in_brackets = false;
                }
            }
            '.' if !in_brackets => {
                parts.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    parts.push(current);

    let invalid = || DbError::InvalidObjectName {
        name: raw.to_string(),
    };

    match parts.as_slice() {
        [name] if !name.trim().is_empty() => Ok(("dbo".to_string(), name.trim().to_string())),
        [schema, name] if !schema.trim().is_empty() && !name.trim().is_empty() => {
            Ok((schema.trim().to_string(), name.trim().to_string()))
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(sql_type: &str, max_length: i16) -> ParameterDescriptor {
        ParameterDescriptor {
            ordinal: 1,
            name: "@P".to_string(),
            sql_type: sql_type.to_string(),
            max_length,
            precision: 10,
            scale: 2,
            is_output: false,
            has_default: false,
            default_value: None,
            is_nullable: true,
        }
    }

    #[test]
    fn object_name_defaults_to_dbo() {
        assert_eq!(
            parse_object_name("CreateNewCustomer").unwrap(),
            ("dbo".to_string(), "CreateNewCustomer".to_string())
        );
    }

    #[test]
    fn object_name_honors_schema_and_brackets() {
        assert_eq!(
            parse_object_name("[sales].[Order Details Proc]").unwrap(),
            ("sales".to_string(), "Order Details Proc".to_string())
        );
        assert_eq!(
            parse_object_name("sales.Orders").unwrap(),
            ("sales".to_string(), "Orders".to_string())
        );
    }

    #[test]
    fn bracketed_names_may_contain_dots() {
        assert_eq!(
            parse_object_name("[dbo].[weird.name]").unwrap(),
            ("dbo".to_string(), "weird.name".to_string())
        );
    }

    #[test]
    fn three_part_names_are_rejected() {
        assert!(parse_object_name("db.schema.proc").is_err());
        assert!(parse_object_name("").is_err());
        assert!(parse_object_name(".").is_err());
    }

    #[test]
    fn nchar_length_is_halved() {
        assert_eq!(descriptor("nvarchar", 80).declared_char_length(), Some(40));
        assert_eq!(descriptor("varchar", 80).declared_char_length(), Some(80));
        assert_eq!(descriptor("nvarchar", -1).declared_char_length(), None);
    }

    #[test]
    fn display_type_shows_length_and_scale() {
        assert_eq!(descriptor("nvarchar", 80).display_type(), "nvarchar(40)");
        assert_eq!(descriptor("nvarchar", -1).display_type(), "nvarchar(max)");
        assert_eq!(descriptor("decimal", 9).display_type(), "decimal(10,2)");
        assert_eq!(descriptor("int", 4).display_type(), "int");
    }
}
