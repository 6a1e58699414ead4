//! Display conversion of driver column data.
//!
//! Row cells are rendered to strings once, at the execution layer, so the
//! Markdown writer and session buffers only ever see text. TDS temporal
//! values carry driver-internal encodings (day counts and scaled increments);
//! the conversions here mirror the driver's own chrono mappings.

use chrono::{Duration, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{ColumnData, ColumnType};

/// Cell text used for SQL NULL.
pub const NULL_CELL: &str = "NULL";

/// Longest rendered binary prefix, in bytes, before the cell is elided.
const MAX_BINARY_BYTES: usize = 256;

/// Render one cell to its display string.
pub fn cell_text(data: ColumnData<'_>) -> String {
    match data {
        ColumnData::U8(v) => opt(v),
        ColumnData::I16(v) => opt(v),
        ColumnData::I32(v) => opt(v),
        ColumnData::I64(v) => opt(v),
        ColumnData::F32(v) => opt(v),
        ColumnData::F64(v) => opt(v),
        ColumnData::Bit(v) => match v {
            Some(true) => "true".to_string(),
            Some(false) => "false".to_string(),
            None => NULL_CELL.to_string(),
        },
        ColumnData::String(v) => v.map(|s| s.into_owned()).unwrap_or_else(null_cell),
        ColumnData::Guid(v) => v.map(|g| g.to_string()).unwrap_or_else(null_cell),
        ColumnData::Binary(v) => v.map(|b| hex_text(&b)).unwrap_or_else(null_cell),
        ColumnData::Numeric(v) => v
            .map(|n| Decimal::from_i128_with_scale(n.value(), n.scale() as u32).to_string())
            .unwrap_or_else(null_cell),
        ColumnData::Xml(v) => v
            .map(|x| x.into_owned().into_string())
            .unwrap_or_else(null_cell),
        ColumnData::Date(v) => v.map(|d| date_text(d)).unwrap_or_else(null_cell),
        ColumnData::Time(v) => v.map(|t| time_text(t)).unwrap_or_else(null_cell),
        ColumnData::DateTime(v) => v.map(|dt| datetime_text(dt)).unwrap_or_else(null_cell),
        ColumnData::SmallDateTime(v) => {
            v.map(|dt| smalldatetime_text(dt)).unwrap_or_else(null_cell)
        }
        ColumnData::DateTime2(v) => v.map(|dt| datetime2_text(dt)).unwrap_or_else(null_cell),
        ColumnData::DateTimeOffset(v) => {
            v.map(|dto| datetimeoffset_text(dto)).unwrap_or_else(null_cell)
        }
    }
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(null_cell)
}

fn null_cell() -> String {
    NULL_CELL.to_string()
}

fn hex_text(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(MAX_BINARY_BYTES)];
    let mut out = String::with_capacity(2 + shown.len() * 2);
    out.push_str("0x");
    for b in shown {
        out.push_str(&format!("{b:02X}"));
    }
    if bytes.len() > MAX_BINARY_BYTES {
        out.push_str("...");
    }
    out
}

// TDS `date`: day count from 0001-01-01.
fn date_text(date: tiberius::time::Date) -> String {
    let base = NaiveDate::from_ymd_opt(1, 1, 1).expect("calendar epoch");
    (base + Duration::days(date.days() as i64))
        .format("%Y-%m-%d")
        .to_string()
}

// TDS `time`: increments of 10^-scale seconds since midnight.
fn time_text(time: tiberius::time::Time) -> String {
    let nanos = time.increments() as i64 * 10i64.pow(9 - time.scale() as u32);
    let midnight = NaiveTime::from_hms_opt(0, 0, 0).expect("midnight");
    (midnight + Duration::nanoseconds(nanos))
        .format("%H:%M:%S%.f")
        .to_string()
}

// TDS `datetime`: days from 1900-01-01 plus 1/300-second fragments.
fn datetime_text(dt: tiberius::time::DateTime) -> String {
    let base = NaiveDate::from_ymd_opt(1900, 1, 1)
        .expect("datetime epoch")
        .and_hms_opt(0, 0, 0)
        .expect("midnight");
    let nanos = dt.seconds_fragments() as i64 * (1_000_000_000 / 300);
    (base + Duration::days(dt.days() as i64) + Duration::nanoseconds(nanos))
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

// TDS `smalldatetime`: days from 1900-01-01 plus whole minutes.
fn smalldatetime_text(dt: tiberius::time::SmallDateTime) -> String {
    let base = NaiveDate::from_ymd_opt(1900, 1, 1)
        .expect("datetime epoch")
        .and_hms_opt(0, 0, 0)
        .expect("midnight");
    (base + Duration::days(dt.days() as i64) + Duration::minutes(dt.seconds_fragments() as i64))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn datetime2_naive(dt: tiberius::time::DateTime2) -> chrono::NaiveDateTime {
    let base = NaiveDate::from_ymd_opt(1, 1, 1).expect("calendar epoch");
    let date = base + Duration::days(dt.date().days() as i64);
    let time = dt.time();
    let nanos = time.increments() as i64 * 10i64.pow(9 - time.scale() as u32);
    date.and_hms_opt(0, 0, 0).expect("midnight") + Duration::nanoseconds(nanos)
}

fn datetime2_text(dt: tiberius::time::DateTime2) -> String {
    datetime2_naive(dt).format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

// TDS `datetimeoffset`: UTC datetime2 plus an offset in minutes; shown in
// local time with the offset suffix, the way SQL Server prints it.
fn datetimeoffset_text(dto: tiberius::time::DateTimeOffset) -> String {
    let offset_minutes = dto.offset() as i64;
    let local = datetime2_naive(dto.datetime2()) + Duration::minutes(offset_minutes);
    let sign = if offset_minutes < 0 { '-' } else { '+' };
    let abs = offset_minutes.abs();
    format!(
        "{} {}{:02}:{:02}",
        local.format("%Y-%m-%d %H:%M:%S%.f"),
        sign,
        abs / 60,
        abs % 60
    )
}

/// Friendly SQL type name for column metadata.
pub fn type_display_name(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Null => "null",
        ColumnType::Bit | ColumnType::Bitn => "bit",
        ColumnType::Int1 => "tinyint",
        ColumnType::Int2 => "smallint",
        ColumnType::Int4 | ColumnType::Intn => "int",
        ColumnType::Int8 => "bigint",
        ColumnType::Float4 => "real",
        ColumnType::Float8 | ColumnType::Floatn => "float",
        ColumnType::Money | ColumnType::Money4 => "money",
        ColumnType::Decimaln => "decimal",
        ColumnType::Numericn => "numeric",
        ColumnType::Guid => "uniqueidentifier",
        ColumnType::Daten => "date",
        ColumnType::Timen => "time",
        ColumnType::Datetime | ColumnType::Datetimen => "datetime",
        ColumnType::Datetime4 => "smalldatetime",
        ColumnType::Datetime2 => "datetime2",
        ColumnType::DatetimeOffsetn => "datetimeoffset",
        ColumnType::BigChar => "char",
        ColumnType::BigVarChar => "varchar",
        ColumnType::NChar => "nchar",
        ColumnType::NVarchar => "nvarchar",
        ColumnType::Text => "text",
        ColumnType::NText => "ntext",
        ColumnType::BigBinary => "binary",
        ColumnType::BigVarBin => "varbinary",
        ColumnType::Image => "image",
        ColumnType::Xml => "xml",
        ColumnType::Udt => "udt",
        ColumnType::SSVariant => "sql_variant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn scalar_cells_render_plainly() {
        assert_eq!(cell_text(ColumnData::I32(Some(42))), "42");
        assert_eq!(cell_text(ColumnData::I64(None)), "NULL");
        assert_eq!(cell_text(ColumnData::Bit(Some(true))), "true");
        assert_eq!(
            cell_text(ColumnData::String(Some(Cow::Borrowed("Acme")))),
            "Acme"
        );
    }

    #[test]
    fn numeric_cells_keep_scale() {
        let n = tiberius::numeric::Numeric::new_with_scale(123_450, 2);
        assert_eq!(cell_text(ColumnData::Numeric(Some(n))), "1234.50");
    }

    #[test]
    fn guid_cells_render_hyphenated() {
        let guid = uuid::Uuid::parse_str("6F9619FF-8B86-D011-B42D-00C04FC964FF").unwrap();
        assert_eq!(
            cell_text(ColumnData::Guid(Some(guid))),
            "6f9619ff-8b86-d011-b42d-00c04fc964ff"
        );
    }

    #[test]
    fn binary_cells_render_hex() {
        let bytes: Vec<u8> = vec![0xDE, 0xAD, 0xBE, 0xEF];
        assert_eq!(
            cell_text(ColumnData::Binary(Some(Cow::Owned(bytes)))),
            "0xDEADBEEF"
        );
    }

    #[test]
    fn date_cells_use_calendar_epoch() {
        // 2025-01-01 is 739_252 days after 0001-01-01.
        let days = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .signed_duration_since(NaiveDate::from_ymd_opt(1, 1, 1).unwrap())
            .num_days() as u32;
        let date = tiberius::time::Date::new(days);
        assert_eq!(cell_text(ColumnData::Date(Some(date))), "2025-01-01");
    }

    #[test]
    fn time_cells_scale_increments() {
        // 13:30:00 at scale 0: 48600 seconds.
        let time = tiberius::time::Time::new(48_600, 0);
        assert_eq!(cell_text(ColumnData::Time(Some(time))), "13:30:00");
    }

    #[test]
    fn type_names_cover_common_columns() {
        assert_eq!(type_display_name(ColumnType::NVarchar), "nvarchar");
        assert_eq!(type_display_name(ColumnType::Intn), "int");
        assert_eq!(type_display_name(ColumnType::Guid), "uniqueidentifier");
    }
}
