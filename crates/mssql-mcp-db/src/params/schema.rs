//! Descriptor rendering: JSON Schema and Markdown.

use serde_json::{json, Map, Value};

use super::{ParameterDescriptor, SqlTypeFamily};

/// JSON-Schema description of a procedure's parameters (`format: "json"`).
pub fn parameters_json(procedure_name: &str, descriptors: &[ParameterDescriptor]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut outputs = Vec::new();

    for descriptor in descriptors {
        if descriptor.is_output {
            outputs.push(json!({
                "name": descriptor.bare_name(),
                "sqlType": descriptor.display_type(),
                "direction": "output",
            }));
            continue;
        }
        properties.insert(
            descriptor.bare_name().to_string(),
            property_schema(descriptor),
        );
        if !descriptor.has_default {
            required.push(Value::String(descriptor.bare_name().to_string()));
        }
    }

    let mut root = json!({
        "procedureName": procedure_name,
        "description": format!("Parameters for stored procedure '{procedure_name}'"),
        "parameters": {
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        },
        "returnValue": {
            "type": "integer",
            "sqlType": "int",
            "description": "Return code (0 for success)",
        },
    });
    if !outputs.is_empty() {
        root["outputParameters"] = Value::Array(outputs);
    }
    root
}

fn property_schema(descriptor: &ParameterDescriptor) -> Value {
    let mut schema = match descriptor.family() {
        SqlTypeFamily::TinyInt => json!({"type": "integer", "minimum": 0, "maximum": 255}),
        SqlTypeFamily::SmallInt => {
            json!({"type": "integer", "minimum": i16::MIN, "maximum": i16::MAX})
        }
        SqlTypeFamily::Int => json!({"type": "integer", "minimum": i32::MIN, "maximum": i32::MAX}),
        SqlTypeFamily::BigInt => {
            json!({"type": "integer", "minimum": i64::MIN, "maximum": i64::MAX})
        }
        SqlTypeFamily::Decimal => {
            let step = 1.0 / 10f64.powi(descriptor.scale as i32);
            json!({"type": ["number", "string"], "multipleOf": step})
        }
        SqlTypeFamily::Real | SqlTypeFamily::Float => json!({"type": "number"}),
        SqlTypeFamily::Bit => json!({"type": "boolean"}),
        SqlTypeFamily::Char | SqlTypeFamily::NChar => match descriptor.declared_char_length() {
            Some(limit) => json!({"type": "string", "maxLength": limit}),
            None => json!({"type": "string"}),
        },
        SqlTypeFamily::Binary => json!({"type": "string", "contentEncoding": "base64"}),
        SqlTypeFamily::Date => json!({"type": "string", "format": "date"}),
        SqlTypeFamily::Time => json!({"type": "string", "format": "time"}),
        SqlTypeFamily::DateTime | SqlTypeFamily::DateTimeOffset => {
            json!({"type": "string", "format": "date-time"})
        }
        SqlTypeFamily::Uuid => json!({"type": "string", "format": "uuid"}),
        SqlTypeFamily::Xml | SqlTypeFamily::Unknown => json!({"type": "string"}),
    };

    schema["description"] = Value::String(descriptor.display_type());
    if descriptor.has_default {
        schema["defaultValue"] = match descriptor.default_value.as_deref() {
            Some("NULL") | None => Value::Null,
            Some(text) => Value::String(text.to_string()),
        };
    }
    schema
}

/// Markdown table plus a JSON usage example (`format: "table"`).
pub fn parameters_markdown(procedure_name: &str, descriptors: &[ParameterDescriptor]) -> String {
    let mut out = format!("## Parameters for `{procedure_name}`\n\n");
    out.push_str("| Parameter | Type | Required | Direction | Default |\n");
    out.push_str("| --- | --- | --- | --- | --- |\n");

    for descriptor in descriptors {
        let required = if descriptor.is_output || descriptor.has_default {
            "No"
        } else {
            "Yes"
        };
        let direction = if descriptor.is_output { "OUTPUT" } else { "Input" };
        let default = descriptor.default_value.as_deref().unwrap_or("-");
        out.push_str(&format!(
            "| @{} | {} | {} | {} | {} |\n",
            descriptor.bare_name(),
            descriptor.display_type(),
            required,
            direction,
            default
        ));
    }

    let example: Map<String, Value> = descriptors
        .iter()
        .filter(|d| !d.is_output)
        .map(|d| (d.bare_name().to_string(), example_value(d)))
        .collect();

    out.push_str("\n### Usage example\n\n```json\n");
    out.push_str(&serde_json::to_string_pretty(&Value::Object(example)).unwrap_or_default());
    out.push_str("\n```");
    out
}

fn example_value(descriptor: &ParameterDescriptor) -> Value {
    if let Some(default) = descriptor.default_value.as_deref() {
        if default != "NULL" {
            return Value::String(default.to_string());
        }
    }
    match descriptor.family() {
        SqlTypeFamily::TinyInt
        | SqlTypeFamily::SmallInt
        | SqlTypeFamily::Int
        | SqlTypeFamily::BigInt => json!(123),
        SqlTypeFamily::Decimal | SqlTypeFamily::Real | SqlTypeFamily::Float => json!(99.95),
        SqlTypeFamily::Bit => json!(true),
        SqlTypeFamily::Binary => json!("3q2+7w=="),
        SqlTypeFamily::Date => json!("2025-01-01"),
        SqlTypeFamily::Time => json!("13:30:00"),
        SqlTypeFamily::DateTime | SqlTypeFamily::DateTimeOffset => {
            json!("2025-01-01T13:30:00Z")
        }
        SqlTypeFamily::Uuid => json!("6f9619ff-8b86-d011-b42d-00c04fc964ff"),
        SqlTypeFamily::Xml => json!("<root />"),
        _ => json!("value"),
    }
}
