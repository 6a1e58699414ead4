//! Parameter discovery from the catalog.
//!
//! The lookup is parameterized end to end; object names never get
//! interpolated into catalog SQL.

use tracing::debug;

use super::{defaults, ParameterDescriptor};
use crate::connection::SqlConnection;
use crate::error::DbError;

const OBJECT_LOOKUP: &str = r#"
SELECT o.object_id, OBJECT_DEFINITION(o.object_id) AS definition
FROM sys.objects o
JOIN sys.schemas s ON s.schema_id = o.schema_id
WHERE s.name = @P1 AND o.name = @P2 AND o.type IN ('P', 'PC')
"#;

const PARAMETER_LOOKUP: &str = r#"
SELECT p.parameter_id, p.name, t.name AS type_name,
       p.max_length, p.precision, p.scale, p.is_output, p.is_nullable
FROM sys.parameters p
JOIN sys.types t ON p.user_type_id = t.user_type_id
WHERE p.object_id = @P1
ORDER BY p.parameter_id
"#;

/// Fetch the ordered descriptor list for `schema.name`.
///
/// The return-value pseudo-parameter (ordinal 0 / empty name) is filtered
/// out; defaults are recovered from the procedure definition.
pub(crate) async fn fetch_descriptors(
    conn: &mut SqlConnection,
    schema: &str,
    name: &str,
) -> Result<Vec<ParameterDescriptor>, DbError> {
    const OPERATION: &str = "reading stored procedure parameters";
    let wrap = |e| DbError::from_driver(OPERATION, e);

    let object_row = conn
        .client()
        .query(OBJECT_LOOKUP, &[&schema, &name])
        .await
        .map_err(wrap)?
        .into_row()
        .await
        .map_err(wrap)?
        .ok_or_else(|| DbError::ProcedureNotFound {
            name: format!("{schema}.{name}"),
        })?;

    let object_id: i32 = object_row.try_get(0).map_err(wrap)?.ok_or_else(|| {
        DbError::ProcedureNotFound {
            name: format!("{schema}.{name}"),
        }
    })?;
    let definition: Option<String> = object_row
        .try_get::<&str, _>(1)
        .map_err(wrap)?
        .map(|s| s.to_string());

    let rows = conn
        .client()
        .query(PARAMETER_LOOKUP, &[&object_id])
        .await
        .map_err(wrap)?
        .into_first_result()
        .await
        .map_err(wrap)?;

    let mut descriptors = Vec::with_capacity(rows.len());
    for row in rows {
        let ordinal: i32 = row.try_get(0).map_err(wrap)?.unwrap_or_default();
        let raw_name: String = row
            .try_get::<&str, _>(1)
            .map_err(wrap)?
            .unwrap_or_default()
            .to_string();
        // Ordinal 0 / unnamed is the return value, not a bindable parameter.
        if ordinal == 0 || raw_name.is_empty() {
            continue;
        }
        descriptors.push(ParameterDescriptor {
            ordinal,
            name: raw_name,
            sql_type: row
                .try_get::<&str, _>(2)
                .map_err(wrap)?
                .unwrap_or_default()
                .to_ascii_lowercase(),
            max_length: row.try_get(3).map_err(wrap)?.unwrap_or_default(),
            precision: row.try_get(4).map_err(wrap)?.unwrap_or_default(),
            scale: row.try_get(5).map_err(wrap)?.unwrap_or_default(),
            is_output: row.try_get(6).map_err(wrap)?.unwrap_or_default(),
            has_default: false,
            default_value: None,
            is_nullable: row.try_get(7).map_err(wrap)?.unwrap_or(true),
        });
    }

    if let Some(definition) = definition.as_deref() {
        defaults::apply_defaults(definition, &mut descriptors);
    }

    debug!(
        procedure = format!("{schema}.{name}"),
        parameters = descriptors.len(),
        "described stored procedure"
    );
    Ok(descriptors)
}
