//! Parameter default recovery.
//!
//! `sys.parameters.has_default_value` is only populated for CLR procedures;
//! for T-SQL the defaults exist solely in the procedure text. This module
//! scans the parameter section of `OBJECT_DEFINITION` output for
//! `@name <type> = <literal>` clauses.

use regex::Regex;

use super::ParameterDescriptor;

/// Mark descriptors that carry a default in the procedure header and record
/// the literal. `NULL` defaults are recorded as the string `"NULL"`.
pub fn apply_defaults(definition: &str, descriptors: &mut [ParameterDescriptor]) {
    let header = parameter_section(definition);
    for descriptor in descriptors.iter_mut() {
        if let Some(default) = find_default(header, descriptor.bare_name()) {
            descriptor.has_default = true;
            descriptor.default_value = Some(default);
        }
    }
}

/// The definition text before the body-introducing `AS`, which is where
/// parameter declarations live.
fn parameter_section(definition: &str) -> &str {
    // `(?s)` is unnecessary: we only need the first standalone AS keyword.
    static PATTERN: &str = r"(?i)\bAS\b";
    match Regex::new(PATTERN).expect("static regex").find(definition) {
        Some(m) => &definition[..m.start()],
        None => definition,
    }
}

fn find_default(header: &str, bare_name: &str) -> Option<String> {
    // @Name <type...> = <quoted literal | token>
    let pattern = format!(
        r"(?i)@{}\b\s*[^,=]*?=\s*(N?'(?:[^']|'')*'|[^\s,()][^,\r\n)]*)",
        regex::escape(bare_name)
    );
    let re = Regex::new(&pattern).ok()?;
    let capture = re.captures(header)?.get(1)?;
    Some(normalize_literal(capture.as_str()))
}

fn normalize_literal(raw: &str) -> String {
    let raw = raw.trim();
    let unquoted = raw
        .strip_prefix('N')
        .filter(|rest| rest.starts_with('\''))
        .unwrap_or(raw);
    if let Some(inner) = unquoted
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
    {
        return inner.replace("''", "'");
    }
    if raw.eq_ignore_ascii_case("null") {
        return "NULL".to_string();
    }
    raw.to_string()
}
