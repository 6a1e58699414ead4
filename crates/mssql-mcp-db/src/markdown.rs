//! Markdown table rendering for tabular results.
//!
//! Tables are built line by line so background sessions can append rows to
//! their buffers as they arrive; synchronous tools collect the same lines
//! into one string and add the `Total rows: N` trailer.

/// Longest cell, in characters, before elision.
pub const MAX_CELL_WIDTH: usize = 100;

/// Escape and bound one cell for table layout.
pub fn escape_cell(raw: &str) -> String {
    let mut cell: String = raw
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect();
    cell = cell.replace('|', "\\|");

    if cell.chars().count() > MAX_CELL_WIDTH {
        let mut truncated: String = cell.chars().take(MAX_CELL_WIDTH - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        cell
    }
}

/// Header row plus the left-aligned separator row.
pub fn header_lines(columns: &[String]) -> (String, String) {
    let header = format!(
        "| {} |",
        columns
            .iter()
            .map(|c| escape_cell(c))
            .collect::<Vec<_>>()
            .join(" | ")
    );
    let separator = format!(
        "| {} |",
        columns.iter().map(|_| "---").collect::<Vec<_>>().join(" | ")
    );
    (header, separator)
}

/// One data row.
pub fn row_line(cells: &[String]) -> String {
    format!(
        "| {} |",
        cells
            .iter()
            .map(|c| escape_cell(c))
            .collect::<Vec<_>>()
            .join(" | ")
    )
}

/// Render a complete table with the `Total rows: N` trailer.
pub fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    if !columns.is_empty() {
        let (header, separator) = header_lines(columns);
        out.push_str(&header);
        out.push('\n');
        out.push_str(&separator);
        out.push('\n');
        for row in rows {
            out.push_str(&row_line(row));
            out.push('\n');
        }
    }
    out.push_str(&format!("\nTotal rows: {}", rows.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn renders_left_aligned_table_with_trailer() {
        let table = render_table(
            &cols(&["name", "state"]),
            &[
                vec!["master".to_string(), "ONLINE".to_string()],
                vec!["tempdb".to_string(), "ONLINE".to_string()],
            ],
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "| name | state |");
        assert_eq!(lines[1], "| --- | --- |");
        assert_eq!(lines[2], "| master | ONLINE |");
        assert!(table.ends_with("Total rows: 2"));
    }

    #[test]
    fn escapes_pipes_and_newlines() {
        assert_eq!(escape_cell("a|b"), "a\\|b");
        assert_eq!(escape_cell("line1\nline2"), "line1 line2");
    }

    #[test]
    fn long_cells_get_an_ellipsis() {
        let long = "x".repeat(500);
        let cell = escape_cell(&long);
        assert_eq!(cell.chars().count(), MAX_CELL_WIDTH);
        assert!(cell.ends_with("..."));
    }

    #[test]
    fn empty_result_set_is_just_the_trailer() {
        let table = render_table(&[], &[]);
        assert_eq!(table, "\nTotal rows: 0");
    }
}
