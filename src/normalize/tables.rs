pub(crate) const PLACEHOLDER_OPEN: char = '\u{E000}';
pub(crate) const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// Tables lifted out of the text by [`protect`], restored by index.
#[derive(Debug, Default)]
pub(crate) struct ProtectedTables {
    tables: Vec<String>,
}

impl ProtectedTables {
    pub(crate) fn restore(&self, text: &str) -> String {
        let mut output = text.to_string();
        for (index, table) in self.tables.iter().enumerate() {
            output = output.replace(&placeholder(index), table);
        }
        output
    }
}

fn placeholder(index: usize) -> String {
    format!("{}{}{}", PLACEHOLDER_OPEN, index, PLACEHOLDER_CLOSE)
}

/// A row is any line that starts and ends with a pipe once surrounding
/// whitespace is ignored.
pub(crate) fn is_pipe_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 2 && trimmed.starts_with('|') && trimmed.ends_with('|')
}

pub(crate) fn is_separator_row(line: &str) -> bool {
    is_pipe_row(line)
        && line.contains('-')
        && line
            .trim()
            .chars()
            .all(|ch| matches!(ch, '|' | '-' | ':' | ' ' | '\t'))
}

pub(crate) fn column_count(line: &str) -> usize {
    let trimmed = line.trim();
    let inner = trimmed
        .strip_prefix('|')
        .and_then(|rest| rest.strip_suffix('|'))
        .unwrap_or(trimmed);
    inner.split('|').count()
}

/// Replaces every header + separator + rows group with a placeholder line.
///
/// The separator must have exactly as many columns as the header, and a data
/// row at least as many; a row still arriving (fewer cells so far) stays out
/// of the table until it is complete, so a growing table never shrinks.
pub(crate) fn protect(text: &str) -> (String, ProtectedTables) {
    let lines = text.split('\n').collect::<Vec<_>>();
    let mut protected = ProtectedTables::default();
    let mut output = Vec::with_capacity(lines.len());
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let header_columns = column_count(line);
        let starts_table = is_pipe_row(line)
            && lines.get(index + 1).is_some_and(|next| {
                is_separator_row(next) && column_count(next) == header_columns
            });
        if !starts_table {
            output.push(line.to_string());
            index += 1;
            continue;
        }

        let mut end = index + 2;
        while end < lines.len()
            && is_pipe_row(lines[end])
            && column_count(lines[end]) >= header_columns
        {
            end += 1;
        }
        output.push(placeholder(protected.tables.len()));
        protected.tables.push(lines[index..end].join("\n"));
        index = end;
    }

    (output.join("\n"), protected)
}
