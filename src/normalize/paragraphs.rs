/// Every non-blank line becomes its own trimmed block; blank runs collapse to
/// one block boundary.
pub(super) fn normalize(text: &str) -> String {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_breaks_become_block_boundaries() {
        assert_eq!(normalize("a\nb"), "a\n\nb");
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(normalize("a\n\n\n \n\nb\n"), "a\n\nb");
    }

    #[test]
    fn indentation_does_not_survive_as_code() {
        assert_eq!(normalize("\tindented line"), "indented line");
        assert_eq!(
            normalize("    code-looking line\nnext   "),
            "code-looking line\n\nnext"
        );
    }
}
