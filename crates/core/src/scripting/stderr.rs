//! Classification of the script's stderr lines.
//!
//! The interpreter writes both benign warnings and real errors to stderr.
//! A line mentioning "warning" (any case) is benign; every other non-blank
//! line is a failure candidate.

/// Outcome of classifying one stderr line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrClass {
    Warning,
    Failure,
}

/// Classify a single stderr line. Blank lines yield `None`.
pub fn classify_stderr_line(line: &str) -> Option<StderrClass> {
    if line.trim().is_empty() {
        return None;
    }
    if line.to_lowercase().contains("warning") {
        Some(StderrClass::Warning)
    } else {
        Some(StderrClass::Failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn na_coercion_is_a_warning() {
        assert_eq!(
            classify_stderr_line("Warning: NAs introduced by coercion"),
            Some(StderrClass::Warning)
        );
    }

    #[test]
    fn warning_match_is_case_insensitive() {
        assert_eq!(
            classify_stderr_line("In addition: WARNING message:"),
            Some(StderrClass::Warning)
        );
        assert_eq!(
            classify_stderr_line("there were 2 warnings (use warnings() to see them)"),
            Some(StderrClass::Warning)
        );
    }

    #[test]
    fn object_not_found_is_a_failure() {
        assert_eq!(
            classify_stderr_line("Error: object not found"),
            Some(StderrClass::Failure)
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(classify_stderr_line(""), None);
        assert_eq!(classify_stderr_line("   \t"), None);
    }
}
