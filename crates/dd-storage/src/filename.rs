//! File-name templating for rolled sink files (§4.5).
//!
//! Tokens: `%n` → 8-digit zero-padded sequential index, `%D` → local date
//! `YYYY-MM-DD`, `%T` → local time `HH_MM_SS`. Default pattern: `%n`.

use chrono::Local;

pub const DEFAULT_PATTERN: &str = "%n";

pub fn render(pattern: &str, sequence: u64) -> String {
    let now = Local::now();
    pattern
        .replace("%n", &format!("{sequence:08}"))
        .replace("%D", &now.format("%Y-%m-%d").to_string())
        .replace("%T", &now.format("%H_%M_%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_the_sequence_token() {
        assert_eq!(render("stf.%n.data", 7), "stf.00000007.data");
    }

    #[test]
    fn leaves_unknown_tokens_untouched() {
        assert_eq!(render("%n-%X", 1), "00000001-%X");
    }

    #[test]
    fn date_and_time_tokens_expand_to_nonempty_strings() {
        let rendered = render("%D_%T", 0);
        assert!(rendered.contains('_'));
        assert!(!rendered.contains("%D"));
        assert!(!rendered.contains("%T"));
    }
}
