//! A string classifier with one branch pair per property.

use branchfuzz_core::target::{ExecContext, Target, TargetError};

pub const SEEDS: &[&str] = &["", "a", "A", "0", "hello", "123", "!@#"];

const SPECIAL_CHARS: &str = "!@#$%^&*()";

/// At least one cased character, and every cased character uppercase.
fn is_upper(s: &str) -> bool {
    let mut cased = false;
    for c in s.chars() {
        if c.is_lowercase() {
            return false;
        }
        cased |= c.is_uppercase();
    }
    cased
}

fn is_lower(s: &str) -> bool {
    let mut cased = false;
    for c in s.chars() {
        if c.is_uppercase() {
            return false;
        }
        cased |= c.is_lowercase();
    }
    cased
}

/// Integer literal check: optional surrounding whitespace, optional sign,
/// ASCII digits with single `_` separators between them.
fn is_integer_literal(s: &str) -> bool {
    let body = s.trim();
    let digits = body
        .strip_prefix('+')
        .or_else(|| body.strip_prefix('-'))
        .unwrap_or(body);
    !digits.is_empty()
        && digits
            .split('_')
            .all(|group| !group.is_empty() && group.bytes().all(|b| b.is_ascii_digit()))
}

/// Classifies `data`, recording a branch per decision. Returns a summary.
pub fn classify(data: &str, ctx: &mut ExecContext<'_>) -> String {
    ctx.record("start");
    let len = data.chars().count();
    let mut summary = String::new();

    if len < 3 {
        ctx.record("len_short");
        summary.push_str("Too short.");
        if len == 0 {
            ctx.record("empty");
            summary.push_str(" (empty)");
        } else {
            ctx.record("not_empty");
        }
        return summary;
    }
    ctx.record("len_ok");

    let mut note = |(tag, text): (&'static str, &str)| {
        ctx.record(tag);
        summary.push_str(text);
        summary.push(' ');
    };

    let first_alpha = data.chars().next().is_some_and(char::is_alphabetic);
    note(if first_alpha {
        ("alpha_start", "Starts with alpha.")
    } else {
        ("non_alpha_start", "Does not start with alpha.")
    });

    let digit_count = data.chars().filter(char::is_ascii_digit).count();
    note(if digit_count > 0 {
        ("digit_found", "Has digit.")
    } else {
        ("no_digit", "No digit.")
    });

    note(if is_upper(data) {
        ("all_upper", "All upper.")
    } else if is_lower(data) {
        ("all_lower", "All lower.")
    } else {
        ("mixed_case", "Mixed case.")
    });

    note(if data.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        ("special_char", "Special char found.")
    } else {
        ("no_special_char", "No special char.")
    });

    note(if is_integer_literal(data) {
        ("numeric", "Numeric input.")
    } else {
        ("non_numeric", "Non-numeric input.")
    });

    note(if len % 2 == 0 {
        ("even_length", "Even length.")
    } else {
        ("odd_length", "Odd length.")
    });

    note(if data.to_lowercase().contains("hello") {
        ("greeting", "Greeting detected.")
    } else {
        ("no_greeting", "No greeting.")
    });

    note(if digit_count > 2 {
        ("many_digits", "Many digits.")
    } else {
        ("few_digits", "Few digits.")
    });

    note(if data.chars().eq(data.chars().rev()) {
        ("palindrome", "Palindrome.")
    } else {
        ("not_palindrome", "Not a palindrome.")
    });

    summary
}

/// The classifier as a fuzz target. Never fails.
#[derive(Debug, Default)]
pub struct Classifier {
    last_summary: String,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_summary(&self) -> &str {
        &self.last_summary
    }
}

impl Target<String> for Classifier {
    fn name(&self) -> &str {
        "classifier"
    }

    fn execute(&mut self, input: &String, ctx: &mut ExecContext<'_>) -> Result<(), TargetError> {
        self.last_summary = classify(input, ctx);
        Ok(())
    }
}
