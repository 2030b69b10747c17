//! Aircraft registration recovery from free text (typically a livery path).
//!
//! X-Plane does not expose the registration painted on a livery. Livery
//! folders usually carry it in their name, so we search for the common tail
//! number grammars:
//!
//! - `G-ABCD`: one letter, dash, four letters
//! - `EI-GJK`, `9H-QDU`: two letters/digits, dash, three letters
//! - `N12345`, `N1A`, `N12AB`: US civil register

use regex::Regex;
use std::sync::OnceLock;

fn registration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[A-Z]-[A-Z]{4}|([A-Z]|[1-9]){2}-[A-Z]{3}|N[0-9]{1,5}[A-Z]{0,2}")
            .expect("registration pattern is valid")
    })
}

/// Return the leftmost registration-looking token in `text`, if any.
pub fn extract_registration(text: &str) -> Option<String> {
    registration_pattern()
        .find(text)
        .map(|m| m.as_str().to_string())
}

/// Registration from the livery path, else the simulator's tail-number field.
///
/// Both sources missing yields an empty string.
pub fn registration_or_tail_number(livery_path: &str, tail_number: &str) -> String {
    extract_registration(livery_path).unwrap_or_else(|| tail_number.trim().to_string())
}
