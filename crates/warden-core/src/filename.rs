//! Download filename handling.

use std::sync::OnceLock;

use regex::Regex;

/// Maximum filename length in bytes.
const MAX_FILENAME_LEN: usize = 255;

/// Fallback name when sanitation leaves nothing usable.
const DEFAULT_FILENAME: &str = "download";

/// Characters replaced during sanitation, beyond control characters.
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

fn intermediate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\.(x?html?|php|asp|aspx|jsp)$").expect("intermediate pattern is valid")
    })
}

/// Sanitizes a filename for a reinitiated download.
///
/// Path separators are stripped to the final component, control and
/// reserved characters are replaced, surrounding whitespace and trailing
/// dots are trimmed, and the result is capped at 255 bytes on a char
/// boundary. An unusable name collapses to `download`.
pub fn sanitize(name: &str) -> String {
    // Keep only the final path component.
    let base = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_control() || RESERVED_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    cleaned = cleaned
        .trim()
        .trim_end_matches('.')
        .trim()
        .to_string();

    if cleaned.is_empty() {
        return DEFAULT_FILENAME.to_string();
    }

    while cleaned.len() > MAX_FILENAME_LEN {
        cleaned.pop();
    }

    cleaned
}

/// Heuristic for redirect/landing-page intermediate files.
///
/// Servers frequently answer a download link with a small HTML hop before
/// the real file; scanning and prompting on those would double every
/// download. The check is a policy knob, not a security boundary: anything
/// it lets through is still subject to the navigation guard.
pub fn is_intermediate(name: &str, mime: Option<&str>) -> bool {
    if let Some(mime) = mime {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        if essence.eq_ignore_ascii_case("text/html")
            || essence.eq_ignore_ascii_case("application/xhtml+xml")
        {
            return true;
        }
    }
    intermediate_pattern().is_match(name.trim())
}
