//! Name Normalization Module
//!
//! Turns raw caller-supplied names into store keys and on-disk filename
//! fragments.

use crate::error::{CacheError, Result};

/// Separates a namespace from the entry name inside a store key.
pub const SEPARATOR: char = ':';

// == Normalize ==
/// Normalizes a raw entry name into a store key fragment.
///
/// Everything from the first [`SEPARATOR`] onward is discarded, surrounding
/// whitespace is trimmed and the result is lower-cased.
///
/// # Errors
/// `InvalidName` if nothing is left after trimming.
pub fn normalize(raw: &str) -> Result<String> {
    let head = match raw.find(SEPARATOR) {
        Some(pos) => &raw[..pos],
        None => raw,
    };

    let name = head.trim();
    if name.is_empty() {
        return Err(CacheError::InvalidName(
            "Cache-entry name cannot be empty".to_string(),
        ));
    }

    Ok(name.to_lowercase())
}

// == Normalize Filename ==
/// Normalizes a (possibly namespaced) key into a filename fragment.
///
/// The key is trimmed, transliterated to ASCII, lower-cased, every run of
/// characters outside `[a-z0-9-:]` becomes a single `_` and the separator is
/// rendered as `.`. The `.cache` suffix is not included.
pub fn normalize_filename(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;

    for c in transliterate(raw.trim()).chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            out.push(c);
            in_run = false;
        } else if c == SEPARATOR {
            out.push('.');
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    if out.is_empty() {
        return Err(CacheError::InvalidName(
            "Cache-entry name cannot be empty".to_string(),
        ));
    }

    Ok(out)
}

/// Maps Latin-1 letters onto their closest ASCII spelling; anything else
/// outside ASCII passes through untouched and is replaced later.
fn transliterate(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let mapped = match c {
            'À'..='Å' => "A",
            'Æ' => "AE",
            'Ç' => "C",
            'È'..='Ë' => "E",
            'Ì'..='Ï' => "I",
            'Ð' => "D",
            'Ñ' => "N",
            'Ò'..='Ö' | 'Ø' => "O",
            'Ù'..='Ü' => "U",
            'Ý' => "Y",
            'Þ' => "TH",
            'ß' => "ss",
            'à'..='å' => "a",
            'æ' => "ae",
            'ç' => "c",
            'è'..='ë' => "e",
            'ì'..='ï' => "i",
            'ð' => "d",
            'ñ' => "n",
            'ò'..='ö' | 'ø' => "o",
            'ù'..='ü' => "u",
            'ý' | 'ÿ' => "y",
            'þ' => "th",
            _ => {
                out.push(c);
                continue;
            }
        };
        out.push_str(mapped);
    }
    out
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_lowercases() {
        assert_eq!(normalize("  Hello World ").unwrap(), "hello world");
    }

    #[test]
    fn test_normalize_empty_rejected() {
        assert!(matches!(normalize(""), Err(CacheError::InvalidName(_))));
        assert!(matches!(normalize("   "), Err(CacheError::InvalidName(_))));
    }

    #[test]
    fn test_normalize_truncates_at_separator() {
        assert_eq!(normalize("user:42").unwrap(), "user");
        assert_eq!(normalize(" Key :rest:more").unwrap(), "key");
    }

    #[test]
    fn test_normalize_separator_first_is_empty() {
        assert!(matches!(normalize(":abc"), Err(CacheError::InvalidName(_))));
        assert!(matches!(normalize("  :abc"), Err(CacheError::InvalidName(_))));
    }

    #[test]
    fn test_filename_maps_separator_to_dot() {
        assert_eq!(normalize_filename("pages:home").unwrap(), "pages.home");
    }

    #[test]
    fn test_filename_collapses_runs() {
        assert_eq!(normalize_filename("a  b//c").unwrap(), "a_b_c");
        assert_eq!(normalize_filename("x!@#y").unwrap(), "x_y");
        assert_eq!(normalize_filename("keep-dash").unwrap(), "keep-dash");
    }

    #[test]
    fn test_filename_transliterates_latin1() {
        assert_eq!(normalize_filename("Café").unwrap(), "cafe");
        assert_eq!(normalize_filename("Straße").unwrap(), "strasse");
        assert_eq!(normalize_filename("Ærø").unwrap(), "aero");
    }

    #[test]
    fn test_filename_non_latin_replaced() {
        assert_eq!(normalize_filename("日本").unwrap(), "_");
    }

    #[test]
    fn test_filename_empty_rejected() {
        assert!(matches!(
            normalize_filename("  "),
            Err(CacheError::InvalidName(_))
        ));
    }

    #[test]
    fn test_filename_no_path_traversal() {
        let name = normalize_filename("../../etc/passwd").unwrap();
        assert!(!name.contains('/'));
        assert_eq!(name, "_etc_passwd");
    }
}
