//! Text normalisation shared by the roster and token sources.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Values accepted as "true" in free-text boolean columns, compared after
/// [`fold`].
const TRUTHY: &[&str] = &["true", "1", "yes", "si", "x"];

/// Extra marker accepted in the token `Usado` column.
const USED_MARKER: &str = "used";

/// Remove diacritics, e.g. `"Sí"` becomes `"Si"`.
pub fn strip_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case, accent and whitespace insensitive form of a string.
pub fn fold(s: &str) -> String {
    collapse_whitespace(&strip_accents(s)).to_lowercase()
}

/// Does this free-text cell mean "true"?
pub fn is_truthy(s: &str) -> bool {
    TRUTHY.contains(&fold(s).as_str())
}

/// Does this `Usado` cell mark the token as used?
pub fn is_used_marker(s: &str) -> bool {
    is_truthy(s) || fold(s) == USED_MARKER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accents() {
        assert_eq!("Si", strip_accents("Sí"));
        assert_eq!("Division", strip_accents("División"));
        assert_eq!("Pena", strip_accents("Peña"));
    }

    #[test]
    fn folding() {
        assert_eq!(
            "nombres a utilizar para votar",
            fold("  NOMBRES A UTILIZAR  PARA VOTAR ")
        );
        assert_eq!("dependencia/division", fold("Dependencia/División"));
    }

    #[test]
    fn truthy_values() {
        for value in ["true", "True", "1", "yes", "SI", "sí", " Sí ", "x", "X"] {
            assert!(is_truthy(value), "{value:?} should be truthy");
        }
        for value in ["", "false", "0", "no", "nan", "used"] {
            assert!(!is_truthy(value), "{value:?} should not be truthy");
        }
    }

    #[test]
    fn used_marker() {
        assert!(is_used_marker("True"));
        assert!(is_used_marker("USED"));
        assert!(!is_used_marker(""));
        assert!(!is_used_marker("False"));
    }
}
