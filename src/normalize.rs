//! Text normalization for fuzzy matching.
//!
//! French STT output is noisy about case, accents and punctuation, so every
//! string entering the matcher goes through [`normalize`] first.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Normalize text for comparison: lowercase, strip diacritics, drop
/// punctuation, collapse whitespace.
///
/// Idempotent; never errors. "Éléphant-Rose !" → "elephant rose".
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;

    for ch in input.to_lowercase().nfd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !ch.is_alphanumeric() {
            // Punctuation separates words rather than gluing them together:
            // "rendez-vous" must match "rendez vous".
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn lowercases_and_strips_accents() {
        assert_eq!(normalize("Éléphant"), "elephant");
        assert_eq!(normalize("NÉGOCIATION"), "negociation");
        assert_eq!(normalize("çà et là"), "ca et la");
    }

    #[test]
    fn drops_punctuation_as_separators() {
        assert_eq!(normalize("rendez-vous"), "rendez vous");
        assert_eq!(normalize("c'est bon !"), "c est bon");
        assert_eq!(normalize("Tech-Corp, S.A."), "tech corp s a");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize("  bonjour   tout  le monde  "), "bonjour tout le monde");
        assert_eq!(normalize("un\t\ndeux"), "un deux");
    }

    #[test]
    fn keeps_digits() {
        assert_eq!(normalize("50 000 €"), "50 000");
        assert_eq!(normalize("14h30"), "14h30");
    }

    #[test]
    fn empty_and_symbol_only_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("!?;,"), "");
    }

    #[test]
    fn is_idempotent() {
        let once = normalize("Crée une opportunité avec Élodie & Fils !");
        assert_eq!(normalize(&once), once);
    }
}
