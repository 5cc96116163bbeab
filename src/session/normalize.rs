// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Text normalization and input validation rules.
//!
//! The name normalizer is an ordered list of (pattern, replacement) rules
//! applied in sequence, each independently testable. Normalization is
//! idempotent: running it on already-clean output returns the same string.

use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Name normalization
// ---------------------------------------------------------------------------

/// Ordered (pattern, replacement) rules for cleaning a spoken name.
///
/// Order matters: greetings are stripped before self-introductions so that
/// "hola, soy Juan" loses both prefixes.
static NAME_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // Leading greeting fillers, possibly several in a row. Longer
        // alternatives first: regex alternation is ordered, and "buenas"
        // must not eat the front of "buenas tardes".
        (r"(?i)^\s*(?:(?:buenos días|buenas tardes|buenas noches|qué tal|buenas|hola)\b[\s,.!]*)+", ""),
        // Self-introduction phrases.
        (r"(?i)^\s*(?:soy|me llamo|mi nombre es|aquí|le habla|habla)\s+", ""),
        // Honorifics before the name itself.
        (r"(?i)^\s*(?:señor|señora|señorita|don|doña|sr\.?|sra\.?|srta\.?)\s+", ""),
        // Trailing punctuation.
        (r"[\s,.!?]+$", ""),
        // Interior whitespace runs.
        (r"\s{2,}", " "),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (Regex::new(pattern).expect("normalization rule must compile"), replacement)
    })
    .collect()
});

/// Normalize a spoken self-identification into a stored caller name.
pub fn normalize_name(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    for (pattern, replacement) in NAME_RULES.iter() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }
    text.trim().to_string()
}

/// Pick the token spoken back for confirmation: the first word that is not
/// purely numeric, falling back to the first word.
pub fn display_token(name: &str) -> Option<&str> {
    let mut words = name.split_whitespace().peekable();
    let first = *words.peek()?;
    words
        .find(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .or(Some(first))
}

// ---------------------------------------------------------------------------
// Vague-input rejection
// ---------------------------------------------------------------------------

/// Filler phrases that never qualify as a reason for calling.
const REASON_STOPLIST: &[&str] = &[
    "ok", "vale", "bueno", "bien", "pues", "a ver", "sí", "si", "no", "eh",
    "mmm", "ya", "claro", "hola", "buenas", "buenos días", "buenas tardes",
    "gracias",
];

/// Minimum word count for an acceptable reason.
const MIN_REASON_WORDS: usize = 4;

/// Whether an utterance is too vague to store as the reason for the call.
///
/// Rejects empty input, stoplisted filler phrases, and anything under four
/// words.
pub fn is_vague_reason(utterance: &str) -> bool {
    let trimmed = utterance.trim();
    if trimmed.is_empty() {
        return true;
    }

    let lowered = trimmed
        .trim_matches(|c: char| c.is_ascii_punctuation() || c == '¡' || c == '¿')
        .to_lowercase();
    if REASON_STOPLIST.contains(&lowered.as_str()) {
        return true;
    }

    trimmed.split_whitespace().count() < MIN_REASON_WORDS
}

// ---------------------------------------------------------------------------
// Goodbye detection
// ---------------------------------------------------------------------------

static GOODBYE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:adiós|adios|hasta luego|hasta pronto|chao|chau|nos vemos|que vaya bien)\b")
        .expect("goodbye pattern must compile")
});

/// Whether an utterance reads as the caller saying goodbye.
pub fn is_goodbye(utterance: &str) -> bool {
    GOODBYE_PATTERN.is_match(utterance)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_greeting_and_introduction() {
        assert_eq!(normalize_name("Hola, soy Juan Pérez"), "Juan Pérez");
        assert_eq!(normalize_name("buenas tardes, me llamo Ana García"), "Ana García");
        assert_eq!(normalize_name("mi nombre es Luis"), "Luis");
    }

    #[test]
    fn test_normalize_strips_honorifics() {
        assert_eq!(normalize_name("señora María López"), "María López");
        assert_eq!(normalize_name("Sr. Gómez"), "Gómez");
    }

    #[test]
    fn test_normalize_strips_trailing_punctuation() {
        assert_eq!(normalize_name("Juan Pérez."), "Juan Pérez");
        assert_eq!(normalize_name("Carmen!!"), "Carmen");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_name("Juan   Pérez"), "Juan Pérez");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for name in ["Juan Pérez", "Ana García", "María", "Gómez 42"] {
            let once = normalize_name(name);
            assert_eq!(normalize_name(&once), once, "normalizing {name:?} twice");
        }
        // And on raw input: normalize(normalize(x)) == normalize(x).
        let raw = "hola, soy el señor Juan Pérez.";
        let once = normalize_name(raw);
        assert_eq!(normalize_name(&once), once);
    }

    #[test]
    fn test_display_token_prefers_non_numeric() {
        assert_eq!(display_token("Juan Pérez"), Some("Juan"));
        assert_eq!(display_token("12345 Marta"), Some("Marta"));
    }

    #[test]
    fn test_display_token_numeric_only_falls_back() {
        assert_eq!(display_token("12345"), Some("12345"));
        assert_eq!(display_token(""), None);
    }

    #[test]
    fn test_vague_rejects_empty_and_fillers() {
        assert!(is_vague_reason(""));
        assert!(is_vague_reason("   "));
        assert!(is_vague_reason("pues"));
        assert!(is_vague_reason("a ver"));
        assert!(is_vague_reason("sí"));
        assert!(is_vague_reason("Vale."));
        assert!(is_vague_reason("hola"));
    }

    #[test]
    fn test_vague_rejects_short_inputs() {
        assert!(is_vague_reason("no me funciona"));
        assert!(is_vague_reason("el portal"));
    }

    #[test]
    fn test_vague_accepts_substantive_reason() {
        assert!(!is_vague_reason("tengo un problema con mi nómina de este mes"));
        assert!(!is_vague_reason("no puedo acceder a mi contraseña del portal"));
    }

    #[test]
    fn test_goodbye_detection() {
        assert!(is_goodbye("gracias, adiós"));
        assert!(is_goodbye("hasta luego"));
        assert!(is_goodbye("muy bien, chao"));
        assert!(!is_goodbye("necesito ayuda con el portal"));
        assert!(!is_goodbye("gracias"));
    }
}
