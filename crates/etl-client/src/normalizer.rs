//! Unicode text to valid NGSI entity id
//!
//! Accented characters lose their accents, other non-ASCII characters and
//! control codes are dropped, and characters the broker forbids in ids are
//! replaced. Whitespace runs collapse into a single replacement.
//!
//! ```
//! use etl_client::Normalizer;
//!
//! let norm = Normalizer::builder().override_char(' ', Some("+")).build()?;
//! assert_eq!(norm.normalize("Calle Alcalá (norte)"), "Calle+Alcala+-norte-");
//! # Ok::<(), etl_client::EtlError>(())
//! ```
//!
//! Ids are not truncated to the broker's 256 character limit.

use crate::error::{EtlError, Result};
use regex::{NoExpand, Regex};
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Characters not allowed in entity ids
pub const FORBIDDEN_CHARS: [char; 12] = ['&', '?', '/', '#', '<', '>', '"', '\'', '=', ';', '(', ')'];

pub const DEFAULT_REPLACEMENT: &str = "-";

#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Forbidden character to its replacement, `None` to remove it
    table: HashMap<char, Option<char>>,
    space_replacement: String,
    whitespace: Regex,
}

impl Normalizer {
    /// Normalizer replacing every forbidden character and whitespace run with `-`.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> NormalizerBuilder {
        NormalizerBuilder::default()
    }

    pub fn normalize(&self, text: &str) -> String {
        let translated: String = text
            .nfd()
            .filter(|c| c.is_ascii() && !c.is_ascii_control())
            .filter_map(|c| match self.table.get(&c) {
                Some(replacement) => *replacement,
                None => Some(c),
            })
            .collect();

        self.whitespace
            .replace_all(translated.trim(), NoExpand(&self.space_replacement))
            .into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct NormalizerBuilder {
    replacement: String,
    overrides: HashMap<char, Option<String>>,
}

impl Default for NormalizerBuilder {
    fn default() -> Self {
        Self {
            replacement: DEFAULT_REPLACEMENT.to_string(),
            overrides: HashMap::new(),
        }
    }
}

impl NormalizerBuilder {
    /// Replacement for every forbidden character and for whitespace.
    /// An empty replacement removes them.
    pub fn replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = replacement.into();
        self
    }

    /// Per-character replacement. `None` or `""` removes the character.
    ///
    /// For `' '` any string is accepted; forbidden characters take a single
    /// character. Overrides for other characters are ignored.
    pub fn override_char(mut self, c: char, replacement: Option<&str>) -> Self {
        self.overrides.insert(c, replacement.map(str::to_string));
        self
    }

    pub fn build(self) -> Result<Normalizer> {
        let mut table = HashMap::with_capacity(FORBIDDEN_CHARS.len());

        for c in FORBIDDEN_CHARS {
            let custom = match self.overrides.get(&c) {
                Some(custom) => custom.as_deref().unwrap_or_default(),
                None => self.replacement.as_str(),
            };

            let mut chars = custom.chars();
            let replacement = match (chars.next(), chars.next()) {
                (None, _) => None,
                (Some(single), None) => Some(single),
                (Some(_), Some(_)) => {
                    return Err(EtlError::validation(format!(
                        "wrong override '{}' for char '{}': must be a single character",
                        custom, c
                    )))
                }
            };
            table.insert(c, replacement);
        }

        let space_replacement = match self.overrides.get(&' ') {
            Some(custom) => custom.clone().unwrap_or_default(),
            None => self.replacement,
        };

        let whitespace = Regex::new(r"\s+")
            .map_err(|e| EtlError::validation(format!("Invalid whitespace pattern: {}", e)))?;

        Ok(Normalizer {
            table,
            space_replacement,
            whitespace,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const INPUT: &str = "text (with & specials) > \u{e1}\u{e9}\u{ed}\u{f3}\u{fa}\u{f1}";

    #[test]
    fn test_default_replacement() {
        let norm = Normalizer::new().unwrap();
        assert_eq!(norm.normalize(INPUT), "text--with---specials----aeioun");
    }

    #[test]
    fn test_custom_replacement() {
        let norm = Normalizer::builder().replacement("_").build().unwrap();
        assert_eq!(norm.normalize(INPUT), "text__with___specials____aeioun");
    }

    #[test]
    fn test_space_override() {
        let norm = Normalizer::builder().override_char(' ', Some("+")).build().unwrap();
        assert_eq!(norm.normalize(INPUT), "text+-with+-+specials-+-+aeioun");
    }

    #[test]
    fn test_forbidden_char_override() {
        let norm = Normalizer::builder().override_char('>', Some("+")).build().unwrap();
        assert_eq!(norm.normalize(INPUT), "text--with---specials--+-aeioun");
    }

    #[test]
    fn test_remove_parenthesis() {
        let norm = Normalizer::builder()
            .override_char('(', None)
            .override_char(')', None)
            .build()
            .unwrap();
        assert_eq!(norm.normalize(INPUT), "text-with---specials---aeioun");
    }

    #[test]
    fn test_remove_spaces() {
        let norm = Normalizer::builder().override_char(' ', None).build().unwrap();
        assert_eq!(norm.normalize(INPUT), "text-with-specials--aeioun");
    }

    #[test]
    fn test_remove_specials_keep_spaces() {
        let norm = Normalizer::builder()
            .replacement("")
            .override_char(' ', Some("-"))
            .build()
            .unwrap();
        assert_eq!(norm.normalize(INPUT), "text-with-specials-aeioun");
    }

    #[test]
    fn test_remove_everything() {
        let norm = Normalizer::builder().replacement("").build().unwrap();
        assert_eq!(norm.normalize(INPUT), "textwithspecialsaeioun");
    }

    #[test]
    fn test_multi_char_override_is_rejected() {
        let err = Normalizer::builder()
            .override_char('&', Some("and"))
            .build()
            .unwrap_err();
        assert!(matches!(err, EtlError::Validation(_)));

        let err = Normalizer::builder().replacement("--").build().unwrap_err();
        assert!(err.to_string().contains("must be a single character"));
    }

    #[test]
    fn test_multi_char_space_replacement_is_allowed() {
        let norm = Normalizer::builder().override_char(' ', Some("_$1_")).build().unwrap();
        assert_eq!(norm.normalize("a b"), "a_$1_b");
    }

    #[test]
    fn test_control_chars_and_surrounding_space() {
        let norm = Normalizer::new().unwrap();
        assert_eq!(norm.normalize("  caf\u{e9}\t\u{7f}\u{1F600} bar \n"), "cafe-bar");
    }

    proptest! {
        #[test]
        fn prop_output_is_valid_id(text in "\\PC{0,40}") {
            let norm = Normalizer::new().unwrap();
            let id = norm.normalize(&text);
            prop_assert!(id.is_ascii());
            prop_assert!(!id.chars().any(|c| c.is_ascii_control() || c.is_whitespace()));
            prop_assert!(!id.chars().any(|c| FORBIDDEN_CHARS.contains(&c)));
            prop_assert_eq!(norm.normalize(&id), id.clone());
        }
    }
}
