//! Deterministic query canonicalization
//!
//! Steps run in a fixed order: whitespace collapse, NFC, language-aware
//! lowercasing, punctuation stripping. Token order is never changed, so
//! "is the clinic open" and "open is the clinic" stay distinct.

use crate::cache::types::Language;
use unicode_normalization::UnicodeNormalization;

/// Stateless normalizer
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryNormalizer;

impl QueryNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize `raw` for `language`. May return an empty string when the
    /// input holds nothing but whitespace and punctuation.
    pub fn normalize(&self, raw: &str, language: Language) -> String {
        let collapsed = collapse_whitespace(raw);
        let composed: String = collapsed.nfc().collect();
        let lowered = lowercase(&composed, language);

        let stripped: String = lowered
            .chars()
            .map(|c| {
                if is_kept(c) {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        // stripping can leave runs like "hours ? please"
        collapse_whitespace(&stripped)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn lowercase(s: &str, language: Language) -> String {
    match language {
        Language::Tr => {
            let mut out = String::with_capacity(s.len());
            for c in s.chars() {
                match c {
                    'I' => out.push('ı'),
                    'İ' => out.push('i'),
                    other => out.extend(other.to_lowercase()),
                }
            }
            out
        }
        _ => s.to_lowercase(),
    }
}

fn is_kept(c: char) -> bool {
    c.is_alphanumeric()
        || c.is_whitespace()
        || is_combining_mark(c)
        || is_directional_or_joiner(c)
        || matches!(c, '%' | '+' | '$' | '€' | '£' | '₽' | '₺' | '#' | '@')
}

/// Diacritics that survive stripping
fn is_combining_mark(c: char) -> bool {
    matches!(c,
        '\u{0300}'..='\u{036F}'   // combining diacritical marks
        | '\u{0483}'..='\u{0489}' // cyrillic combining marks
        | '\u{064B}'..='\u{065F}' // arabic harakat
        | '\u{0670}'
        | '\u{1AB0}'..='\u{1AFF}'
        | '\u{1DC0}'..='\u{1DFF}'
        | '\u{20D0}'..='\u{20FF}'
        | '\u{FE20}'..='\u{FE2F}')
}

/// LRM, RLM, ALM, ZWNJ, ZWJ
fn is_directional_or_joiner(c: char) -> bool {
    matches!(c, '\u{200E}' | '\u{200F}' | '\u{061C}' | '\u{200C}' | '\u{200D}')
}
