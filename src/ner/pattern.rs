//! Pattern-based entity recognizer.
//!
//! Regex matching for structured PII (emails, phone numbers, SSNs, card
//! numbers, IPs, URLs, dates) plus a light heuristic for capitalized name
//! sequences. No models, no network; this is the default backend.

use std::sync::OnceLock;

use regex::Regex;

use super::{EntityRecognizer, RecognitionError, MAX_TEXT_SIZE};
use crate::models::DetectedEntity;

/// One compiled pattern with its label and score.
struct PiiPattern {
    label: &'static str,
    regex: Regex,
    score: f32,
}

/// Organization suffixes for the capitalized-sequence heuristic.
const ORG_SUFFIXES: &[&str] = &[
    "Inc", "Inc.", "LLC", "Ltd", "Ltd.", "Corp", "Corp.", "Corporation", "Company", "Co.",
    "Group", "Agency", "Department", "Bureau", "University",
];

/// Honorifics that mark the following capitalized sequence as a person.
const HONORIFICS: &[&str] = &["Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Sen.", "Rep.", "Gov."];

fn patterns() -> &'static Vec<PiiPattern> {
    static PATTERNS: OnceLock<Vec<PiiPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let build = |label, pattern: &str, score| PiiPattern {
            label,
            regex: Regex::new(pattern).expect("invalid built-in pattern"),
            score,
        };
        vec![
            build(
                "EMAIL",
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                0.95,
            ),
            build("URL", r"\bhttps?://[^\s<>\)\]]+", 0.90),
            build("SSN", r"\b\d{3}-\d{2}-\d{4}\b", 0.85),
            build(
                "CREDIT_CARD",
                r"\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{4}\b",
                0.80,
            ),
            build("IP_ADDRESS", r"\b(?:\d{1,3}\.){3}\d{1,3}\b", 0.80),
            build(
                "PHONE_NUMBER",
                r"\b(?:\+?1[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b",
                0.75,
            ),
            build(
                "DATE",
                r"\b(?:\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4}|(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4})\b",
                0.70,
            ),
        ]
    })
}

/// Luhn checksum for digit strings; card candidates that fail it are dropped.
fn luhn_valid(digits: &str) -> bool {
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

fn valid_ipv4(text: &str) -> bool {
    text.split('.')
        .all(|octet| octet.parse::<u16>().map(|n| n <= 255).unwrap_or(false))
}

/// Regex and heuristic PII recognizer.
pub struct PatternRecognizer;

impl PatternRecognizer {
    pub fn new() -> Self {
        Self
    }

    /// Match the regex pattern set against `text`.
    fn match_patterns(&self, text: &str) -> Vec<DetectedEntity> {
        let mut entities = Vec::new();
        for pattern in patterns() {
            for m in pattern.regex.find_iter(text) {
                let matched = m.as_str();
                match pattern.label {
                    "CREDIT_CARD" if !luhn_valid(matched) => continue,
                    "IP_ADDRESS" if !valid_ipv4(matched) => continue,
                    _ => {}
                }
                entities.push(
                    DetectedEntity::new(pattern.label, m.start(), m.end(), matched, pattern.score)
                        .with_recognizer("pattern"),
                );
            }
        }
        entities
    }

    /// Detect runs of capitalized words and classify them by surface cues.
    ///
    /// A run ending in an organization suffix becomes ORG; a run preceded by
    /// an honorific becomes PERSON with a higher score; otherwise 2-4 word
    /// runs are tagged PERSON at low confidence.
    fn match_name_sequences(&self, text: &str) -> Vec<DetectedEntity> {
        let mut entities = Vec::new();
        let mut run: Vec<(usize, &str)> = Vec::new();
        let mut prev_word: Option<&str> = None;

        let mut flush = |run: &mut Vec<(usize, &str)>, prev: Option<&str>| {
            if run.len() < 2 || run.len() > 4 {
                run.clear();
                return;
            }
            let start = run[0].0;
            let last = run[run.len() - 1];
            let end = last.0 + last.1.len();
            let covered = &text[start..end];

            if ORG_SUFFIXES.contains(&last.1) {
                entities.push(
                    DetectedEntity::new("ORG", start, end, covered, 0.65)
                        .with_recognizer("pattern"),
                );
            } else if prev.map(|w| HONORIFICS.contains(&w)).unwrap_or(false) {
                entities.push(
                    DetectedEntity::new("PERSON", start, end, covered, 0.75)
                        .with_recognizer("pattern"),
                );
            } else {
                entities.push(
                    DetectedEntity::new("PERSON", start, end, covered, 0.55)
                        .with_recognizer("pattern"),
                );
            }
            run.clear();
        };

        let mut word_before_run: Option<&str> = None;
        for (offset, word) in split_words(text) {
            let capitalized = word
                .chars()
                .next()
                .map(|c| c.is_uppercase())
                .unwrap_or(false)
                && word.chars().any(|c| c.is_alphabetic());

            if capitalized && !HONORIFICS.contains(&word) {
                if run.is_empty() {
                    word_before_run = prev_word;
                }
                run.push((offset, word));
            } else {
                flush(&mut run, word_before_run);
            }
            prev_word = Some(word);
        }
        flush(&mut run, word_before_run);

        entities
    }
}

/// Split text into words with byte offsets, stripping trailing punctuation.
fn split_words(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    for (offset, raw) in text.split_whitespace().map(|w| {
        let offset = w.as_ptr() as usize - text.as_ptr() as usize;
        (offset, w)
    }) {
        let trimmed = raw.trim_end_matches(|c: char| c == ',' || c == ';' || c == ':');
        if !trimmed.is_empty() {
            words.push((offset, trimmed));
        }
    }
    words
}

impl Default for PatternRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRecognizer for PatternRecognizer {
    fn name(&self) -> &str {
        "pattern"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        "pattern recognizer is built in".to_string()
    }

    fn recognize(&self, text: &str) -> Result<Vec<DetectedEntity>, RecognitionError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        // Truncate oversized input at a char boundary.
        let text = if text.len() > MAX_TEXT_SIZE {
            let mut cut = MAX_TEXT_SIZE;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            &text[..cut]
        } else {
            text
        };

        let mut entities = self.match_patterns(text);
        entities.extend(self.match_name_sequences(text));
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    fn recognize(text: &str) -> Vec<DetectedEntity> {
        PatternRecognizer::new().recognize(text).unwrap()
    }

    fn labels(entities: &[DetectedEntity]) -> Vec<&str> {
        entities.iter().map(|e| e.label.label()).collect()
    }

    #[test]
    fn test_email_detection() {
        let out = recognize("contact tim@apple.com for details");
        assert!(labels(&out).contains(&"EMAIL"));
        let email = out.iter().find(|e| e.label == EntityType::Email).unwrap();
        assert_eq!(email.text, "tim@apple.com");
        assert_eq!(&"contact tim@apple.com for details"[email.start..email.end], "tim@apple.com");
    }

    #[test]
    fn test_ssn_and_phone() {
        let out = recognize("SSN 123-45-6789, phone (555) 867-5309");
        assert!(labels(&out).contains(&"SSN"));
        assert!(labels(&out).contains(&"PHONE_NUMBER"));
    }

    #[test]
    fn test_credit_card_luhn_filter() {
        // 4111111111111111 passes Luhn; 4111111111111112 does not.
        let out = recognize("card 4111 1111 1111 1111");
        assert!(labels(&out).contains(&"CREDIT_CARD"));
        let out = recognize("card 4111 1111 1111 1112");
        assert!(!labels(&out).contains(&"CREDIT_CARD"));
    }

    #[test]
    fn test_ip_octet_validation() {
        let out = recognize("host 192.168.1.1 up");
        assert!(labels(&out).contains(&"IP_ADDRESS"));
        let out = recognize("version 999.999.999.999 string");
        assert!(!labels(&out).contains(&"IP_ADDRESS"));
    }

    #[test]
    fn test_name_sequence_person() {
        let out = recognize("met with Tim Cook yesterday");
        let person = out.iter().find(|e| e.label == EntityType::Person).unwrap();
        assert_eq!(person.text, "Tim Cook");
    }

    #[test]
    fn test_org_suffix() {
        let out = recognize("filed by Acme Widgets Inc. last year");
        assert!(out
            .iter()
            .any(|e| e.label == EntityType::Org && e.text.starts_with("Acme")));
    }

    #[test]
    fn test_empty_input() {
        assert!(recognize("").is_empty());
    }

    #[test]
    fn test_spans_within_bounds() {
        let text = "email a@b.co and Jane Doe at 10.0.0.1";
        for e in recognize(text) {
            assert!(e.start <= e.end && e.end <= text.len());
            assert_eq!(&text[e.start..e.end], e.text);
        }
    }
}
