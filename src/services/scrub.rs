// src/services/scrub.rs

//! Best-effort PII redaction.
//!
//! Patterns are applied in a fixed order (email, phone, URL, handle) so an
//! earlier class claims text before a later one can fire on its remnants.
//! This reduces identifying content but does not guarantee de-identification:
//! names, street addresses and oddly formatted contact details pass through.

use std::ops::{Range, RangeInclusive};

use regex::Regex;

use crate::error::Result;

pub const EMAIL_TOKEN: &str = "[redacted-email]";
pub const PHONE_TOKEN: &str = "[redacted-phone]";
pub const URL_TOKEN: &str = "[redacted-url]";
pub const HANDLE_TOKEN: &str = "[redacted-handle]";

const TOKENS: [&str; 4] = [EMAIL_TOKEN, PHONE_TOKEN, URL_TOKEN, HANDLE_TOKEN];

/// Digit count of a run treated as a phone number.
const PHONE_DIGITS: RangeInclusive<usize> = 6..=15;

/// Separators tried, coarsest first, when a digit run is too long to be one number.
const SPLIT_ORDER: [fn(char) -> bool; 2] = [char::is_whitespace, is_hyphen];

fn is_hyphen(c: char) -> bool {
    c == '-'
}

fn digit_count(text: &str) -> usize {
    text.bytes().filter(u8::is_ascii_digit).count()
}

/// Compiled redaction patterns.
#[derive(Debug, Clone)]
pub struct PrivacyScrubber {
    email: Regex,
    phone: Regex,
    url: Regex,
    handle: Regex,
}

impl PrivacyScrubber {
    pub fn new() -> Result<Self> {
        Ok(Self {
            email: Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b")?,
            // Digit runs joined by at most one space or hyphen; length is checked after matching.
            phone: Regex::new(r"\+?[0-9](?:[\s-]?[0-9])*")?,
            url: Regex::new(r"(?i)https?://\S+|www\.\S+")?,
            handle: Regex::new(r"@[A-Za-z0-9_]{2,}")?,
        })
    }

    /// Redact every supported PII class. Empty input gives an empty string.
    pub fn scrub(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let text = self.email.replace_all(text, EMAIL_TOKEN);
        let text = self.redact_phones(&text);
        let text = self.url.replace_all(&text, URL_TOKEN);
        self.redact_handles(&text)
    }

    /// Replace `@name` unless it directly follows a word character or a token.
    fn redact_handles(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for m in self.handle.find_iter(text) {
            let before = &text[..m.start()];
            let after_word = before
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
            let after_token = TOKENS.iter().any(|token| before.ends_with(token));

            if !after_word && !after_token {
                out.push_str(&text[last..m.start()]);
                out.push_str(HANDLE_TOKEN);
                last = m.end();
            }
        }

        out.push_str(&text[last..]);
        out
    }

    fn redact_phones(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for m in self.phone.find_iter(text) {
            let after_digit = text[..m.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_digit());
            if after_digit {
                continue;
            }

            for span in phone_spans(m.as_str(), 0) {
                out.push_str(&text[last..m.start() + span.start]);
                out.push_str(PHONE_TOKEN);
                last = m.start() + span.end;
            }
        }

        out.push_str(&text[last..]);
        out
    }
}

/// Byte ranges of `run` that are phone numbers.
///
/// A run holding more digits than one number is cut at the separators of
/// `SPLIT_ORDER[level]` and the pieces are regrouped greedily, left to right,
/// into chunks of at most 15 digits. A piece that alone is too long is split
/// again at the next separator kind; an unbroken digit string is left alone.
fn phone_spans(run: &str, level: usize) -> Vec<Range<usize>> {
    let digits = digit_count(run);
    if PHONE_DIGITS.contains(&digits) {
        return vec![0..run.len()];
    }
    if digits < *PHONE_DIGITS.start() {
        return Vec::new();
    }
    let Some(separator) = SPLIT_ORDER.get(level) else {
        return Vec::new();
    };

    let mut spans = Vec::new();
    let mut chunk: Option<Range<usize>> = None;

    for piece in split_pieces(run, *separator) {
        if digit_count(&run[piece.clone()]) > *PHONE_DIGITS.end() {
            push_phone(&mut spans, run, chunk.take());
            let offset = piece.start;
            spans.extend(
                phone_spans(&run[piece], level + 1)
                    .into_iter()
                    .map(|r| r.start + offset..r.end + offset),
            );
            continue;
        }

        chunk = match chunk.take() {
            Some(open) if digit_count(&run[open.start..piece.end]) <= *PHONE_DIGITS.end() => {
                Some(open.start..piece.end)
            }
            open => {
                push_phone(&mut spans, run, open);
                Some(piece)
            }
        };
    }
    push_phone(&mut spans, run, chunk);
    spans
}

fn push_phone(spans: &mut Vec<Range<usize>>, run: &str, chunk: Option<Range<usize>>) {
    if let Some(chunk) = chunk {
        if PHONE_DIGITS.contains(&digit_count(&run[chunk.clone()])) {
            spans.push(chunk);
        }
    }
}

/// Ranges of `run` between single separator characters.
fn split_pieces(run: &str, separator: fn(char) -> bool) -> Vec<Range<usize>> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, c) in run.char_indices() {
        if separator(c) {
            pieces.push(start..i);
            start = i + c.len_utf8();
        }
    }
    pieces.push(start..run.len());
    pieces
}
