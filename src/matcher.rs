use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dictionary::DictionaryEntry;
use crate::phonetic::PhoneticEngine;
use crate::settings::DEFAULT_SIMILARITY_THRESHOLD;
use crate::text::{normalize, similarity};

/// How a window matched a dictionary literal, strongest tier first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Normalized window equals the normalized literal.
    Exact,
    /// Phonetic keys are identical (homophone).
    Phonetic,
    /// Phonetic keys within the similarity threshold (near-homophone or
    /// recognizer misspelling).
    Fuzzy,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Phonetic => "phonetic",
            Self::Fuzzy => "fuzzy",
        }
    }
}

/// A hit against the dictionary. `word` is the literal as stored (keyword or
/// variant, un-normalized); `index` is the absolute char offset of the
/// window start in the cumulative normalized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub word: String,
    pub index: usize,
    pub match_type: MatchType,
}

/// Scan behavior knobs. All tiers enabled by default.
#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    pub exact_match: bool,
    pub phonetic_match: bool,
    pub similarity_threshold: f64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            exact_match: true,
            phonetic_match: true,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Window lengths tried for a literal of `target_len` chars: the exact
/// length plus one shorter and one longer, in that order. The one-char fuzz
/// absorbs single insertions/deletions from the recognizer and must stay
/// exactly this set.
fn window_lengths(target_len: usize) -> impl Iterator<Item = usize> {
    let len = target_len as isize;
    [len, len - 1, len + 1]
        .into_iter()
        .filter(|l| *l >= 1)
        .map(|l| l as usize)
}

fn note_candidate(best: &mut Option<MatchResult>, word: &str, index: usize, match_type: MatchType) {
    let replace = best.as_ref().map_or(true, |b| index >= b.index);
    if replace {
        *best = Some(MatchResult {
            word: word.to_string(),
            index,
            match_type,
        });
    }
}

/// Scans the unscanned suffix of the cumulative normalized text for the
/// best dictionary hit.
///
/// Only `clean_text[pointer..]` (char-indexed) is examined; text below the
/// pointer has already been audited and is never rescanned. Candidates
/// replace the running best on a non-strict offset comparison, so the most
/// recently appearing occurrence wins and, at equal offsets, the literal
/// iterated last does. Returns `None` when the segment is empty or nothing
/// reaches any tier.
///
/// A pointer at or beyond the end of the text yields `None`; resetting the
/// pointer when the stream is replaced is the caller's job.
pub fn scan(
    clean_text: &str,
    pointer: usize,
    entries: &[DictionaryEntry],
    phonetics: &PhoneticEngine,
    options: &MatchOptions,
) -> Option<MatchResult> {
    let chars: Vec<char> = clean_text.chars().collect();
    if pointer >= chars.len() {
        return None;
    }
    let segment = &chars[pointer..];
    let mut best: Option<MatchResult> = None;

    for entry in entries {
        for literal in entry.literals() {
            let clean_literal = normalize(literal);
            let target_len = clean_literal.chars().count();
            if target_len < 1 {
                continue;
            }

            let target_key = if options.phonetic_match {
                Some(phonetics.phonetic_key(&clean_literal))
            } else {
                None
            };

            for win_len in window_lengths(target_len) {
                if win_len > segment.len() {
                    continue;
                }
                for i in 0..=(segment.len() - win_len) {
                    let start = pointer + i;
                    let window: String = segment[i..i + win_len].iter().collect();
                    let clean_window = normalize(&window);
                    if clean_window.is_empty() {
                        continue;
                    }

                    if options.exact_match && clean_window == clean_literal {
                        note_candidate(&mut best, literal, start, MatchType::Exact);
                        continue;
                    }

                    let Some(target_key) = target_key.as_deref() else {
                        continue;
                    };
                    let window_key = phonetics.phonetic_key(&clean_window);

                    if window_key == target_key {
                        note_candidate(&mut best, literal, start, MatchType::Phonetic);
                        continue;
                    }

                    if similarity(&window_key, target_key) >= options.similarity_threshold {
                        note_candidate(&mut best, literal, start, MatchType::Fuzzy);
                    }
                }
            }
        }
    }

    if let Some(ref hit) = best {
        debug!(
            word = %hit.word,
            index = hit.index,
            match_type = hit.match_type.as_str(),
            "dictionary hit in unscanned suffix"
        );
    }
    best
}
