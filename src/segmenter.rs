//! Sentence splitting and randomized grouping into classification cases.
//!
//! Text is split on Unicode sentence boundaries (UAX #29). Boundaries that
//! follow a common abbreviation ("Mr.", "Inc.", "U.S.") or a single-letter
//! initial are rejoined, since those rarely end a sentence in news copy.
//!
//! Sentences are then consumed left to right in groups of one to three, the
//! size of each group drawn uniformly at random. Groups never overlap and
//! every sentence lands in exactly one group.

use std::ops::Range;

use rand::Rng;
use unicode_segmentation::UnicodeSegmentation;

use crate::models::SentenceGroup;

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "mt", "gen", "gov", "sen", "rep", "rev",
    "lt", "col", "sgt", "capt", "inc", "corp", "ltd", "co", "llc", "plc", "bros", "vs", "etc",
    "e.g", "i.e", "u.s", "u.k", "u.n", "e.u", "fig", "approx", "est", "dept", "jan", "feb",
    "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec",
];

const GROUP_SIZES: Range<usize> = 1..4;

/// Split `text` into trimmed, non-empty sentences in source order.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences: Vec<String> = Vec::new();
    let mut carry = String::new();

    for piece in text.split_sentence_bounds() {
        carry.push_str(piece);
        if ends_with_abbreviation(carry.trim_end()) {
            continue;
        }
        let sentence = carry.trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        carry.clear();
    }

    let rest = carry.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

fn ends_with_abbreviation(s: &str) -> bool {
    let Some(stem) = s.strip_suffix('.') else {
        return false;
    };
    let last = stem
        .rsplit(|c: char| c.is_whitespace() || c == '(' || c == '"')
        .next()
        .unwrap_or_default();
    if last.chars().count() == 1 && last.chars().all(|c| c.is_alphabetic()) {
        return true;
    }
    let last = last.to_lowercase();
    ABBREVIATIONS.contains(&last.as_str())
}

/// Lazy, single-pass grouping of sentences into [`SentenceGroup`]s.
///
/// Each call to `next` draws a group size from `{1, 2, 3}`, so two passes over
/// the same text generally group it differently.
#[derive(Debug)]
pub struct SentenceGroups<'r, R> {
    sentences: Vec<String>,
    cursor: usize,
    rng: &'r mut R,
}

impl<R: Rng> Iterator for SentenceGroups<'_, R> {
    type Item = SentenceGroup;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.sentences.len() {
            let size = self.rng.random_range(GROUP_SIZES);
            let start = self.cursor;
            let end = (start + size).min(self.sentences.len());
            self.cursor = end;

            let text = self.sentences[start..end].join(" ");
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            return Some(SentenceGroup {
                text: text.to_string(),
                sentences: start..end,
            });
        }
        None
    }
}

impl<R> SentenceGroups<'_, R> {
    /// Number of sentences the text was split into.
    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }
}

/// Split `text` into sentences and group them using `rng` for group sizes.
pub fn segment<'r, R: Rng>(text: &str, rng: &'r mut R) -> SentenceGroups<'r, R> {
    SentenceGroups {
        sentences: split_sentences(text),
        cursor: 0,
        rng,
    }
}
