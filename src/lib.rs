//! Aggregate analysis of movie-script dialogue lines.
//!
//! Input records are raw lines of the form `CHARACTER: dialogue text`. One
//! pass over the corpus produces four independent reports:
//! - per-character word frequencies ([`FrequencyTable`])
//! - per-character total dialogue length ([`LengthTable`])
//! - per-character distinct vocabulary ([`VocabularyTable`])
//! - corpus-wide counters ([`CorpusCounters`])
//!
//! The [`parallel`] module drives the pass: records fan out to workers, each
//! worker folds its records into a private [`Aggregates`], and the partials
//! fan in through [`Aggregates::merge`]. Every merge is commutative and
//! associative (sums, counts, set unions), so the final snapshot does not
//! depend on record order or worker count.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub mod parallel;

lazy_static! {
    // Tokens keep ASCII letters only, matching the corpus convention.
    static ref NON_LETTER: Regex = Regex::new("[^a-zA-Z]+").unwrap();
}

/// Fatal pipeline failure. Malformed records are not errors - they are
/// skipped silently and contribute to no aggregate.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("worker thread panicked before finishing its records")]
    WorkerPanicked,
}

/// One successfully parsed dialogue line. Produced and consumed within a
/// single processing step, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFact {
    /// Speaker name, trimmed and upper-cased.
    pub character: String,
    /// Everything after the first `:`, trimmed.
    pub dialogue: String,
    /// Normalized word tokens in original left-to-right order.
    pub tokens: Vec<String>,
}

impl ParsedFact {
    /// Parse and tokenize one raw record. Returns `None` for records that
    /// should be skipped entirely.
    pub fn from_raw(raw: &str) -> Option<ParsedFact> {
        let (character, dialogue) = parse_line(raw)?;
        let tokens = tokenize(&dialogue);
        Some(ParsedFact {
            character,
            dialogue,
            tokens,
        })
    }
}

/// Split one raw line into `(character, dialogue)`.
///
/// Rejects lines that are empty after trimming or contain no `:`. Only the
/// first `:` is a delimiter; later colons stay in the dialogue. The speaker
/// name is upper-cased so `john:` and `JOHN:` accumulate into the same key.
pub fn parse_line(raw: &str) -> Option<(String, String)> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }
    let (speaker, dialogue) = line.split_once(':')?;
    Some((speaker.trim().to_uppercase(), dialogue.trim().to_string()))
}

/// Split dialogue into normalized word tokens.
///
/// Splits on whitespace runs, strips every non-ASCII-letter character from
/// each fragment, then lower-cases. Fragments that become empty after
/// stripping (e.g. `"123"`) are dropped and never counted as words.
pub fn tokenize(dialogue: &str) -> Vec<String> {
    dialogue
        .split_whitespace()
        .filter_map(|fragment| {
            let token = NON_LETTER.replace_all(fragment, "").to_lowercase();
            if token.is_empty() {
                None
            } else {
                Some(token)
            }
        })
        .collect()
}

/// Per-character word frequency counts: character -> token -> count.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FrequencyTable {
    counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl FrequencyTable {
    pub fn record(&mut self, character: &str, token: &str) {
        *self
            .counts
            .entry(character.to_string())
            .or_default()
            .entry(token.to_string())
            .or_default() += 1;
    }

    /// Fold another partial table into this one by summing counts.
    pub fn merge(&mut self, other: FrequencyTable) {
        for (character, words) in other.counts {
            let entry = self.counts.entry(character).or_default();
            for (word, n) in words {
                *entry.entry(word).or_default() += n;
            }
        }
    }

    pub fn count(&self, character: &str, token: &str) -> usize {
        self.counts
            .get(character)
            .and_then(|words| words.get(token))
            .copied()
            .unwrap_or(0)
    }

    /// Total token count across all words for one character.
    pub fn total_for(&self, character: &str) -> usize {
        self.counts
            .get(character)
            .map(|words| words.values().sum())
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, usize>)> {
        self.counts.iter().map(|(c, words)| (c.as_str(), words))
    }
}

/// Per-character total dialogue length: character -> summed length of the
/// trimmed (untokenized) dialogue strings, so punctuation and spacing count.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LengthTable {
    totals: BTreeMap<String, usize>,
}

impl LengthTable {
    pub fn record(&mut self, character: &str, dialogue: &str) {
        *self.totals.entry(character.to_string()).or_default() += dialogue.len();
    }

    pub fn merge(&mut self, other: LengthTable) {
        for (character, total) in other.totals {
            *self.totals.entry(character).or_default() += total;
        }
    }

    pub fn total(&self, character: &str) -> usize {
        self.totals.get(character).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.totals.iter().map(|(c, &n)| (c.as_str(), n))
    }
}

/// Per-character distinct vocabulary, plus the run-global distinct-word set
/// that feeds `CorpusCounters::unique_words_identified`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct VocabularyTable {
    by_character: BTreeMap<String, BTreeSet<String>>,
    global: BTreeSet<String>,
}

impl VocabularyTable {
    /// Insert a token into the character's set and the global set.
    /// Re-insertion is a no-op.
    pub fn record(&mut self, character: &str, token: &str) {
        self.by_character
            .entry(character.to_string())
            .or_default()
            .insert(token.to_string());
        self.global.insert(token.to_string());
    }

    pub fn merge(&mut self, other: VocabularyTable) {
        for (character, words) in other.by_character {
            self.by_character.entry(character).or_default().extend(words);
        }
        self.global.extend(other.global);
    }

    pub fn distinct_count(&self, character: &str) -> usize {
        self.by_character.get(character).map_or(0, BTreeSet::len)
    }

    pub fn words_spoken_by(&self, character: &str) -> Option<&BTreeSet<String>> {
        self.by_character.get(character)
    }

    /// Size of the running global distinct-word set. During a sequential
    /// fold this is a cumulative trend signal; after the last record it is
    /// the final `unique_words_identified` value.
    pub fn unique_words_so_far(&self) -> usize {
        self.global.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.by_character.iter().map(|(c, words)| (c.as_str(), words))
    }
}

/// Corpus-wide counters, one `record` call per accepted line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CorpusCounters {
    pub lines_processed: usize,
    pub words_processed: usize,
    pub characters_processed: usize,
    /// Final global distinct-word count. Zero until [`Aggregates::finalize`]
    /// copies it from the vocabulary's global set - summing per-worker
    /// partials would double-count words seen by more than one worker.
    pub unique_words_identified: usize,
    /// One speaking attribution per accepted line, so this always equals
    /// `lines_processed`.
    pub characters_speaking: usize,
}

impl CorpusCounters {
    pub fn record(&mut self, fact: &ParsedFact) {
        self.lines_processed += 1;
        self.characters_speaking += 1;
        self.characters_processed += fact.dialogue.len();
        self.words_processed += fact.tokens.len();
    }

    pub fn merge(&mut self, other: CorpusCounters) {
        self.lines_processed += other.lines_processed;
        self.words_processed += other.words_processed;
        self.characters_processed += other.characters_processed;
        self.characters_speaking += other.characters_speaking;
    }
}

/// The four co-resident aggregates for one pipeline run.
///
/// Each worker folds records into a private `Aggregates`; partials combine
/// through [`merge`](Aggregates::merge) and [`finalize`](Aggregates::finalize)
/// produces the immutable snapshot handed to the caller.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Aggregates {
    pub frequency: FrequencyTable,
    pub length: LengthTable,
    pub vocabulary: VocabularyTable,
    pub counters: CorpusCounters,
}

impl Aggregates {
    /// Fan one fact out to all four aggregates. The four updates are
    /// independent of each other; nothing here depends on their order.
    pub fn observe(&mut self, fact: &ParsedFact) {
        for token in &fact.tokens {
            self.frequency.record(&fact.character, token);
            self.vocabulary.record(&fact.character, token);
        }
        self.length.record(&fact.character, &fact.dialogue);
        self.counters.record(fact);
    }

    /// Parse and fold one raw record. Returns whether the record was
    /// accepted; rejected records touch no aggregate and no counter.
    pub fn observe_raw(&mut self, raw: &str) -> bool {
        match ParsedFact::from_raw(raw) {
            Some(fact) => {
                self.observe(&fact);
                true
            }
            None => false,
        }
    }

    /// Fold another partial aggregate into this one. Commutative and
    /// associative, so fan-in order across workers is irrelevant.
    pub fn merge(&mut self, other: Aggregates) {
        self.frequency.merge(other.frequency);
        self.length.merge(other.length);
        self.vocabulary.merge(other.vocabulary);
        self.counters.merge(other.counters);
    }

    /// Seal the run: fill `unique_words_identified` from the global
    /// distinct-word set and hand the snapshot back by value.
    pub fn finalize(mut self) -> Aggregates {
        self.counters.unique_words_identified = self.vocabulary.unique_words_so_far();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod line_parser_tests {
    use super::*;

    #[test]
    fn rejects_empty_line() {
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn rejects_whitespace_only_line() {
        assert_eq!(parse_line("   \t  "), None);
    }

    #[test]
    fn rejects_line_without_colon() {
        assert_eq!(parse_line("just some text"), None);
    }

    #[test]
    fn splits_character_and_dialogue() {
        let (character, dialogue) = parse_line("JOHN: Hello there").unwrap();
        assert_eq!(character, "JOHN");
        assert_eq!(dialogue, "Hello there");
    }

    #[test]
    fn only_first_colon_delimits() {
        let (character, dialogue) = parse_line("JOHN: He said: hi").unwrap();
        assert_eq!(character, "JOHN");
        assert_eq!(dialogue, "He said: hi");
    }

    #[test]
    fn upper_cases_character_name() {
        let (character, _) = parse_line("john: hello").unwrap();
        assert_eq!(character, "JOHN");
    }

    #[test]
    fn trims_both_parts() {
        let (character, dialogue) = parse_line("  mary  :   over here  ").unwrap();
        assert_eq!(character, "MARY");
        assert_eq!(dialogue, "over here");
    }
}


#[cfg(test)]
mod aggregator_tests {
    use super::*;

    fn fact(raw: &str) -> ParsedFact {
        ParsedFact::from_raw(raw).unwrap()
    }

    #[test]
    fn frequency_counts_per_character_and_token() {
        let mut table = FrequencyTable::default();
        table.record("JOHN", "hello");
        table.record("JOHN", "hello");
        table.record("JOHN", "world");
        table.record("MARY", "hello");
        assert_eq!(table.count("JOHN", "hello"), 2);
        assert_eq!(table.count("JOHN", "world"), 1);
        assert_eq!(table.count("MARY", "hello"), 1);
        assert_eq!(table.count("MARY", "world"), 0);
        assert_eq!(table.total_for("JOHN"), 3);
    }

    #[test]
    fn frequency_merge_sums_counts() {
        let mut a = FrequencyTable::default();
        a.record("JOHN", "hello");
        let mut b = FrequencyTable::default();
        b.record("JOHN", "hello");
        b.record("MARY", "hi");
        a.merge(b);
        assert_eq!(a.count("JOHN", "hello"), 2);
        assert_eq!(a.count("MARY", "hi"), 1);
    }

    #[test]
    fn length_measures_untokenized_dialogue() {
        let mut table = LengthTable::default();
        // punctuation and digits count toward length even though the
        // tokenizer strips them
        table.record("JOHN", "Hello, World! 123");
        assert_eq!(table.total("JOHN"), 17);
        table.record("JOHN", "hi");
        assert_eq!(table.total("JOHN"), 19);
    }

    #[test]
    fn vocabulary_reinsertion_is_noop() {
        let mut table = VocabularyTable::default();
        table.record("JOHN", "hello");
        table.record("JOHN", "hello");
        assert_eq!(table.distinct_count("JOHN"), 1);
        assert_eq!(table.unique_words_so_far(), 1);
    }

    #[test]
    fn vocabulary_global_set_spans_characters() {
        let mut table = VocabularyTable::default();
        table.record("JOHN", "hello");
        table.record("MARY", "hello");
        table.record("MARY", "goodbye");
        assert_eq!(table.distinct_count("JOHN"), 1);
        assert_eq!(table.distinct_count("MARY"), 2);
        // "hello" is one global word even though two characters spoke it
        assert_eq!(table.unique_words_so_far(), 2);
    }

    #[test]
    fn counters_track_one_attribution_per_line() {
        let mut counters = CorpusCounters::default();
        counters.record(&fact("JOHN: Hello, World! 123"));
        counters.record(&fact("JOHN: more words here"));
        assert_eq!(counters.lines_processed, 2);
        assert_eq!(counters.characters_speaking, 2);
        assert_eq!(counters.words_processed, 5);
        assert_eq!(counters.characters_processed, 17 + 15);
    }

    #[test]
    fn rejected_records_touch_nothing() {
        let mut aggregates = Aggregates::default();
        assert!(!aggregates.observe_raw(""));
        assert!(!aggregates.observe_raw("just some text"));
        let snapshot = aggregates.finalize();
        assert_eq!(snapshot.counters, CorpusCounters::default());
        assert_eq!(snapshot.vocabulary.unique_words_so_far(), 0);
    }

    #[test]
    fn observe_fans_out_to_all_four_aggregates() {
        let mut aggregates = Aggregates::default();
        aggregates.observe(&fact("JOHN: Hello, World! 123"));
        assert_eq!(aggregates.frequency.count("JOHN", "hello"), 1);
        assert_eq!(aggregates.length.total("JOHN"), 17);
        assert_eq!(aggregates.vocabulary.distinct_count("JOHN"), 2);
        assert_eq!(aggregates.counters.lines_processed, 1);
    }

    #[test]
    fn merge_is_commutative() {
        let mut left = Aggregates::default();
        left.observe_raw("JOHN: to be or not to be");
        left.observe_raw("MARY: that is the question");

        let mut right = Aggregates::default();
        right.observe_raw("JOHN: whether tis nobler");

        let mut ab = left.clone();
        ab.merge(right.clone());
        let mut ba = right;
        ba.merge(left);

        assert_eq!(ab.finalize(), ba.finalize());
    }

    #[test]
    fn finalize_fills_unique_words_from_global_set() {
        let mut aggregates = Aggregates::default();
        aggregates.observe_raw("JOHN: alpha beta");
        aggregates.observe_raw("MARY: beta gamma");
        assert_eq!(aggregates.counters.unique_words_identified, 0);
        let snapshot = aggregates.finalize();
        assert_eq!(snapshot.counters.unique_words_identified, 3);
        assert_eq!(
            snapshot.counters.unique_words_identified,
            snapshot.vocabulary.unique_words_so_far()
        );
    }

    #[test]
    fn snapshot_serializes_for_report_writers() {
        let mut aggregates = Aggregates::default();
        aggregates.observe_raw("JOHN: Hello, World!");
        let snapshot = aggregates.finalize();

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["frequency"]["counts"]["JOHN"]["hello"], 1);
        assert_eq!(value["length"]["totals"]["JOHN"], 13);
        assert_eq!(value["counters"]["unique_words_identified"], 2);
    }
}
