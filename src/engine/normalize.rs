//! Input normalization.
//!
//! Before any trigger is tried, the raw message is reduced to a plain list of
//! lowercase words. The same reduction is applied to the bot's previous reply
//! when checking `%` constraints, so both sides of every comparison speak the
//! same alphabet.
//!
//! The pipeline:
//!
//! ```text
//! "Who's THERE?!"
//!   │ lowercase + split on whitespace
//!   ▼
//! ["who's", "there?!"]
//!   │ trim punctuation at word edges
//!   ▼
//! ["who's", "there"]
//!   │ substitutions (longest key first, never re-applied)
//!   ▼
//! ["who", "is", "there"]
//!   │ strip remaining punctuation (configurable regex), drop empties
//!   ▼
//! "who is there"
//! ```
//!
//! ## Design notes
//!
//! - The substitution table is policy, not part of the engine: it comes from
//!   `! sub` definitions plus `Options::substitutions`. With no table the
//!   normalizer only lowercases and strips punctuation.
//! - Keys are matched against whole words, so `! sub i'm = i am` never fires
//!   inside a longer word.
//! - Case folding uses `to_lowercase()`, which is Unicode aware.

use regex::Regex;

/// Default punctuation pattern: anything that is not a letter, digit or space.
pub const DEFAULT_PUNCTUATION: &str = r"[^\p{L}\p{N}\s]";

/// Turns raw text into the word sequence triggers are matched against.
#[derive(Debug, Clone)]
pub struct Normalizer {
    punctuation: Regex,
    /// `(key words, replacement words)`, longest key first.
    substitutions: Vec<(Vec<String>, Vec<String>)>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer { punctuation: crate::regex!(r"[^\p{L}\p{N}\s]").clone(), substitutions: Vec::new() }
    }
}

impl Normalizer {
    /// Build a normalizer from a punctuation regex and a substitution table.
    pub fn new<I, K, V>(punctuation: &str, substitutions: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let punctuation = Regex::new(punctuation)?;
        let mut table: Vec<(Vec<String>, Vec<String>)> = substitutions
            .into_iter()
            .map(|(k, v)| (split_lower(k.as_ref()), split_lower(v.as_ref())))
            .filter(|(k, _)| !k.is_empty())
            .collect();

        table.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        table.dedup_by(|a, b| a.0 == b.0);

        Ok(Normalizer { punctuation, substitutions: table })
    }

    /// Number of substitution entries.
    pub fn substitution_count(&self) -> usize {
        self.substitutions.len()
    }

    /// Normalize `input` and return its words.
    pub fn words(&self, input: &str) -> Vec<String> {
        let lower = input.to_lowercase();
        let edged: Vec<String> = lower
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| !w.is_empty())
            .collect();

        let substituted = self.substitute(&edged);

        substituted.iter().map(|w| self.strip_word(w)).filter(|w| !w.is_empty()).collect()
    }

    /// Normalize `input` into a single space-separated string.
    pub fn normalize(&self, input: &str) -> String {
        self.words(input).join(" ")
    }

    /// Lowercase one word and remove punctuation from it.
    ///
    /// Used for literal pattern words so they compare against normalized input.
    pub fn strip_word(&self, word: &str) -> String {
        let lower = word.to_lowercase();
        self.punctuation.replace_all(&lower, "").trim().to_string()
    }

    fn substitute(&self, words: &[String]) -> Vec<String> {
        if self.substitutions.is_empty() {
            return words.to_vec();
        }

        let mut out = Vec::with_capacity(words.len());
        let mut i = 0;
        'outer: while i < words.len() {
            for (key, value) in &self.substitutions {
                let end = i + key.len();
                if end <= words.len() && words[i..end] == key[..] {
                    tracing::trace!(key = %key.join(" "), value = %value.join(" "), "substitution");
                    out.extend(value.iter().cloned());
                    i = end;
                    continue 'outer;
                }
            }
            out.push(words[i].clone());
            i += 1;
        }
        out
    }
}

fn split_lower(text: &str) -> Vec<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}
