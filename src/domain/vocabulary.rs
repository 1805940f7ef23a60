// ============================================================
// Layer 3 — Vocabulary
// ============================================================
// Maps lowercase word tokens to integer ids and back.
//
// Four ids are reserved and always present:
//
//   0  <pad>   padding beyond a caption's true length
//   1  <sos>   start of sequence, fed first during generation
//   2  <eos>   end of sequence, stops generation
//   3  <unk>   any token that never made it into the vocabulary
//
// Building the vocabulary:
//   Walk the corpus once, counting every token. The moment a
//   token's running count REACHES the frequency threshold it
//   receives the next free id (4, 5, 6, ...). Tokens that never
//   reach the threshold never get an id and map to <unk>.
//
//   Because ids are handed out in the order tokens cross the
//   threshold, the same corpus always produces the same ids.
//
// Tokenisation:
//   Lowercase, then split into runs of word characters and runs
//   of punctuation, dropping whitespace:
//     "A dog's ball!" → ["a", "dog", "'", "s", "ball", "!"]
//   The split itself is the HuggingFace `Whitespace` pre-tokenizer
//   (\w+ | [^\w\s]+, Unicode classes), called directly, so the
//   tokenizer.json written by the vocab store reproduces these ids
//   exactly, accents and combining marks included.

use std::collections::HashMap;

use tokenizers::{
    pre_tokenizers::whitespace::Whitespace, OffsetReferential, OffsetType, PreTokenizedString,
    PreTokenizer,
};

use crate::domain::error::CaptionError;

pub const PAD_TOKEN:   &str = "<pad>";
pub const START_TOKEN: &str = "<sos>";
pub const END_TOKEN:   &str = "<eos>";
pub const UNK_TOKEN:   &str = "<unk>";

pub const PAD_ID:   u32 = 0;
pub const START_ID: u32 = 1;
pub const END_ID:   u32 = 2;
pub const UNK_ID:   u32 = 3;

/// Reserved tokens in id order.
pub const RESERVED: [&str; 4] = [PAD_TOKEN, START_TOKEN, END_TOKEN, UNK_TOKEN];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    /// id → token
    itos: Vec<String>,
    /// token → id
    stoi: HashMap<String, u32>,
}

impl Vocabulary {
    /// Build a vocabulary from a corpus of raw sentences.
    ///
    /// A threshold of 0 behaves like 1: every token seen at least
    /// once gets an id.
    pub fn build<I, S>(corpus: I, freq_threshold: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let threshold = freq_threshold.max(1);
        let mut vocab = Self::reserved_only();
        let mut frequencies: HashMap<String, usize> = HashMap::new();

        for sentence in corpus {
            for word in Self::tokenize(sentence.as_ref()) {
                let count = frequencies.entry(word.clone()).or_insert(0);
                *count += 1;

                // Exactly at the threshold, so each token is added once
                if *count == threshold {
                    vocab.push(word);
                }
            }
        }

        tracing::debug!(
            "Vocabulary built: {} tokens ({} distinct words seen, threshold {})",
            vocab.len(),
            frequencies.len(),
            threshold
        );
        vocab
    }

    /// Rebuild a vocabulary from an id-ordered token list,
    /// e.g. one read back from disk.
    pub fn from_tokens(itos: Vec<String>) -> Result<Self, CaptionError> {
        if itos.len() < RESERVED.len() {
            return Err(CaptionError::MalformedVocabulary(format!(
                "expected at least {} tokens, found {}",
                RESERVED.len(),
                itos.len()
            )));
        }
        for (id, expected) in RESERVED.iter().enumerate() {
            if itos[id] != *expected {
                return Err(CaptionError::MalformedVocabulary(format!(
                    "id {id} must be '{expected}' but is '{}'",
                    itos[id]
                )));
            }
        }

        let mut stoi = HashMap::with_capacity(itos.len());
        for (id, token) in itos.iter().enumerate() {
            if stoi.insert(token.clone(), id as u32).is_some() {
                return Err(CaptionError::MalformedVocabulary(format!(
                    "token '{token}' appears more than once"
                )));
            }
        }

        Ok(Self { itos, stoi })
    }

    fn reserved_only() -> Self {
        let itos: Vec<String> = RESERVED.iter().map(|t| t.to_string()).collect();
        let stoi = itos
            .iter()
            .enumerate()
            .map(|(id, t)| (t.clone(), id as u32))
            .collect();
        Self { itos, stoi }
    }

    fn push(&mut self, token: String) {
        let id = self.itos.len() as u32;
        self.stoi.insert(token.clone(), id);
        self.itos.push(token);
    }

    /// Lowercase word tokenizer (see module comment for the rules).
    pub fn tokenize(text: &str) -> Vec<String> {
        // Same per-char mapping as the tokenizer.json Lowercase normalizer
        let lowered: String = text.chars().flat_map(char::to_lowercase).collect();

        let mut pretokenized = PreTokenizedString::from(lowered.as_str());
        if let Err(e) = Whitespace.pre_tokenize(&mut pretokenized) {
            tracing::warn!("Pre-tokenizer failed on {:?} ({}), splitting on whitespace", text, e);
            return lowered.split_whitespace().map(str::to_string).collect();
        }

        pretokenized
            .get_splits(OffsetReferential::Original, OffsetType::Byte)
            .into_iter()
            .map(|(token, _, _)| token.to_string())
            .collect()
    }

    /// Tokenize and map every token to its id, or to <unk>.
    pub fn numericalize(&self, text: &str) -> Vec<u32> {
        Self::tokenize(text)
            .iter()
            .map(|t| self.id(t).unwrap_or(UNK_ID))
            .collect()
    }

    /// `<sos>` + numericalized caption + `<eos>`
    pub fn encode_caption(&self, text: &str) -> Vec<u32> {
        let mut ids = Vec::with_capacity(text.len() / 4 + 2);
        ids.push(START_ID);
        ids.extend(self.numericalize(text));
        ids.push(END_ID);
        ids
    }

    /// Total number of ids, reserved ones included.
    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.stoi.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.itos.get(id as usize).map(String::as_str)
    }

    /// Id-ordered tokens, reserved ones first.
    pub fn tokens(&self) -> &[String] {
        &self.itos
    }

    pub fn is_reserved_marker(id: u32) -> bool {
        matches!(id, PAD_ID | START_ID | END_ID)
    }

    /// Token strings for `ids` without <pad>, <sos> and <eos>.
    /// <unk> is kept: it is a real (if uninformative) prediction.
    /// Ids outside the vocabulary are dropped.
    pub fn strip_reserved(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .filter(|&&id| !Self::is_reserved_marker(id))
            .filter_map(|&id| self.token(id))
            .map(str::to_string)
            .collect()
    }

    /// Space-joined tokens. Lossy: casing and original spacing are gone.
    pub fn detokenize(&self, ids: &[u32]) -> String {
        ids.iter()
            .filter_map(|&id| self.token(id))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids_are_fixed() {
        let v = Vocabulary::build(Vec::<String>::new(), 1);
        assert_eq!(v.len(), 4);
        assert_eq!(v.id("<pad>"), Some(PAD_ID));
        assert_eq!(v.id("<sos>"), Some(START_ID));
        assert_eq!(v.id("<eos>"), Some(END_ID));
        assert_eq!(v.id("<unk>"), Some(UNK_ID));
    }

    #[test]
    fn test_threshold_scenario() {
        let corpus = ["a dog runs", "a cat sleeps", "a dog runs fast"];
        let v = Vocabulary::build(corpus, 2);

        // a, dog, runs each appear at least twice
        assert_eq!(v.len(), 7);
        for word in ["a", "dog", "runs"] {
            let id = v.id(word).unwrap();
            assert!((4..7).contains(&id));
        }
        for word in ["cat", "sleeps", "fast"] {
            assert_eq!(v.id(word), None);
        }

        let ids = v.numericalize("a dog runs fast");
        assert_eq!(
            ids,
            vec![v.id("a").unwrap(), v.id("dog").unwrap(), v.id("runs").unwrap(), UNK_ID]
        );
    }

    #[test]
    fn test_ids_follow_threshold_crossing_order() {
        // "b" reaches 2 before "a" does
        let v = Vocabulary::build(["a b", "b", "a"], 2);
        assert_eq!(v.id("b"), Some(4));
        assert_eq!(v.id("a"), Some(5));
    }

    #[test]
    fn test_every_frequent_token_gets_a_unique_id() {
        let corpus = ["x y z x", "y z w", "z q"];
        let v = Vocabulary::build(corpus, 2);
        let mut ids: Vec<u32> = ["x", "y", "z"].iter().map(|w| v.id(w).unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|&id| id >= 4 && (id as usize) < v.len()));
        assert_eq!(v.id("w"), None);
        assert_eq!(v.id("q"), None);
    }

    #[test]
    fn test_zero_threshold_behaves_like_one() {
        let v = Vocabulary::build(["solo"], 0);
        assert_eq!(v.id("solo"), Some(4));
    }

    #[test]
    fn test_tokenize_lowercases_and_splits_punctuation() {
        assert_eq!(
            Vocabulary::tokenize("A Dog's  ball!"),
            vec!["a", "dog", "'", "s", "ball", "!"]
        );
        assert!(Vocabulary::tokenize("   ").is_empty());
    }

    #[test]
    fn test_tokenize_keeps_unicode_word_characters_together() {
        // Combining acute accent (Mn) and undertie (Pc) are word characters
        assert_eq!(
            Vocabulary::tokenize("Cafe\u{301} a\u{203f}b ÜBER-all"),
            vec!["cafe\u{301}", "a\u{203f}b", "über", "-", "all"]
        );
    }

    #[test]
    fn test_numericalize_is_deterministic_and_in_range() {
        let v = Vocabulary::build(["the dog runs", "the dog sleeps"], 1);
        let first  = v.numericalize("The dog runs over the bridge .");
        let second = v.numericalize("The dog runs over the bridge .");
        assert_eq!(first, second);
        assert!(first.iter().all(|&id| (id as usize) < v.len()));
    }

    #[test]
    fn test_detokenize_then_numericalize_stays_in_range() {
        let v = Vocabulary::build(["The Dog runs!", "the dog sleeps"], 1);
        let ids = v.numericalize("the dog runs !");
        let text = v.detokenize(&ids);
        assert_eq!(text, "the dog runs !");
        assert_eq!(v.numericalize(&text), ids);
        // "<unk>" re-tokenizes into punctuation and word pieces, all unknown
        let unknown = v.numericalize("a zebra");
        assert!(v.numericalize(&v.detokenize(&unknown)).iter().all(|&id| (id as usize) < v.len()));
    }

    #[test]
    fn test_encode_caption_brackets_with_start_and_end() {
        let v   = Vocabulary::build(["a dog"], 1);
        let ids = v.encode_caption("a dog");
        assert_eq!(ids.first(), Some(&START_ID));
        assert_eq!(ids.last(), Some(&END_ID));
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_strip_reserved_keeps_unknown() {
        let v = Vocabulary::build(["a dog"], 1);
        let a = v.id("a").unwrap();
        let words = v.strip_reserved(&[START_ID, a, UNK_ID, END_ID, PAD_ID]);
        assert_eq!(words, vec!["a", "<unk>"]);
    }

    #[test]
    fn test_from_tokens_round_trip() {
        let v = Vocabulary::build(["a dog runs"], 1);
        let rebuilt = Vocabulary::from_tokens(v.tokens().to_vec()).unwrap();
        assert_eq!(rebuilt, v);
    }

    #[test]
    fn test_from_tokens_rejects_bad_reserved_slots() {
        let tokens = vec!["<sos>".into(), "<pad>".into(), "<eos>".into(), "<unk>".into()];
        assert!(Vocabulary::from_tokens(tokens).is_err());
    }

    #[test]
    fn test_from_tokens_rejects_duplicates() {
        let mut tokens: Vec<String> = RESERVED.iter().map(|t| t.to_string()).collect();
        tokens.push("dog".into());
        tokens.push("dog".into());
        assert!(Vocabulary::from_tokens(tokens).is_err());
    }
}
