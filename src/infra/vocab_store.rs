// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Persists the Vocabulary as a HuggingFace tokenizer.json, so
// the file is both our own vocabulary record and a tokenizer any
// `tokenizers` user can load directly:
//
//   normalizer     Lowercase
//   pre_tokenizer  Whitespace   (\w+ | [^\w\s]+)
//   model          WordLevel, unk_token "<unk>"
//   added_tokens   <pad> <sos> <eos> <unk> at ids 0..3
//
// These are exactly the rules Vocabulary::tokenize applies, so
// encoding a caption with the saved tokenizer gives the same ids
// as Vocabulary::numericalize.
//
// Loading goes through tokenizers::Tokenizer::from_file, reads
// the id → token table back and rebuilds the Vocabulary, which
// re-validates the reserved slots.
//
// Reference: tokenizers crate documentation (WordLevel model)

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tokenizers::Tokenizer;

use crate::domain::{
    error::CaptionError,
    vocabulary::{Vocabulary, RESERVED, UNK_TOKEN},
};

const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct VocabStore {
    dir: PathBuf,
}

impl VocabStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Load the stored vocabulary, or build one from `corpus` and store it.
    pub fn load_or_build<I, S>(&self, corpus: I, freq_threshold: usize) -> Result<Vocabulary>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.exists() {
            tracing::info!("Loading existing vocabulary from '{}'", self.path().display());
            self.load()
        } else {
            let vocab = Vocabulary::build(corpus, freq_threshold);
            tracing::info!(
                "Built vocabulary: {} tokens (threshold {})",
                vocab.len(),
                freq_threshold
            );
            self.save(&vocab)?;
            Ok(vocab)
        }
    }

    pub fn save(&self, vocab: &Vocabulary) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let words: serde_json::Map<String, serde_json::Value> = vocab
            .tokens()
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), serde_json::json!(id)))
            .collect();

        let added_tokens: Vec<serde_json::Value> = RESERVED
            .iter()
            .enumerate()
            .map(|(id, token)| {
                serde_json::json!({
                    "id": id, "content": token, "single_word": false, "lstrip": false,
                    "rstrip": false, "normalized": false, "special": true
                })
            })
            .collect();

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": { "type": "Lowercase" },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": words,
                "unk_token": UNK_TOKEN
            }
        });

        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved {} tokens to '{}'", vocab.len(), path.display());
        Ok(())
    }

    pub fn load(&self) -> Result<Vocabulary> {
        let tokenizer = self.tokenizer()?;
        vocabulary_from_tokenizer(&tokenizer).map_err(Into::into)
    }

    /// The stored file as a ready-to-use HuggingFace tokenizer.
    pub fn tokenizer(&self) -> Result<Tokenizer> {
        load_tokenizer(&self.path())
    }
}

fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(path)
        .map_err(|e| anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
}

fn vocabulary_from_tokenizer(tokenizer: &Tokenizer) -> Result<Vocabulary, CaptionError> {
    let mut entries: Vec<(String, u32)> = tokenizer.get_vocab(true).into_iter().collect();
    entries.sort_by_key(|(_, id)| *id);

    for (expected, (token, id)) in entries.iter().enumerate() {
        if *id as usize != expected {
            return Err(CaptionError::MalformedVocabulary(format!(
                "ids are not contiguous: '{token}' has id {id}, expected {expected}"
            )));
        }
    }

    Vocabulary::from_tokens(entries.into_iter().map(|(token, _)| token).collect())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: [&str; 3] = ["A dog runs.", "A dog's ball!", "the dog runs"];

    #[test]
    fn test_save_then_load_gives_same_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path());
        let vocab = Vocabulary::build(CORPUS, 1);
        store.save(&vocab).unwrap();
        assert_eq!(store.load().unwrap(), vocab);
    }

    #[test]
    fn test_tokenizer_encodes_like_numericalize() {
        let dir = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path());
        let vocab = Vocabulary::build(CORPUS, 2);
        store.save(&vocab).unwrap();

        let tokenizer = store.tokenizer().unwrap();
        for text in ["A Dog runs!", "the cat's toy", "dog", "Dog\u{301}s a\u{203f}cat", "ÉTÉ dog"] {
            let encoding = tokenizer.encode(text, false).unwrap();
            assert_eq!(encoding.get_ids(), vocab.numericalize(text).as_slice(), "{text}");
        }
    }

    #[test]
    fn test_load_or_build_reuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path());
        let first = store.load_or_build(CORPUS, 1).unwrap();
        // A different corpus must not change the stored vocabulary
        let second = store.load_or_build(["zebra zebra"], 1).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.id("zebra"), None);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VocabStore::new(dir.path()).load().is_err());
    }
}
