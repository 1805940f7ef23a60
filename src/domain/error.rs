// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// Most of the pipeline reports failures through anyhow with
// context attached. These are the cases a caller may want to
// tell apart programmatically: a checkpoint that must not be
// used, a vocabulary file that cannot be trusted, an image that
// should be skipped rather than abort the run.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptionError {
    /// The stored hyperparameters (or loaded tensors) disagree with
    /// what the caller is about to build. Fatal: using the weights
    /// would silently produce garbage.
    #[error("incompatible checkpoint: {field} is {stored} in the checkpoint but {requested} here")]
    IncompatibleCheckpoint {
        field:     &'static str,
        stored:    String,
        requested: String,
    },

    #[error("no checkpoint found in '{0}'")]
    MissingCheckpoint(PathBuf),

    #[error("malformed vocabulary: {0}")]
    MalformedVocabulary(String),

    #[error("invalid hyperparameters: {0}")]
    InvalidHyperparameters(String),

    #[error("cannot load image '{image_id}': {reason}")]
    ImageLoad {
        image_id: String,
        reason:   String,
    },
}

impl CaptionError {
    pub fn incompatible(
        field:     &'static str,
        stored:    impl ToString,
        requested: impl ToString,
    ) -> Self {
        Self::IncompatibleCheckpoint {
            field,
            stored:    stored.to_string(),
            requested: requested.to_string(),
        }
    }
}
