// ============================================================
// Layer 3 — Model Kinds and Hyperparameters
// ============================================================
// The hyperparameter bundle is fixed when a model is built and
// written into every checkpoint, so a model can be rebuilt from
// a checkpoint alone.
//
// Structural fields (anything that changes a tensor shape) must
// match between a checkpoint and whatever loads it. Schedule
// fields (learning rate, epoch count) may change on resume.

use serde::{Deserialize, Serialize};

use crate::domain::error::CaptionError;

/// The two captioning architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Global image embedding fed once into an LSTM, no attention
    Global,
    /// Spatial feature grid with soft attention at every step
    Attention,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Global    => write!(f, "global"),
            ModelKind::Attention => write!(f, "attention"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub kind:          ModelKind,
    pub embed_size:    usize,
    /// LSTM width of the global (no attention) decoder
    pub hidden_size:   usize,
    pub vocab_size:    usize,
    pub num_layers:    usize,
    pub learning_rate: f64,
    pub num_epochs:    usize,
    pub attention_dim: usize,
    /// Channels produced by the convolutional backbone
    pub encoder_dim:   usize,
    /// LSTM width of the attention decoder
    pub decoder_dim:   usize,
    /// Side of the spatial feature grid (grid_size² positions)
    pub grid_size:     usize,
    /// Fine-tune the backbone instead of only the projection layers.
    /// On by default: the backbone is randomly initialised.
    pub train_encoder: bool,
}

impl Hyperparameters {
    /// The settings the reference experiments used for each model.
    pub fn defaults_for(kind: ModelKind, vocab_size: usize) -> Self {
        match kind {
            ModelKind::Global => Self {
                kind,
                embed_size:    256,
                hidden_size:   256,
                vocab_size,
                num_layers:    1,
                learning_rate: 3e-4,
                num_epochs:    100,
                attention_dim: 256,
                encoder_dim:   2048,
                decoder_dim:   512,
                grid_size:     1,
                train_encoder: true,
            },
            ModelKind::Attention => Self {
                kind,
                embed_size:    300,
                hidden_size:   256,
                vocab_size,
                num_layers:    1,
                learning_rate: 3e-4,
                num_epochs:    25,
                attention_dim: 256,
                encoder_dim:   2048,
                decoder_dim:   512,
                grid_size:     7,
                train_encoder: true,
            },
        }
    }

    /// Reject bundles no model can be built from.
    pub fn validate(&self) -> Result<(), CaptionError> {
        let invalid = |msg: String| Err(CaptionError::InvalidHyperparameters(msg));

        if self.num_layers != 1 {
            return invalid(format!(
                "only single-layer decoders are supported, got num_layers = {}",
                self.num_layers
            ));
        }
        if self.vocab_size <= crate::domain::vocabulary::RESERVED.len() {
            return invalid(format!(
                "vocab_size {} leaves no room beyond the reserved tokens",
                self.vocab_size
            ));
        }
        let dims = [
            ("embed_size", self.embed_size),
            ("hidden_size", self.hidden_size),
            ("attention_dim", self.attention_dim),
            ("encoder_dim", self.encoder_dim),
            ("decoder_dim", self.decoder_dim),
            ("grid_size", self.grid_size),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, v)| *v == 0) {
            return invalid(format!("{name} must be positive"));
        }
        if !(self.learning_rate > 0.0) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        Ok(())
    }

    /// Compare the shape-determining fields of a stored bundle
    /// (`self`) with the bundle a caller wants to use.
    pub fn ensure_compatible(&self, requested: &Hyperparameters) -> Result<(), CaptionError> {
        if self.kind != requested.kind {
            return Err(CaptionError::incompatible("model kind", self.kind, requested.kind));
        }

        let fields = [
            ("vocab_size", self.vocab_size, requested.vocab_size),
            ("embed_size", self.embed_size, requested.embed_size),
            ("num_layers", self.num_layers, requested.num_layers),
            ("encoder_dim", self.encoder_dim, requested.encoder_dim),
            ("grid_size", self.grid_size, requested.grid_size),
        ];
        for (field, stored, wanted) in fields {
            if stored != wanted {
                return Err(CaptionError::incompatible(field, stored, wanted));
            }
        }

        // Only the dimensions the model kind actually uses
        let kind_fields = match self.kind {
            ModelKind::Global => vec![("hidden_size", self.hidden_size, requested.hidden_size)],
            ModelKind::Attention => vec![
                ("decoder_dim", self.decoder_dim, requested.decoder_dim),
                ("attention_dim", self.attention_dim, requested.attention_dim),
            ],
        };
        for (field, stored, wanted) in kind_fields {
            if stored != wanted {
                return Err(CaptionError::incompatible(field, stored, wanted));
            }
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Hyperparameters::defaults_for(ModelKind::Global, 100).validate().unwrap();
        Hyperparameters::defaults_for(ModelKind::Attention, 100).validate().unwrap();
    }

    #[test]
    fn test_multi_layer_is_rejected() {
        let mut h = Hyperparameters::defaults_for(ModelKind::Global, 100);
        h.num_layers = 2;
        assert!(matches!(h.validate(), Err(CaptionError::InvalidHyperparameters(_))));
    }

    #[test]
    fn test_vocab_size_mismatch_is_incompatible() {
        let stored    = Hyperparameters::defaults_for(ModelKind::Attention, 100);
        let requested = Hyperparameters::defaults_for(ModelKind::Attention, 101);
        let err = stored.ensure_compatible(&requested).unwrap_err();
        match err {
            CaptionError::IncompatibleCheckpoint { field, .. } => assert_eq!(field, "vocab_size"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_schedule_fields_may_differ() {
        let stored = Hyperparameters::defaults_for(ModelKind::Global, 50);
        let mut requested = stored.clone();
        requested.num_epochs    = 500;
        requested.learning_rate = 1e-3;
        stored.ensure_compatible(&requested).unwrap();
    }

    #[test]
    fn test_kind_mismatch_is_incompatible() {
        let stored    = Hyperparameters::defaults_for(ModelKind::Global, 50);
        let requested = Hyperparameters::defaults_for(ModelKind::Attention, 50);
        assert!(stored.ensure_compatible(&requested).is_err());
    }

    #[test]
    fn test_unused_dims_are_ignored_for_global_model() {
        let stored = Hyperparameters::defaults_for(ModelKind::Global, 50);
        let mut requested = stored.clone();
        requested.attention_dim = 7;
        stored.ensure_compatible(&requested).unwrap();
    }
}
