// ============================================================
// Layer 5 — Captioning Models
// ============================================================
// Two architectures behind one step-wise interface, Captioner:
//
//   encode(images)                   → features
//   prime(features)                  → initial LSTM state
//                                      (+ a first logit row for ShowTell)
//   decode_step(features, state, w)  → logits for the next word,
//                                      attention weights, next state
//
// Teacher forcing and greedy generation (decoding.rs) are written
// once against this trait and work for both models.
//
// ShowTell (global embedding, no attention):
//   features = GlobalEncoder(images)                   [b, embed]
//   prime:     state = LSTM(features, 0)               logits = fc(h)
//   step:      state = LSTM(dropout(embed(w)), state)  logits = fc(h)
//
//   The image is the LSTM's first input. That priming step is
//   trained to predict the first caption token (<sos>), so with
//   T caption tokens the model emits T logit rows.
//
// ShowAttendTell (spatial features + soft attention):
//   features = SpatialEncoder(images)                  [b, P, enc]
//   prime:     h0 = init_h(mean_p features), c0 = init_c(...)
//   step:      alpha, ctx = attend(features, h)
//              state = LSTM([embed(w); ctx], state)
//              logits = fcn(dropout(h))
//
//   With T caption tokens the model emits T-1 logit rows, one per
//   input token except the last.
//
// Reference: Vinyals et al. (2015) Show and Tell
//            Xu et al. (2015) Show, Attend and Tell

use burn::{
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

use crate::domain::{
    error::CaptionError,
    hyperparams::{Hyperparameters, ModelKind},
};
use crate::ml::{
    attention::{SoftAttention, SoftAttentionConfig},
    encoder::{GlobalEncoder, GlobalEncoderConfig, SpatialEncoder, SpatialEncoderConfig},
    lstm::{LstmCell, LstmCellConfig, LstmState},
};

// ─── Captioner Trait ──────────────────────────────────────────────────────────
/// Output of the priming step.
#[derive(Debug, Clone)]
pub struct Primed<B: Backend> {
    pub state:  LstmState<B>,
    /// [b, vocab], only for models that emit a row while priming
    pub logits: Option<Tensor<B, 2>>,
}

/// Output of one decoding step.
#[derive(Debug, Clone)]
pub struct DecodeStep<B: Backend> {
    /// [b, vocab]
    pub logits:    Tensor<B, 2>,
    /// [b, P] for attention models
    pub attention: Option<Tensor<B, 2>>,
    pub state:     LstmState<B>,
}

pub trait Captioner<B: Backend> {
    type Features: Clone;

    fn kind(&self) -> ModelKind;

    fn encode(&self, images: Tensor<B, 4>) -> Self::Features;

    fn prime(&self, features: &Self::Features) -> Primed<B>;

    /// `tokens`: [b] ids fed at this step
    fn decode_step(
        &self,
        features: &Self::Features,
        state:    LstmState<B>,
        tokens:   Tensor<B, 1, Int>,
    ) -> DecodeStep<B>;

    /// [vocab_size, embed_size] as read from the embedding table
    fn embedding_shape(&self) -> [usize; 2];

    /// Width of the output projection
    fn vocab_size(&self) -> usize;

    /// Loaded tensors must have the shapes the hyperparameters
    /// promise; a record of another vocabulary loads silently.
    fn ensure_matches(&self, hyperparams: &Hyperparameters) -> Result<(), CaptionError> {
        let [vocab, embed] = self.embedding_shape();
        if vocab != hyperparams.vocab_size {
            return Err(CaptionError::incompatible("embedding rows", vocab, hyperparams.vocab_size));
        }
        if embed != hyperparams.embed_size {
            return Err(CaptionError::incompatible("embedding width", embed, hyperparams.embed_size));
        }
        if self.vocab_size() != hyperparams.vocab_size {
            return Err(CaptionError::incompatible(
                "output layer width",
                self.vocab_size(),
                hyperparams.vocab_size,
            ));
        }
        Ok(())
    }
}

/// [b] ids → [b, embed]
fn embed_tokens<B: Backend>(embedding: &Embedding<B>, tokens: Tensor<B, 1, Int>) -> Tensor<B, 2> {
    let [batch] = tokens.dims();
    let embedded = embedding.forward(tokens.unsqueeze_dim::<2>(1)); // [b, 1, E]
    let [_, _, width] = embedded.dims();
    embedded.reshape([batch, width])
}

// ─── ShowTell ─────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct ShowTellConfig {
    pub vocab_size:    usize,
    pub embed_size:    usize,
    pub hidden_size:   usize,
    pub encoder_dim:   usize,
    #[config(default = true)]
    pub train_encoder: bool,
    #[config(default = 0.5)]
    pub dropout:       f64,
}

impl ShowTellConfig {
    pub fn from_hyperparams(h: &Hyperparameters) -> Self {
        Self::new(h.vocab_size, h.embed_size, h.hidden_size, h.encoder_dim)
            .with_train_encoder(h.train_encoder)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ShowTell<B> {
        ShowTell {
            encoder: GlobalEncoderConfig::new(self.encoder_dim, self.embed_size)
                .with_train_encoder(self.train_encoder)
                .init(device),
            embed:   EmbeddingConfig::new(self.vocab_size, self.embed_size).init(device),
            lstm:    LstmCellConfig::new(self.embed_size, self.hidden_size).init(device),
            fc:      LinearConfig::new(self.hidden_size, self.vocab_size).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ShowTell<B: Backend> {
    pub encoder: GlobalEncoder<B>,
    pub embed:   Embedding<B>,
    pub lstm:    LstmCell<B>,
    pub fc:      Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> Captioner<B> for ShowTell<B> {
    type Features = Tensor<B, 2>;

    fn kind(&self) -> ModelKind {
        ModelKind::Global
    }

    fn encode(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.encoder.forward(images)
    }

    fn prime(&self, features: &Tensor<B, 2>) -> Primed<B> {
        let [batch, _] = features.dims();
        let zero  = LstmState::zeros(batch, self.lstm.hidden_size, &features.device());
        let state = self.lstm.forward(features.clone(), zero);
        let logits = self.fc.forward(state.hidden.clone());
        Primed { state, logits: Some(logits) }
    }

    fn decode_step(
        &self,
        _features: &Tensor<B, 2>,
        state:     LstmState<B>,
        tokens:    Tensor<B, 1, Int>,
    ) -> DecodeStep<B> {
        let x = self.dropout.forward(embed_tokens(&self.embed, tokens));
        let state = self.lstm.forward(x, state);
        let logits = self.fc.forward(state.hidden.clone());
        DecodeStep { logits, attention: None, state }
    }

    fn embedding_shape(&self) -> [usize; 2] {
        self.embed.weight.val().dims()
    }

    fn vocab_size(&self) -> usize {
        self.fc.weight.val().dims()[1]
    }
}

// ─── ShowAttendTell ───────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct ShowAttendTellConfig {
    pub vocab_size:    usize,
    pub embed_size:    usize,
    pub attention_dim: usize,
    pub encoder_dim:   usize,
    pub decoder_dim:   usize,
    #[config(default = 7)]
    pub grid_size:     usize,
    #[config(default = true)]
    pub train_encoder: bool,
    #[config(default = 0.3)]
    pub dropout:       f64,
}

impl ShowAttendTellConfig {
    pub fn from_hyperparams(h: &Hyperparameters) -> Self {
        Self::new(h.vocab_size, h.embed_size, h.attention_dim, h.encoder_dim, h.decoder_dim)
            .with_grid_size(h.grid_size)
            .with_train_encoder(h.train_encoder)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ShowAttendTell<B> {
        ShowAttendTell {
            encoder:   SpatialEncoderConfig::new(self.encoder_dim)
                .with_grid_size(self.grid_size)
                .with_train_encoder(self.train_encoder)
                .init(device),
            embed:     EmbeddingConfig::new(self.vocab_size, self.embed_size).init(device),
            attention: SoftAttentionConfig::new(self.encoder_dim, self.decoder_dim, self.attention_dim)
                .init(device),
            init_h:    LinearConfig::new(self.encoder_dim, self.decoder_dim).init(device),
            init_c:    LinearConfig::new(self.encoder_dim, self.decoder_dim).init(device),
            lstm:      LstmCellConfig::new(self.embed_size + self.encoder_dim, self.decoder_dim)
                .init(device),
            fcn:       LinearConfig::new(self.decoder_dim, self.vocab_size).init(device),
            dropout:   DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ShowAttendTell<B: Backend> {
    pub encoder:   SpatialEncoder<B>,
    pub embed:     Embedding<B>,
    pub attention: SoftAttention<B>,
    pub init_h:    Linear<B>,
    pub init_c:    Linear<B>,
    pub lstm:      LstmCell<B>,
    pub fcn:       Linear<B>,
    pub dropout:   Dropout,
}

impl<B: Backend> Captioner<B> for ShowAttendTell<B> {
    type Features = Tensor<B, 3>;

    fn kind(&self) -> ModelKind {
        ModelKind::Attention
    }

    fn encode(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        self.encoder.forward(images)
    }

    fn prime(&self, features: &Tensor<B, 3>) -> Primed<B> {
        let mean = features.clone().mean_dim(1).squeeze::<2>(1); // [b, enc]
        let state = LstmState {
            hidden: self.init_h.forward(mean.clone()),
            cell:   self.init_c.forward(mean),
        };
        Primed { state, logits: None }
    }

    fn decode_step(
        &self,
        features: &Tensor<B, 3>,
        state:    LstmState<B>,
        tokens:   Tensor<B, 1, Int>,
    ) -> DecodeStep<B> {
        let (alpha, context) = self.attention.forward(features.clone(), state.hidden.clone());
        let x = Tensor::cat(vec![embed_tokens(&self.embed, tokens), context], 1);
        let state = self.lstm.forward(x, state);
        let logits = self.fcn.forward(self.dropout.forward(state.hidden.clone()));
        DecodeStep { logits, attention: Some(alpha), state }
    }

    fn embedding_shape(&self) -> [usize; 2] {
        self.embed.weight.val().dims()
    }

    fn vocab_size(&self) -> usize {
        self.fcn.weight.val().dims()[1]
    }
}

// ─── LoadedModel ──────────────────────────────────────────────────────────────
/// A model of either kind, chosen at runtime from stored hyperparameters.
#[derive(Debug)]
pub enum LoadedModel<B: Backend> {
    Global(ShowTell<B>),
    Attention(ShowAttendTell<B>),
}

impl<B: Backend> LoadedModel<B> {
    /// Fresh (untrained) model for the given hyperparameters.
    pub fn init(h: &Hyperparameters, device: &B::Device) -> Self {
        match h.kind {
            ModelKind::Global    => Self::Global(ShowTellConfig::from_hyperparams(h).init(device)),
            ModelKind::Attention => Self::Attention(ShowAttendTellConfig::from_hyperparams(h).init(device)),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Global(_)    => ModelKind::Global,
            Self::Attention(_) => ModelKind::Attention,
        }
    }

    pub fn vocab_size(&self) -> usize {
        match self {
            Self::Global(m)    => m.vocab_size(),
            Self::Attention(m) => m.vocab_size(),
        }
    }
}
