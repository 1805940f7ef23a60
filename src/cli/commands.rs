// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `evaluate` and
// `caption`, and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, enums, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::{
    caption_use_case::CaptionConfig,
    device::ComputeDevice,
    evaluate_use_case::EvaluateConfig,
    train_use_case::TrainConfig,
};
use crate::domain::hyperparams::ModelKind;
use crate::ml::evaluator::ReferencePolicy;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a captioning model on an image directory and caption table
    Train(TrainArgs),

    /// Score the latest checkpoint with BLEU-1..4 on the held-out images
    Evaluate(EvaluateArgs),

    /// Caption a single image with the latest checkpoint
    Caption(CaptionArgs),
}

// ─── Value Enums ──────────────────────────────────────────────────────────────

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ModelArg {
    /// Global image embedding, no attention (show and tell)
    Global,
    /// Spatial features with soft attention (show, attend and tell)
    Attention,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DeviceArg {
    Wgpu,
    Cpu,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ReferencesArg {
    /// The sample's own caption only
    Single,
    /// Every caption recorded for the image
    Multi,
}

impl From<ModelArg> for ModelKind {
    fn from(m: ModelArg) -> Self {
        match m {
            ModelArg::Global    => ModelKind::Global,
            ModelArg::Attention => ModelKind::Attention,
        }
    }
}

impl From<DeviceArg> for ComputeDevice {
    fn from(d: DeviceArg) -> Self {
        match d {
            DeviceArg::Wgpu => ComputeDevice::Wgpu,
            DeviceArg::Cpu  => ComputeDevice::Cpu,
        }
    }
}

impl From<ReferencesArg> for ReferencePolicy {
    fn from(r: ReferencesArg) -> Self {
        match r {
            ReferencesArg::Single => ReferencePolicy::Single,
            ReferencesArg::Multi  => ReferencePolicy::Multi,
        }
    }
}

// ─── train ────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// CSV with `image` and `caption` columns
    #[arg(long, default_value = "data/captions.txt")]
    pub captions: String,

    /// Directory holding the images named in the caption table
    #[arg(long, default_value = "data/Images")]
    pub images_dir: String,

    /// Directory for checkpoints, vocabulary and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Which architecture to train
    #[arg(long, value_enum, default_value_t = ModelArg::Attention)]
    pub model: ModelArg,

    #[arg(long, value_enum, default_value_t = DeviceArg::Wgpu)]
    pub device: DeviceArg,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Image decoding threads (batch order stays seeded)
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    /// Overrides the architecture default (100 global, 25 attention)
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Overrides the architecture default (3e-4)
    #[arg(long)]
    pub lr: Option<f64>,

    /// Words seen fewer times than this map to <unk>
    #[arg(long, default_value_t = 5)]
    pub freq_threshold: usize,

    /// Share of caption rows held out for evaluation
    #[arg(long, default_value_t = 0.1)]
    pub test_fraction: f64,

    #[arg(long, default_value_t = 211)]
    pub seed: u64,

    /// Train only the heads and decoder, keeping the randomly
    /// initialised backbone fixed
    #[arg(long)]
    pub freeze_encoder: bool,

    /// Continue from the latest checkpoint
    #[arg(long)]
    pub resume: bool,

    /// Do not write a checkpoint after each epoch
    #[arg(long)]
    pub no_checkpoints: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2:
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            captions_file:    a.captions,
            images_dir:       a.images_dir,
            checkpoint_dir:   a.checkpoint_dir,
            model:            a.model.into(),
            device:           a.device.into(),
            batch_size:       a.batch_size,
            num_workers:      a.num_workers,
            epochs:           a.epochs,
            learning_rate:    a.lr,
            freq_threshold:   a.freq_threshold,
            test_fraction:    a.test_fraction,
            seed:             a.seed,
            train_encoder:    !a.freeze_encoder,
            resume:           a.resume,
            save_checkpoints: !a.no_checkpoints,
        }
    }
}

// ─── evaluate ─────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory the training run wrote to
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = DeviceArg::Wgpu)]
    pub device: DeviceArg,

    /// Which captions count as references
    #[arg(long, value_enum, default_value_t = ReferencesArg::Multi)]
    pub references: ReferencesArg,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Stop after this many batches
    #[arg(long)]
    pub max_batches: Option<usize>,

    /// Longest caption generated, in tokens after <sos>
    #[arg(long, default_value_t = 50)]
    pub max_len: usize,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            checkpoint_dir: a.checkpoint_dir,
            device:         a.device.into(),
            policy:         a.references.into(),
            batch_size:     a.batch_size,
            max_batches:    a.max_batches,
            max_len:        a.max_len,
        }
    }
}

// ─── caption ──────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Image file to describe
    #[arg(long)]
    pub image: String,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = DeviceArg::Wgpu)]
    pub device: DeviceArg,

    #[arg(long, default_value_t = 50)]
    pub max_len: usize,

    /// Write the caption and per-step attention weights to this JSON file
    #[arg(long)]
    pub attention_out: Option<String>,
}

impl From<CaptionArgs> for CaptionConfig {
    fn from(a: CaptionArgs) -> Self {
        CaptionConfig {
            checkpoint_dir: a.checkpoint_dir,
            image:          a.image,
            device:         a.device.into(),
            max_len:        a.max_len,
            attention_out:  a.attention_out,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn train_config(args: &[&str]) -> TrainConfig {
        let argv = ["neural-captioner", "train"].iter().chain(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Train(a) => a.into(),
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn test_backbone_is_fine_tuned_unless_frozen() {
        assert!(train_config(&[]).train_encoder);
        assert!(!train_config(&["--freeze-encoder"]).train_encoder);
    }

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let parsed = train_config(&[]);
        assert_eq!(parsed, TrainConfig::default());
    }
}
