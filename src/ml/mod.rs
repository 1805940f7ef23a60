// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here. The data layer only produces
// Burn batches; the application layer only picks a backend and
// calls in.
//
// What's in this layer:
//
//   context.rs    — device + seed, passed explicitly
//
//   encoder.rs    — convolutional backbone with two heads:
//                   • global: one embedding per image
//                   • spatial: a g×g grid of feature vectors
//
//   attention.rs  — additive soft attention over the grid
//
//   lstm.rs       — a single LSTM cell, stepped by hand
//
//   model.rs      — the two captioners behind one trait:
//                   • ShowTell       (global features, no attention)
//                   • ShowAttendTell (spatial features + attention)
//                   plus LoadedModel for runtime dispatch
//
//   decoding.rs   — teacher forcing, masked loss, greedy decoding
//
//   trainer.rs    — epoch loop, Adam, checkpoint + resume
//
//   evaluator.rs  — corpus BLEU-1..4 over a dataset
//
//   inferencer.rs — loads the latest checkpoint, captions images
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vinyals et al. (2015) Show and Tell
//            Xu et al. (2015) Show, Attend and Tell

/// Device and seed for one run
pub mod context;

/// Convolutional image encoders
pub mod encoder;

/// Soft attention module
pub mod attention;

/// Hand-stepped LSTM cell
pub mod lstm;

/// Captioning models and the Captioner trait
pub mod model;

/// Teacher forcing, loss and greedy generation
pub mod decoding;

/// Training loop with checkpointing and resume
pub mod trainer;

/// Corpus BLEU evaluation loop
pub mod evaluator;

/// Inference engine: loads a checkpoint and captions images
pub mod inferencer;

#[cfg(test)]
pub(crate) mod testing;
