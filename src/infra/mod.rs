// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the checkpoint directory:
//
//   checkpoint.rs  — atomic per-epoch bundles (model, optimizer,
//                    state) with Burn's NamedMpkGzFileRecorder,
//                    plus train_config.json
//
//   vocab_store.rs — the vocabulary as a HuggingFace
//                    tokenizer.json
//
//   metrics.rs     — per-epoch loss CSV
//
// Reference: Burn Book §5 (Checkpointing)

/// Atomic checkpoint bundles and training config
pub mod checkpoint;

/// Vocabulary persistence in tokenizer.json format
pub mod vocab_store;

/// Training metrics CSV logger
pub mod metrics;
