// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types and rules of the captioning problem.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, traits and algorithms
//
// Everything in here can be unit tested without a GPU and
// without touching the filesystem.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// An (image id, caption) row from the caption table
pub mod sample;

// Word-level vocabulary with reserved ids and frequency threshold
pub mod vocabulary;

// Corpus-level BLEU-1..4
pub mod bleu;

// Model kinds and the hyperparameter bundle stored with checkpoints
pub mod hyperparams;

// Typed errors callers may want to match on
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
