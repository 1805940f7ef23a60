// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to the caption data through these
// traits, never through the CSV reader directly:
//
//   CaptionSource   → where (image, caption) rows come from
//   ReferenceLookup → every human caption of one image, the
//                     multi-reference input of BLEU
//
// CsvCaptionLoader implements the first, CaptionTable the
// second. Tests use in-memory tables for both.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::sample::CaptionSample;

// ─── CaptionSource ────────────────────────────────────────────────────────────
/// Any component that can produce the full list of caption samples.
pub trait CaptionSource {
    /// Load every usable (image, caption) row, in file order.
    fn load_all(&self) -> Result<Vec<CaptionSample>>;
}

// ─── ReferenceLookup ──────────────────────────────────────────────────────────
/// Multi-reference lookup: all captions recorded for an image.
pub trait ReferenceLookup {
    /// Raw caption strings for `image_id`, empty if the id is unknown.
    fn references(&self, image_id: &str) -> Vec<String>;
}
