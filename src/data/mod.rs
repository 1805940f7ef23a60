// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the caption table and image directory to
// device-resident tensor batches.
//
//   captions.csv + images/
//       │
//       ▼
//   CsvCaptionLoader  → (image_id, caption) rows
//       │
//       ▼
//   split_by_image    → train / test rows, no image on both sides
//       │
//       ▼
//   CaptionDataset    → Burn Dataset: decode image, encode caption
//       │
//       ▼
//   CaptionBatcher    → Burn Batcher: stack images, pad captions
//       │
//       ▼
//   EpochLoader       → worker threads prefetching batches,
//                       delivered in a seeded, fixed order
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the caption CSV and groups references per image
pub mod loader;

/// Resize, crop and normalise images per backbone profile
pub mod preprocessor;

/// Implements Burn's Dataset trait for caption samples
pub mod dataset;

/// Implements Burn's Batcher trait with per-batch padding
pub mod batcher;

/// Seeded, image-disjoint train/test split
pub mod splitter;

/// Ordered, seeded epoch loader with prefetching workers
pub mod prefetch;
