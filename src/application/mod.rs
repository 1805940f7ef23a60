// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one goal: train a model, score it, or caption an image.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - No direct file parsing (that's Layer 4 and 6)
//   - Only workflow coordination and backend selection
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Backend selection (wgpu or cpu)
pub mod device;

// The training workflow
pub mod train_use_case;

// BLEU evaluation of the latest checkpoint
pub mod evaluate_use_case;

// Captioning a single image
pub mod caption_use_case;
