// ============================================================
// Layer 3 — CaptionSample Domain Type
// ============================================================
// One row of the caption table: an image identifier (its file
// name inside the image directory) and one ground-truth caption.
//
// Flickr-style datasets carry several captions per image, so the
// same image_id shows up in several samples. Anything that splits
// or evaluates samples must group by image_id, never by row.

use serde::{Deserialize, Serialize};

/// A single (image, caption) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionSample {
    /// File name of the image, relative to the image directory
    pub image_id: String,

    /// Raw caption text, untokenised
    pub caption: String,
}

impl CaptionSample {
    pub fn new(image_id: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            caption:  caption.into(),
        }
    }
}
